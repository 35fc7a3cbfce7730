use std::cmp::Ordering;

use crate::enrich::EnrichmentStore;
use crate::flags::flag_for;
use crate::geo::{distance_from, Observer};
use crate::model::Aircraft;

pub const CALLSIGN_PLACEHOLDER: &str = "-";

/// One table row, already formatted for display.
#[derive(Clone, Debug, PartialEq)]
pub struct BoardRow {
    pub callsign: String,
    pub flag: &'static str,
    pub airline: String,
    pub route: String,
    pub heading: String,
    pub distance: String,
    pub altitude: String,
    pub vertical_rate: String,
    pub speed: String,
    pub distance_nm: f64,
}

#[derive(Debug, Default)]
pub struct Derived {
    pub rows: Vec<BoardRow>,
    /// Callsigns shown without a route or airline.
    pub missing: Vec<String>,
}

/// Nearest `limit` aircraft with their distances. Aircraft without a position
/// sort last; ties keep feed order.
pub fn rank(aircraft: &[Aircraft], observer: Observer, limit: usize) -> Vec<(&Aircraft, f64)> {
    let mut ranked: Vec<(&Aircraft, f64)> = aircraft
        .iter()
        .map(|ac| (ac, distance_from(observer, ac.position())))
        .collect();
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    ranked.truncate(limit);
    ranked
}

pub fn derive_rows(
    aircraft: &[Aircraft],
    observer: Observer,
    limit: usize,
    store: &EnrichmentStore,
) -> Derived {
    let mut derived = Derived::default();
    for (ac, distance_nm) in rank(aircraft, observer, limit) {
        let callsign = ac.callsign().unwrap_or(CALLSIGN_PLACEHOLDER).to_string();
        let (airline, route) = if callsign == CALLSIGN_PLACEHOLDER {
            (None, None)
        } else {
            (store.airline_for(&callsign), store.route_for(&callsign))
        };
        if callsign != CALLSIGN_PLACEHOLDER && (airline.is_none() || route.is_none()) {
            derived.missing.push(callsign.clone());
        }

        derived.rows.push(BoardRow {
            flag: flag_for(&ac.hex_upper()),
            airline: airline.unwrap_or_default(),
            route: route.unwrap_or_else(|| "?".to_string()),
            heading: ac.track.map(|t| t.to_string()).unwrap_or_else(|| "---".to_string()),
            distance: if distance_nm.is_finite() {
                format!("{distance_nm:.1}")
            } else {
                "-".to_string()
            },
            altitude: ac
                .alt_baro
                .map(group_thousands)
                .unwrap_or_else(|| "---".to_string()),
            vertical_rate: ac
                .baro_rate
                .map(|vr| {
                    if vr < 0 {
                        group_thousands(vr)
                    } else {
                        format!("+{}", group_thousands(vr))
                    }
                })
                .unwrap_or_else(|| "-".to_string()),
            speed: ac.gs.map(|gs| gs.to_string()).unwrap_or_else(|| "---".to_string()),
            distance_nm,
            callsign,
        });
    }
    derived
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
