use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ApiResponse {
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub now: Option<f64>,
    #[serde(default, alias = "ac")]
    pub aircraft: Vec<Aircraft>,
}

/// One entry of dump1090's `aircraft.json`. Everything is optional; the feed
/// leaves fields out until it has decoded them.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Aircraft {
    #[serde(default)]
    pub hex: Option<String>,
    #[serde(default)]
    pub flight: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i64_from_any")]
    pub alt_baro: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64_from_any")]
    pub baro_rate: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub gs: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub track: Option<f64>,
}

impl Aircraft {
    /// Trimmed callsign, `None` when the transponder has not sent one yet.
    pub fn callsign(&self) -> Option<&str> {
        self.flight
            .as_deref()
            .map(str::trim)
            .filter(|cs| !cs.is_empty())
    }

    pub fn hex_upper(&self) -> String {
        self.hex
            .as_deref()
            .map(|h| h.trim().to_ascii_uppercase())
            .unwrap_or_default()
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

fn de_opt_i64_from_any<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => {
            if let Some(value) = number.as_i64() {
                Ok(Some(value))
            } else if let Some(value) = number.as_f64() {
                Ok(Some(value as i64))
            } else {
                Ok(None)
            }
        }
        // dump1090 reports "ground" for alt_baro on the surface.
        Value::String(text) => {
            let trimmed = text.trim();
            if let Ok(value) = trimmed.parse::<i64>() {
                Ok(Some(value))
            } else if let Ok(value) = trimmed.parse::<f64>() {
                Ok(Some(value as i64))
            } else {
                Ok(None)
            }
        }
        Value::Null => Ok(None),
        other => Err(serde::de::Error::custom(format!(
            "expected number or null, got {other}"
        ))),
    }
}

fn de_opt_f64_from_any<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected float-compatible number")),
        Value::String(text) => Ok(text.trim().parse::<f64>().ok()),
        Value::Null => Ok(None),
        other => Err(serde::de::Error::custom(format!(
            "expected number or null, got {other}"
        ))),
    }
}
