use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::TrackerError;

pub const DEFAULT_URL: &str = "http://daphnis:8080/data/aircraft.json";
pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_ROWS: usize = 15;
pub const DEFAULT_LOCATION_NAME: &str = "Bristol Airport";
pub const DEFAULT_LOCATION_LAT: f64 = 51.3827;
pub const DEFAULT_LOCATION_LON: f64 = -2.7191;

pub const INTERVAL_RANGE: (u64, u64) = (1, 60);
pub const ROWS_RANGE: (usize, usize) = (1, 25);

/// The settings that can be edited from the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Interval,
    Url,
    Rows,
}

impl Field {
    pub fn prompt(self) -> &'static str {
        match self {
            Field::Interval => "Enter New Interval (1-60)",
            Field::Url => "Enter New URL",
            Field::Rows => "Enter Number of Lines (1-25)",
        }
    }
}

/// Style tags for each table column, e.g. `bold cyan`.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnStyles {
    pub callsign: String,
    pub flag: String,
    pub airline: String,
    pub route: String,
    pub dist: String,
    pub alt: String,
    pub vr: String,
    pub speed: String,
    pub heading: String,
}

impl Default for ColumnStyles {
    fn default() -> Self {
        Self {
            callsign: "bold cyan".to_string(),
            flag: "white".to_string(),
            airline: "bold green".to_string(),
            route: "cyan".to_string(),
            dist: "white".to_string(),
            alt: "yellow".to_string(),
            vr: "yellow".to_string(),
            speed: "blue".to_string(),
            heading: "magenta".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub url: String,
    pub interval_secs: u64,
    pub rows: usize,
    pub location_name: String,
    pub location_lat: f64,
    pub location_lon: f64,
    pub styles: ColumnStyles,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            rows: DEFAULT_ROWS,
            location_name: DEFAULT_LOCATION_NAME.to_string(),
            location_lat: DEFAULT_LOCATION_LAT,
            location_lon: DEFAULT_LOCATION_LON,
            styles: ColumnStyles::default(),
        }
    }
}

impl Settings {
    /// Validates `raw` for `field` and stores it. Returns the message to show.
    pub fn commit(&mut self, field: Field, raw: &str) -> Result<String, TrackerError> {
        match field {
            Field::Interval => {
                self.interval_secs = parse_interval(raw)?;
                Ok(format!("Interval updated to {}s", self.interval_secs))
            }
            Field::Rows => {
                self.rows = parse_rows(raw)?;
                Ok(format!("Rows updated to {}", self.rows))
            }
            Field::Url => {
                self.url = parse_url(raw)?;
                Ok(format!("URL updated to {}", self.url))
            }
        }
    }
}

pub fn parse_interval(raw: &str) -> Result<u64, TrackerError> {
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| TrackerError::InvalidSetting("Invalid input.".to_string()))?;
    if (INTERVAL_RANGE.0..=INTERVAL_RANGE.1).contains(&value) {
        Ok(value)
    } else {
        Err(TrackerError::InvalidSetting(
            "Invalid interval. Must be 1-60.".to_string(),
        ))
    }
}

pub fn parse_rows(raw: &str) -> Result<usize, TrackerError> {
    let value: usize = raw
        .trim()
        .parse()
        .map_err(|_| TrackerError::InvalidSetting("Invalid input.".to_string()))?;
    if (ROWS_RANGE.0..=ROWS_RANGE.1).contains(&value) {
        Ok(value)
    } else {
        Err(TrackerError::InvalidSetting(
            "Invalid number. Must be 1-25.".to_string(),
        ))
    }
}

pub fn parse_url(raw: &str) -> Result<String, TrackerError> {
    let url = raw.trim();
    if url.is_empty() {
        Err(TrackerError::InvalidSetting("URL cannot be empty.".to_string()))
    } else {
        Ok(url.to_string())
    }
}

/// Applies `key=value` lines on top of `base`. Unknown keys are ignored and a
/// value that does not parse leaves the previous one in place.
pub fn parse_settings(content: &str, base: Settings) -> Settings {
    let mut settings = base;
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "url" => match parse_url(value) {
                Ok(url) => settings.url = url,
                Err(err) => warn!("settings: url ignored: {err}"),
            },
            "interval" => match parse_interval(value) {
                Ok(secs) => settings.interval_secs = secs,
                Err(err) => warn!("settings: interval={value} ignored: {err}"),
            },
            "rows" => match parse_rows(value) {
                Ok(rows) => settings.rows = rows,
                Err(err) => warn!("settings: rows={value} ignored: {err}"),
            },
            "location_name" => settings.location_name = value.to_string(),
            "location_lat" => match value.parse::<f64>() {
                Ok(lat) => settings.location_lat = lat,
                Err(_) => warn!("settings: location_lat={value} ignored"),
            },
            "location_lon" => match value.parse::<f64>() {
                Ok(lon) => settings.location_lon = lon,
                Err(_) => warn!("settings: location_lon={value} ignored"),
            },
            "col_callsign" => settings.styles.callsign = value.to_string(),
            "col_flag" => settings.styles.flag = value.to_string(),
            "col_airline" => settings.styles.airline = value.to_string(),
            "col_route" => settings.styles.route = value.to_string(),
            "col_dist" => settings.styles.dist = value.to_string(),
            "col_alt" => settings.styles.alt = value.to_string(),
            "col_vr" => settings.styles.vr = value.to_string(),
            "col_speed" => settings.styles.speed = value.to_string(),
            "col_heading" => settings.styles.heading = value.to_string(),
            other => debug!("settings: unknown key {other}"),
        }
    }
    settings
}

pub fn render_settings(settings: &Settings) -> String {
    let s = &settings.styles;
    let pairs: [(&str, String); 15] = [
        ("url", settings.url.clone()),
        ("interval", settings.interval_secs.to_string()),
        ("rows", settings.rows.to_string()),
        ("location_name", settings.location_name.clone()),
        ("location_lat", settings.location_lat.to_string()),
        ("location_lon", settings.location_lon.to_string()),
        ("col_callsign", s.callsign.clone()),
        ("col_flag", s.flag.clone()),
        ("col_airline", s.airline.clone()),
        ("col_route", s.route.clone()),
        ("col_dist", s.dist.clone()),
        ("col_alt", s.alt.clone()),
        ("col_vr", s.vr.clone()),
        ("col_speed", s.speed.clone()),
        ("col_heading", s.heading.clone()),
    ];
    let mut text = String::new();
    for (key, value) in pairs {
        text.push_str(key);
        text.push('=');
        text.push_str(&value);
        text.push('\n');
    }
    text
}

/// The `key=value` file backing [`Settings`].
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads settings over `base`. A missing or unreadable file is replaced
    /// with one holding `base`.
    pub fn load(&self, base: Settings) -> Settings {
        if !self.path.exists() {
            info!("creating settings file {}", self.path.display());
            self.save_or_warn(&base);
            return base;
        }
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let settings = parse_settings(&content, base);
                debug!("settings loaded from {}", self.path.display());
                settings
            }
            Err(err) => {
                let err = TrackerError::ConfigFile {
                    path: self.path.display().to_string(),
                    reason: err.to_string(),
                };
                warn!("{err}; writing defaults");
                self.save_or_warn(&base);
                base
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        fs::write(&self.path, render_settings(settings))
            .with_context(|| format!("Failed to write settings: {}", self.path.display()))
    }

    fn save_or_warn(&self, settings: &Settings) {
        if let Err(err) = self.save(settings) {
            warn!("{err:#}");
        }
    }
}
