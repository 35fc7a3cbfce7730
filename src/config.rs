use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::settings;

pub const DEFAULT_CONFIG_FILE: &str = "flight-tracker.toml";
pub const DEFAULT_SETTINGS_FILE: &str = "settings.txt";
pub const DEFAULT_AIRLINES_FILE: &str = "airlines.txt";
pub const DEFAULT_ROUTES_FILE: &str = "routes.txt";
pub const DEFAULT_ENRICH_BASE: &str = "https://api.adsbdb.com";
pub const DEFAULT_ENRICH_WORKERS: usize = 4;
pub const DEFAULT_ENRICH_QUEUE: usize = 64;
pub const DEFAULT_ENRICH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_UI_FPS: u64 = 10;
pub const DEFAULT_LOG_FILE: &str = "flight-tracker.log";

const ENV_PREFIX: &str = "FLIGHT_TRACKER_";

#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    /// Session-only source override; never written to the settings file.
    pub url: Option<String>,
    pub interval_secs: Option<u64>,
    pub settings_file: PathBuf,
    pub airlines_file: PathBuf,
    pub routes_file: PathBuf,
    pub enrich_enabled: bool,
    pub enrich_base: String,
    pub enrich_workers: usize,
    pub enrich_queue: usize,
    pub enrich_timeout: Duration,
    pub fetch_timeout: Duration,
    pub ui_fps: u64,
    pub log_enabled: bool,
    pub log_level: String,
    pub log_file: String,
}

impl Config {
    fn with_path(config_path: PathBuf) -> Self {
        Self {
            config_path,
            url: None,
            interval_secs: None,
            settings_file: PathBuf::from(DEFAULT_SETTINGS_FILE),
            airlines_file: PathBuf::from(DEFAULT_AIRLINES_FILE),
            routes_file: PathBuf::from(DEFAULT_ROUTES_FILE),
            enrich_enabled: true,
            enrich_base: DEFAULT_ENRICH_BASE.to_string(),
            enrich_workers: DEFAULT_ENRICH_WORKERS,
            enrich_queue: DEFAULT_ENRICH_QUEUE,
            enrich_timeout: Duration::from_secs(DEFAULT_ENRICH_TIMEOUT_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            ui_fps: DEFAULT_UI_FPS,
            log_enabled: false,
            log_level: "info".to_string(),
            log_file: DEFAULT_LOG_FILE.to_string(),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.ui_fps.clamp(1, 60))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    settings_file: Option<String>,
    airlines_file: Option<String>,
    routes_file: Option<String>,
    enrich_enabled: Option<bool>,
    enrich_base: Option<String>,
    enrich_workers: Option<usize>,
    enrich_queue: Option<usize>,
    enrich_timeout_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    ui_fps: Option<u64>,
    log_enabled: Option<bool>,
    log_level: Option<String>,
    log_file: Option<String>,
}

pub fn parse_args() -> Result<Config> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_from(&args, |key| env::var(key).ok())
}

/// Defaults, then the TOML file, then `FLIGHT_TRACKER_*` variables, then flags.
fn parse_from(args: &[String], lookup_env: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let var = |name: &str| lookup_env(&format!("{ENV_PREFIX}{name}"));

    let mut explicit_config: Option<PathBuf> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("--config needs a value"))?;
            explicit_config = Some(PathBuf::from(value));
        }
    }
    let explicit = explicit_config.is_some() || var("CONFIG").is_some();
    let config_path = explicit_config
        .or_else(|| var("CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config = Config::with_path(config_path.clone());
    if config_path.exists() {
        let file_config = load_file_config(&config_path)?;
        apply_file_config(&mut config, file_config);
    } else if explicit {
        return Err(anyhow!("Config file not found: {}", config_path.display()));
    }

    if let Some(url) = var("URL") {
        config.url = Some(url);
    }
    if let Some(value) = var("INTERVAL") {
        if let Ok(secs) = settings::parse_interval(&value) {
            config.interval_secs = Some(secs);
        }
    }
    if let Some(value) = var("SETTINGS") {
        config.settings_file = PathBuf::from(value);
    }
    if let Some(value) = var("AIRLINES") {
        config.airlines_file = PathBuf::from(value);
    }
    if let Some(value) = var("ROUTES") {
        config.routes_file = PathBuf::from(value);
    }
    if let Some(value) = var("ENRICH") {
        config.enrich_enabled = truthy(&value);
    }
    if let Some(value) = var("ENRICH_BASE") {
        config.enrich_base = value;
    }
    if let Some(value) = var("ENRICH_WORKERS") {
        if let Ok(val) = value.parse::<usize>() {
            config.enrich_workers = val.max(1);
        }
    }
    if let Some(value) = var("ENRICH_QUEUE") {
        if let Ok(val) = value.parse::<usize>() {
            config.enrich_queue = val.max(1);
        }
    }
    if let Some(value) = var("UI_FPS") {
        if let Ok(val) = value.parse::<u64>() {
            config.ui_fps = val.clamp(1, 60);
        }
    }
    if let Some(value) = var("LOG_ENABLED") {
        config.log_enabled = truthy(&value);
    }
    if let Some(value) = var("LOG_LEVEL") {
        config.log_level = value;
    }
    if let Some(value) = var("LOG_FILE") {
        config.log_file = value;
    }

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value_for = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{name} needs a value"))
        };
        match arg.as_str() {
            "--config" => {
                value_for("--config")?;
            }
            "--url" => {
                let value = value_for("--url")?;
                let url = settings::parse_url(&value).map_err(|err| anyhow!("--url: {err}"))?;
                config.url = Some(url);
            }
            "--interval" => {
                let value = value_for("--interval")?;
                let secs =
                    settings::parse_interval(&value).map_err(|err| anyhow!("--interval: {err}"))?;
                config.interval_secs = Some(secs);
            }
            "--settings" => config.settings_file = PathBuf::from(value_for("--settings")?),
            "--airlines" => config.airlines_file = PathBuf::from(value_for("--airlines")?),
            "--routes" => config.routes_file = PathBuf::from(value_for("--routes")?),
            "--no-enrich" => config.enrich_enabled = false,
            "--workers" => {
                config.enrich_workers = value_for("--workers")?.parse::<usize>()?.max(1);
            }
            "--ui-fps" => {
                config.ui_fps = value_for("--ui-fps")?.parse::<u64>()?.clamp(1, 60);
            }
            "--log" => config.log_enabled = true,
            "--no-log" => config.log_enabled = false,
            "--log-level" => {
                config.log_level = value_for("--log-level")?;
                config.log_enabled = true;
            }
            "--log-file" => {
                config.log_file = value_for("--log-file")?;
                config.log_enabled = true;
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                return Err(anyhow!("Unknown argument: {other}"));
            }
        }
    }

    Ok(config)
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

fn apply_file_config(target: &mut Config, file: FileConfig) {
    if let Some(path) = file.settings_file {
        target.settings_file = PathBuf::from(path);
    }
    if let Some(path) = file.airlines_file {
        target.airlines_file = PathBuf::from(path);
    }
    if let Some(path) = file.routes_file {
        target.routes_file = PathBuf::from(path);
    }
    if let Some(enabled) = file.enrich_enabled {
        target.enrich_enabled = enabled;
    }
    if let Some(base) = file.enrich_base {
        target.enrich_base = base;
    }
    if let Some(workers) = file.enrich_workers {
        target.enrich_workers = workers.max(1);
    }
    if let Some(queue) = file.enrich_queue {
        target.enrich_queue = queue.max(1);
    }
    if let Some(secs) = file.enrich_timeout_secs {
        target.enrich_timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(secs) = file.fetch_timeout_secs {
        target.fetch_timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(fps) = file.ui_fps {
        target.ui_fps = fps.clamp(1, 60);
    }
    if let Some(enabled) = file.log_enabled {
        target.log_enabled = enabled;
    }
    if let Some(level) = file.log_level {
        target.log_level = level;
    }
    if let Some(path) = file.log_file {
        target.log_file = path;
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn print_help() {
    println!("flight-tracker");
    println!("Usage: flight-tracker [--url URL] [--interval SECONDS] [--config PATH]");
    println!("       [--settings PATH] [--airlines PATH] [--routes PATH]");
    println!("       [--no-enrich] [--workers N] [--ui-fps FPS]");
    println!("       [--log] [--no-log] [--log-level LEVEL] [--log-file PATH]");
    println!("--url and --interval apply to this session only and are not saved.");
    println!("Environment: FLIGHT_TRACKER_CONFIG overrides config path");
    println!("Environment: FLIGHT_TRACKER_URL / FLIGHT_TRACKER_INTERVAL override the source");
    println!("Environment: FLIGHT_TRACKER_SETTINGS/AIRLINES/ROUTES set file paths");
    println!("Environment: FLIGHT_TRACKER_ENRICH=0 disables route lookups");
    println!("Environment: FLIGHT_TRACKER_ENRICH_BASE/WORKERS/QUEUE tune route lookups");
    println!("Environment: FLIGHT_TRACKER_UI_FPS sets the redraw rate");
    println!("Environment: FLIGHT_TRACKER_LOG_ENABLED/LEVEL/FILE configure logging");
    println!("Keys: h help | i interval | n rows | u url | s sort airlines | q quit");
}
