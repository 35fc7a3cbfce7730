mod app;
mod config;
mod enrich;
mod error;
mod flags;
mod geo;
mod input;
mod logging;
mod model;
mod net;
mod rank;
mod runtime;
mod settings;
mod storage;
mod ui;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use app::{App, SessionOverrides};
use config::parse_args;
use enrich::{spawn_workers, AdsbdbClient, EnrichmentFiles, EnrichmentStore};
use logging::init as init_logging;
use net::spawn_poller;
use runtime::{run_app, PollChannels, TerminalGuard};
use settings::{Settings, SettingsStore};
use storage::{load_airlines, load_routes};

fn main() -> Result<()> {
    let config = parse_args()?;
    let _log_guard = init_logging(&config);
    info!("flight-tracker starting");
    debug!("config path: {}", config.config_path.display());

    let settings_store = SettingsStore::new(config.settings_file.clone());
    let settings = settings_store.load(Settings::default());

    let airlines = load_table("airlines", &config.airlines_file, load_airlines);
    let routes = load_table("routes", &config.routes_file, load_routes);
    let files = EnrichmentFiles {
        airlines: Some(config.airlines_file.clone()),
        routes: Some(config.routes_file.clone()),
    };

    let store = if config.enrich_enabled {
        let (job_tx, job_rx) = crossbeam_channel::bounded(config.enrich_queue);
        let store = Arc::new(EnrichmentStore::new(routes, airlines, files, Some(job_tx)));
        let client = AdsbdbClient::new(&config.enrich_base, config.enrich_timeout)
            .context("Failed to build enrichment client")?;
        spawn_workers(
            Arc::clone(&store),
            Arc::new(client),
            job_rx,
            config.enrich_workers,
        );
        store
    } else {
        info!("route lookups disabled");
        Arc::new(EnrichmentStore::new(routes, airlines, files, None))
    };

    let (req_tx, req_rx) = mpsc::channel();
    let (res_tx, res_rx) = mpsc::channel();
    spawn_poller(config.fetch_timeout, req_rx, res_tx).context("Failed to start poller")?;

    let overrides = SessionOverrides {
        url: config.url.clone(),
        interval_secs: config.interval_secs,
    };
    let app = App::new(settings, settings_store, overrides, store);

    let mut guard = TerminalGuard::acquire().context("Failed to set up the terminal")?;
    let res = run_app(
        guard.terminal_mut(),
        app,
        PollChannels { req_tx, res_rx },
        config.frame_interval(),
    );
    drop(guard);

    if let Err(err) = res {
        warn!("runtime error: {err:#}");
        eprintln!("{err:#}");
    }

    info!("flight-tracker exited");
    Ok(())
}

fn load_table(
    kind: &str,
    path: &Path,
    load: fn(&Path) -> Result<HashMap<String, String>>,
) -> HashMap<String, String> {
    match load(path) {
        Ok(table) if table.is_empty() && !path.exists() => {
            warn!("{} not found, {kind} lookups start empty", path.display());
            table
        }
        Ok(table) => {
            info!("Loaded {} {kind} from {}", table.len(), path.display());
            table
        }
        Err(err) => {
            warn!("{err:#}");
            HashMap::new()
        }
    }
}
