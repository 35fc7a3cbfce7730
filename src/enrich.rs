use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::TrackerError;
use crate::storage::{self, SortOutcome};

/// Key used for every route/pending lookup: trimmed and upper-cased.
pub fn canonical_callsign(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LookupResult {
    pub route: Option<(String, String)>,
    pub airline: Option<(String, String)>,
}

pub trait RouteLookup: Send + Sync {
    fn lookup(&self, callsign: &str) -> Result<LookupResult, TrackerError>;
}

/// Client for the adsbdb.com callsign endpoint.
pub struct AdsbdbClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl AdsbdbClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl RouteLookup for AdsbdbClient {
    fn lookup(&self, callsign: &str) -> Result<LookupResult, TrackerError> {
        let url = format!("{}/v0/callsign/{}", self.base_url, callsign);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|err| TrackerError::enrichment(callsign, err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TrackerError::enrichment(callsign, format!("HTTP {status}")));
        }
        let body: Value = resp
            .json()
            .map_err(|err| TrackerError::enrichment(callsign, err.to_string()))?;
        Ok(parse_flightroute(&body))
    }
}

pub fn parse_flightroute(body: &Value) -> LookupResult {
    let text = |pointer: &str| {
        body.pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let route = match (
        text("/response/flightroute/origin/iata_code"),
        text("/response/flightroute/destination/iata_code"),
    ) {
        (Some(origin), Some(dest)) => Some((origin, dest)),
        _ => None,
    };
    let airline = match (
        text("/response/flightroute/airline/icao"),
        text("/response/flightroute/airline/name"),
    ) {
        (Some(icao), Some(name)) => Some((icao.to_ascii_uppercase(), name)),
        _ => None,
    };

    LookupResult { route, airline }
}

/// Where newly learned entries are appended. `None` keeps them in memory only.
#[derive(Clone, Debug, Default)]
pub struct EnrichmentFiles {
    pub airlines: Option<PathBuf>,
    pub routes: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub routes: usize,
    pub airlines: usize,
    pub pending: usize,
}

/// Shared route/airline tables plus the set of callsigns with a lookup in
/// flight. Readers never wait on the network or the disk; the file lock
/// serialises workers' commits with the airline sort/reload.
pub struct EnrichmentStore {
    routes: RwLock<HashMap<String, String>>,
    airlines: RwLock<HashMap<String, String>>,
    pending: Mutex<HashSet<String>>,
    files: EnrichmentFiles,
    file_lock: Mutex<()>,
    jobs: Option<Sender<String>>,
}

impl EnrichmentStore {
    pub fn new(
        routes: HashMap<String, String>,
        airlines: HashMap<String, String>,
        files: EnrichmentFiles,
        jobs: Option<Sender<String>>,
    ) -> Self {
        Self {
            routes: RwLock::new(routes),
            airlines: RwLock::new(airlines),
            pending: Mutex::new(HashSet::new()),
            files,
            file_lock: Mutex::new(()),
            jobs,
        }
    }

    pub fn route_for(&self, callsign: &str) -> Option<String> {
        let key = canonical_callsign(callsign);
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
    }

    /// Airline name for the ICAO designator in the first three characters.
    pub fn airline_for(&self, callsign: &str) -> Option<String> {
        let key = canonical_callsign(callsign);
        let prefix: String = key.chars().take(3).collect();
        if prefix.chars().count() < 3 {
            return None;
        }
        self.airlines
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&prefix)
            .cloned()
    }

    pub fn airlines_path(&self) -> Option<&Path> {
        self.files.airlines.as_deref()
    }

    #[cfg(test)]
    pub fn is_pending(&self, callsign: &str) -> bool {
        self.pending().contains(&canonical_callsign(callsign))
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            routes: self.routes.read().unwrap_or_else(|e| e.into_inner()).len(),
            airlines: self.airlines.read().unwrap_or_else(|e| e.into_inner()).len(),
            pending: self.pending().len(),
        }
    }

    /// Queues a lookup when nothing is known about `callsign` and none is in
    /// flight. Returns whether a job was queued.
    pub fn ensure_enriched(&self, callsign: &str) -> bool {
        let key = canonical_callsign(callsign);
        if key.is_empty() {
            return false;
        }
        let Some(jobs) = &self.jobs else {
            return false;
        };
        if self.route_for(&key).is_some() || self.airline_for(&key).is_some() {
            return false;
        }
        if !self.pending().insert(key.clone()) {
            return false;
        }
        match jobs.try_send(key.clone()) {
            Ok(()) => {
                debug!("enrichment queued for {key}");
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("enrichment queue full, {key} deferred");
                self.release(&key);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("enrichment workers gone, {key} dropped");
                self.release(&key);
                false
            }
        }
    }

    /// Records a lookup result. Known routes and airline codes are left as
    /// they are; only new entries are appended to disk. Insert and append
    /// happen under the file lock so a concurrent sort/reload sees both or
    /// neither.
    pub fn commit(&self, callsign: &str, result: LookupResult) {
        let key = canonical_callsign(callsign);
        let _io = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some((origin, dest)) = result.route {
            let inserted = {
                let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
                if routes.contains_key(&key) {
                    false
                } else {
                    routes.insert(key.clone(), format!("{origin}/{dest}"));
                    true
                }
            };
            if inserted {
                debug!("route {key} {origin}/{dest}");
                if let Some(path) = &self.files.routes {
                    if let Err(err) = storage::append_route(path, &key, &origin, &dest) {
                        warn!("route append failed: {err:#}");
                    }
                }
            }
        }

        if let Some((code, name)) = result.airline {
            let inserted = {
                let mut airlines = self.airlines.write().unwrap_or_else(|e| e.into_inner());
                if airlines.contains_key(&code) {
                    false
                } else {
                    airlines.insert(code.clone(), name.clone());
                    true
                }
            };
            if inserted {
                debug!("airline {code} {name}");
                if let Some(path) = &self.files.airlines {
                    if let Err(err) = storage::append_airline(path, &code, &name) {
                        warn!("airline append failed: {err:#}");
                    }
                }
            }
        }
    }

    /// Sorts the airline file by code and reloads the in-memory table from it.
    pub fn sort_and_reload_airlines(&self) -> Result<SortOutcome> {
        let Some(path) = &self.files.airlines else {
            return Ok(SortOutcome::Missing);
        };
        let _io = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());
        let outcome = storage::sort_airline_file(path)?;
        if outcome != SortOutcome::Missing {
            let loaded = storage::load_airlines(path)?;
            *self.airlines.write().unwrap_or_else(|e| e.into_inner()) = loaded;
        }
        Ok(outcome)
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, key: &str) {
        self.pending().remove(key);
    }
}

/// Drops the callsign from the pending set however the job ends.
struct PendingGuard<'a> {
    store: &'a EnrichmentStore,
    key: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.store.release(self.key);
    }
}

fn run_job(store: &EnrichmentStore, lookup: &dyn RouteLookup, callsign: &str) {
    let _pending = PendingGuard {
        store,
        key: callsign,
    };
    match lookup.lookup(callsign) {
        Ok(result) => store.commit(callsign, result),
        Err(err) => debug!("{err}"),
    }
}

/// Starts `workers` threads draining the job queue. Threads are detached and
/// exit when every sender is dropped.
pub fn spawn_workers(
    store: Arc<EnrichmentStore>,
    lookup: Arc<dyn RouteLookup>,
    jobs: Receiver<String>,
    workers: usize,
) {
    let workers = workers.max(1);
    for id in 0..workers {
        let store = Arc::clone(&store);
        let lookup = Arc::clone(&lookup);
        let jobs = jobs.clone();
        let spawned = thread::Builder::new()
            .name(format!("enrich-{id}"))
            .spawn(move || {
                while let Ok(callsign) = jobs.recv() {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        run_job(&store, lookup.as_ref(), &callsign)
                    }));
                    if outcome.is_err() {
                        warn!("enrichment job for {callsign} panicked");
                    }
                }
                debug!("enrichment worker {id} stopped");
            });
        if let Err(err) = spawned {
            warn!("failed to start enrichment worker {id}: {err}");
        }
    }
    info!("enrichment pool started with {workers} workers");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct FixedLookup(LookupResult);

    impl RouteLookup for FixedLookup {
        fn lookup(&self, _callsign: &str) -> Result<LookupResult, TrackerError> {
            Ok(self.0.clone())
        }
    }

    struct FailingLookup;

    impl RouteLookup for FailingLookup {
        fn lookup(&self, callsign: &str) -> Result<LookupResult, TrackerError> {
            Err(TrackerError::enrichment(callsign, "HTTP 404 Not Found"))
        }
    }

    struct CountingLookup(AtomicUsize);

    impl RouteLookup for CountingLookup {
        fn lookup(&self, _callsign: &str) -> Result<LookupResult, TrackerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(LookupResult::default())
        }
    }

    fn temp_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        dir.push(format!("flight-tracker-enrich-{suffix}"));
        let _ = fs::create_dir_all(&dir);
        dir
    }

    fn store_with_queue(cap: usize) -> (EnrichmentStore, Receiver<String>) {
        let (tx, rx) = crossbeam_channel::bounded(cap);
        let store = EnrichmentStore::new(
            HashMap::new(),
            HashMap::new(),
            EnrichmentFiles::default(),
            Some(tx),
        );
        (store, rx)
    }

    fn ezy_result() -> LookupResult {
        LookupResult {
            route: Some(("BRS".to_string(), "AMS".to_string())),
            airline: Some(("EZY".to_string(), "easyJet".to_string())),
        }
    }

    #[test]
    fn parse_full_flightroute() {
        let body = json!({
            "response": {
                "flightroute": {
                    "callsign": "EZY12AB",
                    "airline": { "name": "easyJet", "icao": "ezy", "iata": "U2" },
                    "origin": { "iata_code": "BRS", "name": "Bristol" },
                    "destination": { "iata_code": "AMS", "name": "Schiphol" }
                }
            }
        });
        assert_eq!(parse_flightroute(&body), ezy_result());
    }

    #[test]
    fn parse_partial_or_unknown_flightroute() {
        let no_airline = json!({
            "response": { "flightroute": {
                "origin": { "iata_code": "BRS" },
                "destination": { "iata_code": "AMS" }
            }}
        });
        let parsed = parse_flightroute(&no_airline);
        assert!(parsed.route.is_some());
        assert!(parsed.airline.is_none());

        let unknown = json!({ "response": "unknown callsign" });
        assert_eq!(parse_flightroute(&unknown), LookupResult::default());

        let half_route = json!({
            "response": { "flightroute": { "origin": { "iata_code": "BRS" } } }
        });
        assert!(parse_flightroute(&half_route).route.is_none());
    }

    #[test]
    fn concurrent_ensure_enriched_queues_once() {
        let (store, rx) = store_with_queue(16);
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.ensure_enriched("EZY12AB")
                })
            })
            .collect();
        let queued = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|queued| *queued)
            .count();
        assert_eq!(queued, 1);
        assert_eq!(rx.len(), 1);
        assert!(store.is_pending("EZY12AB"));
    }

    #[test]
    fn callsign_case_is_one_key() {
        let (store, rx) = store_with_queue(16);
        assert!(store.ensure_enriched("ezy12ab "));
        assert!(!store.ensure_enriched("EZY12AB"));
        assert_eq!(rx.try_recv().unwrap(), "EZY12AB");
    }

    #[test]
    fn known_callsigns_are_not_looked_up() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut routes = HashMap::new();
        routes.insert("RYR8LB".to_string(), "DUB/BRS".to_string());
        let mut airlines = HashMap::new();
        airlines.insert("BAW".to_string(), "British Airways".to_string());
        let store = EnrichmentStore::new(routes, airlines, EnrichmentFiles::default(), Some(tx));

        assert!(!store.ensure_enriched("RYR8LB"));
        assert!(!store.ensure_enriched("BAW123"));
        assert!(!store.ensure_enriched("   "));
        assert!(rx.is_empty());
        assert_eq!(store.route_for("ryr8lb").as_deref(), Some("DUB/BRS"));
        assert_eq!(store.airline_for("baw123").as_deref(), Some("British Airways"));
        assert_eq!(store.airline_for("BA"), None);
    }

    #[test]
    fn full_queue_releases_pending() {
        let (store, rx) = store_with_queue(1);
        assert!(store.ensure_enriched("EZY1"));
        assert!(!store.ensure_enriched("EZY2"));
        assert!(!store.is_pending("EZY2"));
        rx.try_recv().unwrap();
        assert!(store.ensure_enriched("EZY2"));
    }

    #[test]
    fn job_commits_and_releases() {
        let dir = temp_dir();
        let files = EnrichmentFiles {
            airlines: Some(dir.join("airlines.txt")),
            routes: Some(dir.join("routes.txt")),
        };
        let (tx, _rx) = crossbeam_channel::bounded(4);
        let store = EnrichmentStore::new(HashMap::new(), HashMap::new(), files, Some(tx));
        assert!(store.ensure_enriched("EZY12AB"));

        run_job(&store, &FixedLookup(ezy_result()), "EZY12AB");

        assert!(!store.is_pending("EZY12AB"));
        assert_eq!(store.route_for("EZY12AB").as_deref(), Some("BRS/AMS"));
        assert_eq!(store.airline_for("EZY99").as_deref(), Some("easyJet"));
        assert_eq!(
            fs::read_to_string(dir.join("routes.txt")).unwrap(),
            "EZY12AB,BRS,AMS\n"
        );

        // A second flight of the same airline must not re-append the airline.
        store.commit(
            "EZY34CD",
            LookupResult {
                route: None,
                airline: Some(("EZY".to_string(), "easyJet Europe".to_string())),
            },
        );
        assert_eq!(
            fs::read_to_string(dir.join("airlines.txt")).unwrap(),
            "EZY,easyJet\n"
        );
        assert_eq!(store.airline_for("EZY34CD").as_deref(), Some("easyJet"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_job_releases_and_allows_retry() {
        let (store, rx) = store_with_queue(4);
        assert!(store.ensure_enriched("XYZ987"));
        let key = rx.try_recv().unwrap();
        run_job(&store, &FailingLookup, &key);
        assert!(!store.is_pending("XYZ987"));
        assert_eq!(store.route_for("XYZ987"), None);
        assert!(store.ensure_enriched("XYZ987"));
    }

    #[test]
    fn worker_pool_drains_queue() {
        let (tx, rx) = crossbeam_channel::bounded(8);
        let store = Arc::new(EnrichmentStore::new(
            HashMap::new(),
            HashMap::new(),
            EnrichmentFiles::default(),
            Some(tx),
        ));
        let lookup = Arc::new(CountingLookup(AtomicUsize::new(0)));
        spawn_workers(Arc::clone(&store), lookup.clone(), rx, 2);

        for cs in ["AAA1", "BBB2", "CCC3"] {
            assert!(store.ensure_enriched(cs));
        }
        for _ in 0..200 {
            if store.stats().pending == 0 && lookup.0.load(Ordering::SeqCst) == 3 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(lookup.0.load(Ordering::SeqCst), 3);
        assert_eq!(store.stats().pending, 0);
    }

    #[test]
    fn commit_during_sort_is_kept() {
        let dir = temp_dir();
        let path = dir.join("airlines.txt");
        let mut content = String::new();
        for n in (0..20_000).rev() {
            content.push_str(&format!("A{n:05},Airline {n}\n"));
        }
        fs::write(&path, content).unwrap();
        let files = EnrichmentFiles {
            airlines: Some(path.clone()),
            routes: None,
        };
        let store = Arc::new(EnrichmentStore::new(
            HashMap::new(),
            HashMap::new(),
            files,
            None,
        ));

        for n in 0..5 {
            let sorter = {
                let store = Arc::clone(&store);
                thread::spawn(move || store.sort_and_reload_airlines().unwrap())
            };
            thread::sleep(Duration::from_micros(300));
            let code = format!("ZZ{n}");
            store.commit(
                "X",
                LookupResult {
                    route: None,
                    airline: Some((code.clone(), "New".to_string())),
                },
            );
            sorter.join().unwrap();
            assert_eq!(
                store.airline_for(&format!("{code}1")).as_deref(),
                Some("New"),
                "{code} lost by concurrent reload"
            );
        }

        let text = fs::read_to_string(&path).unwrap();
        for n in 0..5 {
            let line = format!("ZZ{n},New");
            assert_eq!(text.lines().filter(|l| *l == line).count(), 1);
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn sort_and_reload_replaces_airlines() {
        let dir = temp_dir();
        let path = dir.join("airlines.txt");
        fs::write(&path, "RYR,Ryanair\nBAW,British Airways\n").unwrap();
        let files = EnrichmentFiles {
            airlines: Some(path.clone()),
            routes: None,
        };
        let store = EnrichmentStore::new(HashMap::new(), HashMap::new(), files, None);
        assert_eq!(store.airline_for("RYR1"), None);
        assert_eq!(store.sort_and_reload_airlines().unwrap(), SortOutcome::Sorted(2));
        assert_eq!(store.airline_for("RYR1").as_deref(), Some("Ryanair"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "BAW,British Airways\nRYR,Ryanair\n"
        );
        let _ = fs::remove_dir_all(&dir);
    }
}
