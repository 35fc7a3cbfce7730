use anyhow::Result;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

use crate::error::TrackerError;
use crate::model::{Aircraft, ApiResponse};

#[derive(Clone, Debug)]
pub struct PollRequest {
    pub url: String,
}

#[derive(Debug)]
pub struct PollReport {
    pub url: String,
    pub outcome: Result<Vec<Aircraft>, TrackerError>,
    pub at: SystemTime,
}

/// Decides when the next fetch is due. Owned by the foreground loop, which
/// passes the current interval on every check.
#[derive(Debug, Default)]
pub struct PollSchedule {
    last_request: Option<Instant>,
    in_flight: bool,
}

impl PollSchedule {
    pub fn due(&self, now: Instant, interval: Duration) -> bool {
        if self.in_flight {
            return false;
        }
        match self.last_request {
            Some(last) => now.saturating_duration_since(last) >= interval,
            None => true,
        }
    }

    pub fn mark_requested(&mut self, now: Instant) {
        self.last_request = Some(now);
        self.in_flight = true;
    }

    pub fn mark_completed(&mut self) {
        self.in_flight = false;
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Runs blocking fetches on a dedicated thread so a slow receiver never
/// stalls the keyboard. Exits when either channel end is dropped.
pub fn spawn_poller(
    timeout: Duration,
    rx: Receiver<PollRequest>,
    tx: Sender<PollReport>,
) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    thread::Builder::new()
        .name("poller".to_string())
        .spawn(move || {
            info!("poller started");
            while let Ok(request) = rx.recv() {
                let outcome = fetch(&client, &request.url);
                match &outcome {
                    Ok(aircraft) => debug!("fetched {} aircraft", aircraft.len()),
                    Err(err) => warn!("{err}"),
                }
                let report = PollReport {
                    url: request.url,
                    outcome,
                    at: SystemTime::now(),
                };
                if tx.send(report).is_err() {
                    debug!("receiver dropped, exiting poller");
                    break;
                }
            }
        })?;
    Ok(())
}

pub fn fetch(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<Aircraft>, TrackerError> {
    let resp = client
        .get(url)
        .send()
        .map_err(|err| TrackerError::unavailable(url, err.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(TrackerError::unavailable(url, format!("HTTP {status}")));
    }
    resp.json::<ApiResponse>()
        .map(|data| data.aircraft)
        .map_err(|err| TrackerError::unavailable(url, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::PollSchedule;
    use std::time::{Duration, Instant};

    #[test]
    fn first_poll_is_due_immediately() {
        let schedule = PollSchedule::default();
        assert!(schedule.due(Instant::now(), Duration::from_secs(5)));
    }

    #[test]
    fn waits_for_interval_and_in_flight() {
        let start = Instant::now();
        let mut schedule = PollSchedule::default();
        schedule.mark_requested(start);
        assert!(schedule.in_flight());
        assert!(!schedule.due(start + Duration::from_secs(10), Duration::from_secs(5)));

        schedule.mark_completed();
        assert!(!schedule.due(start + Duration::from_secs(4), Duration::from_secs(5)));
        assert!(schedule.due(start + Duration::from_secs(5), Duration::from_secs(5)));
    }

    #[test]
    fn interval_change_applies_to_next_check() {
        let start = Instant::now();
        let mut schedule = PollSchedule::default();
        schedule.mark_requested(start);
        schedule.mark_completed();
        let later = start + Duration::from_secs(2);
        assert!(!schedule.due(later, Duration::from_secs(30)));
        assert!(schedule.due(later, Duration::from_secs(1)));
    }
}
