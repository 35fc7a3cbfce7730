use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::enrich::EnrichmentStore;
use crate::geo::Observer;
use crate::input::{Action, InputMachine, InputState, Key};
use crate::model::Aircraft;
use crate::net::PollReport;
use crate::rank::{self, BoardRow};
use crate::settings::{ColumnStyles, Field, Settings, SettingsStore};
use crate::storage::SortOutcome;

pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub text: String,
    pub kind: NoticeKind,
    pub expires_at: Instant,
}

impl Notification {
    pub fn new(text: impl Into<String>, kind: NoticeKind, now: Instant) -> Self {
        Self {
            text: text.into(),
            kind,
            expires_at: now + NOTIFICATION_TTL,
        }
    }

    pub fn is_active(&self, now: Instant) -> bool {
        now <= self.expires_at
    }
}

/// Values given on the command line. They win over the settings file for this
/// run only and are never written back.
#[derive(Clone, Debug, Default)]
pub struct SessionOverrides {
    pub url: Option<String>,
    pub interval_secs: Option<u64>,
}

#[derive(Debug)]
enum Feed {
    Waiting,
    Aircraft(Vec<Aircraft>),
    Unavailable { url: String },
}

/// What the table area shows.
#[derive(Clone, Debug, PartialEq)]
pub enum TableView {
    Waiting,
    Empty,
    Unavailable { url: String },
    Rows(Vec<BoardRow>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct HelpView {
    pub updated: Option<SystemTime>,
    pub interval_secs: u64,
    pub rows: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditorView {
    pub title: &'static str,
    pub text: String,
}

/// Everything the draw pass needs, built fresh each frame.
#[derive(Clone, Debug)]
pub struct FrameModel {
    pub title: String,
    pub source: String,
    pub table: TableView,
    pub styles: ColumnStyles,
    pub help: Option<HelpView>,
    pub notification: Option<(String, NoticeKind)>,
    pub editor: Option<EditorView>,
    /// Callsigns on screen that still lack a route or airline.
    pub missing: Vec<String>,
}

pub struct App {
    settings: Settings,
    settings_store: SettingsStore,
    overrides: SessionOverrides,
    feed: Feed,
    last_update: Option<SystemTime>,
    show_help: bool,
    notification: Option<Notification>,
    input: InputMachine,
    enrichment: Arc<EnrichmentStore>,
    /// Set by each applied poll, cleared once its misses are dispatched.
    enrich_due: bool,
}

impl App {
    pub fn new(
        settings: Settings,
        settings_store: SettingsStore,
        overrides: SessionOverrides,
        enrichment: Arc<EnrichmentStore>,
    ) -> Self {
        Self {
            settings,
            settings_store,
            overrides,
            feed: Feed::Waiting,
            last_update: None,
            show_help: true,
            notification: None,
            input: InputMachine::default(),
            enrichment,
            enrich_due: false,
        }
    }

    pub fn url(&self) -> &str {
        self.overrides.url.as_deref().unwrap_or(&self.settings.url)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.overrides.interval_secs.unwrap_or(self.settings.interval_secs))
    }

    pub fn observer(&self) -> Observer {
        Observer {
            lat: self.settings.location_lat,
            lon: self.settings.location_lon,
        }
    }

    pub fn apply_poll(&mut self, report: PollReport) {
        if report.url != self.url() {
            debug!("dropping result for previous source {}", report.url);
            return;
        }
        match report.outcome {
            Ok(aircraft) => {
                debug!(
                    "apply_poll aircraft={} store={:?}",
                    aircraft.len(),
                    self.enrichment.stats()
                );
                self.feed = Feed::Aircraft(aircraft);
                self.enrich_due = true;
            }
            Err(err) => {
                warn!("apply_poll: {err}");
                self.feed = Feed::Unavailable { url: report.url };
            }
        }
        self.last_update = Some(report.at);
    }

    /// Feeds one keystroke through the input machine. Returns `false` when the
    /// board should close.
    pub fn handle_key(&mut self, key: Key, now: Instant) -> bool {
        match self.input.handle(key) {
            Action::None => {}
            Action::Quit => {
                info!("quit requested");
                return false;
            }
            Action::ToggleHelp => self.show_help = !self.show_help,
            Action::SortAirlines => self.sort_airlines(now),
            Action::Commit { field, value } => self.commit_edit(field, &value, now),
        }
        true
    }

    fn commit_edit(&mut self, field: Field, raw: &str, now: Instant) {
        let mut next = self.settings.clone();
        match next.commit(field, raw) {
            Ok(message) => {
                self.settings = next;
                match field {
                    Field::Url => self.overrides.url = None,
                    Field::Interval => self.overrides.interval_secs = None,
                    Field::Rows => {}
                }
                match self.settings_store.save(&self.settings) {
                    Ok(()) => {
                        info!("{message}, saved to {}", self.settings_store.path().display());
                        self.notify(message, NoticeKind::Info, now);
                    }
                    Err(err) => {
                        warn!("{err:#}");
                        self.notify(
                            format!("{message} (not saved: {err})"),
                            NoticeKind::Error,
                            now,
                        );
                    }
                }
            }
            Err(err) => {
                debug!("rejected {field:?} edit: {err}");
                self.notify(err.to_string(), NoticeKind::Error, now);
            }
        }
    }

    fn sort_airlines(&mut self, now: Instant) {
        let name = self
            .enrichment
            .airlines_path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "airlines.txt".to_string());
        match self.enrichment.sort_and_reload_airlines() {
            Ok(SortOutcome::Sorted(count)) => {
                info!("sorted {count} airlines");
                self.notify(format!("{name} sorted and reloaded."), NoticeKind::Info, now);
            }
            Ok(SortOutcome::Missing) => {
                self.notify(format!("{name} not found."), NoticeKind::Error, now);
            }
            Err(err) => {
                warn!("{err:#}");
                self.notify(format!("Error sorting {name}: {err}"), NoticeKind::Error, now);
            }
        }
    }

    pub fn notify(&mut self, text: impl Into<String>, kind: NoticeKind, now: Instant) {
        self.notification = Some(Notification::new(text, kind, now));
    }

    pub fn active_notification(&self, now: Instant) -> Option<&Notification> {
        self.notification.as_ref().filter(|n| n.is_active(now))
    }

    /// Builds the view model for one redraw. Does not touch the network or
    /// the enrichment queue.
    pub fn frame(&self, now: Instant) -> FrameModel {
        let mut missing = Vec::new();
        let table = match &self.feed {
            Feed::Waiting => TableView::Waiting,
            Feed::Unavailable { url } => TableView::Unavailable { url: url.clone() },
            Feed::Aircraft(list) if list.is_empty() => TableView::Empty,
            Feed::Aircraft(list) => {
                let derived =
                    rank::derive_rows(list, self.observer(), self.settings.rows, &self.enrichment);
                missing = derived.missing;
                TableView::Rows(derived.rows)
            }
        };

        let help = self.show_help.then(|| HelpView {
            updated: self.last_update,
            interval_secs: self.interval().as_secs(),
            rows: self.settings.rows,
        });

        let editor = match self.input.state() {
            InputState::Idle => None,
            InputState::Editing { field, buffer } => Some(EditorView {
                title: field.prompt(),
                text: format!("{buffer}█"),
            }),
        };

        FrameModel {
            title: format!("Flight Tracker: {}", self.settings.location_name),
            source: self.url().to_string(),
            table,
            styles: self.settings.styles.clone(),
            help,
            notification: self
                .active_notification(now)
                .map(|n| (n.text.clone(), n.kind)),
            editor,
            missing,
        }
    }

    /// Queues lookups for the callsigns a frame reported as missing, at most
    /// once per applied poll.
    pub fn request_enrichment(&mut self, missing: &[String]) -> usize {
        if !std::mem::take(&mut self.enrich_due) {
            return 0;
        }
        missing
            .iter()
            .filter(|callsign| self.enrichment.ensure_enriched(callsign))
            .count()
    }
}
