use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("could not connect to {url}: {reason}")]
    SourceUnavailable { url: String, reason: String },

    #[error("lookup for {callsign} failed: {reason}")]
    Enrichment { callsign: String, reason: String },

    #[error("{0}")]
    InvalidSetting(String),

    #[error("{path}: {reason}")]
    ConfigFile { path: String, reason: String },
}

impl TrackerError {
    pub fn unavailable(url: &str, reason: impl Into<String>) -> Self {
        TrackerError::SourceUnavailable {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn enrichment(callsign: &str, reason: impl Into<String>) -> Self {
        TrackerError::Enrichment {
            callsign: callsign.to_string(),
            reason: reason.into(),
        }
    }
}
