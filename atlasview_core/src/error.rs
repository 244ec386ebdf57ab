//! Error taxonomy for the layer engine.
//!
//! None of these are fatal to a running viewer: resolution errors drop one
//! descriptor, construction errors abort one activation, clock errors leave
//! the clock untouched.

use atlasview_env::EnvError;
use thiserror::Error;

/// Manifest or descriptor fetch/parse failure.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: EnvError,
    },

    #[error("Malformed document at {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Cannot resolve '{reference}' against {base}: {reason}")]
    BadUrl {
        base: String,
        reference: String,
        reason: String,
    },

    #[error("Duplicate layer key in manifest: {0}")]
    DuplicateKey(String),
}

/// Loader factory failure or missing mandatory field.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("Layer {key}: missing mandatory field '{field}'")]
    MissingField { key: String, field: &'static str },

    #[error("Layer {key}: failed to fetch {url}: {source}")]
    Fetch {
        key: String,
        url: String,
        #[source]
        source: EnvError,
    },

    #[error("Layer {key}: invalid {what}: {reason}")]
    Invalid {
        key: String,
        what: &'static str,
        reason: String,
    },
}

impl ConstructionError {
    pub(crate) fn missing(key: &str, field: &'static str) -> Self {
        Self::MissingField {
            key: key.to_string(),
            field,
        }
    }

    pub(crate) fn invalid(key: &str, what: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Invalid {
            key: key.to_string(),
            what,
            reason: reason.to_string(),
        }
    }
}

/// Malformed clock configuration; the clock is left unchanged.
#[derive(Debug, Error)]
pub enum ClockApplyError {
    #[error("Invalid {field} timestamp '{value}': {reason}")]
    BadTimestamp {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Stop time {stop} precedes start time {start}")]
    InvertedRange { start: String, stop: String },
}

/// ISO-8601 interval or duration parsing failure.
#[derive(Debug, Error, PartialEq)]
pub enum IntervalError {
    #[error("Invalid ISO-8601 date '{0}'")]
    BadDate(String),

    #[error("Invalid ISO-8601 duration '{0}'")]
    BadDuration(String),

    #[error("Invalid ISO-8601 interval '{0}'")]
    BadInterval(String),

    #[error("Interval expands to more than {limit} dates")]
    TooManyIntervals { limit: usize },
}
