//! Error types for hearthcal.

use thiserror::Error;

use crate::source::SourceId;

/// Errors surfaced by fetch, parse, sync and configuration.
///
/// Messages are shown verbatim to the user by the preview/import surfaces,
/// so they are written as complete sentences.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(
        "Network request failed. This could be a temporary issue, a problem with the CORS proxy, \
         or a network configuration (like a VPN or ad-blocker) blocking the request. ({0})"
    )]
    Network(String),

    #[error("Failed to fetch iCal data. Status: {0}")]
    HttpStatus(u16),

    #[error(
        "The URL did not provide a valid iCal file. It might be an error page or require a login."
    )]
    ErrorPage,

    #[error("Fetched content does not appear to be a valid iCalendar file.")]
    NotCalendar,

    #[error("Failed to parse the iCal file. It might be malformed or invalid: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Calendar source {0} is already being synchronized")]
    InProgress(SourceId),

    #[error("Calendar source {0} not found")]
    SourceNotFound(SourceId),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fetch,
    Format,
    Parse,
    Configuration,
    Conflict,
    NotFound,
    Storage,
}

impl SyncError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Network(_) | SyncError::HttpStatus(_) => FailureKind::Fetch,
            SyncError::ErrorPage | SyncError::NotCalendar => FailureKind::Format,
            SyncError::Parse(_) => FailureKind::Parse,
            SyncError::Configuration(_) => FailureKind::Configuration,
            SyncError::InProgress(_) => FailureKind::Conflict,
            SyncError::SourceNotFound(_) => FailureKind::NotFound,
            SyncError::Store(_) => FailureKind::Storage,
        }
    }
}

/// Errors raised by a [`crate::store::Store`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("No calendar source with id {0}")]
    MissingSource(SourceId),
}

/// Why a single VEVENT was dropped during expansion.
///
/// Never propagated past the expander; see [`crate::expand::SkippedEvent`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("missing SUMMARY")]
    MissingSummary,

    #[error("missing DTSTART")]
    MissingStart,

    #[error("invalid {property} value '{value}'")]
    InvalidValue { property: &'static str, value: String },

    #[error("invalid recurrence rule: {0}")]
    InvalidRule(String),
}

/// Result type alias for hearthcal operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
