use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single download watch.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("download directory {path:?} is not readable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "no completed download appeared in {directory:?} after {elapsed:?} (observed: [{}])",
        observed.join(", ")
    )]
    TimedOut {
        directory: PathBuf,
        elapsed: Duration,
        observed: Vec<String>,
    },

    #[error(
        "{} downloads in {directory:?} share the latest modification time: [{}]",
        candidates.len(),
        candidates.join(", ")
    )]
    AmbiguousResult {
        directory: PathBuf,
        candidates: Vec<String>,
    },
}

/// Which part of a sync target could not be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Document,
    Tab { available: Vec<String> },
}

/// Failures while reading a downloaded tabular file.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source file {path:?} does not exist")]
    Missing { path: PathBuf },

    #[error("source file {path:?} has unsupported extension")]
    UnsupportedFormat { path: PathBuf },

    #[error("source file {path:?} could not be parsed: {reason}")]
    Parse { path: PathBuf, reason: String },
}

impl SourceError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Missing { path } | Self::UnsupportedFormat { path } | Self::Parse { path, .. } => path,
        }
    }
}

/// Failures of a sheet sync. None of them are retried internally.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("dataset for tab '{tab_title}' has no rows; sync aborted")]
    EmptyDataset { tab_title: String },

    #[error("{}", describe_missing(document_id, tab_title, what))]
    DestinationNotFound {
        document_id: String,
        tab_title: String,
        what: Missing,
    },

    #[error("source unreadable: {0}")]
    SourceUnreadable(#[from] SourceError),

    #[error("spreadsheet service error during {operation} on document '{document_id}': {reason}")]
    SyncTransportError {
        document_id: String,
        operation: &'static str,
        reason: String,
    },
}

fn describe_missing(document_id: &str, tab_title: &str, what: &Missing) -> String {
    match what {
        Missing::Document => format!("document '{}' not found", document_id),
        Missing::Tab { available } => format!(
            "tab '{}' not found in document '{}' (available: {})",
            tab_title,
            document_id,
            available.join(", ")
        ),
    }
}

/// Failures reported by a spreadsheet service implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("document not found")]
    DocumentNotFound,

    #[error("{0}")]
    Transport(String),
}

/// Failures raised by a browser session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not connect to WebDriver at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("none of [{}] became clickable within {timeout:?}", tried.join(", "))]
    NotFound { tried: Vec<String>, timeout: Duration },

    #[error("browser command failed: {0}")]
    Command(String),
}

impl From<thirtyfour::error::WebDriverError> for SessionError {
    fn from(e: thirtyfour::error::WebDriverError) -> Self {
        Self::Command(e.to_string())
    }
}
