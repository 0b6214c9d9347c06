//! Exports benchmark rate tables from a web application and mirrors them
//! into tabs of a shared spreadsheet.
//!
//! The two core pieces are independent of the browser:
//! [`watcher`] waits for a finished download and [`sheets`] writes a
//! [`models::Dataset`] into a remote tab. [`scraper`] wires both to a
//! WebDriver session.

pub mod config;
pub mod error;
pub mod models;
pub mod reader;
pub mod scraper;
pub mod sheets;
pub mod watcher;

pub use error::{ServiceError, SessionError, SourceError, SyncError, WatchError};
pub use models::{Cell, Dataset};
pub use sheets::{SheetSyncer, SyncMode, SyncTarget};
pub use watcher::{ExportJob, WatchRules};
