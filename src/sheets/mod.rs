//! Mirrors a [`Dataset`] into one tab of a remote spreadsheet.

pub mod auth;
pub mod client;
pub mod memory;

pub use client::GoogleSheetsClient;
pub use memory::MemorySpreadsheet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Missing, ServiceError, SyncError};
use crate::models::{Cell, Dataset};
use crate::reader;

/// Remote document id plus the title of an existing tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub document_id: String,
    pub tab_title: String,
}

impl SyncTarget {
    pub fn new(document_id: impl Into<String>, tab_title: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            tab_title: tab_title.into(),
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/'{}'", self.document_id, self.tab_title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Clear the tab and write the new dataset.
    #[default]
    Replace,
    /// Merge with the tab's rows and drop exact duplicate rows.
    AppendDedupe,
}

/// The operations the syncer needs from a remote spreadsheet.
#[async_trait]
pub trait SpreadsheetService: Send + Sync {
    async fn tab_titles(&self, document_id: &str) -> Result<Vec<String>, ServiceError>;

    /// All populated rows of the tab, header included.
    async fn read_tab(&self, document_id: &str, tab_title: &str) -> Result<Vec<Vec<Cell>>, ServiceError>;

    async fn clear_tab(&self, document_id: &str, tab_title: &str) -> Result<(), ServiceError>;

    /// Writes `values` with its top-left corner at `start_cell` (A1 notation).
    async fn write_block(
        &self,
        document_id: &str,
        tab_title: &str,
        start_cell: &str,
        values: &[Vec<Cell>],
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub rows_before: usize,
    pub rows_written: usize,
    pub duplicates_removed: usize,
}

pub struct SheetSyncer<S> {
    service: S,
}

impl<S: SpreadsheetService> SheetSyncer<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Writes `dataset` into `target`. The tab is owned by this process:
    /// whatever it held before is cleared.
    pub async fn sync(&self, dataset: &Dataset, target: &SyncTarget, mode: SyncMode) -> Result<SyncReport, SyncError> {
        if dataset.is_empty() {
            tracing::warn!(%target, "Dataset is empty, aborting sync");
            return Err(SyncError::EmptyDataset {
                tab_title: target.tab_title.clone(),
            });
        }

        let titles = self
            .service
            .tab_titles(&target.document_id)
            .await
            .map_err(|e| self.service_error(e, target, "open document"))?;

        if !titles.iter().any(|t| t == &target.tab_title) {
            return Err(SyncError::DestinationNotFound {
                document_id: target.document_id.clone(),
                tab_title: target.tab_title.clone(),
                what: Missing::Tab { available: titles },
            });
        }

        let mut report = SyncReport::default();
        let output = match mode {
            SyncMode::Replace => dataset.clone(),
            SyncMode::AppendDedupe => {
                let old = match self.service.read_tab(&target.document_id, &target.tab_title).await {
                    Ok(values) => Dataset::from_values(values),
                    Err(ServiceError::DocumentNotFound) => {
                        return Err(self.service_error(ServiceError::DocumentNotFound, target, "read tab"))
                    }
                    Err(e) => {
                        tracing::warn!(%target, error = %e, "Could not read existing rows, treating tab as empty");
                        Dataset::default()
                    }
                };
                report.rows_before = old.len();

                let mut merged = Dataset::concat(&old, dataset);
                report.duplicates_removed = merged.dedupe();
                merged
            }
        };

        self.service
            .clear_tab(&target.document_id, &target.tab_title)
            .await
            .map_err(|e| self.service_error(e, target, "clear tab"))?;
        tracing::info!(%target, "Tab cleared");

        self.service
            .write_block(&target.document_id, &target.tab_title, "A1", &output.to_values())
            .await
            .map_err(|e| self.service_error(e, target, "write tab"))?;

        report.rows_written = output.len();
        tracing::info!(
            %target,
            ?mode,
            rows = report.rows_written,
            previous = report.rows_before,
            duplicates = report.duplicates_removed,
            "Tab updated"
        );
        Ok(report)
    }

    /// Reads `path` and syncs its rows into `target`.
    pub async fn sync_file(&self, path: &Path, target: &SyncTarget, mode: SyncMode) -> Result<SyncReport, SyncError> {
        let dataset = reader::read_dataset(path)?;
        self.sync(&dataset, target, mode).await
    }

    fn service_error(&self, e: ServiceError, target: &SyncTarget, operation: &'static str) -> SyncError {
        match e {
            ServiceError::DocumentNotFound => SyncError::DestinationNotFound {
                document_id: target.document_id.clone(),
                tab_title: target.tab_title.clone(),
                what: Missing::Document,
            },
            ServiceError::Transport(reason) => SyncError::SyncTransportError {
                document_id: target.document_id.clone(),
                operation,
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dataset(rows: &[&[&str]]) -> Dataset {
        let mut d = Dataset::new(vec!["lane".into(), "mean".into()]);
        for row in rows {
            d.push_row(row.iter().map(|c| Cell::from(*c)).collect());
        }
        d
    }

    fn syncer_with_tab(rows: Vec<Vec<Cell>>) -> SheetSyncer<MemorySpreadsheet> {
        let sheet = MemorySpreadsheet::new("doc");
        sheet.insert_tab("Data", rows);
        SheetSyncer::new(sheet)
    }

    #[tokio::test]
    async fn replace_overwrites_whole_tab() {
        let syncer = syncer_with_tab(vec![vec![Cell::from("junk"); 4]; 10]);
        let target = SyncTarget::new("doc", "Data");
        let data = dataset(&[&["A-B", "1"], &["C-D", ""]]);

        let report = syncer.sync(&data, &target, SyncMode::Replace).await.unwrap();

        assert_eq!(report.rows_written, 2);
        assert_eq!(syncer.service().tab("Data").unwrap(), data.to_values());
    }

    #[tokio::test]
    async fn replace_twice_is_stable() {
        let syncer = syncer_with_tab(Vec::new());
        let target = SyncTarget::new("doc", "Data");
        let data = dataset(&[&["A-B", "1"]]);

        syncer.sync(&data, &target, SyncMode::Replace).await.unwrap();
        let first = syncer.service().tab("Data").unwrap();
        syncer.sync(&data, &target, SyncMode::Replace).await.unwrap();

        assert_eq!(syncer.service().tab("Data").unwrap(), first);
    }

    #[tokio::test]
    async fn append_dedupe_merges_in_order() {
        let existing = dataset(&[&["r1", "1"], &["r2", "2"]]);
        let syncer = syncer_with_tab(existing.to_values());
        let target = SyncTarget::new("doc", "Data");

        let report = syncer
            .sync(&dataset(&[&["r2", "2"], &["r3", "3"]]), &target, SyncMode::AppendDedupe)
            .await
            .unwrap();

        assert_eq!(
            report,
            SyncReport {
                rows_before: 2,
                rows_written: 3,
                duplicates_removed: 1
            }
        );
        assert_eq!(
            syncer.service().tab("Data").unwrap(),
            dataset(&[&["r1", "1"], &["r2", "2"], &["r3", "3"]]).to_values()
        );
    }

    #[tokio::test]
    async fn append_dedupe_into_empty_tab() {
        let syncer = syncer_with_tab(Vec::new());
        let target = SyncTarget::new("doc", "Data");

        let report = syncer
            .sync(&dataset(&[&["r1", "1"], &["r1", "1"]]), &target, SyncMode::AppendDedupe)
            .await
            .unwrap();

        assert_eq!(report.rows_before, 0);
        assert_eq!(report.rows_written, 1);
    }

    #[tokio::test]
    async fn unreadable_tab_counts_as_empty() {
        let syncer = syncer_with_tab(dataset(&[&["r1", "1"]]).to_values());
        syncer.service().fail_reads("quota exceeded");
        let target = SyncTarget::new("doc", "Data");

        let report = syncer
            .sync(&dataset(&[&["r2", "2"]]), &target, SyncMode::AppendDedupe)
            .await
            .unwrap();

        assert_eq!(report.rows_before, 0);
        assert_eq!(syncer.service().tab("Data").unwrap(), dataset(&[&["r2", "2"]]).to_values());
    }

    #[tokio::test]
    async fn append_dedupe_keeps_unlabelled_columns() {
        let syncer = syncer_with_tab(Vec::new());
        let target = SyncTarget::new("doc", "Data");
        let mut data = Dataset::new(vec!["Lane".into(), "".into(), "".into()]);
        data.push_row(vec![Cell::from("A-B"), Cell::Number(7.0)]);

        syncer.sync(&data, &target, SyncMode::Replace).await.unwrap();
        let report = syncer.sync(&data, &target, SyncMode::AppendDedupe).await.unwrap();

        assert_eq!(report.rows_before, 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(syncer.service().tab("Data").unwrap(), data.to_values());
    }

    fn transport_operation(err: SyncError) -> &'static str {
        match err {
            SyncError::SyncTransportError { operation, document_id, .. } => {
                assert_eq!(document_id, "doc");
                operation
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_document_is_transport_error() {
        let before = dataset(&[&["keep", "me"]]).to_values();
        let syncer = syncer_with_tab(before.clone());
        syncer.service().fail_on("tab_titles", "connection refused");

        let err = syncer
            .sync(&dataset(&[&["a", "1"]]), &SyncTarget::new("doc", "Data"), SyncMode::Replace)
            .await
            .unwrap_err();

        assert_eq!(transport_operation(err), "open document");
        assert_eq!(syncer.service().calls(), vec!["tab_titles"]);
        assert_eq!(syncer.service().tab("Data").unwrap(), before);
    }

    #[tokio::test]
    async fn failed_clear_leaves_tab_intact() {
        let before = dataset(&[&["keep", "me"]]).to_values();
        let syncer = syncer_with_tab(before.clone());
        syncer.service().fail_on("clear_tab", "unauthorized: 403");

        let err = syncer
            .sync(&dataset(&[&["a", "1"]]), &SyncTarget::new("doc", "Data"), SyncMode::AppendDedupe)
            .await
            .unwrap_err();

        assert_eq!(transport_operation(err), "clear tab");
        assert_eq!(syncer.service().calls(), vec!["tab_titles", "read_tab", "clear_tab"]);
        assert_eq!(syncer.service().tab("Data").unwrap(), before);
    }

    #[tokio::test]
    async fn failed_write_after_clear_is_reported() {
        let syncer = syncer_with_tab(dataset(&[&["old", "1"]]).to_values());
        syncer.service().fail_on("write_block", "backend error");

        let err = syncer
            .sync(&dataset(&[&["a", "1"]]), &SyncTarget::new("doc", "Data"), SyncMode::Replace)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("backend error"));
        assert_eq!(transport_operation(err), "write tab");
        assert_eq!(syncer.service().tab("Data").unwrap(), Vec::<Vec<Cell>>::new());
    }

    #[tokio::test]
    async fn empty_dataset_touches_nothing() {
        let before = dataset(&[&["keep", "me"]]).to_values();
        let syncer = syncer_with_tab(before.clone());

        let err = syncer
            .sync(&dataset(&[]), &SyncTarget::new("doc", "Data"), SyncMode::Replace)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::EmptyDataset { .. }));
        assert_eq!(syncer.service().calls(), Vec::<String>::new());
        assert_eq!(syncer.service().tab("Data").unwrap(), before);
    }

    #[tokio::test]
    async fn missing_tab_writes_nothing() {
        let syncer = syncer_with_tab(Vec::new());

        let err = syncer
            .sync(&dataset(&[&["a", "1"]]), &SyncTarget::new("doc", "Other"), SyncMode::Replace)
            .await
            .unwrap_err();

        match err {
            SyncError::DestinationNotFound { what, .. } => {
                assert_eq!(what, Missing::Tab { available: vec!["Data".into()] })
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(syncer.service().calls(), vec!["tab_titles"]);
        assert_eq!(syncer.service().tab("Data").unwrap(), Vec::<Vec<Cell>>::new());
    }

    #[tokio::test]
    async fn unknown_document_is_destination_not_found() {
        let syncer = syncer_with_tab(Vec::new());

        let err = syncer
            .sync(&dataset(&[&["a", "1"]]), &SyncTarget::new("nope", "Data"), SyncMode::Replace)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::DestinationNotFound {
                what: Missing::Document,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreadable_source_file_is_reported() {
        let syncer = syncer_with_tab(Vec::new());
        let err = syncer
            .sync_file(Path::new("/missing/rate_all.xlsx"), &SyncTarget::new("doc", "Data"), SyncMode::Replace)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SourceUnreadable(_)));
        assert!(syncer.service().calls().is_empty());
    }
}
