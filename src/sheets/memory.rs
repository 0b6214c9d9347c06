use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::SpreadsheetService;
use crate::error::ServiceError;
use crate::models::Cell;

/// A single document held in memory. Useful for tests and local dry runs.
pub struct MemorySpreadsheet {
    document_id: String,
    tabs: Mutex<Vec<(String, Vec<Vec<Cell>>)>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, String>>,
}

impl MemorySpreadsheet {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            tabs: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert_tab(&self, title: impl Into<String>, rows: Vec<Vec<Cell>>) {
        let title = title.into();
        let mut tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
        match tabs.iter_mut().find(|(t, _)| *t == title) {
            Some((_, existing)) => *existing = rows,
            None => tabs.push((title, rows)),
        }
    }

    /// Raw grid of a tab, exactly as last written.
    pub fn tab(&self, title: &str) -> Option<Vec<Vec<Cell>>> {
        let tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
        tabs.iter().find(|(t, _)| t == title).map(|(_, rows)| rows.clone())
    }

    /// Names of the service operations invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Makes every subsequent call of `operation` (`tab_titles`, `read_tab`,
    /// `clear_tab` or `write_block`) fail with a transport error.
    pub fn fail_on(&self, operation: &str, reason: impl Into<String>) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operation.to_string(), reason.into());
    }

    pub fn fail_reads(&self, reason: impl Into<String>) {
        self.fail_on("read_tab", reason);
    }

    fn record(&self, call: &str, document_id: &str) -> Result<(), ServiceError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call.to_string());
        if document_id != self.document_id {
            return Err(ServiceError::DocumentNotFound);
        }
        match self.failures.lock().unwrap_or_else(|e| e.into_inner()).get(call) {
            Some(reason) => Err(ServiceError::Transport(reason.clone())),
            None => Ok(()),
        }
    }

    fn with_tab<T>(&self, title: &str, f: impl FnOnce(&mut Vec<Vec<Cell>>) -> T) -> Result<T, ServiceError> {
        let mut tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
        tabs.iter_mut()
            .find(|(t, _)| t == title)
            .map(|(_, rows)| f(rows))
            .ok_or_else(|| ServiceError::Transport(format!("Unable to parse range: '{}'", title)))
    }
}

/// Parses A1 notation such as `B3` into zero-based (row, column).
pub fn parse_a1(cell: &str) -> Option<(usize, usize)> {
    let split = cell.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let column = letters
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1));
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, column - 1))
}

#[async_trait]
impl SpreadsheetService for MemorySpreadsheet {
    async fn tab_titles(&self, document_id: &str) -> Result<Vec<String>, ServiceError> {
        self.record("tab_titles", document_id)?;
        let tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tabs.iter().map(|(t, _)| t.clone()).collect())
    }

    async fn read_tab(&self, document_id: &str, tab_title: &str) -> Result<Vec<Vec<Cell>>, ServiceError> {
        self.record("read_tab", document_id)?;
        // Mirror the remote API, which omits trailing empty cells and rows
        self.with_tab(tab_title, |rows| {
            let mut out: Vec<Vec<Cell>> = rows
                .iter()
                .map(|row| {
                    let end = row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
                    row[..end].to_vec()
                })
                .collect();
            while out.last().is_some_and(|r| r.is_empty()) {
                out.pop();
            }
            out
        })
    }

    async fn clear_tab(&self, document_id: &str, tab_title: &str) -> Result<(), ServiceError> {
        self.record("clear_tab", document_id)?;
        self.with_tab(tab_title, |rows| rows.clear())
    }

    async fn write_block(
        &self,
        document_id: &str,
        tab_title: &str,
        start_cell: &str,
        values: &[Vec<Cell>],
    ) -> Result<(), ServiceError> {
        self.record("write_block", document_id)?;
        let (row0, col0) =
            parse_a1(start_cell).ok_or_else(|| ServiceError::Transport(format!("bad start cell '{}'", start_cell)))?;
        self.with_tab(tab_title, |rows| {
            for (r, values_row) in values.iter().enumerate() {
                if rows.len() <= row0 + r {
                    rows.resize(row0 + r + 1, Vec::new());
                }
                let row = &mut rows[row0 + r];
                if row.len() < col0 + values_row.len() {
                    row.resize(col0 + values_row.len(), Cell::Empty);
                }
                for (c, value) in values_row.iter().enumerate() {
                    row[col0 + c] = value.clone();
                }
            }
        })
    }
}
