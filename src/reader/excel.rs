use calamine::{open_workbook_auto, Data, Reader};
use chrono::Timelike;
use std::path::Path;

use super::DatasetReader;
use crate::error::SourceError;
use crate::models::{Cell, Dataset};

/// Reads the first (or a named) worksheet of an Excel/ODS workbook.
#[derive(Debug, Clone, Default)]
pub struct ExcelReader {
    sheet: Option<String>,
}

impl ExcelReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    fn convert(value: &Data) -> Cell {
        match value {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::text(s.as_str()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(ndt) if ndt.num_seconds_from_midnight() == 0 => {
                    Cell::Text(ndt.format("%Y-%m-%d").to_string())
                }
                Some(ndt) => Cell::Text(ndt.format("%Y-%m-%d %H:%M:%S").to_string()),
                None => Cell::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.as_str()),
        }
    }
}

impl DatasetReader for ExcelReader {
    fn read(&self, path: &Path) -> Result<Dataset, SourceError> {
        let parse_err = |reason: String| SourceError::Parse {
            path: path.to_path_buf(),
            reason,
        };

        let mut workbook = open_workbook_auto(path).map_err(|e| parse_err(e.to_string()))?;

        let range = match &self.sheet {
            Some(name) => workbook.worksheet_range(name),
            None => workbook
                .worksheet_range_at(0)
                .ok_or_else(|| parse_err("workbook contains no worksheets".to_string()))?,
        }
        .map_err(|e| parse_err(e.to_string()))?;

        let mut rows = range
            .rows()
            .map(|row| row.iter().map(Self::convert).collect::<Vec<_>>())
            .filter(|row| !row.iter().all(Cell::is_empty));

        let Some(header) = rows.next() else {
            return Ok(Dataset::default());
        };

        let mut dataset = Dataset::new(header.iter().map(|c| c.to_string()).collect());
        for row in rows {
            dataset.push_row(row);
        }
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    #[test]
    fn reads_header_and_typed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rate_all_2024.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write(0, 0, "Origin").unwrap();
        sheet.write(0, 1, "Destination").unwrap();
        sheet.write(0, 2, "Mean").unwrap();
        sheet.write(1, 0, "CNSHA").unwrap();
        sheet.write(1, 1, "NLRTM").unwrap();
        sheet.write(1, 2, 1450.5).unwrap();
        sheet.write(2, 0, "CNNGB").unwrap();
        sheet.write(2, 2, 1320.0).unwrap();
        workbook.save(&path).unwrap();

        let dataset = ExcelReader::new().read(&path).unwrap();

        assert_eq!(dataset.columns, vec!["Origin", "Destination", "Mean"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(0, "Mean"), Some(&Cell::Number(1450.5)));
        assert_eq!(dataset.get(1, "Destination"), Some(&Cell::Empty));
    }

    #[test]
    fn unlabelled_columns_keep_their_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rate_all_blank_header.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write(0, 0, "Lane").unwrap();
        sheet.write(0, 2, "Lane").unwrap();
        sheet.write(1, 0, "A-B").unwrap();
        sheet.write(1, 1, 7.0).unwrap();
        sheet.write(1, 2, "B-C").unwrap();
        workbook.save(&path).unwrap();

        let dataset = ExcelReader::new().read(&path).unwrap();

        assert_eq!(dataset.columns, vec!["Lane", "Unnamed: 1", "Lane.1"]);
        assert_eq!(dataset.get(0, "Unnamed: 1"), Some(&Cell::Number(7.0)));
        assert_eq!(dataset.get(0, "Lane.1"), Some(&Cell::from("B-C")));
    }

    #[test]
    fn header_only_workbook_is_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write(0, 0, "Origin").unwrap();
        workbook.save(&path).unwrap();

        let dataset = ExcelReader::new().read(&path).unwrap();
        assert_eq!(dataset.columns, vec!["Origin"]);
        assert!(dataset.is_empty());
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let err = ExcelReader::new().read(&path).unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }
}
