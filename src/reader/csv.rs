use csv::ReaderBuilder;
use std::path::Path;

use super::DatasetReader;
use crate::error::SourceError;
use crate::models::{Cell, Dataset};

pub struct CsvReader {
    delimiter: u8,
}

impl Default for CsvReader {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn convert(field: &str) -> Cell {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        let numeric = trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
            && trimmed.chars().any(|c| c.is_ascii_digit());
        if numeric {
            if let Ok(n) = trimmed.parse::<f64>() {
                return Cell::Number(n);
            }
        }
        Cell::Text(field.to_string())
    }
}

impl DatasetReader for CsvReader {
    fn read(&self, path: &Path) -> Result<Dataset, SourceError> {
        let parse_err = |e: csv::Error| SourceError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(parse_err)?;

        let columns = reader
            .headers()
            .map_err(parse_err)?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                // Excel writes a UTF-8 BOM in front of the first header
                if i == 0 {
                    h.trim_start_matches('\u{feff}').to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();

        let mut dataset = Dataset::new(columns);
        for record in reader.records() {
            let record = record.map_err(parse_err)?;
            let row: Vec<Cell> = record.iter().map(Self::convert).collect();
            if row.iter().all(Cell::is_empty) {
                continue;
            }
            dataset.push_row(row);
        }
        Ok(dataset)
    }
}
