pub mod excel;
pub mod csv;

use crate::error::SourceError;
use crate::models::Dataset;
use std::path::Path;

pub use self::csv::CsvReader;
pub use excel::ExcelReader;

pub trait DatasetReader {
    fn read(&self, path: &Path) -> Result<Dataset, SourceError>;
}

/// Picks a reader from the file extension and parses `path`.
pub fn read_dataset(path: &Path) -> Result<Dataset, SourceError> {
    if !path.is_file() {
        return Err(SourceError::Missing {
            path: path.to_path_buf(),
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let dataset = match extension.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => ExcelReader::new().read(path)?,
        "csv" => CsvReader::new().read(path)?,
        "tsv" => CsvReader::new().with_delimiter(b'\t').read(path)?,
        _ => {
            return Err(SourceError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    tracing::info!(
        path = %path.display(),
        rows = dataset.len(),
        columns = dataset.columns.len(),
        "Read dataset"
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_reported() {
        let err = read_dataset(Path::new("/definitely/not/here.xlsx")).unwrap_err();
        assert!(matches!(err, SourceError::Missing { .. }));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let err = read_dataset(&path).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedFormat { .. }));
        assert_eq!(err.path(), &path);
    }
}
