use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single scalar value in a tabular dataset.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    /// Sentinel written to the remote sheet for empty cells.
    pub const EMPTY_SENTINEL: &'static str = "";

    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Converts a JSON value returned by the spreadsheet service.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Empty,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Empty),
            serde_json::Value::String(s) => Self::text(s.as_str()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Empty => serde_json::Value::String(Self::EMPTY_SENTINEL.to_string()),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(Self::EMPTY_SENTINEL.to_string())),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn number_bits(n: f64) -> u64 {
        if n == 0.0 {
            0.0f64.to_bits()
        } else {
            n.to_bits()
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => Self::number_bits(*a) == Self::number_bits(*b),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Empty => {}
            Self::Bool(b) => b.hash(state),
            Self::Number(n) => Self::number_bits(*n).hash(state),
            Self::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "{}", Self::EMPTY_SENTINEL),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Ordered rows sharing one header. Every row is exactly `columns.len()` wide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Creates an empty dataset. Column names are made unique: a blank name at
    /// position `i` becomes `Unnamed: i` and repeats get `.1`, `.2`, ... appended.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns: unique_columns(columns),
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding short rows with `Empty` and truncating long ones.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn row_map(&self, row: usize) -> Option<BTreeMap<&str, &Cell>> {
        let cells = self.rows.get(row)?;
        Some(
            self.columns
                .iter()
                .map(String::as_str)
                .zip(cells.iter())
                .collect(),
        )
    }

    /// Rearranges rows onto `columns` by header name. Unknown columns are
    /// filled with `Empty`; columns not listed are dropped.
    pub fn project_onto(&self, columns: &[String]) -> Dataset {
        let mapping: Vec<Option<usize>> = columns.iter().map(|c| self.column_index(c)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                mapping
                    .iter()
                    .map(|idx| idx.and_then(|i| row.get(i).cloned()).unwrap_or_default())
                    .collect()
            })
            .collect();
        Dataset {
            columns: columns.to_vec(),
            rows,
        }
    }

    /// Old rows first, then new rows, all on the new dataset's header.
    pub fn concat(old: &Dataset, new: &Dataset) -> Dataset {
        let mut merged = old.project_onto(&new.columns);
        merged.rows.extend(new.rows.iter().cloned());
        merged
    }

    /// Drops exact full-row duplicates, keeping the first occurrence.
    /// Returns the number of rows removed.
    pub fn dedupe(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }

    /// Header row followed by the data rows.
    pub fn to_values(&self) -> Vec<Vec<Cell>> {
        let mut values = Vec::with_capacity(self.rows.len() + 1);
        values.push(self.columns.iter().map(|c| Cell::Text(c.clone())).collect());
        values.extend(self.rows.iter().cloned());
        values
    }

    /// Parses a block read back from a sheet. The first row is the header;
    /// fully empty rows are skipped. The header is widened to the widest data
    /// row, since the sheet drops trailing blank header cells.
    pub fn from_values(values: Vec<Vec<Cell>>) -> Dataset {
        let mut iter = values.into_iter();
        let Some(header) = iter.next() else {
            return Dataset::default();
        };
        let rows: Vec<Vec<Cell>> = iter.filter(|row| !row.iter().all(Cell::is_empty)).collect();

        let width = rows.iter().map(Vec::len).fold(header.len(), usize::max);
        let mut columns: Vec<String> = header.iter().map(|c| c.to_string()).collect();
        columns.resize(width, String::new());

        let mut dataset = Dataset::new(columns);
        for row in rows {
            dataset.push_row(row);
        }
        dataset
    }
}

fn unique_columns(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(raw.len());
    raw.into_iter()
        .enumerate()
        .map(|(i, name)| {
            let base = if name.trim().is_empty() {
                format!("Unnamed: {}", i)
            } else {
                name
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while seen.contains(&candidate) {
                candidate = format!("{}.{}", base, n);
                n += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}
