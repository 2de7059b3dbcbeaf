//! Data models for VersaMesh.
//!
//! This module contains the tabular structures shared by the CSV store,
//! the aggregator and the analysis step: scalar values, ordered records,
//! datasets, error buckets and the per-mesh shape measurements.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single scalar cell of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Free text, also used for every value read back from disk.
    String(String),
    /// Floating point measurement.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            // Integral floats keep one fractional digit so tables stay
            // comparable with the ones written by earlier releases.
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{:.1}", v)
            }
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
        }
    }
}

impl Value {
    /// Returns the value as a string slice when it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// An ordered mapping from column name to value.
///
/// Key order is insertion order; replacing an existing key keeps its slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a column value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Builder-style variant of [`Record::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Removes a column, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(idx).1)
    }

    /// Column names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}

/// A header plus the records read under it.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Column names, fixed by the first record written to the table.
    pub headers: Vec<String>,
    /// Rows in file order.
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A single error label with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub name: String,
    pub count: usize,
}

/// Occurrence counts of unparseable values, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBucket {
    entries: Vec<ErrorCount>,
}

impl ErrorBucket {
    /// Counts one more occurrence of `label`.
    pub fn record(&mut self, label: &str) {
        match self.entries.iter_mut().find(|e| e.name == label) {
            Some(entry) => entry.count += 1,
            None => self.entries.push(ErrorCount {
                name: label.to_string(),
                count: 1,
            }),
        }
    }

    pub fn entries(&self) -> &[ErrorCount] {
        &self.entries
    }

    /// Total number of recorded occurrences.
    pub fn total(&self) -> usize {
        self.entries.iter().map(|e| e.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts the bucket into `name`/`count` records.
    pub fn to_records(&self) -> Vec<Record> {
        self.entries
            .iter()
            .map(|e| {
                Record::new()
                    .with("name", e.name.as_str())
                    .with("count", e.count.to_string())
            })
            .collect()
    }
}

/// Column labels of the eight extracted OPCR rotation buckets.
pub const OPCR_ANGLE_COLUMNS: [&str; 8] = [
    "0 deg.",
    "5.625 deg.",
    "11.25 deg.",
    "16.875 deg.",
    "22.5 deg.",
    "28.125 deg.",
    "33.75 deg.",
    "39.375 deg.",
];

/// Shape metrics computed for a single mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub dne: f64,
    pub convex_dne: f64,
    pub concave_dne: f64,
    pub convex_area: f64,
    pub concave_area: f64,
    pub opcr: f64,
    /// Patch counts for the rotations listed in [`OPCR_ANGLE_COLUMNS`].
    pub opcr_angles: [f64; 8],
    pub rfi_boyer: f64,
    pub rfi_ungar: f64,
}

impl Measurements {
    /// Flattens the measurements into a record keyed by the given file name.
    pub fn to_record(&self, file_name: &str) -> Record {
        let mut record = Record::new()
            .with("File", file_name)
            .with("DNE", self.dne)
            .with("Convex_DNE", self.convex_dne)
            .with("Concave_DNE", self.concave_dne)
            .with("Convex_Area", self.convex_area)
            .with("Concave_Area", self.concave_area)
            .with("OPCR", self.opcr);

        for (column, value) in OPCR_ANGLE_COLUMNS.iter().zip(self.opcr_angles) {
            record.insert(*column, value);
        }

        record
            .with("RFI_Boyer", self.rfi_boyer)
            .with("RFI_Ungar", self.rfi_ungar)
    }
}
