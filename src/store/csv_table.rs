//! Append-only CSV tables keyed by their first record.
//!
//! A table's header is written once, from the key order of the first
//! record ever stored in it. Later rows are laid out against that header:
//! missing columns are written empty and unknown columns are dropped.

use crate::models::{Dataset, Record, Value};
use anyhow::{Context, Result};
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::debug;

/// Column used to key rows in [`index_by_file`].
pub const FILE_COLUMN: &str = "File";

/// Create the table at `path` with a header taken from `record`.
///
/// Does nothing if the file already exists.
pub fn build_or_open(path: &Path, record: &Record) -> Result<()> {
    let headers: Vec<&str> = record.keys().collect();
    build_with_header(path, &headers)
}

/// Create the table at `path` with an explicit header.
///
/// Does nothing if the file already exists.
pub fn build_with_header(path: &Path, headers: &[&str]) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    debug!("Creating table {} with {} columns", path.display(), headers.len());

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_path(path)
        .with_context(|| format!("Failed to create table: {}", path.display()))?;
    writer
        .write_record(headers)
        .with_context(|| format!("Failed to write header to {}", path.display()))?;
    writer.flush()?;

    Ok(())
}

/// Append rows to an existing table, ordered by its established header.
pub fn append(path: &Path, records: &[Record]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let headers = read_headers(path)?;

    let file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open table for append: {}", path.display()))?;
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(file);

    for record in records {
        let row: Vec<String> = headers
            .iter()
            .map(|h| record.get(h).map(Value::to_string).unwrap_or_default())
            .collect();
        writer
            .write_record(&row)
            .with_context(|| format!("Failed to append row to {}", path.display()))?;
    }

    writer.flush()?;
    Ok(())
}

/// Create the table from the first record if needed and append all records.
pub fn write_dataset(path: &Path, records: &[Record]) -> Result<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };

    build_or_open(path, first)?;
    append(path, records)
}

/// Read a whole table. A missing file yields an empty dataset.
pub fn read_all(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Ok(Dataset::default());
    }

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open table: {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(String::from)
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("Failed to read row of {}", path.display()))?;
        let mut record = Record::new();
        // Short rows become partial records; surplus cells have no column.
        for (header, cell) in headers.iter().zip(row.iter()) {
            record.insert(header.as_str(), cell);
        }
        records.push(record);
    }

    Ok(Dataset { headers, records })
}

/// Map each row's `File` value to the remainder of the row.
///
/// Used to decide whether a mesh was already analysed by a previous run.
pub fn index_by_file(path: &Path) -> Result<HashMap<String, Record>> {
    let dataset = read_all(path)?;
    let mut index = HashMap::with_capacity(dataset.len());

    for mut record in dataset.records {
        if let Some(Value::String(file)) = record.remove(FILE_COLUMN) {
            index.insert(file, record);
        }
    }

    Ok(index)
}

fn read_headers(path: &Path) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open table: {}", path.display()))?;

    Ok(reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(String::from)
        .collect())
}
