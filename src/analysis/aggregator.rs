//! Combination of per-algorithm result tables.
//!
//! Every table in a folder contributes its rows to one combined dataset.
//! Rows are tagged with the algorithm derived from the table's file name
//! and whether that table holds successful analyses. Unparseable values of
//! the designated numeric column are replaced by `error` and tallied.

use crate::models::{ErrorBucket, Record, Value};
use crate::scanner::{self, FileScanner};
use crate::store;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// File name of the combined dataset.
pub const COMBINED_FILE: &str = super::FULL_ANALYSIS_FILE;

/// File name of the error summary.
pub const ERROR_COUNT_FILE: &str = "errorCount.csv";

/// Marker written in place of unparseable numeric values.
pub const ERROR_MARKER: &str = "error";

/// Default column checked for numeric values.
pub const DEFAULT_NUMERIC_COLUMN: &str = "RFI";

/// Suffixes stripped from table names to recover the algorithm label.
const KNOWN_SUFFIXES: [&str; 3] = ["_failed", "_analysis", "_errorCount"];

/// Token marking a table of successful analyses.
const SUCCESS_TOKEN: &str = "analysis";

/// Outcome of a [`combine`] run.
#[derive(Debug, Clone, Default)]
pub struct AggregateSummary {
    /// Number of tables read.
    pub tables: usize,
    /// Tables skipped because they could not be read.
    pub unreadable: usize,
    /// Number of rows in the combined dataset.
    pub rows: usize,
    /// Unparseable values of the numeric column.
    pub errors: ErrorBucket,
    /// Where the combined dataset was written.
    pub combined_path: PathBuf,
    /// Where the error summary was written.
    pub error_path: PathBuf,
}

/// Algorithm label and success flag derived from a table's file name.
pub fn classify_table(file_name: &str) -> (String, bool) {
    let stem = file_name.strip_suffix(".csv").unwrap_or(file_name);
    let label = KNOWN_SUFFIXES
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix))
        .unwrap_or(stem);

    (label.to_string(), file_name.contains(SUCCESS_TOKEN))
}

/// Replace an unparseable `column` value with [`ERROR_MARKER`], counting it.
///
/// Rows without the column are left untouched.
pub fn bucket_numeric(record: &mut Record, column: &str, errors: &mut ErrorBucket) {
    let raw = match record.get(column) {
        Some(Value::String(s)) => s.clone(),
        _ => return,
    };

    if raw.trim().parse::<f64>().is_err() {
        errors.record(&raw);
        record.insert(column, ERROR_MARKER);
    }
}

/// Tag and error-bucket every row of one table.
fn read_tagged(path: &Path, column: &str, errors: &mut ErrorBucket) -> Result<Vec<Record>> {
    let name = scanner::file_name(path);
    let (algorithm, success) = classify_table(&name);
    let dataset = store::read_all(path)?;
    if dataset.is_empty() {
        debug!("{} has no rows", name);
        return Ok(Vec::new());
    }

    debug!(
        "{}: {} row(s), algorithm '{}', success {}",
        name,
        dataset.len(),
        algorithm,
        success
    );

    Ok(dataset
        .records
        .into_iter()
        .map(|mut record| {
            record.insert("Algorithm", algorithm.as_str());
            record.insert("RFISuccess", success);
            bucket_numeric(&mut record, column, errors);
            record
        })
        .collect())
}

/// Combine all tables in `folder` and write the results to `destination`.
///
/// Outputs written by an earlier combine are replaced. Tables named like
/// the outputs are never read as inputs. Tables of successful analyses
/// are read first so their columns fix the combined header. Unreadable
/// tables are logged and skipped.
pub fn combine(
    folder: &Path,
    control_group: &str,
    destination: &Path,
    column: &str,
) -> Result<AggregateSummary> {
    info!("Combining tables in {}", folder.display());
    // TODO: compare each group against `control_group` once the baseline
    // calculations are defined.
    debug!("Control group '{}' is not used yet", control_group);

    let mut tables: Vec<PathBuf> = FileScanner::new(folder)
        .tables()
        .into_iter()
        .filter(|path| {
            let name = scanner::file_name(path);
            name != COMBINED_FILE && name != ERROR_COUNT_FILE
        })
        .collect();
    tables.sort_by_key(|path| !classify_table(&scanner::file_name(path)).1);

    let mut errors = ErrorBucket::default();
    let mut rows = Vec::new();
    let mut read = 0;
    let mut unreadable = 0;
    for table in &tables {
        match read_tagged(table, column, &mut errors) {
            Ok(tagged) => {
                rows.extend(tagged);
                read += 1;
            }
            Err(e) => {
                error!("Skipping table {}: {:#}", table.display(), e);
                unreadable += 1;
            }
        }
    }

    let combined_path = destination.join(COMBINED_FILE);
    let error_path = destination.join(ERROR_COUNT_FILE);

    fs::create_dir_all(destination)
        .with_context(|| format!("Failed to create directory: {}", destination.display()))?;
    for path in [&combined_path, &error_path] {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to replace {}", path.display()))?;
        }
    }

    store::write_dataset(&combined_path, &rows)?;
    store::build_with_header(&error_path, &["name", "count"])?;
    store::append(&error_path, &errors.to_records())?;

    info!(
        "Combined {} row(s) from {} table(s); {} unparseable {} value(s)",
        rows.len(),
        read,
        errors.total(),
        column
    );

    Ok(AggregateSummary {
        tables: read,
        unreadable,
        rows: rows.len(),
        errors,
        combined_path,
        error_path,
    })
}
