//! Tabular storage.
//!
//! Results are kept in plain CSV files so that interrupted batches can be
//! resumed by reading back what earlier runs already wrote.

pub mod csv_table;

pub use csv_table::*;
