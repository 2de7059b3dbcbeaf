//! Analysis modules.
//!
//! `measure` computes shape metrics for processed meshes and records them;
//! `aggregator` merges result tables into a combined dataset.

pub mod aggregator;
pub mod measure;

pub use aggregator::*;
pub use measure::*;
