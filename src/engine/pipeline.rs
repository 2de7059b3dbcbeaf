//! Output layout and staged execution of pipeline stages.
//!
//! A stage is done when its final output file exists. Backends always
//! write into a hidden `.partial` directory next to the final file and the
//! result is moved into place only after the backend reports success, so
//! an interrupted call never satisfies the done check.

use crate::scanner::{self, SMOOTHED_DIR};
use crate::settings::{Algorithm, Pipeline};
use anyhow::{Context, Result};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Hidden staging directory name.
pub const STAGING_DIR: &str = ".partial";

/// What happened to a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Skipped,
}

/// Per-stage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StageStats {
    pub fn record(&mut self, outcome: Result<StageOutcome>) -> Option<anyhow::Error> {
        match outcome {
            Ok(StageOutcome::Completed) => self.completed += 1,
            Ok(StageOutcome::Skipped) => self.skipped += 1,
            Err(e) => {
                self.failed += 1;
                return Some(e);
            }
        }
        None
    }

    pub fn merge(&mut self, other: StageStats) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Folder receiving everything produced by `algorithm`.
pub fn variant_dir(output_dir: &Path, algorithm: &Algorithm) -> PathBuf {
    output_dir.join(algorithm.folder_name())
}

/// Decimated mesh for `input`.
pub fn simplified_path(variant_dir: &Path, input: &Path) -> PathBuf {
    variant_dir.join(format!("{}_simplified.ply", scanner::file_stem(input)))
}

/// Smoothed mesh for `source`.
///
/// de Vries smooths straight after decimation and names the result after
/// the original scan; Morley smooths the decimated file in a later pass.
pub fn smoothed_path(variant_dir: &Path, pipeline: Pipeline, source: &Path) -> PathBuf {
    let stem = scanner::file_stem(source);
    let stem = match pipeline {
        Pipeline::DeVries => stem.strip_suffix("_simplified").unwrap_or(&stem).to_string(),
        Pipeline::Morley => stem,
    };
    variant_dir
        .join(SMOOTHED_DIR)
        .join(format!("{}_smoothed.ply", stem))
}

/// Whether the stage producing `output` has already run.
pub fn is_done(output: &Path) -> bool {
    output.is_file()
}

/// Where the backend writes `output` before it is committed.
pub fn staging_path(output: &Path) -> PathBuf {
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    parent
        .join(STAGING_DIR)
        .join(output.file_name().unwrap_or_default())
}

/// Run `op` for `output` unless it is already done.
///
/// `op` receives the staging path to write to.
pub async fn run_staged<F, Fut>(output: &Path, op: F) -> Result<StageOutcome>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if is_done(output) {
        return Ok(StageOutcome::Skipped);
    }

    let staged = staging_path(output);
    if let Some(dir) = staged.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    if staged.exists() {
        fs::remove_file(&staged)
            .with_context(|| format!("Failed to remove stale file: {}", staged.display()))?;
    }

    op(staged.clone()).await?;

    if !staged.is_file() {
        anyhow::bail!("Backend reported success but wrote no file for {}", output.display());
    }
    fs::rename(&staged, output).with_context(|| {
        format!(
            "Failed to move {} into place at {}",
            staged.display(),
            output.display()
        )
    })?;

    Ok(StageOutcome::Completed)
}
