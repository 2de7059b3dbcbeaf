//! The process engine.
//!
//! Owns the current [`Settings`] and a [`MeshBackend`], and runs the
//! simplify, analyze and combine steps over the configured folders.
//!
//! `process` is a two-phase pipeline. Phase 1 decimates every input with
//! every selected variant (de Vries variants also smooth right away).
//! Phase 2, the Morley smoothing pass, only starts once phase 1 has
//! finished for all variants.

pub mod pipeline;

use crate::analysis::{self, AggregateSummary, AnalysisSummary};
use crate::backend::{MeshBackend, SimplifyJob};
use crate::progress;
use crate::scanner::{self, FileScanner, SMOOTHED_DIR};
use crate::settings::{Algorithm, Pipeline, Settings, SettingsError};
use anyhow::Result;
use chrono::{DateTime, Local};
use pipeline::StageStats;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

/// Folder below the output folder receiving combined tables.
pub const COMBINED_DIR: &str = "analyzed";

/// Errors that abort a whole engine operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("No algorithms provided.")]
    NoAlgorithms,
}

/// Counters and timing for one `process` run.
#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub started_at: DateTime<Local>,
    /// Number of input meshes found.
    pub inputs: usize,
    /// Phase 1 decimation.
    pub simplify: StageStats,
    /// All smoothing, de Vries (phase 1) and Morley (phase 2).
    pub smooth: StageStats,
    pub duration_seconds: f64,
}

impl ProcessSummary {
    pub fn failed(&self) -> usize {
        self.simplify.failed + self.smooth.failed
    }
}

/// Sequential batch engine over a mesh backend.
pub struct ProcessEngine<B: MeshBackend> {
    settings: Settings,
    backend: B,
    show_progress: bool,
}

impl<B: MeshBackend> ProcessEngine<B> {
    pub fn new(settings: Settings, backend: B) -> Self {
        Self {
            settings,
            backend,
            show_progress: false,
        }
    }

    /// Show progress bars while processing.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validate and apply a single setting change.
    pub fn update_setting(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.settings = self.settings.update(key, value)?;
        Ok(())
    }

    /// Simplify and smooth every input mesh with every selected algorithm.
    pub async fn process(&self) -> Result<ProcessSummary> {
        let algorithms = &self.settings.algorithms;
        if algorithms.is_empty() {
            return Err(EngineError::NoAlgorithms.into());
        }

        let started_at = Local::now();
        let start = Instant::now();
        let inputs = FileScanner::new(&self.settings.input_folder).meshes();
        println!(
            "📂 Found {} file(s) in '{}' to process.",
            inputs.len(),
            self.settings.input_folder.display()
        );

        let mut simplify = StageStats::default();
        let mut smooth = StageStats::default();

        // Phase 1: decimation for every variant.
        for algorithm in algorithms {
            let (decimated, smoothed) = self.decimate(algorithm, &inputs).await;
            simplify.merge(decimated);
            smooth.merge(smoothed);
        }

        // Phase 2: Morley smoothing over the finished decimation folders.
        let morley: Vec<&Algorithm> = algorithms
            .iter()
            .filter(|a| a.pipeline == Pipeline::Morley)
            .collect();
        if !morley.is_empty() {
            println!(
                "🧽 Applying Morley smoothing to {} folder(s).",
                morley.len()
            );
        }
        for algorithm in morley {
            smooth.merge(self.smooth_morley(algorithm).await);
        }

        let duration_seconds = analysis::rounded_seconds(start);
        info!("--- {} seconds ---", duration_seconds);

        Ok(ProcessSummary {
            started_at,
            inputs: inputs.len(),
            simplify,
            smooth,
            duration_seconds,
        })
    }

    /// Analyse every smoothed mesh in the output folder.
    pub async fn analyze(&self) -> Result<AnalysisSummary> {
        analysis::analyze_all(&self.backend, &self.settings.output_folder, self.show_progress)
            .await
    }

    /// Combine the result tables found in `folder`.
    ///
    /// Outputs go to the `analyzed` folder below the output folder, which
    /// `analyze` never treats as a group.
    pub fn combine(
        &self,
        folder: &Path,
        control_group: &str,
        column: &str,
    ) -> Result<AggregateSummary> {
        let destination = self.settings.output_folder.join(COMBINED_DIR);
        analysis::combine(folder, control_group, &destination, column)
    }

    async fn decimate(&self, algorithm: &Algorithm, inputs: &[PathBuf]) -> (StageStats, StageStats) {
        let dir = pipeline::variant_dir(&self.settings.output_folder, algorithm);
        let mut simplify = StageStats::default();
        let mut smooth = StageStats::default();
        let backend = &self.backend;

        info!("Simplifying {} file(s) with {}", inputs.len(), algorithm);
        let pb = progress::bar(inputs.len(), self.show_progress, &algorithm.name());

        for input in inputs {
            pb.inc(1);
            let name = scanner::file_name(input);
            let simplified = pipeline::simplified_path(&dir, input);

            let outcome = pipeline::run_staged(&simplified, |staged| async move {
                let job = SimplifyJob {
                    algorithm: *algorithm,
                    input: input.clone(),
                    output: staged,
                };
                backend.simplify(&job).await
            })
            .await;
            log_outcome(&outcome, &name, algorithm);
            if let Some(e) = simplify.record(outcome) {
                error!("Failed to simplify '{}' with {}: {:#}", name, algorithm, e);
                continue;
            }

            if algorithm.pipeline == Pipeline::DeVries {
                let smoothed = pipeline::smoothed_path(&dir, Pipeline::DeVries, input);
                let source = simplified.as_path();
                let outcome = pipeline::run_staged(&smoothed, |staged| async move {
                    backend.smooth(Pipeline::DeVries, source, &staged).await
                })
                .await;
                log_outcome(&outcome, &name, algorithm);
                if let Some(e) = smooth.record(outcome) {
                    error!("Failed to smooth '{}' with {}: {:#}", name, algorithm, e);
                }
            }
        }

        pb.finish_and_clear();
        (simplify, smooth)
    }

    async fn smooth_morley(&self, algorithm: &Algorithm) -> StageStats {
        let dir = pipeline::variant_dir(&self.settings.output_folder, algorithm);
        let files = FileScanner::new(&dir).meshes();
        let mut stats = StageStats::default();
        let backend = &self.backend;

        info!(
            "Smoothing {} file(s) in '{}'",
            files.len(),
            dir.join(SMOOTHED_DIR).display()
        );
        let pb = progress::bar(files.len(), self.show_progress, &algorithm.name());

        for file in &files {
            pb.inc(1);
            let name = scanner::file_name(file);
            let smoothed = pipeline::smoothed_path(&dir, Pipeline::Morley, file);
            let source = file.as_path();

            let outcome = pipeline::run_staged(&smoothed, |staged| async move {
                backend.smooth(Pipeline::Morley, source, &staged).await
            })
            .await;
            log_outcome(&outcome, &name, algorithm);
            if let Some(e) = stats.record(outcome) {
                error!("Failed to smooth '{}' with {}: {:#}", name, algorithm, e);
            }
        }

        pb.finish_and_clear();
        stats
    }
}

fn log_outcome(outcome: &Result<pipeline::StageOutcome>, name: &str, algorithm: &Algorithm) {
    if let Ok(pipeline::StageOutcome::Skipped) = outcome {
        info!(
            "{} has already been processed by {}. Skipping...",
            name, algorithm
        );
    } else if outcome.is_ok() {
        debug!("{} processed by {}", name, algorithm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Measurements;
    use anyhow::bail;
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    /// Backend writing deterministic placeholder meshes and logging calls.
    #[derive(Default)]
    struct FakeBackend {
        calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn log(&self, entry: String) {
            self.calls.lock().unwrap().push(entry);
        }
    }

    impl MeshBackend for FakeBackend {
        async fn simplify(&self, job: &SimplifyJob) -> Result<()> {
            let name = scanner::file_name(&job.input);
            self.log(format!("simplify:{}:{}", job.algorithm, name));
            if name.starts_with("broken") {
                bail!("pymeshlab failed to load mesh");
            }
            fs::write(&job.output, format!("{}|{}", job.algorithm, name))?;
            Ok(())
        }

        async fn smooth(&self, pipeline: Pipeline, input: &Path, output: &Path) -> Result<()> {
            self.log(format!("smooth:{}:{}", pipeline.name(), scanner::file_name(input)));
            let content = fs::read_to_string(input)?;
            fs::write(output, format!("{}|smoothed", content))?;
            Ok(())
        }

        async fn measure(&self, _mesh: &Path) -> Result<Measurements> {
            bail!("not used")
        }
    }

    struct Fixture {
        _dir: TempDir,
        input: PathBuf,
        output: PathBuf,
    }

    fn fixture(meshes: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data");
        let output = dir.path().join("output");
        fs::create_dir_all(&input).unwrap();
        for mesh in meshes {
            fs::write(input.join(mesh), b"ply").unwrap();
        }
        Fixture {
            _dir: dir,
            input,
            output,
        }
    }

    fn engine(fx: &Fixture, algorithms: &str) -> ProcessEngine<FakeBackend> {
        let mut engine = ProcessEngine::new(Settings::default(), FakeBackend::default());
        engine
            .update_setting("inputFolder", &fx.input.display().to_string())
            .unwrap();
        engine
            .update_setting("outputFolder", &fx.output.display().to_string())
            .unwrap();
        engine.update_setting("algorithms", algorithms).unwrap();
        engine
    }

    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| (e.path().to_path_buf(), fs::read(e.path()).unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn test_process_requires_algorithms() {
        let fx = fixture(&["a.ply"]);
        let settings = Settings {
            input_folder: fx.input.clone(),
            output_folder: fx.output.clone(),
            algorithms: Vec::new(),
        };
        let engine = ProcessEngine::new(settings, FakeBackend::default());

        let err = engine.process().await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::NoAlgorithms)
        );
        assert!(engine.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_process_writes_expected_layout() {
        let fx = fixture(&["a.ply", "b.ply"]);
        let engine = engine(&fx, "morley, deVries_preserveBoundary");

        let summary = engine.process().await.unwrap();
        assert_eq!(summary.inputs, 2);
        assert_eq!(summary.simplify.completed, 4);
        assert_eq!(summary.smooth.completed, 4);
        assert_eq!(summary.failed(), 0);

        let out = &fx.output;
        assert!(out.join("simplified_morley/a_simplified.ply").is_file());
        assert!(out
            .join("simplified_morley/smoothed/b_simplified_smoothed.ply")
            .is_file());
        assert!(out
            .join("simplified_deVries_preserveBoundary/smoothed/a_smoothed.ply")
            .is_file());
        assert!(!out.join("simplified_morley/.partial/a_simplified.ply").exists());
    }

    #[tokio::test]
    async fn test_morley_smoothing_waits_for_all_decimation() {
        let fx = fixture(&["a.ply", "b.ply"]);
        let engine = engine(&fx, "morley, deVries, morley_remesh");

        engine.process().await.unwrap();
        let calls = engine.backend.calls();

        let last_simplify = calls
            .iter()
            .rposition(|c| c.starts_with("simplify:"))
            .unwrap();
        let first_morley_smooth = calls
            .iter()
            .position(|c| c.starts_with("smooth:morley:"))
            .unwrap();
        assert!(last_simplify < first_morley_smooth);
        assert_eq!(
            calls.iter().filter(|c| c.starts_with("smooth:morley:")).count(),
            4
        );
    }

    #[tokio::test]
    async fn test_process_is_idempotent() {
        let fx = fixture(&["a.ply", "b.ply"]);
        let engine = engine(&fx, "morley, deVries_remesh_preserveBoundary");

        engine.process().await.unwrap();
        let first_calls = engine.backend.calls().len();
        let before = snapshot(&fx.output);

        let summary = engine.process().await.unwrap();
        let after = snapshot(&fx.output);

        assert_eq!(engine.backend.calls().len(), first_calls);
        assert_eq!(summary.simplify.completed, 0);
        assert_eq!(summary.smooth.completed, 0);
        assert_eq!(summary.simplify.skipped, 4);
        assert_eq!(summary.smooth.skipped, 4);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_failed_file_does_not_abort_batch() {
        let fx = fixture(&["a.ply", "broken.ply", "c.ply"]);
        let engine = engine(&fx, "deVries");

        let summary = engine.process().await.unwrap();
        assert_eq!(summary.simplify.completed, 2);
        assert_eq!(summary.simplify.failed, 1);
        assert_eq!(summary.smooth.completed, 2);
        assert!(!fx.output.join("simplified_deVries/broken_simplified.ply").exists());
        assert!(fx.output.join("simplified_deVries/smoothed/c_smoothed.ply").is_file());
    }

    #[test]
    fn test_invalid_setting_is_rejected() {
        let mut engine = ProcessEngine::new(Settings::default(), FakeBackend::default());
        let err = engine.update_setting("outputDir", "elsewhere").unwrap_err();

        assert!(matches!(err, SettingsError::InvalidKey { .. }));
        assert_eq!(engine.settings(), &Settings::default());
    }
}
