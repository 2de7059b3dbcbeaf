//! Shape analysis of every smoothed mesh in the output folder.
//!
//! Each subdirectory of the output folder is an algorithm group. Its
//! `smoothed/` meshes are measured one by one and every result is
//! appended to both the full results table and the group's own table as
//! soon as it is available, so an interrupted run loses at most one mesh.

use crate::backend::MeshBackend;
use crate::models::{Record, Value};
use crate::progress;
use crate::scanner::{self, FileScanner, SMOOTHED_DIR};
use crate::store;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

/// Table holding every successful analysis.
pub const FULL_ANALYSIS_FILE: &str = "fullAnalysis.csv";

/// Counters and timing for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisSummary {
    pub groups: usize,
    pub analyzed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_seconds: f64,
}

/// Seconds rounded to two decimals, as stored in `processTime`.
pub fn rounded_seconds(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 100.0).round() / 100.0
}

/// `(File, Algorithm)` pairs recorded in the full results table.
///
/// The same file name occurs in several groups, so rows are keyed by both.
fn analyzed_pairs(full_path: &Path) -> Result<HashSet<(String, String)>> {
    let dataset = store::read_all(full_path)?;

    Ok(dataset
        .records
        .iter()
        .filter_map(|row| {
            let file = row.get(store::FILE_COLUMN).and_then(Value::as_str)?;
            let algorithm = row.get("Algorithm").and_then(Value::as_str)?;
            Some((file.to_string(), algorithm.to_string()))
        })
        .collect())
}

/// Whether `file` was analysed for `group` by an earlier run.
fn already_analyzed(
    full: &HashSet<(String, String)>,
    group_done: &HashMap<String, Record>,
    file: &str,
    group: &str,
) -> bool {
    group_done.contains_key(file) || full.contains(&(file.to_string(), group.to_string()))
}

/// Append one successful analysis to the full and group tables.
fn store_result(full_path: &Path, group_path: &Path, record: &Record) -> Result<()> {
    store::write_dataset(full_path, std::slice::from_ref(record))?;
    store::write_dataset(group_path, std::slice::from_ref(record))
}

/// Analyse every pending mesh below `output_dir`.
pub async fn analyze_all<B: MeshBackend>(
    backend: &B,
    output_dir: &Path,
    show_progress: bool,
) -> Result<AnalysisSummary> {
    let run_start = Instant::now();
    let full_path = output_dir.join(FULL_ANALYSIS_FILE);
    let mut full_done = analyzed_pairs(&full_path).unwrap_or_else(|e| {
        error!("Cannot read previous results: {:#}", e);
        HashSet::new()
    });
    let mut summary = AnalysisSummary::default();

    println!("🔬 Analyzing all 3D scans within '{}'.", output_dir.display());

    for group in FileScanner::new(output_dir).groups() {
        let group_start = Instant::now();
        let group_name = scanner::file_name(&group);
        let group_path = output_dir.join(format!("{}_analysis.csv", group_name));
        let failed_path = output_dir.join(format!("{}_failed.csv", group_name));
        summary.groups += 1;
        let mut group_done = match store::index_by_file(&group_path) {
            Ok(done) => done,
            Err(e) => {
                error!("Skipping {}: {:#}", group_name, e);
                summary.failed += 1;
                continue;
            }
        };

        let files = FileScanner::new(group.join(SMOOTHED_DIR)).meshes();
        info!("Analyzing {} file(s) within {}", files.len(), group_name);

        let pb = progress::bar(files.len(), show_progress, &group_name);

        for file in &files {
            pb.inc(1);
            let name = scanner::file_name(file);

            if already_analyzed(&full_done, &group_done, &name, &group_name) {
                info!("Analysis is already done on {}. Skipping...", name);
                summary.skipped += 1;
                continue;
            }

            let file_start = Instant::now();
            match backend.measure(file).await {
                Ok(measurements) => {
                    let record = measurements
                        .to_record(&name)
                        .with("Algorithm", group_name.as_str())
                        .with("processTime", rounded_seconds(file_start));

                    if let Err(e) = store_result(&full_path, &group_path, &record) {
                        error!("Failed to record analysis of '{}': {:#}", name, e);
                        summary.failed += 1;
                        continue;
                    }
                    full_done.insert((name.clone(), group_name.clone()));
                    group_done.insert(name.clone(), record);

                    summary.analyzed += 1;
                    info!(
                        "Analysis complete for {} ({:.2}s)",
                        name,
                        rounded_seconds(file_start)
                    );
                }
                Err(e) => {
                    error!("Failed to analyze '{}' from {}: {:#}", name, group_name, e);
                    let record = Record::new()
                        .with("File", name.as_str())
                        .with("Algorithm", group_name.as_str())
                        .with("processTime", rounded_seconds(file_start))
                        .with("Error", format!("{:#}", e));
                    if let Err(e) = store::write_dataset(&failed_path, std::slice::from_ref(&record)) {
                        error!("Failed to record failure of '{}': {:#}", name, e);
                    }
                    summary.failed += 1;
                }
            }
        }

        pb.finish_and_clear();
        info!(
            "Finished {} in {:.2}s",
            group_name,
            rounded_seconds(group_start)
        );
    }

    summary.duration_seconds = rounded_seconds(run_start);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimplifyJob;
    use crate::models::Measurements;
    use crate::settings::Pipeline;
    use anyhow::bail;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Backend that only measures; fails for meshes named `broken*`.
    #[derive(Default)]
    struct MeasuringBackend {
        measured: Mutex<Vec<String>>,
    }

    impl MeshBackend for MeasuringBackend {
        async fn simplify(&self, _job: &SimplifyJob) -> Result<()> {
            bail!("not used")
        }

        async fn smooth(&self, _pipeline: Pipeline, _input: &Path, _output: &Path) -> Result<()> {
            bail!("not used")
        }

        async fn measure(&self, mesh: &Path) -> Result<Measurements> {
            let name = scanner::file_name(mesh);
            self.measured.lock().unwrap().push(name.clone());
            if name.starts_with("broken") {
                bail!("Rvcg could not read mesh");
            }
            Ok(Measurements {
                dne: 100.0,
                convex_dne: 80.0,
                concave_dne: 20.0,
                convex_area: 2.0,
                concave_area: 1.0,
                opcr: 60.0,
                opcr_angles: [60.0; 8],
                rfi_boyer: 0.5,
                rfi_ungar: 0.6,
            })
        }
    }

    fn add_mesh(output: &Path, group: &str, name: &str) {
        let dir = output.join(group).join(SMOOTHED_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), b"ply").unwrap();
    }

    #[tokio::test]
    async fn test_analyze_writes_full_and_group_tables() {
        let output = TempDir::new().unwrap();
        add_mesh(output.path(), "simplified_morley", "a_simplified_smoothed.ply");
        add_mesh(output.path(), "simplified_deVries", "a_smoothed.ply");

        let backend = MeasuringBackend::default();
        let summary = analyze_all(&backend, output.path(), false).await.unwrap();

        assert_eq!(summary.groups, 2);
        assert_eq!(summary.analyzed, 2);

        let full = store::read_all(&output.path().join(FULL_ANALYSIS_FILE)).unwrap();
        assert_eq!(full.len(), 2);
        assert_eq!(full.headers.first().map(String::as_str), Some("File"));
        assert_eq!(full.headers.last().map(String::as_str), Some("processTime"));

        let group =
            store::read_all(&output.path().join("simplified_morley_analysis.csv")).unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(
            group.records[0].get("Algorithm"),
            Some(&Value::from("simplified_morley"))
        );
    }

    #[tokio::test]
    async fn test_analyze_skips_previous_results() {
        let output = TempDir::new().unwrap();
        add_mesh(output.path(), "simplified_morley", "a_simplified_smoothed.ply");
        add_mesh(output.path(), "simplified_morley", "b_simplified_smoothed.ply");

        let backend = MeasuringBackend::default();
        analyze_all(&backend, output.path(), false).await.unwrap();

        // Same file names in a new group still need analysing.
        add_mesh(output.path(), "simplified_morley_remesh", "a_simplified_smoothed.ply");
        let summary = analyze_all(&backend, output.path(), false).await.unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.analyzed, 1);
        assert_eq!(backend.measured.lock().unwrap().len(), 3);

        let full = store::read_all(&output.path().join(FULL_ANALYSIS_FILE)).unwrap();
        assert_eq!(full.len(), 3);
    }

    #[tokio::test]
    async fn test_analyze_failure_continues_batch() {
        let output = TempDir::new().unwrap();
        add_mesh(output.path(), "simplified_deVries", "a_smoothed.ply");
        add_mesh(output.path(), "simplified_deVries", "broken_smoothed.ply");
        add_mesh(output.path(), "simplified_deVries", "c_smoothed.ply");

        let backend = MeasuringBackend::default();
        let summary = analyze_all(&backend, output.path(), false).await.unwrap();

        assert_eq!(summary.analyzed, 2);
        assert_eq!(summary.failed, 1);

        let failed =
            store::read_all(&output.path().join("simplified_deVries_failed.csv")).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(
            failed.records[0].get("File"),
            Some(&Value::from("broken_smoothed.ply"))
        );
        assert!(failed.records[0]
            .get("Error")
            .and_then(Value::as_str)
            .is_some_and(|e| e.contains("could not read")));
    }

    #[tokio::test]
    async fn test_full_table_alone_prevents_remeasuring() {
        let output = TempDir::new().unwrap();
        add_mesh(output.path(), "simplified_deVries", "a_smoothed.ply");
        add_mesh(output.path(), "simplified_deVries_remesh", "a_smoothed.ply");

        let backend = MeasuringBackend::default();
        analyze_all(&backend, output.path(), false).await.unwrap();

        for group in ["simplified_deVries", "simplified_deVries_remesh"] {
            fs::remove_file(output.path().join(format!("{}_analysis.csv", group))).unwrap();
        }
        let summary = analyze_all(&backend, output.path(), false).await.unwrap();

        assert_eq!(summary.analyzed, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(backend.measured.lock().unwrap().len(), 2);

        let full = store::read_all(&output.path().join(FULL_ANALYSIS_FILE)).unwrap();
        assert_eq!(full.len(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_group_table_skips_only_that_group() {
        let output = TempDir::new().unwrap();
        add_mesh(output.path(), "simplified_deVries", "a_smoothed.ply");
        add_mesh(output.path(), "simplified_morley", "a_simplified_smoothed.ply");
        fs::write(
            output.path().join("simplified_deVries_analysis.csv"),
            b"File,Algorithm\n\xff\xfe.ply,simplified_deVries\n",
        )
        .unwrap();

        let backend = MeasuringBackend::default();
        let summary = analyze_all(&backend, output.path(), false).await.unwrap();

        assert_eq!(summary.groups, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.analyzed, 1);
        assert_eq!(
            *backend.measured.lock().unwrap(),
            vec!["a_simplified_smoothed.ply".to_string()]
        );
    }

    #[tokio::test]
    async fn test_write_failure_counts_and_continues() {
        let output = TempDir::new().unwrap();
        add_mesh(output.path(), "simplified_deVries", "a_smoothed.ply");
        add_mesh(output.path(), "simplified_morley", "a_simplified_smoothed.ply");
        // A directory where the full table should be makes every write fail.
        fs::create_dir_all(output.path().join(FULL_ANALYSIS_FILE)).unwrap();

        let backend = MeasuringBackend::default();
        let summary = analyze_all(&backend, output.path(), false).await.unwrap();

        assert_eq!(summary.analyzed, 0);
        assert_eq!(summary.failed, 2);
        assert_eq!(backend.measured.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_analyze_ignores_excluded_folders() {
        let output = TempDir::new().unwrap();
        add_mesh(output.path(), "temp", "a_smoothed.ply");
        add_mesh(output.path(), "analyzed", "a_smoothed.ply");

        let backend = MeasuringBackend::default();
        let summary = analyze_all(&backend, output.path(), false).await.unwrap();

        assert_eq!(summary.groups, 0);
        assert!(backend.measured.lock().unwrap().is_empty());
    }
}
