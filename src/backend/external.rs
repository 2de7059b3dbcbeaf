//! Subprocess backend for pymeshlab and the R shape-analysis packages.

use super::scripts::{self, RESULT_MARKER};
use super::{MeshBackend, SimplifyJob, SimplifyParams, SmoothingParams};
use crate::models::Measurements;
use crate::settings::Pipeline;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Range of the OPCR per-angle breakdown kept in the results.
const OPCR_ANGLE_RANGE: std::ops::Range<usize> = 8..16;

/// Interpreters used to run the driver scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    /// Python interpreter with pymeshlab installed.
    #[serde(default = "default_python")]
    pub python: String,
    /// Rscript with Rvcg, molaR, V8, doolkit and jsonlite installed.
    #[serde(default = "default_rscript")]
    pub rscript: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            python: default_python(),
            rscript: default_rscript(),
        }
    }
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_rscript() -> String {
    "Rscript".to_string()
}

/// Backend running each operation as a short-lived interpreter process.
#[derive(Debug, Clone)]
pub struct ScriptBackend {
    tools: ToolPaths,
    simplify: SimplifyParams,
    smoothing: SmoothingParams,
}

impl ScriptBackend {
    pub fn new(tools: ToolPaths, simplify: SimplifyParams, smoothing: SmoothingParams) -> Self {
        Self {
            tools,
            simplify,
            smoothing,
        }
    }

    async fn python(&self, script: &str, args: Vec<OsString>) -> Result<String> {
        run(&self.tools.python, "-c", script, args).await
    }

    async fn rscript(&self, script: &str, args: Vec<OsString>) -> Result<String> {
        run(&self.tools.rscript, "-e", script, args).await
    }
}

impl MeshBackend for ScriptBackend {
    async fn simplify(&self, job: &SimplifyJob) -> Result<()> {
        let flag = |b: bool| OsString::from(if b { "1" } else { "0" });
        let args = vec![
            job.input.clone().into_os_string(),
            job.output.clone().into_os_string(),
            job.algorithm.pipeline.name().into(),
            self.simplify.target_face_count.to_string().into(),
            self.simplify.quality_threshold.to_string().into(),
            self.simplify.min_component_size.to_string().into(),
            flag(job.algorithm.preserve_boundary),
            flag(job.algorithm.remesh),
        ];

        self.python(scripts::PY_SIMPLIFY, args).await?;
        Ok(())
    }

    async fn smooth(&self, pipeline: Pipeline, input: &Path, output: &Path) -> Result<()> {
        let paths = vec![input.as_os_str().to_owned(), output.as_os_str().to_owned()];

        match pipeline {
            Pipeline::DeVries => {
                self.python(scripts::PY_HC_SMOOTH, paths).await?;
            }
            Pipeline::Morley => {
                let mut args = paths;
                args.push(self.smoothing.taubin_iterations.to_string().into());
                args.push(self.smoothing.taubin_lambda.to_string().into());
                args.push(self.smoothing.taubin_mu.to_string().into());
                self.rscript(scripts::R_TAUBIN_SMOOTH, args).await?;
            }
        }

        Ok(())
    }

    async fn measure(&self, mesh: &Path) -> Result<Measurements> {
        let stdout = self
            .rscript(scripts::R_MEASURE, vec![mesh.as_os_str().to_owned()])
            .await?;
        parse_measurements(&stdout)
    }
}

/// Shape of the JSON line printed by the measurement script.
#[derive(Debug, Deserialize)]
struct RawMeasurements {
    dne: Vec<f64>,
    opcr: f64,
    opcr_breakdown: Vec<f64>,
    rfi_boyer: f64,
    rfi_ungar: f64,
}

impl TryFrom<RawMeasurements> for Measurements {
    type Error = anyhow::Error;

    fn try_from(raw: RawMeasurements) -> Result<Self> {
        let [dne, convex_dne, concave_dne, convex_area, concave_area] = raw.dne[..] else {
            bail!("Expected 5 DNE values, got {}", raw.dne.len());
        };

        let opcr_angles: [f64; 8] = raw
            .opcr_breakdown
            .get(OPCR_ANGLE_RANGE)
            .and_then(|slice| slice.try_into().ok())
            .with_context(|| {
                format!(
                    "Expected 16 OPCR breakdown values, got {}",
                    raw.opcr_breakdown.len()
                )
            })?;

        Ok(Measurements {
            dne,
            convex_dne,
            concave_dne,
            convex_area,
            concave_area,
            opcr: raw.opcr,
            opcr_angles,
            rfi_boyer: raw.rfi_boyer,
            rfi_ungar: raw.rfi_ungar,
        })
    }
}

/// Extract the measurements from the script's output.
fn parse_measurements(stdout: &str) -> Result<Measurements> {
    let line = stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(RESULT_MARKER))
        .context("Analysis script produced no result line")?;

    let raw: RawMeasurements =
        serde_json::from_str(line.trim()).context("Failed to parse analysis result")?;
    raw.try_into()
}

/// Run `program flag script args..`, returning stdout on success.
async fn run(program: &str, flag: &str, script: &str, args: Vec<OsString>) -> Result<String> {
    debug!("Running {} with {} argument(s)", program, args.len());

    let output = Command::new(program)
        .arg(flag)
        .arg(script)
        .args(&args)
        .output()
        .await
        .with_context(|| format!("Failed to start '{}'", program))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("no error output");
        bail!("'{}' exited with {}: {}", program, output.status, detail.trim());
    }

    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_line(breakdown: usize) -> String {
        let breakdown: Vec<f64> = (0..breakdown).map(|i| i as f64).collect();
        format!(
            "{}{}",
            RESULT_MARKER,
            serde_json::json!({
                "dne": [150.2, 120.0, 30.2, 4.5, 1.25],
                "opcr": 62.5,
                "opcr_breakdown": breakdown,
                "rfi_boyer": 0.51,
                "rfi_ungar": 0.66,
            })
        )
    }

    #[test]
    fn test_parse_measurements() {
        let stdout = format!("Loading mesh...\nDNE computed\n{}\n", result_line(16));
        let m = parse_measurements(&stdout).unwrap();

        assert_eq!(m.dne, 150.2);
        assert_eq!(m.concave_area, 1.25);
        assert_eq!(m.opcr, 62.5);
        assert_eq!(m.opcr_angles, [8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        assert_eq!(m.rfi_ungar, 0.66);
    }

    #[test]
    fn test_parse_measurements_short_breakdown() {
        let err = parse_measurements(&result_line(12)).unwrap_err();
        assert!(err.to_string().contains("16 OPCR"));
    }

    #[test]
    fn test_parse_measurements_missing_marker() {
        assert!(parse_measurements("Error in library(doolkit)\n").is_err());
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let result = run("versamesh-no-such-interpreter", "-c", "", Vec::new()).await;
        assert!(result.is_err());
    }
}
