//! Mesh toolchain backends.
//!
//! The pipelines delegate every geometric operation to external
//! toolchains. [`MeshBackend`] is the seam the process engine and the
//! analysis step talk to; [`ScriptBackend`] drives pymeshlab and the R
//! shape-analysis packages as subprocesses.

pub mod external;
mod scripts;

pub use external::{ScriptBackend, ToolPaths};

use crate::models::Measurements;
use crate::settings::{Algorithm, Pipeline};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Decimation parameters shared by both pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifyParams {
    /// Target number of faces after quadric edge collapse.
    pub target_face_count: u32,
    /// Quality threshold for edge collapse (Morley only).
    pub quality_threshold: f64,
    /// Connected components with fewer faces are removed (Morley only).
    pub min_component_size: u32,
}

impl Default for SimplifyParams {
    fn default() -> Self {
        Self {
            target_face_count: 10_000,
            quality_threshold: 1.0,
            min_component_size: 5_000,
        }
    }
}

/// Taubin smoothing parameters of the Morley post-pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    pub taubin_iterations: u32,
    pub taubin_lambda: f64,
    pub taubin_mu: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            taubin_iterations: 10,
            taubin_lambda: 0.9,
            taubin_mu: -0.95,
        }
    }
}

/// A single mesh to simplify with one algorithm variant.
#[derive(Debug, Clone)]
pub struct SimplifyJob {
    pub algorithm: Algorithm,
    pub input: PathBuf,
    pub output: PathBuf,
}

/// External mesh-processing and shape-analysis operations.
///
/// Implementations must write their result to the given output path and
/// return an error if anything went wrong; callers handle staging and
/// skip logic.
#[allow(async_fn_in_trait)]
pub trait MeshBackend {
    /// Clean and decimate a mesh according to the job's algorithm.
    async fn simplify(&self, job: &SimplifyJob) -> Result<()>;

    /// Smooth an already simplified mesh with the pipeline's smoothing step.
    async fn smooth(&self, pipeline: Pipeline, input: &Path, output: &Path) -> Result<()>;

    /// Compute DNE, OPCR and RFI for a mesh.
    async fn measure(&self, mesh: &Path) -> Result<Measurements>;
}
