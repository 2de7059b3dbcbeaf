//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// VersaMesh - batch mesh simplification and shape analysis
///
/// Simplifies a folder of 3D surface scans with the Morley and de Vries
/// pipelines, then measures DNE, OPCR and RFI on the results.
/// Without a command an interactive shell is started.
///
/// Examples:
///   versamesh
///   versamesh --input ./scans --algorithms morley,deVries process
///   versamesh --output ./output analyze
///   versamesh combine --folder ./output
///   versamesh --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Run a single command instead of the interactive shell
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .versamesh.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Folder containing the .ply scans to process
    #[arg(short, long, value_name = "DIR", env = "VERSAMESH_INPUT", global = true)]
    pub input: Option<PathBuf>,

    /// Folder receiving simplified meshes and analysis tables
    #[arg(short, long, value_name = "DIR", env = "VERSAMESH_OUTPUT", global = true)]
    pub output: Option<PathBuf>,

    /// Algorithms to run (comma-separated, case sensitive)
    ///
    /// Example: --algorithms morley,deVries_preserveBoundary
    #[arg(short, long, value_name = "NAMES", global = true)]
    pub algorithms: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .versamesh.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// One-shot commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Simplify and smooth every scan in the input folder
    Process,
    /// Measure every smoothed mesh in the output folder
    Analyze,
    /// Combine result tables into one dataset
    Combine(CombineArgs),
}

/// Options of the `combine` command, shared with the shell.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct CombineArgs {
    /// Folder holding the tables to combine
    #[arg(short, long, value_name = "DIR")]
    pub folder: Option<PathBuf>,

    /// Name of the control group
    #[arg(short = 'g', long, value_name = "NAME")]
    pub control_group: Option<String>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref input) = self.input {
            if input.exists() && !input.is_dir() {
                return Err(format!(
                    "Input path is not a directory: {}",
                    input.display()
                ));
            }
        }

        if let Some(ref output) = self.output {
            if output.exists() && !output.is_dir() {
                return Err(format!(
                    "Output path is not a directory: {}",
                    output.display()
                ));
            }
        }

        if let Some(ref algorithms) = self.algorithms {
            if algorithms.trim().is_empty() {
                return Err("Algorithm list must not be empty".to_string());
            }
        }

        if let Some(Command::Combine(ref combine)) = self.command {
            if let Some(ref folder) = combine.folder {
                if !folder.is_dir() {
                    return Err(format!(
                        "Combine folder does not exist: {}",
                        folder.display()
                    ));
                }
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
