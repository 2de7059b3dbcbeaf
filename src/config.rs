//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.versamesh.toml` files.

use crate::analysis::DEFAULT_NUMERIC_COLUMN;
use crate::backend::{SimplifyParams, SmoothingParams, ToolPaths};
use crate::settings::{SettingKey, Settings, SettingsError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".versamesh.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Initial engine settings.
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Decimation parameters.
    #[serde(default)]
    pub simplify: SimplifyParams,

    /// Morley smoothing parameters.
    #[serde(default)]
    pub smoothing: SmoothingParams,

    /// External interpreters.
    #[serde(default)]
    pub tools: ToolPaths,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Folder whose tables `combine` reads by default.
    #[serde(default = "default_aggregate_folder")]
    pub aggregate_folder: String,

    /// Control group name passed to `combine`.
    #[serde(default = "default_control_group")]
    pub control_group: String,

    /// Column whose values must parse as numbers when combining.
    #[serde(default = "default_numeric_column")]
    pub numeric_column: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            aggregate_folder: default_aggregate_folder(),
            control_group: default_control_group(),
            numeric_column: default_numeric_column(),
        }
    }
}

fn default_aggregate_folder() -> String {
    "./data".to_string()
}

fn default_control_group() -> String {
    "sample_control".to_string()
}

fn default_numeric_column() -> String {
    DEFAULT_NUMERIC_COLUMN.to_string()
}

/// Settings the engine starts with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_input_folder")]
    pub input_folder: String,

    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Comma separated algorithm names.
    #[serde(default = "default_algorithms")]
    pub algorithms: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            input_folder: default_input_folder(),
            output_folder: default_output_folder(),
            algorithms: default_algorithms(),
        }
    }
}

fn default_input_folder() -> String {
    Settings::default().get(SettingKey::InputFolder)
}

fn default_output_folder() -> String {
    Settings::default().get(SettingKey::OutputFolder)
}

fn default_algorithms() -> String {
    Settings::default().algorithms_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only flags given on the command line override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref input) = args.input {
            self.settings.input_folder = input.display().to_string();
        }
        if let Some(ref output) = args.output {
            self.settings.output_folder = output.display().to_string();
        }
        if let Some(ref algorithms) = args.algorithms {
            self.settings.algorithms = algorithms.clone();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Build the initial engine settings, validating them the same way
    /// `set` does.
    pub fn to_settings(&self) -> Result<Settings, SettingsError> {
        Settings::default()
            .update(
                SettingKey::InputFolder.name(),
                &self.settings.input_folder,
            )?
            .update(
                SettingKey::OutputFolder.name(),
                &self.settings.output_folder,
            )?
            .update(SettingKey::Algorithms.name(), &self.settings.algorithms)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
