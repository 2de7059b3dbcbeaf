//! Processing settings and their validated updates.
//!
//! `Settings` is an immutable value. Every change goes through
//! [`Settings::update`], which returns a new value or an error and never
//! touches the original.

use crate::scanner;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Errors raised while changing settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// The key is not one of the recognized settings.
    #[error("'{key}' is not a valid setting (expected one of: inputFolder, outputFolder, algorithms)")]
    InvalidKey { key: String },
}

/// Base simplification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pipeline {
    /// Morley & Berthaume (2023): decimate, then Taubin smoothing in R.
    Morley,
    /// de Vries et al. (2024): clean, decimate, HC Laplacian smoothing.
    DeVries,
}

impl Pipeline {
    pub fn name(&self) -> &'static str {
        match self {
            Pipeline::Morley => "morley",
            Pipeline::DeVries => "deVries",
        }
    }
}

/// One selectable algorithm variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Algorithm {
    pub pipeline: Pipeline,
    /// Run isotropic explicit remeshing after decimation.
    pub remesh: bool,
    /// Keep mesh boundaries intact during decimation.
    pub preserve_boundary: bool,
}

impl Algorithm {
    /// Every supported variant, in dispatch order.
    pub const ALL: [Algorithm; 8] = [
        Algorithm::new(Pipeline::Morley, false, false),
        Algorithm::new(Pipeline::Morley, false, true),
        Algorithm::new(Pipeline::Morley, true, false),
        Algorithm::new(Pipeline::Morley, true, true),
        Algorithm::new(Pipeline::DeVries, false, false),
        Algorithm::new(Pipeline::DeVries, false, true),
        Algorithm::new(Pipeline::DeVries, true, false),
        Algorithm::new(Pipeline::DeVries, true, true),
    ];

    pub const fn new(pipeline: Pipeline, remesh: bool, preserve_boundary: bool) -> Self {
        Self {
            pipeline,
            remesh,
            preserve_boundary,
        }
    }

    /// Name used in settings and in output folder names.
    pub fn name(&self) -> String {
        let mut name = self.pipeline.name().to_string();
        if self.remesh {
            name.push_str("_remesh");
        }
        if self.preserve_boundary {
            name.push_str("_preserveBoundary");
        }
        name
    }

    /// Output subfolder holding this variant's results.
    pub fn folder_name(&self) -> String {
        format!("simplified_{}", self.name())
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    /// Names are case sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| format!("'{}' is not a supported algorithm", s))
    }
}

/// The three recognized setting keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    InputFolder,
    OutputFolder,
    Algorithms,
}

impl SettingKey {
    pub const ALL: [SettingKey; 3] = [
        SettingKey::InputFolder,
        SettingKey::OutputFolder,
        SettingKey::Algorithms,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SettingKey::InputFolder => "inputFolder",
            SettingKey::OutputFolder => "outputFolder",
            SettingKey::Algorithms => "algorithms",
        }
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| SettingsError::InvalidKey { key: s.to_string() })
    }
}

/// Folders and algorithm selection for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub algorithms: Vec<Algorithm>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from("data"),
            output_folder: PathBuf::from("output"),
            algorithms: Algorithm::ALL.to_vec(),
        }
    }
}

impl Settings {
    /// Return a copy of these settings with `key` set to `value`.
    ///
    /// An algorithm list with no supported names leaves the current list
    /// in place.
    pub fn update(&self, key: &str, value: &str) -> Result<Settings, SettingsError> {
        let key: SettingKey = key.parse()?;
        let mut next = self.clone();

        match key {
            SettingKey::InputFolder => {
                let folder = PathBuf::from(value);
                if scanner::count_meshes(&folder) == 0 {
                    warn!(
                        "0 .{} files were found in '{}', please verify the folder is correct.",
                        scanner::MESH_EXTENSION,
                        folder.display()
                    );
                }
                next.input_folder = folder;
            }
            SettingKey::OutputFolder => {
                next.output_folder = PathBuf::from(value);
            }
            SettingKey::Algorithms => {
                let algorithms = parse_algorithm_list(value);
                if algorithms.is_empty() {
                    warn!("No supported algorithms were provided. No changes made.");
                } else {
                    next.algorithms = algorithms;
                }
            }
        }

        Ok(next)
    }

    /// Current value of a setting, formatted for display.
    pub fn get(&self, key: SettingKey) -> String {
        match key {
            SettingKey::InputFolder => self.input_folder.display().to_string(),
            SettingKey::OutputFolder => self.output_folder.display().to_string(),
            SettingKey::Algorithms => self.algorithms_string(),
        }
    }

    /// The algorithm list as a comma separated string.
    pub fn algorithms_string(&self) -> String {
        self.algorithms
            .iter()
            .map(Algorithm::name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Key/value pairs in display order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        SettingKey::ALL
            .iter()
            .map(|key| (key.name(), self.get(*key)))
            .collect()
    }
}

/// Parse a comma separated algorithm list, dropping unsupported and
/// repeated names.
pub fn parse_algorithm_list(value: &str) -> Vec<Algorithm> {
    let mut algorithms = Vec::new();

    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        match name.parse::<Algorithm>() {
            Ok(algorithm) if !algorithms.contains(&algorithm) => algorithms.push(algorithm),
            Ok(_) => {}
            Err(_) => warn!(
                "{} is not a supported algorithm and will be skipped. Algorithm names are case sensitive.",
                name
            ),
        }
    }

    algorithms
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[test]
    fn test_algorithm_names_round_trip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.name().parse::<Algorithm>(), Ok(algorithm));
        }
        assert_eq!(
            Algorithm::new(Pipeline::DeVries, true, true).name(),
            "deVries_remesh_preserveBoundary"
        );
        assert_eq!(
            Algorithm::new(Pipeline::Morley, false, true).folder_name(),
            "simplified_morley_preserveBoundary"
        );
    }

    #[test]
    fn test_algorithm_names_case_sensitive() {
        assert!("Morley".parse::<Algorithm>().is_err());
        assert!("devries".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_invalid_key_leaves_settings_unchanged() {
        let settings = Settings::default();
        let result = settings.update("colour", "blue");

        assert_eq!(
            result,
            Err(SettingsError::InvalidKey {
                key: "colour".to_string()
            })
        );
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_all_invalid_algorithms_keep_previous_list() {
        let settings = Settings::default()
            .update("algorithms", "morley, deVries_remesh")
            .unwrap();
        let updated = settings.update("algorithms", "fancy, MORLEY ,").unwrap();

        assert_eq!(updated.algorithms, settings.algorithms);
        assert_eq!(updated.algorithms_string(), "morley, deVries_remesh");
    }

    #[test]
    fn test_algorithm_list_filters_and_dedupes() {
        let settings = Settings::default()
            .update(
                "algorithms",
                " deVries_preserveBoundary,bogus, deVries_preserveBoundary ,morley_remesh",
            )
            .unwrap();

        assert_eq!(
            settings.algorithms,
            vec![
                Algorithm::new(Pipeline::DeVries, false, true),
                Algorithm::new(Pipeline::Morley, true, false),
            ]
        );
    }

    #[test]
    fn test_folders_accepted_verbatim() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tooth.ply"), b"ply").unwrap();
        let input = dir.path().display().to_string();

        let settings = Settings::default()
            .update("inputFolder", &input)
            .unwrap()
            .update("outputFolder", "./my output")
            .unwrap();

        assert_eq!(settings.input_folder, dir.path());
        assert_eq!(settings.output_folder, PathBuf::from("./my output"));
    }

    /// Log output captured from a scoped subscriber.
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    fn update_logged(settings: &Settings, key: &str, value: &str) -> (Settings, String) {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let updated = tracing::subscriber::with_default(subscriber, || {
            settings.update(key, value).unwrap()
        });
        (updated, log.contents())
    }

    #[test]
    fn test_empty_input_folder_warns_but_applies() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().display().to_string();

        let (settings, log) = update_logged(&Settings::default(), "inputFolder", &input);
        assert_eq!(settings.input_folder, dir.path());
        assert!(log.contains("WARN"));
        assert!(log.contains("0 .ply files were found"));
    }

    #[test]
    fn test_input_folder_with_meshes_does_not_warn() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tooth.ply"), b"ply").unwrap();
        let input = dir.path().display().to_string();

        let (settings, log) = update_logged(&Settings::default(), "inputFolder", &input);
        assert_eq!(settings.input_folder, dir.path());
        assert!(!log.contains("WARN"));
    }

    #[test]
    fn test_entries_order() {
        let entries = Settings::default().entries();
        let keys: Vec<_> = entries.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["inputFolder", "outputFolder", "algorithms"]);
        assert_eq!(entries[0].1, "data");
    }
}
