//! File scanner for discovering meshes, tables and output groups.
//!
//! All lookups are a single directory level deep, skip hidden entries
//! (such as the `.partial` staging directory) and return paths sorted by
//! file name so batches run in a stable order.

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extension of mesh files handled by the pipelines.
pub const MESH_EXTENSION: &str = "ply";

/// Extension of result tables.
pub const TABLE_EXTENSION: &str = "csv";

/// Subfolder of an algorithm group holding smoothed meshes.
pub const SMOOTHED_DIR: &str = "smoothed";

/// Name fragments that mark an output subdirectory as not being a group.
const GROUP_EXCLUDES: [&str; 3] = ["analyzed", "temp", "failed"];

/// Directory scanner with a fixed root.
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    /// Create a new scanner for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Mesh files directly inside the root.
    pub fn meshes(&self) -> Vec<PathBuf> {
        self.files_with_extension(MESH_EXTENSION)
    }

    /// CSV tables directly inside the root.
    pub fn tables(&self) -> Vec<PathBuf> {
        self.files_with_extension(TABLE_EXTENSION)
    }

    /// Subdirectories that hold analysable groups of meshes.
    pub fn groups(&self) -> Vec<PathBuf> {
        self.entries()
            .into_iter()
            .filter(|path| path.is_dir())
            .filter(|path| {
                let name = file_name(path);
                !GROUP_EXCLUDES.iter().any(|pattern| name.contains(pattern))
            })
            .collect()
    }

    /// Check if a path has the given extension (ASCII case-insensitive).
    pub fn has_extension(path: &Path, extension: &str) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension))
    }

    fn files_with_extension(&self, extension: &str) -> Vec<PathBuf> {
        self.entries()
            .into_iter()
            .filter(|path| path.is_file() && Self::has_extension(path, extension))
            .collect()
    }

    fn entries(&self) -> Vec<PathBuf> {
        if !self.root.is_dir() {
            debug!("Not a directory: {}", self.root.display());
            return Vec::new();
        }

        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name().to_str()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.into_path()),
                Err(e) => {
                    debug!("Cannot read entry in {}: {}", self.root.display(), e);
                    None
                }
            })
            .collect()
    }
}

/// Count mesh files in a folder, used to sanity check settings.
pub fn count_meshes(dir: &Path) -> usize {
    FileScanner::new(dir).meshes().len()
}

/// The final path component as a string, or empty.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// The file name without its extension, or empty.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn is_hidden(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with('.'))
}
