//! Input discovery for survey exports.
//!
//! Inputs may be individual files or directories. Directories are walked
//! recursively and filtered by extension, size and hidden-ness.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Configuration for input discovery.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include (lowercase, without dot)
    pub extensions: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["csv", "tsv", "xlsx", "xls", "xlsm", "ods"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_file_size: 5 * 1024 * 1024, // 5MB
        }
    }
}

/// Discovered input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Resolves command-line inputs into a list of survey files.
pub struct InputScanner {
    config: ScanConfig,
}

impl InputScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Expand every input into matching files.
    ///
    /// Explicit file arguments are always kept (even with an unknown
    /// extension) so that unreadable inputs are reported rather than
    /// silently ignored. Directory contents are filtered.
    pub fn scan(&self, inputs: &[PathBuf]) -> Vec<ScannedFile> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_dir() {
                let mut found = self.walk(input);
                found.sort_by(|a, b| a.path.cmp(&b.path));
                debug!("{} survey files under {}", found.len(), input.display());
                files.extend(found);
            } else {
                let size = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0);
                files.push(ScannedFile {
                    path: input.clone(),
                    size,
                });
            }
        }

        files.dedup_by(|a, b| a.path == b.path);
        files
    }

    /// Check if a file matches scan criteria.
    pub fn matches(&self, path: &Path) -> bool {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if is_hidden(name) {
                return false;
            }
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !self.config.extensions.contains(&ext) {
            return false;
        }

        match std::fs::metadata(path) {
            Ok(metadata) if metadata.len() > self.config.max_file_size => {
                warn!(
                    "Skipping {}: {} bytes exceeds the {} byte limit",
                    path.display(),
                    metadata.len(),
                    self.config.max_file_size
                );
                false
            }
            Ok(_) => true,
            Err(_) => false,
        }
    }

    fn walk(&self, root: &Path) -> Vec<ScannedFile> {
        WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()))
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    debug!("Cannot read directory entry: {}", e);
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && self.matches(e.path()))
            .map(|e| ScannedFile {
                size: e.metadata().map(|m| m.len()).unwrap_or(0),
                path: e.into_path(),
            })
            .collect()
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with("~$")
}
