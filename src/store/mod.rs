//! On-disk chart store.
//!
//! Charts are written as SVG files under one directory, named by their
//! deterministic chart name. Saving the same name again overwrites.

use crate::error::{PipelineError, Result};
use crate::report::ChartArtifact;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const EXTENSION: &str = "svg";

#[derive(Debug, Clone)]
pub struct ChartStore {
    dir: PathBuf,
}

impl ChartStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A bare `*.svg` file name; anything with a path component is refused.
    fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && !name.contains(['/', '\\'])
            && !name.contains("..")
            && Path::new(name).extension().and_then(|e| e.to_str()) == Some(EXTENSION)
    }

    /// Persist a chart, returning its path.
    pub fn save(&self, chart: &ChartArtifact) -> Result<PathBuf> {
        if !Self::is_valid_name(&chart.name) {
            return Err(PipelineError::artifact(&chart.name, "invalid chart name"));
        }

        fs::create_dir_all(&self.dir)
            .map_err(|e| PipelineError::artifact(&chart.name, e))?;
        let path = self.dir.join(&chart.name);
        fs::write(&path, chart.to_svg()).map_err(|e| PipelineError::artifact(&chart.name, e))?;

        debug!("Stored chart {}", path.display());
        Ok(path)
    }

    /// Path of a stored chart, if the name is valid and the file exists.
    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        if !Self::is_valid_name(name) {
            warn!("Rejected chart lookup for '{}'", name);
            return None;
        }
        let path = self.dir.join(name);
        path.is_file().then_some(path)
    }

    /// Names of every stored chart, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| Self::is_valid_name(name))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Delete the named charts, returning how many were removed.
    pub fn remove<S: AsRef<str>>(&self, names: &[S]) -> usize {
        let mut removed = 0;
        for name in names {
            let Some(path) = self.lookup(name.as_ref()) else {
                continue;
            };
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not remove chart {}: {}", path.display(), e),
            }
        }
        removed
    }

    /// Delete every stored chart.
    pub fn clear(&self) -> Result<usize> {
        let names = self.list()?;
        let removed = self.remove(&names);
        info!("Cleared {} chart(s) from {}", removed, self.dir.display());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::distribution_row;
    use crate::models::Distribution;
    use crate::report::chart::render;
    use crate::report::LabelWrap;

    fn chart(name: &str) -> ChartArtifact {
        let distribution = Distribution {
            category: "Teaching".to_string(),
            rows: vec![distribution_row("Clarity".into(), "c".into(), [1, 0, 0, 0, 1])],
        };
        render(&distribution, "Teaching Ratings", name, LabelWrap::default()).unwrap()
    }

    #[test]
    fn test_save_lookup_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path().join("charts"));

        assert!(store.list().unwrap().is_empty());

        let path = store.save(&chart("b.svg")).unwrap();
        store.save(&chart("a.svg")).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("<svg"));

        assert_eq!(store.lookup("b.svg"), Some(path));
        assert_eq!(store.lookup("missing.svg"), None);
        assert_eq!(store.list().unwrap(), vec!["a.svg", "b.svg"]);
    }

    #[test]
    fn test_save_overwrites_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());

        store.save(&chart("same.svg")).unwrap();
        store.save(&chart("same.svg")).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_lookup_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path().join("charts"));
        fs::write(dir.path().join("secret.svg"), "x").unwrap();

        assert_eq!(store.lookup("../secret.svg"), None);
        assert_eq!(store.lookup("/etc/passwd"), None);
        assert_eq!(store.lookup("notes.txt"), None);
        assert!(store.save(&chart("../escape.svg")).is_err());
    }

    #[test]
    fn test_remove_only_named_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());
        for name in ["run1_a.svg", "run1_b.svg", "run2_a.svg"] {
            store.save(&chart(name)).unwrap();
        }
        fs::write(dir.path().join("keep.txt"), "not a chart").unwrap();

        assert_eq!(store.remove(&["run1_a.svg", "run1_b.svg", "gone.svg"]), 2);
        assert_eq!(store.list().unwrap(), vec!["run2_a.svg"]);

        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.list().unwrap().is_empty());
        assert!(dir.path().join("keep.txt").exists());
    }
}
