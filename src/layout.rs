//! Directory layout of a single experiment box.

use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;

/// Metadata file name inside an experiment root.
pub const META_FILE: &str = "meta.json";

/// Paths for one experiment under `results_root/exp_id/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpPaths {
    /// `results_root/exp_id`
    pub root: PathBuf,
    /// Config snapshots, model weights, tables.
    pub artifacts: PathBuf,
    /// Generated figures.
    pub figures: PathBuf,
    /// Log files and metrics streams.
    pub logs: PathBuf,
    /// Experiment-specific notebooks.
    pub notebooks: PathBuf,
}

impl ExpPaths {
    /// Resolve the layout without touching the filesystem.
    #[must_use]
    pub fn resolve(results_root: &Path, exp_id: &str) -> Self {
        let root = results_root.join(exp_id);
        Self {
            artifacts: root.join("artifacts"),
            figures: root.join("figures"),
            logs: root.join("logs"),
            notebooks: root.join("notebooks"),
            root,
        }
    }

    /// Create (or reuse) the directory tree for `exp_id` under `results_root`.
    ///
    /// Idempotent: existing directories and their contents are left alone.
    ///
    /// # Errors
    ///
    /// Returns an IO error if a directory cannot be created.
    pub fn create(results_root: &Path, exp_id: &str) -> Result<Self> {
        let paths = Self::resolve(results_root, exp_id);
        for dir in [
            &paths.root,
            &paths.artifacts,
            &paths.figures,
            &paths.logs,
            &paths.notebooks,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(paths)
    }

    /// Path of `meta.json`.
    #[must_use]
    pub fn meta_file(&self) -> PathBuf {
        self.root.join(META_FILE)
    }
}
