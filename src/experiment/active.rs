//! The "current experiment" of a project.
//!
//! Two pieces: a pointer file (`<project_root>/.expbox/active`) that lets a
//! later process find the last experiment that was made current, and
//! [`ActiveBox`], a caller-held handle that keeps the live context and
//! forwards to it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{create, finalize_with, reload_with, CreateOptions, ExpContext, ExperimentMeta};
use super::{FinalizeOptions, ReloadOptions};
use crate::config::Config;
use crate::layout::ExpPaths;
use crate::logger::Logger;
use crate::{Error, Result};

/// Dot-directory holding expbox state in a project root.
pub const STATE_DIR: &str = ".expbox";

/// Pointer file name inside [`STATE_DIR`].
pub const ACTIVE_FILE: &str = "active";

/// Location of the pointer file for `project_root`.
#[must_use]
pub fn active_pointer_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join(ACTIVE_FILE)
}

/// Record `exp_id` as the current experiment of `project_root`.
///
/// # Errors
///
/// Returns an IO error if the pointer file cannot be written.
pub fn write_active_pointer(project_root: &Path, exp_id: &str) -> Result<()> {
    let path = active_pointer_path(project_root);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&path, format!("{exp_id}\n"))?;
    debug!(%exp_id, path = %path.display(), "active pointer updated");
    Ok(())
}

/// Current experiment of `project_root`, if a pointer has been written.
///
/// # Errors
///
/// Returns an IO error if the pointer file exists but cannot be read.
pub fn read_active_pointer(project_root: &Path) -> Result<Option<String>> {
    let path = active_pointer_path(project_root);
    match fs::read_to_string(&path) {
        Ok(text) => {
            let exp_id = text.lines().next().unwrap_or("").trim();
            Ok((!exp_id.is_empty()).then(|| exp_id.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Handle to the current experiment of a project.
///
/// Starts empty; [`ActiveBox::create`], [`ActiveBox::reload`] and
/// [`ActiveBox::activate`] make an experiment current and update the pointer
/// file. Accessors fail with [`Error::NotActive`] until then.
#[derive(Debug)]
pub struct ActiveBox {
    project_root: PathBuf,
    current: Option<ExpContext>,
}

impl ActiveBox {
    /// Empty handle for the project rooted at `project_root`.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            current: None,
        }
    }

    /// Project root holding the pointer file.
    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Identifier recorded in the pointer file, possibly written by another process.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the pointer file cannot be read.
    pub fn pointer(&self) -> Result<Option<String>> {
        read_active_pointer(&self.project_root)
    }

    /// Whether a context is held.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Create an experiment and make it current.
    ///
    /// # Errors
    ///
    /// Any error from [`create`] or from writing the pointer file.
    pub fn create(&mut self, opts: CreateOptions) -> Result<&mut ExpContext> {
        let ctx = create(opts)?;
        self.activate(ctx)
    }

    /// Reload an experiment and make it current.
    ///
    /// # Errors
    ///
    /// Any error from [`reload_with`] or from writing the pointer file.
    pub fn reload(
        &mut self,
        exp_id: &str,
        results_root: &Path,
        opts: &ReloadOptions,
    ) -> Result<&mut ExpContext> {
        let ctx = reload_with(exp_id, results_root, opts)?;
        self.activate(ctx)
    }

    /// Make an existing context current, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the pointer file cannot be written.
    pub fn activate(&mut self, ctx: ExpContext) -> Result<&mut ExpContext> {
        write_active_pointer(&self.project_root, ctx.exp_id())?;
        Ok(self.current.insert(ctx))
    }

    /// Finalize the current experiment. It stays current afterwards.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`], or any error from [`finalize_with`].
    pub fn finalize(&mut self, opts: &FinalizeOptions) -> Result<()> {
        finalize_with(self.context_mut()?, opts)
    }

    /// The current context.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] if nothing is current.
    pub fn context(&self) -> Result<&ExpContext> {
        self.current.as_ref().ok_or(Error::NotActive)
    }

    /// The current context, mutably.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] if nothing is current.
    pub fn context_mut(&mut self) -> Result<&mut ExpContext> {
        self.current.as_mut().ok_or(Error::NotActive)
    }

    /// Identifier of the current experiment.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] if nothing is current.
    pub fn exp_id(&self) -> Result<&str> {
        Ok(self.context()?.exp_id())
    }

    /// Project of the current experiment.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] if nothing is current.
    pub fn project(&self) -> Result<&str> {
        Ok(self.context()?.project())
    }

    /// Paths of the current experiment.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] if nothing is current.
    pub fn paths(&self) -> Result<&ExpPaths> {
        Ok(self.context()?.paths())
    }

    /// Configuration of the current experiment.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] if nothing is current.
    pub fn config(&self) -> Result<&Config> {
        Ok(self.context()?.config())
    }

    /// Metadata of the current experiment.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] if nothing is current.
    pub fn meta(&self) -> Result<&ExperimentMeta> {
        Ok(self.context()?.meta())
    }

    /// Mutable metadata of the current experiment.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] if nothing is current.
    pub fn meta_mut(&mut self) -> Result<&mut ExperimentMeta> {
        Ok(self.context_mut()?.meta_mut())
    }

    /// Logger of the current experiment.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] if nothing is current.
    pub fn logger(&mut self) -> Result<&mut dyn Logger> {
        Ok(self.context_mut()?.logger())
    }

    /// Give up the handle, returning the current context if any.
    #[must_use]
    pub fn into_context(self) -> Option<ExpContext> {
        self.current
    }
}
