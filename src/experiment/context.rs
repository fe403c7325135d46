//! The experiment context handed to user code.

use std::fmt;

use super::ExperimentMeta;
use crate::config::Config;
use crate::layout::ExpPaths;
use crate::logger::Logger;

/// Identifier, paths, configuration, metadata and logger of one experiment.
///
/// Produced by [`create`](super::create) and [`reload`](super::reload) and
/// consumed by [`finalize`](super::finalize).
pub struct ExpContext {
    exp_id: String,
    project: String,
    paths: ExpPaths,
    config: Config,
    meta: ExperimentMeta,
    logger: Box<dyn Logger>,
}

impl ExpContext {
    /// Assemble a context from its parts.
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        paths: ExpPaths,
        config: Config,
        meta: ExperimentMeta,
        logger: Box<dyn Logger>,
    ) -> Self {
        Self {
            exp_id: meta.exp_id().to_string(),
            project: project.into(),
            paths,
            config,
            meta,
            logger,
        }
    }

    /// Experiment identifier.
    #[must_use]
    pub fn exp_id(&self) -> &str {
        &self.exp_id
    }

    /// Project name (may differ from `meta().project()` after a reload override).
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Directory layout.
    #[must_use]
    pub const fn paths(&self) -> &ExpPaths {
        &self.paths
    }

    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Metadata record.
    #[must_use]
    pub const fn meta(&self) -> &ExperimentMeta {
        &self.meta
    }

    /// Mutable metadata record; changes are persisted by `finalize`.
    pub fn meta_mut(&mut self) -> &mut ExperimentMeta {
        &mut self.meta
    }

    /// Logger backend.
    pub fn logger(&mut self) -> &mut dyn Logger {
        self.logger.as_mut()
    }
}

impl fmt::Debug for ExpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpContext")
            .field("exp_id", &self.exp_id)
            .field("project", &self.project)
            .field("paths", &self.paths)
            .field("config", &self.config)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
