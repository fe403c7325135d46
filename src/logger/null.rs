//! Inert backend.

use std::path::Path;

use super::{Logger, Metrics};
use crate::Result;

/// Logger that discards every call.
///
/// Used when logging is disabled, and when reloading an experiment whose
/// original backend cannot be resumed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl NullLogger {
    /// Create a new inert logger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Logger for NullLogger {
    fn log_metrics(&mut self, _metrics: &Metrics, _step: Option<u64>) -> Result<()> {
        Ok(())
    }

    fn log_figure(&mut self, _name: &str, _png: &[u8], _step: Option<u64>) -> Result<()> {
        Ok(())
    }

    fn log_artifact(&mut self, _path: &Path, _name: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
