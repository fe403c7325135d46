//! Logging backends for metrics, figures and file artifacts.
//!
//! Every experiment owns exactly one [`Logger`]. Backends:
//!
//! - [`NullLogger`]: discards everything
//! - [`FileLogger`]: appends JSONL metrics under `logs/`, writes figures and
//!   copies artifacts into the experiment tree
//! - [`RemoteLogger`]: forwards to an external tracking service through a
//!   [`TrackingClient`]
//!
//! ## Example
//!
//! ```rust
//! use expbox::logger::{Logger, Metrics, NullLogger};
//!
//! let mut logger = NullLogger::new();
//! let metrics = Metrics::from([("loss".to_string(), 0.25)]);
//! logger.log_metrics(&metrics, Some(1))?;
//! logger.close()?;
//! # Ok::<(), expbox::Error>(())
//! ```

mod file;
mod null;
mod remote;

pub use file::{FileLogger, MetricLine, METRICS_FILE};
pub use null::NullLogger;
#[cfg(feature = "remote")]
pub use remote::HttpTrackingClient;
pub use remote::{RemoteLogger, TrackingClient, TRACKING_TOKEN_ENV, TRACKING_URL_ENV};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Metric name to value for one step.
pub type Metrics = BTreeMap<String, f64>;

/// Capability set shared by all logging backends.
pub trait Logger {
    /// Record a set of metrics, optionally tagged with a step.
    ///
    /// # Errors
    ///
    /// Backend-specific; [`Error::LoggerClosed`] after [`Logger::close`].
    fn log_metrics(&mut self, metrics: &Metrics, step: Option<u64>) -> Result<()>;

    /// Record a rendered figure (PNG bytes) under `name`.
    ///
    /// # Errors
    ///
    /// Backend-specific; [`Error::LoggerClosed`] after [`Logger::close`].
    fn log_figure(&mut self, name: &str, png: &[u8], step: Option<u64>) -> Result<()>;

    /// Record the file at `path` as an artifact, named `name` or its file name.
    ///
    /// # Errors
    ///
    /// Backend-specific; [`Error::LoggerClosed`] after [`Logger::close`].
    fn log_artifact(&mut self, path: &Path, name: Option<&str>) -> Result<()>;

    /// Flush and release resources. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Backend-specific flush or network failure.
    fn close(&mut self) -> Result<()>;

    /// Identifier of the external run, for backends that have one.
    fn run_id(&self) -> Option<&str> {
        None
    }
}

/// Which backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerKind {
    /// [`NullLogger`]
    #[default]
    None,
    /// [`FileLogger`]
    File,
    /// [`RemoteLogger`]
    #[serde(alias = "wandb")]
    Remote,
}

impl LoggerKind {
    /// Tag stored in metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File => "file",
            Self::Remote => "remote",
        }
    }
}

impl FromStr for LoggerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "null" => Ok(Self::None),
            "file" => Ok(Self::File),
            "remote" | "wandb" => Ok(Self::Remote),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown logger kind '{other}' (expected none, file or remote)"
            ))),
        }
    }
}

impl fmt::Display for LoggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject names that would escape the target directory.
fn check_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(Error::Other(format!("invalid log entry name '{name}'")));
    }
    Ok(())
}
