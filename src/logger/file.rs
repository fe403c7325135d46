//! Local file backend.
//!
//! Metrics are appended as JSON lines to `logs/metrics.jsonl`; the file is
//! never rewritten. Figures land in `figures/`, artifacts are copied into
//! `artifacts/`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_entry_name, Logger, Metrics};
use crate::layout::ExpPaths;
use crate::{Error, Result};

/// Metrics stream file name inside `logs/`.
pub const METRICS_FILE: &str = "metrics.jsonl";

/// One line of the metrics stream.
///
/// Non-finite values are stored as the strings `"NaN"`, `"inf"` and
/// `"-inf"`; a `null` value reads back as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricLine {
    /// Step the metrics belong to, if any.
    pub step: Option<u64>,
    /// Metric values.
    #[serde(with = "metric_values")]
    pub metrics: Metrics,
}

mod metric_values {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Metrics;

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Number(f64),
        Text(String),
        Null(()),
    }

    fn encode(value: f64) -> Stored {
        if value.is_nan() {
            Stored::Text("NaN".to_string())
        } else if value.is_infinite() {
            Stored::Text(if value > 0.0 { "inf" } else { "-inf" }.to_string())
        } else {
            Stored::Number(value)
        }
    }

    pub fn serialize<S: Serializer>(metrics: &Metrics, serializer: S) -> Result<S::Ok, S::Error> {
        let stored: BTreeMap<&str, Stored> = metrics
            .iter()
            .map(|(key, value)| (key.as_str(), encode(*value)))
            .collect();
        stored.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Metrics, D::Error> {
        let stored = BTreeMap::<String, Stored>::deserialize(deserializer)?;
        stored
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Stored::Number(n) => n,
                    Stored::Null(()) => f64::NAN,
                    Stored::Text(text) => match text.to_ascii_lowercase().as_str() {
                        "nan" => f64::NAN,
                        "inf" | "+inf" | "infinity" => f64::INFINITY,
                        "-inf" | "-infinity" => f64::NEG_INFINITY,
                        _ => {
                            return Err(D::Error::custom(format!(
                                "metric '{key}' has non-numeric value '{text}'"
                            )))
                        }
                    },
                };
                Ok((key, value))
            })
            .collect()
    }
}

/// Append-only logger writing into an experiment's directory tree.
#[derive(Debug)]
pub struct FileLogger {
    metrics_path: PathBuf,
    figures_dir: PathBuf,
    artifacts_dir: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileLogger {
    /// Open (or continue) the metrics stream of the experiment at `paths`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directories or the metrics file cannot be
    /// created.
    pub fn new(paths: &ExpPaths) -> Result<Self> {
        fs::create_dir_all(&paths.logs)?;
        fs::create_dir_all(&paths.figures)?;
        fs::create_dir_all(&paths.artifacts)?;

        let metrics_path = paths.logs.join(METRICS_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&metrics_path)?;

        Ok(Self {
            metrics_path,
            figures_dir: paths.figures.clone(),
            artifacts_dir: paths.artifacts.clone(),
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Path of the metrics stream.
    #[must_use]
    pub fn metrics_path(&self) -> &Path {
        &self.metrics_path
    }

    /// Whether [`Logger::close`] has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Read back every line of a metrics stream.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a JSON error for a
    /// malformed line.
    pub fn read_metrics(path: &Path) -> Result<Vec<MetricLine>> {
        let text = fs::read_to_string(path)?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Error::from))
            .collect()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.writer.is_none() {
            return Err(Error::LoggerClosed);
        }
        Ok(())
    }
}

impl Logger for FileLogger {
    fn log_metrics(&mut self, metrics: &Metrics, step: Option<u64>) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::LoggerClosed)?;
        let line = MetricLine {
            step,
            metrics: metrics.clone(),
        };
        serde_json::to_writer(&mut *writer, &line)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn log_figure(&mut self, name: &str, png: &[u8], _step: Option<u64>) -> Result<()> {
        self.ensure_open()?;
        check_entry_name(name)?;
        let file_name = if name.ends_with(".png") {
            name.to_string()
        } else {
            format!("{name}.png")
        };
        let dest = self.figures_dir.join(file_name);
        fs::write(&dest, png)?;
        debug!(path = %dest.display(), "figure written");
        Ok(())
    }

    fn log_artifact(&mut self, path: &Path, name: Option<&str>) -> Result<()> {
        self.ensure_open()?;
        let name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    Error::Other(format!("artifact path has no file name: {}", path.display()))
                })?,
        };
        check_entry_name(&name)?;

        let dest = self.artifacts_dir.join(&name);
        // Copying a file onto itself would truncate it.
        let same = match (path.canonicalize(), dest.canonicalize()) {
            (Ok(src), Ok(dst)) => src == dst,
            _ => false,
        };
        if !same {
            fs::copy(path, &dest)?;
        }
        debug!(src = %path.display(), dest = %dest.display(), "artifact recorded");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}
