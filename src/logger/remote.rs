//! External tracking-service backend.
//!
//! [`RemoteLogger`] owns one run on the service and talks to it only through
//! the [`TrackingClient`] trait, so tests can substitute an in-memory client.
//! [`HttpTrackingClient`] (feature `remote`) is the shipped JSON-over-HTTP
//! implementation.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use super::{Logger, Metrics};
use crate::config::Config;
use crate::{Error, Result};

/// Environment variable holding the tracking service base URL.
pub const TRACKING_URL_ENV: &str = "EXPBOX_TRACKING_URL";

/// Environment variable holding an optional bearer token.
pub const TRACKING_TOKEN_ENV: &str = "EXPBOX_TRACKING_TOKEN";

/// Minimal client surface of an external tracking service.
pub trait TrackingClient {
    /// Open a run and return its service-side identifier.
    ///
    /// # Errors
    ///
    /// [`Error::Tracking`] if the service rejects the request.
    fn start_run(&mut self, project: &str, name: &str, config: &Config) -> Result<String>;

    /// Send a JSON payload of values for `step`.
    ///
    /// # Errors
    ///
    /// [`Error::Tracking`] if the service rejects the request.
    fn log(&mut self, run_id: &str, step: Option<u64>, payload: &Value) -> Result<()>;

    /// Upload a file body. `kind` is `"figure"` or `"file"`.
    ///
    /// # Errors
    ///
    /// [`Error::Tracking`] if the service rejects the request.
    fn upload(&mut self, run_id: &str, name: &str, kind: &str, bytes: &[u8]) -> Result<()>;

    /// Mark the run finished.
    ///
    /// # Errors
    ///
    /// [`Error::Tracking`] if the service rejects the request.
    fn finish(&mut self, run_id: &str) -> Result<()>;
}

/// Logger forwarding to a run on an external tracking service.
pub struct RemoteLogger {
    client: Box<dyn TrackingClient>,
    run_id: String,
    finished: bool,
}

impl std::fmt::Debug for RemoteLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLogger")
            .field("run_id", &self.run_id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl RemoteLogger {
    /// Start a run named `exp_id` in `project`, seeded with `config`.
    ///
    /// # Errors
    ///
    /// Propagates the client's error if the run cannot be opened.
    pub fn start(
        mut client: Box<dyn TrackingClient>,
        project: &str,
        exp_id: &str,
        config: &Config,
    ) -> Result<Self> {
        let run_id = client.start_run(project, exp_id, config)?;
        info!(%run_id, project, exp_id, "tracking run started");
        Ok(Self {
            client,
            run_id,
            finished: false,
        })
    }

    /// Start a run using [`HttpTrackingClient::from_env`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if the service URL is not configured or
    /// the crate was built without the `remote` feature.
    pub fn from_env(project: &str, exp_id: &str, config: &Config) -> Result<Self> {
        #[cfg(feature = "remote")]
        {
            let client = HttpTrackingClient::from_env()?;
            Self::start(Box::new(client), project, exp_id, config)
        }
        #[cfg(not(feature = "remote"))]
        {
            let _ = (project, exp_id, config);
            Err(Error::InvalidConfiguration(
                "remote logger requested, but expbox was built without the `remote` feature"
                    .to_string(),
            ))
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(Error::LoggerClosed);
        }
        Ok(())
    }
}

impl Logger for RemoteLogger {
    fn log_metrics(&mut self, metrics: &Metrics, step: Option<u64>) -> Result<()> {
        self.ensure_open()?;
        let payload = serde_json::to_value(metrics)?;
        self.client.log(&self.run_id, step, &payload)
    }

    fn log_figure(&mut self, name: &str, png: &[u8], _step: Option<u64>) -> Result<()> {
        self.ensure_open()?;
        self.client.upload(&self.run_id, name, "figure", png)
    }

    fn log_artifact(&mut self, path: &Path, name: Option<&str>) -> Result<()> {
        self.ensure_open()?;
        let name = name
            .map(str::to_string)
            .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .ok_or_else(|| {
                Error::Other(format!("artifact path has no file name: {}", path.display()))
            })?;
        let bytes = fs::read(path)?;
        self.client.upload(&self.run_id, &name, "file", &bytes)
    }

    fn close(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        debug!(run_id = %self.run_id, "finishing tracking run");
        self.client.finish(&self.run_id)
    }

    fn run_id(&self) -> Option<&str> {
        Some(&self.run_id)
    }
}

/// JSON-over-HTTP tracking client.
///
/// | Call        | Request                                         |
/// |-------------|-------------------------------------------------|
/// | `start_run` | `POST {base}/runs` → `{"id": "..."}`            |
/// | `log`       | `POST {base}/runs/{id}/log`                     |
/// | `upload`    | `POST {base}/runs/{id}/files?name=..&kind=..`   |
/// | `finish`    | `POST {base}/runs/{id}/finish`                  |
#[cfg(feature = "remote")]
#[derive(Clone)]
pub struct HttpTrackingClient {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

#[cfg(feature = "remote")]
impl std::fmt::Debug for HttpTrackingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTrackingClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "remote")]
impl HttpTrackingClient {
    /// Request timeout for every call.
    pub const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

    /// Client for the service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(Self::TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Client configured from [`TRACKING_URL_ENV`] and [`TRACKING_TOKEN_ENV`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if the URL variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(TRACKING_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "remote logger requested, but {TRACKING_URL_ENV} is not set"
                ))
            })?;
        let token = std::env::var(TRACKING_TOKEN_ENV)
            .ok()
            .filter(|v| !v.is_empty());
        Ok(Self::new(base_url, token))
    }

    fn post(&self, path: &str) -> ureq::Request {
        let request = self.agent.post(&format!("{}/{path}", self.base_url));
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }
}

/// Run ids are spliced into request paths, so only URL-safe ids are accepted.
#[cfg(feature = "remote")]
fn check_run_id(run_id: &str) -> Result<()> {
    let safe = !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'));
    if safe && run_id != "." && run_id != ".." {
        Ok(())
    } else {
        Err(Error::Tracking(format!(
            "service returned a run id that is not URL-safe: '{run_id}'"
        )))
    }
}

#[cfg(feature = "remote")]
fn tracking_err(e: impl std::fmt::Display) -> Error {
    Error::Tracking(e.to_string())
}

#[cfg(feature = "remote")]
impl TrackingClient for HttpTrackingClient {
    fn start_run(&mut self, project: &str, name: &str, config: &Config) -> Result<String> {
        let response: Value = self
            .post("runs")
            .send_json(serde_json::json!({ "project": project, "name": name, "config": config }))
            .map_err(tracking_err)?
            .into_json()
            .map_err(tracking_err)?;
        let run_id = response
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Tracking("start_run response has no \"id\"".to_string()))?;
        check_run_id(run_id)?;
        Ok(run_id.to_string())
    }

    fn log(&mut self, run_id: &str, step: Option<u64>, payload: &Value) -> Result<()> {
        self.post(&format!("runs/{run_id}/log"))
            .send_json(serde_json::json!({ "step": step, "values": payload }))
            .map_err(tracking_err)?;
        Ok(())
    }

    fn upload(&mut self, run_id: &str, name: &str, kind: &str, bytes: &[u8]) -> Result<()> {
        self.post(&format!("runs/{run_id}/files"))
            .query("name", name)
            .query("kind", kind)
            .set("Content-Type", "application/octet-stream")
            .send_bytes(bytes)
            .map_err(tracking_err)?;
        Ok(())
    }

    fn finish(&mut self, run_id: &str) -> Result<()> {
        self.post(&format!("runs/{run_id}/finish"))
            .send_json(serde_json::json!({}))
            .map_err(tracking_err)?;
        Ok(())
    }
}
