//! Experiment metadata record, persisted as `meta.json`.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::logger::LoggerKind;
use crate::vcs::{self, GitRemote, GitSnapshot, RepoState};
use crate::Result;

/// Version-control section of the metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    /// Repository root directory.
    #[serde(default)]
    pub repo_root: Option<String>,
    /// Working directory relative to `repo_root` (POSIX form).
    #[serde(default)]
    pub cwd_relpath: Option<String>,
    /// Snapshot taken at creation; never overwritten.
    #[serde(default)]
    pub start: Option<GitSnapshot>,
    /// Snapshot from the most recent finalize.
    #[serde(default)]
    pub last: Option<GitSnapshot>,
    /// Paths with uncommitted changes at the most recent snapshot.
    #[serde(default)]
    pub dirty_files: Vec<String>,
    /// Preferred remote at the most recent snapshot.
    #[serde(default)]
    pub remote: Option<GitRemote>,
}

impl GitInfo {
    fn absorb(&mut self, state: &RepoState, workdir: Option<&Path>) {
        if self.repo_root.is_none() {
            self.repo_root = Some(state.repo_root.to_string_lossy().into_owned());
        }
        if self.cwd_relpath.is_none() {
            self.cwd_relpath = workdir.and_then(|dir| vcs::relative_to_repo(&state.repo_root, dir));
        }
        self.dirty_files.clone_from(&state.dirty_files);
        self.remote.clone_from(&state.remote);
    }
}

/// Metadata for a single experiment.
///
/// `exp_id` and `created_at` are fixed at construction; `finished_at` is set
/// at most once (see [`ExperimentMeta::mark_finished`]). Keys found in a
/// `meta.json` that this version does not know about are kept in
/// [`ExperimentMeta::extra`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMeta")]
pub struct ExperimentMeta {
    exp_id: String,
    project: String,
    title: Option<String>,
    purpose: Option<String>,
    status: Option<String>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    git_commit: Option<String>,
    git: GitInfo,
    config_path: Option<String>,
    logger_backend: String,
    tracking_run_id: Option<String>,
    env_note: Option<String>,
    final_note: Option<String>,
    extra: Map<String, Value>,
}

/// On-disk shape, tolerant of missing optional fields and unknown keys.
#[derive(Deserialize)]
struct RawMeta {
    exp_id: String,
    project: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(default)]
    status: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    git_commit: Option<String>,
    #[serde(default)]
    git: Option<GitInfo>,
    #[serde(default)]
    config_path: Option<String>,
    #[serde(default)]
    logger_backend: Option<String>,
    #[serde(default, alias = "wandb_run_id")]
    tracking_run_id: Option<String>,
    #[serde(default)]
    env_note: Option<String>,
    #[serde(default)]
    final_note: Option<String>,
    #[serde(default)]
    extra: Option<Map<String, Value>>,
    #[serde(flatten)]
    unknown: Map<String, Value>,
}

impl From<RawMeta> for ExperimentMeta {
    fn from(raw: RawMeta) -> Self {
        let mut extra = raw.extra.unwrap_or_default();
        for (key, value) in raw.unknown {
            extra.entry(key).or_insert(value);
        }
        Self {
            exp_id: raw.exp_id,
            project: raw.project,
            title: raw.title,
            purpose: raw.purpose,
            status: raw.status,
            created_at: raw.created_at,
            finished_at: raw.finished_at,
            git_commit: raw.git_commit,
            git: raw.git.unwrap_or_default(),
            config_path: raw.config_path,
            logger_backend: raw
                .logger_backend
                .unwrap_or_else(|| LoggerKind::None.as_str().to_string()),
            tracking_run_id: raw.tracking_run_id,
            env_note: raw.env_note,
            final_note: raw.final_note,
            extra,
        }
    }
}

impl ExperimentMeta {
    /// Create a record with the current time as `created_at`.
    #[must_use]
    pub fn new(exp_id: impl Into<String>, project: impl Into<String>) -> Self {
        Self::builder(exp_id, project).build()
    }

    /// Create a builder for a record with optional fields.
    #[must_use]
    pub fn builder(exp_id: impl Into<String>, project: impl Into<String>) -> ExperimentMetaBuilder {
        ExperimentMetaBuilder::new(exp_id, project)
    }

    /// Experiment identifier (also the directory name).
    #[must_use]
    pub fn exp_id(&self) -> &str {
        &self.exp_id
    }

    /// Project name as stored.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Short title.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Purpose description.
    #[must_use]
    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    /// Free-form status tag (`running`, `done`, ...).
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Completion timestamp, once finalized.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Most recent known commit (mirrors `git.last`, or `git.start` before any finalize).
    #[must_use]
    pub fn git_commit(&self) -> Option<&str> {
        self.git_commit.as_deref()
    }

    /// Version-control section.
    #[must_use]
    pub const fn git(&self) -> &GitInfo {
        &self.git
    }

    /// Config snapshot path relative to the experiment root.
    #[must_use]
    pub fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    /// Logger backend tag.
    #[must_use]
    pub fn logger_backend(&self) -> &str {
        &self.logger_backend
    }

    /// External tracking run id.
    #[must_use]
    pub fn tracking_run_id(&self) -> Option<&str> {
        self.tracking_run_id.as_deref()
    }

    /// Environment note.
    #[must_use]
    pub fn env_note(&self) -> Option<&str> {
        self.env_note.as_deref()
    }

    /// Final note.
    #[must_use]
    pub fn final_note(&self) -> Option<&str> {
        self.final_note.as_deref()
    }

    /// User-defined fields.
    #[must_use]
    pub const fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Mutable access to user-defined fields.
    pub fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }

    /// Set the title.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Set the purpose.
    pub fn set_purpose(&mut self, purpose: impl Into<String>) {
        self.purpose = Some(purpose.into());
    }

    /// Set the status tag.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    /// Set the environment note.
    pub fn set_env_note(&mut self, note: impl Into<String>) {
        self.env_note = Some(note.into());
    }

    /// Set the final note.
    pub fn set_final_note(&mut self, note: impl Into<String>) {
        self.final_note = Some(note.into());
    }

    /// Set the external tracking run id.
    pub fn set_tracking_run_id(&mut self, run_id: impl Into<String>) {
        self.tracking_run_id = Some(run_id.into());
    }

    /// Set `finished_at` to now unless already set. Returns whether it changed.
    pub fn mark_finished(&mut self) -> bool {
        if self.finished_at.is_some() {
            return false;
        }
        self.finished_at = Some(Utc::now());
        true
    }

    /// Record the creation-time repository state. The start snapshot is only
    /// written once.
    pub fn record_vcs_start(&mut self, state: &RepoState, workdir: Option<&Path>) {
        if self.git.start.is_none() {
            self.git.start = Some(state.snapshot.clone());
        }
        if self.git.last.is_none() {
            self.git_commit = self.git.start.as_ref().map(|s| s.commit.clone());
        }
        self.git.absorb(state, workdir);
    }

    /// Record a finalize-time repository state, replacing `git.last`.
    pub fn record_vcs_last(&mut self, state: &RepoState, workdir: Option<&Path>) {
        self.git.last = Some(state.snapshot.clone());
        self.git_commit = Some(state.snapshot.commit.clone());
        self.git.absorb(state, workdir);
    }
}

/// Builder for `ExperimentMeta`.
#[derive(Debug)]
pub struct ExperimentMetaBuilder {
    meta: ExperimentMeta,
}

impl ExperimentMetaBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(exp_id: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            meta: ExperimentMeta {
                exp_id: exp_id.into(),
                project: project.into(),
                title: None,
                purpose: None,
                status: None,
                created_at: Utc::now(),
                finished_at: None,
                git_commit: None,
                git: GitInfo::default(),
                config_path: None,
                logger_backend: LoggerKind::None.as_str().to_string(),
                tracking_run_id: None,
                env_note: None,
                final_note: None,
                extra: Map::new(),
            },
        }
    }

    /// Set the title.
    #[must_use]
    pub fn title(mut self, title: Option<String>) -> Self {
        self.meta.title = title;
        self
    }

    /// Set the purpose.
    #[must_use]
    pub fn purpose(mut self, purpose: Option<String>) -> Self {
        self.meta.purpose = purpose;
        self
    }

    /// Set the initial status.
    #[must_use]
    pub fn status(mut self, status: Option<String>) -> Self {
        self.meta.status = status;
        self
    }

    /// Set the environment note.
    #[must_use]
    pub fn env_note(mut self, env_note: Option<String>) -> Self {
        self.meta.env_note = env_note;
        self
    }

    /// Set the config snapshot path (relative to the experiment root).
    #[must_use]
    pub fn config_path(mut self, config_path: impl Into<String>) -> Self {
        self.meta.config_path = Some(config_path.into());
        self
    }

    /// Set the logger backend tag.
    #[must_use]
    pub fn logger_backend(mut self, kind: LoggerKind) -> Self {
        self.meta.logger_backend = kind.as_str().to_string();
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.meta.created_at = created_at;
        self
    }

    /// Build the `ExperimentMeta`.
    #[must_use]
    pub fn build(self) -> ExperimentMeta {
        self.meta
    }
}

/// Write `meta` as pretty JSON, replacing the file in full.
///
/// # Errors
///
/// Returns an IO or JSON error.
pub fn save_meta(meta: &ExperimentMeta, path: &Path) -> Result<()> {
    let mut json = serde_json::to_string_pretty(meta)?;
    json.push('\n');
    fs::write(path, json)?;
    Ok(())
}

/// Read a `meta.json` file.
///
/// # Errors
///
/// Returns an IO error if the file cannot be read, or a JSON error if a
/// required field is missing or malformed.
pub fn load_meta(path: &Path) -> Result<ExperimentMeta> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn repo_state(commit: &str) -> RepoState {
        RepoState {
            repo_root: PathBuf::from("/work/repo"),
            snapshot: GitSnapshot {
                commit: commit.to_string(),
                branch: Some("main".to_string()),
                dirty: false,
                captured_at: Utc::now(),
            },
            dirty_files: Vec::new(),
            remote: None,
        }
    }

    #[test]
    fn test_meta_defaults() {
        let meta = ExperimentMeta::new("exp-1", "proj");
        assert_eq!(meta.exp_id(), "exp-1");
        assert_eq!(meta.logger_backend(), "none");
        assert!(meta.finished_at().is_none());
        assert!(meta.git().start.is_none());
    }

    #[test]
    fn test_mark_finished_once() {
        let mut meta = ExperimentMeta::new("exp-1", "proj");
        assert!(meta.mark_finished());
        let first = meta.finished_at();
        assert!(!meta.mark_finished());
        assert_eq!(meta.finished_at(), first);
    }

    #[test]
    fn test_vcs_start_is_kept() {
        let mut meta = ExperimentMeta::new("exp-1", "proj");
        meta.record_vcs_start(&repo_state("aaa"), None);
        meta.record_vcs_start(&repo_state("bbb"), None);
        assert_eq!(meta.git().start.as_ref().unwrap().commit, "aaa");
        assert_eq!(meta.git_commit(), Some("aaa"));

        meta.record_vcs_last(&repo_state("ccc"), None);
        meta.record_vcs_start(&repo_state("ddd"), None);
        assert_eq!(meta.git().start.as_ref().unwrap().commit, "aaa");
        assert_eq!(meta.git().last.as_ref().unwrap().commit, "ccc");
        assert_eq!(meta.git_commit(), Some("ccc"));
        assert_eq!(meta.git().repo_root.as_deref(), Some("/work/repo"));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut meta = ExperimentMeta::builder("exp-1", "proj")
            .title(Some("baseline".to_string()))
            .config_path("artifacts/config.yaml")
            .logger_backend(LoggerKind::File)
            .build();
        meta.extra_mut().insert("seed".to_string(), json!(7));
        meta.record_vcs_last(&repo_state("abc"), None);
        meta.mark_finished();

        let text = serde_json::to_string_pretty(&meta).unwrap();
        let back: ExperimentMeta = serde_json::from_str(&text).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_unknown_keys_go_to_extra() {
        let doc = json!({
            "exp_id": "old-1",
            "project": "p",
            "created_at": "2025-01-24T15:30:00Z",
            "wandb_run_id": "w-1",
            "gpu": "a100",
            "extra": {"seed": 1}
        });
        let meta: ExperimentMeta = serde_json::from_value(doc).unwrap();
        assert_eq!(meta.tracking_run_id(), Some("w-1"));
        assert_eq!(meta.extra()["gpu"], json!("a100"));
        assert_eq!(meta.extra()["seed"], json!(1));
        assert_eq!(meta.logger_backend(), "none");
    }

    #[test]
    fn test_missing_required_field() {
        let doc = json!({"project": "p", "created_at": "2025-01-24T15:30:00Z"});
        assert!(serde_json::from_value::<ExperimentMeta>(doc).is_err());
    }
}
