//! Experiment lifecycle: create, reload, finalize.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::meta::{load_meta, save_meta};
use super::{ExpContext, ExperimentMeta};
use crate::config::{load_config, snapshot_config, Config, ConfigSource, SNAPSHOT_FILE};
use crate::id::{ensure_safe_exp_id, generate_exp_id, IdGenerator, IdOptions, IdStyle, LinkStyle};
use crate::layout::ExpPaths;
use crate::logger::{FileLogger, Logger, LoggerKind, NullLogger, RemoteLogger, TrackingClient};
use crate::vcs;
use crate::{Error, Result};

/// Default results directory.
pub const DEFAULT_RESULTS_ROOT: &str = "results";

/// Config snapshot location used when `meta.json` does not record one.
pub const DEFAULT_CONFIG_PATH: &str = "artifacts/config.yaml";

/// How many times `seq` generation retries when another process took the number.
const SEQ_RESERVE_ATTEMPTS: usize = 16;

/// Options for [`create`].
pub struct CreateOptions {
    project: String,
    title: Option<String>,
    purpose: Option<String>,
    config: ConfigSource,
    logger: LoggerKind,
    results_root: PathBuf,
    exp_id: Option<String>,
    id: IdOptions,
    id_generator: Option<Box<IdGenerator>>,
    tracking_client: Option<Box<dyn TrackingClient>>,
    status: Option<String>,
    env_note: Option<String>,
    workdir: Option<PathBuf>,
}

impl CreateOptions {
    /// Options for a new experiment in `project` with all defaults.
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            title: None,
            purpose: None,
            config: ConfigSource::None,
            logger: LoggerKind::None,
            results_root: PathBuf::from(DEFAULT_RESULTS_ROOT),
            exp_id: None,
            id: IdOptions::default(),
            id_generator: None,
            tracking_client: None,
            status: None,
            env_note: None,
            workdir: None,
        }
    }

    /// Short title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Purpose description.
    #[must_use]
    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    /// Configuration source (mapping or file).
    #[must_use]
    pub fn config(mut self, config: impl Into<ConfigSource>) -> Self {
        self.config = config.into();
        self
    }

    /// Logger backend.
    #[must_use]
    pub const fn logger(mut self, kind: LoggerKind) -> Self {
        self.logger = kind;
        self
    }

    /// Directory under which experiments are stored.
    #[must_use]
    pub fn results_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.results_root = root.into();
        self
    }

    /// Use this identifier instead of generating one.
    #[must_use]
    pub fn exp_id(mut self, exp_id: impl Into<String>) -> Self {
        self.exp_id = Some(exp_id.into());
        self
    }

    /// Naming policy for generated identifiers.
    #[must_use]
    pub const fn id_style(mut self, style: IdStyle) -> Self {
        self.id.style = style;
        self
    }

    /// Prefix for generated identifiers (ignored by `seq`).
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id.prefix = Some(prefix.into());
        self
    }

    /// Suffix for generated identifiers (ignored by `seq`).
    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.id.suffix = Some(suffix.into());
        self
    }

    /// strftime pattern for `datetime`/`date` identifiers.
    #[must_use]
    pub fn datetime_fmt(mut self, fmt: impl Into<String>) -> Self {
        self.id.datetime_fmt = Some(fmt.into());
        self
    }

    /// Join style for identifier parts.
    #[must_use]
    pub const fn link_style(mut self, link_style: LinkStyle) -> Self {
        self.id.link_style = link_style;
        self
    }

    /// Custom `(project, results_root) -> exp_id` generator; takes precedence
    /// over the naming policy but not over an explicit id.
    #[must_use]
    pub fn id_generator(mut self, generator: impl Fn(&str, &Path) -> String + 'static) -> Self {
        self.id_generator = Some(Box::new(generator));
        self
    }

    /// Client used when the logger kind is `remote` (default: from environment).
    #[must_use]
    pub fn tracking_client(mut self, client: impl TrackingClient + 'static) -> Self {
        self.tracking_client = Some(Box::new(client));
        self
    }

    /// Initial status tag.
    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Environment note.
    #[must_use]
    pub fn env_note(mut self, note: impl Into<String>) -> Self {
        self.env_note = Some(note.into());
        self
    }

    /// Directory the repository snapshot is taken from (default: current dir).
    #[must_use]
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    fn resolve_exp_id(&self) -> Result<String> {
        if let Some(exp_id) = &self.exp_id {
            return ensure_safe_exp_id(exp_id);
        }
        if let Some(generator) = &self.id_generator {
            return ensure_safe_exp_id(&generator(&self.project, &self.results_root));
        }
        if self.id.style != IdStyle::Seq {
            return generate_exp_id(&self.project, &self.results_root, &self.id);
        }

        // Claim the sequence number with an atomic create_dir so two
        // processes cannot end up in the same directory.
        fs::create_dir_all(&self.results_root)?;
        for _ in 0..SEQ_RESERVE_ATTEMPTS {
            let exp_id = generate_exp_id(&self.project, &self.results_root, &self.id)?;
            match fs::create_dir(self.results_root.join(&exp_id)) {
                Ok(()) => return Ok(exp_id),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(%exp_id, "sequence id taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Other(format!(
            "could not reserve a sequence id under {}",
            self.results_root.display()
        )))
    }
}

impl fmt::Debug for CreateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateOptions")
            .field("project", &self.project)
            .field("title", &self.title)
            .field("purpose", &self.purpose)
            .field("config", &self.config)
            .field("logger", &self.logger)
            .field("results_root", &self.results_root)
            .field("exp_id", &self.exp_id)
            .field("id", &self.id)
            .field("id_generator", &self.id_generator.is_some())
            .field("status", &self.status)
            .field("env_note", &self.env_note)
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

/// Options for [`reload_with`].
#[derive(Debug, Clone, Default)]
pub struct ReloadOptions {
    /// Override for the stored project name.
    pub project: Option<String>,
    /// Logger to attach instead of the stored backend. `remote` is never
    /// re-attached and yields an inert logger.
    pub logger: Option<LoggerKind>,
}

/// Options for [`finalize_with`].
#[derive(Debug, Clone)]
pub struct FinalizeOptions {
    /// New status tag.
    pub status: Option<String>,
    /// Final note.
    pub final_note: Option<String>,
    /// Refresh the repository snapshot (`git.last`).
    pub update_vcs: bool,
    /// Directory used to rediscover the repository (default: current dir).
    pub workdir: Option<PathBuf>,
}

impl Default for FinalizeOptions {
    fn default() -> Self {
        Self {
            status: None,
            final_note: None,
            update_vcs: true,
            workdir: None,
        }
    }
}

/// Create a new experiment.
///
/// Decides the identifier, creates `results_root/<exp_id>/` and its
/// subdirectories, resolves the configuration and snapshots it under
/// `artifacts/`, records the repository state, attaches the logger, and
/// writes the initial `meta.json`.
///
/// # Errors
///
/// - [`Error::InvalidIdentifier`] for an unsafe explicit or custom id
/// - [`Error::InvalidConfiguration`] for an unreadable config or an
///   unavailable remote backend
/// - IO errors from creating the directory tree or writing files
pub fn create(opts: CreateOptions) -> Result<ExpContext> {
    let exp_id = opts.resolve_exp_id()?;
    let paths = ExpPaths::create(&opts.results_root, &exp_id)?;

    let config = load_config(&opts.config)?;
    snapshot_config(&config, &paths.artifacts.join(SNAPSHOT_FILE))?;

    let mut meta = ExperimentMeta::builder(&exp_id, &opts.project)
        .title(opts.title)
        .purpose(opts.purpose)
        .status(opts.status)
        .env_note(opts.env_note)
        .config_path(format!("artifacts/{SNAPSHOT_FILE}"))
        .logger_backend(opts.logger)
        .build();

    let workdir = opts.workdir.or_else(|| std::env::current_dir().ok());
    if let Some(state) = workdir.as_deref().and_then(vcs::capture) {
        meta.record_vcs_start(&state, workdir.as_deref());
    }

    let logger = make_logger(
        opts.logger,
        opts.tracking_client,
        &opts.project,
        &exp_id,
        &config,
        &paths,
    )?;
    if let Some(run_id) = logger.run_id() {
        meta.set_tracking_run_id(run_id);
    }

    save_meta(&meta, &paths.meta_file())?;
    info!(%exp_id, project = %opts.project, root = %paths.root.display(), "experiment created");

    Ok(ExpContext::new(opts.project, paths, config, meta, logger))
}

/// Reload an existing experiment with default options.
///
/// # Errors
///
/// See [`reload_with`].
pub fn reload(exp_id: &str, results_root: &Path) -> Result<ExpContext> {
    reload_with(exp_id, results_root, &ReloadOptions::default())
}

/// Reload an existing experiment from `results_root/<exp_id>/meta.json`.
///
/// A stored `file` backend gets a fresh [`FileLogger`] appending to the same
/// metrics stream; anything else (including `remote`) gets a [`NullLogger`].
///
/// # Errors
///
/// - [`Error::NotFound`] if `meta.json` does not exist
/// - [`Error::InvalidConfiguration`] if the config snapshot cannot be read
/// - JSON errors for a malformed `meta.json`
pub fn reload_with(exp_id: &str, results_root: &Path, opts: &ReloadOptions) -> Result<ExpContext> {
    let exp_id = ensure_safe_exp_id(exp_id)?;
    let meta_path = ExpPaths::resolve(results_root, &exp_id).meta_file();
    if !meta_path.is_file() {
        return Err(Error::NotFound(format!(
            "meta.json not found for exp_id={exp_id} under {}",
            results_root.display()
        )));
    }

    let meta = load_meta(&meta_path)?;
    let paths = ExpPaths::create(results_root, &exp_id)?;

    let config_rel = meta.config_path().unwrap_or(DEFAULT_CONFIG_PATH);
    let config = load_config(&ConfigSource::File(paths.root.join(config_rel)))?;

    let kind = opts
        .logger
        .unwrap_or_else(|| meta.logger_backend().parse().unwrap_or_default());
    let logger: Box<dyn Logger> = match kind {
        LoggerKind::File => Box::new(FileLogger::new(&paths)?),
        LoggerKind::Remote => {
            debug!(%exp_id, "remote runs are not re-attached, using inert logger");
            Box::new(NullLogger::new())
        }
        LoggerKind::None => Box::new(NullLogger::new()),
    };

    let project = opts
        .project
        .clone()
        .unwrap_or_else(|| meta.project().to_string());
    debug!(%exp_id, %project, "experiment reloaded");

    Ok(ExpContext::new(project, paths, config, meta, logger))
}

/// Finalize an experiment with default options.
///
/// # Errors
///
/// See [`finalize_with`].
pub fn finalize(ctx: &mut ExpContext) -> Result<()> {
    finalize_with(ctx, &FinalizeOptions::default())
}

/// Finalize an experiment.
///
/// Refreshes `git.last` (best effort), applies status/final note, sets
/// `finished_at` if unset, closes the logger (failures are logged, not
/// returned) and rewrites `meta.json` in full. Safe to call repeatedly.
///
/// # Errors
///
/// Only IO/JSON errors from writing `meta.json`.
pub fn finalize_with(ctx: &mut ExpContext, opts: &FinalizeOptions) -> Result<()> {
    if opts.update_vcs {
        let workdir = opts
            .workdir
            .clone()
            .or_else(|| std::env::current_dir().ok());
        refresh_vcs(ctx.meta_mut(), workdir.as_deref());
    }

    if let Some(status) = &opts.status {
        ctx.meta_mut().set_status(status.as_str());
    }
    if let Some(note) = &opts.final_note {
        ctx.meta_mut().set_final_note(note.as_str());
    }
    ctx.meta_mut().mark_finished();

    if let Err(e) = ctx.logger().close() {
        warn!(exp_id = %ctx.exp_id(), error = %e, "logger close failed, ignoring");
    }

    save_meta(ctx.meta(), &ctx.paths().meta_file())?;
    info!(exp_id = %ctx.exp_id(), "experiment finalized");
    Ok(())
}

fn refresh_vcs(meta: &mut ExperimentMeta, workdir: Option<&Path>) {
    // A recorded repository is the only one consulted.
    let state = match meta.git().repo_root.clone() {
        Some(root) => vcs::query_repo(Path::new(&root)),
        None => workdir.and_then(vcs::capture),
    };
    match state {
        Some(state) => meta.record_vcs_last(&state, workdir),
        None => debug!(exp_id = %meta.exp_id(), "no repository state available"),
    }
}

fn make_logger(
    kind: LoggerKind,
    client: Option<Box<dyn TrackingClient>>,
    project: &str,
    exp_id: &str,
    config: &Config,
    paths: &ExpPaths,
) -> Result<Box<dyn Logger>> {
    Ok(match kind {
        LoggerKind::None => Box::new(NullLogger::new()),
        LoggerKind::File => Box::new(FileLogger::new(paths)?),
        LoggerKind::Remote => match client {
            Some(client) => Box::new(RemoteLogger::start(client, project, exp_id, config)?),
            None => Box::new(RemoteLogger::from_env(project, exp_id, config)?),
        },
    })
}
