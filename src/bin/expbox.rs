//! expbox command-line interface.
//!
//! Identifiers, JSON summaries and paths go to stdout; diagnostics go to
//! stderr through `tracing` (`RUST_LOG` overrides the default `warn`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use expbox::experiment::{read_active_pointer, write_active_pointer};
use expbox::export::DEFAULT_CSV_FILE;
use expbox::{
    create, export_csv, finalize_with, reload_with, CreateOptions, FinalizeOptions, IdStyle,
    LinkStyle, LoggerKind, ReloadOptions,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "expbox")]
#[command(about = "Local-first experiment boxes: config snapshots, metrics logs and metadata", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the `.expbox/active` pointer
    #[arg(long, global = true, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new experiment and print its id.
    #[command(alias = "init")]
    Create {
        /// Project name (defaults to the current directory name)
        #[arg(long, env = "EXPBOX_PROJECT")]
        project: Option<String>,
        /// Short human-readable title
        #[arg(long)]
        title: Option<String>,
        /// Free-text description of the purpose
        #[arg(long)]
        purpose: Option<String>,
        /// YAML, JSON or TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory under which experiments are stored
        #[arg(long, env = "EXPBOX_RESULTS_ROOT", default_value = "results")]
        results_root: PathBuf,
        /// Explicit experiment id (otherwise generated)
        #[arg(long)]
        exp_id: Option<String>,
        /// Logger backend: none | file | remote
        #[arg(long, default_value = "none")]
        logger: LoggerKind,
        /// Naming policy: datetime | date | seq | rand
        #[arg(long, default_value = "datetime")]
        id_style: IdStyle,
        /// Prefix for generated ids
        #[arg(long)]
        prefix: Option<String>,
        /// Suffix for generated ids
        #[arg(long)]
        suffix: Option<String>,
        /// strftime pattern for datetime/date ids
        #[arg(long)]
        datetime_fmt: Option<String>,
        /// Join style: kebab | snake
        #[arg(long, default_value = "kebab")]
        link_style: LinkStyle,
        /// Initial status
        #[arg(long, default_value = "running")]
        status: String,
        /// Free-text note about the environment
        #[arg(long)]
        env_note: Option<String>,
    },

    /// Reload an experiment and print a JSON summary.
    #[command(alias = "load")]
    Reload {
        /// Experiment id (defaults to the active pointer)
        exp_id: Option<String>,
        /// Directory under which experiments are stored
        #[arg(long, env = "EXPBOX_RESULTS_ROOT", default_value = "results")]
        results_root: PathBuf,
        /// Logger to attach: none | file
        #[arg(long)]
        logger: Option<LoggerKind>,
    },

    /// Finalize an experiment: refresh git state, set status, write meta.json.
    #[command(alias = "save")]
    Finalize {
        /// Experiment id (defaults to the active pointer)
        exp_id: Option<String>,
        /// Directory under which experiments are stored
        #[arg(long, env = "EXPBOX_RESULTS_ROOT", default_value = "results")]
        results_root: PathBuf,
        /// Logger to attach while finalizing: none | file
        #[arg(long)]
        logger: Option<LoggerKind>,
        /// New status
        #[arg(long, default_value = "done")]
        status: String,
        /// Final note summarizing the experiment
        #[arg(long)]
        final_note: Option<String>,
        /// Do not refresh git metadata
        #[arg(long)]
        no_update_git: bool,
    },

    /// Export a CSV summary of all experiments under a results root.
    ExportCsv {
        /// Directory containing experiment boxes
        #[arg(long, env = "EXPBOX_RESULTS_ROOT", default_value = "results")]
        results_root: PathBuf,
        /// Output CSV file
        #[arg(long, default_value = DEFAULT_CSV_FILE)]
        output: PathBuf,
        /// Comma-separated columns, e.g. "exp_id,project,status"
        #[arg(long)]
        fields: Option<String>,
    },

    /// Print the active experiment id, if any.
    Current,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root;

    match cli.command {
        Command::Create {
            project,
            title,
            purpose,
            config,
            results_root,
            exp_id,
            logger,
            id_style,
            prefix,
            suffix,
            datetime_fmt,
            link_style,
            status,
            env_note,
        } => {
            let project = project.unwrap_or_else(|| default_project(&project_root));
            let mut opts = CreateOptions::new(project)
                .results_root(results_root)
                .logger(logger)
                .id_style(id_style)
                .link_style(link_style)
                .status(status);
            if let Some(title) = title {
                opts = opts.title(title);
            }
            if let Some(purpose) = purpose {
                opts = opts.purpose(purpose);
            }
            if let Some(config) = config {
                opts = opts.config(config);
            }
            if let Some(exp_id) = exp_id {
                opts = opts.exp_id(exp_id);
            }
            if let Some(prefix) = prefix {
                opts = opts.prefix(prefix);
            }
            if let Some(suffix) = suffix {
                opts = opts.suffix(suffix);
            }
            if let Some(fmt) = datetime_fmt {
                opts = opts.datetime_fmt(fmt);
            }
            if let Some(note) = env_note {
                opts = opts.env_note(note);
            }

            let ctx = create(opts).context("Failed to create experiment")?;
            write_active_pointer(&project_root, ctx.exp_id())
                .context("Failed to update active pointer")?;
            println!("{}", ctx.exp_id());
        }

        Command::Reload {
            exp_id,
            results_root,
            logger,
        } => {
            let exp_id = resolve_exp_id(exp_id, &project_root)?;
            let opts = ReloadOptions {
                project: None,
                logger,
            };
            let ctx = reload_with(&exp_id, &results_root, &opts)
                .with_context(|| format!("Failed to reload experiment {exp_id}"))?;
            write_active_pointer(&project_root, ctx.exp_id())
                .context("Failed to update active pointer")?;

            let meta = ctx.meta();
            let results_root = results_root.canonicalize().unwrap_or(results_root);
            let summary = serde_json::json!({
                "exp_id": meta.exp_id(),
                "project": meta.project(),
                "title": meta.title(),
                "purpose": meta.purpose(),
                "status": meta.status(),
                "created_at": meta.created_at(),
                "finished_at": meta.finished_at(),
                "results_root": results_root,
                "root": ctx.paths().root,
                "logger_backend": meta.logger_backend(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Finalize {
            exp_id,
            results_root,
            logger,
            status,
            final_note,
            no_update_git,
        } => {
            let exp_id = resolve_exp_id(exp_id, &project_root)?;
            let opts = ReloadOptions {
                project: None,
                logger,
            };
            let mut ctx = reload_with(&exp_id, &results_root, &opts)
                .with_context(|| format!("Failed to reload experiment {exp_id}"))?;
            let finalize_opts = FinalizeOptions {
                status: Some(status),
                final_note,
                update_vcs: !no_update_git,
                workdir: None,
            };
            finalize_with(&mut ctx, &finalize_opts)
                .with_context(|| format!("Failed to finalize experiment {exp_id}"))?;
            println!("Saved experiment: {}", ctx.exp_id());
        }

        Command::ExportCsv {
            results_root,
            output,
            fields,
        } => {
            let fields: Option<Vec<String>> = fields.map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect()
            });
            let out = export_csv(&results_root, &output, fields.as_deref())
                .context("Failed to export CSV")?;
            println!("{}", out.display());
        }

        Command::Current => {
            match read_active_pointer(&project_root).context("Failed to read active pointer")? {
                Some(exp_id) => println!("{exp_id}"),
                None => anyhow::bail!("No active experiment under {}", project_root.display()),
            }
        }
    }

    Ok(())
}

fn resolve_exp_id(exp_id: Option<String>, project_root: &Path) -> Result<String> {
    if let Some(exp_id) = exp_id {
        return Ok(exp_id);
    }
    read_active_pointer(project_root)
        .context("Failed to read active pointer")?
        .with_context(|| {
            format!(
                "No experiment id given and no active experiment under {}",
                project_root.display()
            )
        })
}

fn default_project(project_root: &Path) -> String {
    project_root
        .canonicalize()
        .ok()
        .and_then(|dir| dir.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "default".to_string())
}
