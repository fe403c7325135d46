//! # expbox: Local-First Experiment Boxes
//!
//! **Version**: 0.1.0
//!
//! expbox gives every experiment run its own directory with a configuration
//! snapshot, a metrics log and a JSON metadata record, without a tracking
//! server.
//!
//! ## Design Principles
//!
//! - **Safe identifiers**: every id doubles as a directory name and is checked
//!   before use
//! - **Best-effort provenance**: repository state is recorded when available
//!   and never blocks bookkeeping
//! - **Plain files**: `meta.json`, `config.yaml`, `metrics.jsonl`
//!
//! ## Layout
//!
//! ```text
//! results/<exp_id>/
//! ├── meta.json
//! ├── artifacts/config.yaml
//! ├── figures/
//! ├── logs/metrics.jsonl
//! └── notebooks/
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use expbox::{create, finalize, reload, CreateOptions, IdStyle, LoggerKind};
//!
//! let mut ctx = create(
//!     CreateOptions::new("mnist")
//!         .id_style(IdStyle::Seq)
//!         .logger(LoggerKind::File),
//! )?;
//! println!("created {}", ctx.exp_id());
//! finalize(&mut ctx)?;
//!
//! let again = reload(ctx.exp_id(), std::path::Path::new("results"))?;
//! assert_eq!(again.meta().project(), "mnist");
//! # Ok::<(), expbox::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod experiment;
pub mod export;
pub mod id;
pub mod layout;
pub mod logger;
pub mod vcs;

pub use config::{load_config, Config, ConfigSource};
pub use error::{Error, Result};
pub use experiment::{
    create, finalize, finalize_with, reload, reload_with, ActiveBox, CreateOptions, ExpContext,
    ExperimentMeta, FinalizeOptions, ReloadOptions,
};
pub use export::export_csv;
pub use id::{ensure_safe_exp_id, generate_exp_id, IdOptions, IdStyle, LinkStyle};
pub use layout::ExpPaths;
pub use logger::{Logger, LoggerKind, Metrics};
