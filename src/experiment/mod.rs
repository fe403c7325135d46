//! Experiment boxes: metadata, context and lifecycle.
//!
//! ## Layout
//!
//! ```text
//! results/<exp_id>/
//!   meta.json            ExperimentMeta
//!   artifacts/config.yaml
//!   figures/  logs/  notebooks/
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use expbox::experiment::{create, finalize, CreateOptions};
//! use expbox::logger::{LoggerKind, Metrics};
//!
//! let mut ctx = create(
//!     CreateOptions::new("mnist")
//!         .title("baseline")
//!         .config(std::path::PathBuf::from("configs/baseline.yaml"))
//!         .logger(LoggerKind::File),
//! )?;
//!
//! for step in 0u32..3 {
//!     let metrics = Metrics::from([("loss".to_string(), 1.0 / f64::from(step + 1))]);
//!     ctx.logger().log_metrics(&metrics, Some(u64::from(step)))?;
//! }
//!
//! ctx.meta_mut().set_final_note("converged");
//! finalize(&mut ctx)?;
//! # Ok::<(), expbox::Error>(())
//! ```

mod active;
mod context;
mod lifecycle;
mod meta;

pub use active::{
    active_pointer_path, read_active_pointer, write_active_pointer, ActiveBox, ACTIVE_FILE,
    STATE_DIR,
};
pub use context::ExpContext;
pub use lifecycle::{
    create, finalize, finalize_with, reload, reload_with, CreateOptions, FinalizeOptions,
    ReloadOptions, DEFAULT_CONFIG_PATH, DEFAULT_RESULTS_ROOT,
};
pub use meta::{load_meta, save_meta, ExperimentMeta, ExperimentMetaBuilder, GitInfo};
