//! Experiment identifier generation.
//!
//! Identifiers double as directory names, so every one of them (generated or
//! supplied by the caller) goes through [`ensure_safe_exp_id`] before use.
//!
//! ## Styles
//!
//! | Style      | Core                              | Example (kebab, prefix `rbc`) |
//! |------------|-----------------------------------|-------------------------------|
//! | `datetime` | local time, `%y%m%d-%H%M`         | `rbc-250124-1530`             |
//! | `date`     | local time, `%y%m%d`              | `rbc-250124`                  |
//! | `rand`     | 10 chars of `[a-z0-9]`            | `rbc-k3j9x0q2mz`              |
//! | `seq`      | `<project-slug><sep><NN>`         | `myproj-07` (prefix ignored)  |

use std::fmt::{self, Write as _};
use std::path::Path;
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default pattern for the `datetime` style (minute resolution).
pub const DEFAULT_DATETIME_FMT: &str = "%y%m%d-%H%M";

/// Default pattern for the `date` style.
pub const DEFAULT_DATE_FMT: &str = "%y%m%d";

/// Characters that are rejected in identifiers (unsafe on Windows or POSIX).
pub const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RAND_LEN: usize = 10;
const RAND_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Custom identifier generator: `(project, results_root) -> exp_id`.
pub type IdGenerator = dyn Fn(&str, &Path) -> String;

/// Naming policy for generated identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStyle {
    /// Current local time (default).
    #[default]
    Datetime,
    /// Current local date; same mechanics as `Datetime` with a coarser default pattern.
    Date,
    /// Per-project sequence number, `<project>-01`, `<project>-02`, ...
    Seq,
    /// Random lowercase alphanumeric core.
    Rand,
}

impl IdStyle {
    /// Default strftime pattern for time-based styles.
    #[must_use]
    pub const fn default_fmt(self) -> &'static str {
        match self {
            Self::Date => DEFAULT_DATE_FMT,
            _ => DEFAULT_DATETIME_FMT,
        }
    }
}

impl FromStr for IdStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "datetime" => Ok(Self::Datetime),
            "date" => Ok(Self::Date),
            "seq" => Ok(Self::Seq),
            "rand" => Ok(Self::Rand),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown id style '{other}' (expected datetime, date, seq or rand)"
            ))),
        }
    }
}

impl fmt::Display for IdStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Datetime => "datetime",
            Self::Date => "date",
            Self::Seq => "seq",
            Self::Rand => "rand",
        };
        f.write_str(s)
    }
}

/// How identifier parts are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStyle {
    /// `-`
    #[default]
    Kebab,
    /// `_`
    Snake,
}

impl LinkStyle {
    /// Separator character for this style.
    #[must_use]
    pub const fn separator(self) -> char {
        match self {
            Self::Kebab => '-',
            Self::Snake => '_',
        }
    }
}

impl FromStr for LinkStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kebab" => Ok(Self::Kebab),
            "snake" => Ok(Self::Snake),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown link style '{other}' (expected kebab or snake)"
            ))),
        }
    }
}

/// Options for [`generate_exp_id`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdOptions {
    /// Naming policy.
    pub style: IdStyle,
    /// Optional prefix (ignored by `seq`).
    pub prefix: Option<String>,
    /// Optional suffix (ignored by `seq`).
    pub suffix: Option<String>,
    /// strftime pattern; `None` uses the style's default.
    pub datetime_fmt: Option<String>,
    /// Join style.
    pub link_style: LinkStyle,
}

impl IdOptions {
    /// Options for the given style with no prefix/suffix.
    #[must_use]
    pub fn new(style: IdStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    /// Set the prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the suffix.
    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Set the strftime pattern for time-based styles.
    #[must_use]
    pub fn datetime_fmt(mut self, fmt: impl Into<String>) -> Self {
        self.datetime_fmt = Some(fmt.into());
        self
    }

    /// Set the join style.
    #[must_use]
    pub const fn link_style(mut self, link_style: LinkStyle) -> Self {
        self.link_style = link_style;
        self
    }

    fn resolved_fmt(&self) -> &str {
        self.datetime_fmt
            .as_deref()
            .unwrap_or_else(|| self.style.default_fmt())
    }
}

/// Check that an identifier is usable as a directory name on Windows and POSIX.
///
/// Returns the identifier with surrounding whitespace and trailing dots/spaces
/// removed.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] if the id contains one of
/// [`FORBIDDEN_CHARS`] or is empty after trimming.
pub fn ensure_safe_exp_id(exp_id: &str) -> Result<String> {
    if let Some(c) = exp_id.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(Error::InvalidIdentifier(format!(
            "'{exp_id}' contains forbidden character '{c}' (forbidden: <>:\"/\\|?*)"
        )));
    }
    let trimmed = exp_id.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        return Err(Error::InvalidIdentifier(
            "exp_id must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Lowercase `text`, replace runs of characters outside `[a-z0-9_-]` with `-`,
/// and trim `-` from both ends. An empty result becomes `"id"`.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.trim().to_lowercase().chars() {
        let keep = c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-';
        let c = if keep { c } else { '-' };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    let slug = out.trim_matches('-');
    if slug.is_empty() {
        "id".to_string()
    } else {
        slug.to_string()
    }
}

/// Generate a new experiment identifier.
///
/// `project` is only used by the `seq` style, which also scans the immediate
/// child directories of `results_root` to find the next free number.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] for an invalid strftime pattern,
/// [`Error::InvalidIdentifier`] if the result is not filesystem-safe, or
/// [`Error::Io`] if `results_root` exists but cannot be listed.
pub fn generate_exp_id(project: &str, results_root: &Path, opts: &IdOptions) -> Result<String> {
    let sep = opts.link_style.separator();

    let core = match opts.style {
        IdStyle::Datetime | IdStyle::Date => format_local_now(opts.resolved_fmt())?,
        IdStyle::Rand => random_core(),
        IdStyle::Seq => {
            let slug = slugify(project);
            let next = max_sequence(results_root, &slug, sep)?
                .checked_add(1)
                .ok_or_else(|| {
                    Error::InvalidConfiguration(format!(
                        "sequence for '{slug}' under {} is exhausted",
                        results_root.display()
                    ))
                })?;
            return ensure_safe_exp_id(&format!("{slug}{sep}{next:02}"));
        }
    };

    let mut parts = Vec::with_capacity(3);
    if let Some(prefix) = opts.prefix.as_deref().filter(|p| !p.is_empty()) {
        parts.push(slugify(prefix));
    }
    parts.push(core);
    if let Some(suffix) = opts.suffix.as_deref().filter(|s| !s.is_empty()) {
        parts.push(slugify(suffix));
    }

    ensure_safe_exp_id(&parts.join(&sep.to_string()))
}

/// Highest `<slug><sep><digits>` sequence number among directories in `root`.
fn max_sequence(root: &Path, slug: &str, sep: char) -> Result<u64> {
    if !root.is_dir() {
        return Ok(0);
    }
    let pattern = format!(
        r"^{}{}(\d+)$",
        regex::escape(slug),
        regex::escape(&sep.to_string())
    );
    let re = Regex::new(&pattern).map_err(|e| Error::Other(format!("sequence pattern: {e}")))?;

    let mut max_n = 0;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(n) = re
            .captures(name)
            .and_then(|caps| caps[1].parse::<u64>().ok())
        {
            max_n = max_n.max(n);
        }
    }
    Ok(max_n)
}

fn format_local_now(fmt: &str) -> Result<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(Error::InvalidConfiguration(format!(
            "invalid datetime format '{fmt}'"
        )));
    }
    let mut out = String::new();
    write!(out, "{}", Local::now().format_with_items(items.iter())).map_err(|_| {
        Error::InvalidConfiguration(format!("datetime format '{fmt}' cannot be rendered"))
    })?;
    Ok(out)
}

fn random_core() -> String {
    let mut rng = rand::thread_rng();
    (0..RAND_LEN)
        .map(|_| RAND_CHARSET[rng.gen_range(0..RAND_CHARSET.len())] as char)
        .collect()
}
