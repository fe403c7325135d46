//! CSV summary of every experiment under a results root.
//!
//! Each immediate child directory holding a `meta.json` becomes one row.
//! Nested objects are flattened with dotted keys (`git.start.commit`),
//! arrays are written as compact JSON, and `null` as an empty cell.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::layout::META_FILE;
use crate::Result;

/// Default output file name used by the CLI.
pub const DEFAULT_CSV_FILE: &str = "expbox_experiments.csv";

/// Write one CSV row per experiment under `results_root` to `csv_path`.
///
/// Columns are `fields` in the given order, or else the union of all
/// flattened keys in first-seen order (rows are visited by directory name).
/// Directories whose `meta.json` cannot be parsed are skipped with a warning.
///
/// # Errors
///
/// Returns an IO error if `results_root` cannot be listed or the CSV file
/// cannot be written.
pub fn export_csv(results_root: &Path, csv_path: &Path, fields: Option<&[String]>) -> Result<PathBuf> {
    let rows = collect_rows(results_root)?;

    let header: Vec<String> = match fields {
        Some(fields) => fields.to_vec(),
        None => {
            let mut keys: Vec<String> = Vec::new();
            for row in &rows {
                for key in row.keys() {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
            }
            keys
        }
    };

    let mut output = String::new();
    push_line(&mut output, header.iter().map(String::as_str));
    for row in &rows {
        push_line(
            &mut output,
            header
                .iter()
                .map(|key| row.get(key).and_then(Value::as_str).unwrap_or("")),
        );
    }

    if let Some(dir) = csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(csv_path, output)?;
    info!(rows = rows.len(), path = %csv_path.display(), "csv exported");
    Ok(csv_path.to_path_buf())
}

fn collect_rows(results_root: &Path) -> Result<Vec<Map<String, Value>>> {
    if !results_root.is_dir() {
        debug!(root = %results_root.display(), "results root missing, exporting header only");
        return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(results_root)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.join(META_FILE).is_file())
        .collect();
    dirs.sort();

    let mut rows = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let meta_path = dir.join(META_FILE);
        let parsed = fs::read_to_string(&meta_path)
            .map_err(crate::Error::from)
            .and_then(|text| serde_json::from_str::<Value>(&text).map_err(crate::Error::from));
        match parsed {
            Ok(Value::Object(meta)) => {
                let mut row = Map::new();
                flatten_into(&mut row, None, &meta);
                rows.push(row);
            }
            Ok(_) => warn!(path = %meta_path.display(), "meta.json is not an object, skipping"),
            Err(e) => warn!(path = %meta_path.display(), error = %e, "unreadable meta.json, skipping"),
        }
    }
    Ok(rows)
}

fn flatten_into(row: &mut Map<String, Value>, prefix: Option<&str>, object: &Map<String, Value>) {
    for (key, value) in object {
        let full = prefix.map_or_else(|| key.clone(), |p| format!("{p}.{key}"));
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(row, Some(&full), inner),
            other => {
                row.insert(full, Value::String(cell_text(other)));
            }
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn push_line<'a>(output: &mut String, cells: impl Iterator<Item = &'a str>) {
    let line: Vec<String> = cells.map(escape_csv_field).collect();
    output.push_str(&line.join(","));
    output.push('\n');
}

fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_escaping() {
        assert_eq!(escape_csv_field("simple"), "simple");
        assert_eq!(escape_csv_field("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv_field("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(escape_csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_flatten_nested() {
        let meta = json!({
            "exp_id": "a",
            "git": {"start": {"commit": "abc", "dirty": false}, "dirty_files": ["x", "y"]},
            "finished_at": null,
            "extra": {}
        });
        let mut row = Map::new();
        flatten_into(&mut row, None, meta.as_object().unwrap());

        assert_eq!(row["exp_id"], "a");
        assert_eq!(row["git.start.commit"], "abc");
        assert_eq!(row["git.start.dirty"], "false");
        assert_eq!(row["git.dirty_files"], r#"["x","y"]"#);
        assert_eq!(row["finished_at"], "");
        assert_eq!(row["extra"], "{}");
    }

    #[test]
    fn test_missing_root_writes_header_only() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out.csv");
        let fields = vec!["exp_id".to_string(), "status".to_string()];
        export_csv(&tmp.path().join("absent"), &out, Some(fields.as_slice())).unwrap();
        assert_eq!(fs::read_to_string(out).unwrap(), "exp_id,status\n");
    }
}
