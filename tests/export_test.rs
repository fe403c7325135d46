//! CSV export tests

use std::fs;

use expbox::{create, export_csv, finalize, CreateOptions};
use tempfile::TempDir;

fn make(root: &std::path::Path, exp_id: &str, title: &str) {
    let mut ctx = create(
        CreateOptions::new("csvproj")
            .results_root(root)
            .workdir(root)
            .exp_id(exp_id)
            .title(title),
    )
    .unwrap();
    finalize(&mut ctx).unwrap();
}

#[test]
fn test_export_selected_fields() {
    let tmp = TempDir::new().unwrap();
    let results = tmp.path().join("results");
    make(&results, "b-run", "second, with comma");
    make(&results, "a-run", "first");
    fs::create_dir_all(results.join("not-a-box")).unwrap();

    let out = tmp.path().join("summary.csv");
    let fields = vec!["exp_id".to_string(), "title".to_string(), "missing".to_string()];
    let written = export_csv(&results, &out, Some(fields.as_slice())).unwrap();
    assert_eq!(written, out);

    let text = fs::read_to_string(&out).unwrap();
    assert_eq!(
        text,
        "exp_id,title,missing\na-run,first,\nb-run,\"second, with comma\",\n"
    );
}

#[test]
fn test_export_all_fields_flattens() {
    let tmp = TempDir::new().unwrap();
    let results = tmp.path().join("results");
    make(&results, "only", "t");

    let out = tmp.path().join("nested").join("all.csv");
    export_csv(&results, &out, None).unwrap();

    let text = fs::read_to_string(&out).unwrap();
    let mut lines = text.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    assert_eq!(header[0], "exp_id");
    assert!(header.contains(&"project"));
    assert!(header.contains(&"created_at"));
    assert!(header.contains(&"git.dirty_files"));
    assert_eq!(lines.count(), 1);
}

#[test]
fn test_export_skips_corrupt_meta() {
    let tmp = TempDir::new().unwrap();
    let results = tmp.path().join("results");
    make(&results, "good", "ok");
    let bad = results.join("bad");
    fs::create_dir_all(&bad).unwrap();
    fs::write(bad.join("meta.json"), "{not json").unwrap();

    let out = tmp.path().join("out.csv");
    let fields = vec!["exp_id".to_string()];
    export_csv(&results, &out, Some(fields.as_slice())).unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "exp_id\ngood\n");
}
