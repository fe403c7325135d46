//! Integration tests for create / reload / finalize and the active box

use std::fs;
use std::path::Path;

use expbox::experiment::{load_meta, read_active_pointer};
use expbox::logger::{FileLogger, Metrics};
use expbox::{
    create, finalize, finalize_with, reload, reload_with, ActiveBox, Config, ConfigSource,
    CreateOptions, Error, FinalizeOptions, IdStyle, LoggerKind, ReloadOptions,
};
use serde_json::json;
use tempfile::TempDir;

fn config(value: serde_json::Value) -> Config {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn opts(project: &str, root: &Path) -> CreateOptions {
    CreateOptions::new(project).results_root(root).workdir(root)
}

#[test]
fn test_testproj_scenario() {
    let tmp = TempDir::new().unwrap();
    let ctx = create(
        opts("testproj", tmp.path())
            .config(config(json!({"lr": 0.001})))
            .logger(LoggerKind::None),
    )
    .unwrap();

    let exp_dir = tmp.path().join(ctx.exp_id());
    assert!(exp_dir.join("meta.json").is_file());
    for sub in ["artifacts", "figures", "logs", "notebooks"] {
        assert!(exp_dir.join(sub).is_dir(), "missing {sub}");
    }

    let again = reload(ctx.exp_id(), tmp.path()).unwrap();
    assert_eq!(again.config()["lr"], json!(0.001));
}

#[test]
fn test_create_reload_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(json!({"model": {"depth": 4, "act": "relu"}, "seed": 7, "tags": ["a", "b"]}));
    let ctx = create(
        opts("roundtrip", tmp.path())
            .exp_id("rt-1")
            .title("baseline")
            .purpose("check reload")
            .status("running")
            .env_note("cpu only")
            .config(cfg.clone()),
    )
    .unwrap();

    let again = reload(ctx.exp_id(), tmp.path()).unwrap();
    assert_eq!(again.exp_id(), "rt-1");
    assert_eq!(again.project(), "roundtrip");
    assert_eq!(again.config(), &cfg);
    assert_eq!(again.meta(), ctx.meta());
    assert_eq!(again.meta().title(), Some("baseline"));
    assert_eq!(again.meta().env_note(), Some("cpu only"));
    assert_eq!(again.meta().logger_backend(), "none");
}

#[test]
fn test_config_from_yaml_file() {
    let tmp = TempDir::new().unwrap();
    let cfg_path = tmp.path().join("train.yaml");
    fs::write(&cfg_path, "lr: 0.01\nbatch: 32\n").unwrap();

    let ctx = create(opts("yaml", tmp.path()).config(cfg_path.as_path())).unwrap();
    assert_eq!(ctx.config()["batch"], json!(32));

    let again = reload(ctx.exp_id(), tmp.path()).unwrap();
    assert_eq!(again.config()["lr"], json!(0.01));
}

#[test]
fn test_missing_config_file_is_invalid_configuration() {
    let tmp = TempDir::new().unwrap();
    let result = create(opts("bad", tmp.path()).config(ConfigSource::File(tmp.path().join("nope.yaml"))));
    assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_unsafe_explicit_id_rejected() {
    let tmp = TempDir::new().unwrap();
    let result = create(opts("p", tmp.path()).exp_id("a/b"));
    assert!(matches!(result, Err(Error::InvalidIdentifier(_))));
}

#[test]
fn test_reload_project_override() {
    let tmp = TempDir::new().unwrap();
    let ctx = create(opts("original", tmp.path()).exp_id("ov")).unwrap();

    let reload_opts = ReloadOptions {
        project: Some("renamed".to_string()),
        logger: None,
    };
    let again = reload_with(ctx.exp_id(), tmp.path(), &reload_opts).unwrap();
    assert_eq!(again.project(), "renamed");
    assert_eq!(again.meta().project(), "original");
}

#[test]
fn test_reload_not_found() {
    let tmp = TempDir::new().unwrap();
    assert!(matches!(reload("ghost", tmp.path()), Err(Error::NotFound(_))));
}

#[test]
fn test_finalize_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let mut ctx = create(opts("fin", tmp.path()).exp_id("fin-1")).unwrap();
    assert!(ctx.meta().finished_at().is_none());

    finalize(&mut ctx).unwrap();
    let first = ctx.meta().finished_at().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(5));
    finalize(&mut ctx).unwrap();
    assert_eq!(ctx.meta().finished_at(), Some(first));

    let on_disk = load_meta(&ctx.paths().meta_file()).unwrap();
    assert_eq!(on_disk.finished_at(), Some(first));
    assert_eq!(on_disk.created_at(), ctx.meta().created_at());
}

#[test]
fn test_finalize_after_reload_keeps_first_timestamp() {
    let tmp = TempDir::new().unwrap();
    let mut ctx = create(opts("fin", tmp.path()).exp_id("fin-2")).unwrap();
    finalize(&mut ctx).unwrap();
    let first = ctx.meta().finished_at();

    let mut again = reload("fin-2", tmp.path()).unwrap();
    let finalize_opts = FinalizeOptions {
        status: Some("done".to_string()),
        final_note: Some("ok".to_string()),
        update_vcs: false,
        workdir: Some(tmp.path().to_path_buf()),
    };
    finalize_with(&mut again, &finalize_opts).unwrap();

    let on_disk = load_meta(&again.paths().meta_file()).unwrap();
    assert_eq!(on_disk.finished_at(), first);
    assert_eq!(on_disk.status(), Some("done"));
    assert_eq!(on_disk.final_note(), Some("ok"));
}

#[test]
fn test_user_fields_persist_through_finalize() {
    let tmp = TempDir::new().unwrap();
    let mut ctx = create(opts("extra", tmp.path()).exp_id("ex")).unwrap();
    ctx.meta_mut()
        .extra_mut()
        .insert("best_acc".to_string(), json!(0.93));
    finalize(&mut ctx).unwrap();

    let again = reload("ex", tmp.path()).unwrap();
    assert_eq!(again.meta().extra()["best_acc"], json!(0.93));
}

#[test]
fn test_file_logger_survives_reload() {
    let tmp = TempDir::new().unwrap();
    let mut ctx = create(opts("log", tmp.path()).exp_id("log-1").logger(LoggerKind::File)).unwrap();
    let metrics = Metrics::from([("loss".to_string(), 0.5)]);
    ctx.logger().log_metrics(&metrics, Some(1)).unwrap();
    finalize(&mut ctx).unwrap();
    assert!(matches!(
        ctx.logger().log_metrics(&metrics, Some(2)),
        Err(Error::LoggerClosed)
    ));

    let mut again = reload("log-1", tmp.path()).unwrap();
    again.logger().log_metrics(&metrics, Some(2)).unwrap();
    finalize(&mut again).unwrap();

    let lines = FileLogger::read_metrics(&again.paths().logs.join("metrics.jsonl")).unwrap();
    let steps: Vec<_> = lines.iter().map(|l| l.step).collect();
    assert_eq!(steps, vec![Some(1), Some(2)]);
}

#[test]
fn test_reload_logger_override() {
    let tmp = TempDir::new().unwrap();
    let ctx = create(opts("ovr", tmp.path()).exp_id("ovr-1")).unwrap();
    drop(ctx);

    let reload_opts = ReloadOptions {
        project: None,
        logger: Some(LoggerKind::File),
    };
    let mut again = reload_with("ovr-1", tmp.path(), &reload_opts).unwrap();
    again
        .logger()
        .log_metrics(&Metrics::from([("acc".to_string(), 1.0)]), None)
        .unwrap();
    assert!(again.paths().logs.join("metrics.jsonl").is_file());
}

#[test]
fn test_seq_create_twice() {
    let tmp = TempDir::new().unwrap();
    let first = create(opts("SeqProj", tmp.path()).id_style(IdStyle::Seq)).unwrap();
    let second = create(opts("SeqProj", tmp.path()).id_style(IdStyle::Seq)).unwrap();
    assert_eq!(first.exp_id(), "seqproj-01");
    assert_eq!(second.exp_id(), "seqproj-02");
}

#[test]
fn test_custom_generator() {
    let tmp = TempDir::new().unwrap();
    let ctx = create(opts("gen", tmp.path()).id_generator(|project, _root| format!("{project}-custom"))).unwrap();
    assert_eq!(ctx.exp_id(), "gen-custom");
}

#[test]
fn test_remote_without_url_is_invalid_configuration() {
    if std::env::var_os(expbox::logger::TRACKING_URL_ENV).is_some() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let result = create(opts("remote", tmp.path()).exp_id("r").logger(LoggerKind::Remote));
    assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_active_box_create_and_reload() {
    let tmp = TempDir::new().unwrap();
    let results = tmp.path().join("results");
    let mut active = ActiveBox::new(tmp.path());

    active
        .create(opts("boxed", &results).exp_id("box-1"))
        .unwrap();
    assert_eq!(active.exp_id().unwrap(), "box-1");
    assert_eq!(active.project().unwrap(), "boxed");
    assert_eq!(read_active_pointer(tmp.path()).unwrap().as_deref(), Some("box-1"));

    active.meta_mut().unwrap().set_final_note("via box");
    active.finalize(&FinalizeOptions::default()).unwrap();

    let mut other = ActiveBox::new(tmp.path());
    let pointer = other.pointer().unwrap().unwrap();
    other
        .reload(&pointer, &results, &ReloadOptions::default())
        .unwrap();
    assert_eq!(other.meta().unwrap().final_note(), Some("via box"));
    assert!(other.meta().unwrap().finished_at().is_some());
}
