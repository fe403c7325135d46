//! Training Loop Example
//!
//! Creates an experiment box in a temporary results root, logs a fake
//! training curve with the file logger, finalizes, then reloads it.
//!
//! Run with: cargo run --example training_loop

use expbox::experiment::FinalizeOptions;
use expbox::logger::{FileLogger, Metrics};
use expbox::{create, finalize_with, reload, CreateOptions, IdStyle, LoggerKind};

fn main() -> expbox::Result<()> {
    println!("=== expbox Training Loop ===\n");

    let results = std::env::temp_dir().join("expbox-demo-results");

    // -------------------------------------------------------------------------
    // 1. Create an experiment with configuration
    // -------------------------------------------------------------------------
    println!("1. Creating experiment...");

    let config = serde_json::json!({
        "model": "resnet18",
        "learning_rate": 0.001,
        "batch_size": 32,
        "epochs": 5
    });
    let serde_json::Value::Object(config) = config else {
        unreachable!("literal is an object");
    };

    let mut ctx = create(
        CreateOptions::new("resnet-demo")
            .title("ResNet18 toy run")
            .purpose("show the create / log / finalize cycle")
            .config(config)
            .results_root(&results)
            .id_style(IdStyle::Seq)
            .logger(LoggerKind::File),
    )?;

    println!("   Experiment ID: {}", ctx.exp_id());
    println!("   Root: {}", ctx.paths().root.display());
    println!("   Created: {}", ctx.meta().created_at());
    match ctx.meta().git_commit() {
        Some(commit) => println!("   Commit: {commit}"),
        None => println!("   Commit: (not in a git repository)"),
    }

    // -------------------------------------------------------------------------
    // 2. Log metrics per epoch
    // -------------------------------------------------------------------------
    println!("\n2. Training...");

    let epochs = ctx.config()["epochs"].as_u64().unwrap_or(3);
    let mut loss = 2.0_f64;
    for epoch in 1..=epochs {
        loss *= 0.6;
        let metrics = Metrics::from([
            ("loss".to_string(), loss),
            ("accuracy".to_string(), 1.0 - loss / 2.0),
        ]);
        ctx.logger().log_metrics(&metrics, Some(epoch))?;
        println!("   epoch {epoch}: loss={loss:.4}");
    }

    // -------------------------------------------------------------------------
    // 3. Finalize
    // -------------------------------------------------------------------------
    println!("\n3. Finalizing...");

    ctx.meta_mut()
        .extra_mut()
        .insert("best_loss".to_string(), serde_json::json!(loss));
    let opts = FinalizeOptions {
        status: Some("done".to_string()),
        final_note: Some("converged on toy data".to_string()),
        ..FinalizeOptions::default()
    };
    finalize_with(&mut ctx, &opts)?;
    println!("   Finished: {:?}", ctx.meta().finished_at());

    // -------------------------------------------------------------------------
    // 4. Reload and read the metrics back
    // -------------------------------------------------------------------------
    println!("\n4. Reloading...");

    let again = reload(ctx.exp_id(), &results)?;
    let lines = FileLogger::read_metrics(&again.paths().logs.join("metrics.jsonl"))?;
    println!("   Status: {:?}", again.meta().status());
    println!("   Metric lines: {}", lines.len());
    println!("   Extra: {}", serde_json::Value::Object(again.meta().extra().clone()));

    println!("\n=== Done ===");
    Ok(())
}
