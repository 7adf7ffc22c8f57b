//! SessionForge: customer session analytics CLI
//!
//! Loads the pretrained segmentation and intent models once, then analyses
//! single sessions, scores datasets and writes exports.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use sessionforge::cli::{Args, Command};
use sessionforge::data::{preview_frame, PREVIEW_ROWS};
use sessionforge::{
    generate_insights, load_dataset, normalized_profile, report, viz, Config, DatasetInfo,
    ModelGateway, ModelPaths, PredictionResult, RawSessionInput, Session,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "sessionforge=debug"
    } else {
        "sessionforge=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.resolve_config().context("Failed to resolve configuration")?;
    let gateway = Arc::new(ModelGateway::load(&ModelPaths::in_dir(&config.models_dir)));
    if let Some(reason) = gateway.status().reason {
        println!("Models not loaded: {}", reason);
    }
    let mut session = Session::new(gateway);

    match &args.command {
        Command::Predict {
            session: session_args,
            chart,
            export,
        } => {
            let input = session_args.to_input().context("Invalid session input")?;
            let outcome = run_predict(&mut session, &input, chart.as_deref());
            finish(&session, &config, *export, outcome)
        }
        Command::Batch { chart, export, .. } => {
            let outcome = run_batch(&mut session, &config, chart.as_deref());
            finish(&session, &config, *export, outcome)
        }
        Command::Session {
            inputs, with_batch, ..
        } => {
            let outcome = run_session(&mut session, &config, inputs, *with_batch);
            finish(&session, &config, true, outcome)
        }
    }
}

/// Write exports when requested, even after a failed command, then hand back
/// the command's outcome. A failure is reported before exporting.
fn finish(session: &Session, config: &Config, export: bool, outcome: Result<()>) -> Result<()> {
    if export {
        if let Err(e) = &outcome {
            eprintln!("Error: {:#}", e);
        }
        run_export(session, config)?;
    }
    outcome
}

fn print_prediction(result: &PredictionResult) {
    println!("\n=== Analysis Results ===");
    println!(
        "Customer Segment: {} (Cluster {})",
        result.cluster_label, result.cluster_id
    );
    println!("Purchase Intent: {}", result.purchase_label);
    println!(
        "Purchase Probability: {:.1}%",
        result.purchase_probability * 100.0
    );

    println!("\n=== Feature Importance ===");
    let mut ranked = result.attributions.clone();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    for (name, value) in ranked.iter().take(5) {
        println!("  {:<32} {:+.4}", name, value);
    }

    println!("\n=== Insights ===");
    for insight in generate_insights(result) {
        println!("  - {}", insight);
    }

    println!("\n=== Behavior Profile (normalized) ===");
    for (label, value) in normalized_profile(&result.source_features) {
        println!("  {:<32} {:.2}", label, value);
    }
}

/// Analyse a single session
fn run_predict(session: &mut Session, input: &RawSessionInput, chart: Option<&Path>) -> Result<()> {
    let start_time = Instant::now();
    let result = session.analyze(input).context("Analysis failed")?;
    print_prediction(&result);
    println!("\nProcessing time: {:.2}s", start_time.elapsed().as_secs_f64());

    if let Some(path) = chart {
        viz::render_attribution_chart(&result, path)
            .with_context(|| format!("Failed to write chart {}", path.display()))?;
        println!("Attribution chart saved to: {}", path.display());
    }

    Ok(())
}

/// Load and score the configured dataset
fn run_batch(session: &mut Session, config: &Config, chart: Option<&Path>) -> Result<()> {
    let start_time = Instant::now();
    let df = load_dataset(&config.dataset_path).with_context(|| {
        format!("Failed to load dataset {}", config.dataset_path.display())
    })?;

    let info = DatasetInfo::from_frame(&df);
    println!("Rows: {} | Columns: {}", info.rows, info.columns);
    println!("Status: {}", info.status());
    println!("{}", preview_frame(&df, PREVIEW_ROWS)?);

    let result = session
        .run_batch(&df, config.sample_size)
        .context("Batch processing failed")?;
    let summary = result.summary;

    println!("\n=== Batch Results ===");
    println!("Processed: {} sessions", summary.total_rows);
    println!(
        "High-Intent Shoppers: {} ({:.1}%)",
        summary.high_intent,
        summary.high_intent_share() * 100.0
    );
    println!(
        "Likely to Purchase: {} ({:.1}%)",
        summary.likely_purchase,
        summary.likely_purchase_share() * 100.0
    );
    println!(
        "Average Purchase Probability: {:.1}%",
        summary.average_probability * 100.0
    );
    println!("Processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    println!("{}", result.preview(PREVIEW_ROWS)?);

    if let Some(path) = chart {
        viz::render_batch_chart(result, path)
            .with_context(|| format!("Failed to write chart {}", path.display()))?;
        println!("Batch chart saved to: {}", path.display());
    }

    Ok(())
}

fn run_session(
    session: &mut Session,
    config: &Config,
    inputs: &Path,
    with_batch: bool,
) -> Result<()> {
    let contents = fs::read_to_string(inputs)
        .with_context(|| format!("Failed to read {}", inputs.display()))?;
    let sessions: Vec<RawSessionInput> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", inputs.display()))?;

    for (i, input) in sessions.iter().enumerate() {
        input
            .validate()
            .with_context(|| format!("Session {} is invalid", i + 1))?;
        let result = session.analyze(input).context("Analysis failed")?;
        println!(
            "Session {}: {} / {} ({:.1}%)",
            i + 1,
            result.cluster_label,
            result.purchase_label,
            result.purchase_probability * 100.0
        );
    }

    if with_batch {
        run_batch(session, config, None)?;
    }

    let stats = session.summary_stats();
    println!("\n=== Summary ===");
    println!("Single predictions: {}", stats.single_predictions);
    println!("Batch predictions: {}", stats.batch_predictions);
    println!("Total predictions: {}", stats.total);

    Ok(())
}

fn run_export(session: &Session, config: &Config) -> Result<()> {
    let written = report::write_exports(session, &config.export_dir, &Local::now())
        .with_context(|| format!("Failed to write exports to {}", config.export_dir.display()))?;
    for path in written {
        println!("Exported: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_failed_predict_still_exports() {
        let exports = tempdir().unwrap();
        let config = Config {
            export_dir: exports.path().join("out"),
            ..Config::default()
        };
        let mut session = Session::new(Arc::new(ModelGateway::disabled("no artifacts")));

        let outcome = run_predict(&mut session, &RawSessionInput::default(), None);
        assert!(outcome.is_err());
        assert!(finish(&session, &config, true, outcome).is_err());

        let written = fs::read_dir(&config.export_dir).unwrap().count();
        assert_eq!(written, 3);
    }

    #[test]
    fn test_finish_without_export_writes_nothing() {
        let exports = tempdir().unwrap();
        let config = Config {
            export_dir: exports.path().join("out"),
            ..Config::default()
        };
        let session = Session::new(Arc::new(ModelGateway::disabled("no artifacts")));

        assert!(finish(&session, &config, false, Ok(())).is_ok());
        assert!(!config.export_dir.exists());
    }
}
