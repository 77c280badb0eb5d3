//! Command-line interface for the churn model lifecycle

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ConfigLoader, LogFormat, PipelineConfig};
use crate::drift::{DriftMonitor, MonitorOutcome, RetrainDecision};
use crate::pipeline::{FlowOutcome, TrainingFlow, TrainingTrigger};
use crate::server::{run_server, AppState};
use crate::serving::{PredictionService, RequestLogger};
use crate::storage::{LocalObjectStore, ObjectStore, ObjectUri};
use crate::validation::DriftValidation;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString   { s.truecolor(230, 190, 90) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_warn(msg: &str) {
    println!("  {} {}", warn("!"), msg);
}

fn step_run(msg: &str) {
    println!("  {} {}...", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("  {} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn banner(subtitle: &str) {
    println!();
    line_box_top();
    line_box_center(&"churnflow".white().bold().to_string());
    line_box_center(&muted(subtitle).to_string());
    line_box_bottom();
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "churnflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Churn model lifecycle: train, promote, serve and monitor")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full training pipeline once
    Train {
        /// Pipeline config file
        #[arg(short, long, env = "CHURNFLOW_CONFIG")]
        config: Option<PathBuf>,

        /// Reason recorded on the pipeline run
        #[arg(long, default_value = crate::pipeline::MANUAL_TRIGGER_REASON)]
        trigger_reason: String,
    },

    /// Check one day of logged predictions for drift, retraining on drift
    Monitor {
        #[arg(short, long, env = "CHURNFLOW_CONFIG")]
        config: Option<PathBuf>,

        /// Partition to check (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Significance level overriding the configured one
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Serve predictions from the production model
    Serve {
        #[arg(short, long, env = "CHURNFLOW_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Compare two CSV files column by column for drift
    Compare {
        #[arg(long)]
        reference: PathBuf,

        #[arg(long)]
        current: PathBuf,

        #[arg(long, default_value = "0.05")]
        threshold: f64,

        /// Where the JSON report is written
        #[arg(long, default_value = "artifacts/drift_validation/report.json")]
        report: PathBuf,
    },
}

impl Commands {
    /// Load the pipeline config for commands that take one
    pub fn load_config(&self) -> anyhow::Result<Option<PipelineConfig>> {
        let path = match self {
            Commands::Train { config, .. }
            | Commands::Monitor { config, .. }
            | Commands::Serve { config, .. } => config.as_deref(),
            Commands::Compare { .. } => return Ok(None),
        };
        Ok(Some(ConfigLoader::load(path)?))
    }
}

/// Log format to install before anything runs
pub fn log_format(config: Option<&PipelineConfig>) -> LogFormat {
    config.map(|c| c.logging.format).unwrap_or_default()
}

/// Dispatch a parsed command
pub async fn run(command: Commands, config: Option<PipelineConfig>) -> anyhow::Result<()> {
    let config = config.unwrap_or_default();
    match command {
        Commands::Train { trigger_reason, .. } => cmd_train(config, &trigger_reason).await,
        Commands::Monitor { date, threshold, .. } => cmd_monitor(config, date, threshold).await,
        Commands::Serve { host, port, .. } => cmd_serve(config, host, port).await,
        Commands::Compare {
            reference,
            current,
            threshold,
            report,
        } => cmd_compare(&reference, &current, threshold, &report),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_train(config: PipelineConfig, trigger_reason: &str) -> anyhow::Result<()> {
    banner("training pipeline");
    let start = Instant::now();

    step_run("Preparing registry, storage and tracker");
    let flow = TrainingFlow::from_config(config)?;
    step_ok("Pipeline ready");

    step_run("Running ingest, validate, transform, train, evaluate, push");
    let outcome = flow.run(TrainingTrigger::with_reason(trigger_reason)).await?;
    step_done(&format!("{:.1}s", start.elapsed().as_secs_f64()));

    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &FlowOutcome) {
    match outcome {
        FlowOutcome::ValidationFailed { validation } => {
            section("Validation failed");
            step_warn(validation.message.as_deref().unwrap_or("data checks did not pass"));
            println!("  {}", kv("report", &validation.report_path.display().to_string()));
        }
        FlowOutcome::Completed {
            ingestion,
            transformation,
            trainer,
            evaluation,
            pusher,
        } => {
            section("Data");
            println!("  {}", kv("rows         ", &ingestion.total_rows.to_string()));
            println!(
                "  {}",
                kv(
                    "train / test ",
                    &format!("{} / {}", ingestion.train_rows, ingestion.test_rows)
                )
            );
            println!(
                "  {}",
                kv(
                    "resampled    ",
                    &format!(
                        "{} -> {}",
                        transformation.train_rows_before, transformation.train_rows_after
                    )
                )
            );

            section("Model");
            println!("  {}", kv("version      ", &trainer.registry_version.to_string()));
            println!("  {}", kv("score        ", &format!("{:.4}", trainer.score)));
            println!("  {}", kv("challenger   ", &format!("{:.4}", evaluation.challenger_score)));
            println!(
                "  {}",
                kv(
                    "champion     ",
                    &match evaluation.champion_version {
                        Some(v) => format!("{:.4} (v{})", evaluation.champion_score, v),
                        None => "none".to_string(),
                    }
                )
            );

            section("Promotion");
            if pusher.promoted {
                step_ok(&format!(
                    "Promoted as production version {}",
                    pusher.production_version.unwrap_or_default()
                ));
                if let Some(uri) = &pusher.production_uri {
                    println!("  {}", kv("mirrored to  ", uri));
                }
            } else {
                step_warn("Challenger not accepted, champion unchanged");
            }
        }
    }
}

pub async fn cmd_monitor(
    mut config: PipelineConfig,
    date: Option<NaiveDate>,
    threshold: Option<f64>,
) -> anyhow::Result<()> {
    banner("drift monitor");
    if let Some(threshold) = threshold {
        anyhow::ensure!(
            threshold > 0.0 && threshold < 1.0,
            "threshold must be in (0, 1), got {}",
            threshold
        );
        config.monitor.threshold = threshold;
    }
    let date = date.unwrap_or_else(|| Utc::now().date_naive());

    let flow = TrainingFlow::from_config(config.clone())?;
    let monitor = DriftMonitor::new(
        config.monitor.clone(),
        config.schema.clone(),
        config.ingestion.base_query.clone(),
        Arc::clone(flow.source()),
        Arc::clone(flow.store()),
    );

    step_run(&format!("Checking logged inputs for {}", date));
    match monitor.run(date, &flow).await? {
        MonitorOutcome::NoData => step_warn("No logged predictions for this date"),
        MonitorOutcome::Checked { report, retrain } => {
            section("Drift");
            println!("  {}", kv("current rows ", &report.current_rows.to_string()));
            println!("  {}", kv("features     ", &report.features.len().to_string()));
            println!("  {}", kv("threshold    ", &report.threshold.to_string()));
            if !report.reliable {
                step_warn("Sample below the minimum size, result is not statistically reliable");
            }
            let drifted = report.drifted_features();
            if drifted.is_empty() {
                step_ok("No drift detected");
            } else {
                step_warn(&format!("Drift in: {}", drifted.join(", ")));
            }

            if let RetrainDecision::Triggered { outcome, .. } = retrain {
                section("Retraining");
                print_outcome(&outcome);
            }
        }
    }
    Ok(())
}

pub async fn cmd_serve(
    config: PipelineConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut settings = config.server.clone();
    if let Some(host) = host {
        settings.host = host;
    }
    if let Some(port) = port {
        settings.port = port;
    }

    let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(&config.storage.root)?);
    let production_uri = ObjectUri::parse(&config.pusher.production_uri)?;
    let service = Arc::new(PredictionService::bootstrap(Arc::clone(&store), production_uri));
    let logger = settings.log_requests.then(|| {
        RequestLogger::new(
            store,
            config.monitor.log_bucket.clone(),
            config.monitor.log_prefix.clone(),
        )
    });

    run_server(&settings, Arc::new(AppState::new(service, logger))).await
}

pub fn cmd_compare(
    reference: &Path,
    current: &Path,
    threshold: f64,
    report: &Path,
) -> anyhow::Result<()> {
    banner("drift comparison");
    anyhow::ensure!(
        threshold > 0.0 && threshold < 1.0,
        "threshold must be in (0, 1), got {}",
        threshold
    );

    step_run("Comparing column distributions");
    let artifact = DriftValidation::new(threshold, report).validate(reference, current)?;
    if artifact.validation_status {
        step_ok("No drift detected");
    } else {
        step_warn(artifact.message.as_deref().unwrap_or("Drift detected"));
    }
    println!("  {}", kv("report", &artifact.report_path.display().to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_monitor_args() {
        let cli = Cli::try_parse_from([
            "churnflow", "monitor", "--date", "2024-03-15", "--threshold", "0.01",
        ])
        .unwrap();
        match cli.command {
            Commands::Monitor { date, threshold, .. } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 15));
                assert_eq!(threshold, Some(0.01));
            }
            _ => panic!("expected monitor"),
        }
    }

    #[test]
    fn test_compare_needs_no_config() {
        let cli = Cli::try_parse_from([
            "churnflow", "compare", "--reference", "a.csv", "--current", "b.csv",
        ])
        .unwrap();
        assert!(cli.command.load_config().unwrap().is_none());
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1mbold\x1b[0m"), "bold");
    }
}
