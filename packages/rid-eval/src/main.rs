//! main.rs — rid-eval command line
//!
//!   rid-eval run <kf|mlat|txp|all> <train_dir> <test_dir> [-o DIR] ...
//!       optimize on train, evaluate the frozen detector on test,
//!       write `<detector>_results.json` (and `comparison.json` for `all`)
//!   rid-eval score <csv> <detector> [--threshold T] [--per-event]
//!       score one scenario table and print its metrics, or one CSV row per event
//!
//! Scenario files are loaded concurrently on the blocking pool; scoring
//! itself runs synchronously per detector.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rid_types::{DatasetFingerprint, EvaluationRecord};
use serde::Serialize;
use tracing::{info, warn};

use rid_eval::config::EvalConfig;
use rid_eval::detectors::{Detector, DetectorKind, PassThroughDetector};
use rid_eval::evaluate::{dataset_fingerprint, run_evaluation};
use rid_eval::metrics::{compute_metrics, compute_roc_auc};
use rid_eval::optimize::{scenario_samples, CollectOptions, ParamGrid};
use rid_eval::scenario::{dataset_files, load_scenario, Scenario};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rid-eval", about = "Remote ID spoofing detector evaluation")]
struct Args {
    /// Config file path (built-in defaults when missing)
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train-then-test evaluation
    Run {
        method: Method,
        train_dir: PathBuf,
        test_dir: PathBuf,
        /// Output directory for result artifacts
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
        #[arg(long)]
        train_limit: Option<usize>,
        #[arg(long)]
        test_limit: Option<usize>,
        /// Score only federate receptions
        #[arg(long)]
        federate_only: bool,
        /// One sample per transmission
        #[arg(long)]
        transmission_level: bool,
        /// Keep ROC arrays in the artifacts
        #[arg(long)]
        full_curves: bool,
    },
    /// Score a single scenario table
    Score {
        csv: PathBuf,
        detector: Method,
        #[arg(long)]
        threshold: Option<f64>,
        /// Print one CSV row per RX event instead of the summary
        #[arg(long)]
        per_event: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Method {
    Kf,
    Mlat,
    Txp,
    All,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rid_eval=info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = EvalConfig::load(&args.config).context("loading config")?;

    match args.command {
        Command::Run {
            method, train_dir, test_dir, output,
            train_limit, test_limit, federate_only, transmission_level, full_curves,
        } => {
            let opts = CollectOptions {
                federate_only: federate_only || cfg.dataset.federate_only,
                transmission_level: transmission_level || cfg.dataset.transmission_level,
            };
            let include_curves = full_curves || cfg.output.include_curves;
            run(&cfg, method, &train_dir, &test_dir, &output, train_limit, test_limit, opts, include_curves).await
        }
        Command::Score { csv, detector, threshold, per_event } => {
            score(&cfg, &csv, detector, threshold, per_event).await
        }
    }
}

// ── Detectors from config ─────────────────────────────────────────────────────

fn detectors_for(method: Method, cfg: &EvalConfig) -> Vec<DetectorKind> {
    let kf = || DetectorKind::from(PassThroughDetector);
    let mlat = || DetectorKind::from(cfg.multilateration.detector());
    let txp = || DetectorKind::from(cfg.tx_power.detector());
    match method {
        Method::Kf => vec![kf()],
        Method::Mlat => vec![mlat()],
        Method::Txp => vec![txp()],
        Method::All => vec![kf(), mlat(), txp()],
    }
}

/// Path-loss grid for the multilateration detector; other detectors have none.
fn grid_for(detector: &DetectorKind, cfg: &EvalConfig) -> Option<ParamGrid> {
    match detector {
        DetectorKind::Multilateration(_) if !cfg.grid.path_loss_exp.is_empty() => {
            Some(ParamGrid::new().axis("path_loss_exp", cfg.grid.path_loss_exp.iter().copied()))
        }
        _ => None,
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load every table of `dir` on the blocking pool, keeping file-name order.
async fn load_dataset(dir: &Path, limit: Option<usize>, num_federates: usize) -> Result<Vec<Scenario>> {
    let files = dataset_files(dir, limit).with_context(|| format!("listing {}", dir.display()))?;
    let handles: Vec<_> = files
        .into_iter()
        .map(|path| tokio::task::spawn_blocking(move || load_scenario(&path, num_federates)))
        .collect();

    let mut scenarios = Vec::with_capacity(handles.len());
    for handle in handles {
        scenarios.push(handle.await.context("loader task panicked")??);
    }
    Ok(scenarios)
}

fn log_dataset(label: &str, scenarios: &[Scenario]) {
    let events: usize = scenarios.iter().map(Scenario::n_events).sum();
    let spoofed: usize = scenarios.iter().map(Scenario::n_spoofed).sum();
    info!("📂 {label}: {} scenarios, {events} RX events ({spoofed} spoofed)", scenarios.len());
}

// ── run ───────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Comparison {
    generated_at: chrono::DateTime<chrono::Utc>,
    dataset: DatasetFingerprint,
    federate_only: bool,
    transmission_level: bool,
    results: Vec<EvaluationRecord>,
}

#[allow(clippy::too_many_arguments)]
async fn run(
    cfg: &EvalConfig,
    method: Method,
    train_dir: &Path,
    test_dir: &Path,
    output: &Path,
    train_limit: Option<usize>,
    test_limit: Option<usize>,
    opts: CollectOptions,
    include_curves: bool,
) -> Result<()> {
    let n_fed = cfg.dataset.num_federates;
    let (train, test) = tokio::try_join!(
        load_dataset(train_dir, train_limit, n_fed),
        load_dataset(test_dir, test_limit, n_fed),
    )?;
    log_dataset("train", &train);
    log_dataset("test", &test);

    let fingerprint = dataset_fingerprint(&train, &test);
    info!("Dataset fingerprint {}", fingerprint.digest);

    let train = Arc::new(train);
    let test = Arc::new(test);
    tokio::fs::create_dir_all(output)
        .await
        .with_context(|| format!("creating {}", output.display()))?;

    let mut comparison = Vec::new();
    for detector in detectors_for(method, cfg) {
        let grid = grid_for(&detector, cfg);
        info!("🔎 {}: optimizing on train", detector.name());

        let (train_ref, test_ref) = (Arc::clone(&train), Arc::clone(&test));
        let det = detector.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            run_evaluation(&det, &train_ref, &test_ref, opts, grid.as_ref())
        })
        .await
        .context("evaluation task panicked")??;

        let artifact = outcome.to_artifact(fingerprint.clone(), include_curves);
        let path = output.join(format!("{}_results.json", detector.name()));
        tokio::fs::write(&path, serde_json::to_string_pretty(&artifact)?)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        let m = &artifact.evaluation.metrics;
        info!(
            "✅ {}: AUC {:.4} TPR {:.3} FPR {:.3} @ {:.4} → {}",
            detector.name(), m.auc, m.tpr, m.fpr, m.threshold, path.display()
        );
        comparison.push(artifact.evaluation);
    }

    if method == Method::All {
        let report = Comparison {
            generated_at: chrono::Utc::now(),
            dataset: fingerprint,
            federate_only: opts.federate_only,
            transmission_level: opts.transmission_level,
            results: comparison,
        };
        let path = output.join("comparison.json");
        tokio::fs::write(&path, serde_json::to_string_pretty(&report)?)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Comparison written to {}", path.display());
    }
    Ok(())
}

// ── score ─────────────────────────────────────────────────────────────────────

async fn score(
    cfg: &EvalConfig,
    csv: &Path,
    method: Method,
    threshold: Option<f64>,
    per_event: bool,
) -> Result<()> {
    let Some(detector) = detectors_for(method, cfg).into_iter().next().filter(|_| method != Method::All) else {
        bail!("`score` takes a single detector (kf, mlat or txp)");
    };

    let path = csv.to_path_buf();
    let n_fed = cfg.dataset.num_federates;
    let scenario = tokio::task::spawn_blocking(move || load_scenario(&path, n_fed))
        .await
        .context("loader task panicked")??;
    log_dataset(scenario.scenario_id(), std::slice::from_ref(&scenario));

    let scores = detector.score(&scenario);
    if per_event {
        return scenario
            .write_scores(&scores, threshold, std::io::stdout().lock())
            .context("writing per-event scores");
    }
    let set = scenario_samples(&scenario, &scores, CollectOptions::default());

    match threshold {
        Some(t) => {
            let metrics = compute_metrics(&set.scores, &set.labels, &set.times, t);
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        None => {
            let roc = compute_roc_auc(&set.scores, &set.labels);
            if set.n_positive() == 0 {
                warn!("{}: no spoofed events, AUC is undefined", scenario.scenario_id());
            }
            println!("{} {}: AUC {:.4} over {} events", detector.name(), scenario.scenario_id(), roc.auc, set.len());
        }
    }
    Ok(())
}
