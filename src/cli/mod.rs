//! Command-line interface
//!
//! One subcommand per stage: prepare the dataset, train, tune, run the
//! pipeline, serve predictions or start the browser demo.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::dataset::{prepare, DEFAULT_DATA_PATH};
use crate::pipeline::{IrisPipeline, PipelineParams, PIPELINE_MODEL_FILE};
use crate::search::{HyperparameterSearch, SearchConfig};
use crate::tracking::{ExperimentConfig, ExperimentTracker};
use crate::training::{
    Hyperparameters, LogisticSolver, ModelFamily, SvmKernel, Trainer, TrainingConfig,
    DEFAULT_ARTIFACTS_DIR,
};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 50;

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}
fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}
fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}
fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn line_box_top() {
    println!("  {}", dim(&format!("┌{}┐", "─".repeat(W + 3))));
}
fn line_box_bottom() {
    println!("  {}", dim(&format!("└{}┘", "─".repeat(W + 3))));
}

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
            continue;
        }
        if in_escape {
            if c == 'm' {
                in_escape = false;
            }
            continue;
        }
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

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(W)));
}

fn summary(key: &str, val: String) {
    println!("  {:<18} {}", muted(key), val.as_str().white().bold());
}

fn open_tracker(dir: Option<&Path>) -> anyhow::Result<ExperimentTracker> {
    Ok(match dir {
        Some(dir) => ExperimentTracker::with_dir(dir)?,
        None => ExperimentTracker::new(ExperimentConfig::default())?,
    })
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "iris")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Iris classifier: train, tune, track and serve")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the Iris dataset to CSV
    PrepareData {
        #[arg(short, long, default_value = DEFAULT_DATA_PATH)]
        output: PathBuf,
    },

    /// Train one model and record the run
    Train {
        /// Model family (logistic, svm)
        #[arg(short, long, default_value = "logistic")]
        model: ModelFamily,

        /// Inverse regularization strength
        #[arg(long = "C", default_value_t = 1.0)]
        c: f64,

        /// Logistic solver (lbfgs, newton-cg, liblinear)
        #[arg(long, default_value = "lbfgs")]
        solver: LogisticSolver,

        /// SVM kernel (linear, rbf, poly, sigmoid)
        #[arg(long, default_value = "rbf")]
        kernel: SvmKernel,

        /// Iteration cap for logistic regression
        #[arg(long = "max_iter", default_value_t = 200)]
        max_iter: usize,

        /// Write artifacts/model_{VERSION}.pkl instead of artifacts/model.pkl
        #[arg(long)]
        version: Option<String>,

        #[arg(short, long, default_value = DEFAULT_DATA_PATH)]
        data: PathBuf,

        #[arg(long, default_value = DEFAULT_ARTIFACTS_DIR)]
        artifacts_dir: PathBuf,

        /// Tracking directory (defaults to TRACKING_DIR or ./mlruns)
        #[arg(long)]
        tracking_dir: Option<PathBuf>,
    },

    /// Cross-validated hyperparameter search
    Tune {
        #[arg(long, default_value_t = 10)]
        n_trials: usize,

        #[arg(long, default_value_t = 5)]
        cv_folds: usize,

        #[arg(short, long, default_value = DEFAULT_DATA_PATH)]
        data: PathBuf,

        #[arg(long, default_value = DEFAULT_ARTIFACTS_DIR)]
        artifacts_dir: PathBuf,

        #[arg(long)]
        tracking_dir: Option<PathBuf>,
    },

    /// Run load → split → train → evaluate
    Pipeline {
        /// Model family (logistic, svm)
        #[arg(short, long, default_value = "logistic")]
        model: ModelFamily,

        #[arg(long = "C", default_value_t = 1.0)]
        c: f64,

        #[arg(short, long, default_value = DEFAULT_DATA_PATH)]
        data: PathBuf,

        #[arg(long)]
        model_path: Option<PathBuf>,
    },

    /// Serve predictions over HTTP
    Serve {
        #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(short, long, env = "API_PORT", default_value_t = 8000)]
        port: u16,

        /// Selects artifacts/model_{VERSION}.pkl
        #[arg(long, env = "MODEL_VERSION", default_value = "v1")]
        model_version: String,

        #[arg(long, env = "ARTIFACTS_DIR", default_value = DEFAULT_ARTIFACTS_DIR)]
        artifacts_dir: PathBuf,
    },

    /// Start the interactive browser demo
    Demo {
        #[arg(long, env = "DEMO_HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(short, long, env = "DEMO_PORT", default_value_t = 7860)]
        port: u16,

        #[arg(long, env = "DEMO_MODEL_PATH", default_value = "artifacts/model.pkl")]
        model_path: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_prepare_data(output: &Path) -> anyhow::Result<()> {
    section("Prepare data");

    step_run("Writing Iris table");
    let start = Instant::now();
    let dataset = prepare(output)?;
    step_done(&format!("{} rows in {:?}", dataset.len(), start.elapsed()));

    let counts = dataset.class_counts();
    step_ok(&format!(
        "{} {}",
        output.display(),
        dim(&format!("(per class {:?})", counts))
    ));
    println!();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_train(
    model: ModelFamily,
    c: f64,
    solver: LogisticSolver,
    kernel: SvmKernel,
    max_iter: usize,
    version: Option<&str>,
    data: &Path,
    artifacts_dir: &Path,
    tracking_dir: Option<&Path>,
) -> anyhow::Result<()> {
    section("Train");

    let hp = match model {
        ModelFamily::Logistic => Hyperparameters::logistic(c)
            .with_solver(solver)
            .with_max_iter(max_iter),
        ModelFamily::Svm => Hyperparameters::svm(c).with_kernel(kernel),
    };

    let mut config = TrainingConfig::new(hp)
        .with_data_path(data)
        .with_artifacts_dir(artifacts_dir);
    if let Some(tag) = version {
        config = config.with_version(tag);
    }

    let tracker = open_tracker(tracking_dir)?;

    step_run(&format!("Training {}", hp.to_string().as_str().cyan()));
    let report = Trainer::new(config).run(&tracker)?;
    step_done(&format!("{:.3}s", report.training_time_secs));

    println!();
    summary("Accuracy", format!("{:.4}", report.accuracy));
    summary("Train / test", format!("{} / {}", report.n_train, report.n_test));
    summary("Model", report.model_path.display().to_string());
    summary("Confusion matrix", report.confusion_matrix_path.display().to_string());
    summary("Run", format!("{} ({})", report.run_name, report.run_id));
    println!();
    Ok(())
}

pub fn cmd_tune(
    n_trials: usize,
    cv_folds: usize,
    data: &Path,
    artifacts_dir: &Path,
    tracking_dir: Option<&Path>,
) -> anyhow::Result<()> {
    section("Hyperparameter search");

    let config = SearchConfig::new()
        .with_n_trials(n_trials)
        .with_cv_folds(cv_folds)
        .with_data_path(data)
        .with_artifacts_dir(artifacts_dir);
    let tracker = open_tracker(tracking_dir)?;

    step_run(&format!("Running {} trials, {}-fold CV", n_trials, cv_folds));
    let report = HyperparameterSearch::new(config).run(&tracker)?;
    step_done(&format!("{:.2}s", report.elapsed_secs));

    println!();
    summary("Best trial", format!("#{}", report.best_trial));
    summary("Best params", report.best_hyperparameters.to_string());
    summary("CV accuracy", format!("{:.4}", report.best_cv_accuracy));
    summary("Test accuracy", format!("{:.4}", report.test_accuracy));
    if report.n_pruned > 0 {
        summary("Pruned", format!("{} / {}", report.n_pruned, report.n_trials));
    }
    summary("Model", report.model_path.display().to_string());
    summary("Study", report.study_path.display().to_string());
    println!();
    Ok(())
}

pub fn cmd_pipeline(
    model: ModelFamily,
    c: f64,
    data: &Path,
    model_path: Option<&Path>,
) -> anyhow::Result<()> {
    section("Pipeline");

    let model_path = model_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(DEFAULT_ARTIFACTS_DIR).join(PIPELINE_MODEL_FILE));
    let params = PipelineParams::new(model, c)
        .with_data_path(data)
        .with_model_path(model_path);

    let run = IrisPipeline::new().run(&params)?;
    for step in &run.steps {
        step_ok(&format!("{:<16} {}", step.name, dim(&format!("{:.3}s", step.duration_secs))));
    }

    println!();
    summary("Accuracy", format!("{:.4}", run.accuracy));
    summary("Model", run.model_path.display().to_string());
    println!();
    Ok(())
}

pub async fn cmd_serve(
    host: &str,
    port: u16,
    model_version: &str,
    artifacts_dir: &Path,
) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let config = ServerConfig::default()
        .with_host(host)
        .with_port(port)
        .with_model_version(model_version)
        .with_artifacts_dir(artifacts_dir);

    println!();
    line_box_top();
    line_box(&format!("{}", "Iris API".white().bold()));
    line_box(&kv("Model  ", &config.model_path().display().to_string()));
    line_box(&kv("Predict", &format!("POST http://{}:{}/predict", host, port)));
    line_box(&format!("{}", dim("ctrl+c to stop")));
    line_box_bottom();
    println!();

    run_server(config).await
}

pub async fn cmd_demo(host: &str, port: u16, model_path: &Path) -> anyhow::Result<()> {
    use crate::demo::{run_demo, DemoConfig};

    println!();
    line_box_top();
    line_box(&format!("{}", "Iris demo".white().bold()));
    line_box(&kv("Model", &model_path.display().to_string()));
    line_box(&kv("Open ", &format!("http://{}:{}", host, port)));
    line_box_bottom();
    println!();

    let config = DemoConfig::default()
        .with_host(host)
        .with_port(port)
        .with_model_path(model_path);
    run_demo(config).await
}
