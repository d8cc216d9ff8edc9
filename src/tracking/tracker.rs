//! Experiment tracker implementation
//!
//! Track experiments, runs, metrics and artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::storage::{LocalStorage, MemoryStorage, StorageBackend};
use crate::error::{IrisError, Result};

/// Configuration for experiment tracking
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Output directory for tracking records and artifact copies
    pub output_dir: PathBuf,
    /// Experiment used when a run starts before [`ExperimentTracker::set_experiment`]
    pub experiment_name: String,
    /// Copy logged artifacts into the tracking store
    pub enable_artifacts: bool,
    /// Keep every logged metric value, not only the latest
    pub enable_metrics_history: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            output_dir: std::env::var("TRACKING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./mlruns")),
            experiment_name: "Default".to_string(),
            enable_artifacts: true,
            enable_metrics_history: true,
        }
    }
}

/// A single metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub step: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64, step: u64) -> Self {
        Self {
            name: name.into(),
            value,
            step,
            timestamp: now_millis(),
        }
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
    Killed,
}

/// A run within an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub run_name: String,
    pub experiment_id: String,
    /// Set for runs started with [`ExperimentTracker::start_child_run`]
    pub parent_run_id: Option<String>,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub params: BTreeMap<String, String>,
    /// Latest value per metric
    pub metrics: BTreeMap<String, f64>,
    pub metrics_history: Vec<Metric>,
    pub tags: BTreeMap<String, String>,
    pub artifacts: Vec<String>,
    pub status: RunStatus,
}

impl Run {
    fn new(
        run_name: impl Into<String>,
        experiment_id: impl Into<String>,
        parent_run_id: Option<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4().simple().to_string(),
            run_name: run_name.into(),
            experiment_id: experiment_id.into(),
            parent_run_id,
            start_time: now_millis(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            metrics_history: Vec::new(),
            tags: BTreeMap::new(),
            artifacts: Vec::new(),
            status: RunStatus::Running,
        }
    }

    /// Run duration in seconds
    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(now_millis);
        (end - self.start_time) as f64 / 1000.0
    }
}

/// An experiment containing multiple runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub created_at: i64,
    pub runs: Vec<Run>,
    pub tags: BTreeMap<String, String>,
}

impl Experiment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            experiment_id: Uuid::new_v4().to_string()[..8].to_string(),
            name: name.into(),
            created_at: now_millis(),
            runs: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn get_run(&self, run_id: &str) -> Option<&Run> {
        self.runs.iter().find(|r| r.run_id == run_id)
    }

    /// Runs whose parent is `parent_run_id`, in completion order
    pub fn child_runs(&self, parent_run_id: &str) -> Vec<&Run> {
        self.runs
            .iter()
            .filter(|r| r.parent_run_id.as_deref() == Some(parent_run_id))
            .collect()
    }
}

/// Experiment tracker
///
/// Active runs form a stack: logging calls apply to the innermost run and
/// [`ExperimentTracker::end_run`] closes it. Completed runs are appended to
/// their experiment and flushed to storage.
pub struct ExperimentTracker {
    config: ExperimentConfig,
    storage: Box<dyn StorageBackend + Send + Sync>,
    experiments: RwLock<BTreeMap<String, Experiment>>,
    current_experiment: RwLock<Option<String>>,
    active_runs: RwLock<Vec<Run>>,
}

impl ExperimentTracker {
    /// Tracker backed by [`LocalStorage`] under `config.output_dir`.
    ///
    /// Experiments already on disk are loaded so new runs append to them.
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        let storage = Box::new(LocalStorage::new(config.output_dir.clone())?);
        Self::with_storage(config, storage)
    }

    /// Tracker over an arbitrary storage backend
    pub fn with_storage(
        config: ExperimentConfig,
        storage: Box<dyn StorageBackend + Send + Sync>,
    ) -> Result<Self> {
        let tracker = Self {
            config,
            storage,
            experiments: RwLock::new(BTreeMap::new()),
            current_experiment: RwLock::new(None),
            active_runs: RwLock::new(Vec::new()),
        };
        tracker.load()?;
        Ok(tracker)
    }

    /// Tracker that keeps everything in memory
    pub fn in_memory() -> Self {
        let config = ExperimentConfig {
            enable_artifacts: false,
            ..Default::default()
        };
        Self {
            config,
            storage: Box::new(MemoryStorage::new()),
            experiments: RwLock::new(BTreeMap::new()),
            current_experiment: RwLock::new(None),
            active_runs: RwLock::new(Vec::new()),
        }
    }

    /// Tracker with default configuration rooted at `output_dir`
    pub fn with_dir(output_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(ExperimentConfig {
            output_dir: output_dir.into(),
            ..Default::default()
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Select the experiment named `name`, creating it if needed.
    pub fn set_experiment(&self, name: impl Into<String>) -> String {
        let name = name.into();
        let mut experiments = self.experiments.write();

        let experiment_id = match experiments.values().find(|e| e.name == name) {
            Some(existing) => existing.experiment_id.clone(),
            None => {
                let experiment = Experiment::new(&name);
                let id = experiment.experiment_id.clone();
                debug!(experiment = %name, experiment_id = %id, "Created experiment");
                experiments.insert(id.clone(), experiment);
                id
            }
        };

        *self.current_experiment.write() = Some(experiment_id.clone());
        experiment_id
    }

    fn current_experiment_id(&self) -> String {
        let current = self.current_experiment.read().clone();
        match current {
            Some(id) => id,
            None => self.set_experiment(self.config.experiment_name.clone()),
        }
    }

    /// Start a top-level run in the current experiment
    pub fn start_run(&self, run_name: impl Into<String>) -> String {
        self.push_run(run_name.into(), None)
    }

    /// Start a run nested under the innermost active run.
    ///
    /// Falls back to a top-level run when nothing is active.
    pub fn start_child_run(&self, run_name: impl Into<String>) -> String {
        let parent = self.active_run_id();
        self.push_run(run_name.into(), parent)
    }

    fn push_run(&self, run_name: String, parent_run_id: Option<String>) -> String {
        let experiment_id = self.current_experiment_id();
        let run = Run::new(run_name, experiment_id, parent_run_id);
        let run_id = run.run_id.clone();
        debug!(
            run_id = %run_id,
            run_name = %run.run_name,
            parent = ?run.parent_run_id,
            "Started run"
        );
        self.active_runs.write().push(run);
        run_id
    }

    fn with_active_run(&self, f: impl FnOnce(&mut Run)) {
        match self.active_runs.write().last_mut() {
            Some(run) => f(run),
            None => warn!("Tracking call ignored: no active run"),
        }
    }

    pub fn log_param(&self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        self.with_active_run(|run| {
            run.params.insert(key, value);
        });
    }

    pub fn log_params<K, V>(&self, params: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: ToString,
    {
        let params: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();
        self.with_active_run(|run| run.params.extend(params));
    }

    pub fn log_metric(&self, name: impl Into<String>, value: f64, step: Option<u64>) {
        let name = name.into();
        let step = step.unwrap_or(0);
        let keep_history = self.config.enable_metrics_history;
        self.with_active_run(|run| {
            run.metrics.insert(name.clone(), value);
            if keep_history {
                run.metrics_history.push(Metric::new(name, value, step));
            }
        });
    }

    pub fn log_metrics<K: Into<String>>(
        &self,
        metrics: impl IntoIterator<Item = (K, f64)>,
        step: Option<u64>,
    ) {
        for (name, value) in metrics {
            self.log_metric(name, value, step);
        }
    }

    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        self.with_active_run(|run| {
            run.tags.insert(key, value);
        });
    }

    /// Record an artifact file on the active run.
    ///
    /// With artifacts enabled the file is copied into the tracking store and
    /// the stored location is recorded; otherwise the source path is.
    pub fn log_artifact(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IrisError::TrackingError(format!(
                "artifact does not exist: {}",
                path.display()
            )));
        }

        let ids = self
            .active_runs
            .read()
            .last()
            .map(|r| (r.experiment_id.clone(), r.run_id.clone()));
        let Some((experiment_id, run_id)) = ids else {
            return Err(IrisError::TrackingError(
                "log_artifact called without an active run".to_string(),
            ));
        };

        let recorded = if self.config.enable_artifacts {
            self.storage.store_artifact(&experiment_id, &run_id, path)?
        } else {
            path.to_path_buf()
        };

        self.with_active_run(|run| run.artifacts.push(recorded.display().to_string()));
        Ok(())
    }

    /// End the innermost active run and persist the experiments.
    pub fn end_run(&self, status: RunStatus) -> Result<()> {
        let Some(mut run) = self.active_runs.write().pop() else {
            return Err(IrisError::TrackingError("no active run to end".to_string()));
        };
        run.end_time = Some(now_millis());
        run.status = status;

        debug!(
            run_id = %run.run_id,
            status = ?status,
            duration_secs = run.duration_secs(),
            "Ended run"
        );

        {
            let mut experiments = self.experiments.write();
            let experiment = experiments
                .entry(run.experiment_id.clone())
                .or_insert_with(|| Experiment::new(self.config.experiment_name.clone()));
            experiment.runs.push(run);
        }

        self.save()
    }

    pub fn end_run_success(&self) -> Result<()> {
        self.end_run(RunStatus::Finished)
    }

    pub fn end_run_failed(&self) -> Result<()> {
        self.end_run(RunStatus::Failed)
    }

    /// Mark the innermost run failed on an error path.
    ///
    /// A tracking failure here is logged, leaving the caller free to return
    /// the error that stopped the run.
    pub fn abandon_run(&self) {
        if let Err(e) = self.end_run_failed() {
            warn!(error = %e, "Could not mark run failed");
        }
    }

    /// Snapshot of the innermost active run
    pub fn active_run(&self) -> Option<Run> {
        self.active_runs.read().last().cloned()
    }

    pub fn active_run_id(&self) -> Option<String> {
        self.active_runs.read().last().map(|r| r.run_id.clone())
    }

    pub fn current_experiment(&self) -> Option<Experiment> {
        let id = self.current_experiment.read().clone()?;
        self.experiments.read().get(&id).cloned()
    }

    pub fn get_experiment(&self, experiment_id: &str) -> Option<Experiment> {
        self.experiments.read().get(experiment_id).cloned()
    }

    pub fn get_experiment_by_name(&self, name: &str) -> Option<Experiment> {
        self.experiments
            .read()
            .values()
            .find(|e| e.name == name)
            .cloned()
    }

    pub fn list_experiments(&self) -> Vec<Experiment> {
        self.experiments.read().values().cloned().collect()
    }

    /// Flush all experiments to storage
    pub fn save(&self) -> Result<()> {
        let experiments: Vec<Experiment> = self.experiments.read().values().cloned().collect();
        self.storage.save_experiments(&experiments)
    }

    /// Merge experiments from storage into memory
    pub fn load(&self) -> Result<()> {
        let loaded = self.storage.load_experiments()?;
        let mut experiments = self.experiments.write();
        for exp in loaded {
            experiments.insert(exp.experiment_id.clone(), exp);
        }
        Ok(())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_basic() {
        let tracker = ExperimentTracker::in_memory();

        let exp_id = tracker.set_experiment("test_experiment");
        assert!(!exp_id.is_empty());

        let run_id = tracker.start_run("run_1");
        assert!(!run_id.is_empty());

        tracker.log_param("C", 1.0);
        tracker.log_param("solver", "lbfgs");
        tracker.log_metric("accuracy", 0.95, None);
        tracker.end_run_success().unwrap();

        let exp = tracker.current_experiment().unwrap();
        assert_eq!(exp.runs.len(), 1);
        assert_eq!(exp.runs[0].status, RunStatus::Finished);
        assert_eq!(exp.runs[0].params["solver"], "lbfgs");
        assert_eq!(exp.runs[0].metrics["accuracy"], 0.95);
    }

    #[test]
    fn test_set_experiment_reuses_name() {
        let tracker = ExperimentTracker::in_memory();
        let a = tracker.set_experiment("same");
        let b = tracker.set_experiment("same");
        assert_eq!(a, b);
        assert_eq!(tracker.list_experiments().len(), 1);
    }

    #[test]
    fn test_nested_runs() {
        let tracker = ExperimentTracker::in_memory();
        tracker.set_experiment("study");

        let parent = tracker.start_run("parent");
        for i in 0..3 {
            tracker.start_child_run(format!("trial_{}", i));
            tracker.log_metric("accuracy", 0.5 + i as f64 * 0.1, None);
            tracker.end_run_success().unwrap();
        }
        assert_eq!(tracker.active_run_id().as_deref(), Some(parent.as_str()));
        tracker.end_run_success().unwrap();

        let exp = tracker.current_experiment().unwrap();
        assert_eq!(exp.runs.len(), 4);
        assert_eq!(exp.child_runs(&parent).len(), 3);
        assert!(exp.get_run(&parent).unwrap().parent_run_id.is_none());
    }

    #[test]
    fn test_metrics_history() {
        let tracker = ExperimentTracker::in_memory();
        tracker.start_run("run");

        tracker.log_metric("loss", 1.0, Some(0));
        tracker.log_metric("loss", 0.5, Some(1));
        tracker.log_metric("loss", 0.1, Some(2));

        let run = tracker.active_run().unwrap();
        assert_eq!(run.metrics_history.len(), 3);
        assert_eq!(run.metrics.get("loss"), Some(&0.1));
    }

    #[test]
    fn test_end_without_run() {
        let tracker = ExperimentTracker::in_memory();
        assert!(matches!(tracker.end_run_success(), Err(IrisError::TrackingError(_))));
        // logged, not raised
        tracker.abandon_run();
    }

    #[test]
    fn test_abandon_run_marks_failed() {
        let tracker = ExperimentTracker::in_memory();
        tracker.set_experiment("abandon");
        let run_id = tracker.start_run("doomed");
        tracker.abandon_run();

        assert!(tracker.active_run().is_none());
        let exp = tracker.get_experiment_by_name("abandon").unwrap();
        assert_eq!(exp.get_run(&run_id).unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn test_local_storage_persists_runs() {
        let dir = tempfile::tempdir().unwrap();
        {
            let tracker = ExperimentTracker::with_dir(dir.path()).unwrap();
            tracker.set_experiment("persisted");
            tracker.start_run("first");
            tracker.log_metric("accuracy", 0.9, None);
            tracker.end_run_success().unwrap();
        }

        let reopened = ExperimentTracker::with_dir(dir.path()).unwrap();
        let exp = reopened.get_experiment_by_name("persisted").unwrap();
        assert_eq!(exp.runs.len(), 1);
        assert_eq!(exp.runs[0].run_name, "first");
    }

    #[test]
    fn test_log_artifact_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("model.pkl");
        std::fs::write(&source, b"{}").unwrap();

        let tracker = ExperimentTracker::with_dir(dir.path().join("mlruns")).unwrap();
        tracker.start_run("with_artifact");
        tracker.log_artifact(&source).unwrap();

        let run = tracker.active_run().unwrap();
        let stored = PathBuf::from(&run.artifacts[0]);
        assert!(stored.exists());
        assert_ne!(stored, source);
        tracker.end_run_success().unwrap();
    }
}
