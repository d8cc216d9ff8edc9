//! Experiment tracking
//!
//! Records runs with their parameters, metrics and artifacts, in the spirit
//! of MLflow. Runs can be nested so a search can group its trials under one
//! parent run. Persistence goes through a [`StorageBackend`] so callers can
//! inject an in-memory store.

mod storage;
mod tracker;

pub use storage::{LocalStorage, MemoryStorage, StorageBackend};
pub use tracker::{
    Experiment, ExperimentConfig, ExperimentTracker, Metric, Run, RunStatus,
};
