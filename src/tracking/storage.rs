//! Storage backends for experiment tracking

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::tracker::Experiment;
use crate::error::{IrisError, Result};

/// Storage backend trait
pub trait StorageBackend {
    /// Save experiments to storage
    fn save_experiments(&self, experiments: &[Experiment]) -> Result<()>;

    /// Load experiments from storage
    fn load_experiments(&self) -> Result<Vec<Experiment>>;

    /// Keep a copy of an artifact file for a run, returning where it lives
    fn store_artifact(&self, experiment_id: &str, run_id: &str, source: &Path) -> Result<PathBuf>;
}

/// Local file system storage backend
///
/// Layout: `experiments.json` at the root, artifact copies under
/// `<experiment_id>/<run_id>/artifacts/`.
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn experiments_file(&self) -> PathBuf {
        self.base_dir.join("experiments.json")
    }

    fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.base_dir.join(experiment_id)
    }
}

impl StorageBackend for LocalStorage {
    fn save_experiments(&self, experiments: &[Experiment]) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let json = serde_json::to_string_pretty(experiments)?;
        fs::write(self.experiments_file(), json)?;
        Ok(())
    }

    fn load_experiments(&self) -> Result<Vec<Experiment>> {
        let file_path = self.experiments_file();
        if !file_path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&file_path)?;
        serde_json::from_str(&contents).map_err(|e| {
            IrisError::TrackingError(format!(
                "corrupt tracking file {}: {}",
                file_path.display(),
                e
            ))
        })
    }

    fn store_artifact(&self, experiment_id: &str, run_id: &str, source: &Path) -> Result<PathBuf> {
        let file_name = source.file_name().ok_or_else(|| {
            IrisError::TrackingError(format!("artifact has no file name: {}", source.display()))
        })?;
        let dir = self.experiment_dir(experiment_id).join(run_id).join("artifacts");
        fs::create_dir_all(&dir)?;
        let target = dir.join(file_name);
        fs::copy(source, &target)?;
        Ok(target)
    }
}

/// In-memory storage, used by tests and ephemeral trackers
#[derive(Default)]
pub struct MemoryStorage {
    experiments: Mutex<Vec<Experiment>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn save_experiments(&self, experiments: &[Experiment]) -> Result<()> {
        *self.experiments.lock() = experiments.to_vec();
        Ok(())
    }

    fn load_experiments(&self) -> Result<Vec<Experiment>> {
        Ok(self.experiments.lock().clone())
    }

    fn store_artifact(&self, _experiment_id: &str, _run_id: &str, source: &Path) -> Result<PathBuf> {
        Ok(source.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        assert!(storage.load_experiments().unwrap().is_empty());

        let exp = Experiment::new("roundtrip");
        storage.save_experiments(&[exp.clone()]).unwrap();

        let loaded = storage.load_experiments().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "roundtrip");
        assert_eq!(loaded[0].experiment_id, exp.experiment_id);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("experiments.json"), "not json").unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        assert!(matches!(
            storage.load_experiments(),
            Err(IrisError::TrackingError(_))
        ));
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.save_experiments(&[Experiment::new("a")]).unwrap();
        assert_eq!(storage.load_experiments().unwrap().len(), 1);
    }
}
