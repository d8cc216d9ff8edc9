//! Prediction service
//!
//! Loads one model artifact, chosen by version tag, before binding and
//! answers `POST /predict` with the predicted class. Handlers share the
//! loaded model read-only.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use handlers::{PredictRequest, PredictResponse, ACCURACY_HINT};
pub use state::{AppState, LoadedModel, Prediction};

pub(crate) use api::{cors_layer, handle_404, handle_405};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::training::DEFAULT_ARTIFACTS_DIR;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Selects `model_{version}.pkl`
    pub model_version: String,
    pub artifacts_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl ServerConfig {
    /// Build from `API_HOST`, `API_PORT`, `MODEL_VERSION` and `ARTIFACTS_DIR`
    /// as resolved by `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("API_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            model_version: lookup("MODEL_VERSION").unwrap_or_else(|| "v1".to_string()),
            artifacts_dir: lookup("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR)),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = version.into();
        self
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    pub fn model_path(&self) -> PathBuf {
        self.artifacts_dir
            .join(format!("model_{}.pkl", self.model_version))
    }
}

/// Resolves once ctrl+c is received
pub(crate) async fn shutdown_signal(started_at: chrono::DateTime<chrono::Utc>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl+c");
        std::future::pending::<()>().await;
    }
    let stop_time = chrono::Utc::now();
    info!(
        stopped_at = %stop_time.to_rfc3339(),
        uptime_secs = stop_time.signed_duration_since(started_at).num_seconds(),
        "Shutdown signal received, stopping gracefully"
    );
}

/// Start the prediction service.
///
/// The model is loaded before the listener binds, so a missing artifact
/// stops startup.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let model_path = config.model_path();
    info!(
        version = %config.model_version,
        path = %model_path.display(),
        "Loading model"
    );

    let state = Arc::new(AppState::load(config.clone())?);
    let started_at = state.started_at;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        address = %addr,
        model_version = %config.model_version,
        pid = std::process::id(),
        "Iris API listening (press ctrl+c to stop)"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(started_at))
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::from_lookup(|_| None);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.model_path(), PathBuf::from("artifacts/model_v1.pkl"));

        let config = ServerConfig::from_lookup(|key| (key == "MODEL_VERSION").then(|| "v2".to_string()));
        assert_eq!(config.model_path(), PathBuf::from("artifacts/model_v2.pkl"));
    }

    #[test]
    fn test_model_path_from_version() {
        let config = ServerConfig::default()
            .with_artifacts_dir("artifacts")
            .with_model_version("v2");
        assert_eq!(config.model_path(), PathBuf::from("artifacts/model_v2.pkl"));
    }

    #[tokio::test]
    async fn test_missing_model_fails_before_bind() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default()
            .with_host("127.0.0.1")
            .with_port(0)
            .with_artifacts_dir(dir.path())
            .with_model_version("v9");
        assert!(run_server(config).await.is_err());
    }
}
