//! Interactive browser demo
//!
//! Serves a page with one slider per measurement and three example flowers,
//! backed by a single model loaded at startup.

mod page;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::dataset::{FEATURE_NAMES, N_FEATURES};
use crate::server::{cors_layer, handle_404, handle_405, shutdown_signal, LoadedModel, ServerError};
use crate::training::DEFAULT_ARTIFACTS_DIR;

/// One input slider
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SliderSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub step: f64,
}

pub const SLIDERS: [SliderSpec; N_FEATURES] = [
    SliderSpec {
        key: "sepal_length",
        label: FEATURE_NAMES[0],
        min: 4.0,
        max: 8.0,
        default: 5.1,
        step: 0.1,
    },
    SliderSpec {
        key: "sepal_width",
        label: FEATURE_NAMES[1],
        min: 2.0,
        max: 4.5,
        default: 3.5,
        step: 0.1,
    },
    SliderSpec {
        key: "petal_length",
        label: FEATURE_NAMES[2],
        min: 0.1,
        max: 7.0,
        default: 1.4,
        step: 0.1,
    },
    SliderSpec {
        key: "petal_width",
        label: FEATURE_NAMES[3],
        min: 0.1,
        max: 2.5,
        default: 0.2,
        step: 0.1,
    },
];

/// A named example input
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Example {
    pub name: &'static str,
    pub features: [f64; N_FEATURES],
}

pub const EXAMPLES: [Example; 3] = [
    Example {
        name: "setosa",
        features: [5.1, 3.5, 1.4, 0.2],
    },
    Example {
        name: "versicolor",
        features: [6.4, 3.2, 4.5, 1.5],
    },
    Example {
        name: "virginica",
        features: [7.7, 3.8, 6.7, 2.2],
    },
];

/// Demo configuration
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl DemoConfig {
    /// Build from `DEMO_HOST`, `DEMO_PORT` and `DEMO_MODEL_PATH` as resolved
    /// by `lookup`. Unset or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup("DEMO_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("DEMO_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(7860),
            model_path: lookup("DEMO_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR).join("model.pkl")),
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

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DemoInput {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl DemoInput {
    pub fn features(&self) -> [f64; N_FEATURES] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DemoOutput {
    pub output: String,
    pub class_id: usize,
}

/// Text shown under the sliders
pub fn format_prediction(name: &str) -> String {
    format!("Prediction: **{}** 🌸", name)
}

async fn serve_index() -> Html<String> {
    Html(page::render())
}

async fn examples() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "sliders": SLIDERS,
        "examples": EXAMPLES,
    }))
}

async fn predict(
    State(model): State<Arc<LoadedModel>>,
    payload: Result<Json<DemoInput>, JsonRejection>,
) -> Result<Json<DemoOutput>, ServerError> {
    let Json(input) = payload?;
    let prediction = model.predict(&input.features())?;
    debug!(input = ?input, class_id = prediction.class_id, "Demo prediction");

    Ok(Json(DemoOutput {
        output: format_prediction(prediction.name),
        class_id: prediction.class_id,
    }))
}

/// Router for the demo page and its JSON endpoints
pub fn create_demo_router(model: Arc<LoadedModel>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/examples", get(examples))
        .route("/api/predict", post(predict))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(model)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Load the model and serve the demo until ctrl+c
pub async fn run_demo(config: DemoConfig) -> anyhow::Result<()> {
    let model = Arc::new(LoadedModel::load("demo", &config.model_path)?);
    let app = create_demo_router(model);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(url = %format!("http://{}", addr), "Iris demo running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(chrono::Utc::now()))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slider_defaults_within_range() {
        for s in &SLIDERS {
            assert!(s.min <= s.default && s.default <= s.max, "{}", s.key);
        }
        assert_eq!(SLIDERS[0].default, EXAMPLES[0].features[0]);
    }

    #[test]
    fn test_format_prediction() {
        assert_eq!(format_prediction("virginica"), "Prediction: **virginica** 🌸");
    }

    #[test]
    fn test_config_defaults() {
        let config = DemoConfig::from_lookup(|_| None);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7860);
        assert_eq!(config.model_path, PathBuf::from("artifacts/model.pkl"));
    }

    #[test]
    fn test_config_from_env_values() {
        let config = DemoConfig::from_lookup(|key| match key {
            "DEMO_PORT" => Some("9000".to_string()),
            "DEMO_MODEL_PATH" => Some("/models/v2.pkl".to_string()),
            _ => None,
        });
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.model_path, PathBuf::from("/models/v2.pkl"));

        // unparsable port falls back
        let config = DemoConfig::from_lookup(|key| (key == "DEMO_PORT").then(|| "http".to_string()));
        assert_eq!(config.port, 7860);
    }
}
