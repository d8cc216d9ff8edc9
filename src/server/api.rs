//! API route definitions

use std::sync::Arc;

use axum::{
    http::Uri,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{error::ServerError, handlers, state::AppState};

pub(crate) async fn handle_404(uri: Uri) -> ServerError {
    ServerError::NotFound(uri.path().to_string())
}

pub(crate) async fn handle_405() -> ServerError {
    ServerError::MethodNotAllowed
}

/// Any origin, any method, any header
pub(crate) fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the prediction service router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/predict", post(handlers::predict))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}
