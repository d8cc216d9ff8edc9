//! Integration test: interactive demo endpoints

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use iris_mlops::dataset::Dataset;
use iris_mlops::demo::{create_demo_router, DemoOutput, EXAMPLES};
use iris_mlops::server::LoadedModel;
use iris_mlops::training::{fit_classifier, Hyperparameters, ModelArtifact};
use std::sync::Arc;
use tower::ServiceExt;

fn demo_app() -> axum::Router {
    let ds = Dataset::iris();
    let hp = Hyperparameters::logistic(1.0).with_max_iter(1000);
    let clf = fit_classifier(&hp, &ds.features, &ds.targets, 42).unwrap();
    let model = LoadedModel::from_artifact("demo", ModelArtifact::new(hp, clf, ds.len()));
    create_demo_router(Arc::new(model))
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_index_serves_sliders() {
    let response = demo_app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("sepal_length"));
    assert!(html.contains("petal_width"));
}

#[tokio::test]
async fn test_examples_endpoint() {
    let response = demo_app()
        .oneshot(Request::builder().uri("/api/examples").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["examples"].as_array().unwrap().len(), 3);
    assert_eq!(json["sliders"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_examples_predict_their_class() {
    let app = demo_app();
    for (expected_id, example) in EXAMPLES.iter().enumerate() {
        let [sl, sw, pl, pw] = example.features;
        let body = serde_json::json!({
            "sepal_length": sl,
            "sepal_width": sw,
            "petal_length": pl,
            "petal_width": pw,
        });
        let request = Request::builder()
            .method("POST")
            .uri("/api/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let out: DemoOutput = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(out.class_id, expected_id);
        assert_eq!(out.output, format!("Prediction: **{}** 🌸", example.name));
    }
}

#[tokio::test]
async fn test_missing_field_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"sepal_length":5.1}"#))
        .unwrap();
    let response = demo_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
