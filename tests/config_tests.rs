// Configuration flowing from a file into a running router

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use crownscope_core::{AnalyzerConfig, ConfigError};
use crownscope_eye::ModelManager;
use crownscope_server::http::{create_router, ApiState};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;

fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_yaml_file_overrides_defaults() {
    let file = write_config(
        ".yaml",
        "server:\n  port: 8088\nmodel:\n  path: /srv/models/crowns.onnx\n  confidence_threshold: 0.4\ndefault_gsd: 0.3\n",
    );

    let config = AnalyzerConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.server.port, 8088);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.model.confidence_threshold, 0.4);
    assert_eq!(config.model.input_size, 1024);
    assert_eq!(config.default_gsd().unwrap().meters_per_pixel(), 0.3);
}

#[test]
fn test_toml_file_invalid_values() {
    let file = write_config(".toml", "default_gsd = -2.0\n");
    let config = AnalyzerConfig::from_file(file.path()).unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

    let file = write_config(".toml", "[model]\ninput_size = 1000\n");
    let config = AnalyzerConfig::from_file(file.path()).unwrap();
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn test_router_reports_configured_model_path() {
    let file = write_config(
        ".json",
        r#"{"model": {"path": "/srv/models/crowns.onnx"}, "server": {"max_upload_bytes": 4096}}"#,
    );
    let config = AnalyzerConfig::from_file(file.path()).unwrap();

    let models = Arc::new(ModelManager::new(config.model.clone()));
    assert!(models.load().is_err());

    let state = ApiState::new(models, config.default_gsd().unwrap(), config.server.max_upload_bytes);
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["model_path"], "/srv/models/crowns.onnx");
    assert!(json["error"].as_str().unwrap().contains("not found"));
}
