// HTTP server with the analyzer routes

use crate::error::ApiError;
use crate::metrics::ServiceMetrics;
use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartRejection},
        DefaultBodyLimit, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use crownscope_core::{AnalysisResult, Gsd};
use crownscope_eye::{CrownAnalyzer, ModelManager};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const SERVICE_NAME: &str = "Tree Crown Analyzer";

// API state
#[derive(Clone)]
pub struct ApiState {
    pub analyzer: Arc<CrownAnalyzer>,
    pub models: Arc<ModelManager>,
    pub metrics: Arc<ServiceMetrics>,
    pub default_gsd: Gsd,
    pub max_upload_bytes: usize,
}

impl ApiState {
    pub fn new(models: Arc<ModelManager>, default_gsd: Gsd, max_upload_bytes: usize) -> Self {
        Self {
            analyzer: Arc::new(CrownAnalyzer::new(models.clone())),
            models,
            metrics: Arc::new(ServiceMetrics::new()),
            default_gsd,
            max_upload_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bind the HTTP listener. `host` may be an IP address or a hostname.
pub async fn bind_listener(host: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((host, port)).await
}

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/area", post(area_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "status": "online",
        "service": SERVICE_NAME,
        "model": state.models.model_path().display().to_string(),
        "endpoints": {
            "/area": "POST - Analyze tree crown images",
        },
    }))
}

async fn health_handler(State(state): State<ApiState>) -> Response {
    let model_path = state.models.model_path().display().to_string();

    if state.models.is_ready() {
        let body = HealthResponse {
            status: "healthy",
            model_loaded: true,
            model_path,
            error: None,
        };
        return (StatusCode::OK, Json(body)).into_response();
    }

    let error = state
        .models
        .load_error()
        .unwrap_or_else(|| "Segmentation model is not loaded".to_string());
    let body = HealthResponse {
        status: "unhealthy",
        model_loaded: false,
        model_path,
        error: Some(error),
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
}

/// Analyze an uploaded aerial image for tree crowns
async fn area_handler(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("area", %request_id);

    async move {
        state.metrics.record_request();
        let started = Instant::now();

        let outcome = analyze_upload(&state, multipart).await;
        match &outcome {
            Ok(result) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                state.metrics.record_analysis(result.total_trees);
                info!(
                    "Detected {} trees, total area {} m2 in {:.1} ms",
                    result.total_trees, result.total_area_m2, elapsed_ms
                );
            }
            Err(ApiError::InvalidInput(msg)) => {
                state.metrics.record_invalid();
                warn!("Rejected request: {}", msg);
            }
            Err(ApiError::PayloadTooLarge(limit)) => {
                state.metrics.record_invalid();
                warn!("Rejected upload over {} bytes", limit);
            }
            Err(_) => state.metrics.record_failure(),
        }
        outcome.map(Json)
    }
    .instrument(span)
    .await
}

async fn analyze_upload(
    state: &ApiState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<AnalysisResult, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        ApiError::InvalidInput(format!("Expected a multipart upload: {}", rejection.body_text()))
    })?;
    let upload = read_upload(multipart, state.max_upload_bytes).await?;
    let gsd = match upload.gsd.as_deref().map(str::trim) {
        None | Some("") => state.default_gsd,
        Some(raw) => Gsd::parse(raw).map_err(|e| ApiError::InvalidInput(e.to_string()))?,
    };
    debug!("Received {} byte image, gsd {}", upload.image.len(), gsd);

    if !state.models.is_ready() {
        return Err(ApiError::ModelUnavailable);
    }

    let analyzer = state.analyzer.clone();
    let image = upload.image;
    let result = tokio::task::spawn_blocking(move || analyzer.analyze(&image, gsd))
        .await
        .map_err(|e| ApiError::Internal(format!("Analysis task failed: {}", e)))??;
    Ok(result)
}

struct Upload {
    image: Bytes,
    gsd: Option<String>,
}

async fn read_upload(mut multipart: Multipart, limit: usize) -> Result<Upload, ApiError> {
    let mut image = None;
    let mut gsd = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(ApiError::PayloadTooLarge(limit));
            }
            Err(e) => {
                return Err(ApiError::InvalidInput(format!("Malformed multipart body: {}", e)));
            }
        };

        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let is_image = field
                    .content_type()
                    .map(|ct| ct.starts_with("image/"))
                    .unwrap_or(false);
                if !is_image {
                    return Err(ApiError::InvalidInput("File must be an image".to_string()));
                }
                let bytes = field.bytes().await.map_err(|e| {
                    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        ApiError::PayloadTooLarge(limit)
                    } else {
                        ApiError::InvalidInput(format!("Failed to read file: {}", e))
                    }
                })?;
                image = Some(bytes);
            }
            Some("gsd") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidInput(format!("Failed to read gsd: {}", e)))?;
                gsd = Some(text);
            }
            _ => debug!("Ignoring multipart field {:?}", name),
        }
    }

    let image = image.ok_or_else(|| ApiError::InvalidInput("No file provided".to_string()))?;
    Ok(Upload { image, gsd })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_listener_accepts_hostname() {
        let listener = bind_listener("localhost", 0).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_listener_accepts_ip() {
        let listener = bind_listener("127.0.0.1", 0).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
