// ============================================================
// Layer 1 — HTTP Server
// ============================================================
// Serves the prediction API and the static web front-end.
// Uploads above `max_body_size` are refused with 413.

pub mod config;
mod handlers;
mod routes;

use std::sync::Arc;

use anyhow::Result;
use axum::{extract::DefaultBodyLimit, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domain::traits::ScanClassifier;

pub use config::ServerConfig;
pub use handlers::AppState;
pub use routes::{api_routes, static_routes};

/// Assemble the full application router
pub fn build_router(classifier: Arc<dyn ScanClassifier>, config: &ServerConfig) -> Router {
    let state = Arc::new(AppState::new(classifier));

    let mut app = Router::new()
        .merge(api_routes())
        .merge(static_routes(config))
        .layer(DefaultBodyLimit::max(config.max_body_size));

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start the HTTP inference server
pub async fn start(classifier: Arc<dyn ScanClassifier>, config: ServerConfig) -> Result<()> {
    let app = build_router(classifier, &config);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /health  - Health check");
    tracing::info!("  POST /predict - Classify an uploaded scan (multipart field 'file')");
    tracing::info!("  GET  /        - Web front-end ({})", config.index_file);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::UndecodableScan;
    use crate::domain::prediction::{Prediction, ScanUpload};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    const BOUNDARY: &str = "alzscanboundary";

    /// Answers "no_demented" for anything except the bytes `garbage`.
    struct StubClassifier;

    impl ScanClassifier for StubClassifier {
        fn classify(&self, upload: &ScanUpload) -> anyhow::Result<Prediction> {
            if upload.bytes == b"garbage" {
                return Err(UndecodableScan("not an image".into()).into());
            }
            if upload.bytes == b"explode" {
                anyhow::bail!("model exploded");
            }
            let names: Vec<String> = ["mild_demented", "moderate_demented", "no_demented", "very_mild_demented"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            Prediction::from_probabilities(&names, &[0.1, 0.1, 0.7, 0.1])
        }
    }

    fn app() -> Router {
        build_router(Arc::new(StubClassifier), &ServerConfig::default())
    }

    fn multipart_request(field: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"scan.png\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let resp = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_predict_returns_prediction() {
        let resp = app().oneshot(multipart_request("file", b"pixels")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = json_body(resp).await;
        assert_eq!(json["label"], "no_demented");
        assert_eq!(json["label_ru"], "No Demented (Нет признаков деменции)");
        assert_eq!(json["probs"].as_object().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_file_field_is_422() {
        let resp = app().oneshot(multipart_request("image", b"pixels")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let json = json_body(resp).await;
        assert_eq!(json["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_400() {
        let resp = app().oneshot(multipart_request("file", b"garbage")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let json = json_body(resp).await;
        assert_eq!(json["error"]["type"], "invalid_image_error");
    }

    #[tokio::test]
    async fn test_classifier_failure_is_500() {
        let resp = app().oneshot(multipart_request("file", b"explode")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_upload_over_body_limit_is_413() {
        let config = ServerConfig {
            max_body_size: 1024,
            ..ServerConfig::default()
        };
        let resp = build_router(Arc::new(StubClassifier), &config)
            .oneshot(multipart_request("file", &vec![7u8; 4096]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let json = json_body(resp).await;
        assert_eq!(json["error"]["type"], "payload_too_large_error");
    }

    #[tokio::test]
    async fn test_default_limit_is_20_mib() {
        let over = app()
            .oneshot(multipart_request("file", &vec![7u8; 20 * 1024 * 1024 + 1024]))
            .await
            .unwrap();
        assert_eq!(over.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let under = app()
            .oneshot(multipart_request("file", &vec![7u8; 1024 * 1024]))
            .await
            .unwrap();
        assert_eq!(under.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_multipart_request_gets_json_error() {
        let req = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"file":"x"}"#))
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let json = json_body(resp).await;
        assert_eq!(json["error"]["type"], "invalid_request_error");
        assert!(!json["error"]["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_page_is_served() {
        let tmp   = tempfile::tempdir().unwrap();
        let index = tmp.path().join("index.html");
        std::fs::write(&index, "<h1>scan</h1>").unwrap();

        let config = ServerConfig {
            index_file: index.display().to_string(),
            ..ServerConfig::default()
        };
        let resp = build_router(Arc::new(StubClassifier), &config)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<h1>scan</h1>");
    }
}
