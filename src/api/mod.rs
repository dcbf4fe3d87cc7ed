// HTTP surface: submission, progress polling, report download, monitoring

pub mod error;
pub mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::Config;
use crate::orchestration::{ExtractionOrchestrator, TaskRunner, TaskStore};
use crate::services::{EngineRegistry, Preprocessor, ResultExporter};
use crate::utils::Metrics;

pub use error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<EngineRegistry>,
    pub store: TaskStore,
    pub runner: Arc<TaskRunner>,
    pub exporter: ResultExporter,
    pub metrics: Metrics,
}

impl AppState {
    /// Wire the store, runner and exporter around an initialized registry
    pub fn new(config: Arc<Config>, registry: Arc<EngineRegistry>, metrics: Metrics) -> Self {
        let store = TaskStore::new(config.max_active_tasks());
        let orchestrator = Arc::new(ExtractionOrchestrator::new(
            Arc::clone(&registry),
            config.min_confidence(),
            metrics.clone(),
        ));
        let runner = Arc::new(TaskRunner::new(
            store.clone(),
            Preprocessor::new(config.max_image_dimension()),
            orchestrator,
            metrics.clone(),
        ));

        Self {
            config,
            registry,
            store,
            runner,
            exporter: ResultExporter::new(),
            metrics,
        }
    }

    /// Drop tasks past the retention window
    pub fn sweep_expired(&self) {
        let removed = self.store.sweep(self.config.retention());
        if removed > 0 {
            self.metrics.record_tasks_expired(removed);
        }
    }
}

/// Build the application router with CORS, tracing and the body limit
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/upload", post(handlers::upload))
        .route("/progress/{task_id}", get(handlers::progress))
        .route("/download/{task_id}", get(handlers::download))
        .route("/tasks", get(handlers::list_tasks))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/stats", get(handlers::stats_endpoint))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::EngineResult;
    use crate::core::types::{LanguageCode, NormalizedImage, RecognizedFragment, TaskStatus};
    use crate::services::ocr::RecognitionBackend;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;
    use std::time::Duration;
    use tower::ServiceExt;

    const BOUNDARY: &str = "ocr-test-boundary";

    struct Hello;

    impl RecognitionBackend for Hello {
        fn name(&self) -> &str {
            "hello"
        }

        fn recognize(
            &self,
            _image: &NormalizedImage,
            _languages: &[LanguageCode],
        ) -> EngineResult<Vec<RecognizedFragment>> {
            Ok(vec![RecognizedFragment::new("HELLO", 0.95)])
        }
    }

    fn state_with(pairs: &[(&str, &str)]) -> AppState {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::from_lookup(|key| {
            pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .unwrap();
        let registry = Arc::new(EngineRegistry::with_backends(vec![
            Arc::new(Hello) as Arc<dyn RecognitionBackend>
        ]));
        AppState::new(Arc::new(config), registry, Metrics::new())
    }

    fn png() -> Vec<u8> {
        let img = GrayImage::from_fn(40, 20, |x, _| if x % 10 < 5 { Luma([0]) } else { Luma([255]) });
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    enum Part<'a> {
        File(&'a str, Vec<u8>),
        Text(&'a str, &'a str),
    }

    fn multipart_body(parts: &[Part]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::File(filename, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                            filename
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(parts: &[Part]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, body)
    }

    async fn send_json(state: &AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, body) = send(state, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn wait_for_terminal(state: &AppState, task_id: &str) -> serde_json::Value {
        for _ in 0..500 {
            let (status, body) = send_json(state, get(&format!("/progress/{}", task_id))).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] == "completed" || body["status"] == "error" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never finished", task_id);
    }

    #[tokio::test]
    async fn test_corrupt_middle_file_end_to_end() {
        let state = state_with(&[]);
        let (status, body) = send_json(
            &state,
            upload_request(&[
                Part::File("first.png", png()),
                Part::File("second.png", b"corrupt bytes".to_vec()),
                Part::File("third.png", png()),
                Part::Text("mode", "normal"),
                Part::Text("languages", "en,ja"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_files"], 3);
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let task = wait_for_terminal(&state, &task_id).await;
        assert_eq!(task["status"], "completed");
        assert_eq!(task["progress"], 100);
        assert_eq!(task["files_processed"], 3);
        let results = task["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["text"], "HELLO");
        assert!(results[1]["text"]
            .as_str()
            .unwrap()
            .starts_with("Error processing file: "));
        assert_eq!(results[2]["text"], "HELLO");

        // Repeated status queries return the same results
        let again = wait_for_terminal(&state, &task_id).await;
        assert_eq!(again["results"], task["results"]);

        let response = router(state.clone())
            .oneshot(get(&format!("/download/{}", task_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(&format!("ocr_results_{}_", task_id)));
        let report = response.into_body().collect().await.unwrap().to_bytes();
        let report = String::from_utf8(report.to_vec()).unwrap();
        assert!(report.starts_with("OCR Results - Generated on "));
        assert!(report.contains("File 1: first.png"));
        assert!(report.contains("File 3: third.png"));
    }

    #[tokio::test]
    async fn test_busy_server_rejects_without_creating_task() {
        let state = state_with(&[("MAX_ACTIVE_TASKS", "1")]);
        state.store.create(1).unwrap();

        let response = router(state.clone())
            .oneshot(upload_request(&[Part::File("a.png", png())]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(state.store.len(), 1);
        assert_eq!(state.metrics.snapshot().tasks_rejected, 1);
    }

    #[tokio::test]
    async fn test_invalid_files_are_dropped() {
        let state = state_with(&[]);

        let (status, body) =
            send_json(&state, upload_request(&[Part::File("notes.txt", b"hi".to_vec())])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No valid image files found");

        let (status, body) = send_json(&state, upload_request(&[Part::Text("mode", "normal")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No files uploaded");

        let (status, body) = send_json(
            &state,
            upload_request(&[
                Part::File("notes.txt", b"hi".to_vec()),
                Part::File("scan.PNG", png()),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_files"], 1);
        assert_eq!(state.store.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_options_rejected() {
        let state = state_with(&[]);
        let (status, _) = send_json(
            &state,
            upload_request(&[Part::File("a.png", png()), Part::Text("mode", "turbo")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send_json(
            &state,
            upload_request(&[Part::File("a.png", png()), Part::Text("languages", "english")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let state = state_with(&[("MAX_UPLOAD_BYTES", "1024")]);
        let (status, _) = send(
            &state,
            upload_request(&[Part::File("big.png", vec![0u8; 8192])]),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let state = state_with(&[]);
        let (status, body) = send_json(&state, get("/progress/does-not-exist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("does-not-exist"));

        let (status, _) = send_json(&state, get("/download/does-not-exist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route_returns_json_error() {
        let state = state_with(&[]);
        let (status, body) = send_json(&state, get("/no/such/endpoint")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Endpoint not found");
    }

    #[tokio::test]
    async fn test_download_requires_completion() {
        let state = state_with(&[]);
        let task = state.store.create(1).unwrap();
        state.store.mutate(&task.id, |t| t.mark_processing()).unwrap();

        let (status, body) = send_json(&state, get(&format!("/download/{}", task.id))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("processing"));
    }

    #[tokio::test]
    async fn test_expired_task_is_swept_on_query() {
        let state = state_with(&[("TASK_RETENTION_SECONDS", "60")]);
        let task = state.store.create(1).unwrap();
        state
            .store
            .mutate(&task.id, |t| {
                t.mark_completed();
                t.created_at = Utc::now() - chrono::Duration::seconds(120);
            })
            .unwrap();

        let (status, _) = send_json(&state, get(&format!("/progress/{}", task.id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(state.metrics.snapshot().tasks_expired, 1);
    }

    #[tokio::test]
    async fn test_status_and_health() {
        let state = state_with(&[]);
        let task = state.store.create(2).unwrap();
        assert_eq!(state.store.get(&task.id).unwrap().status, TaskStatus::Starting);

        let (status, body) = send_json(&state, get("/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["engines"][0]["name"], "hello");
        assert_eq!(body["engines"][0]["status"], "available");
        assert_eq!(body["active_tasks"], 1);

        let (status, body) = send_json(&state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["engines_ready"], true);

        let (status, body) = send_json(&state, get("/tasks")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], task.id.as_str());
    }

    #[tokio::test]
    async fn test_metrics_endpoints() {
        let state = state_with(&[]);
        send_json(&state, get("/status")).await;

        let (status, body) = send(&state, get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("ocr_tasks_submitted_total 0"));

        let (status, body) = send_json(&state, get("/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoints"]["/status"], 1);
    }
}
