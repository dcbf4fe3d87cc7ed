use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::{ApiError, AppState};
use crate::core::errors::RequestError;
use crate::core::types::{ProcessingOptions, TaskSummary, TaskView, UploadedFile};

/// Multipart field carrying image files
const FILES_FIELD: &str = "files";

#[derive(Serialize)]
pub struct UploadResponse {
    pub task_id: String,
    pub total_files: usize,
}

#[derive(Serialize)]
struct EngineStatus {
    name: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

pub async fn root() -> &'static str {
    "OCR Workflow - multi-engine text extraction service"
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.metrics.record_endpoint_request("/health");
    state.sweep_expired();

    let status = if state.registry.has_text_backend() {
        "ready"
    } else {
        "limited"
    };

    Json(serde_json::json!({
        "status": status,
        "engines_ready": state.registry.is_ready(),
        "active_tasks": state.store.active_count(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Engine availability plus task counts
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.metrics.record_endpoint_request("/status");
    state.sweep_expired();

    let engines: Vec<EngineStatus> = state
        .registry
        .handles()
        .iter()
        .map(|h| EngineStatus {
            name: h.name.clone(),
            status: if h.available { "available" } else { "unavailable" },
            detail: h.detail.clone(),
        })
        .collect();
    let available: Vec<String> = state
        .registry
        .list_available()
        .into_iter()
        .map(|h| h.name)
        .collect();

    Json(serde_json::json!({
        "engines": engines,
        "available_engines": available,
        "engines_ready": state.registry.is_ready(),
        "active_tasks": state.store.active_count(),
        "total_tasks": state.store.len(),
        "max_active_tasks": state.store.max_active(),
    }))
}

/// Accept a batch of images and start a background task.
///
/// # Request Format:
/// - multipart/form-data
/// - Field "files": one or more image files
/// - Field "mode" (optional): `normal` or `high_accuracy`
/// - Field "languages" (optional, repeatable): 2-letter codes, comma separated allowed
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    state.metrics.record_endpoint_request("/upload");
    state.sweep_expired();

    let request_id = uuid::Uuid::new_v4().to_string();
    let max_bytes = state.config.max_upload_bytes();

    let mut received = 0usize;
    let mut files = Vec::new();
    let mut mode: Option<String> = None;
    let mut languages: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            FILES_FIELD | "files[]" => {
                received += 1;
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, max_bytes))?;

                if !state.config.is_allowed_filename(&filename) {
                    warn!(request_id = %request_id, file = %filename, "Dropping file with unsupported extension");
                    continue;
                }
                if data.len() > max_bytes {
                    warn!(request_id = %request_id, file = %filename, size = data.len(), "Dropping oversized file");
                    continue;
                }

                files.push(UploadedFile {
                    filename,
                    bytes: data.to_vec(),
                });
            }
            "mode" => {
                mode = Some(field.text().await.map_err(|e| multipart_error(e, max_bytes))?);
            }
            "languages" | "languages[]" => {
                languages.push(field.text().await.map_err(|e| multipart_error(e, max_bytes))?);
            }
            _ => {}
        }
    }

    if received == 0 {
        return Err(RequestError::NoFiles.into());
    }
    if files.is_empty() {
        return Err(RequestError::NoValidFiles.into());
    }

    let options =
        ProcessingOptions::parse(mode.as_deref(), &languages, state.config.max_languages())?;

    let task = match state.store.create(files.len()) {
        Ok(task) => task,
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "Submission rejected");
            state.metrics.record_task_rejected();
            return Err(e.into());
        }
    };
    state.metrics.record_task_submitted();

    info!(
        request_id = %request_id,
        task_id = %task.id,
        files = files.len(),
        dropped = received - files.len(),
        mode = %options.mode,
        "Task accepted"
    );

    // Fire and forget: the handle is dropped, the task keeps running
    state.runner.spawn(task.id.clone(), files, options);

    Ok(Json(UploadResponse {
        task_id: task.id,
        total_files: task.total_files,
    }))
}

/// Full task record plus the time estimate
pub async fn progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    state.metrics.record_endpoint_request("/progress");
    state.sweep_expired();

    let task = state.store.get(&task_id)?;
    Ok(Json(TaskView::at(task, Utc::now())))
}

/// Plain-text report as a file attachment
pub async fn download(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.record_endpoint_request("/download");

    let task = state.store.get(&task_id)?;
    let report = state.exporter.render(&task)?;
    let filename = state.exporter.attachment_filename(&task.id, Utc::now());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        report,
    ))
}

pub async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskSummary>> {
    state.metrics.record_endpoint_request("/tasks");
    state.sweep_expired();
    Json(state.store.list())
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
pub async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

/// Unknown paths get the same JSON error body as every other failure
pub async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}

fn multipart_error(e: MultipartError, max_bytes: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RequestError::PayloadTooLarge { max_bytes }.into()
    } else {
        RequestError::Malformed(e.body_text()).into()
    }
}
