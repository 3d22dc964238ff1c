//! HTTP surface for document question answering.
//!
//! - `POST /uploadfile/` – Multipart upload (`file` part). Persists the bytes, schedules
//!   ingestion, and returns `{"task_id"}` immediately.
//! - `POST /check_task_status/` – Poll a task: `processing`, `completed`, `failed`, or `not_found`.
//! - `GET /summary/:task_id` – Summary of a completed document; 404 for unknown ids.
//! - `POST /ask` – Answer a question from the most relevant document. Downstream failures are
//!   reported inside `answer`, never as a non-200 status.
//! - `GET /health` – Liveness probe.
//! - `GET /metrics` – Ingestion and query counters.
//!
//! Protocol errors carry a `{"detail": string}` body.

use crate::retrieval::AnswerResponse;
use crate::service::DocumentApi;
use crate::tasks::TaskSnapshot;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Build the HTTP router, limiting request bodies to `max_upload_bytes`.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: DocumentApi + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/uploadfile/", post(upload_file::<S>))
        .route("/check_task_status/", post(check_task_status::<S>))
        .route("/summary/:task_id", get(get_summary::<S>))
        .route("/ask", post(ask::<S>))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(service)
}

/// Response body for `POST /uploadfile/`.
#[derive(Serialize)]
struct UploadResponse {
    task_id: String,
}

/// Accept a multipart upload and schedule its ingestion.
async fn upload_file<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::bad_request(format!("Invalid multipart body: {error}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|error| AppError::bad_request(format!("Failed to read upload: {error}")))?;

        tracing::info!(file = %filename, bytes = bytes.len(), "Upload received");
        let task_id = service
            .upload(bytes.to_vec(), filename)
            .await
            .map_err(|error| {
                tracing::error!(error = %error, "Upload failed");
                AppError::internal(format!("Error processing file: {error}"))
            })?;
        return Ok(Json(UploadResponse { task_id }));
    }

    Err(AppError::bad_request("No file provided"))
}

/// Request body for `POST /check_task_status/`.
#[derive(Deserialize)]
struct TaskStatusRequest {
    task_id: String,
}

async fn check_task_status<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<TaskStatusRequest>,
) -> Json<TaskSnapshot>
where
    S: DocumentApi,
{
    Json(service.task_status(&request.task_id))
}

/// Return the summary of a completed task.
async fn get_summary<S>(
    State(service): State<Arc<S>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: DocumentApi,
{
    match service.task_status(&task_id) {
        TaskSnapshot::Completed { file, summary } => {
            Ok(Json(json!({ "summary": summary, "file": file })))
        }
        TaskSnapshot::Processing { .. } => Ok(Json(json!({
            "error": "Document processing not completed: processing"
        }))),
        TaskSnapshot::Failed { .. } => Ok(Json(json!({
            "error": "Document processing not completed: failed"
        }))),
        TaskSnapshot::NotFound { .. } => Err(AppError::not_found("Task ID not found")),
    }
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
}

async fn ask<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QuestionRequest>,
) -> Json<AnswerResponse>
where
    S: DocumentApi,
{
    let started = Instant::now();
    let response = service.ask(&request.question).await;
    tracing::info!(
        question = %request.question,
        sources = response.sources.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Ask request completed"
    );
    Json(response)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot())
}

struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::IngestError;
    use crate::retrieval::{AnswerResponse, Source};
    use crate::service::DocumentApi;
    use crate::tasks::TaskSnapshot;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docqa-test-boundary";

    #[derive(Default)]
    struct StubService {
        uploads: Mutex<Vec<(String, Vec<u8>)>>,
        tasks: HashMap<String, TaskSnapshot>,
        fail_uploads: bool,
    }

    #[async_trait]
    impl DocumentApi for StubService {
        async fn upload(&self, bytes: Vec<u8>, filename: String) -> Result<String, IngestError> {
            if self.fail_uploads {
                return Err(IngestError::Io {
                    path: "uploads/x".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.uploads.lock().await.push((filename, bytes));
            Ok("task-123".into())
        }

        fn task_status(&self, task_id: &str) -> TaskSnapshot {
            self.tasks
                .get(task_id)
                .cloned()
                .unwrap_or(TaskSnapshot::NotFound {
                    error: "Invalid task ID".into(),
                })
        }

        async fn ask(&self, question: &str) -> AnswerResponse {
            AnswerResponse {
                answer: format!("echo: {question}"),
                sources: vec![Source {
                    source: "uploads/a.txt".into(),
                    text: "A sentence.".into(),
                    score: 0.75,
                }],
            }
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_ingested: 3,
                documents_failed: 1,
                chunks_indexed: 42,
                questions_answered: 7,
            }
        }
    }

    fn with_tasks(entries: &[(&str, TaskSnapshot)]) -> StubService {
        StubService {
            tasks: entries
                .iter()
                .map(|(id, snapshot)| (id.to_string(), snapshot.clone()))
                .collect(),
            ..StubService::default()
        }
    }

    fn multipart_body(field: &str, filename: &str, content: &str) -> String {
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        )
    }

    async fn send(
        service: Arc<StubService>,
        method: Method,
        uri: &str,
        content_type: &str,
        body: String,
    ) -> (StatusCode, Value) {
        let response = create_router(service, 1024 * 1024)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", content_type)
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("router response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn upload_returns_task_id_and_forwards_file() {
        let service = Arc::new(StubService::default());
        let (status, json) = send(
            service.clone(),
            Method::POST,
            "/uploadfile/",
            &format!("multipart/form-data; boundary={BOUNDARY}"),
            multipart_body("file", "notes.txt", "Hello there."),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "task_id": "task-123" }));
        let uploads = service.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "notes.txt");
        assert_eq!(uploads[0].1, b"Hello there.");
    }

    #[tokio::test]
    async fn upload_without_file_part_is_rejected() {
        let (status, json) = send(
            Arc::new(StubService::default()),
            Method::POST,
            "/uploadfile/",
            &format!("multipart/form-data; boundary={BOUNDARY}"),
            multipart_body("attachment", "notes.txt", "Hello."),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "No file provided");
    }

    #[tokio::test]
    async fn upload_io_failure_is_a_server_error() {
        let service = Arc::new(StubService {
            fail_uploads: true,
            ..StubService::default()
        });
        let (status, json) = send(
            service,
            Method::POST,
            "/uploadfile/",
            &format!("multipart/form-data; boundary={BOUNDARY}"),
            multipart_body("file", "notes.txt", "Hello."),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            json["detail"]
                .as_str()
                .expect("detail")
                .starts_with("Error processing file:")
        );
    }

    #[tokio::test]
    async fn task_status_reports_each_state() {
        let service = Arc::new(with_tasks(&[
            (
                "done",
                TaskSnapshot::Completed {
                    file: "a.txt".into(),
                    summary: "Short.".into(),
                },
            ),
            (
                "broken",
                TaskSnapshot::Failed {
                    file: "b.txt".into(),
                    error: "no text".into(),
                },
            ),
        ]));

        let (_, done) = send(
            service.clone(),
            Method::POST,
            "/check_task_status/",
            "application/json",
            json!({ "task_id": "done" }).to_string(),
        )
        .await;
        assert_eq!(done["status"], "completed");
        assert_eq!(done["file"], "a.txt");

        let (_, broken) = send(
            service.clone(),
            Method::POST,
            "/check_task_status/",
            "application/json",
            json!({ "task_id": "broken" }).to_string(),
        )
        .await;
        assert_eq!(broken["status"], "failed");
        assert_eq!(broken["error"], "no text");

        let (status, missing) = send(
            service,
            Method::POST,
            "/check_task_status/",
            "application/json",
            json!({ "task_id": "nope" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            missing,
            json!({ "status": "not_found", "error": "Invalid task ID" })
        );
    }

    #[tokio::test]
    async fn summary_endpoint_distinguishes_states() {
        let service = Arc::new(with_tasks(&[
            (
                "done",
                TaskSnapshot::Completed {
                    file: "a.txt".into(),
                    summary: "Short.".into(),
                },
            ),
            (
                "busy",
                TaskSnapshot::Processing {
                    file: "b.txt".into(),
                },
            ),
        ]));

        let (status, done) = send(
            service.clone(),
            Method::GET,
            "/summary/done",
            "application/json",
            String::new(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done, json!({ "summary": "Short.", "file": "a.txt" }));

        let (status, busy) = send(
            service.clone(),
            Method::GET,
            "/summary/busy",
            "application/json",
            String::new(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            busy,
            json!({ "error": "Document processing not completed: processing" })
        );

        let (status, missing) = send(
            service,
            Method::GET,
            "/summary/ghost",
            "application/json",
            String::new(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing, json!({ "detail": "Task ID not found" }));
    }

    #[tokio::test]
    async fn ask_health_and_metrics_return_json() {
        let service = Arc::new(StubService::default());

        let (status, answer) = send(
            service.clone(),
            Method::POST,
            "/ask",
            "application/json",
            json!({ "question": "What?" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(answer["answer"], "echo: What?");
        assert_eq!(answer["sources"][0]["source"], "uploads/a.txt");
        assert_eq!(answer["sources"][0]["score"], 0.75);

        let (_, health) = send(
            service.clone(),
            Method::GET,
            "/health",
            "application/json",
            String::new(),
        )
        .await;
        assert_eq!(health, json!({ "status": "healthy" }));

        let (_, metrics) = send(
            service,
            Method::GET,
            "/metrics",
            "application/json",
            String::new(),
        )
        .await;
        assert_eq!(
            metrics,
            json!({
                "documents_ingested": 3,
                "documents_failed": 1,
                "chunks_indexed": 42,
                "questions_answered": 7
            })
        );
    }
}
