use std::path::Path;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use docqa_index::document::DocumentError;
use docqa_index::{RagError, SourceChunk};

use crate::error::ApiError;
use crate::server::AppState;

const PDF_CONTENT_TYPE: &str = "application/pdf";
const NO_INDEX_DETAIL: &str = "No document index found. Please upload a PDF first.";

#[derive(serde::Serialize)]
pub(crate) struct MessageResponse {
    message: String,
}

#[derive(serde::Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct QueryRequest {
    query: String,
    #[serde(default)]
    include_sources: bool,
}

#[derive(serde::Serialize)]
pub(crate) struct QueryResponse {
    response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<Vec<SourceChunk>>,
}

struct Upload {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// What the upload endpoint accepts; selects error wording.
#[derive(Clone, Copy)]
enum UploadKind {
    Pdf,
    Any,
}

impl UploadKind {
    fn noun(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Any => "file",
        }
    }
}

pub(crate) async fn root_handler() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "docqa backend is running successfully!".into(),
    })
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub(crate) async fn upload_pdf_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let upload = read_upload(multipart, UploadKind::Pdf).await?;
    let mime = upload
        .content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .map(str::trim);
    if mime != Some(PDF_CONTENT_TYPE) {
        tracing::info!(filename = %upload.filename, content_type = ?upload.content_type, "rejected non-PDF upload");
        return Err(ApiError::bad_request(
            "Invalid file type. Please upload a PDF.",
        ));
    }
    ingest(&state, upload, UploadKind::Pdf).await
}

pub(crate) async fn upload_file_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let upload = read_upload(multipart, UploadKind::Any).await?;
    ingest(&state, upload, UploadKind::Any).await
}

pub(crate) async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError {
        status: rejection.status(),
        detail: rejection.body_text(),
    })?;
    tracing::info!(query = %request.query, "chat query");

    match state.query.ask(&request.query).await {
        Ok(answer) => Ok(Json(QueryResponse {
            response: answer.text,
            sources: request.include_sources.then_some(answer.sources),
        })),
        Err(RagError::NoIndexAvailable) => Err(ApiError::bad_request(NO_INDEX_DETAIL)),
        Err(RagError::EmptyQuery) => Err(ApiError::bad_request("Query must not be empty.")),
        Err(e) => {
            tracing::error!(error = %e, "query failed");
            Err(ApiError::internal(format!("Query failed: {e}")))
        }
    }
}

/// Uploads over the body limit are reported as 400, like any other unusable file.
async fn read_upload(mut multipart: Multipart, kind: UploadKind) -> Result<Upload, ApiError> {
    let multipart_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            tracing::info!("rejected upload over the body limit");
            ApiError::bad_request(format!(
                "Failed to process {}: {}",
                kind.noun(),
                e.body_text()
            ))
        } else {
            ApiError {
                status: e.status(),
                detail: e.body_text(),
            }
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .and_then(|n| Path::new(n).file_name())
            .map_or_else(|| "upload".to_owned(), |n| n.to_string_lossy().into_owned());
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
        return Ok(Upload {
            filename,
            content_type,
            bytes,
        });
    }
    Err(ApiError::bad_request("No file uploaded."))
}

async fn ingest(
    state: &AppState,
    upload: Upload,
    kind: UploadKind,
) -> Result<Json<MessageResponse>, ApiError> {
    let result = state
        .ingest
        .ingest_bytes(&upload.filename, upload.content_type.as_deref(), upload.bytes)
        .await;

    match result {
        Ok(report) => {
            tracing::info!(filename = %report.source, chunks = report.chunks, "indexed upload");
            Ok(Json(MessageResponse {
                message: format!("Successfully uploaded and indexed '{}'.", upload.filename),
            }))
        }
        Err(RagError::Document(DocumentError::EmptyDocument(_))) => Err(ApiError::bad_request(
            format!("Could not load any content from the {}.", kind.noun()),
        )),
        Err(e) if e.is_client_error() => Err(ApiError::bad_request(format!(
            "Failed to process {}: {e}",
            kind.noun()
        ))),
        Err(e) => {
            tracing::error!(filename = %upload.filename, error = %e, "upload processing failed");
            Err(ApiError::internal(format!(
                "Failed to process {}: {e}",
                kind.noun()
            )))
        }
    }
}
