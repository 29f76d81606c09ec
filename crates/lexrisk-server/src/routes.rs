use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use lexrisk_core::{config::Config, pipeline::Pipeline, DocumentAnalysis, ProcessError};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

pub const API_VERSION: &str = "1.0.0";

const UPLOAD_FIELD: &str = "file";

pub struct AppState {
    pub pipeline: Pipeline,
    pub config: Config,
}

// ── Error response ────────────────────────────────────────────────────────

/// Error body in the `{"detail": "..."}` shape clients expect.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    /// Maps a document failure to 400 (bad input) or 500 (everything else).
    /// The error chain is only exposed on 500s when `debug` is set.
    fn from_process(e: ProcessError, debug: bool) -> Self {
        if e.is_client_error() {
            warn!("rejected document: {e}");
            return Self::bad_request(e.to_string());
        }
        internal(e, debug)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        warn!("malformed upload: {e}");
        Self {
            status: e.status(),
            detail: e.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub(crate) fn internal(e: impl std::fmt::Display, debug: bool) -> ApiError {
    error!("internal error: {e:#}");
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: if debug {
            format!("{e:#}")
        } else {
            "Error processing document".to_string()
        },
    }
}

// ── Router ────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    let prefix = state.config.api_prefix.trim_end_matches('/').to_string();
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route(&format!("{prefix}/health"), get(health))
        .route(&format!("{prefix}/analyze"), post(analyze_document))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": API_VERSION }))
}

pub(crate) async fn analyze_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<DocumentAnalysis>, ApiError> {
    let debug = state.config.debug;
    let (filename, bytes) = read_upload(&mut multipart).await?;
    info!(filename = %filename, bytes = bytes.len(), "document upload received");

    // Reject unknown types before touching the disk.
    let extractors = &state.pipeline.extractors;
    let suffix = match Path::new(&filename).extension().and_then(|e| e.to_str()) {
        Some(ext) if extractors.supports(Path::new(&filename)) => format!(".{ext}"),
        _ => {
            let supported: Vec<String> = extractors.suffixes().iter().map(|s| format!(".{s}")).collect();
            return Err(ApiError::from_process(
                ProcessError::UnsupportedFormat(format!(
                    "{filename} (supported: {})",
                    supported.join(", ")
                )),
                debug,
            ));
        }
    };

    // Removed when `upload` drops at the end of the request.
    let upload = tempfile::Builder::new()
        .prefix("lexrisk-upload-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| internal(e, debug))?;
    tokio::fs::write(upload.path(), &bytes)
        .await
        .map_err(|e| internal(e, debug))?;

    let analysis = state
        .pipeline
        .process(upload.path())
        .await
        .map_err(|e| ApiError::from_process(e, debug))?;

    info!(
        filename = %filename,
        clauses = analysis.clauses.len(),
        overall_risk = analysis.overall_risk,
        "document analyzed"
    );
    Ok(Json(analysis))
}

/// Pulls the `file` field out of the form. Other fields are ignored.
async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("No file provided"))?;
        let bytes = field.bytes().await?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(ApiError::bad_request("No file provided"))
}
