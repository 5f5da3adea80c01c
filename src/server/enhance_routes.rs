//! Upload-and-enhance endpoint.
//!
//! Credits are checked before the upload is read and charged only once a
//! result is ready to be streamed back.

use axum::{
    body::Body,
    extract::{
        multipart::{Field, MultipartError},
        DefaultBodyLimit, Multipart, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use crate::enhancement::{EnhancementOutcome, ProcessingMode, TempFileGuard, OUTPUT_EXTENSION};
use crate::server::metrics;
use crate::server::session::Session;
use crate::server::state::ServerState;
use crate::user::CreditCharge;

pub const AUDIO_FIELD: &str = "audio";
pub const SETTINGS_FIELD: &str = "settings";

pub const HEADER_PROCESSING_MODE: &str = "x-processing-mode";
pub const HEADER_CREDITS_REMAINING: &str = "x-credits-remaining";
pub const HEADER_JOB_ID: &str = "x-job-id";

pub const NO_CREDITS_ERROR: &str = "no credits left";
pub const PROCESSING_FAILED_ERROR: &str = "processing failed";

/// Room for the settings field and multipart framing on top of the audio limit.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;
const SNIFF_LEN: usize = 512;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn error_response(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            details: None,
        }),
    )
        .into_response()
}

#[derive(Debug, Error)]
enum UploadError {
    #[error("Upload exceeds {0} bytes")]
    TooLarge(u64),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Could not store upload: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    fn status(&self) -> StatusCode {
        match self {
            UploadError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Multipart(e) => e.status(),
            UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            debug!("Rejecting upload: {}", self);
        }
        error_response(status, &self.to_string())
    }
}

struct Upload {
    path: PathBuf,
    original_name: Option<String>,
    size: u64,
    guard: TempFileGuard,
}

#[derive(Default)]
struct EnhanceForm {
    upload: Option<Upload>,
    settings: Option<String>,
}

/// Streams one file field to `path`, refusing anything above `max_bytes`.
async fn persist_field(
    field: &mut Field<'_>,
    path: &Path,
    max_bytes: u64,
) -> Result<u64, UploadError> {
    let mut file = File::create(path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(UploadError::TooLarge(max_bytes));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(written)
}

async fn read_enhance_form(
    state: &ServerState,
    multipart: &mut Multipart,
) -> Result<EnhanceForm, UploadError> {
    let temp_files = state.pipeline.temp_files();
    let max_bytes = state.config.max_upload_bytes;
    let mut form = EnhanceForm::default();

    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            AUDIO_FIELD if form.upload.is_none() => {
                let original_name = field.file_name().map(|s| s.to_string());
                let path = temp_files.upload_path(original_name.as_deref());
                // Deletes a partial upload on any early return below.
                let guard = temp_files.track([path.clone()]);
                let size = persist_field(&mut field, &path, max_bytes).await?;
                form.upload = Some(Upload {
                    path,
                    original_name,
                    size,
                    guard,
                });
            }
            SETTINGS_FIELD => {
                form.settings = Some(field.text().await?);
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok(form)
}

/// `enhanced_<original stem>.<output extension>`, restricted to header-safe characters.
pub fn download_filename(original_name: Option<&str>, output_path: &Path) -> String {
    let stem: String = original_name
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .unwrap_or("audio")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    let stem = if stem.is_empty() { "audio".to_string() } else { stem };
    let extension = output_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(OUTPUT_EXTENSION);
    format!("enhanced_{}.{}", stem, extension)
}

async fn sniff_content_type(file: &mut File) -> std::io::Result<&'static str> {
    let mut head = [0u8; SNIFF_LEN];
    let read = file.read(&mut head).await?;
    file.seek(SeekFrom::Start(0)).await?;
    Ok(infer::get(&head[..read])
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream"))
}

struct OpenedResult {
    file: File,
    len: u64,
    content_type: &'static str,
}

async fn open_result(outcome: &EnhancementOutcome) -> std::io::Result<OpenedResult> {
    let mut file = File::open(&outcome.output_path).await?;
    let len = file.metadata().await?.len();
    let content_type = match outcome.mode {
        ProcessingMode::Real => "audio/mpeg",
        ProcessingMode::Simulated => sniff_content_type(&mut file).await?,
    };
    Ok(OpenedResult {
        file,
        len,
        content_type,
    })
}

/// POST /v1/enhance - multipart `audio` file plus optional `settings` JSON text
async fn enhance(
    session: Session,
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> Response {
    let user_id = session.user_id;

    let credit_status = match state.user_manager.get_credit_status(user_id) {
        Ok(status) => status,
        Err(e) => {
            error!("Failed to read credits of user {}: {}", user_id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !credit_status.can_enhance() {
        info!("User {} has no credits left", user_id);
        metrics::record_credits_rejection();
        return error_response(StatusCode::PAYMENT_REQUIRED, NO_CREDITS_ERROR);
    }

    let form = match read_enhance_form(&state, &mut multipart).await {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };

    let upload = match form.upload {
        Some(upload) if upload.size > 0 => upload,
        Some(_) => return error_response(StatusCode::BAD_REQUEST, "Uploaded audio file is empty"),
        None => return error_response(StatusCode::BAD_REQUEST, "No audio file provided"),
    };
    metrics::record_upload_bytes(upload.size);
    debug!(
        "User {} uploaded {:?} ({} bytes)",
        user_id, upload.original_name, upload.size
    );

    let result = state
        .pipeline
        .enhance(upload.path.clone(), form.settings.as_deref())
        .await;
    // From here on the pipeline owns the upload.
    upload.guard.disarm();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Enhancement failed for user {}: {}", user_id, e);
            metrics::record_error("processing", "enhance");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: PROCESSING_FAILED_ERROR.to_string(),
                    details: Some(e.to_string()),
                }),
            )
                .into_response();
        }
    };

    let opened = match open_result(&outcome).await {
        Ok(opened) => opened,
        Err(e) => {
            error!("[{}] Could not open result: {}", outcome.job_id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let charge = outcome.mode == ProcessingMode::Real || state.config.charge_simulated;
    let credits_remaining = if !credit_status.is_metered() {
        None
    } else if charge {
        match state.user_manager.charge_credit(user_id) {
            Ok(CreditCharge::Charged { remaining }) => {
                metrics::record_credit_consumed(outcome.mode.as_str());
                Some(remaining)
            }
            Ok(CreditCharge::NotMetered) => None,
            Ok(CreditCharge::Exhausted) => {
                // A concurrent request took the last credit.
                info!("[{}] User {} ran out of credits", outcome.job_id, user_id);
                metrics::record_credits_rejection();
                return error_response(StatusCode::PAYMENT_REQUIRED, NO_CREDITS_ERROR);
            }
            Err(e) => {
                error!("[{}] Failed to charge user {}: {}", outcome.job_id, user_id, e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    } else {
        Some(credit_status.free_credits)
    };

    info!(
        "[{}] Delivering {} result to user {} ({} bytes, credits left: {:?})",
        outcome.job_id, outcome.mode, user_id, opened.len, credits_remaining
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(opened.content_type),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(opened.len));
    headers.insert(
        HEADER_PROCESSING_MODE,
        HeaderValue::from_static(outcome.mode.as_str()),
    );
    if let Some(remaining) = credits_remaining {
        headers.insert(HEADER_CREDITS_REMAINING, HeaderValue::from(remaining));
    }
    if let Ok(job_id) = HeaderValue::from_str(&outcome.job_id) {
        headers.insert(HEADER_JOB_ID, job_id);
    }
    let filename = download_filename(upload.original_name.as_deref(), &outcome.output_path);
    let disposition = format!("attachment; filename=\"{}\"", filename);
    if let Ok(disposition) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    // The guard rides along with the body and cleans up once it is dropped.
    let files = outcome.files;
    let stream = ReaderStream::new(opened.file).map(move |chunk| {
        let _files = &files;
        chunk
    });

    (StatusCode::OK, headers, Body::from_stream(stream)).into_response()
}

pub fn enhance_routes(max_upload_bytes: u64) -> Router<ServerState> {
    let body_limit = max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);
    Router::new()
        .route("/v1/enhance", post(enhance))
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
}
