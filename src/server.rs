//! HTTP API
//!
//! Exposes conversion and merging over HTTP:
//! - `GET /health`
//! - `POST /convert/word-to-pdf` (multipart field `file`)
//! - `POST /convert/pdf-to-word` (multipart field `file`)
//! - `POST /merge/pdfs` (multipart fields `files`, options as query parameters)
//!
//! Every request works in its own temporary directory, dropped when the
//! request finishes. Encrypted PDFs are refused since nobody can be asked
//! for a password.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::convert::{is_usable_output, pdf_to_word, Converter, DocumentKind, WordToPdf};
use crate::error::{Error, Result};
use crate::merger::{MergeOptions, Merger, SourceItem};
use crate::password::RejectEncrypted;

const PDF_MEDIA_TYPE: &str = "application/pdf";
const DOCX_MEDIA_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const MERGED_FILE_NAME: &str = "merged_document.pdf";

/// Server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ServerConfig {
    /// Load from `docmerge.toml` (or `file`, when given) and `DOCMERGE_*`
    /// environment variables, on top of the defaults
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("docmerge").required(false),
        };

        Config::builder()
            .add_source(file_source)
            .add_source(Environment::with_prefix("DOCMERGE").try_parsing(true))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| Error::General(format!("Failed to load server config: {}", e)))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub converter: Arc<dyn WordToPdf>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            converter: Arc::new(Converter::new()),
        }
    }
}

/// Build the API router
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/convert/word-to-pdf", post(word_to_pdf_handler))
        .route("/convert/pdf-to-word", post(pdf_to_word_handler))
        .route("/merge/pdfs", post(merge_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(config: ServerConfig) -> Result<()> {
    let app = router(AppState::default(), &config);
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// === Errors ===

/// An error response: `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }

    /// Map a library error, prefixing server-side failures with `context`
    fn from_error(err: Error, context: &str) -> Self {
        match err.root() {
            Error::UnsupportedFileType(_)
            | Error::FileNotFound(_)
            | Error::NoInputs
            | Error::PageNumberOutOfRange { .. }
            | Error::EncryptedInputRejected { .. } => ApiError::bad_request(err.root().to_string()),
            Error::NeedsPassword { file } | Error::WrongPassword { file } => {
                ApiError::bad_request(
                    Error::EncryptedInputRejected { file: file.clone() }.to_string(),
                )
            }
            _ => {
                error!(error = %err, "{}", context);
                ApiError::internal(format!("{}: {}", context, err))
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::bad_request(format!("Invalid upload: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// === Uploads and downloads ===

/// An uploaded file held in memory
struct Upload {
    file_name: String,
    data: Vec<u8>,
}

impl Upload {
    fn stem(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Write into `dir` under `prefix` + the uploaded name
    fn save_in(&self, dir: &Path, prefix: &str) -> ApiResult<PathBuf> {
        let path = dir.join(format!("{}{}", prefix, self.file_name));
        fs::write(&path, &self.data).map_err(|e| ApiError::internal(format!("Failed to store upload: {}", e)))?;
        Ok(path)
    }
}

/// Collect every file field called `field`
async fn read_files(multipart: &mut Multipart, field: &str) -> ApiResult<Vec<Upload>> {
    let mut uploads = Vec::new();

    while let Some(part) = multipart.next_field().await? {
        if part.name() != Some(field) {
            continue;
        }
        // Only the final path component is kept
        let file_name = part
            .file_name()
            .and_then(|name| Path::new(name).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let data = part.bytes().await?.to_vec();

        if file_name.is_empty() {
            return Err(ApiError::bad_request(format!("Field '{}' has no file name", field)));
        }
        uploads.push(Upload { file_name, data });
    }

    Ok(uploads)
}

async fn read_single_file(multipart: &mut Multipart, field: &str) -> ApiResult<Upload> {
    read_files(multipart, field)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request(format!("No file provided in field '{}'", field)))
}

/// `Content-Disposition` carrying a UTF-8 file name with an ASCII fallback
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::new();
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", fallback, encoded)
}

fn file_response(path: &Path, file_name: &str, media_type: &'static str) -> ApiResult<Response> {
    let data = fs::read(path).map_err(|e| ApiError::internal(format!("Failed to read result: {}", e)))?;
    Ok((
        [
            (header::CONTENT_TYPE, media_type.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(file_name)),
        ],
        data,
    )
        .into_response())
}

fn scratch_dir() -> ApiResult<TempDir> {
    TempDir::new().map_err(|e| ApiError::internal(format!("Failed to create working directory: {}", e)))
}

/// Run blocking conversion work off the async executor
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::internal(format!("Worker task failed: {}", e)))
}

// === Handlers ===

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn word_to_pdf_handler(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let upload = read_single_file(&mut multipart, "file").await?;
    if DocumentKind::from_path(Path::new(&upload.file_name)).ok() != Some(DocumentKind::Word) {
        return Err(ApiError::bad_request(
            "Invalid file type. Only .docx and .doc are supported.",
        ));
    }

    let workdir = scratch_dir()?;
    let input = upload.save_in(workdir.path(), "")?;
    let output_name = format!("{}.pdf", upload.stem());
    let output = workdir.path().join(&output_name);

    let converter = Arc::clone(&state.converter);
    let (job_input, job_output) = (input.clone(), output.clone());
    let converted = blocking(move || converter.convert(&job_input, &job_output)).await?;

    if !converted || !is_usable_output(&output) {
        return Err(ApiError::internal("Word to PDF conversion failed."));
    }
    file_response(&output, &output_name, PDF_MEDIA_TYPE)
}

async fn pdf_to_word_handler(mut multipart: Multipart) -> ApiResult<Response> {
    let upload = read_single_file(&mut multipart, "file").await?;
    if DocumentKind::from_path(Path::new(&upload.file_name)).ok() != Some(DocumentKind::Pdf) {
        return Err(ApiError::bad_request("Invalid file type. Only .pdf is supported."));
    }

    let workdir = scratch_dir()?;
    let input = upload.save_in(workdir.path(), "")?;
    let output_name = format!("{}.docx", upload.stem());
    let output = workdir.path().join(&output_name);

    let job_output = output.clone();
    blocking(move || pdf_to_word::convert(&input, &job_output, None))
        .await?
        .map_err(|e| ApiError::from_error(e, "PDF to Word conversion failed"))?;

    file_response(&output, &output_name, DOCX_MEDIA_TYPE)
}

async fn merge_handler(
    State(state): State<AppState>,
    Query(options): Query<MergeOptions>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    options
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let uploads = read_files(&mut multipart, "files").await?;
    if uploads.is_empty() {
        return Err(ApiError::bad_request("No files provided for merging."));
    }

    let workdir = scratch_dir()?;
    let mut items = Vec::with_capacity(uploads.len());
    for (i, upload) in uploads.iter().enumerate() {
        if DocumentKind::from_path(Path::new(&upload.file_name)).is_err() {
            return Err(ApiError::bad_request(format!(
                "Invalid file type for merging: {}. Only .docx, .doc, and .pdf are supported.",
                upload.file_name
            )));
        }
        let path = upload.save_in(workdir.path(), &format!("input_{}_", i))?;
        items.push(SourceItem::with_title(path, upload.stem()));
    }

    let output = workdir.path().join(MERGED_FILE_NAME);
    let job_output = output.clone();
    let converter = Arc::clone(&state.converter);
    let report = blocking(move || {
        Merger::new()
            .with_converter(converter)
            .run(&items, &job_output, &options, &mut RejectEncrypted)
    })
    .await?
    .map_err(|e| ApiError::from_error(e, "PDF merging failed"))?;

    info!(pages = report.total_pages, documents = report.documents.len(), "merge request completed");
    file_response(&output, MERGED_FILE_NAME, PDF_MEDIA_TYPE)
}
