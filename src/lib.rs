//! Cirrus: a personal cloud file storage server.
//!
//! Each authenticated owner gets a private tree of files and folders beneath
//! the storage root. The filesystem is the source of truth; the SQLite
//! metadata store remembers content types and upload times and is repaired
//! whenever a folder is listed.

pub mod auth;
pub mod error;
mod handlers;

use crate::auth::AuthHandle;
use crate::error::{ErrorKind, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use cirrus_cache::Repository;
use cirrus_library::SummarizerHandle;
use cirrus_storage::BackendHandle;
use exn::ResultExt;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Everything a request handler needs, shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub backend: BackendHandle,
    pub cache: Repository,
    pub auth: AuthHandle,
    pub summarizer: Option<SummarizerHandle>,
    /// Base URL the storage root is served from, advertised after uploads.
    pub public_base_url: Option<String>,
}

fn cors(origins: &[String]) -> Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin).or_raise(|| ErrorKind::Config))
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::permissive().allow_origin(AllowOrigin::list(origins)))
}

/// Builds the HTTP API.
///
/// Fails only if one of the CORS origins isn't a valid header value.
pub fn router(state: AppState, cors_origins: &[String], max_upload_bytes: u64) -> Result<Router> {
    let body_limit = usize::try_from(max_upload_bytes).unwrap_or(usize::MAX);
    Ok(Router::new()
        .route("/health", get(handlers::health))
        .route("/upload", post(handlers::upload))
        .route("/files", get(handlers::list_files))
        .route("/download/{*path}", get(handlers::download))
        .route("/rename", post(handlers::rename))
        .route("/delete/{*path}", delete(handlers::delete))
        .route("/create-folder", post(handlers::create_folder))
        .route("/analytics", get(handlers::folder_analytics))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors(cors_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
