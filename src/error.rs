//! Server Error Types
//!
//! [`ErrorKind`] covers everything that can stop the server from starting.
//! [`ApiError`] is what a request handler fails with; it knows which status
//! code each failure deserves and logs the full error tree on its way out.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cirrus_library::error::{Error as LibraryError, ErrorKind as LibraryErrorKind};
use derive_more::{Display, Error};

/// A server error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for server setup.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("storage backend could not be initialised")]
    Storage,
    #[display("metadata store could not be opened")]
    Database,
    #[display("could not issue token")]
    Token,
    #[display("server failed")]
    Serve,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Serve)
    }
}

/// Why a request failed.
#[derive(Debug)]
pub enum ApiError {
    /// No bearer token was presented.
    Unauthorized,
    /// A token was presented but isn't valid.
    Forbidden,
    /// The request itself is malformed (missing multipart field and so on).
    BadRequest(&'static str),
    Library(LibraryError),
}
impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        Self::Library(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Library(err) => match &**err {
                LibraryErrorKind::InvalidPath(_) => StatusCode::BAD_REQUEST,
                LibraryErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
                LibraryErrorKind::Conflict(_) => StatusCode::CONFLICT,
                LibraryErrorKind::PermissionDenied(_) | LibraryErrorKind::WriteFailed => StatusCode::INTERNAL_SERVER_ERROR,
                LibraryErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Unauthorized => "no token provided".to_string(),
            Self::Forbidden => "invalid token".to_string(),
            Self::BadRequest(reason) => (*reason).to_string(),
            Self::Library(err) => (**err).to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Library(err) = &self {
            match status.is_server_error() {
                true => tracing::error!(status = status.as_u16(), error = ?err, "Request failed"),
                false => tracing::debug!(status = status.as_u16(), error = ?err, "Request rejected"),
            }
        }
        (status, self.message()).into_response()
    }
}
