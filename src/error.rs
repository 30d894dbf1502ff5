//! Error types for navcharts

use thiserror::Error;

/// Result type alias for navcharts operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while logging in or fetching chart tiles
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chart login is not supported by this build (no client secret)")]
    Unsupported,

    #[error("No refresh token")]
    NoRefreshToken,

    #[error("Login no longer valid, try again")]
    LoginExpired,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid coordinates: page {page}, x {x}, y {y}, zoom {zoom}")]
    InvalidTile { page: i32, x: i32, y: i32, zoom: u32 },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the provider rejected the request outright (non-2xx)
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::HttpStatus { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
