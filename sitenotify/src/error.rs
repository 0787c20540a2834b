//! Error types.

use thiserror::Error;

/// The main error type for sitenotify operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Push channel transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// The API answered with a non-success status.
    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },

    /// The credential was rejected by the API or the channel authorizer.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// Operation requires authentication but none was provided.
    #[error("Authentication required")]
    AuthRequired,

    /// Failed to parse response or event data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Push channel protocol error.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The action asks for confirmation and none was given.
    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    /// Invalid argument passed to an API method.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}

impl Error {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Error::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Error::Auth(msg.into())
    }

    /// Create a channel protocol error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Error::Channel(msg.into())
    }

    /// Check if the request never completed.
    pub fn is_network_error(&self) -> bool {
        match self {
            Error::Network(_) | Error::WebSocket(_) => true,
            Error::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            e => e.is_network_error(),
        }
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::AuthRequired)
    }

    /// Check if this is a malformed payload.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::Json(_))
    }
}

/// Result type alias for sitenotify operations.
pub type Result<T> = std::result::Result<T, Error>;
