//! Error types for deckhand

use thiserror::Error;

/// Main error type for deckhand
#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Tunnel error: {0}")]
    TunnelError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Remote command failed on {target}: {message}")]
    RemoteError { target: String, message: String },

    #[error("Recipe error: {0}")]
    RecipeError(String),

    #[error("Deployment v{0} failed")]
    DeploymentFailed(i64),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// True when the control plane reported the resource missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, CliError::NotFound(_))
            || matches!(self, CliError::ApiError { status: 404, .. })
    }

    /// True when the control plane rejected our credentials
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, CliError::NotAuthenticated(_))
            || matches!(self, CliError::ApiError { status: 401, .. })
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Internal(err.to_string())
    }
}
