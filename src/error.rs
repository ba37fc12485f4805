//! Error handling and custom error types
//!
//! Provides unified error handling across the proxy using thiserror.
//! Upstream failures carry a [`ProviderErrorKind`] so the HTTP layer can pick
//! a status code without inspecting message text.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("{0}")]
    InvalidRequest(String),

    /// The reason is kept for server-side logs only.
    #[error("Untrusted product image URL")]
    UntrustedUrl(String),

    #[error("Unknown AI provider '{0}'. Supported providers: gemini, huggingface")]
    UnknownProvider(String),

    #[error("Could not fetch product image")]
    ProductImage(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Upstream quota or rate limit exhausted.
    QuotaExceeded,
    /// Generation stopped for a non-`STOP` finish reason (safety, recitation, ...).
    Blocked,
    /// Upstream answered but produced no image.
    EmptyOutput,
    /// Upstream timed out or is overloaded.
    Busy,
    /// No API key available for the active provider.
    MissingCredentials,
    Upstream,
}

impl ProviderErrorKind {
    /// HTTP status the kind is surfaced as.
    pub fn status_code(self) -> u16 {
        match self {
            ProviderErrorKind::QuotaExceeded => 429,
            ProviderErrorKind::Blocked | ProviderErrorKind::EmptyOutput => 400,
            ProviderErrorKind::Busy => 503,
            ProviderErrorKind::MissingCredentials | ProviderErrorKind::Upstream => 500,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Upstream, message)
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

impl Error {
    /// Provider error kind, if this error came from an upstream provider.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Error::Provider(e) => Some(e.kind),
            _ => None,
        }
    }
}
