//! Error types for agent-engine

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Fragments of provider error text that mark a failure as worth retrying
const TRANSIENT_SIGNATURES: &[&str] = &[
    "503",
    "429",
    "unavailable",
    "overloaded",
    "high demand",
    "resource_exhausted",
    "try again later",
];

/// Errors reported by the model provider client
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Provider is temporarily unable to serve the request
    #[error("{status} Service Unavailable: {message}")]
    Unavailable { status: u16, message: String },

    /// Provider throttled the request
    #[error("{status} Too Many Requests: {message}")]
    RateLimited { status: u16, message: String },

    /// The streamed response broke off or contained garbage
    #[error("Stream error: {0}")]
    Stream(String),

    /// Anything the client could not classify
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Classify an HTTP status returned by the provider
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited { status, message },
            500 | 502 | 503 | 504 | 529 => Self::Unavailable { status, message },
            _ => Self::Other(format!("{}: {}", status, message)),
        }
    }

    /// Whether opening the stream again might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::RateLimited { .. } => true,
            Self::Stream(_) => false,
            Self::Other(message) => {
                let message = message.to_lowercase();
                TRANSIENT_SIGNATURES
                    .iter()
                    .any(|signature| message.contains(signature))
            }
        }
    }
}

/// Errors that can end a run
#[derive(Debug, Error)]
pub enum EngineError {
    /// Model provider failed in a way retries did not fix
    #[error("Model provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Writing the finished run to history failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] agent_core::Error),

    /// Another run holds the admission slot
    #[error("Run {run_id} is already active")]
    RunActive { run_id: Uuid },

    /// The run was cancelled by its owner
    #[error("Run was cancelled")]
    Cancelled,
}

impl EngineError {
    /// Text shown to observers when this error ends a run
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(err) => extract_error_message(&err.to_string()),
            other => other.to_string(),
        }
    }
}

/// Pull the human-readable `"message"` out of a provider error dump.
///
/// Provider errors often wrap a JSON body; the innermost `"message": "..."`
/// value is what a person wants to read. Falls back to the raw text.
pub fn extract_error_message(raw: &str) -> String {
    static MESSAGE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#""message"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid message regex")
    });

    MESSAGE_RE
        .captures_iter(raw)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|literal| {
            serde_json::from_str::<String>(&format!("\"{}\"", literal.as_str()))
                .unwrap_or_else(|_| literal.as_str().to_string())
        })
        .unwrap_or_else(|| raw.to_string())
}
