//! Error types for the fnrouter domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all fnrouter operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Capability errors ---
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures raised while invoking a registered capability.
///
/// The router never propagates these: they are folded back into the
/// conversation as `Error: ...` result text so the model can react.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("Capability not found: {0}")]
    NotFound(String),

    #[error("Capability execution failed: {capability} — {reason}")]
    ExecutionFailed { capability: String, reason: String },

    #[error("Capability timed out: {capability} after {timeout_secs}s")]
    Timeout {
        capability: String,
        timeout_secs: u64,
    },

    #[error("Permission denied: {capability} — {reason}")]
    PermissionDenied { capability: String, reason: String },

    #[error("Invalid arguments for {capability}: {reason}")]
    InvalidArguments { capability: String, reason: String },
}

impl CapabilityError {
    /// Shorthand for an execution failure.
    pub fn failed(capability: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ExecutionFailed {
            capability: capability.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for an argument validation failure.
    pub fn invalid_args(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}
