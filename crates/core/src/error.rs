//! Error types for the Wayfinder domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Wayfinder operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Every model in a purpose chain is exhausted ---
    #[error("No model available for '{purpose}' after {attempts} attempt(s): {last_error}")]
    ModelUnavailable {
        purpose: String,
        attempts: usize,
        last_error: String,
    },

    // --- Knowledge errors ---
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

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
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failure classes that make a model descriptor eligible for failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    RateLimit,
    Quota,
    MalformedOutput,
    Unavailable,
    Timeout,
}

impl ProviderError {
    /// Classify this error for the fallback router.
    ///
    /// `None` means the error is not a failover signal and must propagate.
    pub fn fallback_kind(&self) -> Option<FallbackKind> {
        match self {
            Self::RateLimited { .. } => Some(FallbackKind::RateLimit),
            Self::ApiError { status_code: 429 | 413, .. } => Some(FallbackKind::RateLimit),
            Self::QuotaExceeded(_) => Some(FallbackKind::Quota),
            Self::MalformedOutput(_) => Some(FallbackKind::MalformedOutput),
            Self::ModelNotFound(_) => Some(FallbackKind::Unavailable),
            Self::ApiError { status_code: 404, .. } => Some(FallbackKind::Unavailable),
            Self::Timeout(_) => Some(FallbackKind::Timeout),
            Self::ApiError { .. }
            | Self::AuthenticationFailed(_)
            | Self::NotConfigured(_)
            | Self::Network(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Indexing failed for source '{source_tag}': {reason}")]
    Indexing { source_tag: String, reason: String },

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
