//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the document search engine, providing
//! typed errors for every subsystem and conversion utilities.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from extraction, index loading, search, LLM
//!   calls, blob sync, and the HTTP layer
//! - **Output**: Structured error types with context and error chains
//! - **Error Categories**: Extraction, Index, Search, Llm, Blob, Api, Config
//!
//! ## Key Features
//! - Struct variants with detailed context
//! - Automatic error conversion from common library errors
//! - LLM errors classified (timeout / validation / service) so the HTTP
//!   layer can map them to distinct status codes
//! - Recoverability hints for retry decisions

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, SearchError>;

/// Error types for the document search engine
#[derive(Debug, Error)]
pub enum SearchError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// Network-related errors
    #[error("Network error: {details}")]
    NetworkError { details: String },

    /// Serialization/deserialization errors
    #[error("Serialization failed: {message}")]
    SerializationFailed { message: String },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    // Extraction errors
    #[error("Failed to extract '{file}': {details}")]
    ExtractionFailed { file: String, details: String },

    #[error("Unsupported document format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Source folder not found: {path}")]
    SourceFolderMissing { path: String },

    // Project / index errors
    #[error("Unknown project: {project_id}")]
    ProjectNotFound { project_id: String },

    #[error("Invalid project id: {project_id}")]
    InvalidProjectId { project_id: String },

    #[error("Index for project '{project_id}' failed to load: {details}")]
    IndexLoadFailed { project_id: String, details: String },

    #[error("Index for project '{project_id}' is still loading")]
    IndexLoading { project_id: String },

    // Search errors
    #[error("Invalid search query: {query} - {reason}")]
    InvalidSearchQuery { query: String, reason: String },

    // LLM errors (classified per call outcome)
    #[error("LLM request timed out: {details}")]
    LlmTimeout { details: String },

    #[error("LLM output failed validation: {details}")]
    LlmValidation { details: String },

    #[error("LLM service error: {details}")]
    LlmService { details: String },

    #[error("Smart search is not configured: {details}")]
    LlmNotConfigured { details: String },

    // Blob sync / file serving errors
    #[error("Blob sync failed for project '{project_id}': {details}")]
    BlobSyncFailed { project_id: String, details: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Requested file path is not allowed: {path}")]
    ForbiddenPath { path: String },

    // Storage errors
    #[error("Query log database error: {details}")]
    QueryLogDatabase { details: String },
}

impl SearchError {
    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SearchError::NetworkError { .. }
                | SearchError::LlmTimeout { .. }
                | SearchError::LlmService { .. }
                | SearchError::BlobSyncFailed { .. }
                | SearchError::IndexLoading { .. }
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            SearchError::Config { .. } => "configuration",
            SearchError::ExtractionFailed { .. }
            | SearchError::UnsupportedFormat { .. }
            | SearchError::SourceFolderMissing { .. } => "extraction",
            SearchError::ProjectNotFound { .. }
            | SearchError::InvalidProjectId { .. }
            | SearchError::IndexLoadFailed { .. }
            | SearchError::IndexLoading { .. } => "index",
            SearchError::InvalidSearchQuery { .. } => "search",
            SearchError::LlmTimeout { .. }
            | SearchError::LlmValidation { .. }
            | SearchError::LlmService { .. }
            | SearchError::LlmNotConfigured { .. } => "llm",
            SearchError::BlobSyncFailed { .. }
            | SearchError::AuthenticationFailed { .. }
            | SearchError::ForbiddenPath { .. } => "api",
            SearchError::QueryLogDatabase { .. } => "storage",
            SearchError::NetworkError { .. }
            | SearchError::SerializationFailed { .. }
            | SearchError::ValidationFailed { .. }
            | SearchError::Internal { .. } => "generic",
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::SerializationFailed {
            message: format!("JSON serialization error: {}", err),
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::LlmTimeout {
                details: err.to_string(),
            }
        } else {
            SearchError::NetworkError {
                details: err.to_string(),
            }
        }
    }
}

impl From<sled::Error> for SearchError {
    fn from(err: sled::Error) -> Self {
        SearchError::QueryLogDatabase {
            details: err.to_string(),
        }
    }
}

impl From<bincode::Error> for SearchError {
    fn from(err: bincode::Error) -> Self {
        SearchError::SerializationFailed {
            message: format!("Binary serialization error: {}", err),
        }
    }
}

impl From<toml::de::Error> for SearchError {
    fn from(err: toml::de::Error) -> Self {
        SearchError::Config {
            message: format!("TOML parse error: {}", err),
        }
    }
}
