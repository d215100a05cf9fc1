//! # Legal Document Page Search Engine
//!
//! ## Overview
//! This library implements a page-level search engine for legal document
//! collections. Office documents (PDF, Excel, Word, email, HTML) are
//! extracted into a flat per-page JSON index which is held fully in memory
//! and scanned linearly at query time; an LLM-assisted "smart search" layer
//! turns free-text queries into validated, weighted query plans.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `extraction`: per-format extractors producing the shared index format
//! - `index`: index file loading and the per-project registry with
//!   background preload
//! - `search`: keyword search engine (AND matching, scoring, pagination)
//! - `smart`: LLM query parsing, validation, caching, and weighted scoring
//! - `projects`: project registry and id validation
//! - `blob`: index download from blob storage and signed file links
//! - `query_log`: search audit log and statistics
//! - `api`: REST API endpoints
//! - `config`: configuration management
//! - `errors`: centralized error handling
//!
//! ## Input/Output Specification
//! - **Input**: Office documents (extraction), search queries (text)
//! - **Output**: Ranked page-level matches with highlighted context
//! - **Granularity**: one PDF page / Excel sheet / document body per match

// Core modules
pub mod api;
pub mod blob;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod index;
pub mod projects;
pub mod query_log;
pub mod search;
pub mod smart;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use errors::{Result, SearchError};
pub use search::{KeywordSearchEngine, SearchOptions, SearchResponse};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Document format of an indexed source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Excel,
    Word,
    Email,
    Html,
}

impl FileType {
    /// Parse from the string used in index files and query parameters
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(FileType::Pdf),
            "excel" => Some(FileType::Excel),
            "word" => Some(FileType::Word),
            "email" => Some(FileType::Email),
            "html" => Some(FileType::Html),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Excel => "excel",
            FileType::Word => "word",
            FileType::Email => "email",
            FileType::Html => "html",
        }
    }
}

impl Default for FileType {
    fn default() -> Self {
        FileType::Pdf
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of match granularity: a PDF page, an Excel sheet, or a whole
/// document body for single-page formats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed page (or sheet) number
    pub page_num: u32,
    /// Extracted text
    pub text: String,
    /// Sheet name for Excel documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

/// An extracted document as stored in the index. Identity is `filename`;
/// documents are immutable once extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// File name (index key)
    pub filename: String,
    /// Path relative to the project source folder
    pub path: String,
    /// Document format; missing in older index files, defaults to pdf
    #[serde(default)]
    pub file_type: FileType,
    /// Extracted pages
    pub pages: Vec<Page>,
}

/// Application state shared across request handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Config>,
    pub registry: Arc<index::IndexRegistry>,
    pub keyword_engine: Arc<search::KeywordSearchEngine>,
    pub smart_engine: Arc<smart::SmartSearchEngine>,
    pub blob: Arc<blob::BlobSync>,
    pub query_log: Arc<query_log::QueryLogger>,
    pub sessions: Arc<api::SessionStore>,
}
