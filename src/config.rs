//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration for the document search engine: server settings,
//! project definitions, search behavior, smart-search (LLM) settings, blob
//! sync, and logging, loaded from TOML with environment overrides.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file (TOML), environment variables
//! - **Output**: Validated configuration structs with defaults and overrides
//! - **Validation**: Type checking, range validation, project id checks
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Environment variables
//! 2. Configuration file
//! 3. Default values
//!
//! ## Usage
//! ```rust,no_run
//! use casefile_search::config::Config;
//!
//! let config = Config::from_file("config.toml").unwrap();
//! println!("Server port: {}", config.server.port);
//! ```

use crate::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server and API configuration
    pub server: ServerConfig,
    /// Document collections served by this instance
    pub projects: Vec<ProjectConfig>,
    /// Keyword search behavior
    pub search: SearchEngineConfig,
    /// Smart search (LLM) settings
    pub smart_search: SmartSearchConfig,
    /// Extraction pipeline settings
    pub extraction: ExtractionConfig,
    /// Optional blob storage sync
    pub blob: BlobConfig,
    /// Query log settings
    pub query_log: QueryLogConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server and API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of actix worker threads
    pub workers: usize,
    /// Enable CORS
    pub enable_cors: bool,
    /// Application password; empty disables authentication (development)
    pub app_password: String,
    /// Session lifetime in seconds
    pub session_lifetime_seconds: u64,
}

/// One document collection: its source files and its extracted index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project id, `^[a-z0-9][a-z0-9-]*$`
    pub id: String,
    /// Display name
    pub name: String,
    /// Free-text description, also handed to the LLM as collection context
    #[serde(default)]
    pub description: String,
    /// Folder holding the original documents
    pub source_folder: PathBuf,
    /// Folder holding `texts/*.json` and `metadata.json`
    pub index_folder: PathBuf,
    /// Preload the index in the background at startup
    #[serde(default = "default_true")]
    pub preload: bool,
}

fn default_true() -> bool {
    true
}

/// Keyword search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchEngineConfig {
    /// Results per page
    pub per_page: usize,
    /// Characters of context kept on each side of the first match
    pub context_chars: usize,
    /// Maximum query length accepted
    pub max_query_length: usize,
}

/// Smart search (LLM) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartSearchConfig {
    /// Master switch; disabled falls back to keyword search
    pub enabled: bool,
    /// OpenAI-compatible API base URL (e.g. `https://api.openai.com/v1`)
    pub api_base_url: String,
    /// API key; usually supplied via `LLM_API_KEY`
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Query plan cache TTL in seconds
    pub cache_ttl_seconds: u64,
    /// Maximum cached query plans
    pub cache_max_entries: usize,
}

/// Extraction pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Maximum rows serialized per Excel sheet
    pub excel_max_rows: usize,
}

/// Blob storage sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Enable index download at startup
    pub enabled: bool,
    /// Base URL; index files live under `{base_url}/{project_id}/`
    pub base_url: String,
    /// Secret for signing time-limited file links
    pub signing_secret: String,
    /// Signed link lifetime in seconds
    pub link_expiry_seconds: u64,
    /// Concurrent downloads per project
    pub max_concurrent_downloads: usize,
}

/// Query log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLogConfig {
    /// Database path for the sled log store
    pub db_path: PathBuf,
    /// Entries older than this are removed by cleanup
    pub retention_days: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter (tracing env-filter syntax)
    pub level: String,
}

impl Config {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!("Configuration file not found: {:?}, using defaults", path);
            let mut config = Self::default();
            config.apply_env_overrides();
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(|e| SearchError::Config {
            message: format!("Failed to read config file {:?}: {}", path, e),
        })?;

        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CASEFILE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CASEFILE_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(password) = std::env::var("APP_PASSWORD") {
            self.server.app_password = password;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.smart_search.api_key = key;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.smart_search.model = model;
        }
        if let Ok(enabled) = std::env::var("SMART_SEARCH_ENABLED") {
            self.smart_search.enabled = enabled.eq_ignore_ascii_case("true");
        }
        if let Ok(secret) = std::env::var("BLOB_SIGNING_SECRET") {
            self.blob.signing_secret = secret;
        }
        if let Ok(level) = std::env::var("CASEFILE_LOG") {
            self.logging.level = level;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(SearchError::ValidationFailed {
                field: "server.port".to_string(),
                reason: "Port cannot be zero".to_string(),
            });
        }

        if self.search.per_page == 0 {
            return Err(SearchError::ValidationFailed {
                field: "search.per_page".to_string(),
                reason: "Page size must be greater than zero".to_string(),
            });
        }

        for project in &self.projects {
            if !crate::projects::is_valid_project_id(&project.id) {
                return Err(SearchError::ValidationFailed {
                    field: "projects.id".to_string(),
                    reason: format!(
                        "'{}' is not a valid project id (lowercase alphanumeric with hyphens)",
                        project.id
                    ),
                });
            }
        }

        if self.smart_search.enabled && self.smart_search.api_base_url.is_empty() {
            return Err(SearchError::ValidationFailed {
                field: "smart_search.api_base_url".to_string(),
                reason: "Smart search is enabled but no API base URL is set".to_string(),
            });
        }

        if self.blob.enabled && self.blob.base_url.is_empty() {
            return Err(SearchError::ValidationFailed {
                field: "blob.base_url".to_string(),
                reason: "Blob sync is enabled but no base URL is set".to_string(),
            });
        }

        Ok(())
    }

    /// Get configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SearchError::Config {
            message: format!("Failed to serialize config to TOML: {}", e),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            projects: Vec::new(),
            search: SearchEngineConfig::default(),
            smart_search: SmartSearchConfig::default(),
            extraction: ExtractionConfig::default(),
            blob: BlobConfig::default(),
            query_log: QueryLogConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: num_cpus::get(),
            enable_cors: true,
            app_password: String::new(),
            session_lifetime_seconds: 3600,
        }
    }
}

impl Default for SearchEngineConfig {
    fn default() -> Self {
        Self {
            per_page: 20,
            context_chars: 100,
            max_query_length: 1000,
        }
    }
}

impl Default for SmartSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            cache_ttl_seconds: 600,
            cache_max_entries: 1000,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            excel_max_rows: 500,
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            signing_secret: String::new(),
            link_expiry_seconds: 3600,
            max_concurrent_downloads: 5,
        }
    }
}

impl Default for QueryLogConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/search_logs"),
            retention_days: 90,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
