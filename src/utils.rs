//! # Utilities Module
//!
//! ## Purpose
//! Common helpers used throughout the search engine: operation timing, text
//! handling, and path/filename validation.

use sha2::{Digest, Sha256};
use std::time::Instant;

/// Performance timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    /// Start a new timer with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("Timer '{}' completed in {}ms", self.name, elapsed);
        elapsed
    }
}

/// Text processing utilities
pub struct TextUtils;

impl TextUtils {
    /// Truncate text to at most `max_chars` characters, appending an
    /// ellipsis when shortened
    pub fn truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            text.to_string()
        } else {
            let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{}...", cut)
        }
    }

    /// Strip control characters for safe display
    pub fn sanitize(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || c.is_whitespace())
            .collect()
    }

    /// Count words in text
    pub fn word_count(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// SHA-256 hex digest, used for cache keys and content hashes
    pub fn sha256_hex(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Sanitize a filename for safe file operations
    pub fn sanitize_filename(filename: &str) -> String {
        filename
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Check that a relative path stays inside its root: rejects absolute
    /// paths, drive prefixes, and `..` components
    pub fn is_safe_relative_path(path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let p = std::path::Path::new(path);
        if p.is_absolute() {
            return false;
        }
        p.components().all(|c| {
            matches!(
                c,
                std::path::Component::Normal(_) | std::path::Component::CurDir
            )
        })
    }
}
