//! # Query Plan Cache
//!
//! ## Purpose
//! In-memory TTL cache for validated query analyses, so an identical query
//! within the TTL is answered without a new LLM call. Keys are content
//! hashes of `project_id:query`; insertion is first-writer-wins and the
//! oldest entry is evicted when the cache is full.

use crate::smart::plan::QueryAnalysis;
use crate::utils::TextUtils;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct CacheEntry {
    analysis: QueryAnalysis,
    inserted_at: Instant,
}

/// TTL cache for query analyses
pub struct PlanCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl PlanCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cache key for a project-scoped query
    pub fn key(project_id: &str, query: &str) -> String {
        TextUtils::sha256_hex(&format!("{}:{}", project_id, query.trim().to_lowercase()))
    }

    /// Return the cached analysis if present and unexpired. Expired entries
    /// are removed on read.
    pub fn get(&self, key: &str) -> Option<QueryAnalysis> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.analysis.clone());
            }
            entries.remove(key);
        }
        None
    }

    /// Insert unless an unexpired entry already exists (first-writer-wins).
    /// Evicts the oldest entry when the cache is full.
    pub fn insert(&self, key: String, analysis: QueryAnalysis) {
        let mut entries = self.entries.lock();

        if let Some(existing) = entries.get(&key) {
            if existing.inserted_at.elapsed() < self.ttl {
                return;
            }
        }

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                analysis,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
