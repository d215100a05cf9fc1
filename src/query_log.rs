//! # Query Log Module
//!
//! ## Purpose
//! Persistent audit log of search queries for usage statistics and search
//! quality review: which queries run, in which mode, how many results they
//! return, and how the LLM path behaves (latency, cache hits, errors).
//!
//! ## Input/Output Specification
//! - **Input**: One [`SearchLogEntry`] per executed search
//! - **Output**: Aggregate statistics, most common queries, zero-result
//!   queries; retention cleanup
//! - **Storage**: sled tree of bincode-encoded entries keyed by timestamp
//!
//! ## Key Features
//! - Logging failures are swallowed with a warning, never failing a search
//! - Time-ordered keys so stats windows are range scans
//! - Configurable retention with explicit cleanup

use crate::config::QueryLogConfig;
use crate::errors::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One logged search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLogEntry {
    pub timestamp: DateTime<Utc>,
    pub project_id: String,
    pub query_text: String,
    /// "smart" or "keyword"
    pub search_mode: String,
    pub interpretation: Option<String>,
    pub result_count: Option<usize>,
    pub llm_latency_ms: Option<u64>,
    pub cache_hit: bool,
    pub error_message: Option<String>,
}

impl SearchLogEntry {
    pub fn new(project_id: &str, query_text: &str, search_mode: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            project_id: project_id.to_string(),
            query_text: query_text.to_string(),
            search_mode: search_mode.to_string(),
            interpretation: None,
            result_count: None,
            llm_latency_ms: None,
            cache_hit: false,
            error_message: None,
        }
    }
}

/// Aggregate statistics over a time window
#[derive(Debug, Clone, Serialize)]
pub struct SearchStats {
    pub total_searches: usize,
    pub by_mode: HashMap<String, usize>,
    pub error_count: usize,
    pub error_rate: f64,
    pub cache_hit_rate: f64,
    pub avg_latency_ms: Option<u64>,
    pub zero_result_count: usize,
    pub days: i64,
}

/// A frequently-run query
#[derive(Debug, Clone, Serialize)]
pub struct CommonQuery {
    pub query: String,
    pub count: usize,
    pub avg_results: usize,
}

/// A query that returned nothing
#[derive(Debug, Clone, Serialize)]
pub struct ZeroResultQuery {
    pub query: String,
    pub interpretation: Option<String>,
    pub count: usize,
}

/// Search audit logger backed by sled
pub struct QueryLogger {
    tree: sled::Tree,
    retention_days: i64,
    // keeps the database handle alive for the tree
    _db: sled::Db,
}

impl QueryLogger {
    pub fn open(config: &QueryLogConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(&config.db_path)?;
        let tree = db.open_tree("search_logs")?;
        Ok(Self {
            tree,
            retention_days: config.retention_days,
            _db: db,
        })
    }

    /// Log a search. Failures are warned about and swallowed so logging can
    /// never fail a search.
    pub fn log_search(&self, entry: SearchLogEntry) {
        if let Err(e) = self.record(&entry) {
            tracing::warn!("Failed to log search query: {}", e);
        }
    }

    fn record(&self, entry: &SearchLogEntry) -> Result<()> {
        let key = log_key(&entry.timestamp);
        let value = bincode::serialize(entry)?;
        self.tree.insert(key, value)?;
        Ok(())
    }

    /// Remove entries older than the retention period. Returns how many
    /// entries were removed.
    pub fn cleanup_old_logs(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.retention_days);
        let cutoff_key = log_key_prefix(&cutoff);

        let stale: Vec<sled::IVec> = self
            .tree
            .range(..cutoff_key)
            .keys()
            .filter_map(|k| k.ok())
            .collect();

        for key in &stale {
            self.tree.remove(key)?;
        }
        if !stale.is_empty() {
            tracing::info!("Removed {} expired query log entries", stale.len());
        }
        Ok(stale.len())
    }

    /// Aggregate statistics for the last `days` days, optionally filtered by
    /// project
    pub fn search_stats(&self, project_id: Option<&str>, days: i64) -> Result<SearchStats> {
        let entries = self.entries_since(project_id, days)?;

        let total = entries.len();
        let mut by_mode: HashMap<String, usize> = HashMap::new();
        let mut errors = 0usize;
        let mut smart_total = 0usize;
        let mut cache_hits = 0usize;
        let mut latency_sum = 0u64;
        let mut latency_count = 0usize;
        let mut zero_results = 0usize;

        for entry in &entries {
            *by_mode.entry(entry.search_mode.clone()).or_default() += 1;
            if entry.error_message.is_some() {
                errors += 1;
            }
            if entry.search_mode == "smart" {
                smart_total += 1;
                if entry.cache_hit {
                    cache_hits += 1;
                }
            }
            if let Some(latency) = entry.llm_latency_ms {
                latency_sum += latency;
                latency_count += 1;
            }
            if entry.result_count == Some(0) {
                zero_results += 1;
            }
        }

        Ok(SearchStats {
            total_searches: total,
            by_mode,
            error_count: errors,
            error_rate: if total > 0 {
                errors as f64 / total as f64
            } else {
                0.0
            },
            cache_hit_rate: if smart_total > 0 {
                cache_hits as f64 / smart_total as f64
            } else {
                0.0
            },
            avg_latency_ms: if latency_count > 0 {
                Some(latency_sum / latency_count as u64)
            } else {
                None
            },
            zero_result_count: zero_results,
            days,
        })
    }

    /// Most common queries in the window, grouped case-insensitively
    pub fn common_queries(
        &self,
        project_id: Option<&str>,
        limit: usize,
        days: i64,
    ) -> Result<Vec<CommonQuery>> {
        let entries = self.entries_since(project_id, days)?;

        let mut groups: HashMap<String, (String, usize, usize, usize)> = HashMap::new();
        for entry in &entries {
            let key = entry.query_text.to_lowercase();
            let group = groups
                .entry(key)
                .or_insert_with(|| (entry.query_text.clone(), 0, 0, 0));
            group.1 += 1;
            if let Some(count) = entry.result_count {
                group.2 += count;
                group.3 += 1;
            }
        }

        let mut queries: Vec<CommonQuery> = groups
            .into_values()
            .map(|(query, count, results_sum, results_n)| CommonQuery {
                query,
                count,
                avg_results: if results_n > 0 { results_sum / results_n } else { 0 },
            })
            .collect();
        queries.sort_by(|a, b| b.count.cmp(&a.count));
        queries.truncate(limit);
        Ok(queries)
    }

    /// Queries that returned zero results in the window
    pub fn zero_result_queries(
        &self,
        project_id: Option<&str>,
        limit: usize,
        days: i64,
    ) -> Result<Vec<ZeroResultQuery>> {
        let entries = self.entries_since(project_id, days)?;

        let mut groups: HashMap<String, (String, Option<String>, usize)> = HashMap::new();
        for entry in entries
            .iter()
            .filter(|e| e.result_count == Some(0))
        {
            let key = entry.query_text.to_lowercase();
            let group = groups
                .entry(key)
                .or_insert_with(|| (entry.query_text.clone(), entry.interpretation.clone(), 0));
            group.2 += 1;
        }

        let mut queries: Vec<ZeroResultQuery> = groups
            .into_values()
            .map(|(query, interpretation, count)| ZeroResultQuery {
                query,
                interpretation,
                count,
            })
            .collect();
        queries.sort_by(|a, b| b.count.cmp(&a.count));
        queries.truncate(limit);
        Ok(queries)
    }

    fn entries_since(
        &self,
        project_id: Option<&str>,
        days: i64,
    ) -> Result<Vec<SearchLogEntry>> {
        let cutoff = Utc::now() - Duration::days(days);
        let cutoff_key = log_key_prefix(&cutoff);

        let mut entries = Vec::new();
        for item in self.tree.range(cutoff_key..) {
            let (_, value) = item?;
            let entry: SearchLogEntry = match bincode::deserialize(&value) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping undecodable query log entry: {}", e);
                    continue;
                }
            };
            if let Some(project) = project_id {
                if entry.project_id != project {
                    continue;
                }
            }
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Time-ordered unique key: millisecond timestamp plus a random suffix
fn log_key(timestamp: &DateTime<Utc>) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&(timestamp.timestamp_millis() as u64).to_be_bytes());
    key.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    key
}

/// Range boundary for a timestamp (sorts before every key at that instant)
fn log_key_prefix(timestamp: &DateTime<Utc>) -> Vec<u8> {
    (timestamp.timestamp_millis() as u64).to_be_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn logger(dir: &std::path::Path) -> QueryLogger {
        QueryLogger::open(&QueryLogConfig {
            db_path: PathBuf::from(dir).join("logs"),
            retention_days: 90,
        })
        .unwrap()
    }

    fn entry(project: &str, query: &str, mode: &str) -> SearchLogEntry {
        SearchLogEntry::new(project, query, mode)
    }

    #[test]
    fn stats_aggregate_modes_errors_and_latency() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());

        let mut smart = entry("proj", "asbestos", "smart");
        smart.result_count = Some(12);
        smart.llm_latency_ms = Some(400);
        smart.cache_hit = true;
        log.log_search(smart);

        let mut smart2 = entry("proj", "diesel", "smart");
        smart2.result_count = Some(0);
        smart2.llm_latency_ms = Some(600);
        log.log_search(smart2);

        let mut keyword = entry("proj", "ford", "keyword");
        keyword.result_count = Some(3);
        keyword.error_message = Some("index loading".to_string());
        log.log_search(keyword);

        let stats = log.search_stats(Some("proj"), 7).unwrap();
        assert_eq!(stats.total_searches, 3);
        assert_eq!(stats.by_mode["smart"], 2);
        assert_eq!(stats.by_mode["keyword"], 1);
        assert_eq!(stats.error_count, 1);
        assert!((stats.error_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((stats.cache_hit_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.avg_latency_ms, Some(500));
        assert_eq!(stats.zero_result_count, 1);
    }

    #[test]
    fn stats_filter_by_project() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());
        log.log_search(entry("alpha", "q1", "keyword"));
        log.log_search(entry("beta", "q2", "keyword"));

        let stats = log.search_stats(Some("alpha"), 7).unwrap();
        assert_eq!(stats.total_searches, 1);
        let all = log.search_stats(None, 7).unwrap();
        assert_eq!(all.total_searches, 2);
    }

    #[test]
    fn common_queries_group_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());

        for query in ["Asbestos", "asbestos", "ASBESTOS", "diesel"] {
            let mut e = entry("proj", query, "keyword");
            e.result_count = Some(10);
            log.log_search(e);
        }

        let common = log.common_queries(Some("proj"), 10, 7).unwrap();
        assert_eq!(common[0].count, 3);
        assert_eq!(common[0].query.to_lowercase(), "asbestos");
        assert_eq!(common[0].avg_results, 10);
        assert_eq!(common.len(), 2);
    }

    #[test]
    fn zero_result_queries_listed() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());

        let mut miss = entry("proj", "unfindable phrase", "smart");
        miss.result_count = Some(0);
        miss.interpretation = Some("looking for something absent".to_string());
        log.log_search(miss);

        let mut hit = entry("proj", "asbestos", "smart");
        hit.result_count = Some(5);
        log.log_search(hit);

        let zero = log.zero_result_queries(Some("proj"), 10, 7).unwrap();
        assert_eq!(zero.len(), 1);
        assert_eq!(zero[0].query, "unfindable phrase");
        assert!(zero[0].interpretation.is_some());
    }

    #[test]
    fn cleanup_removes_only_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());

        let mut old = entry("proj", "ancient", "keyword");
        old.timestamp = Utc::now() - Duration::days(120);
        // bypass log_search to keep the constructed timestamp
        log.record(&old).unwrap();
        log.log_search(entry("proj", "fresh", "keyword"));

        let removed = log.cleanup_old_logs().unwrap();
        assert_eq!(removed, 1);
        let stats = log.search_stats(None, 365).unwrap();
        assert_eq!(stats.total_searches, 1);
    }
}
