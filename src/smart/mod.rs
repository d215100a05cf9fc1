//! # Smart Search Module
//!
//! ## Purpose
//! LLM-assisted search: a free-text query is parsed by an external model
//! into a validated [`QueryAnalysis`] (intent, terms, entities, date range),
//! cached by content hash, and executed over the in-memory index with
//! additive weighted scoring normalized to 0-100.
//!
//! ## Input/Output Specification
//! - **Input**: Free-text query, optional project description, loaded index
//! - **Output**: Ranked page matches with 0-100 scores and the validated
//!   analysis that produced them
//! - **Fallback**: when disabled or unconfigured the caller runs keyword
//!   search instead
//!
//! ## Key Features
//! - 2 retries with linear backoff around the LLM call + validation
//! - Strict sanitization of model output before it reaches the scan
//! - TTL plan cache keyed by project + query content hash
//! - Scoring: per required term `min(count, 5) * 10`, optional term present
//!   `+5`, person name `+15`, location `+10`, in-range year `+10`,
//!   normalized against the theoretical maximum

pub mod cache;
pub mod client;
pub mod plan;
pub mod prompts;

pub use cache::PlanCache;
pub use client::{LlmClient, QueryModel};
pub use plan::{DateRange, Intent, QueryAnalysis, QueryPlan, SearchStrategy};

use crate::config::SmartSearchConfig;
use crate::errors::{Result, SearchError};
use crate::index::ProjectIndex;
use crate::search::{compile_terms, extract_context, TermMatcher};
use crate::{Document, FileType, Page};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Occurrences of a single term counted toward the score, capped so one
/// repetitive page cannot dominate
const TERM_COUNT_CAP: usize = 5;
const REQUIRED_TERM_WEIGHT: usize = 10;
const OPTIONAL_TERM_BONUS: usize = 5;
const PERSON_NAME_BONUS: usize = 15;
const LOCATION_BONUS: usize = 10;
const DATE_RANGE_BONUS: usize = 10;

/// One page matched by smart search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartPageMatch {
    pub filename: String,
    pub filepath: String,
    pub file_type: FileType,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    pub context: String,
    /// Normalized relevance score, 0-100
    pub score: u32,
}

/// Smart search results plus the analysis that produced them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartSearchResponse {
    pub query: String,
    pub mode: String,
    pub analysis: QueryAnalysis,
    pub results: Vec<SmartPageMatch>,
    pub total_matches: usize,
    pub documents: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub has_more: bool,
    pub cache_hit: bool,
    pub llm_latency_ms: u64,
}

/// Smart search engine: query analysis via LLM plus weighted scoring
pub struct SmartSearchEngine {
    config: SmartSearchConfig,
    model: Option<Arc<dyn QueryModel>>,
    cache: PlanCache,
}

impl SmartSearchEngine {
    /// Build from configuration. When smart search is enabled but the client
    /// cannot be constructed (no API key), the engine degrades to
    /// unavailable and callers fall back to keyword search.
    pub fn new(config: SmartSearchConfig) -> Self {
        let model: Option<Arc<dyn QueryModel>> = if config.enabled {
            match LlmClient::new(&config) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::warn!("Smart search unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Self::with_model(config, model)
    }

    /// Construct with an explicit model backend (test seam)
    pub fn with_model(config: SmartSearchConfig, model: Option<Arc<dyn QueryModel>>) -> Self {
        let cache = PlanCache::new(
            Duration::from_secs(config.cache_ttl_seconds),
            config.cache_max_entries,
        );
        Self {
            config,
            model,
            cache,
        }
    }

    /// Whether smart search can answer queries right now
    pub fn is_available(&self) -> bool {
        self.config.enabled && self.model.is_some()
    }

    /// Analyze a query, serving from the plan cache when possible.
    /// Returns the analysis and whether it was a cache hit.
    pub async fn analyze(
        &self,
        project_id: &str,
        project_description: &str,
        query: &str,
    ) -> Result<(QueryAnalysis, bool)> {
        let key = PlanCache::key(project_id, query);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("Plan cache hit for query '{}'", query);
            return Ok((cached, true));
        }

        let analysis = self
            .complete_with_retries(
                prompts::INTENT_CLASSIFICATION_PROMPT,
                &user_message(project_description, query),
                plan::validate_query_analysis,
            )
            .await?;

        self.cache.insert(key, analysis.clone());
        Ok((analysis, false))
    }

    /// Parse a query into the flat v1 [`QueryPlan`] (no intent
    /// classification). Kept for callers that only need term extraction.
    pub async fn parse_plan(
        &self,
        project_description: &str,
        query: &str,
    ) -> Result<QueryPlan> {
        self.complete_with_retries(
            prompts::QUERY_PLAN_PROMPT,
            &user_message(project_description, query),
            plan::validate_query_plan,
        )
        .await
    }

    /// One model call plus JSON parse plus validation, retried as a unit
    /// with linear backoff. Validation failures are retried too: a second
    /// attempt often yields well-formed output.
    async fn complete_with_retries<T, F>(
        &self,
        system_prompt: &str,
        message: &str,
        validate: F,
    ) -> Result<T>
    where
        F: Fn(&serde_json::Value) -> Result<T>,
    {
        let model = self.model.as_ref().ok_or_else(|| SearchError::LlmNotConfigured {
            details: "smart search is disabled or has no API key".to_string(),
        })?;

        let mut last_error = SearchError::LlmService {
            details: "no attempts made".to_string(),
        };

        for attempt in 0..=self.config.max_retries {
            match model.complete(system_prompt, message).await {
                Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
                    Ok(raw) => match validate(&raw) {
                        Ok(value) => return Ok(value),
                        Err(e) => {
                            tracing::warn!(
                                "Model output failed validation (attempt {}): {}",
                                attempt + 1,
                                e
                            );
                            last_error = e;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(
                            "Model returned invalid JSON (attempt {}): {}",
                            attempt + 1,
                            e
                        );
                        last_error = SearchError::LlmValidation {
                            details: format!("invalid JSON from model: {}", e),
                        };
                    }
                },
                Err(e) => {
                    tracing::warn!("LLM call failed (attempt {}): {}", attempt + 1, e);
                    last_error = e;
                }
            }

            if attempt < self.config.max_retries {
                tokio::time::sleep(Duration::from_secs(2 * (attempt as u64 + 1))).await;
            }
        }

        Err(last_error)
    }

    /// Execute a validated analysis over the index
    pub fn search(
        &self,
        index: &ProjectIndex,
        analysis: &QueryAnalysis,
        query: &str,
        page: usize,
        per_page: usize,
    ) -> Result<SmartSearchResponse> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let scoring = ScoringPlan::build(analysis)?;

        let mut results: Vec<SmartPageMatch> = index
            .documents
            .par_iter()
            .flat_map_iter(|doc| {
                doc.pages
                    .iter()
                    .filter_map(|p| scoring.score_page(doc, p))
                    .collect::<Vec<_>>()
            })
            .collect();

        results.sort_by(|a, b| b.score.cmp(&a.score));

        let total_matches = results.len();
        let documents = results
            .iter()
            .map(|r| r.filename.as_str())
            .collect::<HashSet<_>>()
            .len();
        let total_pages = total_matches.div_ceil(per_page);

        let start = (page - 1) * per_page;
        let end = (start + per_page).min(total_matches);
        let paginated = if start < total_matches {
            results[start..end].to_vec()
        } else {
            Vec::new()
        };

        Ok(SmartSearchResponse {
            query: query.to_string(),
            mode: "smart".to_string(),
            analysis: analysis.clone(),
            results: paginated,
            total_matches,
            documents,
            page,
            per_page,
            total_pages,
            has_more: end < total_matches,
            cache_hit: false,
            llm_latency_ms: 0,
        })
    }
}

fn user_message(project_description: &str, query: &str) -> String {
    if project_description.is_empty() {
        format!("Search query: {}", query)
    } else {
        format!(
            "Document collection: {}\n\nSearch query: {}",
            project_description, query
        )
    }
}

/// Compiled matchers and weights for one analysis
struct ScoringPlan {
    /// Terms that gate a match; all must be present unless `gate_any`
    gating: Vec<TermMatcher>,
    /// Extraction queries match on any gating term (broad scan)
    gate_any: bool,
    optional: Vec<TermMatcher>,
    persons: Vec<TermMatcher>,
    locations: Vec<TermMatcher>,
    date_range: Option<DateRange>,
    year_regex: Regex,
    max_raw: usize,
    context_chars: usize,
}

impl ScoringPlan {
    fn build(analysis: &QueryAnalysis) -> Result<Self> {
        let gate_any = analysis.intent == Intent::Extraction;
        let gating_terms = if gate_any {
            &analysis.search_terms
        } else {
            &analysis.required_terms
        };
        if gating_terms.is_empty() {
            return Err(SearchError::LlmValidation {
                details: "analysis has no terms to match".to_string(),
            });
        }

        let gating = compile_terms(gating_terms)?;
        let optional = compile_terms(&analysis.optional_terms)?;
        let persons = compile_terms(&analysis.person_names)?;
        let locations = compile_terms(&analysis.locations)?;
        let date_range = analysis
            .has_date_constraint()
            .then(|| analysis.date_range.clone());

        let max_raw = gating.len() * TERM_COUNT_CAP * REQUIRED_TERM_WEIGHT
            + optional.len() * OPTIONAL_TERM_BONUS
            + persons.len() * PERSON_NAME_BONUS
            + locations.len() * LOCATION_BONUS
            + if date_range.is_some() {
                DATE_RANGE_BONUS
            } else {
                0
            };

        Ok(Self {
            gating,
            gate_any,
            optional,
            persons,
            locations,
            date_range,
            year_regex: Regex::new(r"\b(19|20)\d{2}\b").unwrap(),
            max_raw,
            context_chars: 100,
        })
    }

    fn score_page(&self, doc: &Document, page: &Page) -> Option<SmartPageMatch> {
        let text = &page.text;

        let gate_passes = if self.gate_any {
            self.gating.iter().any(|m| m.is_match(text))
        } else {
            self.gating.iter().all(|m| m.is_match(text))
        };
        if !gate_passes {
            return None;
        }

        let mut raw = 0usize;
        for matcher in &self.gating {
            raw += matcher.count(text).min(TERM_COUNT_CAP) * REQUIRED_TERM_WEIGHT;
        }
        for matcher in &self.optional {
            if matcher.is_match(text) {
                raw += OPTIONAL_TERM_BONUS;
            }
        }
        for matcher in &self.persons {
            if matcher.is_match(text) {
                raw += PERSON_NAME_BONUS;
            }
        }
        for matcher in &self.locations {
            if matcher.is_match(text) {
                raw += LOCATION_BONUS;
            }
        }
        if let Some(range) = &self.date_range {
            let in_range = self.year_regex.find_iter(text).any(|m| {
                m.as_str()
                    .parse::<i32>()
                    .map(|y| range.contains_year(y))
                    .unwrap_or(false)
            });
            if in_range {
                raw += DATE_RANGE_BONUS;
            }
        }

        let score = ((raw * 100) / self.max_raw.max(1)).min(100) as u32;

        // Context around the first gating term present on this page
        let first_match = self
            .gating
            .iter()
            .find_map(|m| m.first_match(text));
        let context = extract_context(text, first_match, self.context_chars);
        let mut all_matchers: Vec<&TermMatcher> = Vec::new();
        all_matchers.extend(self.gating.iter());
        all_matchers.extend(self.optional.iter());
        all_matchers.extend(self.persons.iter());
        all_matchers.extend(self.locations.iter());
        let context = all_matchers
            .iter()
            .fold(context, |acc, m| m.highlight(&acc));

        Some(SmartPageMatch {
            filename: doc.filename.clone(),
            filepath: doc.path.clone(),
            file_type: doc.file_type,
            page: page.page_num,
            sheet_name: page.sheet_name.clone(),
            context,
            score,
        })
    }
}
