//! # Keyword Search Engine Module
//!
//! ## Purpose
//! Linear-scan keyword search over an in-memory project index: tokenizes a
//! raw query into phrase and word terms, matches pages with AND semantics,
//! scores by total occurrence count, and returns ranked, paginated matches
//! with highlighted context snippets.
//!
//! ## Input/Output Specification
//! - **Input**: Raw query string, loaded [`ProjectIndex`], search options
//! - **Output**: [`SearchResponse`] with ranked page-level matches
//! - **Matching**: a page matches iff every term is a case-insensitive
//!   literal substring of the page text
//!
//! ## Key Features
//! - Quoted substrings (`"exact phrase"`) matched as a unit
//! - Score = total occurrences across all terms, descending
//! - Fixed-width context window around the first occurrence of the first
//!   term, with ellipsis markers when truncated
//! - Ceiling-division pagination
//! - Optional file-type filter applied before the scan
//! - Post-hoc `<mark>` highlighting on rendered context only

use crate::config::SearchEngineConfig;
use crate::errors::{Result, SearchError};
use crate::index::ProjectIndex;
use crate::{Document, FileType, Page};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// A single parsed query term with its case-insensitive literal matcher
pub struct TermMatcher {
    pub term: String,
    regex: Regex,
}

impl TermMatcher {
    fn new(term: String) -> Result<Self> {
        let regex = Regex::new(&format!("(?i){}", regex::escape(&term))).map_err(|e| {
            SearchError::Internal {
                message: format!("term regex failed to compile: {}", e),
            }
        })?;
        Ok(Self { term, regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Non-overlapping occurrence count
    pub fn count(&self, text: &str) -> usize {
        self.regex.find_iter(text).count()
    }

    /// Byte range of the first occurrence
    pub fn first_match(&self, text: &str) -> Option<std::ops::Range<usize>> {
        self.regex.find(text).map(|m| m.range())
    }

    /// Wrap every occurrence in the given text with `<mark>` tags
    pub fn highlight(&self, text: &str) -> String {
        self.regex.replace_all(text, "<mark>$0</mark>").into_owned()
    }
}

/// Split a raw query into normalized terms: quoted substrings become exact
/// phrase terms, the remaining whitespace-separated words become lowercase
/// terms. Returns an empty list for a blank query.
pub fn parse_query_terms(query: &str) -> Vec<String> {
    let phrase_re = Regex::new(r#""([^"]*)""#).unwrap();
    let mut terms = Vec::new();

    for cap in phrase_re.captures_iter(query) {
        let phrase = normalize_term(&cap[1]);
        if !phrase.is_empty() {
            terms.push(phrase);
        }
    }

    let remainder = phrase_re.replace_all(query, " ");
    for word in remainder.split_whitespace() {
        let word = normalize_term(word);
        if !word.is_empty() {
            terms.push(word);
        }
    }

    terms
}

fn normalize_term(term: &str) -> String {
    term.nfkc().collect::<String>().trim().to_lowercase()
}

/// Compile parsed terms into matchers
pub fn compile_terms(terms: &[String]) -> Result<Vec<TermMatcher>> {
    terms.iter().cloned().map(TermMatcher::new).collect()
}

/// Search options supplied by the request layer
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// 1-based result page
    pub page: usize,
    /// Override for the configured page size
    pub per_page: Option<usize>,
    /// Restrict the scan to one document format
    pub file_type: Option<FileType>,
}

/// One matched page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMatch {
    pub filename: String,
    pub filepath: String,
    pub file_type: FileType,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    /// Highlighted context snippet
    pub context: String,
    /// Total term occurrences on this page
    pub match_count: usize,
}

/// Ranked, paginated search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub total_matches: usize,
    /// Distinct documents with at least one matching page
    pub documents: usize,
    pub results: Vec<PageMatch>,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub has_more: bool,
}

impl SearchResponse {
    fn empty(query: &str, page: usize, per_page: usize) -> Self {
        Self {
            query: query.to_string(),
            total_matches: 0,
            documents: 0,
            results: Vec::new(),
            page,
            per_page,
            total_pages: 0,
            has_more: false,
        }
    }
}

/// Keyword search engine over in-memory project indexes
pub struct KeywordSearchEngine {
    config: SearchEngineConfig,
}

impl KeywordSearchEngine {
    pub fn new(config: SearchEngineConfig) -> Self {
        Self { config }
    }

    /// Run a keyword search over the given index
    pub fn search(
        &self,
        index: &ProjectIndex,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        let page = options.page.max(1);
        let per_page = options.per_page.unwrap_or(self.config.per_page).max(1);

        if query.len() > self.config.max_query_length {
            return Err(SearchError::InvalidSearchQuery {
                query: query.chars().take(80).collect(),
                reason: format!(
                    "query too long: maximum {} characters",
                    self.config.max_query_length
                ),
            });
        }

        let terms = parse_query_terms(query);
        if terms.is_empty() {
            return Ok(SearchResponse::empty(query, page, per_page));
        }
        let matchers = compile_terms(&terms)?;

        let mut results: Vec<PageMatch> = index
            .documents
            .par_iter()
            .filter(|doc| match options.file_type {
                Some(ft) => doc.file_type == ft,
                None => true,
            })
            .flat_map_iter(|doc| {
                doc.pages
                    .iter()
                    .filter_map(|p| self.match_page(doc, p, &matchers))
                    .collect::<Vec<_>>()
            })
            .collect();

        // Stable sort keeps document order for equal scores
        results.sort_by(|a, b| b.match_count.cmp(&a.match_count));

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

        Ok(SearchResponse {
            query: query.to_string(),
            total_matches,
            documents,
            results: paginated,
            page,
            per_page,
            total_pages,
            has_more: end < total_matches,
        })
    }

    fn match_page(
        &self,
        doc: &Document,
        page: &Page,
        matchers: &[TermMatcher],
    ) -> Option<PageMatch> {
        if !matchers.iter().all(|m| m.is_match(&page.text)) {
            return None;
        }

        let match_count: usize = matchers.iter().map(|m| m.count(&page.text)).sum();
        let context = extract_context(
            &page.text,
            matchers[0].first_match(&page.text),
            self.config.context_chars,
        );
        let context = highlight_terms(&context, matchers);

        Some(PageMatch {
            filename: doc.filename.clone(),
            filepath: doc.path.clone(),
            file_type: doc.file_type,
            page: page.page_num,
            sheet_name: page.sheet_name.clone(),
            context,
            match_count,
        })
    }
}

/// Extract a snippet of ±`context_chars` characters around the first match,
/// with `...` markers on truncated sides. Falls back to a 200-char prefix
/// when no match position is available.
pub fn extract_context(
    text: &str,
    first_match: Option<std::ops::Range<usize>>,
    context_chars: usize,
) -> String {
    let range = match first_match {
        Some(range) => range,
        None => {
            let prefix: String = text.chars().take(200).collect();
            return if prefix.len() < text.len() {
                format!("{}...", prefix)
            } else {
                prefix
            };
        }
    };

    // Walk back up to context_chars characters, staying on char boundaries
    let mut start = range.start;
    let mut taken = 0;
    for (i, _) in text[..range.start].char_indices().rev() {
        start = i;
        taken += 1;
        if taken == context_chars {
            break;
        }
    }

    // Walk forward up to context_chars characters past the match
    let mut end = range.end;
    let mut taken = 0;
    for (i, c) in text[range.end..].char_indices() {
        if taken == context_chars {
            break;
        }
        end = range.end + i + c.len_utf8();
        taken += 1;
    }

    let mut snippet = text[start..end].to_string();
    if start > 0 {
        snippet = format!("...{}", snippet);
    }
    if end < text.len() {
        snippet = format!("{}...", snippet);
    }
    snippet
}

/// Wrap each term occurrence in the rendered snippet with `<mark>` tags
pub fn highlight_terms(snippet: &str, matchers: &[TermMatcher]) -> String {
    let mut out = snippet.to_string();
    for matcher in matchers {
        out = matcher.highlight(&out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexMetadata, ProjectIndex};

    fn page(num: u32, text: &str) -> Page {
        Page {
            page_num: num,
            text: text.to_string(),
            sheet_name: None,
        }
    }

    fn doc(filename: &str, file_type: FileType, pages: Vec<Page>) -> Document {
        Document {
            filename: filename.to_string(),
            path: filename.to_string(),
            file_type,
            pages,
        }
    }

    fn fixture_index() -> ProjectIndex {
        ProjectIndex {
            documents: vec![
                doc(
                    "exposure.pdf",
                    FileType::Pdf,
                    vec![
                        page(1, "Asbestos exposure was recorded at the Clydeside yard."),
                        page(2, "No relevant findings on this page."),
                        page(
                            3,
                            "asbestos asbestos asbestos: repeated exposure to asbestos dust",
                        ),
                    ],
                ),
                doc(
                    "ledger.xlsx",
                    FileType::Excel,
                    vec![page(1, "Supplier: Clydeside Asbestos Ltd | Amount: 1200")],
                ),
            ],
            metadata: IndexMetadata::default(),
        }
    }

    fn engine() -> KeywordSearchEngine {
        KeywordSearchEngine::new(SearchEngineConfig::default())
    }

    #[test]
    fn parse_splits_words_and_phrases() {
        let terms = parse_query_terms(r#"Asbestos "Exposure Report" dust"#);
        assert_eq!(terms, vec!["exposure report", "asbestos", "dust"]);
    }

    #[test]
    fn parse_blank_query_yields_no_terms() {
        assert!(parse_query_terms("").is_empty());
        assert!(parse_query_terms("   ").is_empty());
        assert!(parse_query_terms(r#" "" "#).is_empty());
    }

    #[test]
    fn and_semantics_require_every_term() {
        let index = fixture_index();
        let response = engine()
            .search(&index, "asbestos clydeside", &SearchOptions::default())
            .unwrap();
        // only pages containing both terms match
        assert_eq!(response.total_matches, 2);
        for result in &response.results {
            let text = index
                .documents
                .iter()
                .find(|d| d.filename == result.filename)
                .unwrap()
                .pages
                .iter()
                .find(|p| p.page_num == result.page)
                .unwrap()
                .text
                .to_lowercase();
            assert!(text.contains("asbestos") && text.contains("clydeside"));
        }
    }

    #[test]
    fn results_ranked_by_occurrence_count() {
        let index = fixture_index();
        let response = engine()
            .search(&index, "asbestos", &SearchOptions::default())
            .unwrap();
        assert_eq!(response.total_matches, 3);
        assert_eq!(response.results[0].page, 3);
        assert_eq!(response.results[0].match_count, 4);
        let counts: Vec<usize> = response.results.iter().map(|r| r.match_count).collect();
        let mut sorted = counts.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(counts, sorted);
    }

    #[test]
    fn quoted_phrase_matches_as_a_unit() {
        let index = fixture_index();
        let hit = engine()
            .search(&index, r#""asbestos exposure""#, &SearchOptions::default())
            .unwrap();
        assert_eq!(hit.total_matches, 1);
        assert_eq!(hit.results[0].page, 1);

        let miss = engine()
            .search(&index, r#""exposure asbestos""#, &SearchOptions::default())
            .unwrap();
        assert_eq!(miss.total_matches, 0);
    }

    #[test]
    fn pagination_is_ceiling_division() {
        let pages: Vec<Page> = (1..=47)
            .map(|n| page(n, "asbestos everywhere"))
            .collect();
        let index = ProjectIndex {
            documents: vec![doc("big.pdf", FileType::Pdf, pages)],
            metadata: IndexMetadata::default(),
        };

        let options = SearchOptions {
            page: 1,
            per_page: Some(20),
            file_type: None,
        };
        let response = engine().search(&index, "asbestos", &options).unwrap();
        assert_eq!(response.total_matches, 47);
        assert_eq!(response.total_pages, 3); // ceil(47 / 20)
        assert_eq!(response.results.len(), 20);
        assert!(response.has_more);

        let last = SearchOptions {
            page: 3,
            per_page: Some(20),
            file_type: None,
        };
        let response = engine().search(&index, "asbestos", &last).unwrap();
        assert_eq!(response.results.len(), 7);
        assert!(!response.has_more);

        let beyond = SearchOptions {
            page: 9,
            per_page: Some(20),
            file_type: None,
        };
        let response = engine().search(&index, "asbestos", &beyond).unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.total_pages, 3);
    }

    #[test]
    fn file_type_filter_applied_before_matching() {
        let index = fixture_index();
        let options = SearchOptions {
            page: 1,
            per_page: None,
            file_type: Some(FileType::Excel),
        };
        let response = engine().search(&index, "asbestos", &options).unwrap();
        assert_eq!(response.total_matches, 1);
        assert_eq!(response.results[0].filename, "ledger.xlsx");
    }

    #[test]
    fn empty_query_returns_empty_result_set() {
        let index = fixture_index();
        let response = engine().search(&index, "  ", &SearchOptions::default()).unwrap();
        assert_eq!(response.total_matches, 0);
        assert_eq!(response.total_pages, 0);
        assert!(response.results.is_empty());
    }

    #[test]
    fn overlong_query_is_rejected() {
        let index = fixture_index();
        let query = "a".repeat(2000);
        assert!(matches!(
            engine().search(&index, &query, &SearchOptions::default()),
            Err(SearchError::InvalidSearchQuery { .. })
        ));
    }

    #[test]
    fn context_has_ellipsis_only_on_truncated_sides() {
        let text = format!("{}asbestos{}", "x".repeat(300), "y".repeat(300));
        let matchers = compile_terms(&["asbestos".to_string()]).unwrap();
        let snippet = extract_context(&text, matchers[0].first_match(&text), 100);
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));

        let short = "asbestos at the start";
        let snippet = extract_context(short, matchers[0].first_match(short), 100);
        assert!(!snippet.starts_with("..."));
        assert!(!snippet.ends_with("..."));
        assert_eq!(snippet, short);
    }

    #[test]
    fn context_respects_multibyte_boundaries() {
        let text = format!("{}asbestos{}", "é".repeat(150), "ü".repeat(150));
        let matchers = compile_terms(&["asbestos".to_string()]).unwrap();
        let snippet = extract_context(&text, matchers[0].first_match(&text), 100);
        assert!(snippet.contains("asbestos"));
        // trimmed to 100 chars each side plus markers
        assert!(snippet.chars().count() <= 100 + "asbestos".len() + 100 + 6);
    }

    #[test]
    fn highlighting_wraps_matches_case_insensitively() {
        let matchers = compile_terms(&["asbestos".to_string()]).unwrap();
        let out = highlight_terms("Asbestos and asbestos dust", &matchers);
        assert_eq!(out, "<mark>Asbestos</mark> and <mark>asbestos</mark> dust");
    }

    #[test]
    fn distinct_document_count_reported() {
        let index = fixture_index();
        let response = engine()
            .search(&index, "asbestos", &SearchOptions::default())
            .unwrap();
        assert_eq!(response.documents, 2);
    }
}
