//! # Query Plan Types and Validation
//!
//! ## Purpose
//! Typed, sanitized representations of LLM query-parsing output. Raw model
//! JSON is never trusted: every field is sanitized, capped, and clamped
//! before it can reach the search engine.
//!
//! ## Input/Output Specification
//! - **Input**: Raw `serde_json::Value` parsed from the model response
//! - **Output**: Validated [`QueryPlan`] / [`QueryAnalysis`]
//! - **Guarantee**: a validated plan for a finding/specific query carries at
//!   least one required term, or validation fails

use crate::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query intent classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// List or extract entities from documents
    Extraction,
    /// Find documents about a topic
    Finding,
    /// Locate a specific item
    Specific,
}

/// Breadth of the generated search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Broad,
    Focused,
    Exhaustive,
}

/// Kind of date constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeType {
    Between,
    Before,
    After,
    Exact,
    None,
}

/// Structured date range for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub range_type: RangeType,
}

impl DateRange {
    pub fn none() -> Self {
        Self {
            start_year: None,
            end_year: None,
            range_type: RangeType::None,
        }
    }

    /// Whether this range constrains anything
    pub fn has_constraint(&self) -> bool {
        self.range_type != RangeType::None
            && (self.start_year.is_some() || self.end_year.is_some())
    }

    /// Whether a year satisfies the constraint
    pub fn contains_year(&self, year: i32) -> bool {
        match self.range_type {
            RangeType::None => false,
            RangeType::Between => {
                self.start_year.map_or(true, |s| year >= s)
                    && self.end_year.map_or(true, |e| year <= e)
            }
            RangeType::Before => self.end_year.map_or(false, |e| year <= e),
            RangeType::After => self.start_year.map_or(false, |s| year >= s),
            RangeType::Exact => self.start_year.map_or(false, |s| year == s),
        }
    }

    /// Human-readable description of the constraint
    pub fn describe(&self) -> String {
        if !self.has_constraint() {
            return String::new();
        }
        match (self.range_type, self.start_year, self.end_year) {
            (RangeType::Between, Some(s), Some(e)) => format!("between {} and {}", s, e),
            (RangeType::After, Some(s), _) => format!("after {}", s),
            (RangeType::Before, _, Some(e)) => format!("before {}", e),
            (RangeType::Exact, Some(s), _) => format!("in {}", s),
            _ => String::new(),
        }
    }
}

/// Validated, typed query plan from LLM output (v1 schema)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    pub required_terms: Vec<String>,
    pub optional_terms: Vec<String>,
    pub person_names: Vec<String>,
    pub locations: Vec<String>,
    pub date_hints: Vec<String>,
    pub interpretation: String,
    pub confidence: f64,
}

/// Query analysis with intent classification (v2 schema)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: Intent,
    pub extraction_target: Option<String>,
    /// Broad terms for locating candidate documents
    pub search_terms: Vec<String>,
    pub search_strategy: SearchStrategy,
    pub required_terms: Vec<String>,
    pub optional_terms: Vec<String>,
    pub person_names: Vec<String>,
    pub locations: Vec<String>,
    pub date_hints: Vec<String>,
    pub date_range: DateRange,
    pub interpretation: String,
    pub confidence: f64,
}

impl QueryAnalysis {
    pub fn is_extraction_query(&self) -> bool {
        self.intent == Intent::Extraction && self.extraction_target.is_some()
    }

    pub fn has_date_constraint(&self) -> bool {
        self.date_range.has_constraint()
    }
}

/// Sanitize a search term: alphanumeric, whitespace, and hyphens only,
/// trimmed and lowercased
pub fn sanitize_term(term: &str) -> String {
    let cleaned: String = term
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect();
    cleaned.trim().to_lowercase()
}

/// Read a field that the model may emit as either a string or a list
fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn sanitized_list(value: &Value, key: &str) -> Vec<String> {
    string_list(value, key)
        .iter()
        .map(|t| sanitize_term(t))
        .filter(|t| !t.is_empty())
        .collect()
}

fn clamp_confidence(value: &Value) -> f64 {
    value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.8)
        .clamp(0.0, 1.0)
}

fn capped_text(value: &Value, key: &str, max_chars: usize) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .chars()
        .take(max_chars)
        .collect()
}

/// Validate and sanitize LLM output into a [`QueryPlan`].
///
/// Caps: 15 optional terms, 3 person names, 3 locations, 2 date hints of at
/// most 20 chars, 20 terms total (trimmed from optional terms). If no
/// required term survives sanitization, person names then locations are
/// promoted; an empty result is a validation error.
pub fn validate_query_plan(raw: &Value) -> Result<QueryPlan> {
    let mut required = sanitized_list(raw, "required_terms");
    let mut optional: Vec<String> = sanitized_list(raw, "optional_terms");
    optional.truncate(15);
    let mut person_names = sanitized_list(raw, "person_names");
    person_names.truncate(3);
    let mut locations = sanitized_list(raw, "locations");
    locations.truncate(3);

    if required.is_empty() {
        if !person_names.is_empty() {
            required = person_names.clone();
        } else if !locations.is_empty() {
            required = locations.clone();
        }
    }

    if required.is_empty() {
        return Err(SearchError::LlmValidation {
            details: "no valid required terms extracted from query".to_string(),
        });
    }

    let date_hints: Vec<String> = string_list(raw, "date_hints")
        .iter()
        .map(|d| d.trim().chars().take(20).collect::<String>())
        .filter(|d| !d.is_empty())
        .take(2)
        .collect();

    // Total term cap of 20, trimmed from the optional side
    let fixed = required.len() + person_names.len() + locations.len();
    if fixed + optional.len() > 20 {
        optional.truncate(20usize.saturating_sub(fixed));
    }

    Ok(QueryPlan {
        required_terms: required,
        optional_terms: optional,
        person_names,
        locations,
        date_hints,
        interpretation: capped_text(raw, "interpretation", 200),
        confidence: clamp_confidence(raw),
    })
}

fn parse_intent(raw: &Value) -> Intent {
    match raw.get("intent").and_then(|v| v.as_str()) {
        Some("extraction") => Intent::Extraction,
        Some("specific") => Intent::Specific,
        _ => Intent::Finding,
    }
}

fn parse_strategy(raw: &Value) -> SearchStrategy {
    match raw.get("search_strategy").and_then(|v| v.as_str()) {
        Some("broad") => SearchStrategy::Broad,
        Some("exhaustive") => SearchStrategy::Exhaustive,
        _ => SearchStrategy::Focused,
    }
}

fn parse_year(value: Option<&Value>) -> Option<i32> {
    let year = match value {
        Some(Value::Number(n)) => n.as_i64().map(|y| y as i32),
        Some(Value::String(s)) => s.trim().parse::<i32>().ok(),
        _ => None,
    }?;
    // Sanity window for document dates
    if (1900..=2100).contains(&year) {
        Some(year)
    } else {
        None
    }
}

fn parse_date_range(raw: &Value) -> DateRange {
    let range = match raw.get("date_range") {
        Some(Value::Object(map)) => map,
        _ => return DateRange::none(),
    };
    let range_type = match range.get("range_type").and_then(|v| v.as_str()) {
        Some("between") => RangeType::Between,
        Some("before") => RangeType::Before,
        Some("after") => RangeType::After,
        Some("exact") => RangeType::Exact,
        _ => return DateRange::none(),
    };
    DateRange {
        start_year: parse_year(range.get("start_year")),
        end_year: parse_year(range.get("end_year")),
        range_type,
    }
}

/// Validate and sanitize LLM output into a [`QueryAnalysis`].
///
/// Wider caps than the v1 plan (5 persons, 5 locations, 3 date hints, 20
/// search terms). Extraction queries with no search terms fall back to
/// optional terms, then to generic document terms. Finding/specific queries
/// promote persons, locations, then search terms into required terms; if
/// nothing survives, validation fails.
pub fn validate_query_analysis(raw: &Value) -> Result<QueryAnalysis> {
    let intent = parse_intent(raw);

    let extraction_target = raw
        .get("extraction_target")
        .and_then(|v| v.as_str())
        .map(|t| t.chars().take(100).collect::<String>())
        .filter(|t| !t.is_empty());

    let mut search_terms = sanitized_list(raw, "search_terms");
    search_terms.truncate(20);

    let mut required = sanitized_list(raw, "required_terms");
    let mut optional = sanitized_list(raw, "optional_terms");
    optional.truncate(15);
    let mut person_names = sanitized_list(raw, "person_names");
    person_names.truncate(5);
    let mut locations = sanitized_list(raw, "locations");
    locations.truncate(5);

    let date_hints: Vec<String> = string_list(raw, "date_hints")
        .iter()
        .map(|d| d.trim().chars().take(20).collect::<String>())
        .filter(|d| !d.is_empty())
        .take(3)
        .collect();

    let date_range = parse_date_range(raw);
    if date_range.has_constraint() {
        tracing::debug!("Parsed date range: {}", date_range.describe());
    }

    // Extraction queries always need something to scan for
    if intent == Intent::Extraction && search_terms.is_empty() {
        if !optional.is_empty() {
            search_terms = optional.iter().take(10).cloned().collect();
        } else {
            search_terms = vec![
                "document".to_string(),
                "report".to_string(),
                "file".to_string(),
            ];
        }
    }

    // Finding/specific queries need required terms; promote entities first
    if intent != Intent::Extraction && required.is_empty() {
        if !person_names.is_empty() {
            required = person_names.clone();
        } else if !locations.is_empty() {
            required = locations.clone();
        } else if !search_terms.is_empty() {
            required = search_terms.iter().take(3).cloned().collect();
        }
    }

    if intent != Intent::Extraction && required.is_empty() {
        return Err(SearchError::LlmValidation {
            details: "no valid required terms extracted from query".to_string(),
        });
    }

    let analysis = QueryAnalysis {
        intent,
        extraction_target,
        search_terms,
        search_strategy: parse_strategy(raw),
        required_terms: required,
        optional_terms: optional,
        person_names,
        locations,
        date_hints,
        date_range,
        interpretation: capped_text(raw, "interpretation", 300),
        confidence: clamp_confidence(raw),
    };

    tracing::debug!(
        "Validated analysis: intent={:?}, required={:?}, search_terms={:?}",
        analysis.intent,
        &analysis.required_terms,
        &analysis.search_terms
    );

    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_strips_punctuation_and_lowercases() {
        assert_eq!(sanitize_term("Asbestos!"), "asbestos");
        assert_eq!(sanitize_term("  Diesel-Emissions  "), "diesel-emissions");
        assert_eq!(sanitize_term("<script>"), "script");
        assert_eq!(sanitize_term("$$$"), "");
    }

    #[test]
    fn plan_requires_at_least_one_term() {
        let raw = json!({"required_terms": [], "optional_terms": []});
        assert!(matches!(
            validate_query_plan(&raw),
            Err(SearchError::LlmValidation { .. })
        ));
    }

    #[test]
    fn plan_promotes_person_names_then_locations() {
        let raw = json!({"required_terms": [], "person_names": ["John Smith"]});
        let plan = validate_query_plan(&raw).unwrap();
        assert_eq!(plan.required_terms, vec!["john smith"]);

        let raw = json!({"required_terms": [], "locations": ["Clydeside"]});
        let plan = validate_query_plan(&raw).unwrap();
        assert_eq!(plan.required_terms, vec!["clydeside"]);
    }

    #[test]
    fn plan_accepts_string_where_list_expected() {
        let raw = json!({"required_terms": "asbestos"});
        let plan = validate_query_plan(&raw).unwrap();
        assert_eq!(plan.required_terms, vec!["asbestos"]);
    }

    #[test]
    fn plan_caps_are_enforced() {
        let many: Vec<String> = (0..40).map(|i| format!("term{}", i)).collect();
        let raw = json!({
            "required_terms": ["asbestos"],
            "optional_terms": many,
            "person_names": ["a", "b", "c", "d", "e"],
            "locations": ["x", "y", "z", "w"],
            "date_hints": ["1990s", "before 2000", "after 1980"],
        });
        let plan = validate_query_plan(&raw).unwrap();
        assert!(plan.optional_terms.len() <= 15);
        assert_eq!(plan.person_names.len(), 3);
        assert_eq!(plan.locations.len(), 3);
        assert_eq!(plan.date_hints.len(), 2);
        let total = plan.required_terms.len()
            + plan.optional_terms.len()
            + plan.person_names.len()
            + plan.locations.len();
        assert!(total <= 20);
    }

    #[test]
    fn confidence_is_clamped() {
        let raw = json!({"required_terms": ["a"], "confidence": 7.5});
        assert_eq!(validate_query_plan(&raw).unwrap().confidence, 1.0);
        let raw = json!({"required_terms": ["a"], "confidence": -3.0});
        assert_eq!(validate_query_plan(&raw).unwrap().confidence, 0.0);
        let raw = json!({"required_terms": ["a"]});
        assert_eq!(validate_query_plan(&raw).unwrap().confidence, 0.8);
    }

    #[test]
    fn analysis_defaults_to_finding_intent() {
        let raw = json!({"intent": "nonsense", "required_terms": ["asbestos"]});
        let analysis = validate_query_analysis(&raw).unwrap();
        assert_eq!(analysis.intent, Intent::Finding);
        assert_eq!(analysis.search_strategy, SearchStrategy::Focused);
    }

    #[test]
    fn extraction_without_search_terms_falls_back() {
        let raw = json!({
            "intent": "extraction",
            "extraction_target": "company names",
            "search_terms": [],
            "optional_terms": ["ltd", "plc"],
        });
        let analysis = validate_query_analysis(&raw).unwrap();
        assert_eq!(analysis.search_terms, vec!["ltd", "plc"]);

        let raw = json!({
            "intent": "extraction",
            "extraction_target": "company names",
        });
        let analysis = validate_query_analysis(&raw).unwrap();
        assert_eq!(analysis.search_terms, vec!["document", "report", "file"]);
    }

    #[test]
    fn finding_without_any_terms_is_rejected() {
        let raw = json!({"intent": "finding"});
        assert!(matches!(
            validate_query_analysis(&raw),
            Err(SearchError::LlmValidation { .. })
        ));
    }

    #[test]
    fn date_range_years_validated() {
        let raw = json!({
            "required_terms": ["welder"],
            "date_range": {"start_year": 1970, "end_year": 1980, "range_type": "between"},
        });
        let analysis = validate_query_analysis(&raw).unwrap();
        assert!(analysis.has_date_constraint());
        assert!(analysis.date_range.contains_year(1975));
        assert!(!analysis.date_range.contains_year(1985));

        // out-of-window years are dropped
        let raw = json!({
            "required_terms": ["welder"],
            "date_range": {"start_year": 1492, "end_year": 9999, "range_type": "between"},
        });
        let analysis = validate_query_analysis(&raw).unwrap();
        assert!(!analysis.has_date_constraint());
    }

    #[test]
    fn date_range_describe() {
        let range = DateRange {
            start_year: Some(1970),
            end_year: Some(1980),
            range_type: RangeType::Between,
        };
        assert_eq!(range.describe(), "between 1970 and 1980");
        assert_eq!(DateRange::none().describe(), "");
    }
}
