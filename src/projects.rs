//! # Project Registry Module
//!
//! ## Purpose
//! Lookup and validation helpers for the document collections ("projects")
//! declared in configuration. Each project owns a source folder and an index
//! folder; handlers never touch a project whose id fails validation.

use crate::config::ProjectConfig;
use crate::errors::{Result, SearchError};
use regex::Regex;
use serde::Serialize;

/// Public-safe project fields for the picker UI
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Valid project id: lowercase alphanumeric with hyphens, not starting
/// with a hyphen
pub fn is_valid_project_id(id: &str) -> bool {
    let pattern = Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap();
    pattern.is_match(id)
}

/// Look up a project by id. Invalid ids are rejected before the list is
/// consulted so they can never reach filesystem paths.
pub fn get_project<'a>(projects: &'a [ProjectConfig], id: &str) -> Result<&'a ProjectConfig> {
    if !is_valid_project_id(id) {
        return Err(SearchError::InvalidProjectId {
            project_id: id.to_string(),
        });
    }
    projects
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| SearchError::ProjectNotFound {
            project_id: id.to_string(),
        })
}

/// List all projects with public-safe fields
pub fn public_summaries(projects: &[ProjectConfig]) -> Vec<ProjectSummary> {
    projects
        .iter()
        .map(|p| ProjectSummary {
            id: p.id.clone(),
            name: p.name.clone(),
            description: p.description.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn project(id: &str) -> ProjectConfig {
        ProjectConfig {
            id: id.to_string(),
            name: format!("Project {}", id),
            description: String::new(),
            source_folder: PathBuf::from("/tmp/source"),
            index_folder: PathBuf::from("/tmp/index"),
            preload: false,
        }
    }

    #[test]
    fn valid_ids() {
        assert!(is_valid_project_id("lung-disease"));
        assert!(is_valid_project_id("emissions2024"));
        assert!(!is_valid_project_id("-leading-hyphen"));
        assert!(!is_valid_project_id("Upper"));
        assert!(!is_valid_project_id("has space"));
        assert!(!is_valid_project_id(""));
    }

    #[test]
    fn lookup_rejects_invalid_before_scanning() {
        let projects = vec![project("lung-disease")];
        assert!(matches!(
            get_project(&projects, "../etc"),
            Err(SearchError::InvalidProjectId { .. })
        ));
        assert!(matches!(
            get_project(&projects, "unknown"),
            Err(SearchError::ProjectNotFound { .. })
        ));
        assert!(get_project(&projects, "lung-disease").is_ok());
    }

    #[test]
    fn summaries_expose_public_fields_only() {
        let projects = vec![project("a"), project("b")];
        let summaries = public_summaries(&projects);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "a");
    }
}
