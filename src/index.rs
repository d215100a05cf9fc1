//! # Index Loading Module
//!
//! ## Purpose
//! Loads per-document JSON index files into memory and manages the
//! per-project index registry with asynchronous background preloading.
//!
//! ## Input/Output Specification
//! - **Input**: `<index_folder>/texts/*.json` (one file per document) and
//!   `<index_folder>/metadata.json`
//! - **Output**: In-memory [`ProjectIndex`] with recomputed totals
//! - **Loading**: one background load per project, first-writer-wins; the
//!   load state is observable by request handlers
//!
//! ## Key Features
//! - Malformed index files are skipped with a logged warning, never fatal
//! - Missing `file_type` defaults to `pdf` (older index files)
//! - Totals recomputed from what actually loaded
//! - Explicit reload drops the cached index and loads again

use crate::config::ProjectConfig;
use crate::errors::{Result, SearchError};
use crate::{projects, Document};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Aggregate stats written by the extraction pipeline and echoed by `/api/stats`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexMetadata {
    pub source_folder: Option<String>,
    pub total_docs: usize,
    pub total_pages: usize,
    pub extracted_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Per-format extraction stats, keyed by file type
    pub by_kind: HashMap<String, KindStats>,
}

/// Extraction counters for one document format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KindStats {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub pages: usize,
}

/// All documents of one project, held fully in memory
#[derive(Debug)]
pub struct ProjectIndex {
    pub documents: Vec<Document>,
    pub metadata: IndexMetadata,
}

impl ProjectIndex {
    pub fn total_docs(&self) -> usize {
        self.documents.len()
    }

    pub fn total_pages(&self) -> usize {
        self.documents.iter().map(|d| d.pages.len()).sum()
    }
}

/// Load one project's index from disk. Documents that fail to parse are
/// skipped with a warning; a missing texts folder yields an empty index.
pub async fn load_project_index(project: &ProjectConfig) -> Result<ProjectIndex> {
    let texts_folder = project.index_folder.join("texts");
    let metadata_file = project.index_folder.join("metadata.json");

    let mut metadata = load_metadata(&metadata_file).await;
    let mut documents = Vec::new();

    if texts_folder.exists() {
        let mut entries =
            tokio::fs::read_dir(&texts_folder)
                .await
                .map_err(|e| SearchError::IndexLoadFailed {
                    project_id: project.id.clone(),
                    details: format!("cannot read {:?}: {}", texts_folder, e),
                })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            SearchError::IndexLoadFailed {
                project_id: project.id.clone(),
                details: e.to_string(),
            }
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<Document>(&content) {
                    Ok(doc) => documents.push(doc),
                    Err(e) => {
                        tracing::warn!("Skipping malformed index file {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Skipping unreadable index file {:?}: {}", path, e);
                }
            }
        }
    } else {
        tracing::warn!(
            "Texts folder {:?} does not exist for project '{}'",
            texts_folder,
            project.id
        );
    }

    // Documents sorted by filename so pagination is deterministic across loads
    documents.sort_by(|a, b| a.filename.cmp(&b.filename));

    metadata.total_docs = documents.len();
    metadata.total_pages = documents.iter().map(|d| d.pages.len()).sum();

    tracing::info!(
        "Loaded index for project '{}': {} documents, {} pages",
        project.id,
        metadata.total_docs,
        metadata.total_pages
    );

    Ok(ProjectIndex {
        documents,
        metadata,
    })
}

async fn load_metadata(path: &Path) -> IndexMetadata {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Malformed metadata file {:?}: {}", path, e);
                IndexMetadata::default()
            }
        },
        Err(_) => IndexMetadata::default(),
    }
}

/// Observable load state of one project's index
#[derive(Clone)]
pub enum IndexState {
    Loading,
    Ready(Arc<ProjectIndex>),
    Failed(String),
}

impl IndexState {
    pub fn label(&self) -> &'static str {
        match self {
            IndexState::Loading => "loading",
            IndexState::Ready(_) => "ready",
            IndexState::Failed(_) => "failed",
        }
    }
}

/// Per-project index cache with background loading.
///
/// The first caller of [`IndexRegistry::ensure_loaded`] for a project spawns
/// the load task; every caller observes the current state until it becomes
/// `Ready` or `Failed`. Clones share the same slots.
#[derive(Clone)]
pub struct IndexRegistry {
    projects: Arc<Vec<ProjectConfig>>,
    slots: Arc<DashMap<String, IndexState>>,
}

impl IndexRegistry {
    pub fn new(projects: Vec<ProjectConfig>) -> Self {
        Self {
            projects: Arc::new(projects),
            slots: Arc::new(DashMap::new()),
        }
    }

    pub fn projects(&self) -> &[ProjectConfig] {
        &self.projects
    }

    /// Current state without triggering a load
    pub fn state(&self, project_id: &str) -> Option<IndexState> {
        self.slots.get(project_id).map(|s| s.clone())
    }

    /// Return the loaded index, or the observable in-progress state as an
    /// error. Starts the background load on first call (first-writer-wins).
    pub fn ensure_loaded(&self, project_id: &str) -> Result<IndexState> {
        let project = projects::get_project(&self.projects, project_id)?.clone();

        match self.slots.entry(project_id.to_string()) {
            Entry::Occupied(slot) => Ok(slot.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(IndexState::Loading);
                self.spawn_load(project);
                Ok(IndexState::Loading)
            }
        }
    }

    /// Drop the cached index and load again
    pub fn reload(&self, project_id: &str) -> Result<()> {
        let project = projects::get_project(&self.projects, project_id)?.clone();
        self.slots
            .insert(project_id.to_string(), IndexState::Loading);
        self.spawn_load(project);
        Ok(())
    }

    /// Kick off background loads for every project marked for preload
    pub fn preload_all(&self) {
        let ids: Vec<String> = self
            .projects
            .iter()
            .filter(|p| p.preload)
            .map(|p| p.id.clone())
            .collect();
        for id in ids {
            if let Err(e) = self.ensure_loaded(&id) {
                tracing::error!("Preload of project '{}' could not start: {}", id, e);
            }
        }
    }

    fn spawn_load(&self, project: ProjectConfig) {
        let slots = Arc::clone(&self.slots);
        tokio::spawn(async move {
            let id = project.id.clone();
            match load_project_index(&project).await {
                Ok(index) => {
                    slots.insert(id, IndexState::Ready(Arc::new(index)));
                }
                Err(e) => {
                    tracing::error!("Index load failed for project '{}': {}", id, e);
                    slots.insert(id, IndexState::Failed(e.to_string()));
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileType, Page};
    use std::path::PathBuf;
    use std::time::Duration;

    fn write_doc(texts: &Path, name: &str, body: serde_json::Value) {
        std::fs::write(texts.join(name), serde_json::to_string(&body).unwrap()).unwrap();
    }

    fn fixture_project(dir: &Path) -> ProjectConfig {
        let texts = dir.join("texts");
        std::fs::create_dir_all(&texts).unwrap();

        write_doc(
            &texts,
            "brief.json",
            serde_json::json!({
                "filename": "brief.pdf",
                "path": "brief.pdf",
                "pages": [
                    {"page_num": 1, "text": "asbestos exposure report"},
                    {"page_num": 2, "text": "second page"},
                ]
            }),
        );
        write_doc(
            &texts,
            "ledger.json",
            serde_json::json!({
                "filename": "ledger.xlsx",
                "path": "accounts/ledger.xlsx",
                "file_type": "excel",
                "pages": [
                    {"page_num": 1, "sheet_name": "Q1", "text": "invoice data"},
                ]
            }),
        );
        std::fs::write(texts.join("broken.json"), "{not valid json").unwrap();

        ProjectConfig {
            id: "test-project".to_string(),
            name: "Test".to_string(),
            description: String::new(),
            source_folder: dir.join("source"),
            index_folder: dir.to_path_buf(),
            preload: false,
        }
    }

    #[tokio::test]
    async fn loads_documents_and_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let project = fixture_project(dir.path());

        let index = load_project_index(&project).await.unwrap();
        assert_eq!(index.total_docs(), 2);
        assert_eq!(index.total_pages(), 3);
        assert_eq!(index.metadata.total_docs, 2);
        assert_eq!(index.metadata.total_pages, 3);
    }

    #[tokio::test]
    async fn missing_file_type_defaults_to_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let project = fixture_project(dir.path());

        let index = load_project_index(&project).await.unwrap();
        let brief = index
            .documents
            .iter()
            .find(|d| d.filename == "brief.pdf")
            .unwrap();
        assert_eq!(brief.file_type, FileType::Pdf);

        let ledger = index
            .documents
            .iter()
            .find(|d| d.filename == "ledger.xlsx")
            .unwrap();
        assert_eq!(ledger.file_type, FileType::Excel);
        assert_eq!(ledger.pages[0].sheet_name.as_deref(), Some("Q1"));
    }

    #[tokio::test]
    async fn empty_index_folder_yields_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectConfig {
            id: "empty".to_string(),
            name: "Empty".to_string(),
            description: String::new(),
            source_folder: PathBuf::from("/nonexistent"),
            index_folder: dir.path().to_path_buf(),
            preload: false,
        };
        let index = load_project_index(&project).await.unwrap();
        assert_eq!(index.total_docs(), 0);
        assert_eq!(index.total_pages(), 0);
    }

    #[tokio::test]
    async fn registry_reports_loading_then_ready() {
        let dir = tempfile::tempdir().unwrap();
        let project = fixture_project(dir.path());
        let registry = Arc::new(IndexRegistry::new(vec![project]));

        let first = registry.ensure_loaded("test-project").unwrap();
        assert!(matches!(first, IndexState::Loading));

        // poll until the background task completes
        let mut ready = None;
        for _ in 0..100 {
            if let Ok(IndexState::Ready(index)) = registry.ensure_loaded("test-project") {
                ready = Some(index);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let index = ready.expect("index never became ready");
        assert_eq!(index.total_docs(), 2);
    }

    #[tokio::test]
    async fn registry_rejects_unknown_project() {
        let registry = Arc::new(IndexRegistry::new(Vec::new()));
        assert!(matches!(
            registry.ensure_loaded("nope"),
            Err(SearchError::ProjectNotFound { .. })
        ));
        assert!(matches!(
            registry.ensure_loaded("Bad Id"),
            Err(SearchError::InvalidProjectId { .. })
        ));
    }

    #[test]
    fn page_struct_omits_absent_sheet_name() {
        let page = Page {
            page_num: 1,
            text: "hello".to_string(),
            sheet_name: None,
        };
        let json = serde_json::to_string(&page).unwrap();
        assert!(!json.contains("sheet_name"));
    }
}
