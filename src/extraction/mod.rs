//! # Extraction Pipeline Module
//!
//! ## Purpose
//! Converts office documents into the flat per-page JSON index consumed by
//! the search engine. One extractor per format, all producing the same
//! document shape; the pipeline walks a project's source folder, dispatches
//! by extension, and merges aggregate stats into `metadata.json`.
//!
//! ## Input/Output Specification
//! - **Input**: Project source folder, extraction kinds, reindex flag
//! - **Output**: `<index_folder>/texts/<file>.json` per document plus an
//!   updated `<index_folder>/metadata.json`
//! - **Errors**: counted per file, never fatal to the batch
//!
//! ## Key Features
//! - Case-insensitive extension matching, recursive walk
//! - Documents already extracted are skipped unless reindexing
//! - Per-kind processed/skipped/error/page counters

pub mod email;
pub mod excel;
pub mod html;
pub mod pdf;
pub mod word;

use crate::config::{ExtractionConfig, ProjectConfig};
use crate::errors::{Result, SearchError};
use crate::index::{IndexMetadata, KindStats};
use crate::{Document, FileType, Page};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A document format the pipeline can extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    Pdf,
    Excel,
    Word,
    Email,
    Html,
}

impl ExtractionKind {
    pub fn all() -> [ExtractionKind; 5] {
        [
            ExtractionKind::Pdf,
            ExtractionKind::Excel,
            ExtractionKind::Word,
            ExtractionKind::Email,
            ExtractionKind::Html,
        ]
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(ExtractionKind::Pdf),
            "excel" => Some(ExtractionKind::Excel),
            "word" => Some(ExtractionKind::Word),
            "email" => Some(ExtractionKind::Email),
            "html" => Some(ExtractionKind::Html),
            _ => None,
        }
    }

    pub fn file_type(&self) -> FileType {
        match self {
            ExtractionKind::Pdf => FileType::Pdf,
            ExtractionKind::Excel => FileType::Excel,
            ExtractionKind::Word => FileType::Word,
            ExtractionKind::Email => FileType::Email,
            ExtractionKind::Html => FileType::Html,
        }
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self {
            ExtractionKind::Pdf => &["pdf"],
            ExtractionKind::Excel => &["xls", "xlsx", "xlsm", "xlsb"],
            ExtractionKind::Word => &["docx"],
            ExtractionKind::Email => &["eml"],
            ExtractionKind::Html => &["html", "htm"],
        }
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .map(|e| self.extensions().contains(&e.as_str()))
            .unwrap_or(false)
    }
}

/// Extraction pipeline over a project's source folder
pub struct ExtractionPipeline {
    config: ExtractionConfig,
}

impl ExtractionPipeline {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract the given formats for one project. Returns per-kind stats.
    pub fn extract_project(
        &self,
        project: &ProjectConfig,
        kinds: &[ExtractionKind],
        reindex: bool,
    ) -> Result<HashMap<String, KindStats>> {
        if !project.source_folder.exists() {
            return Err(SearchError::SourceFolderMissing {
                path: project.source_folder.display().to_string(),
            });
        }

        let texts_folder = project.index_folder.join("texts");
        std::fs::create_dir_all(&texts_folder)?;

        let mut all_stats = HashMap::new();
        for kind in kinds {
            let stats = self.extract_kind(project, *kind, &texts_folder, reindex)?;
            tracing::info!(
                "Extraction ({}) for project '{}': {} processed, {} skipped, {} errors, {} pages",
                kind.file_type(),
                project.id,
                stats.processed,
                stats.skipped,
                stats.errors,
                stats.pages
            );
            all_stats.insert(kind.file_type().as_str().to_string(), stats);
        }

        self.write_metadata(project, &texts_folder, &all_stats)?;
        Ok(all_stats)
    }

    fn extract_kind(
        &self,
        project: &ProjectConfig,
        kind: ExtractionKind,
        texts_folder: &Path,
        reindex: bool,
    ) -> Result<KindStats> {
        let mut files: Vec<PathBuf> = WalkDir::new(&project.source_folder)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| kind.matches(path))
            .collect();
        files.sort();

        tracing::info!(
            "Found {} {} files under {:?}",
            files.len(),
            kind.file_type(),
            project.source_folder
        );

        let mut stats = KindStats::default();

        for path in files {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unnamed")
                .to_string();
            // Full file name keeps pdf/xlsx siblings with the same stem apart
            let output_file = texts_folder.join(format!("{}.json", filename));

            if output_file.exists() && !reindex {
                stats.skipped += 1;
                continue;
            }

            let pages = match self.extract_file(kind, &path) {
                Ok(pages) => pages,
                Err(e) => {
                    tracing::warn!("{}", e);
                    stats.errors += 1;
                    continue;
                }
            };

            let doc = Document {
                filename,
                path: relative_path(&path, &project.source_folder),
                file_type: kind.file_type(),
                pages,
            };

            let json = serde_json::to_string_pretty(&doc)?;
            std::fs::write(&output_file, json)?;

            stats.pages += doc.pages.len();
            stats.processed += 1;
        }

        Ok(stats)
    }

    fn extract_file(&self, kind: ExtractionKind, path: &Path) -> Result<Vec<Page>> {
        match kind {
            ExtractionKind::Pdf => pdf::extract_pdf(path),
            ExtractionKind::Excel => excel::extract_excel(path, self.config.excel_max_rows),
            ExtractionKind::Word => word::extract_word(path),
            ExtractionKind::Email => email::extract_email(path),
            ExtractionKind::Html => html::extract_html(path),
        }
    }

    /// Merge this run's stats into metadata.json, recounting documents from
    /// what is actually on disk
    fn write_metadata(
        &self,
        project: &ProjectConfig,
        texts_folder: &Path,
        run_stats: &HashMap<String, KindStats>,
    ) -> Result<()> {
        let metadata_file = project.index_folder.join("metadata.json");

        let mut metadata: IndexMetadata = match std::fs::read_to_string(&metadata_file) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => IndexMetadata::default(),
        };

        for (kind, stats) in run_stats {
            metadata.by_kind.insert(kind.clone(), stats.clone());
        }

        metadata.source_folder = Some(project.source_folder.display().to_string());
        metadata.extracted_at = Some(chrono::Utc::now());
        metadata.total_docs = std::fs::read_dir(texts_folder)?
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path().extension().and_then(|x| x.to_str()) == Some("json")
            })
            .count();
        metadata.total_pages = metadata.by_kind.values().map(|s| s.pages).sum();

        let json = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(&metadata_file, json)?;
        Ok(())
    }
}

fn relative_path(path: &Path, source_folder: &Path) -> String {
    path.strip_prefix(source_folder)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;

    fn fixture_project(dir: &Path) -> ProjectConfig {
        let source = dir.join("source");
        std::fs::create_dir_all(source.join("nested")).unwrap();
        std::fs::write(
            source.join("report.html"),
            "<html><body>asbestos exposure on site</body></html>",
        )
        .unwrap();
        std::fs::write(
            source.join("nested").join("UPPER.HTML"),
            "<html><body>diesel emissions audit</body></html>",
        )
        .unwrap();
        std::fs::write(source.join("broken.pdf"), "not a real pdf").unwrap();
        std::fs::write(source.join("ignored.txt"), "plain text").unwrap();

        ProjectConfig {
            id: "fixtures".to_string(),
            name: "Fixtures".to_string(),
            description: String::new(),
            source_folder: source,
            index_folder: dir.join("index"),
            preload: false,
        }
    }

    #[test]
    fn pipeline_writes_documents_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let project = fixture_project(dir.path());
        let pipeline = ExtractionPipeline::new(ExtractionConfig::default());

        let stats = pipeline
            .extract_project(&project, &[ExtractionKind::Html], false)
            .unwrap();

        let html_stats = &stats["html"];
        assert_eq!(html_stats.processed, 2); // extension matching is case-insensitive
        assert_eq!(html_stats.errors, 0);
        assert_eq!(html_stats.pages, 2);

        let texts = project.index_folder.join("texts");
        let doc: Document = serde_json::from_str(
            &std::fs::read_to_string(texts.join("report.html.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(doc.file_type, FileType::Html);
        assert!(doc.pages[0].text.contains("asbestos"));

        let nested: Document = serde_json::from_str(
            &std::fs::read_to_string(texts.join("UPPER.HTML.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(nested.path, format!("nested{}UPPER.HTML", std::path::MAIN_SEPARATOR));

        let metadata: IndexMetadata = serde_json::from_str(
            &std::fs::read_to_string(project.index_folder.join("metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata.total_docs, 2);
        assert!(metadata.extracted_at.is_some());
    }

    #[test]
    fn per_file_errors_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let project = fixture_project(dir.path());
        let pipeline = ExtractionPipeline::new(ExtractionConfig::default());

        let stats = pipeline
            .extract_project(&project, &[ExtractionKind::Pdf], false)
            .unwrap();
        let pdf_stats = &stats["pdf"];
        assert_eq!(pdf_stats.processed, 0);
        assert_eq!(pdf_stats.errors, 1);
    }

    #[test]
    fn already_extracted_documents_are_skipped_unless_reindex() {
        let dir = tempfile::tempdir().unwrap();
        let project = fixture_project(dir.path());
        let pipeline = ExtractionPipeline::new(ExtractionConfig::default());

        let first = pipeline
            .extract_project(&project, &[ExtractionKind::Html], false)
            .unwrap();
        assert_eq!(first["html"].processed, 2);

        let second = pipeline
            .extract_project(&project, &[ExtractionKind::Html], false)
            .unwrap();
        assert_eq!(second["html"].processed, 0);
        assert_eq!(second["html"].skipped, 2);

        let third = pipeline
            .extract_project(&project, &[ExtractionKind::Html], true)
            .unwrap();
        assert_eq!(third["html"].processed, 2);
        assert_eq!(third["html"].skipped, 0);
    }

    #[test]
    fn missing_source_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectConfig {
            id: "ghost".to_string(),
            name: "Ghost".to_string(),
            description: String::new(),
            source_folder: dir.path().join("does-not-exist"),
            index_folder: dir.path().join("index"),
            preload: false,
        };
        let pipeline = ExtractionPipeline::new(ExtractionConfig::default());
        assert!(matches!(
            pipeline.extract_project(&project, &[ExtractionKind::Pdf], false),
            Err(SearchError::SourceFolderMissing { .. })
        ));
    }

    #[test]
    fn kind_parsing_and_extensions() {
        assert_eq!(ExtractionKind::parse("excel"), Some(ExtractionKind::Excel));
        assert_eq!(ExtractionKind::parse("msg"), None);
        assert!(ExtractionKind::Excel.matches(Path::new("/a/b/ledger.XLSX")));
        assert!(!ExtractionKind::Excel.matches(Path::new("/a/b/ledger.pdf")));
        assert!(ExtractionKind::Email.matches(Path::new("mail.eml")));
    }
}
