//! # Blob Sync Module
//!
//! ## Purpose
//! Pulls a project's extracted index down from blob storage at startup and
//! mints signed, time-limited links for serving source files. The blob
//! provider itself is an external collaborator reduced to an HTTP base URL
//! plus a `manifest.json` per project.
//!
//! ## Input/Output Specification
//! - **Input**: `{base_url}/{project_id}/manifest.json` (a JSON array of
//!   relative file paths) and the listed files
//! - **Output**: Files written under the project's index folder; per-project
//!   download status observable by request handlers
//! - **Signing**: HMAC-SHA256 over `project/path:expires`, hex-encoded,
//!   verified in constant time
//!
//! ## Key Features
//! - Background downloads with bounded concurrency, first-writer-wins
//! - Manifest paths confined to the index folder (no `..`, no absolute)
//! - Download failures flagged per project, never fatal to startup

use crate::config::{BlobConfig, ProjectConfig};
use crate::errors::{Result, SearchError};
use crate::utils::ValidationUtils;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Observable state of one project's index download
#[derive(Debug, Clone)]
pub enum DownloadState {
    Downloading,
    Done { files: usize },
    Failed(String),
}

impl DownloadState {
    pub fn label(&self) -> &'static str {
        match self {
            DownloadState::Downloading => "downloading",
            DownloadState::Done { .. } => "done",
            DownloadState::Failed(_) => "failed",
        }
    }
}

/// A minted signed link for one source file
#[derive(Debug, Clone, Serialize)]
pub struct SignedLink {
    pub url: String,
    pub expires: i64,
}

/// Blob storage sync and signed file links. Clones share download status.
#[derive(Clone)]
pub struct BlobSync {
    config: Arc<BlobConfig>,
    client: reqwest::Client,
    status: Arc<DashMap<String, DownloadState>>,
}

impl BlobSync {
    pub fn new(config: BlobConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SearchError::Internal {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            config: Arc::new(config),
            client,
            status: Arc::new(DashMap::new()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Current download state for a project
    pub fn state(&self, project_id: &str) -> Option<DownloadState> {
        self.status.get(project_id).map(|s| s.clone())
    }

    /// Start background downloads for every project (startup path)
    pub fn start_all(&self, projects: &[ProjectConfig]) {
        if !self.config.enabled {
            return;
        }
        for project in projects {
            self.start_download(project.clone());
        }
    }

    /// Kick off one project's download unless one is already running
    /// (first-writer-wins)
    pub fn start_download(&self, project: ProjectConfig) {
        match self.status.entry(project.id.clone()) {
            Entry::Occupied(mut slot) => {
                if matches!(slot.get(), DownloadState::Downloading) {
                    return;
                }
                slot.insert(DownloadState::Downloading);
            }
            Entry::Vacant(slot) => {
                slot.insert(DownloadState::Downloading);
            }
        }

        let sync = self.clone();
        tokio::spawn(async move {
            let id = project.id.clone();
            match sync.download_index(&project).await {
                Ok(files) => {
                    tracing::info!("Downloaded {} index files for project '{}'", files, id);
                    sync.status.insert(id, DownloadState::Done { files });
                }
                Err(e) => {
                    tracing::error!("Index download failed for project '{}': {}", id, e);
                    sync.status.insert(id, DownloadState::Failed(e.to_string()));
                }
            }
        });
    }

    /// Fetch the manifest and download every listed file into the project's
    /// index folder
    pub async fn download_index(&self, project: &ProjectConfig) -> Result<usize> {
        let base = self.config.base_url.trim_end_matches('/');
        let manifest_url = format!("{}/{}/manifest.json", base, project.id);

        let response = self.client.get(&manifest_url).send().await.map_err(|e| {
            SearchError::BlobSyncFailed {
                project_id: project.id.clone(),
                details: format!("manifest fetch failed: {}", e),
            }
        })?;
        if !response.status().is_success() {
            return Err(SearchError::BlobSyncFailed {
                project_id: project.id.clone(),
                details: format!("manifest fetch returned HTTP {}", response.status()),
            });
        }

        let manifest: Vec<String> =
            response
                .json()
                .await
                .map_err(|e| SearchError::BlobSyncFailed {
                    project_id: project.id.clone(),
                    details: format!("malformed manifest: {}", e),
                })?;

        let files: Vec<String> = manifest
            .into_iter()
            .filter(|f| {
                let safe = ValidationUtils::is_safe_relative_path(f);
                if !safe {
                    tracing::warn!("Ignoring unsafe manifest path: {}", f);
                }
                safe
            })
            .collect();

        let file_count = files.len();
        let results: Vec<Result<()>> = stream::iter(files.into_iter().map(|file| {
            let url = format!("{}/{}/{}", base, project.id, file);
            let target = project.index_folder.join(&file);
            self.download_file(url, target)
        }))
        .buffer_unordered(self.config.max_concurrent_downloads.max(1))
        .collect()
        .await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            return Err(SearchError::BlobSyncFailed {
                project_id: project.id.clone(),
                details: format!("{} of {} files failed to download", failures, file_count),
            });
        }

        Ok(file_count)
    }

    async fn download_file(&self, url: String, target: std::path::PathBuf) -> Result<()> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SearchError::NetworkError {
                details: format!("{}: {}", url, e),
            })?;
        if !response.status().is_success() {
            return Err(SearchError::NetworkError {
                details: format!("{} returned HTTP {}", url, response.status()),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SearchError::NetworkError {
                details: format!("{}: {}", url, e),
            })?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;
        Ok(())
    }

    /// Mint a signed link for one source file
    pub fn sign_file_link(&self, project_id: &str, path: &str) -> Result<SignedLink> {
        if !ValidationUtils::is_safe_relative_path(path) {
            return Err(SearchError::ForbiddenPath {
                path: path.to_string(),
            });
        }
        let expires = chrono::Utc::now().timestamp() + self.config.link_expiry_seconds as i64;
        let signature = self.signature_for(project_id, path, expires)?;
        Ok(SignedLink {
            url: format!(
                "/api/file/{}/{}?expires={}&sig={}",
                project_id, path, expires, signature
            ),
            expires,
        })
    }

    /// Verify a signed link's signature and expiry
    pub fn verify_file_link(
        &self,
        project_id: &str,
        path: &str,
        expires: i64,
        signature: &str,
    ) -> Result<()> {
        if chrono::Utc::now().timestamp() > expires {
            return Err(SearchError::AuthenticationFailed {
                reason: "link expired".to_string(),
            });
        }
        let mut mac = self.mac()?;
        mac.update(payload(project_id, path, expires).as_bytes());
        let raw = hex::decode(signature).map_err(|_| SearchError::AuthenticationFailed {
            reason: "malformed signature".to_string(),
        })?;
        mac.verify_slice(&raw)
            .map_err(|_| SearchError::AuthenticationFailed {
                reason: "signature mismatch".to_string(),
            })
    }

    fn signature_for(&self, project_id: &str, path: &str, expires: i64) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(payload(project_id, path, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self) -> Result<HmacSha256> {
        if self.config.signing_secret.is_empty() {
            return Err(SearchError::AuthenticationFailed {
                reason: "no signing secret configured".to_string(),
            });
        }
        HmacSha256::new_from_slice(self.config.signing_secret.as_bytes()).map_err(|e| {
            SearchError::Internal {
                message: format!("HMAC key error: {}", e),
            }
        })
    }
}

fn payload(project_id: &str, path: &str, expires: i64) -> String {
    format!("{}/{}:{}", project_id, path, expires)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn blob_config(base_url: &str) -> BlobConfig {
        BlobConfig {
            enabled: true,
            base_url: base_url.to_string(),
            signing_secret: "test-secret".to_string(),
            link_expiry_seconds: 3600,
            max_concurrent_downloads: 4,
        }
    }

    fn test_project(index_folder: PathBuf) -> ProjectConfig {
        ProjectConfig {
            id: "lung-disease".to_string(),
            name: "Lung Disease".to_string(),
            description: String::new(),
            source_folder: PathBuf::from("/unused"),
            index_folder,
            preload: false,
        }
    }

    #[test]
    fn signed_links_roundtrip() {
        let sync = BlobSync::new(blob_config("http://unused")).unwrap();
        let link = sync.sign_file_link("lung-disease", "reports/brief.pdf").unwrap();

        let sig = link
            .url
            .split("sig=")
            .nth(1)
            .unwrap()
            .to_string();
        assert!(sync
            .verify_file_link("lung-disease", "reports/brief.pdf", link.expires, &sig)
            .is_ok());

        // tampered path fails
        assert!(sync
            .verify_file_link("lung-disease", "reports/other.pdf", link.expires, &sig)
            .is_err());
        // tampered expiry fails
        assert!(sync
            .verify_file_link("lung-disease", "reports/brief.pdf", link.expires + 1, &sig)
            .is_err());
    }

    #[test]
    fn expired_links_are_rejected() {
        let sync = BlobSync::new(blob_config("http://unused")).unwrap();
        let expires = chrono::Utc::now().timestamp() - 10;
        let sig = sync
            .signature_for("lung-disease", "brief.pdf", expires)
            .unwrap();
        let err = sync
            .verify_file_link("lung-disease", "brief.pdf", expires, &sig)
            .unwrap_err();
        assert!(matches!(err, SearchError::AuthenticationFailed { .. }));
    }

    #[test]
    fn traversal_paths_cannot_be_signed() {
        let sync = BlobSync::new(blob_config("http://unused")).unwrap();
        assert!(matches!(
            sync.sign_file_link("lung-disease", "../secrets.txt"),
            Err(SearchError::ForbiddenPath { .. })
        ));
    }

    #[tokio::test]
    async fn downloads_manifest_listed_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/lung-disease/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                "metadata.json",
                "texts/brief.json",
                "../escape.json"
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/lung-disease/metadata.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"total_docs\": 1}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/lung-disease/texts/brief.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let sync = BlobSync::new(blob_config(&server.uri())).unwrap();
        let project = test_project(dir.path().to_path_buf());

        // the unsafe manifest entry is ignored, the rest download
        let files = sync.download_index(&project).await.unwrap();
        assert_eq!(files, 2);
        assert!(dir.path().join("metadata.json").exists());
        assert!(dir.path().join("texts/brief.json").exists());
        assert!(!dir.path().join("../escape.json").exists());
    }

    #[tokio::test]
    async fn missing_manifest_is_a_sync_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/lung-disease/manifest.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let sync = BlobSync::new(blob_config(&server.uri())).unwrap();
        let project = test_project(dir.path().to_path_buf());

        let err = sync.download_index(&project).await.unwrap_err();
        assert!(matches!(err, SearchError::BlobSyncFailed { .. }));
    }
}
