//! # API Server Module
//!
//! ## Purpose
//! REST API server for the document search engine: session login, project
//! listing, keyword and smart search, statistics, and source file serving.
//!
//! ## Input/Output Specification
//! - **Input**: HTTP requests with queries, filters, pagination
//! - **Output**: JSON responses; `202 {status: "loading"}` while a project
//!   index loads in the background
//! - **Errors**: LLM failures map to distinct status codes (timeout 504,
//!   validation 422, service 502) with a `keyword_fallback` flag
//!
//! ## Key Features
//! - Bearer-token sessions; an empty configured password leaves the
//!   instance open for development
//! - Keyword fallback when smart search is disabled or unconfigured
//! - Signed time-limited file links as an alternative to a session
//! - Every search is recorded in the query log (failures never fail a search)

use crate::blob::DownloadState;
use crate::errors::{Result, SearchError};
use crate::index::IndexState;
use crate::projects;
use crate::query_log::SearchLogEntry;
use crate::search::SearchOptions;
use crate::utils::{Timer, ValidationUtils};
use crate::{AppState, FileType};
use actix_cors::Cors;
use actix_web::middleware::Condition;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Result as ActixResult};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory bearer-token session store
pub struct SessionStore {
    lifetime: Duration,
    tokens: RwLock<HashMap<String, Instant>>,
}

impl SessionStore {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Mint a new session token
    pub fn create(&self) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let mut tokens = self.tokens.write();
        let now = Instant::now();
        tokens.retain(|_, created| now.duration_since(*created) < self.lifetime);
        tokens.insert(token.clone(), now);
        token
    }

    /// Whether a token exists and has not expired
    pub fn validate(&self, token: &str) -> bool {
        let tokens = self.tokens.read();
        tokens
            .get(token)
            .map(|created| created.elapsed() < self.lifetime)
            .unwrap_or(false)
    }

    pub fn remove(&self, token: &str) {
        self.tokens.write().remove(token);
    }
}

/// API server wrapping the shared application state
pub struct ApiServer {
    app_state: AppState,
}

impl ApiServer {
    pub fn new(app_state: AppState) -> Self {
        Self { app_state }
    }

    /// Run the API server until shutdown
    pub async fn run(self) -> Result<()> {
        let config = self.app_state.config.clone();
        let bind_addr = format!("{}:{}", config.server.host, config.server.port);
        let app_state = self.app_state.clone();
        let enable_cors = config.server.enable_cors;

        tracing::info!("Starting API server on {}", bind_addr);

        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(app_state.clone()))
                .wrap(Condition::new(enable_cors, Cors::permissive()))
                .route("/api/login", web::post().to(login_handler))
                .route("/api/logout", web::post().to(logout_handler))
                .route("/api/projects", web::get().to(projects_handler))
                .route("/api/search", web::get().to(search_handler))
                .route("/api/smart-search", web::get().to(smart_search_handler))
                .route("/api/reload", web::post().to(reload_handler))
                .route("/api/stats", web::get().to(stats_handler))
                .route("/api/search-stats", web::get().to(search_stats_handler))
                .route("/api/file-link", web::get().to(file_link_handler))
                .route("/api/file/{project}/{path:.*}", web::get().to(file_handler))
                .route("/health", web::get().to(health_handler))
                .route("/", web::get().to(index_handler))
        })
        .workers(config.server.workers.max(1))
        .bind(&bind_addr)
        .map_err(|e| SearchError::Internal {
            message: format!("Failed to bind server to {}: {}", bind_addr, e),
        })?
        .run();

        server.await.map_err(|e| SearchError::Internal {
            message: format!("Server error: {}", e),
        })?;

        Ok(())
    }
}

/// Extract the session token from an Authorization header or cookie
fn session_token(req: &HttpRequest) -> Option<String> {
    if let Some(header) = req.headers().get("Authorization") {
        if let Ok(value) = header.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    req.cookie("session").map(|c| c.value().to_string())
}

/// Check authentication; an empty configured password leaves the instance
/// open (development mode, as the original deployment behaves)
fn is_authorized(req: &HttpRequest, state: &AppState) -> bool {
    if state.config.server.app_password.is_empty() {
        return true;
    }
    session_token(req)
        .map(|t| state.sessions.validate(&t))
        .unwrap_or(false)
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(serde_json::json!({
        "error": "authentication required"
    }))
}

/// Map a search error to its HTTP response. LLM errors surface as distinct
/// status codes with a keyword-fallback flag so the UI can rerun the query.
fn error_response(err: &SearchError) -> HttpResponse {
    let body = serde_json::json!({
        "error": err.to_string(),
        "category": err.category(),
    });
    match err {
        SearchError::LlmTimeout { .. } => HttpResponse::GatewayTimeout().json(serde_json::json!({
            "error": err.to_string(),
            "error_kind": "timeout",
            "keyword_fallback": true,
        })),
        SearchError::LlmValidation { .. } => {
            HttpResponse::UnprocessableEntity().json(serde_json::json!({
                "error": err.to_string(),
                "error_kind": "validation",
                "keyword_fallback": true,
            }))
        }
        SearchError::LlmService { .. } | SearchError::LlmNotConfigured { .. } => {
            HttpResponse::BadGateway().json(serde_json::json!({
                "error": err.to_string(),
                "error_kind": "service",
                "keyword_fallback": true,
            }))
        }
        SearchError::ProjectNotFound { .. } | SearchError::InvalidProjectId { .. } => {
            HttpResponse::NotFound().json(body)
        }
        SearchError::IndexLoading { .. } => HttpResponse::Accepted().json(serde_json::json!({
            "status": "loading"
        })),
        SearchError::AuthenticationFailed { .. } => HttpResponse::Unauthorized().json(body),
        SearchError::ForbiddenPath { .. } => HttpResponse::Forbidden().json(body),
        SearchError::InvalidSearchQuery { .. } => HttpResponse::BadRequest().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// Resolve a project's loaded index, translating in-progress states into
/// the observable loading/failed responses
fn ready_index(
    state: &AppState,
    project_id: &str,
) -> std::result::Result<Arc<crate::index::ProjectIndex>, HttpResponse> {
    match state.registry.ensure_loaded(project_id) {
        Ok(IndexState::Ready(index)) => Ok(index),
        Ok(IndexState::Loading) => Err(HttpResponse::Accepted().json(serde_json::json!({
            "status": "loading",
            "project": project_id,
        }))),
        Ok(IndexState::Failed(details)) => {
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("index failed to load: {}", details),
            })))
        }
        Err(e) => Err(error_response(&e)),
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    password: String,
}

async fn login_handler(
    state: web::Data<AppState>,
    request: web::Json<LoginRequest>,
) -> ActixResult<HttpResponse> {
    let expected = &state.config.server.app_password;
    if !expected.is_empty() && request.password != *expected {
        return Ok(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "invalid password"
        })));
    }
    let token = state.sessions.create();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "token": token,
        "expires_in": state.config.server.session_lifetime_seconds,
    })))
}

async fn logout_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    if let Some(token) = session_token(&req) {
        state.sessions.remove(&token);
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "logged out"})))
}

async fn projects_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    if !is_authorized(&req, &state) {
        return Ok(unauthorized());
    }
    let summaries = projects::public_summaries(&state.config.projects);
    Ok(HttpResponse::Ok().json(summaries))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    project: String,
    #[serde(default)]
    q: String,
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    per_page: Option<usize>,
    #[serde(default)]
    file_type: Option<String>,
}

async fn search_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<SearchParams>,
) -> ActixResult<HttpResponse> {
    if !is_authorized(&req, &state) {
        return Ok(unauthorized());
    }

    let index = match ready_index(&state, &params.project) {
        Ok(index) => index,
        Err(response) => return Ok(response),
    };

    let file_type = match &params.file_type {
        Some(raw) if !raw.is_empty() => match FileType::parse(raw) {
            Some(ft) => Some(ft),
            None => {
                return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                    "error": format!("unknown file type: {}", raw),
                })))
            }
        },
        _ => None,
    };

    let options = SearchOptions {
        page: params.page.unwrap_or(1),
        per_page: params.per_page,
        file_type,
    };

    let timer = Timer::new("keyword-search");
    match state.keyword_engine.search(&index, &params.q, &options) {
        Ok(response) => {
            let elapsed = timer.stop();
            tracing::debug!(
                "Keyword search '{}' on '{}': {} matches in {}ms",
                params.q,
                params.project,
                response.total_matches,
                elapsed
            );

            let mut entry = SearchLogEntry::new(&params.project, &params.q, "keyword");
            entry.result_count = Some(response.total_matches);
            state.query_log.log_search(entry);

            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            let mut entry = SearchLogEntry::new(&params.project, &params.q, "keyword");
            entry.error_message = Some(e.to_string());
            state.query_log.log_search(entry);
            Ok(error_response(&e))
        }
    }
}

async fn smart_search_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<SearchParams>,
) -> ActixResult<HttpResponse> {
    if !is_authorized(&req, &state) {
        return Ok(unauthorized());
    }

    let index = match ready_index(&state, &params.project) {
        Ok(index) => index,
        Err(response) => return Ok(response),
    };

    // Disabled or unconfigured smart search answers in keyword mode
    if !state.smart_engine.is_available() {
        let options = SearchOptions {
            page: params.page.unwrap_or(1),
            per_page: params.per_page,
            file_type: None,
        };
        return match state.keyword_engine.search(&index, &params.q, &options) {
            Ok(response) => {
                let mut entry = SearchLogEntry::new(&params.project, &params.q, "keyword");
                entry.result_count = Some(response.total_matches);
                state.query_log.log_search(entry);

                let mut body = serde_json::to_value(&response).unwrap_or_default();
                if let Some(map) = body.as_object_mut() {
                    map.insert("mode".to_string(), serde_json::json!("keyword"));
                    map.insert("smart_search_available".to_string(), serde_json::json!(false));
                }
                Ok(HttpResponse::Ok().json(body))
            }
            Err(e) => Ok(error_response(&e)),
        };
    }

    let description = projects::get_project(&state.config.projects, &params.project)
        .map(|p| p.description.clone())
        .unwrap_or_default();

    let timer = Timer::new("smart-analyze");
    let (analysis, cache_hit) = match state
        .smart_engine
        .analyze(&params.project, &description, &params.q)
        .await
    {
        Ok(result) => result,
        Err(e) => {
            let mut entry = SearchLogEntry::new(&params.project, &params.q, "smart");
            entry.error_message = Some(e.to_string());
            state.query_log.log_search(entry);
            return Ok(error_response(&e));
        }
    };
    let llm_latency_ms = timer.stop();

    let per_page = params
        .per_page
        .unwrap_or(state.config.search.per_page);
    match state.smart_engine.search(
        &index,
        &analysis,
        &params.q,
        params.page.unwrap_or(1),
        per_page,
    ) {
        Ok(mut response) => {
            response.cache_hit = cache_hit;
            response.llm_latency_ms = llm_latency_ms;

            let mut entry = SearchLogEntry::new(&params.project, &params.q, "smart");
            entry.result_count = Some(response.total_matches);
            entry.interpretation = Some(response.analysis.interpretation.clone());
            entry.llm_latency_ms = Some(llm_latency_ms);
            entry.cache_hit = cache_hit;
            state.query_log.log_search(entry);

            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            let mut entry = SearchLogEntry::new(&params.project, &params.q, "smart");
            entry.error_message = Some(e.to_string());
            state.query_log.log_search(entry);
            Ok(error_response(&e))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectParam {
    project: String,
}

async fn reload_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<ProjectParam>,
) -> ActixResult<HttpResponse> {
    if !is_authorized(&req, &state) {
        return Ok(unauthorized());
    }
    match state.registry.reload(&params.project) {
        Ok(()) => Ok(HttpResponse::Accepted().json(serde_json::json!({
            "status": "loading",
            "project": params.project,
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn stats_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<ProjectParam>,
) -> ActixResult<HttpResponse> {
    if !is_authorized(&req, &state) {
        return Ok(unauthorized());
    }

    let load_state = state
        .registry
        .state(&params.project)
        .map(|s| s.label())
        .unwrap_or("not_loaded");
    let download_state = state
        .blob
        .state(&params.project)
        .as_ref()
        .map(DownloadState::label);

    match state.registry.state(&params.project) {
        Some(IndexState::Ready(index)) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "project": params.project,
            "load_state": load_state,
            "download_state": download_state,
            "total_docs": index.total_docs(),
            "total_pages": index.total_pages(),
            "metadata": &index.metadata,
        }))),
        _ => Ok(HttpResponse::Ok().json(serde_json::json!({
            "project": params.project,
            "load_state": load_state,
            "download_state": download_state,
        }))),
    }
}

#[derive(Debug, Deserialize)]
struct SearchStatsParams {
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    days: Option<i64>,
}

async fn search_stats_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<SearchStatsParams>,
) -> ActixResult<HttpResponse> {
    if !is_authorized(&req, &state) {
        return Ok(unauthorized());
    }

    let days = params.days.unwrap_or(7).clamp(1, 365);
    let project = params.project.as_deref();

    match state.query_log.search_stats(project, days) {
        Ok(stats) => {
            let common = state
                .query_log
                .common_queries(project, 20, days)
                .unwrap_or_default();
            let zero = state
                .query_log
                .zero_result_queries(project, 50, days)
                .unwrap_or_default();
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "stats": stats,
                "common_queries": common,
                "zero_result_queries": zero,
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

#[derive(Debug, Deserialize)]
struct FileLinkParams {
    project: String,
    path: String,
}

async fn file_link_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<FileLinkParams>,
) -> ActixResult<HttpResponse> {
    if !is_authorized(&req, &state) {
        return Ok(unauthorized());
    }
    if let Err(e) = projects::get_project(&state.config.projects, &params.project) {
        return Ok(error_response(&e));
    }
    match state.blob.sign_file_link(&params.project, &params.path) {
        Ok(link) => Ok(HttpResponse::Ok().json(link)),
        Err(e) => Ok(error_response(&e)),
    }
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    #[serde(default)]
    expires: Option<i64>,
    #[serde(default)]
    sig: Option<String>,
}

async fn file_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    path_params: web::Path<(String, String)>,
    query: web::Query<FileQuery>,
) -> ActixResult<HttpResponse> {
    let (project_id, file_path) = path_params.into_inner();

    // Either a live session or a valid signed link grants access
    let signed_ok = match (query.expires, &query.sig) {
        (Some(expires), Some(sig)) => state
            .blob
            .verify_file_link(&project_id, &file_path, expires, sig)
            .is_ok(),
        _ => false,
    };
    if !signed_ok && !is_authorized(&req, &state) {
        return Ok(unauthorized());
    }

    let project = match projects::get_project(&state.config.projects, &project_id) {
        Ok(project) => project,
        Err(e) => return Ok(error_response(&e)),
    };

    if !ValidationUtils::is_safe_relative_path(&file_path) {
        return Ok(error_response(&SearchError::ForbiddenPath {
            path: file_path,
        }));
    }

    let full_path = project.source_folder.join(&file_path);
    match tokio::fs::read(&full_path).await {
        Ok(bytes) => Ok(HttpResponse::Ok()
            .content_type(content_type_for(&file_path))
            .body(bytes)),
        Err(_) => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("file not found: {}", file_path),
        }))),
    }
}

fn content_type_for(path: &str) -> &'static str {
    let extension = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "html" | "htm" => "text/html; charset=utf-8",
        "xlsx" | "xlsm" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "eml" => "message/rfc822",
        "txt" => "text/plain; charset=utf-8",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

async fn health_handler(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let projects: Vec<serde_json::Value> = state
        .config
        .projects
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "load_state": state
                    .registry
                    .state(&p.id)
                    .map(|s| s.label())
                    .unwrap_or("not_loaded"),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "smart_search": state.smart_engine.is_available(),
        "projects": projects,
    })))
}

async fn index_handler() -> ActixResult<HttpResponse> {
    let html = r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>Casefile Search</title>
        <style>
            body { font-family: Arial, sans-serif; margin: 40px; }
            .header { color: #2c3e50; }
            .endpoint { margin: 20px 0; padding: 15px; background: #f8f9fa; border-radius: 5px; }
            .method { font-weight: bold; color: #27ae60; }
        </style>
    </head>
    <body>
        <h1 class="header">Casefile Search API</h1>
        <p>Page-level search across extracted legal document collections.</p>

        <h2>Available Endpoints</h2>

        <div class="endpoint">
            <span class="method">GET</span> /api/search?project=&amp;q=
            <p>Keyword search: quoted phrases, AND matching, occurrence ranking.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /api/smart-search?project=&amp;q=
            <p>LLM-assisted search with validated query plans and 0-100 scores.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /api/projects
            <p>List available document collections.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /api/stats?project=
            <p>Index metadata and load status for one collection.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /health
            <p>Service health and per-project load states.</p>
        </div>
    </body>
    </html>
    "#;

    Ok(HttpResponse::Ok().content_type("text/html").body(html))
}
