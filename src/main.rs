//! # Casefile Search Server Driver
//!
//! ## Purpose
//! Entry point for the document search engine. Wires configuration, logging,
//! the index registry, blob sync, and the API server together, and exposes
//! the extraction pipeline as a subcommand.
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and tracing
//! 3. `serve` (default): start blob sync and index preloads, run the API
//!    server until shutdown
//! 4. `extract`: run the extraction pipeline for one project
//! 5. `check-health`: validate configuration and required paths

use clap::{Arg, ArgAction, Command};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use anyhow::Result;
use casefile_search::{
    api::{ApiServer, SessionStore},
    blob::BlobSync,
    config::Config,
    errors::SearchError,
    extraction::{ExtractionKind, ExtractionPipeline},
    index::IndexRegistry,
    projects,
    query_log::QueryLogger,
    search::KeywordSearchEngine,
    smart::SmartSearchEngine,
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("casefile-search-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Page-level search across extracted legal document collections")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml")
                .global(true),
        )
        .subcommand(
            Command::new("serve").about("Run the search API server").arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .help("Override the configured server port")
                    .value_parser(clap::value_parser!(u16)),
            ),
        )
        .subcommand(
            Command::new("extract")
                .about("Extract documents into a project's index")
                .arg(
                    Arg::new("project")
                        .long("project")
                        .value_name("ID")
                        .required(true)
                        .help("Project id from the configuration"),
                )
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .value_name("KIND")
                        .action(ArgAction::Append)
                        .help("Format to extract (pdf, excel, word, email, html); repeatable, defaults to all"),
                )
                .arg(
                    Arg::new("reindex")
                        .long("reindex")
                        .help("Re-extract documents that already have index files")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("check-health").about("Validate configuration and paths, then exit"))
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");
    let mut config = Config::from_file(config_path)?;

    init_logging(&config);
    info!("Configuration loaded from: {}", config_path);

    match matches.subcommand() {
        Some(("extract", sub)) => run_extract(&config, sub),
        Some(("check-health", _)) => run_health_checks(&config),
        Some(("serve", sub)) => {
            if let Some(port) = sub.get_one::<u16>("port") {
                config.server.port = *port;
            }
            run_server(config).await
        }
        _ => run_server(config).await,
    }
}

/// Initialize logging and tracing
fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Run the API server until shutdown
async fn run_server(config: Config) -> Result<()> {
    let config = Arc::new(config);
    info!(
        "Starting Casefile Search v{} with {} project(s)",
        env!("CARGO_PKG_VERSION"),
        config.projects.len()
    );

    let app_state = initialize_components(config.clone())?;

    // Background work first: blob downloads, then index preloads
    if app_state.blob.is_enabled() {
        app_state.blob.start_all(&config.projects);
    }
    app_state.registry.preload_all();

    match app_state.query_log.cleanup_old_logs() {
        Ok(removed) if removed > 0 => info!("Query log cleanup removed {} entries", removed),
        Ok(_) => {}
        Err(e) => warn!("Query log cleanup failed: {}", e),
    }

    let server = ApiServer::new(app_state.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {}", e);
        }
    });

    info!(
        "Casefile Search started on {}:{}",
        config.server.host, config.server.port
    );

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
        }
        _ = server_handle => {
            warn!("Server stopped unexpectedly");
        }
    }

    Ok(())
}

/// Build the shared application state
fn initialize_components(config: Arc<Config>) -> Result<AppState> {
    info!("Initializing application components");

    let registry = Arc::new(IndexRegistry::new(config.projects.clone()));
    let keyword_engine = Arc::new(KeywordSearchEngine::new(config.search.clone()));
    let smart_engine = Arc::new(SmartSearchEngine::new(config.smart_search.clone()));
    let blob = Arc::new(BlobSync::new(config.blob.clone())?);
    let query_log = Arc::new(QueryLogger::open(&config.query_log)?);
    let sessions = Arc::new(SessionStore::new(Duration::from_secs(
        config.server.session_lifetime_seconds,
    )));

    if smart_engine.is_available() {
        info!("Smart search enabled (model: {})", config.smart_search.model);
    } else {
        warn!("Smart search unavailable; queries fall back to keyword mode");
    }

    Ok(AppState {
        config,
        registry,
        keyword_engine,
        smart_engine,
        blob,
        query_log,
        sessions,
    })
}

/// Run the extraction pipeline for one project
fn run_extract(config: &Config, matches: &clap::ArgMatches) -> Result<()> {
    let project_id = matches
        .get_one::<String>("project")
        .expect("project argument is required");
    let project = projects::get_project(&config.projects, project_id)?.clone();

    let kinds: Vec<ExtractionKind> = match matches.get_many::<String>("kind") {
        Some(raw) => raw
            .map(|k| {
                ExtractionKind::parse(k).ok_or_else(|| SearchError::UnsupportedFormat {
                    extension: k.clone(),
                })
            })
            .collect::<std::result::Result<Vec<_>, SearchError>>()?,
        None => ExtractionKind::all().to_vec(),
    };
    let reindex = matches.get_flag("reindex");

    info!(
        "Extracting project '{}' from {:?} (reindex: {})",
        project.id, project.source_folder, reindex
    );

    let pipeline = ExtractionPipeline::new(config.extraction.clone());
    let stats = pipeline.extract_project(&project, &kinds, reindex)?;

    let mut processed = 0;
    let mut skipped = 0;
    let mut errors = 0;
    let mut pages = 0;
    for kind_stats in stats.values() {
        processed += kind_stats.processed;
        skipped += kind_stats.skipped;
        errors += kind_stats.errors;
        pages += kind_stats.pages;
    }
    info!(
        "Extraction complete: {} processed, {} skipped, {} errors, {} pages",
        processed, skipped, errors, pages
    );
    info!("Index saved to: {:?}", project.index_folder);

    Ok(())
}

/// Validate configuration and required paths, then exit
fn run_health_checks(config: &Config) -> Result<()> {
    info!("Running health checks");

    config.validate()?;
    info!("Configuration is valid");

    for project in &config.projects {
        if !project.source_folder.exists() {
            warn!(
                "Project '{}': source folder {:?} does not exist",
                project.id, project.source_folder
            );
        }
        let texts = project.index_folder.join("texts");
        if !texts.exists() {
            warn!(
                "Project '{}': no extracted index at {:?} (run `extract --project {}`)",
                project.id, texts, project.id
            );
        } else {
            info!("Project '{}': index present", project.id);
        }
    }

    info!("Health checks finished");
    Ok(())
}
