//! Grimoire: tabletop rulebook search server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use grimoire_core::GrimoireConfig;
use grimoire_resolve::{SearchMode, SearchRequest};
use grimoire_runtime::orchestrator::DEFAULT_BACKFILL_BATCH;
use grimoire_server::{build_router, indexing, AppState};
use grimoire_store::SqliteStore;

fn resolve_data_dir() -> PathBuf {
    std::env::var("GRIMOIRE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_help() {
    println!("Grimoire: tabletop rulebook search server");
    println!();
    println!("Usage: grimoire [command]");
    println!();
    println!("Commands:");
    println!("  (none) | serve               Start the server");
    println!("  ingest <file> [source]       Ingest a .txt/.md rulebook (source defaults to the file name)");
    println!("  search <query> [mode]        Search the corpus (mode: hybrid, fulltext, semantic)");
    println!("  backfill                     Embed entries that have no embedding yet");
    println!("  help                         Show this help message");
}

fn open_state() -> anyhow::Result<Arc<AppState>> {
    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = GrimoireConfig::from_env(&data_dir)
        .with_context(|| format!("Failed to prepare data directory {}", data_dir.display()))?;
    let store = SqliteStore::open(&config.data_paths.corpus, config.embedding.dimension)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
    let embedder = grimoire_infer::create_embedder(&config.embedding);

    Ok(Arc::new(AppState::new(config, Arc::new(store), embedder)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("serve") => serve().await,
        Some("ingest") => {
            let Some(file) = args.get(2) else {
                eprintln!("Usage: grimoire ingest <file> [source]");
                std::process::exit(1);
            };
            let path = PathBuf::from(file);
            let source = match args.get(3) {
                Some(s) => s.clone(),
                None => grimoire_ingest::slugify(
                    path.file_stem().and_then(|s| s.to_str()).unwrap_or("rules"),
                )
                .replace('-', "_"),
            };

            let state = open_state()?;
            match state.orchestrator.ingest_file(path, source).await? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => {
                    eprintln!("No text could be extracted from {}", file);
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Some("search") => {
            let Some(query) = args.get(2) else {
                eprintln!("Usage: grimoire search <query> [mode]");
                std::process::exit(1);
            };
            let mode = match args.get(3) {
                Some(m) => SearchMode::parse(m)
                    .with_context(|| format!("Unknown search mode: {}", m))?,
                None => SearchMode::default(),
            };

            let state = open_state()?;
            let response = state
                .orchestrator
                .search(&SearchRequest::new(query.clone(), mode))
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Some("backfill") => {
            let state = open_state()?;
            let report = state
                .orchestrator
                .backfill_embeddings(DEFAULT_BACKFILL_BATCH)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Some("--help" | "-h" | "help") => {
            print_help();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}. Use 'grimoire help' for usage.", other);
            std::process::exit(1);
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let state = open_state()?;
    let port = state.config.port;

    indexing::start_ingest_worker(state.clone());

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Grimoire server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
