//! HTTP Server Binary for Quarry
//!
//! This binary starts the Quarry HTTP API server, providing REST and WebSocket
//! endpoints to run, stop and observe queries.
//!
//! Usage:
//!   cargo run --bin http_server -- --host 0.0.0.0 --port 8080
//!   cargo run --bin http_server -- --data ./data/sample.nt

use clap::Parser;
use quarry::{
    api::query_session::{QuerySession, SessionHooks},
    config::SessionConfig,
    core::{Source, SourceCategory},
    http::start_server,
    querying::{OxigraphEngine, QueryEngine, SparqlEndpointEngine},
    registry::source_catalog::SourceCatalog,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "Quarry HTTP Server")]
#[command(about = "HTTP API server for streaming SPARQL query sessions", long_about = None)]
struct Args {
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Session tuning as JSON (publish limits, intervals)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source catalog as a JSON array, replacing the built-in FRINK list
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Serve queries from a local RDF file instead of remote endpoints
    #[arg(long)]
    data: Option<PathBuf>,

    /// Endpoint URL the local dataset is registered under
    #[arg(long, default_value = "http://localhost/local/sparql")]
    data_endpoint: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    println!("╔════════════════════════════════════════════════════════════════╗");
    println!("║                            Quarry                              ║");
    println!("║                        HTTP API Server                         ║");
    println!("╚════════════════════════════════════════════════════════════════╝");
    println!();

    let config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    println!("Session configuration:");
    println!(
        "  - Immediate publish limit: {}",
        config.immediate_publish_limit
    );
    println!("  - Publish interval: {} ms", config.publish_interval_ms);
    println!();

    let catalog = match &args.catalog {
        Some(path) => SourceCatalog::from_json_file(path)?,
        None => SourceCatalog::with_defaults(),
    };

    let engine: Arc<dyn QueryEngine> = match &args.data {
        Some(path) => {
            println!("Loading local dataset from: {}", path.display());
            let engine = OxigraphEngine::new();
            engine.load_file(&args.data_endpoint, path)?;
            catalog.register(
                Source::sparql("Local dataset", "local", &args.data_endpoint)
                    .with_category(SourceCategory::Custom),
            )?;
            Arc::new(engine)
        }
        None => Arc::new(SparqlEndpointEngine::new()),
    };
    println!("Registered sources: {}", catalog.len());
    println!();

    let hooks = SessionHooks::default()
        .on_start(|| tracing::debug!("Query started streaming"))
        .on_stop(|| tracing::debug!("Query stopped"));
    let session = QuerySession::with_hooks(engine, config, hooks);

    let addr = format!("{}:{}", args.host, args.port);
    println!("Starting HTTP server...");
    println!();

    // Set up graceful shutdown
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
        println!();
        println!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        result = start_server(&addr, session.clone(), catalog) => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        () = shutdown_signal => {
            session.stop_query();
            println!("Server shut down gracefully");
        }
    }

    Ok(())
}
