//! Quarry - streaming SPARQL query runner
//!
//! Runs one query against catalog sources, ad-hoc endpoints or a local RDF
//! file and prints the results as they were published. Ctrl+C interrupts the
//! run and prints whatever arrived so far.
//!
//! Usage:
//!   quarry --source spoke "SELECT * WHERE { ?s ?p ?o } LIMIT 10"
//!   quarry --source spoke --source sockg --query-file query.rq --csv out.csv
//!   quarry --data data/sample.nt "ASK { ?s ?p ?o }"
//!   quarry --list-sources

use clap::Parser;
use quarry::{
    api::query_session::QuerySession,
    config::SessionConfig,
    core::{RunState, Source, SourceCategory},
    export::write_csv,
    querying::{OxigraphEngine, QueryEngine, SparqlEndpointEngine},
    registry::source_catalog::{self, SourceCatalog},
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LOCAL_ENDPOINT: &str = "http://localhost/local/sparql";

#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(about = "Run a SPARQL query over knowledge-graph sources and stream the results")]
struct Args {
    /// SPARQL query text
    query: Option<String>,

    /// Read the query from a file
    #[arg(short = 'f', long, conflicts_with = "query")]
    query_file: Option<PathBuf>,

    /// Catalog source shortname (repeatable)
    #[arg(short, long = "source")]
    sources: Vec<String>,

    /// Ad-hoc SPARQL endpoint URL (repeatable)
    #[arg(short, long = "endpoint")]
    endpoints: Vec<String>,

    /// Query a local RDF file instead of remote endpoints
    #[arg(long)]
    data: Option<PathBuf>,

    /// Source catalog as a JSON array, replacing the built-in FRINK list
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Session tuning as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write the results to this CSV file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Print at most this many rows (0 = all)
    #[arg(long, default_value = "0")]
    max_rows: usize,

    /// List the catalog sources and exit
    #[arg(long)]
    list_sources: bool,
}

fn print_sources(catalog: &SourceCatalog) {
    let categories = [
        SourceCategory::Registry,
        SourceCategory::Federation,
        SourceCategory::Other,
        SourceCategory::Custom,
    ];
    for category in categories {
        let sources = catalog.list_by_category(category);
        if sources.is_empty() {
            continue;
        }
        println!("{:?}:", category);
        for source in sources {
            println!(
                "  {:<20} {}  {}",
                source.shortname,
                source.name,
                source.endpoints().join("  ")
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let catalog = match &args.catalog {
        Some(path) => SourceCatalog::from_json_file(path)?,
        None => SourceCatalog::with_defaults(),
    };
    if args.list_sources {
        print_sources(&catalog);
        return Ok(());
    }

    let query = match (&args.query, &args.query_file) {
        (Some(query), _) => query.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => String::new(),
    };
    let config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };

    let mut sources = catalog.resolve(args.sources.as_slice())?;
    for endpoint in &args.endpoints {
        sources.push(source_catalog::custom_source(endpoint, endpoint)?);
    }

    let engine: Arc<dyn QueryEngine> = match &args.data {
        Some(path) => {
            let engine = OxigraphEngine::new();
            engine.load_file(LOCAL_ENDPOINT, path)?;
            let local = Source::sparql("Local dataset", "local", LOCAL_ENDPOINT)
                .with_category(SourceCategory::Custom);
            sources.push(local);
            Arc::new(engine)
        }
        None => Arc::new(SparqlEndpointEngine::new()),
    };

    let session = QuerySession::with_hooks(engine, config, Default::default());

    let interrupt = session.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C, stopping...");
        interrupt.stop_query();
    })?;

    session.run_query(&query, &sources).await?;
    let status = session.wait_until_stopped().await;
    let results = session.results();

    let columns: Vec<&str> = status.columns.iter().map(|v| v.as_str()).collect();
    println!("{}", columns.join("\t"));
    let shown = if args.max_rows == 0 {
        results.len()
    } else {
        args.max_rows.min(results.len())
    };
    for record in results.iter().take(shown) {
        let row: Vec<String> = record
            .values()
            .iter()
            .map(|value| value.as_ref().map(ToString::to_string).unwrap_or_default())
            .collect();
        println!("{}", row.join("\t"));
    }
    if shown < results.len() {
        println!("... {} more rows", results.len() - shown);
    }

    println!();
    println!("{} results in {}", results.len(), session.seconds_string());
    if status.possibly_incomplete {
        println!("Results may be incomplete.");
    }

    if let Some(path) = &args.csv {
        let writer = BufWriter::new(File::create(path)?);
        write_csv(&status.columns, &results, writer)?;
        println!("Wrote CSV to {}", path.display());
    }

    if status.run_state == RunState::Errored {
        let message = status.error_message.unwrap_or_default();
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }

    Ok(())
}
