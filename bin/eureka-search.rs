use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use eureka_search::{Document, IndexConfig, PerformanceProfile, SearchService};

#[derive(Parser)]
#[command(name = "eureka-search")]
#[command(about = "Segment-based full-text search index", long_about = None)]
struct Args {
    /// Index directory
    #[arg(long, env = "EUREKA_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Performance profile (low-latency, balanced, high-throughput)
    #[arg(long, env = "EUREKA_PROFILE", default_value = "balanced")]
    profile: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a JSON-lines file, one flat object per line, then commit
    Index { file: PathBuf },
    /// Run a query string
    Query {
        text: String,
        #[arg(long, env = "EUREKA_TOP_K", default_value_t = 10)]
        top_k: usize,
    },
    /// Delete a document by id
    Delete { id: u64 },
    /// Merge every segment into one
    Merge,
    /// Print index statistics as JSON
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let profile = match args.profile.parse::<PerformanceProfile>() {
        Ok(profile) => profile,
        Err(e) => {
            warn!("{}, using 'balanced'", e);
            PerformanceProfile::Balanced
        }
    };
    info!(
        version = eureka_search::VERSION,
        data_dir = %args.data_dir.display(),
        ?profile,
        "Starting eureka-search"
    );

    let config = IndexConfig::default().with_profile(profile);
    let service = SearchService::open(&args.data_dir, config)
        .with_context(|| format!("failed to open index at {}", args.data_dir.display()))?;

    match args.command {
        Command::Index { file } => {
            let reader = BufReader::new(
                File::open(&file).with_context(|| format!("failed to open {}", file.display()))?,
            );
            let mut indexed = 0u64;
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let value: serde_json::Value = serde_json::from_str(&line)
                    .with_context(|| format!("line {}: invalid JSON", line_no + 1))?;
                let Some(doc) = Document::from_json(&value) else {
                    bail!("line {}: expected a flat JSON object", line_no + 1);
                };
                service
                    .add_document(&doc)
                    .with_context(|| format!("line {}", line_no + 1))?;
                indexed += 1;
            }
            let generation = service.flush()?;
            info!(indexed, generation, "Indexing complete");
        }
        Command::Query { text, top_k } => {
            for hit in service.query(&text, top_k)? {
                println!("{}", serde_json::to_string(&hit)?);
            }
        }
        Command::Delete { id } => {
            if service.delete_document(id)? {
                let generation = service.flush()?;
                info!(id, generation, "Deleted document");
            } else {
                warn!(id, "No live document with this id");
            }
        }
        Command::Merge => match service.force_merge()? {
            Some(outcome) => info!(
                merged = outcome.merged.len(),
                generation = outcome.generation,
                live_docs = outcome.live_docs,
                "Merge complete"
            ),
            None => info!("Nothing to merge"),
        },
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&service.stats())?);
        }
    }

    service.close()?;
    Ok(())
}
