use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docqa::cli;
use docqa::config::Settings;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about your documents and get cited answers", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (defaults to ./docqa.toml when present)
    #[arg(short, long, global = true, env = "DOCQA_CONFIG")]
    config: Option<PathBuf>,

    /// Index directory (overrides settings)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, chunk, embed and index documents
    Ingest {
        /// Input directory or file path
        #[arg(short, long)]
        input: PathBuf,

        /// Chunk size in characters
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Chunk overlap in characters
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Answer a question from the indexed documents
    Query {
        /// Question text
        #[arg(short, long)]
        question: String,

        /// Number of passages to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Context budget (chars or tokens, per settings)
        #[arg(short, long)]
        budget: Option<usize>,

        /// Generator backend: ollama or extractive
        #[arg(short, long)]
        generator: Option<String>,
    },

    /// Remove a document and its index entries
    Remove {
        /// Document id as shown at ingest time
        #[arg(short, long)]
        document: String,
    },

    /// Show index statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = cli.index_dir {
        settings.storage.index_dir = Some(dir);
    }

    match cli.command {
        Commands::Ingest {
            input,
            chunk_size,
            chunk_overlap,
        } => {
            if let Some(size) = chunk_size {
                settings.chunking.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                settings.chunking.chunk_overlap = overlap;
            }
            settings.validate()?;
            cli::ingest(settings, input).await?;
        }
        Commands::Query {
            question,
            top_k,
            budget,
            generator,
        } => {
            if let Some(backend) = generator {
                settings.generation.backend = backend;
            }
            cli::query(settings, question, top_k, budget).await?;
        }
        Commands::Remove { document } => {
            cli::remove(settings, document).await?;
        }
        Commands::Stats => {
            cli::stats(settings).await?;
        }
    }

    Ok(())
}
