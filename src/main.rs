//! # finrag CLI
//!
//! Question answering over a private document corpus.
//!
//! ## Usage
//!
//! ```bash
//! finrag --config ./config/finrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `finrag init` | Load the persisted index or build it from the corpus |
//! | `finrag ask "<question>"` | Answer one question and print the result |
//! | `finrag serve [--warm]` | Start the HTTP chat server |
//! | `finrag status` | Show the persisted index without building it |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from ./data
//! finrag init --config ./config/finrag.toml
//!
//! # Ask a question
//! finrag ask "Is the company's debt level sustainable?"
//!
//! # Serve, building the index before accepting requests
//! finrag serve --warm
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use finrag::config;
use finrag::logging;
use finrag::pipeline::{inspect_index, IndexOrigin, Pipeline};
use finrag::server;

/// finrag: retrieval-augmented investment Q&A over your own documents.
#[derive(Parser)]
#[command(name = "finrag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/finrag.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the persisted index, or build it from the corpus if there is none.
    Init,

    /// Answer a single question.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Start the HTTP chat server.
    Serve {
        /// Initialize the pipeline before accepting requests.
        #[arg(long)]
        warm: bool,
    },

    /// Show the state of the persisted index.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pipeline = Pipeline::from_config(&cfg)?;
            match pipeline.initialize().await? {
                IndexOrigin::Loaded(manifest) => {
                    println!(
                        "Using existing index at {} ({} entries, built {}).",
                        cfg.index.dir.display(),
                        manifest.entries,
                        manifest.built_at.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                IndexOrigin::Built(report) => {
                    println!("Index built at {}.", cfg.index.dir.display());
                    println!("  files ingested: {}", report.files_succeeded);
                    println!("  files skipped:  {}", report.files_failed.len());
                    for (path, reason) in &report.files_failed {
                        println!("    {}: {}", path.display(), reason);
                    }
                    println!("  chunks:         {}", report.chunks);
                    println!("  entries:        {}", report.entries);
                }
            }
        }
        Commands::Ask { question } => {
            let pipeline = Pipeline::from_config(&cfg)?;
            println!("{}", pipeline.answer(&question).await);
        }
        Commands::Serve { warm } => {
            let pipeline = Arc::new(Pipeline::from_config(&cfg)?);
            if warm {
                pipeline.initialize().await?;
            }
            server::run_server(pipeline, &cfg.server.bind).await?;
        }
        Commands::Status => match inspect_index(&cfg.index.dir).await? {
            None => println!("No index at {}.", cfg.index.dir.display()),
            Some(status) => {
                println!("Index: {}", status.path.display());
                match &status.manifest {
                    Some(manifest) => {
                        println!("  state:           complete");
                        println!(
                            "  built:           {}",
                            manifest.built_at.format("%Y-%m-%d %H:%M:%S UTC")
                        );
                        println!("  embedding model: {}", manifest.embedding_model);
                    }
                    None => println!("  state:           incomplete (will be rebuilt)"),
                }
                println!("  entries:         {}", status.entries);
                if status.orphans > 0 {
                    println!("  orphaned ids:    {}", status.orphans);
                }
            }
        },
    }

    Ok(())
}
