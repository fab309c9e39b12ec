//! # Course Compass CLI (`compass`)
//!
//! Seeds a course catalog, builds its embedding dataset, and answers
//! natural-language course queries.
//!
//! ## Usage
//!
//! ```bash
//! compass --config ./config/compass.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `compass seed` | Load CSV files into the catalog collection |
//! | `compass build` | Embed the catalog and replace the vector collection |
//! | `compass search "<query>"` | Rank catalog courses against a query |
//! | `compass stats` | Show collection counts |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use course_compass::{catalog, config, dataset, search, stats};

/// Course Compass: semantic course search over a local catalog.
#[derive(Parser)]
#[command(
    name = "compass",
    about = "Course Compass: semantic course search over a local catalog",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/compass.toml`. See `config/compass.example.toml`.
    #[arg(long, global = true, default_value = "./config/compass.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load CSV files into the catalog collection.
    ///
    /// Every `.csv` file in the directory is read in file-name order and
    /// appended to the catalog.
    Seed {
        /// Directory holding the CSV files (default: `[seed] directory`).
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Text encoding of the files, e.g. `utf-8` or `latin-1`.
        #[arg(long)]
        encoding: Option<String>,
    },

    /// Embed the whole catalog and replace the stored embedding dataset.
    Build,

    /// Search the catalog with a natural-language query.
    Search {
        /// The query text.
        query: String,

        /// Number of courses to return (default: `[retrieval] default_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show document counts for the catalog and vector collections.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Seed { dir, encoding } => {
            catalog::run_seed(&cfg, dir, encoding).await?;
        }
        Commands::Build => {
            dataset::run_build(&cfg).await?;
        }
        Commands::Search { query, top_k, json } => {
            search::run_search(&cfg, &query, top_k, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
