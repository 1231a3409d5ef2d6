//! Wayfinder CLI: the main entry point.
//!
//! Commands:
//! - `config`  Print the default or active configuration
//! - `routes`  Show the model chain for each purpose
//! - `chunk`   Split a markdown file into indexable chunks
//! - `search`  Index files locally and run a knowledge search

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "wayfinder",
    about = "Wayfinder: career agent engine with model routing and knowledge search",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.wayfinder/config.toml)
    #[arg(short, long, global = true, env = "WAYFINDER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print configuration as TOML
    Config {
        /// Print the built-in defaults instead of the active config
        #[arg(long)]
        default: bool,
    },

    /// Show the model chain and router status per purpose
    Routes {
        /// Print the router status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the chunks of a markdown file as JSON
    Chunk {
        file: PathBuf,
    },

    /// Index markdown files in memory and search them
    Search {
        query: String,

        /// Files to index; each file's stem is its source tag
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Only return results from these sources
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Skip results from these sections
        #[arg(long = "exclude-section")]
        exclude_sections: Vec<String>,

        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Config { default } => commands::config_cmd::run(config, default)?,
        Commands::Routes { json } => commands::routes::run(config, json)?,
        Commands::Chunk { file } => commands::chunk::run(config, &file)?,
        Commands::Search {
            query,
            files,
            sources,
            exclude_sections,
            limit,
        } => {
            let query = wayfinder_knowledge::SearchQuery::new(query)
                .with_sources(sources)
                .excluding_sections(exclude_sections);
            let query = match limit {
                Some(limit) => query.with_limit(limit),
                None => query,
            };
            commands::search::run(config, &files, &query).await?
        }
    }

    Ok(())
}
