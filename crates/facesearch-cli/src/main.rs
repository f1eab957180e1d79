use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod client;

use client::DaemonClient;

#[derive(Parser)]
#[command(name = "facesearch", about = "Face upload and similarity search client for facesearchd")]
struct Cli {
    /// Base URL of the daemon
    #[arg(long, env = "FACESEARCH_URL", default_value = "http://127.0.0.1:8000", global = true)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload and index one or more images
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Target directory (default: face-images)
        #[arg(short, long)]
        directory: Option<String>,
        /// Store the bytes as-is, without watermarking or compression
        #[arg(long)]
        original: bool,
    },
    /// Find stored faces similar to the face in an image
    Search {
        file: PathBuf,
        /// Only search this directory
        #[arg(short, long)]
        directory: Option<String>,
        /// Minimum cosine similarity, 0.0 to 1.0
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Maximum number of matches
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show the number of indexed faces
    Stats,
    /// List indexed faces in a directory
    List { directory: String },
    /// Delete a directory and every image in it
    Delete { directory: String },
    /// Check that the daemon is up
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = DaemonClient::new(&cli.url)?;

    let response = match cli.command {
        Commands::Upload {
            files,
            directory,
            original,
        } => client.upload(&files, directory.as_deref(), original).await?,
        Commands::Search {
            file,
            directory,
            threshold,
            limit,
        } => {
            client
                .search(&file, directory.as_deref(), threshold, limit)
                .await?
        }
        Commands::Stats => client.stats().await?,
        Commands::List { directory } => client.list(&directory).await?,
        Commands::Delete { directory } => client.delete(&directory).await?,
        Commands::Health => client.health().await?,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
