use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use aid_core::{Digest, DigestStore, Predicate, Result};
use aid_web::{create_app, AppState, DevTokenVerifier};

#[derive(Parser, Debug)]
#[command(author, version, about = "AI digest feed server", long_about = None)]
struct Cli {
    /// Storage backend: memory or sqlite
    #[arg(long, default_value = "memory")]
    storage: String,
    /// Database file for the sqlite backend
    #[arg(long)]
    db_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Upper bound for the `limit` query parameter
        #[arg(long, default_value_t = 100)]
        max_limit: u32,
    },
    /// Bulk-load digests from a JSON array file (upserts by content_id)
    Seed { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let (digests, profiles) =
        aid_storage::create_storage(&cli.storage, cli.db_path.as_deref()).await?;

    info!("💾 Checking storage connection...");
    let total = digests.count(&Predicate::default()).await?;
    info!(
        "✨ Storage initialized successfully (using {}, {} digests stored)",
        cli.storage, total
    );

    match cli.command {
        Commands::Serve {
            host,
            port,
            max_limit,
        } => {
            let state = AppState::new(digests, profiles, Arc::new(DevTokenVerifier))
                .with_max_page_size(max_limit);
            let app = create_app(state).await;
            let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
            info!("🌐 Listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
        Commands::Seed { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let items: Vec<Digest> = serde_json::from_str(&raw)?;
            for digest in &items {
                digests.insert(digest).await?;
            }
            info!("📚 Seeded {} digests from {}", items.len(), file.display());
        }
    }

    Ok(())
}
