//! Companion API server binary.
//!
//! Usage:
//!   companion-api --config companion.toml
//!   companion-api --port 8000 --bind 127.0.0.1
//!   companion-api --database-url sqlite://data/emotions.db
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` - Chat model and embeddings key
//! - `HF_API_TOKEN` - Hugging Face inference token
//! - `DATABASE_URL` - SQLite connection URL
//! - `COMPANION_API_KEY` - API authentication key (recommended)
//! - `COMPANION_BIND_ADDR` - Server bind address (`host:port`)
//! - `COMPANION_CORS_ORIGINS` - CORS allowed origins (comma-separated)
//!
//! A `.env` file in the working directory is loaded first.

use clap::Parser;
use companion_api::{serve, AppState};
use companion_coordinator::CompanionConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "companion-api", version, about = "Emotion-aware companion chatbot API")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "COMPANION_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (host only)
    #[arg(short, long)]
    bind: Option<String>,

    /// SQLite connection URL, e.g. sqlite://emotions.db
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,companion_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            CompanionConfig::from_file(path)?
        }
        None => {
            tracing::info!("Using default configuration");
            CompanionConfig::default()
        }
    };

    // CLI flags > environment > config file
    config.apply_env()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.host = bind;
    }
    if let Some(url) = args.database_url {
        config.memory.database_url = url;
    }

    if config.server.host == "0.0.0.0" {
        tracing::warn!(
            "Server binding to 0.0.0.0, which exposes the API on all network interfaces. \
             Configure COMPANION_API_KEY and a firewall."
        );
    }
    if config.server.api_key.is_none() {
        tracing::warn!(
            "COMPANION_API_KEY not set, API will run without authentication. \
             Acceptable for local development but not for production."
        );
    } else {
        tracing::info!("API key authentication enabled");
    }
    if config.llm.resolve_api_key().is_none() {
        tracing::warn!("OPENAI_API_KEY not set, chat requests will likely be rejected upstream");
    }

    let state = AppState::from_config(&config).await?;
    serve(Arc::new(state), &config.server).await?;

    Ok(())
}
