//! ThreadHarvest - Threads search harvester and post content collector.
//!
//! Two-phase pipeline over a persistent SQLite queue: harvest scrolls a
//! search feed and banks post links, process revisits each link and stores
//! the extracted post text.

mod browser;
mod cli;
mod config;
mod extract;
mod models;
mod repository;
mod retry;
mod schema;
mod services;
mod traits;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "threadharvest=debug"
    } else {
        "threadharvest=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
