use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

mod api;
mod cache;
mod config;
mod cricket;
mod error;
mod hub;
mod relay;

use api::AppState;
use cache::MatchCache;
use config::Config;
use cricket::{ApiCricket, CricketProvider};
use hub::SubscriptionHub;
use relay::{Poller, Publisher, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let vocab = config.vocabulary();
    let provider: Arc<dyn CricketProvider> = Arc::new(ApiCricket::new(
        &config.api_url,
        config.api_key()?,
        vocab.clone(),
    )?);
    info!("Upstream provider: {} ({})", provider.name(), config.api_url);

    let cache = MatchCache::new();
    let hub = Arc::new(SubscriptionHub::new());
    let publisher = Publisher::new(hub.clone(), cache.clone());
    let poller = Arc::new(Poller::new(
        provider,
        cache.clone(),
        publisher,
        vocab,
        config.poll_config(),
    ));

    let mut scheduler = Scheduler::new(poller.clone());
    scheduler.start();

    let app = api::router(AppState {
        cache,
        hub,
        poller,
    });
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Listening on http://{} (WebSocket at /ws)", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run the HTTP server until ctrl-c
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    scheduler.stop();
    info!("Shut down");
    Ok(())
}
