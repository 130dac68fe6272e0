use anyhow::Context;
use interest_service::{
    consumers::{InteractionEventsConsumer, InteractionEventsConsumerConfig},
    services::{
        OptimisticProfileStore, RedisContentStore, RedisExclusionIndex, RedisProfileBackend,
    },
    Config, EventDispatcher,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env().context("Failed to load config")?;
    config.validate()?;

    info!(
        "Starting {} (dimension={}, stream={})",
        config.service_name, config.embedding_dimension, config.interaction_stream_key
    );

    // Initialize Redis
    let redis_client =
        redis::Client::open(config.redis_url.clone()).context("Failed to create Redis client")?;
    let conn = redis::aio::ConnectionManager::new(redis_client.clone())
        .await
        .context("Failed to connect to Redis")?;

    // Durable stores
    let profiles = Arc::new(OptimisticProfileStore::new(
        Arc::new(RedisProfileBackend::new(conn.clone())),
        config.embedding_dimension,
        config.profile_max_cas_retries,
    ));
    let exclusions = Arc::new(RedisExclusionIndex::new(conn.clone()));
    let content = Arc::new(RedisContentStore::new(conn));

    let dispatcher = Arc::new(EventDispatcher::new(
        content,
        profiles,
        exclusions,
        config.dispatcher(),
    ));

    // Periodic dedup cleanup
    let cleanup_dispatcher = dispatcher.clone();
    let cleanup_interval = Duration::from_secs(config.dedup_cleanup_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_interval);
        loop {
            ticker.tick().await;
            let removed = cleanup_dispatcher.cleanup_expired();
            if removed > 0 {
                info!(removed = removed, "Expired dispatch dedup entries removed");
            }
        }
    });

    let consumer = InteractionEventsConsumer::new(
        redis_client,
        dispatcher,
        InteractionEventsConsumerConfig::from(&config),
    );

    tokio::select! {
        _ = consumer.run() => {
            warn!("Interaction events consumer stopped");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
