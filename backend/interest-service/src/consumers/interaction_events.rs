//! Interaction Events Consumer
//!
//! Reads vote/click events from a Redis stream through a consumer group and
//! hands each one to the EventDispatcher. One JSON payload per entry, in the
//! `payload` field. Entries are acknowledged after dispatch, including
//! rejected ones, so a malformed event is never redelivered forever. Entries
//! whose profile write failed transiently stay pending.
//!
//! On startup the consumer first replays its own pending entries (delivered
//! before a crash or left unacked for a retry), once each, and then switches
//! to new entries.

use crate::config::Config;
use crate::error::{InterestError, Result};
use crate::models::InteractionEventPayload;
use crate::services::dispatcher::{DispatchOutcome, EventDispatcher};
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PAYLOAD_FIELD: &str = "payload";

/// Configuration for the interaction events stream consumer
#[derive(Debug, Clone)]
pub struct InteractionEventsConsumerConfig {
    pub stream_key: String,
    pub group: String,
    pub consumer_name: String,
    pub batch_size: usize,
    pub block_ms: usize,
}

impl From<&Config> for InteractionEventsConsumerConfig {
    fn from(config: &Config) -> Self {
        Self {
            stream_key: config.interaction_stream_key.clone(),
            group: config.interaction_consumer_group.clone(),
            consumer_name: config.interaction_consumer_name.clone(),
            batch_size: config.stream_batch_size,
            block_ms: config.stream_block_ms,
        }
    }
}

pub struct InteractionEventsConsumer {
    redis: redis::Client,
    dispatcher: Arc<EventDispatcher>,
    config: InteractionEventsConsumerConfig,
}

impl InteractionEventsConsumer {
    pub fn new(
        redis: redis::Client,
        dispatcher: Arc<EventDispatcher>,
        config: InteractionEventsConsumerConfig,
    ) -> Self {
        Self {
            redis,
            dispatcher,
            config,
        }
    }

    /// Run the consumer loop
    pub async fn run(self) {
        if let Err(err) = self.run_inner().await {
            error!("Interaction events consumer terminated with error: {err}");
        }
    }

    async fn run_inner(&self) -> Result<()> {
        info!(
            "Starting interaction events consumer (stream: {}, group: {}, consumer: {})",
            self.config.stream_key, self.config.group, self.config.consumer_name
        );

        // Blocking reads get their own connection so they never stall store traffic
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        self.ensure_group(&mut conn).await?;

        let replayed = self.drain_pending(&mut conn).await?;
        if replayed > 0 {
            info!(replayed = replayed, "Replayed pending interaction entries");
        }

        let options = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer_name)
            .count(self.config.batch_size)
            .block(self.config.block_ms);

        loop {
            let reply: StreamReadReply = match conn
                .xread_options(&[&self.config.stream_key], &[">"], &options)
                .await
            {
                Ok(reply) => reply,
                Err(err) => {
                    error!("Redis stream read error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            for stream in reply.keys {
                for entry in stream.ids {
                    self.process_entry(&mut conn, &entry).await;
                }
            }
        }
    }

    /// Walk this consumer's pending list from the start, advancing past each
    /// batch so an entry that stays unacked is not read again in this pass.
    async fn drain_pending(&self, conn: &mut redis::aio::MultiplexedConnection) -> Result<usize> {
        let options = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer_name)
            .count(self.config.batch_size);

        let mut cursor = "0".to_string();
        let mut replayed = 0;

        loop {
            let reply: StreamReadReply = conn
                .xread_options(&[&self.config.stream_key], &[&cursor], &options)
                .await?;

            let entries: Vec<StreamId> = reply.keys.into_iter().flat_map(|s| s.ids).collect();
            let Some(last) = entries.last() else {
                return Ok(replayed);
            };
            cursor = last.id.clone();

            for entry in &entries {
                self.process_entry(conn, entry).await;
                replayed += 1;
            }
        }
    }

    async fn process_entry(&self, conn: &mut redis::aio::MultiplexedConnection, entry: &StreamId) {
        if !self.handle_entry(entry).await {
            return;
        }

        let acked: redis::RedisResult<i64> = conn
            .xack(&self.config.stream_key, &self.config.group, &[&entry.id])
            .await;
        if let Err(err) = acked {
            warn!(entry_id = %entry.id, "Failed to ack stream entry: {}", err);
        }
    }

    async fn ensure_group(&self, conn: &mut redis::aio::MultiplexedConnection) -> Result<()> {
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.config.stream_key, &self.config.group, "$")
            .await;

        match created {
            Ok(()) => {
                info!(group = %self.config.group, "Created interaction consumer group");
                Ok(())
            }
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Dispatch one entry; returns whether it should be acknowledged
    async fn handle_entry(&self, entry: &StreamId) -> bool {
        let Some(raw) = entry.get::<String>(PAYLOAD_FIELD) else {
            warn!(entry_id = %entry.id, "Stream entry without payload field");
            return true;
        };

        let result = dispatch_raw(&self.dispatcher, &raw).await;
        match &result {
            Ok(DispatchOutcome::Duplicate) => {
                debug!(entry_id = %entry.id, "Duplicate interaction event skipped");
            }
            Ok(outcome) if outcome.is_retryable() => {
                warn!(entry_id = %entry.id, "Interaction left pending for retry");
            }
            Ok(DispatchOutcome::Processed { .. }) => {}
            Err(err) => {
                warn!(entry_id = %entry.id, error = %err, "Interaction event dropped");
            }
        }

        should_ack(&result)
    }
}

/// Everything is acknowledged except a dispatch whose profile write can still succeed
fn should_ack(result: &Result<DispatchOutcome>) -> bool {
    !matches!(result, Ok(outcome) if outcome.is_retryable())
}

/// Decode one JSON payload and dispatch it
pub async fn dispatch_raw(dispatcher: &EventDispatcher, raw: &str) -> Result<DispatchOutcome> {
    let payload: InteractionEventPayload = serde_json::from_str(raw)
        .map_err(|e| InterestError::InvalidEvent(format!("malformed payload: {}", e)))?;
    dispatcher.on_payload(payload).await
}
