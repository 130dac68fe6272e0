// ============================================
// Event Dispatcher
// ============================================
//
// Single entry point for interaction events:
//
//   event → validate → dedup → weight_for(kind)
//         → ProfileStore.apply_interaction(user, embedding, weight)
//         → ExclusionIndex.record(user, content)
//
// The two writes touch disjoint state. Both are attempted even when the
// other fails; a failure only means this one interaction was (partly) lost.
// An event whose profile write failed transiently is forgotten by the dedup
// window, so a redelivery of the same event id is applied.

use crate::error::{InterestError, Result};
use crate::metrics;
use crate::models::{InteractionEvent, InteractionEventPayload};
use crate::services::content::ContentStore;
use crate::services::exclusion::ExclusionIndex;
use crate::services::profile_store::{ApplyOutcome, ProfileStore};
use crate::services::weighting::weight_for;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long an event id is remembered for duplicate detection
    pub dedup_ttl: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            dedup_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Processed {
        profile_updated: bool,
        exclusion_recorded: bool,
        /// Profile write failed transiently; redelivering the event can still apply it
        retryable: bool,
    },
    /// Same event id already dispatched within the dedup window
    Duplicate,
}

pub struct EventDispatcher {
    content: Arc<dyn ContentStore>,
    profiles: Arc<dyn ProfileStore>,
    exclusions: Arc<dyn ExclusionIndex>,
    seen: DashMap<Uuid, Instant>,
    config: DispatcherConfig,
}

impl DispatchOutcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchOutcome::Processed { retryable: true, .. })
    }
}

/// Result of the profile half of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileWrite {
    Updated,
    Skipped,
    Retryable,
}

impl EventDispatcher {
    pub fn new(
        content: Arc<dyn ContentStore>,
        profiles: Arc<dyn ProfileStore>,
        exclusions: Arc<dyn ExclusionIndex>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            content,
            profiles,
            exclusions,
            seen: DashMap::new(),
            config,
        }
    }

    /// New account: start from a cold profile
    pub async fn on_user_registered(&self, user_id: Uuid) -> Result<()> {
        self.profiles.create_profile(user_id).await?;
        info!(user_id = %user_id, "Cold interest profile created");
        Ok(())
    }

    /// Validate a raw payload and dispatch it. Invalid payloads are rejected
    /// before any state is touched.
    pub async fn on_payload(&self, payload: InteractionEventPayload) -> Result<DispatchOutcome> {
        let event = InteractionEvent::try_from(payload).map_err(|e| {
            // Raw kinds are untrusted and never become metric labels
            metrics::record_event("invalid", "rejected");
            warn!(error = %e, "Rejected interaction event");
            e
        })?;

        self.on_event(event).await
    }

    pub async fn on_event(&self, event: InteractionEvent) -> Result<DispatchOutcome> {
        let kind = event.kind.as_str();

        if !self.first_delivery(event.event_id) {
            debug!(event_id = %event.event_id, "Skipping duplicate interaction event");
            metrics::record_event(kind, "duplicate");
            return Ok(DispatchOutcome::Duplicate);
        }

        let weight = weight_for(event.kind);
        let profile_write = self.apply_to_profile(&event, weight).await;
        let exclusion_recorded = self.record_exclusion(&event).await;

        let profile_updated = profile_write == ProfileWrite::Updated;
        let retryable = profile_write == ProfileWrite::Retryable;
        if retryable {
            self.seen.remove(&event.event_id);
        }

        let outcome = match (profile_updated && exclusion_recorded, retryable) {
            (true, _) => "applied",
            (false, true) => "retryable",
            (false, false) => "partial",
        };
        metrics::record_event(kind, outcome);

        debug!(
            event_id = %event.event_id,
            user_id = %event.user_id,
            content_id = %event.content_id,
            kind = kind,
            weight = weight,
            profile_updated = profile_updated,
            exclusion_recorded = exclusion_recorded,
            retryable = retryable,
            "Interaction dispatched"
        );

        Ok(DispatchOutcome::Processed {
            profile_updated,
            exclusion_recorded,
            retryable,
        })
    }

    /// Forget event ids older than the dedup window; returns how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let before = self.seen.len();
        let ttl = self.config.dedup_ttl;
        self.seen.retain(|_, first_seen| first_seen.elapsed() <= ttl);
        before.saturating_sub(self.seen.len())
    }

    fn first_delivery(&self, event_id: Uuid) -> bool {
        match self.seen.entry(event_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().elapsed() > self.config.dedup_ttl {
                    entry.insert(Instant::now());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                true
            }
        }
    }

    async fn apply_to_profile(&self, event: &InteractionEvent, weight: f64) -> ProfileWrite {
        let embedding = match self.content.embedding(event.content_id).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(
                    content_id = %event.content_id,
                    error = %e,
                    "Embedding lookup failed, profile not updated"
                );
                return failed_write(&e);
            }
        };

        let result = self
            .profiles
            .apply_interaction(
                event.user_id,
                embedding.as_ref().map(|e| e.embedding.as_slice()),
                weight,
            )
            .await;

        match result {
            Ok(ApplyOutcome::Applied) => ProfileWrite::Updated,
            Ok(ApplyOutcome::SkippedMissingEmbedding) => {
                metrics::record_missing_embedding();
                warn!(
                    user_id = %event.user_id,
                    content_id = %event.content_id,
                    "Content has no embedding yet, profile not updated"
                );
                ProfileWrite::Skipped
            }
            Err(e @ InterestError::ConcurrentUpdateConflict { .. }) => {
                warn!(user_id = %event.user_id, error = %e, "Interaction lost to concurrent updates");
                failed_write(&e)
            }
            Err(e) => {
                warn!(user_id = %event.user_id, error = %e, "Profile update failed");
                failed_write(&e)
            }
        }
    }

    async fn record_exclusion(&self, event: &InteractionEvent) -> bool {
        match self.exclusions.record(event.user_id, event.content_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    user_id = %event.user_id,
                    content_id = %event.content_id,
                    error = %e,
                    "Exclusion record failed"
                );
                false
            }
        }
    }
}

fn failed_write(err: &InterestError) -> ProfileWrite {
    if err.is_transient() {
        ProfileWrite::Retryable
    } else {
        ProfileWrite::Skipped
    }
}
