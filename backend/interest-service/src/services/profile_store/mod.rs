// ============================================
// Interest Profile Store
// ============================================
//
// One profile per user, mutated only through apply_interaction.
// The update is a read-modify-write over (weighted_sum_vector, total_weight),
// so every implementation serializes writers per user:
//
// - InMemoryProfileStore:   one RwLock per user, no global lock
// - OptimisticProfileStore: versioned compare-and-swap with bounded retries
//                           (Redis backend for durable profiles)

mod optimistic;
mod redis_backend;

pub use optimistic::{OptimisticProfileStore, VersionedProfile, VersionedProfileBackend};
pub use redis_backend::RedisProfileBackend;

use crate::error::Result;
use crate::models::InterestProfile;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// What apply_interaction did with the interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Content had no embedding; profile untouched
    SkippedMissingEmbedding,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Register a cold profile for a new user (no-op if it exists)
    async fn create_profile(&self, user_id: Uuid) -> Result<()>;

    /// Fold `weight * embedding` into the user's profile, atomically per user.
    ///
    /// A missing embedding is a no-op; an embedding of the wrong dimension is
    /// rejected without touching the profile.
    async fn apply_interaction(
        &self,
        user_id: Uuid,
        embedding: Option<&[f32]>,
        weight: f64,
    ) -> Result<ApplyOutcome>;

    /// Consistent copy of the profile as of a single instant.
    ///
    /// Unknown users read as a cold profile.
    async fn read_snapshot(&self, user_id: Uuid) -> Result<InterestProfile>;
}

/// Process-local profile store with per-user locking
pub struct InMemoryProfileStore {
    dimension: usize,
    profiles: DashMap<Uuid, Arc<RwLock<InterestProfile>>>,
}

impl InMemoryProfileStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            profiles: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Per-user slot; the map shard lock is released before the caller awaits
    fn slot(&self, user_id: Uuid) -> Arc<RwLock<InterestProfile>> {
        self.profiles
            .entry(user_id)
            .or_insert_with(|| Arc::new(RwLock::new(InterestProfile::new(user_id, self.dimension))))
            .clone()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn create_profile(&self, user_id: Uuid) -> Result<()> {
        self.slot(user_id);
        Ok(())
    }

    async fn apply_interaction(
        &self,
        user_id: Uuid,
        embedding: Option<&[f32]>,
        weight: f64,
    ) -> Result<ApplyOutcome> {
        let Some(embedding) = embedding else {
            return Ok(ApplyOutcome::SkippedMissingEmbedding);
        };

        let slot = self.slot(user_id);
        let mut profile = slot.write().await;
        profile.apply(embedding, weight)?;

        debug!(
            user_id = %user_id,
            weight = weight,
            total_weight = profile.total_weight,
            "Interest profile updated"
        );

        Ok(ApplyOutcome::Applied)
    }

    async fn read_snapshot(&self, user_id: Uuid) -> Result<InterestProfile> {
        let slot = self.profiles.get(&user_id).map(|slot| slot.clone());

        match slot {
            Some(slot) => Ok(slot.read().await.clone()),
            None => Ok(InterestProfile::new(user_id, self.dimension)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InterestError;

    const TOLERANCE: f64 = 1e-6;

    fn assert_close(actual: &[f32], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!(
                (*a as f64 - e).abs() < TOLERANCE,
                "expected {:?}, got {:?}",
                expected,
                actual
            );
        }
    }

    #[tokio::test]
    async fn test_upvote_then_community_click() {
        let store = InMemoryProfileStore::new(3);
        let user_id = Uuid::new_v4();

        store
            .apply_interaction(user_id, Some(&[1.0, 0.0, 0.0][..]), 3.0)
            .await
            .unwrap();
        let profile = store.read_snapshot(user_id).await.unwrap();
        assert_eq!(profile.total_weight, 3.0);
        assert_eq!(profile.weighted_sum_vector, vec![3.0, 0.0, 0.0]);
        assert_close(profile.interest_vector.as_deref().unwrap(), &[1.0, 0.0, 0.0]);

        store
            .apply_interaction(user_id, Some(&[0.0, 1.0, 0.0][..]), 0.5)
            .await
            .unwrap();
        let profile = store.read_snapshot(user_id).await.unwrap();
        assert_eq!(profile.total_weight, 3.5);
        assert_eq!(profile.weighted_sum_vector, vec![3.0, 0.5, 0.0]);
        assert_close(
            profile.interest_vector.as_deref().unwrap(),
            &[3.0 / 3.5, 0.5 / 3.5, 0.0],
        );
    }

    #[tokio::test]
    async fn test_missing_embedding_is_noop() {
        let store = InMemoryProfileStore::new(3);
        let user_id = Uuid::new_v4();
        store.create_profile(user_id).await.unwrap();

        let outcome = store.apply_interaction(user_id, None, 3.0).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::SkippedMissingEmbedding);

        let profile = store.read_snapshot(user_id).await.unwrap();
        assert_eq!(profile.total_weight, 0.0);
        assert!(profile.is_cold());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_leaves_profile_untouched() {
        let store = InMemoryProfileStore::new(3);
        let user_id = Uuid::new_v4();
        store
            .apply_interaction(user_id, Some(&[1.0, 0.0, 0.0][..]), 1.0)
            .await
            .unwrap();

        let err = store
            .apply_interaction(user_id, Some(&[1.0, 0.0][..]), 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, InterestError::DimensionMismatch { .. }));

        let profile = store.read_snapshot(user_id).await.unwrap();
        assert_eq!(profile.total_weight, 1.0);
    }

    #[tokio::test]
    async fn test_unknown_user_reads_cold_without_registering() {
        let store = InMemoryProfileStore::new(4);
        let profile = store.read_snapshot(Uuid::new_v4()).await.unwrap();
        assert!(profile.is_cold());
        assert_eq!(profile.dimension(), 4);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_create_profile_is_idempotent() {
        let store = InMemoryProfileStore::new(3);
        let user_id = Uuid::new_v4();
        store.create_profile(user_id).await.unwrap();
        store
            .apply_interaction(user_id, Some(&[0.0, 0.0, 1.0][..]), 1.0)
            .await
            .unwrap();
        store.create_profile(user_id).await.unwrap();

        let profile = store.read_snapshot(user_id).await.unwrap();
        assert_eq!(profile.total_weight, 1.0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_weighted_mean_is_order_independent() {
        let interactions: Vec<(Vec<f32>, f64)> = vec![
            (vec![0.2, 0.9, 0.1], 3.0),
            (vec![0.7, 0.1, 0.4], 1.0),
            (vec![0.3, 0.3, 0.8], 0.5),
            (vec![0.9, 0.5, 0.2], -3.0),
            (vec![0.1, 0.6, 0.6], 1.0),
        ];

        let total: f64 = interactions.iter().map(|(_, w)| w).sum();
        let expected: Vec<f64> = (0..3)
            .map(|i| {
                interactions
                    .iter()
                    .map(|(v, w)| w * v[i] as f64)
                    .sum::<f64>()
                    / total
            })
            .collect();

        let forward = InMemoryProfileStore::new(3);
        let backward = InMemoryProfileStore::new(3);
        let user_id = Uuid::new_v4();

        for (v, w) in &interactions {
            forward.apply_interaction(user_id, Some(v.as_slice()), *w).await.unwrap();
        }
        for (v, w) in interactions.iter().rev() {
            backward.apply_interaction(user_id, Some(v.as_slice()), *w).await.unwrap();
        }

        let forward = forward.read_snapshot(user_id).await.unwrap();
        let backward = backward.read_snapshot(user_id).await.unwrap();
        assert_close(forward.interest_vector.as_deref().unwrap(), &expected);
        assert_close(backward.interest_vector.as_deref().unwrap(), &expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_are_not_lost() {
        let store = Arc::new(InMemoryProfileStore::new(3));
        let user_id = Uuid::new_v4();
        let n = 200;

        let handles: Vec<_> = (0..n)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .apply_interaction(user_id, Some(&[0.6, 0.8, 0.0][..]), 1.0)
                        .await
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let profile = store.read_snapshot(user_id).await.unwrap();
        assert_eq!(profile.total_weight, n as f64);
        assert_eq!(profile.interaction_count, n as u64);
        assert_close(profile.interest_vector.as_deref().unwrap(), &[0.6, 0.8, 0.0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_users_update_independently() {
        let store = Arc::new(InMemoryProfileStore::new(2));
        let users: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

        let handles: Vec<_> = users
            .iter()
            .flat_map(|&user_id| {
                let store = store.clone();
                (0..25).map(move |_| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        store
                            .apply_interaction(user_id, Some(&[1.0, 0.0][..]), 0.5)
                            .await
                            .unwrap();
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        for user_id in users {
            let profile = store.read_snapshot(user_id).await.unwrap();
            assert_eq!(profile.total_weight, 12.5);
        }
    }
}
