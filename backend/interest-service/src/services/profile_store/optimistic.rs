use super::{ApplyOutcome, ProfileStore};
use crate::error::{InterestError, Result};
use crate::metrics;
use crate::models::InterestProfile;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Stored profile plus the version it was written at (0 = never written)
#[derive(Debug, Clone)]
pub struct VersionedProfile {
    pub version: u64,
    pub profile: InterestProfile,
}

/// Durable profile storage with a compare-and-swap primitive
#[async_trait]
pub trait VersionedProfileBackend: Send + Sync {
    async fn load(&self, user_id: Uuid) -> Result<Option<VersionedProfile>>;

    /// Write `profile` at `expected_version + 1` only if the stored version is
    /// still `expected_version`. Returns false when another writer got there first.
    async fn compare_and_swap(&self, expected_version: u64, profile: &InterestProfile)
        -> Result<bool>;
}

/// Profile store that retries lost CAS races a bounded number of times
pub struct OptimisticProfileStore<B: VersionedProfileBackend> {
    backend: Arc<B>,
    dimension: usize,
    max_retries: u32,
}

impl<B: VersionedProfileBackend> OptimisticProfileStore<B> {
    pub fn new(backend: Arc<B>, dimension: usize, max_retries: u32) -> Self {
        Self {
            backend,
            dimension,
            max_retries: max_retries.max(1),
        }
    }

    async fn load_or_cold(&self, user_id: Uuid) -> Result<VersionedProfile> {
        Ok(self
            .backend
            .load(user_id)
            .await?
            .unwrap_or_else(|| VersionedProfile {
                version: 0,
                profile: InterestProfile::new(user_id, self.dimension),
            }))
    }
}

#[async_trait]
impl<B: VersionedProfileBackend> ProfileStore for OptimisticProfileStore<B> {
    async fn create_profile(&self, user_id: Uuid) -> Result<()> {
        if self.backend.load(user_id).await?.is_some() {
            return Ok(());
        }

        // Losing this race means someone else created it
        let cold = InterestProfile::new(user_id, self.dimension);
        self.backend.compare_and_swap(0, &cold).await?;
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

        for attempt in 1..=self.max_retries {
            let VersionedProfile {
                version,
                mut profile,
            } = self.load_or_cold(user_id).await?;

            profile.apply(embedding, weight)?;

            if self.backend.compare_and_swap(version, &profile).await? {
                debug!(
                    user_id = %user_id,
                    version = version + 1,
                    attempt = attempt,
                    total_weight = profile.total_weight,
                    "Interest profile updated"
                );
                return Ok(ApplyOutcome::Applied);
            }

            metrics::record_cas_conflict("retried");
            debug!(user_id = %user_id, attempt = attempt, "Profile CAS lost, retrying");
        }

        metrics::record_cas_conflict("exhausted");
        warn!(
            user_id = %user_id,
            attempts = self.max_retries,
            "Dropping interaction after repeated profile CAS conflicts"
        );

        Err(InterestError::ConcurrentUpdateConflict {
            user_id,
            attempts: self.max_retries,
        })
    }

    async fn read_snapshot(&self, user_id: Uuid) -> Result<InterestProfile> {
        // Each stored version is a whole profile, so any single load is untorn
        Ok(self.load_or_cold(user_id).await?.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Versioned map that can be told to lose the next N swaps
    #[derive(Default)]
    struct FakeBackend {
        rows: Mutex<HashMap<Uuid, VersionedProfile>>,
        forced_conflicts: AtomicU32,
        swaps_attempted: AtomicU32,
    }

    impl FakeBackend {
        fn losing(conflicts: u32) -> Self {
            Self {
                forced_conflicts: AtomicU32::new(conflicts),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl VersionedProfileBackend for FakeBackend {
        async fn load(&self, user_id: Uuid) -> Result<Option<VersionedProfile>> {
            Ok(self.rows.lock().unwrap().get(&user_id).cloned())
        }

        async fn compare_and_swap(
            &self,
            expected_version: u64,
            profile: &InterestProfile,
        ) -> Result<bool> {
            self.swaps_attempted.fetch_add(1, Ordering::SeqCst);

            let forced = self
                .forced_conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if forced {
                return Ok(false);
            }

            let mut rows = self.rows.lock().unwrap();
            let current = rows.get(&profile.user_id).map(|row| row.version).unwrap_or(0);
            if current != expected_version {
                return Ok(false);
            }

            rows.insert(
                profile.user_id,
                VersionedProfile {
                    version: expected_version + 1,
                    profile: profile.clone(),
                },
            );
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_applies_and_bumps_version() {
        let backend = Arc::new(FakeBackend::default());
        let store = OptimisticProfileStore::new(backend.clone(), 3, 4);
        let user_id = Uuid::new_v4();

        store
            .apply_interaction(user_id, Some(&[1.0, 0.0, 0.0][..]), 3.0)
            .await
            .unwrap();
        store
            .apply_interaction(user_id, Some(&[0.0, 1.0, 0.0][..]), 0.5)
            .await
            .unwrap();

        let stored = backend.load(user_id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.profile.total_weight, 3.5);
        assert_eq!(stored.profile.weighted_sum_vector, vec![3.0, 0.5, 0.0]);
    }

    #[tokio::test]
    async fn test_recovers_from_transient_conflicts() {
        let backend = Arc::new(FakeBackend::losing(2));
        let store = OptimisticProfileStore::new(backend.clone(), 2, 3);
        let user_id = Uuid::new_v4();

        let outcome = store
            .apply_interaction(user_id, Some(&[1.0, 1.0][..]), 1.0)
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(backend.swaps_attempted.load(Ordering::SeqCst), 3);
        assert_eq!(store.read_snapshot(user_id).await.unwrap().total_weight, 1.0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_drop_the_interaction() {
        let backend = Arc::new(FakeBackend::losing(10));
        let store = OptimisticProfileStore::new(backend.clone(), 2, 3);
        let user_id = Uuid::new_v4();

        let err = store
            .apply_interaction(user_id, Some(&[1.0, 1.0][..]), 1.0)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InterestError::ConcurrentUpdateConflict { attempts: 3, .. }
        ));
        assert!(err.is_transient());
        assert_eq!(backend.swaps_attempted.load(Ordering::SeqCst), 3);

        let profile = store.read_snapshot(user_id).await.unwrap();
        assert!(profile.is_cold());
        assert_eq!(profile.total_weight, 0.0);
    }

    #[tokio::test]
    async fn test_missing_embedding_never_touches_backend() {
        let backend = Arc::new(FakeBackend::default());
        let store = OptimisticProfileStore::new(backend.clone(), 2, 3);

        let outcome = store
            .apply_interaction(Uuid::new_v4(), None, 3.0)
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::SkippedMissingEmbedding);
        assert_eq!(backend.swaps_attempted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_profile_keeps_existing_data() {
        let backend = Arc::new(FakeBackend::default());
        let store = OptimisticProfileStore::new(backend.clone(), 2, 3);
        let user_id = Uuid::new_v4();

        store.create_profile(user_id).await.unwrap();
        assert_eq!(backend.load(user_id).await.unwrap().unwrap().version, 1);

        store
            .apply_interaction(user_id, Some(&[0.0, 1.0][..]), 1.0)
            .await
            .unwrap();
        store.create_profile(user_id).await.unwrap();

        let stored = backend.load(user_id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.profile.total_weight, 1.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_nothing() {
        let backend = Arc::new(FakeBackend::default());
        // Generous retry budget: every writer must eventually win
        let store = Arc::new(OptimisticProfileStore::new(backend, 3, 10_000));
        let user_id = Uuid::new_v4();
        let n = 64;

        let handles: Vec<_> = (0..n)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .apply_interaction(user_id, Some(&[0.0, 0.0, 2.0][..]), 1.0)
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
        assert_eq!(profile.interest_vector, Some(vec![0.0, 0.0, 2.0]));
    }
}
