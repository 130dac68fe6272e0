use crate::error::Result;
use crate::metrics;
use crate::models::{ContentEmbedding, OwnerKind};
use crate::services::content::ContentStore;
use crate::services::exclusion::ExclusionIndex;
use crate::services::profile_store::ProfileStore;
use crate::utils::cosine_distance;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// Upper bound on candidates scanned per request. The cap applies before
    /// exclusions are filtered, so touched items count against it.
    pub max_candidates: usize,
    /// Upper bound on results per request
    pub max_k: usize,
    /// Result count for the "for you" page
    pub default_k: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            max_candidates: 5000,
            max_k: 100,
            default_k: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredContent {
    pub content_id: Uuid,
    /// Cosine distance to the interest vector, smaller is closer
    pub distance: f64,
}

/// Nearest-neighbour ranking of content against a user's interest vector
pub struct RecommendationEngine {
    profiles: Arc<dyn ProfileStore>,
    exclusions: Arc<dyn ExclusionIndex>,
    content: Arc<dyn ContentStore>,
    config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        exclusions: Arc<dyn ExclusionIndex>,
        content: Arc<dyn ContentStore>,
        config: RecommendationConfig,
    ) -> Self {
        Self {
            profiles,
            exclusions,
            content,
            config,
        }
    }

    /// Top-k content ids from `candidate_pool`, closest first
    pub async fn recommend(
        &self,
        user_id: Uuid,
        candidate_pool: &[ContentEmbedding],
        k: usize,
    ) -> Result<Vec<Uuid>> {
        Ok(self
            .recommend_scored(user_id, candidate_pool, k)
            .await?
            .into_iter()
            .map(|scored| scored.content_id)
            .collect())
    }

    /// Same ranking as `recommend`, with distances attached.
    ///
    /// Cold-start users (no accumulated weight) get an empty result rather
    /// than a ranking against an arbitrary default vector.
    pub async fn recommend_scored(
        &self,
        user_id: Uuid,
        candidate_pool: &[ContentEmbedding],
        k: usize,
    ) -> Result<Vec<ScoredContent>> {
        let started = Instant::now();

        let Some(interest) = self.interest_vector(user_id, started).await? else {
            return Ok(Vec::new());
        };
        self.rank(user_id, &interest, candidate_pool, k, started)
            .await
    }

    /// Rank the newest content of `kind` from the content store
    pub async fn recommend_from_store(
        &self,
        user_id: Uuid,
        kind: Option<OwnerKind>,
        k: usize,
    ) -> Result<Vec<Uuid>> {
        let started = Instant::now();

        let Some(interest) = self.interest_vector(user_id, started).await? else {
            return Ok(Vec::new());
        };

        let pool = self
            .content
            .candidate_pool(kind, self.config.max_candidates)
            .await?;

        Ok(self
            .rank(user_id, &interest, &pool, k, started)
            .await?
            .into_iter()
            .map(|scored| scored.content_id)
            .collect())
    }

    /// "For you" page: newest topics, `default_k` results
    pub async fn recommend_for_you(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.recommend_from_store(user_id, Some(OwnerKind::Topic), self.config.default_k)
            .await
    }

    async fn interest_vector(&self, user_id: Uuid, started: Instant) -> Result<Option<Vec<f32>>> {
        let profile = self.profiles.read_snapshot(user_id).await?;
        if profile.interest_vector.is_none() {
            debug!(user_id = %user_id, "Cold start profile, no recommendations");
            metrics::record_recommend("cold_start", started.elapsed());
        }
        Ok(profile.interest_vector)
    }

    async fn rank(
        &self,
        user_id: Uuid,
        interest: &[f32],
        candidate_pool: &[ContentEmbedding],
        k: usize,
        started: Instant,
    ) -> Result<Vec<ScoredContent>> {
        let k = k.min(self.config.max_k);
        if k == 0 {
            metrics::record_recommend("empty", started.elapsed());
            return Ok(Vec::new());
        }

        let excluded = self.exclusions.excluded_set(user_id).await?;
        let pool = &candidate_pool[..candidate_pool.len().min(self.config.max_candidates)];
        let ranked = rank_candidates(interest, pool, &excluded, k);

        info!(
            user_id = %user_id,
            candidates = pool.len(),
            excluded = excluded.len(),
            returned = ranked.len(),
            "Recommendations ranked"
        );
        metrics::record_recommend("ranked", started.elapsed());

        Ok(ranked)
    }
}

/// Full scan: drop excluded, duplicate and embedding-less candidates, then
/// order by (distance, content_id) ascending and keep the first `k`.
fn rank_candidates(
    interest: &[f32],
    pool: &[ContentEmbedding],
    excluded: &HashSet<Uuid>,
    k: usize,
) -> Vec<ScoredContent> {
    let mut seen: HashSet<Uuid> = HashSet::new();

    let mut scored: Vec<ScoredContent> = pool
        .iter()
        .filter(|item| item.embedding.len() == interest.len())
        .filter(|item| !excluded.contains(&item.content_id))
        .filter(|item| seen.insert(item.content_id))
        .map(|item| ScoredContent {
            content_id: item.content_id,
            distance: cosine_distance(&item.embedding, interest),
        })
        .collect();

    scored.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.content_id.cmp(&b.content_id))
    });
    scored.truncate(k);
    scored
}
