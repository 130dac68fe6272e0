// ============================================
// Content Embedding Store
// ============================================
//
// Embeddings are computed once, when a topic/comment/community is created,
// by an external embed(text) function; they are registered here and never
// replaced. The candidate pool for recommendations is the newest `cap`
// embeddings, optionally restricted to one owner kind.
//
// Redis keys:
// - interest:embedding:{content_id}  - JSON ContentEmbedding (SET NX)
// - interest:pool:{kind}             - Sorted set of content ids by creation time
//
// Both keys are written by one Lua script, so an embedding is never stored
// without its pool entry.

use crate::error::{InterestError, Result};
use crate::models::{ContentEmbedding, OwnerKind};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, warn};
use uuid::Uuid;

const REGISTER_SCRIPT: &str = r#"
    if redis.call('SET', KEYS[1], ARGV[1], 'NX') then
        redis.call('ZADD', KEYS[2], ARGV[2], ARGV[3])
        return 1
    end
    return 0
"#;

const ALL_KINDS: [OwnerKind; 3] = [OwnerKind::Topic, OwnerKind::Comment, OwnerKind::Community];

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store an embedding; refuses a second embedding for the same content
    async fn register(&self, embedding: ContentEmbedding) -> Result<()>;

    async fn embedding(&self, content_id: Uuid) -> Result<Option<ContentEmbedding>>;

    /// Newest `cap` embeddings, newest first
    async fn candidate_pool(
        &self,
        kind: Option<OwnerKind>,
        cap: usize,
    ) -> Result<Vec<ContentEmbedding>>;
}

#[derive(Default)]
pub struct InMemoryContentStore {
    embeddings: DashMap<Uuid, ContentEmbedding>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn register(&self, embedding: ContentEmbedding) -> Result<()> {
        match self.embeddings.entry(embedding.content_id) {
            Entry::Occupied(_) => Err(InterestError::EmbeddingAlreadyExists(embedding.content_id)),
            Entry::Vacant(slot) => {
                slot.insert(embedding);
                Ok(())
            }
        }
    }

    async fn embedding(&self, content_id: Uuid) -> Result<Option<ContentEmbedding>> {
        Ok(self.embeddings.get(&content_id).map(|e| e.clone()))
    }

    async fn candidate_pool(
        &self,
        kind: Option<OwnerKind>,
        cap: usize,
    ) -> Result<Vec<ContentEmbedding>> {
        let mut pool: Vec<ContentEmbedding> = self
            .embeddings
            .iter()
            .filter(|e| kind.map_or(true, |k| e.owner_kind == k))
            .map(|e| e.value().clone())
            .collect();

        sort_newest_first(&mut pool);
        pool.truncate(cap);
        Ok(pool)
    }
}

pub struct RedisContentStore {
    conn: ConnectionManager,
    key_prefix: String,
    register_script: Script,
}

impl RedisContentStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: "interest".to_string(),
            register_script: Script::new(REGISTER_SCRIPT),
        }
    }

    fn embedding_key(&self, content_id: Uuid) -> String {
        format!("{}:embedding:{}", self.key_prefix, content_id)
    }

    fn pool_key(&self, kind: OwnerKind) -> String {
        format!("{}:pool:{}", self.key_prefix, kind.as_str())
    }

    async fn newest_ids(&self, kind: OwnerKind, cap: usize) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrevrange(self.pool_key(kind), 0, cap as isize - 1)
            .await?;
        Ok(ids)
    }
}

#[async_trait]
impl ContentStore for RedisContentStore {
    async fn register(&self, embedding: ContentEmbedding) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&embedding)?;

        let created: i64 = self
            .register_script
            .key(self.embedding_key(embedding.content_id))
            .key(self.pool_key(embedding.owner_kind))
            .arg(json)
            .arg(embedding.created_at.timestamp_millis())
            .arg(embedding.content_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        if created != 1 {
            return Err(InterestError::EmbeddingAlreadyExists(embedding.content_id));
        }

        debug!(
            content_id = %embedding.content_id,
            owner_kind = embedding.owner_kind.as_str(),
            dimension = embedding.embedding.len(),
            "Content embedding registered"
        );
        Ok(())
    }

    async fn embedding(&self, content_id: Uuid) -> Result<Option<ContentEmbedding>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(self.embedding_key(content_id)).await?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn candidate_pool(
        &self,
        kind: Option<OwnerKind>,
        cap: usize,
    ) -> Result<Vec<ContentEmbedding>> {
        if cap == 0 {
            return Ok(Vec::new());
        }

        let kinds: Vec<OwnerKind> = match kind {
            Some(kind) => vec![kind],
            None => ALL_KINDS.to_vec(),
        };

        let mut ids = Vec::new();
        for kind in kinds {
            ids.extend(self.newest_ids(kind, cap).await?);
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| format!("{}:embedding:{}", self.key_prefix, id))
            .collect();

        let mut conn = self.conn.clone();
        let rows: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

        let mut pool = Vec::with_capacity(rows.len());
        for (id, row) in ids.iter().zip(rows) {
            match row.map(|data| serde_json::from_str::<ContentEmbedding>(&data)) {
                Some(Ok(embedding)) => pool.push(embedding),
                Some(Err(e)) => warn!(content_id = %id, error = %e, "Skipping unreadable embedding"),
                None => warn!(content_id = %id, "Pool entry without embedding"),
            }
        }

        sort_newest_first(&mut pool);
        pool.truncate(cap);
        Ok(pool)
    }
}

fn sort_newest_first(pool: &mut [ContentEmbedding]) {
    pool.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.content_id.cmp(&b.content_id))
    });
}
