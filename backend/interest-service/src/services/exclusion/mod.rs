// ============================================
// Exclusion Index
// ============================================
//
// Every (user, content) pair the user ever voted on or viewed.
// Recommendations never return a member of the user's set.
// Entries never expire: content touched years ago stays excluded.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait ExclusionIndex: Send + Sync {
    /// Idempotent: recording the same pair twice has no further effect
    async fn record(&self, user_id: Uuid, content_id: Uuid) -> Result<()>;

    async fn excluded_set(&self, user_id: Uuid) -> Result<HashSet<Uuid>>;

    async fn contains(&self, user_id: Uuid, content_id: Uuid) -> Result<bool>;
}

#[derive(Default)]
pub struct InMemoryExclusionIndex {
    entries: DashMap<Uuid, HashSet<Uuid>>,
}

impl InMemoryExclusionIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExclusionIndex for InMemoryExclusionIndex {
    async fn record(&self, user_id: Uuid, content_id: Uuid) -> Result<()> {
        self.entries.entry(user_id).or_default().insert(content_id);
        Ok(())
    }

    async fn excluded_set(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        Ok(self
            .entries
            .get(&user_id)
            .map(|set| set.clone())
            .unwrap_or_default())
    }

    async fn contains(&self, user_id: Uuid, content_id: Uuid) -> Result<bool> {
        Ok(self
            .entries
            .get(&user_id)
            .map(|set| set.contains(&content_id))
            .unwrap_or(false))
    }
}

/// Redis sets at interest:excluded:{user_id}, no TTL
pub struct RedisExclusionIndex {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisExclusionIndex {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: "interest:excluded".to_string(),
        }
    }

    fn excluded_key(&self, user_id: Uuid) -> String {
        format!("{}:{}", self.key_prefix, user_id)
    }
}

#[async_trait]
impl ExclusionIndex for RedisExclusionIndex {
    async fn record(&self, user_id: Uuid, content_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let added: i64 = conn
            .sadd(self.excluded_key(user_id), content_id.to_string())
            .await?;

        debug!(
            user_id = %user_id,
            content_id = %content_id,
            new_entry = added == 1,
            "Exclusion recorded"
        );
        Ok(())
    }

    async fn excluded_set(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(self.excluded_key(user_id)).await?;

        // Foreign members (not UUIDs) cannot match any content id
        Ok(members
            .iter()
            .filter_map(|member| Uuid::parse_str(member).ok())
            .collect())
    }

    async fn contains(&self, user_id: Uuid, content_id: Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        let member: bool = conn
            .sismember(self.excluded_key(user_id), content_id.to_string())
            .await?;
        Ok(member)
    }
}
