// Redis-backed profile rows
//
// Key: interest:profile:{user_id} (hash)
//   version -> monotonically increasing write counter
//   data    -> JSON encoded InterestProfile
//
// The swap runs as a Lua script so the version check and the write are atomic
// on the server; no WATCH state is held on the shared connection.

use super::optimistic::{VersionedProfile, VersionedProfileBackend};
use crate::error::Result;
use crate::models::InterestProfile;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use uuid::Uuid;

const COMPARE_AND_SWAP_SCRIPT: &str = r#"
    local current = redis.call('HGET', KEYS[1], 'version')
    if (not current and ARGV[1] == '0') or current == ARGV[1] then
        redis.call('HSET', KEYS[1], 'version', ARGV[2], 'data', ARGV[3])
        return 1
    end
    return 0
"#;

pub struct RedisProfileBackend {
    conn: ConnectionManager,
    key_prefix: String,
    swap_script: Script,
}

impl RedisProfileBackend {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: "interest:profile".to_string(),
            swap_script: Script::new(COMPARE_AND_SWAP_SCRIPT),
        }
    }

    fn profile_key(&self, user_id: Uuid) -> String {
        format!("{}:{}", self.key_prefix, user_id)
    }
}

#[async_trait]
impl VersionedProfileBackend for RedisProfileBackend {
    async fn load(&self, user_id: Uuid) -> Result<Option<VersionedProfile>> {
        let mut conn = self.conn.clone();

        let (version, data): (Option<u64>, Option<String>) = redis::cmd("HMGET")
            .arg(self.profile_key(user_id))
            .arg("version")
            .arg("data")
            .query_async(&mut conn)
            .await?;

        match (version, data) {
            (Some(version), Some(data)) => {
                let profile: InterestProfile = serde_json::from_str(&data)?;
                Ok(Some(VersionedProfile { version, profile }))
            }
            _ => Ok(None),
        }
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        profile: &InterestProfile,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let data = serde_json::to_string(profile)?;

        let swapped: i64 = self
            .swap_script
            .key(self.profile_key(profile.user_id))
            .arg(expected_version.to_string())
            .arg((expected_version + 1).to_string())
            .arg(data)
            .invoke_async(&mut conn)
            .await?;

        Ok(swapped == 1)
    }
}
