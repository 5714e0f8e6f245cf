use rand::RngCore;
use redis::{AsyncCommands, RedisResult};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Persistent, expiring refresh-token store.
///
/// Tokens are opaque 256-bit random strings; only their SHA-256 hash is ever
/// stored, keyed under `refresh:{hash}` with the configured TTL, so a leaked
/// store dump cannot be replayed and a process restart neither grants nor
/// revokes sessions.
pub struct RefreshTokenStore {
    client: redis::Client,
    ttl_seconds: u64,
}

impl RefreshTokenStore {
    pub fn new(connection_string: &str, ttl_seconds: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            ttl_seconds,
        })
    }

    /// Mints a fresh opaque token. The caller hands it to the client and
    /// stores only its hash via [`store`](Self::store).
    pub fn issue_token() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn hash_token(token: &str) -> String {
        format!("{:x}", Sha256::digest(token.as_bytes()))
    }

    fn key(token: &str) -> String {
        format!("refresh:{}", Self::hash_token(token))
    }

    pub async fn store(&self, token: &str, rider_id: Uuid) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(Self::key(token), rider_id.to_string(), self.ttl_seconds)
            .await?;
        Ok(())
    }

    pub async fn lookup(&self, token: &str) -> RedisResult<Option<Uuid>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(Self::key(token)).await?;
        Ok(value.and_then(|v| Uuid::parse_str(&v).ok()))
    }

    pub async fn revoke(&self, token: &str) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(Self::key(token)).await?;
        Ok(())
    }

    /// Replaces the old token with a new one in a single atomic pipeline, so
    /// a crash between the two writes cannot leave both valid.
    pub async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        rider_id: Uuid,
    ) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .del(Self::key(old_token))
            .ignore()
            .set_ex(Self::key(new_token), rider_id.to_string(), self.ttl_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_are_long_and_hex() {
        let token = RefreshTokenStore::issue_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, RefreshTokenStore::issue_token());
    }

    #[test]
    fn hashing_is_deterministic_and_one_way() {
        let token = "not-a-real-token";
        let hash = RefreshTokenStore::hash_token(token);
        assert_eq!(hash, RefreshTokenStore::hash_token(token));
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, token);
    }
}
