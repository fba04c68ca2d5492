//! Key schema for everything the service persists.
//!
//! - `user:{user_id}` → serialized user vector (sliding 30 day TTL)
//! - `articles:{generated_at_millis}` → latest ranked list (global, 1 hour TTL)
//! - `ranking_log:{user_id}:{millis}:{nonce}` → one ranking decision log (7 day TTL)
//! - `user_logs:{user_id}` → list of ranking log keys, most recent first

pub const CACHED_RANKING_PREFIX: &str = "articles:";

pub struct StoreKey;

impl StoreKey {
    pub fn user_vector(user_id: &str) -> String {
        format!("user:{}", user_id)
    }

    pub fn cached_ranking(generated_at_millis: i64) -> String {
        format!("{}{}", CACHED_RANKING_PREFIX, generated_at_millis)
    }

    /// Generation timestamp encoded in a cached ranking key.
    pub fn cached_ranking_generation(key: &str) -> Option<i64> {
        key.strip_prefix(CACHED_RANKING_PREFIX)?.parse().ok()
    }

    pub fn ranking_log(user_id: &str, timestamp_millis: i64, nonce: &str) -> String {
        format!("ranking_log:{}:{}:{}", user_id, timestamp_millis, nonce)
    }

    pub fn user_log_index(user_id: &str) -> String {
        format!("user_logs:{}", user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(StoreKey::user_vector("user-123"), "user:user-123");
        assert_eq!(StoreKey::cached_ranking(1700000000000), "articles:1700000000000");
        assert_eq!(
            StoreKey::ranking_log("u1", 42, "abc"),
            "ranking_log:u1:42:abc"
        );
        assert_eq!(StoreKey::user_log_index("u1"), "user_logs:u1");
    }

    #[test]
    fn test_cached_ranking_generation() {
        assert_eq!(
            StoreKey::cached_ranking_generation("articles:1700000000000"),
            Some(1700000000000)
        );
        assert_eq!(StoreKey::cached_ranking_generation("articles:latest"), None);
        assert_eq!(StoreKey::cached_ranking_generation("user:1"), None);
    }
}
