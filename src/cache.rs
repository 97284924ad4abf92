use redis::AsyncCommands;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::dto::PublicUser;

fn user_key(id: Uuid) -> String {
    format!("user:{}", id)
}

/// Read-through cache for user lookups, keyed by user id.
///
/// The cache is optional: with no `REDIS_URL` every call is a no-op and the
/// access guard falls back to the database. Redis failures are logged and
/// degrade the same way; they never fail a request.
#[derive(Clone)]
pub struct UserCache {
    client: Option<redis::Client>,
    ttl_seconds: u64,
}

impl UserCache {
    pub fn new(redis_url: &str, ttl_seconds: u64) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Some(client),
            ttl_seconds,
        })
    }

    pub fn disabled() -> Self {
        Self {
            client: None,
            ttl_seconds: 0,
        }
    }

    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        let client = self.client.as_ref()?;
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!(error = %e, "redis unavailable, bypassing user cache");
                None
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<PublicUser> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = match conn.get(user_key(id)).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, user_id = %id, "redis GET failed");
                return None;
            }
        };
        let user = raw.and_then(|json| serde_json::from_str(&json).ok());
        if user.is_some() {
            debug!(user_id = %id, "user cache hit");
        }
        user
    }

    pub async fn put(&self, user: &PublicUser) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let json = match serde_json::to_string(user) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "serialize user for cache failed");
                return;
            }
        };
        let result = redis::cmd("SETEX")
            .arg(user_key(user.id))
            .arg(self.ttl_seconds)
            .arg(json)
            .query_async::<_, ()>(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(error = %e, user_id = %user.id, "redis SETEX failed");
        }
    }

    /// Drop the cached entry after any mutation of that user.
    pub async fn invalidate(&self, id: Uuid) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        if let Err(e) = conn.del::<_, ()>(user_key(id)).await {
            warn!(error = %e, user_id = %id, "redis DEL failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::UserRole;

    #[tokio::test]
    async fn disabled_cache_is_a_no_op() {
        let cache = UserCache::disabled();
        let user = PublicUser {
            id: Uuid::new_v4(),
            email: "a@b.c".into(),
            name: "a".into(),
            role: UserRole::User,
            avatar: None,
        };
        cache.put(&user).await;
        assert!(cache.get(user.id).await.is_none());
        cache.invalidate(user.id).await;
    }
}
