use crate::error::GateError;
use crate::store::WindowDecision;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::sync::RwLock;
use std::time::Duration;
use tokio::time;

/// Prune, count and conditionally record in one server-side step.
///
/// Returns `{allowed, count, oldest}` where `oldest` is the score of the
/// oldest retained timestamp, or -1 when the window is empty.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]
local ttl = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', key, '-inf', '(' .. (now - window))
local count = redis.call('ZCARD', key)
local oldest = -1
local head = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if head[2] then
    oldest = tonumber(head[2])
end

if count >= limit then
    return {0, count, oldest}
end

redis.call('ZADD', key, now, member)
redis.call('EXPIRE', key, ttl)
if oldest < 0 then
    oldest = now
end
return {1, count + 1, oldest}
"#;

pub struct RedisClient {
    connection: RwLock<Option<ConnectionManager>>,
    window_script: Script,
}

impl RedisClient {
    /// Open a connection and verify it with `PING`.
    pub async fn connect(redis_url: &str, timeout: Duration) -> Result<Self, GateError> {
        let client = Client::open(redis_url)
            .map_err(|e| GateError::Redis(format!("Failed to create Redis client: {}", e)))?;

        // Probe with a single attempt first; the manager retries with backoff,
        // which would stall startup against a dead server.
        let mut probe = time::timeout(timeout, client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| GateError::Redis("Timed out connecting to Redis".into()))?
            .map_err(|e| GateError::Redis(format!("Failed to connect to Redis: {}", e)))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut probe)
            .await
            .map_err(|e| GateError::Redis(format!("Ping failed: {}", e)))?;
        tracing::debug!(target: "gatehouse::redis", reply = %pong, "redis ping");

        let conn = time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| GateError::Redis("Timed out connecting to Redis".into()))?
            .map_err(|e| GateError::Redis(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection: RwLock::new(Some(conn)),
            window_script: Script::new(SLIDING_WINDOW_SCRIPT),
        })
    }

    /// The manager is a cheap handle over one multiplexed connection; clone it
    /// out so no lock is held across an await.
    fn connection(&self) -> Result<ConnectionManager, GateError> {
        let guard = self
            .connection
            .read()
            .map_err(|_| GateError::Internal("Failed to acquire connection lock".into()))?;

        guard
            .clone()
            .ok_or_else(|| GateError::Redis("No Redis connection available".into()))
    }

    pub async fn ping(&self) -> Result<String, GateError> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("PING").query_async(&mut conn).await?)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GateError> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    pub async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        expiry_seconds: u64,
    ) -> Result<(), GateError> {
        let mut conn = self.connection()?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_seconds.max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool, GateError> {
        let mut conn = self.connection()?;
        let deleted: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(deleted > 0)
    }

    pub async fn admit_window(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
        limit: u64,
    ) -> Result<WindowDecision, GateError> {
        let mut conn = self.connection()?;
        let window_ms = window.as_millis() as u64;
        // Two requests in the same millisecond must not share a member.
        let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4().simple());
        let ttl_secs = window.as_secs().max(1) + 1;

        let reply: Vec<i64> = self
            .window_script
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        match reply.as_slice() {
            [allowed, count, oldest] => Ok(WindowDecision {
                allowed: *allowed == 1,
                count: (*count).max(0) as u64,
                oldest_ms: u64::try_from(*oldest).ok(),
            }),
            other => Err(GateError::Redis(format!(
                "Unexpected sliding window reply: {:?}",
                other
            ))),
        }
    }

    /// Drop the connection. Later calls fail and callers degrade.
    pub fn close(&self) {
        if let Ok(mut guard) = self.connection.write() {
            guard.take();
        }
    }
}
