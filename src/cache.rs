use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::AuthError;

// Upper bound on keys examined per SCAN page during a pattern sweep, so a large
// invalidation never blocks the store.
const SCAN_PAGE_SIZE: usize = 100;

// 1. Cache Contract
/// Cache
///
/// Defines the abstract contract for the shared key-value layer used for response
/// caching, rate-limit counters, and session-version bookkeeping. This trait allows
/// us to swap the concrete implementation—from the real Redis client (RedisCache)
/// in production to the in-memory variant (MemoryCache) during testing and cache-less
/// local development—without affecting the calling components.
///
/// Failure Semantics:
/// Connectivity failures never propagate as errors from the read/write operations;
/// they degrade to `None`/`false` (logged) so the platform stays available when the
/// cache is down. `increment` is the one exception: it reports `CacheUnavailable`
/// so the rate limiter can apply its fail-open/fail-closed policy per route class.
///
/// TTL Mandate:
/// Every write carries an explicit expiry. There is deliberately no `set` without a
/// TTL: unbounded keys are not permitted in this core.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetches a raw string value. `None` on miss OR on backend failure (logged).
    async fn get(&self, key: &str) -> Option<String>;

    /// Writes a value with a mandatory expiry. Returns `false` on backend failure.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> bool;

    /// Removes a key. Returns `true` only if the key existed and was removed.
    async fn delete(&self, key: &str) -> bool;

    /// Existence probe. `false` on miss or backend failure.
    async fn exists(&self, key: &str) -> bool;

    /// Atomically increments a counter, creating it at 1 with the given TTL if
    /// absent. The TTL is set ONLY on creation and never renewed by later hits;
    /// renewing it would let a steady trickle of requests hold a rate-limit window
    /// open forever.
    async fn increment(&self, key: &str, ttl_secs: u64) -> Result<i64, AuthError>;

    /// Remaining time-to-live in whole seconds (rounded up). `None` when the key
    /// is absent, has no expiry, or the backend is unreachable.
    async fn ttl(&self, key: &str) -> Option<u64>;

    /// Deletes every key matching a glob pattern, paginated so large sweeps stay
    /// bounded. Returns the number of keys removed (0 on backend failure).
    async fn delete_by_pattern(&self, pattern: &str) -> u64;
}

/// CacheState
///
/// The concrete type used to share the cache layer across the application state.
pub type CacheState = Arc<dyn Cache>;

// --- Typed helpers over the raw string contract ---

/// Fetches and deserializes a JSON value. Deserialization failures are logged and
/// read as a miss, never an error.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let raw = cache.get(key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "cached value failed to deserialize");
            None
        }
    }
}

/// Serializes and writes a JSON value with the mandatory TTL.
pub async fn set_json<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl_secs: u64) -> bool {
    match serde_json::to_string(value) {
        Ok(raw) => cache.set(key, &raw, ttl_secs).await,
        Err(e) => {
            tracing::warn!(key, error = %e, "value failed to serialize for caching");
            false
        }
    }
}

// 2. The Real Implementation (Redis)
/// RedisCache
///
/// The concrete implementation backed by Redis via `ConnectionManager`, which owns
/// the single long-lived connection and transparently reconnects after transient
/// failures—so re-invoking connect logic is never needed once construction succeeds.
/// Connect and response timeouts are bounded at construction; a slow backend reads
/// as a failure, never as an indefinite hang.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// connect
    ///
    /// The single construction path for the production cache client, called once at
    /// startup. The returned value is cheaply cloneable; every clone shares the same
    /// underlying managed connection.
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let config = redis::aio::ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(2))
            .set_response_timeout(Duration::from_secs(2));
        let manager = ConnectionManager::new_with_config(client, config).await?;
        tracing::info!("cache backend connected");
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache GET failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> bool {
        let mut conn = self.conn();
        match conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache SET failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let mut conn = self.conn();
        match conn.del::<_, i64>(key).await {
            Ok(removed) => removed > 0,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache DEL failed");
                false
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let mut conn = self.conn();
        match conn.exists::<_, bool>(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache EXISTS failed");
                false
            }
        }
    }

    async fn increment(&self, key: &str, ttl_secs: u64) -> Result<i64, AuthError> {
        let mut conn = self.conn();
        let count: i64 = conn.incr(key, 1).await.map_err(|e| {
            tracing::warn!(key, error = %e, "cache INCR failed");
            AuthError::CacheUnavailable
        })?;

        // TTL is attached only when INCR just created the key. Subsequent hits in
        // the same window leave the original expiry untouched.
        if count == 1 {
            if let Err(e) = conn.expire::<_, bool>(key, ttl_secs as i64).await {
                tracing::warn!(key, error = %e, "cache EXPIRE failed after INCR");
                // The counter exists but would never expire, violating the
                // no-unbounded-keys invariant. Remove it and report the outage.
                let _ = conn.del::<_, i64>(key).await;
                return Err(AuthError::CacheUnavailable);
            }
        }
        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Option<u64> {
        let mut conn = self.conn();
        match conn.ttl::<_, i64>(key).await {
            // Redis returns -1 (no expiry) and -2 (no key) as negative sentinels.
            Ok(secs) if secs > 0 => Some(secs as u64),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache TTL failed");
                None
            }
        }
    }

    async fn delete_by_pattern(&self, pattern: &str) -> u64 {
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        // Cursor-driven SCAN keeps each round bounded instead of issuing a blocking
        // KEYS over the whole keyspace.
        loop {
            let page: Result<(u64, Vec<String>), _> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE_SIZE)
                .query_async(&mut conn)
                .await;

            let (next, keys) = match page {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "cache SCAN failed mid-sweep");
                    return removed;
                }
            };

            if !keys.is_empty() {
                match conn.del::<_, i64>(keys).await {
                    Ok(count) => removed += count as u64,
                    Err(e) => {
                        tracing::warn!(pattern, error = %e, "cache DEL failed mid-sweep");
                        return removed;
                    }
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        removed
    }
}

// 3. The In-Memory Implementation (Tests & Cache-less Local Development)
/// MemoryCache
///
/// A process-local implementation with real TTL semantics, driven by the tokio
/// clock so tests can fast-forward time with a paused runtime. Also serves as the
/// local-development fallback when no Redis instance is reachable.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the entry if its expiry has passed, mirroring backend-side eviction.
    fn purge_expired(entries: &mut HashMap<String, MemoryEntry>, key: &str) {
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= Instant::now() {
                entries.remove(key);
            }
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        Self::purge_expired(&mut entries, key);
        entries.get(key).map(|entry| entry.value.clone())
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> bool {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        true
    }

    async fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        Self::purge_expired(&mut entries, key);
        entries.remove(key).is_some()
    }

    async fn exists(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        Self::purge_expired(&mut entries, key);
        entries.contains_key(key)
    }

    async fn increment(&self, key: &str, ttl_secs: u64) -> Result<i64, AuthError> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        Self::purge_expired(&mut entries, key);

        match entries.get_mut(key) {
            Some(entry) => {
                let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
                // Expiry intentionally untouched: only creation sets the window.
                entry.value = count.to_string();
                Ok(count)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    MemoryEntry {
                        value: "1".to_string(),
                        expires_at: Instant::now() + Duration::from_secs(ttl_secs),
                    },
                );
                Ok(1)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Option<u64> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        Self::purge_expired(&mut entries, key);
        entries.get(key).map(|entry| {
            let remaining = entry.expires_at.saturating_duration_since(Instant::now());
            // Round up so a window with 0.5s left still reports a 1s retry hint.
            let secs = remaining.as_secs();
            if remaining.subsec_nanos() > 0 { secs + 1 } else { secs }
        })
    }

    async fn delete_by_pattern(&self, pattern: &str) -> u64 {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        let doomed: Vec<String> = entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        doomed.len() as u64
    }
}

/// Minimal glob matcher supporting the `*` wildcard, the only pattern feature the
/// core's invalidation sweeps use.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == candidate;
    }

    let mut remainder = candidate;
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if index == 0 {
            match remainder.strip_prefix(part) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if index == parts.len() - 1 {
            return remainder.ends_with(part);
        } else {
            match remainder.find(part) {
                Some(at) => remainder = &remainder[at + part.len()..],
                None => return false,
            }
        }
    }
    // Pattern ended with '*', anything left in the candidate is covered.
    true
}
