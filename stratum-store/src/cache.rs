//! Cache facade and the distributed-cache seam.
//!
//! The facade keeps entity snapshots in an external key-value cache, keyed by
//! `"{ENTITY_NAME}:{encoded id}"`. Entries are never authoritative; the
//! backend row always is. Write-through happens after successful per-entity
//! mutations only; set-based batch mutation never touches the cache.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use stratum_core::{
    cache_key_for, KeyCodec, StoreEntity, StoreError, StoreOptions, StoreResult, Timestamp,
};

/// External key-value cache with optional absolute expiration.
///
/// Implementations are injected and externally owned; the store never closes
/// them and they may be shared across stores within one unit of work.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Get the value stored under `key`, if any.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`, optionally expiring at an absolute instant.
    async fn set(&self, key: &str, value: String, expires_at: Option<Timestamp>)
        -> StoreResult<()>;

    /// Remove the value stored under `key`.
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

/// Read/write/invalidate entity snapshots according to the store options.
///
/// All operations are no-ops while the cached store is disabled, except the
/// lookups: reading by cache key is only meaningful with caching on, so `get`
/// and `get_many` fail with `StoreError::CacheNotConfigured` instead.
pub struct CacheFacade<E: StoreEntity> {
    cache: Option<Arc<dyn DistributedCache>>,
    codec: Arc<dyn KeyCodec<E::Key>>,
    cached_store: bool,
    expires: i64,
    _marker: PhantomData<fn() -> E>,
}

impl<E: StoreEntity> CacheFacade<E> {
    /// Create a facade over an optional cache client.
    pub fn new(
        cache: Option<Arc<dyn DistributedCache>>,
        options: &StoreOptions,
        codec: Arc<dyn KeyCodec<E::Key>>,
    ) -> Self {
        Self {
            cache,
            codec,
            cached_store: options.cached_store(),
            expires: options.expires(),
            _marker: PhantomData,
        }
    }

    /// Whether the cached store is enabled by configuration.
    pub fn enabled(&self) -> bool {
        self.cached_store
    }

    /// Derive the cache key for an entity id.
    pub fn cache_key(&self, id: &E::Key) -> String {
        cache_key_for::<E>(&self.codec.encode(id))
    }

    fn backend(&self) -> StoreResult<&Arc<dyn DistributedCache>> {
        self.cache.as_ref().ok_or(StoreError::CacheNotConfigured)
    }

    fn expiration(&self) -> Option<Timestamp> {
        if self.expires > 0 {
            Some(Utc::now() + Duration::seconds(self.expires))
        } else {
            None
        }
    }

    fn encode(entity: &E) -> StoreResult<String> {
        serde_json::to_string(entity).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })
    }

    fn decode(raw: &str) -> StoreResult<E> {
        serde_json::from_str(raw).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Write one entity snapshot through to the cache.
    pub async fn put(&self, entity: &E) -> StoreResult<()> {
        if !self.cached_store {
            return Ok(());
        }
        let backend = self.backend()?;
        let key = self.cache_key(&entity.id());
        backend
            .set(&key, Self::encode(entity)?, self.expiration())
            .await
    }

    /// Write a batch of snapshots through to the cache.
    pub async fn put_many(&self, entities: &[E]) -> StoreResult<()> {
        if !self.cached_store {
            return Ok(());
        }
        for entity in entities {
            self.put(entity).await?;
        }
        Ok(())
    }

    /// Look up a snapshot by entity id.
    ///
    /// Fails with `CacheNotConfigured` while the cached store is disabled.
    pub async fn get(&self, id: &E::Key) -> StoreResult<Option<E>> {
        if !self.cached_store {
            return Err(StoreError::CacheNotConfigured);
        }
        let backend = self.backend()?;
        let key = self.cache_key(id);
        match backend.get(&key).await? {
            Some(raw) => Ok(Some(Self::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Look up a batch of snapshots; the result aligns with `ids`.
    pub async fn get_many(&self, ids: &[E::Key]) -> StoreResult<Vec<Option<E>>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.get(id).await?);
        }
        Ok(out)
    }

    /// Invalidate one entity's snapshot.
    pub async fn remove(&self, entity: &E) -> StoreResult<()> {
        if !self.cached_store {
            return Ok(());
        }
        let backend = self.backend()?;
        backend.remove(&self.cache_key(&entity.id())).await
    }

    /// Invalidate a batch of snapshots.
    pub async fn remove_many(&self, entities: &[E]) -> StoreResult<()> {
        if !self.cached_store {
            return Ok(());
        }
        for entity in entities {
            self.remove(entity).await?;
        }
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY CACHE
// ============================================================================

/// In-memory `DistributedCache` honoring absolute expiration.
///
/// Suitable for embedding and for tests; shared across stores via `Arc`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Option<Timestamp>)>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|(_, expires_at)| expires_at.map_or(true, |at| at > now))
            .count()
    }

    /// Whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DistributedCache for MemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().unwrap();
        match entries.get(key) {
            Some((value, expires_at)) => {
                if expires_at.map_or(false, |at| at <= Utc::now()) {
                    return Ok(None);
                }
                Ok(Some(value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        expires_at: Option<Timestamp>,
    ) -> StoreResult<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
