//! The entity contract every persistable record satisfies.

use crate::Timestamp;
use serde::{de::DeserializeOwned, Serialize};
use std::hash::Hash;

/// Contract for records managed by an entity store.
///
/// An entity exposes a unique key and three audit timestamps. The store stamps
/// the timestamps on its mutation paths; entities remain owned by the caller
/// and the store never retains references past the duration of a call.
///
/// # Implementation Requirements
///
/// - `ENTITY_NAME` must be stable across versions; it is the cache-key prefix.
/// - `id()` must return the same key for the lifetime of the record.
/// - Implementations must be `Clone`, `Serialize`, and `DeserializeOwned` so
///   snapshots can be cached, and `Send + Sync + 'static` for async use.
pub trait StoreEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Unique identifier type for this entity.
    type Key: Clone + Eq + Hash + Send + Sync + 'static;

    /// Stable type name, used as the cache-key prefix.
    const ENTITY_NAME: &'static str;

    /// Get the unique identifier for this record.
    fn id(&self) -> Self::Key;

    /// When the record was created.
    fn created_at(&self) -> Timestamp;

    /// Set the creation timestamp.
    fn set_created_at(&mut self, at: Timestamp);

    /// When the record was last modified.
    fn updated_at(&self) -> Timestamp;

    /// Set the last-modified timestamp.
    fn set_updated_at(&mut self, at: Timestamp);

    /// When the record was soft-deleted, if it was.
    fn deleted_at(&self) -> Option<Timestamp>;

    /// Set or clear the soft-delete timestamp.
    fn set_deleted_at(&mut self, at: Option<Timestamp>);
}

/// Derive the cache key for an entity type from its encoded id.
///
/// The key format is `"{ENTITY_NAME}:{encoded id}"`.
pub fn cache_key_for<E: StoreEntity>(encoded_id: &str) -> String {
    format!("{}:{}", E::ENTITY_NAME, encoded_id)
}
