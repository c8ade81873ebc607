//! The transactional backend seam and an in-memory implementation.
//!
//! A session is one backend unit of work: tracked mutations are staged and
//! applied on commit, reads return untracked snapshots, and the set-based
//! executors mutate rows matching a filter without materializing them.
//! Sessions are not thread-safe by contract and belong to a single logical
//! request context.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use stratum_core::{Assignment, Filter, FilterOp, StoreEntity};
use thiserror::Error;

/// Errors raised by a backend session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// An optimistic-concurrency conflict was detected during commit.
    #[error("optimistic concurrency conflict detected during commit")]
    ConcurrencyConflict,

    /// Any other backend failure; the store propagates these untouched.
    #[error("backend failure: {reason}")]
    Backend {
        /// Backend-supplied reason.
        reason: String,
    },
}

impl SessionError {
    /// Shorthand for an unmodeled backend failure.
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Transactional entity collection for one entity type.
///
/// Staged mutations become durable on `commit`, which reports the affected
/// row count or raises the concurrency-conflict signal. Reads never observe
/// staged state.
#[async_trait]
pub trait EntitySession<E: StoreEntity>: Send + Sync {
    /// Stage new rows for insertion.
    async fn stage_insert(&self, entities: &[E]) -> Result<(), SessionError>;

    /// Attach rows to the tracked set with their current state as an update.
    async fn stage_update(&self, entities: &[E]) -> Result<(), SessionError>;

    /// Stage rows for physical removal.
    async fn stage_remove(&self, entities: &[E]) -> Result<(), SessionError>;

    /// Apply all staged mutations; returns the affected row count.
    async fn commit(&self) -> Result<u64, SessionError>;

    /// Untracked snapshot lookup by key.
    async fn find(&self, id: &E::Key) -> Result<Option<E>, SessionError>;

    /// Untracked snapshot lookup for a set of keys; misses are skipped.
    async fn find_many(&self, ids: &[E::Key]) -> Result<Vec<E>, SessionError>;

    /// Whether a row with the given key exists.
    async fn exists(&self, id: &E::Key) -> Result<bool, SessionError>;

    /// Untracked snapshots matching a filter.
    async fn query(&self, filter: &Filter) -> Result<Vec<E>, SessionError>;

    /// Count of rows matching a filter.
    async fn count(&self, filter: &Filter) -> Result<u64, SessionError>;

    /// Set-based update of all rows matching the filter, in one statement,
    /// without materializing rows. Returns the affected row count.
    async fn update_where(
        &self,
        filter: &Filter,
        assignments: &[Assignment],
    ) -> Result<u64, SessionError>;

    /// Set-based physical delete of all rows matching the filter.
    async fn delete_where(&self, filter: &Filter) -> Result<u64, SessionError>;
}

// ============================================================================
// FILTER EVALUATION OVER JSON VALUES
// ============================================================================

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Evaluate a filter against a serialized row.
pub(crate) fn filter_matches(filter: &Filter, row: &Value) -> bool {
    match filter {
        Filter::All(parts) => parts.iter().all(|f| filter_matches(f, row)),
        Filter::Any(parts) => parts.iter().any(|f| filter_matches(f, row)),
        Filter::Field { field, op, value } => {
            let actual = row.get(field).unwrap_or(&Value::Null);
            match op {
                FilterOp::Eq => actual == value,
                FilterOp::Ne => actual != value,
                FilterOp::Gt => matches!(compare(actual, value), Some(Ordering::Greater)),
                FilterOp::Lt => matches!(compare(actual, value), Some(Ordering::Less)),
                FilterOp::Gte => matches!(
                    compare(actual, value),
                    Some(Ordering::Greater) | Some(Ordering::Equal)
                ),
                FilterOp::Lte => matches!(
                    compare(actual, value),
                    Some(Ordering::Less) | Some(Ordering::Equal)
                ),
                FilterOp::Contains => match (actual, value) {
                    (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
                    (Value::Array(items), candidate) => items.contains(candidate),
                    _ => false,
                },
                FilterOp::In => match value {
                    Value::Array(candidates) => candidates.contains(actual),
                    _ => false,
                },
            }
        }
    }
}

fn apply_assignments(row: &mut Value, assignments: &[Assignment]) {
    if let Value::Object(map) = row {
        for assignment in assignments {
            map.insert(assignment.field.clone(), assignment.value.clone());
        }
    }
}

// ============================================================================
// IN-MEMORY SESSION
// ============================================================================

enum Pending<E> {
    Insert(E),
    Update(E),
    Remove(E),
}

/// In-memory `EntitySession` with a staged change set applied on commit.
///
/// Rows live in a hash map keyed by entity key; filters and assignments are
/// evaluated over the serialized JSON form of each row. Test controls allow
/// simulating a concurrency conflict on the next commit and a fully
/// unavailable backend.
pub struct MemorySession<E: StoreEntity> {
    rows: RwLock<HashMap<E::Key, E>>,
    pending: RwLock<Vec<Pending<E>>>,
    conflict_next_commit: AtomicBool,
    unavailable: AtomicBool,
    calls: AtomicU64,
}

impl<E: StoreEntity> Default for MemorySession<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: StoreEntity> MemorySession<E> {
    /// Create an empty session.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            pending: RwLock::new(Vec::new()),
            conflict_next_commit: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            calls: AtomicU64::new(0),
        }
    }

    /// Insert rows directly, bypassing the staged change set.
    pub fn seed(&self, entities: Vec<E>) {
        let mut rows = self.rows.write().unwrap();
        for entity in entities {
            rows.insert(entity.id(), entity);
        }
    }

    /// Make the next commit fail with a concurrency conflict.
    pub fn fail_next_commit_with_conflict(&self) {
        self.conflict_next_commit
            .store(true, AtomicOrdering::SeqCst);
    }

    /// Make every operation fail until re-enabled.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Total number of session operations invoked.
    pub fn calls(&self) -> u64 {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Number of committed rows.
    pub fn row_count(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    /// Read a committed row directly, bypassing the session contract.
    pub fn row(&self, id: &E::Key) -> Option<E> {
        self.rows.read().unwrap().get(id).cloned()
    }

    fn touch(&self) -> Result<(), SessionError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(SessionError::backend("backend unavailable"));
        }
        Ok(())
    }

    fn to_value(entity: &E) -> Result<Value, SessionError> {
        serde_json::to_value(entity).map_err(|e| SessionError::backend(e.to_string()))
    }

    fn from_value(value: Value) -> Result<E, SessionError> {
        serde_json::from_value(value).map_err(|e| SessionError::backend(e.to_string()))
    }
}

#[async_trait]
impl<E: StoreEntity> EntitySession<E> for MemorySession<E> {
    async fn stage_insert(&self, entities: &[E]) -> Result<(), SessionError> {
        self.touch()?;
        let mut pending = self.pending.write().unwrap();
        pending.extend(entities.iter().cloned().map(Pending::Insert));
        Ok(())
    }

    async fn stage_update(&self, entities: &[E]) -> Result<(), SessionError> {
        self.touch()?;
        let mut pending = self.pending.write().unwrap();
        pending.extend(entities.iter().cloned().map(Pending::Update));
        Ok(())
    }

    async fn stage_remove(&self, entities: &[E]) -> Result<(), SessionError> {
        self.touch()?;
        let mut pending = self.pending.write().unwrap();
        pending.extend(entities.iter().cloned().map(Pending::Remove));
        Ok(())
    }

    async fn commit(&self) -> Result<u64, SessionError> {
        self.touch()?;
        // A failed transaction discards its staged work either way.
        let staged: Vec<Pending<E>> = self.pending.write().unwrap().drain(..).collect();

        if self.conflict_next_commit.swap(false, AtomicOrdering::SeqCst) {
            return Err(SessionError::ConcurrencyConflict);
        }

        let mut rows = self.rows.write().unwrap();
        let mut affected = 0u64;
        for change in staged {
            match change {
                Pending::Insert(entity) => {
                    let key = entity.id();
                    if rows.contains_key(&key) {
                        return Err(SessionError::backend(format!(
                            "duplicate key for {}",
                            E::ENTITY_NAME
                        )));
                    }
                    rows.insert(key, entity);
                    affected += 1;
                }
                Pending::Update(entity) => {
                    rows.insert(entity.id(), entity);
                    affected += 1;
                }
                Pending::Remove(entity) => {
                    if rows.remove(&entity.id()).is_some() {
                        affected += 1;
                    }
                }
            }
        }
        Ok(affected)
    }

    async fn find(&self, id: &E::Key) -> Result<Option<E>, SessionError> {
        self.touch()?;
        Ok(self.rows.read().unwrap().get(id).cloned())
    }

    async fn find_many(&self, ids: &[E::Key]) -> Result<Vec<E>, SessionError> {
        self.touch()?;
        let rows = self.rows.read().unwrap();
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn exists(&self, id: &E::Key) -> Result<bool, SessionError> {
        self.touch()?;
        Ok(self.rows.read().unwrap().contains_key(id))
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<E>, SessionError> {
        self.touch()?;
        let rows = self.rows.read().unwrap();
        let mut out = Vec::new();
        for entity in rows.values() {
            if filter_matches(filter, &Self::to_value(entity)?) {
                out.push(entity.clone());
            }
        }
        Ok(out)
    }

    async fn count(&self, filter: &Filter) -> Result<u64, SessionError> {
        self.touch()?;
        let rows = self.rows.read().unwrap();
        let mut count = 0u64;
        for entity in rows.values() {
            if filter_matches(filter, &Self::to_value(entity)?) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update_where(
        &self,
        filter: &Filter,
        assignments: &[Assignment],
    ) -> Result<u64, SessionError> {
        self.touch()?;
        let mut rows = self.rows.write().unwrap();
        let mut affected = 0u64;
        let keys: Vec<E::Key> = rows.keys().cloned().collect();
        for key in keys {
            let mut value = Self::to_value(&rows[&key])?;
            if !filter_matches(filter, &value) {
                continue;
            }
            apply_assignments(&mut value, assignments);
            rows.insert(key, Self::from_value(value)?);
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete_where(&self, filter: &Filter) -> Result<u64, SessionError> {
        self.touch()?;
        let mut rows = self.rows.write().unwrap();
        let mut doomed = Vec::new();
        for (key, entity) in rows.iter() {
            if filter_matches(filter, &Self::to_value(entity)?) {
                doomed.push(key.clone());
            }
        }
        for key in &doomed {
            rows.remove(key);
        }
        Ok(doomed.len() as u64)
    }
}

// =============================================================================
// TESTS
// =============================================================================
