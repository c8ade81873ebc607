//! The generic entity store.
//!
//! Composes the backend session, the metadata stamper, and the cache facade
//! into uniform CRUD and batch-mutation semantics. Every mutating call runs
//! the same pipeline: guard, stamp, execute, translate concurrency conflicts,
//! then write through or invalidate the cache on success.
//!
//! Consistency notes. Cache writes strictly follow successful commits, so a
//! crash between commit and cache write can leave a stale or missing entry;
//! that is accepted best-effort behavior, the backend row stays authoritative.
//! Set-based batch mutation is refused outright while the cached store is
//! enabled: the affected cache keys cannot be known without materializing
//! rows, so batch mutation and read-through caching are mutually exclusive
//! for a given store instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stratum_core::{
    Assignment, ErrorDescriptor, Filter, KeyCodec, OperationResult, StoreEntity, StoreError,
    StoreOptions, StoreResult, UuidKeyCodec,
};
use uuid::Uuid;

use crate::cache::{CacheFacade, DistributedCache};
use crate::session::{EntitySession, SessionError};
use crate::stamp::MetadataStamper;

fn backend_error(error: SessionError) -> StoreError {
    StoreError::Backend {
        reason: error.to_string(),
    }
}

/// Generic persistence facade for one entity type.
///
/// A store wraps one injected backend session and, optionally, a cache
/// client. It holds no other resources; `dispose` only flips a guard flag,
/// after which every operation fails fast. Instances are not internally
/// concurrent: one store per logical request context, and callers must not
/// run two operations on the same instance at once.
pub struct EntityStore<E: StoreEntity, S: EntitySession<E>> {
    session: Arc<S>,
    options: StoreOptions,
    stamper: MetadataStamper,
    cache: CacheFacade<E>,
    codec: Arc<dyn KeyCodec<E::Key>>,
    errors: ErrorDescriptor,
    disposed: AtomicBool,
}

impl<E: StoreEntity, S: EntitySession<E>> EntityStore<E, S> {
    /// Create a store without a cache client.
    ///
    /// If the options enable the cached store, cache-dependent paths will
    /// fail with `StoreError::CacheNotConfigured` until a client is attached.
    pub fn new(session: Arc<S>, options: StoreOptions, codec: Arc<dyn KeyCodec<E::Key>>) -> Self {
        let stamper = MetadataStamper::from_options(&options);
        let cache = CacheFacade::new(None, &options, codec.clone());
        Self {
            session,
            options,
            stamper,
            cache,
            codec,
            errors: ErrorDescriptor::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Attach a cache client, builder style.
    pub fn with_cache(mut self, cache: Arc<dyn DistributedCache>) -> Self {
        self.cache = CacheFacade::new(Some(cache), &self.options, self.codec.clone());
        self
    }

    /// Replace the error descriptor, builder style.
    pub fn with_descriptor(mut self, errors: ErrorDescriptor) -> Self {
        self.errors = errors;
        self
    }

    /// The store options in effect.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Whether the store has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Dispose the store; every subsequent operation fails fast.
    ///
    /// The injected session and cache are externally owned and are not
    /// closed here.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    fn guard(&self) -> StoreResult<()> {
        if self.is_disposed() {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }

    fn require_non_empty<T>(items: &[T], name: &'static str) -> StoreResult<()> {
        if items.is_empty() {
            return Err(StoreError::EmptyArgument { name });
        }
        Ok(())
    }

    /// Commit staged work; `Ok(None)` signals a recovered concurrency
    /// conflict, any other backend failure propagates.
    async fn commit_session(&self) -> StoreResult<Option<u64>> {
        match self.session.commit().await {
            Ok(rows) => Ok(Some(rows)),
            Err(SessionError::ConcurrencyConflict) => Ok(None),
            Err(other) => Err(backend_error(other)),
        }
    }

    fn log_outcome(&self, op: &str, result: &OperationResult) {
        if !self.options.debug_logging() {
            return;
        }
        if result.succeeded() {
            tracing::debug!(
                entity = E::ENTITY_NAME,
                op,
                rows = result.effect_rows(),
                "store mutation committed"
            );
        } else {
            tracing::debug!(
                entity = E::ENTITY_NAME,
                op,
                code = ?result.first_error().map(|e| e.code),
                "store mutation failed"
            );
        }
    }

    fn joined_ids(&self, ids: &[E::Key]) -> String {
        ids.iter()
            .map(|id| self.codec.encode(id))
            .collect::<Vec<_>>()
            .join(",")
    }

    // ========================================================================
    // CREATE
    // ========================================================================

    /// Persist a new entity.
    pub async fn create(&self, entity: E) -> StoreResult<OperationResult> {
        self.create_many(vec![entity]).await
    }

    /// Persist a batch of new entities.
    ///
    /// With auto-save off the commit is deferred to the session owner and the
    /// result reports zero affected rows; nothing is cached because nothing
    /// is durable yet.
    pub async fn create_many(&self, mut entities: Vec<E>) -> StoreResult<OperationResult> {
        self.guard()?;
        Self::require_non_empty(&entities, "entities")?;

        self.stamper.stamp_for_insert(&mut entities);
        self.session
            .stage_insert(&entities)
            .await
            .map_err(backend_error)?;

        if !self.options.auto_save_changes() {
            return Ok(OperationResult::success(0));
        }

        let result = match self.commit_session().await? {
            Some(rows) => {
                self.cache.put_many(&entities).await?;
                OperationResult::success(rows)
            }
            None => OperationResult::failed_with(self.errors.concurrency_failure()),
        };
        self.log_outcome("create", &result);
        Ok(result)
    }

    // ========================================================================
    // UPDATE
    // ========================================================================

    /// Persist changes to an existing entity.
    pub async fn update(&self, entity: E) -> StoreResult<OperationResult> {
        self.update_many(vec![entity]).await
    }

    /// Persist changes to a batch of existing entities.
    pub async fn update_many(&self, mut entities: Vec<E>) -> StoreResult<OperationResult> {
        self.guard()?;
        Self::require_non_empty(&entities, "entities")?;

        self.stamper.stamp_for_update(&mut entities);
        self.session
            .stage_update(&entities)
            .await
            .map_err(backend_error)?;

        if !self.options.auto_save_changes() {
            return Ok(OperationResult::success(0));
        }

        let result = match self.commit_session().await? {
            Some(rows) => {
                self.cache.put_many(&entities).await?;
                OperationResult::success(rows)
            }
            None => OperationResult::failed_with(self.errors.concurrency_failure()),
        };
        self.log_outcome("update", &result);
        Ok(result)
    }

    // ========================================================================
    // DELETE
    // ========================================================================

    /// Delete an entity.
    ///
    /// Under soft delete the removal is rewritten into an update stamping
    /// `updated_at`/`deleted_at`; either way the cache entry is invalidated
    /// on success.
    pub async fn delete(&self, entity: E) -> StoreResult<OperationResult> {
        self.delete_many(vec![entity]).await
    }

    /// Delete a batch of entities.
    pub async fn delete_many(&self, mut entities: Vec<E>) -> StoreResult<OperationResult> {
        self.guard()?;
        Self::require_non_empty(&entities, "entities")?;

        let soft = self.stamper.stamp_for_delete(&mut entities);
        if soft {
            self.session
                .stage_update(&entities)
                .await
                .map_err(backend_error)?;
        } else {
            self.session
                .stage_remove(&entities)
                .await
                .map_err(backend_error)?;
        }

        if !self.options.auto_save_changes() {
            return Ok(OperationResult::success(0));
        }

        let result = match self.commit_session().await? {
            Some(rows) => {
                self.cache.remove_many(&entities).await?;
                OperationResult::success(rows)
            }
            None => OperationResult::failed_with(self.errors.concurrency_failure()),
        };
        self.log_outcome("delete", &result);
        Ok(result)
    }

    /// Delete by id; a lookup miss yields a `NotFoundId` failure carrying
    /// the id.
    pub async fn delete_by_id(&self, id: &E::Key) -> StoreResult<OperationResult> {
        self.guard()?;

        match self.session.find(id).await.map_err(backend_error)? {
            Some(entity) => self.delete_many(vec![entity]).await,
            None => {
                let result =
                    OperationResult::failed_with(self.errors.not_found_id(&self.codec.encode(id)));
                self.log_outcome("delete_by_id", &result);
                Ok(result)
            }
        }
    }

    /// Delete a set of ids.
    ///
    /// When none of the requested ids exist the result is a `NotFoundId`
    /// failure listing all of them comma-joined; otherwise the rows that do
    /// exist are deleted.
    pub async fn delete_by_ids(&self, ids: &[E::Key]) -> StoreResult<OperationResult> {
        self.guard()?;
        Self::require_non_empty(ids, "ids")?;

        let found = self.session.find_many(ids).await.map_err(backend_error)?;
        if found.is_empty() {
            let result =
                OperationResult::failed_with(self.errors.not_found_id(&self.joined_ids(ids)));
            self.log_outcome("delete_by_ids", &result);
            return Ok(result);
        }
        self.delete_many(found).await
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Whether a row with the given id exists in the backend.
    pub async fn exists(&self, id: &E::Key) -> StoreResult<bool> {
        self.guard()?;
        self.session.exists(id).await.map_err(backend_error)
    }

    /// Find an entity by id, consulting the cache first when enabled and
    /// populating it on a miss.
    pub async fn find(&self, id: &E::Key) -> StoreResult<Option<E>> {
        self.guard()?;

        if self.cache.enabled() {
            if let Some(hit) = self.cache.get(id).await? {
                return Ok(Some(hit));
            }
        }

        let found = self.session.find(id).await.map_err(backend_error)?;
        if let Some(ref entity) = found {
            self.cache.put(entity).await?;
        }
        Ok(found)
    }

    /// Find a set of entities by id; misses are skipped.
    pub async fn find_many(&self, ids: &[E::Key]) -> StoreResult<Vec<E>> {
        self.guard()?;
        Self::require_non_empty(ids, "ids")?;

        let mut out = Vec::with_capacity(ids.len());
        let mut missing: Vec<E::Key> = Vec::new();

        if self.cache.enabled() {
            for (id, hit) in ids.iter().zip(self.cache.get_many(ids).await?) {
                match hit {
                    Some(entity) => out.push(entity),
                    None => missing.push(id.clone()),
                }
            }
        } else {
            missing = ids.to_vec();
        }

        if !missing.is_empty() {
            let fetched = self
                .session
                .find_many(&missing)
                .await
                .map_err(backend_error)?;
            self.cache.put_many(&fetched).await?;
            out.extend(fetched);
        }
        Ok(out)
    }

    /// Untracked snapshots matching a filter.
    pub async fn query(&self, filter: &Filter) -> StoreResult<Vec<E>> {
        self.guard()?;
        self.session.query(filter).await.map_err(backend_error)
    }

    /// Count of rows matching a filter.
    pub async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        self.guard()?;
        self.session.count(filter).await.map_err(backend_error)
    }

    // ========================================================================
    // BATCH (SET-BASED) MUTATION
    // ========================================================================

    fn refuse_batch_while_cached(&self) -> Option<OperationResult> {
        if self.options.cached_store() {
            Some(OperationResult::failed_with(self.errors.enable_cache()))
        } else {
            None
        }
    }

    /// Set-based update of all rows matching the filter.
    ///
    /// Fails fast with `EnableCache` while the cached store is enabled,
    /// before any backend work. The metadata stamp is appended to the
    /// caller's assignments.
    pub async fn update_where(
        &self,
        filter: &Filter,
        assignments: Vec<Assignment>,
    ) -> StoreResult<OperationResult> {
        self.guard()?;
        if let Some(refused) = self.refuse_batch_while_cached() {
            self.log_outcome("update_where", &refused);
            return Ok(refused);
        }

        let assignments = self.stamper.update_assignments(assignments);
        let result = match self.session.update_where(filter, &assignments).await {
            Ok(rows) => OperationResult::success(rows),
            Err(SessionError::ConcurrencyConflict) => {
                OperationResult::failed_with(self.errors.concurrency_failure())
            }
            Err(other) => return Err(backend_error(other)),
        };
        self.log_outcome("update_where", &result);
        Ok(result)
    }

    /// Set-based delete of all rows matching the filter.
    ///
    /// Fails fast with `EnableCache` while the cached store is enabled.
    /// Under soft delete the statement is rewritten into a set-based update
    /// of `updated_at`/`deleted_at`.
    pub async fn delete_where(&self, filter: &Filter) -> StoreResult<OperationResult> {
        self.guard()?;
        if let Some(refused) = self.refuse_batch_while_cached() {
            self.log_outcome("delete_where", &refused);
            return Ok(refused);
        }

        let executed = match self.stamper.delete_assignments() {
            Some(assignments) => self.session.update_where(filter, &assignments).await,
            None => self.session.delete_where(filter).await,
        };

        let result = match executed {
            Ok(rows) => OperationResult::success(rows),
            Err(SessionError::ConcurrencyConflict) => {
                OperationResult::failed_with(self.errors.concurrency_failure())
            }
            Err(other) => return Err(backend_error(other)),
        };
        self.log_outcome("delete_where", &result);
        Ok(result)
    }
}

impl<E, S> EntityStore<E, S>
where
    E: StoreEntity<Key = Uuid>,
    S: EntitySession<E>,
{
    /// Convenience constructor for UUID-keyed entities.
    pub fn with_uuid_keys(session: Arc<S>, options: StoreOptions) -> Self {
        Self::new(session, options, Arc::new(UuidKeyCodec))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::session::MemorySession;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use stratum_core::{ErrorCode, Timestamp};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: Uuid,
        name: String,
        balance: i64,
        created_at: Timestamp,
        updated_at: Timestamp,
        deleted_at: Option<Timestamp>,
    }

    impl StoreEntity for Account {
        type Key = Uuid;
        const ENTITY_NAME: &'static str = "Account";

        fn id(&self) -> Uuid {
            self.id
        }
        fn created_at(&self) -> Timestamp {
            self.created_at
        }
        fn set_created_at(&mut self, at: Timestamp) {
            self.created_at = at;
        }
        fn updated_at(&self) -> Timestamp {
            self.updated_at
        }
        fn set_updated_at(&mut self, at: Timestamp) {
            self.updated_at = at;
        }
        fn deleted_at(&self) -> Option<Timestamp> {
            self.deleted_at
        }
        fn set_deleted_at(&mut self, at: Option<Timestamp>) {
            self.deleted_at = at;
        }
    }

    fn make_account(name: &str) -> Account {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        Account {
            id: Uuid::now_v7(),
            name: name.to_string(),
            balance: 0,
            created_at: epoch,
            updated_at: epoch,
            deleted_at: None,
        }
    }

    fn make_store(options: StoreOptions) -> (EntityStore<Account, MemorySession<Account>>, Arc<MemorySession<Account>>) {
        let session = Arc::new(MemorySession::new());
        let store = EntityStore::with_uuid_keys(session.clone(), options);
        (store, session)
    }

    #[tokio::test]
    async fn test_create_stamps_and_commits() {
        let (store, session) = make_store(StoreOptions::new());
        let account = make_account("alice");
        let id = account.id();

        let result = store.create(account).await.unwrap();
        assert!(result.succeeded());
        assert_eq!(result.effect_rows(), 1);

        let stored = session.row(&id).unwrap();
        assert!(stored.created_at().timestamp() > 0);
        assert_eq!(stored.created_at(), stored.updated_at());
    }

    #[tokio::test]
    async fn test_create_without_metadata_hosting_keeps_timestamps() {
        let (store, session) =
            make_store(StoreOptions::new().with_metadata_hosting(false));
        let account = make_account("bare");
        let id = account.id();

        store.create(account).await.unwrap();
        assert_eq!(session.row(&id).unwrap().created_at().timestamp(), 0);
    }

    #[tokio::test]
    async fn test_create_defers_commit_without_auto_save() {
        let (store, session) =
            make_store(StoreOptions::new().with_auto_save_changes(false));

        let result = store.create(make_account("deferred")).await.unwrap();
        assert!(result.succeeded());
        assert_eq!(result.effect_rows(), 0);
        assert_eq!(session.row_count(), 0);

        // The session owner commits later.
        assert_eq!(session.commit().await.unwrap(), 1);
        assert_eq!(session.row_count(), 1);
    }

    #[tokio::test]
    async fn test_update_restamps_updated_at_only() {
        let (store, session) = make_store(StoreOptions::new());
        let account = make_account("bob");
        let id = account.id();
        store.create(account).await.unwrap();
        let created_at = session.row(&id).unwrap().created_at();

        let mut changed = session.row(&id).unwrap();
        changed.balance = 100;
        let result = store.update(changed).await.unwrap();
        assert!(result.succeeded());

        let stored = session.row(&id).unwrap();
        assert_eq!(stored.balance, 100);
        assert_eq!(stored.created_at(), created_at);
        assert!(stored.updated_at() >= created_at);
    }

    #[tokio::test]
    async fn test_soft_delete_rewrites_to_update() {
        let (store, session) = make_store(StoreOptions::new().with_soft_delete(true));
        let account = make_account("ghost");
        let id = account.id();
        store.create(account).await.unwrap();

        let target = session.row(&id).unwrap();
        let result = store.delete(target).await.unwrap();
        assert!(result.succeeded());

        // Row still present, marked deleted.
        let stored = session.row(&id).expect("soft delete keeps the row");
        assert!(stored.deleted_at().is_some());
        assert_eq!(stored.deleted_at(), Some(stored.updated_at()));
    }

    #[tokio::test]
    async fn test_hard_delete_removes_row() {
        let (store, session) = make_store(StoreOptions::new());
        let account = make_account("doomed");
        let id = account.id();
        store.create(account).await.unwrap();

        let target = session.row(&id).unwrap();
        let result = store.delete(target).await.unwrap();
        assert!(result.succeeded());
        assert!(session.row(&id).is_none());
    }

    #[tokio::test]
    async fn test_delete_by_id_not_found() {
        let (store, _session) = make_store(StoreOptions::new());
        let missing = Uuid::now_v7();

        let result = store.delete_by_id(&missing).await.unwrap();
        assert!(!result.succeeded());
        let error = result.first_error().unwrap();
        assert_eq!(error.code, ErrorCode::NotFoundId);
        assert!(error.description.contains(&missing.to_string()));
    }

    #[tokio::test]
    async fn test_delete_by_ids_mixed_deletes_existing() {
        let (store, session) = make_store(StoreOptions::new());
        let account = make_account("survivor-set");
        let existing = account.id();
        store.create(account).await.unwrap();

        let missing = Uuid::now_v7();
        let result = store.delete_by_ids(&[existing, missing]).await.unwrap();
        assert!(result.succeeded());
        assert_eq!(result.effect_rows(), 1);
        assert!(session.row(&existing).is_none());
    }

    #[tokio::test]
    async fn test_disposed_store_fails_fast() {
        let (store, session) = make_store(StoreOptions::new());
        store.dispose();

        let err = store.create(make_account("late")).await.unwrap_err();
        assert!(matches!(err, StoreError::Disposed));
        let err = store.find(&Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, StoreError::Disposed));
        assert_eq!(session.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_arguments_fail_fast() {
        let (store, _session) = make_store(StoreOptions::new());

        let err = store.create_many(Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::EmptyArgument { name: "entities" }
        ));

        let err = store.delete_by_ids(&[]).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyArgument { name: "ids" }));
    }

    #[tokio::test]
    async fn test_exists_and_find() {
        let (store, _session) = make_store(StoreOptions::new());
        let account = make_account("findable");
        let id = account.id();
        store.create(account).await.unwrap();

        assert!(store.exists(&id).await.unwrap());
        assert!(!store.exists(&Uuid::now_v7()).await.unwrap());
        assert_eq!(store.find(&id).await.unwrap().unwrap().name, "findable");
        assert!(store.find(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_where_stamps_metadata() {
        let (store, session) = make_store(StoreOptions::new());
        let account = make_account("bulk");
        let id = account.id();
        store.create(account).await.unwrap();
        let before = session.row(&id).unwrap().updated_at();

        let result = store
            .update_where(
                &Filter::eq("name", serde_json::json!("bulk")),
                vec![Assignment::set("balance", serde_json::json!(7))],
            )
            .await
            .unwrap();
        assert!(result.succeeded());
        assert_eq!(result.effect_rows(), 1);

        let stored = session.row(&id).unwrap();
        assert_eq!(stored.balance, 7);
        assert!(stored.updated_at() >= before);
    }

    #[tokio::test]
    async fn test_delete_where_soft_rewrites_to_update() {
        let (store, session) = make_store(StoreOptions::new().with_soft_delete(true));
        let account = make_account("bulk-ghost");
        let id = account.id();
        store.create(account).await.unwrap();

        let result = store
            .delete_where(&Filter::eq("name", serde_json::json!("bulk-ghost")))
            .await
            .unwrap();
        assert!(result.succeeded());
        assert_eq!(result.effect_rows(), 1);

        let stored = session.row(&id).expect("soft batch delete keeps rows");
        assert!(stored.deleted_at().is_some());
    }

    #[tokio::test]
    async fn test_delete_where_hard_removes_rows() {
        let (store, session) = make_store(StoreOptions::new());
        store.create(make_account("a")).await.unwrap();
        store.create(make_account("b")).await.unwrap();

        let result = store
            .delete_where(&Filter::eq("name", serde_json::json!("a")))
            .await
            .unwrap();
        assert!(result.succeeded());
        assert_eq!(result.effect_rows(), 1);
        assert_eq!(session.row_count(), 1);
    }

    #[tokio::test]
    async fn test_query_and_count() {
        let (store, _session) = make_store(StoreOptions::new());
        store.create(make_account("q1")).await.unwrap();
        store.create(make_account("q2")).await.unwrap();

        let all = Filter::contains("name", serde_json::json!("q"));
        assert_eq!(store.query(&all).await.unwrap().len(), 2);
        assert_eq!(store.count(&all).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cache_enabled_store_requires_cache_client() {
        let (store, _session) = make_store(StoreOptions::new().with_expires(30));
        // Commit succeeds, then the write-through discovers no cache client.
        let err = store.create(make_account("uncachable")).await.unwrap_err();
        assert!(matches!(err, StoreError::CacheNotConfigured));
    }

    #[tokio::test]
    async fn test_with_cache_write_through() {
        let session = Arc::new(MemorySession::new());
        let cache = Arc::new(MemoryCache::new());
        let store = EntityStore::<Account, _>::with_uuid_keys(
            session,
            StoreOptions::new().with_expires(60),
        )
        .with_cache(cache.clone());

        store.create(make_account("cached")).await.unwrap();
        assert_eq!(cache.len(), 1);
    }
}
