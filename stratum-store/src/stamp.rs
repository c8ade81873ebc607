//! Metadata and soft-delete stamping.
//!
//! Every mutation path funnels through this module. Materialized entities are
//! stamped in place; set-based mutations get the equivalent timestamp
//! assignments appended to their setter expressions.

use chrono::Utc;
use serde_json::json;
use stratum_core::{Assignment, StoreEntity, StoreOptions};

/// Serialized field name carrying the last-modified timestamp.
pub const UPDATED_AT_FIELD: &str = "updated_at";
/// Serialized field name carrying the soft-delete timestamp.
pub const DELETED_AT_FIELD: &str = "deleted_at";

/// Applies audit timestamps according to the store options.
#[derive(Debug, Clone, Copy)]
pub struct MetadataStamper {
    metadata_hosting: bool,
    soft_delete: bool,
}

impl MetadataStamper {
    /// Capture the stamping-relevant flags from the options.
    pub fn from_options(options: &StoreOptions) -> Self {
        Self {
            metadata_hosting: options.metadata_hosting(),
            soft_delete: options.soft_delete(),
        }
    }

    /// Whether deletes must be rewritten into soft deletes.
    pub fn soft_delete(&self) -> bool {
        self.soft_delete
    }

    /// Stamp a batch for insertion: `created_at = updated_at = now`.
    ///
    /// No-op when metadata hosting is off. One timestamp is taken per batch.
    pub fn stamp_for_insert<E: StoreEntity>(&self, entities: &mut [E]) {
        if !self.metadata_hosting {
            return;
        }
        let now = Utc::now();
        for entity in entities {
            entity.set_created_at(now);
            entity.set_updated_at(now);
        }
    }

    /// Stamp a batch for update: `updated_at = now`.
    pub fn stamp_for_update<E: StoreEntity>(&self, entities: &mut [E]) {
        if !self.metadata_hosting {
            return;
        }
        let now = Utc::now();
        for entity in entities {
            entity.set_updated_at(now);
        }
    }

    /// Stamp a batch for deletion.
    ///
    /// Under soft delete, sets `updated_at = deleted_at = now` and returns
    /// true: the caller must convert the physical delete into an update.
    /// Otherwise a no-op returning false; the caller deletes physically.
    pub fn stamp_for_delete<E: StoreEntity>(&self, entities: &mut [E]) -> bool {
        if !self.soft_delete {
            return false;
        }
        let now = Utc::now();
        for entity in entities {
            entity.set_updated_at(now);
            entity.set_deleted_at(Some(now));
        }
        true
    }

    /// Append the `updated_at` stamp to a set-based update's assignments.
    ///
    /// The backend executes the combined list as one statement; whether
    /// independent setters can compose atomically is the backend's constraint,
    /// not hidden here.
    pub fn update_assignments(&self, mut assignments: Vec<Assignment>) -> Vec<Assignment> {
        if self.metadata_hosting {
            assignments.push(Assignment::set(
                UPDATED_AT_FIELD,
                json!(Utc::now().to_rfc3339()),
            ));
        }
        assignments
    }

    /// Assignments that turn a set-based delete into a soft delete.
    ///
    /// Returns `None` when soft delete is off and the delete stays physical.
    pub fn delete_assignments(&self) -> Option<Vec<Assignment>> {
        if !self.soft_delete {
            return None;
        }
        let now = json!(Utc::now().to_rfc3339());
        Some(vec![
            Assignment::set(UPDATED_AT_FIELD, now.clone()),
            Assignment::set(DELETED_AT_FIELD, now),
        ])
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use stratum_core::Timestamp;
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Row {
        id: Uuid,
        created_at: Timestamp,
        updated_at: Timestamp,
        deleted_at: Option<Timestamp>,
    }

    impl StoreEntity for Row {
        type Key = Uuid;
        const ENTITY_NAME: &'static str = "Row";

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

    fn epoch_row() -> Row {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        Row {
            id: Uuid::now_v7(),
            created_at: epoch,
            updated_at: epoch,
            deleted_at: None,
        }
    }

    fn stamper(metadata_hosting: bool, soft_delete: bool) -> MetadataStamper {
        let options = StoreOptions::new()
            .with_metadata_hosting(metadata_hosting)
            .with_soft_delete(soft_delete);
        MetadataStamper::from_options(&options)
    }

    #[test]
    fn test_insert_stamp_sets_both_timestamps() {
        let mut rows = vec![epoch_row(), epoch_row()];
        stamper(true, false).stamp_for_insert(&mut rows);

        for row in &rows {
            assert!(row.created_at().timestamp() > 0);
            assert_eq!(row.created_at(), row.updated_at());
        }
        // Same instant across the batch.
        assert_eq!(rows[0].created_at(), rows[1].created_at());
    }

    #[test]
    fn test_insert_stamp_noop_without_hosting() {
        let mut rows = vec![epoch_row()];
        stamper(false, false).stamp_for_insert(&mut rows);
        assert_eq!(rows[0].created_at().timestamp(), 0);
    }

    #[test]
    fn test_update_stamp_leaves_created_at() {
        let mut rows = vec![epoch_row()];
        stamper(true, false).stamp_for_update(&mut rows);
        assert_eq!(rows[0].created_at().timestamp(), 0);
        assert!(rows[0].updated_at().timestamp() > 0);
    }

    #[test]
    fn test_delete_stamp_soft() {
        let mut rows = vec![epoch_row()];
        let soft = stamper(true, true).stamp_for_delete(&mut rows);
        assert!(soft);
        assert_eq!(rows[0].deleted_at(), Some(rows[0].updated_at()));
    }

    #[test]
    fn test_delete_stamp_hard_is_noop() {
        let mut rows = vec![epoch_row()];
        let soft = stamper(true, false).stamp_for_delete(&mut rows);
        assert!(!soft);
        assert!(rows[0].deleted_at().is_none());
        assert_eq!(rows[0].updated_at().timestamp(), 0);
    }

    #[test]
    fn test_update_assignments_appends_stamp() {
        let user = vec![Assignment::set("status", serde_json::json!("closed"))];
        let combined = stamper(true, false).update_assignments(user.clone());
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0], user[0]);
        assert_eq!(combined[1].field, UPDATED_AT_FIELD);
    }

    #[test]
    fn test_update_assignments_passthrough_without_hosting() {
        let user = vec![Assignment::set("status", serde_json::json!("closed"))];
        let combined = stamper(false, false).update_assignments(user.clone());
        assert_eq!(combined, user);
    }

    #[test]
    fn test_delete_assignments() {
        assert!(stamper(true, false).delete_assignments().is_none());

        let soft = stamper(true, true).delete_assignments().unwrap();
        assert_eq!(soft.len(), 2);
        assert_eq!(soft[0].field, UPDATED_AT_FIELD);
        assert_eq!(soft[1].field, DELETED_AT_FIELD);
        assert_eq!(soft[0].value, soft[1].value);
    }
}
