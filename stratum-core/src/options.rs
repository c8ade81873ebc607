//! Store configuration toggles and their coupling rules.

use serde::{Deserialize, Serialize};

/// Behavioral toggles for an entity store.
///
/// Two cross-field rules hold at all times:
///
/// - Enabling soft delete forces metadata hosting on, one-directionally: a
///   soft-deleted row must carry valid `updated_at`/`deleted_at` stamps.
/// - A positive `expires` enables the cached store, a negative value disables
///   it, and zero expresses no opinion and leaves the flag untouched.
///
/// Setters never fail; configuration mutation is infallible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    auto_save_changes: bool,
    metadata_hosting: bool,
    soft_delete: bool,
    cached_store: bool,
    expires: i64,
    debug_logging: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            auto_save_changes: true,
            metadata_hosting: true,
            soft_delete: false,
            cached_store: false,
            expires: 0,
            debug_logging: false,
        }
    }
}

impl StoreOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether mutations commit immediately.
    pub fn auto_save_changes(&self) -> bool {
        self.auto_save_changes
    }

    /// Whether audit timestamps are managed automatically.
    pub fn metadata_hosting(&self) -> bool {
        self.metadata_hosting
    }

    /// Whether deletes are rewritten into soft deletes.
    pub fn soft_delete(&self) -> bool {
        self.soft_delete
    }

    /// Whether the store is fronted by a cache.
    pub fn cached_store(&self) -> bool {
        self.cached_store
    }

    /// Cache entry lifetime in seconds; non-positive means no expiration.
    pub fn expires(&self) -> i64 {
        self.expires
    }

    /// Whether mutation outcomes are logged at debug level.
    pub fn debug_logging(&self) -> bool {
        self.debug_logging
    }

    /// Enable or disable immediate commits.
    pub fn set_auto_save_changes(&mut self, enabled: bool) {
        self.auto_save_changes = enabled;
    }

    /// Enable or disable automatic timestamp management.
    pub fn set_metadata_hosting(&mut self, enabled: bool) {
        self.metadata_hosting = enabled;
    }

    /// Enable or disable soft delete.
    ///
    /// Enabling also turns metadata hosting on; disabling leaves it alone.
    pub fn set_soft_delete(&mut self, enabled: bool) {
        self.soft_delete = enabled;
        if enabled {
            self.metadata_hosting = true;
        }
    }

    /// Enable or disable the cached store.
    pub fn set_cached_store(&mut self, enabled: bool) {
        self.cached_store = enabled;
    }

    /// Set the cache entry lifetime in seconds.
    ///
    /// A positive value enables the cached store, a negative value disables
    /// it, and zero leaves the flag unchanged.
    pub fn set_expires(&mut self, seconds: i64) {
        self.expires = seconds;
        if seconds > 0 {
            self.cached_store = true;
        } else if seconds < 0 {
            self.cached_store = false;
        }
    }

    /// Enable or disable debug logging of mutation outcomes.
    pub fn set_debug_logging(&mut self, enabled: bool) {
        self.debug_logging = enabled;
    }

    /// Set immediate commits, builder style.
    pub fn with_auto_save_changes(mut self, enabled: bool) -> Self {
        self.set_auto_save_changes(enabled);
        self
    }

    /// Set metadata hosting, builder style.
    pub fn with_metadata_hosting(mut self, enabled: bool) -> Self {
        self.set_metadata_hosting(enabled);
        self
    }

    /// Set soft delete, builder style; applies the metadata-hosting coupling.
    pub fn with_soft_delete(mut self, enabled: bool) -> Self {
        self.set_soft_delete(enabled);
        self
    }

    /// Set the cached-store flag, builder style.
    pub fn with_cached_store(mut self, enabled: bool) -> Self {
        self.set_cached_store(enabled);
        self
    }

    /// Set the cache lifetime, builder style; applies the cache coupling.
    pub fn with_expires(mut self, seconds: i64) -> Self {
        self.set_expires(seconds);
        self
    }

    /// Set debug logging, builder style.
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.set_debug_logging(enabled);
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_delete_forces_metadata_hosting() {
        let mut options = StoreOptions::new().with_metadata_hosting(false);
        assert!(!options.metadata_hosting());

        options.set_soft_delete(true);
        assert!(options.metadata_hosting());
    }

    #[test]
    fn test_disabling_soft_delete_keeps_metadata_hosting() {
        let mut options = StoreOptions::new().with_soft_delete(true);
        options.set_soft_delete(false);
        assert!(options.metadata_hosting());
        assert!(!options.soft_delete());
    }

    #[test]
    fn test_positive_expires_enables_cache() {
        let mut options = StoreOptions::new();
        options.set_expires(30);
        assert!(options.cached_store());
        assert_eq!(options.expires(), 30);
    }

    #[test]
    fn test_negative_expires_disables_cache() {
        let mut options = StoreOptions::new().with_cached_store(true);
        options.set_expires(-1);
        assert!(!options.cached_store());
    }

    #[test]
    fn test_zero_expires_leaves_cache_flag_alone() {
        let mut enabled = StoreOptions::new().with_cached_store(true);
        enabled.set_expires(0);
        assert!(enabled.cached_store());

        let mut disabled = StoreOptions::new();
        disabled.set_expires(0);
        assert!(!disabled.cached_store());
    }

    #[test]
    fn test_builder_applies_couplings() {
        let options = StoreOptions::new()
            .with_metadata_hosting(false)
            .with_soft_delete(true)
            .with_expires(60);
        assert!(options.metadata_hosting());
        assert!(options.cached_store());
    }
}

// =============================================================================
// PROPERTY-BASED TESTS
// =============================================================================
