//! Error types for store operations.
//!
//! Two families live here. `OperationError` values travel inside
//! `OperationResult` and cover the expected failure modes a caller handles as
//! data (conflicts, missing rows, batch-vs-cache refusal). `StoreError` covers
//! hard failures: programmer errors surfaced fail-fast and unmodeled backend
//! faults that propagate.

use crate::key::KeyCodecError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Closed set of recoverable operation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The backend reported an optimistic-concurrency conflict during commit.
    ConcurrencyFailure,
    /// A by-id lookup prior to mutation found no matching row(s).
    NotFoundId,
    /// A uniqueness precondition failed before a mutation was attempted.
    EntityAlreadyExists,
    /// An existence precondition failed before a mutation was attempted.
    EntityNotFound,
    /// Set-based batch mutation was attempted while caching is enabled.
    EnableCache,
}

/// Immutable code/description pair carried by failed operation results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// The typed error code.
    pub code: ErrorCode,
    /// Human-readable description, formatted by the active catalog.
    pub description: String,
}

/// Source of human-readable templates for each error code.
///
/// Swap the catalog to localize descriptions; codes are what callers match on.
pub trait MessageCatalog: Send + Sync {
    /// Format the description for `code`, interpolating `args`.
    fn format(&self, code: ErrorCode, args: &[&str]) -> String;
}

/// Built-in English message catalog.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishCatalog;

impl MessageCatalog for EnglishCatalog {
    fn format(&self, code: ErrorCode, args: &[&str]) -> String {
        match code {
            ErrorCode::ConcurrencyFailure => {
                "Optimistic concurrency failure, the record has been modified".to_string()
            }
            ErrorCode::NotFoundId => {
                format!("No entity found with id: {}", args.join(", "))
            }
            ErrorCode::EntityAlreadyExists => {
                format!("Entity already exists: {}", args.join(", "))
            }
            ErrorCode::EntityNotFound => {
                format!("Entity not found: {}", args.join(", "))
            }
            ErrorCode::EnableCache => {
                "Batch mutation is not available while caching is enabled".to_string()
            }
        }
    }
}

/// Stateless formatting service producing typed operation errors.
///
/// Construct once and share; it carries no mutable state, so no process-wide
/// instance is needed.
#[derive(Clone)]
pub struct ErrorDescriptor {
    catalog: Arc<dyn MessageCatalog>,
}

impl std::fmt::Debug for ErrorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorDescriptor").finish_non_exhaustive()
    }
}

impl Default for ErrorDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorDescriptor {
    /// Create a descriptor backed by the built-in English catalog.
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(EnglishCatalog),
        }
    }

    /// Create a descriptor backed by a custom catalog.
    pub fn with_catalog(catalog: Arc<dyn MessageCatalog>) -> Self {
        Self { catalog }
    }

    /// Describe an arbitrary code with the given arguments.
    pub fn describe(&self, code: ErrorCode, args: &[&str]) -> OperationError {
        OperationError {
            code,
            description: self.catalog.format(code, args),
        }
    }

    /// An optimistic-concurrency conflict reported by the backend.
    pub fn concurrency_failure(&self) -> OperationError {
        self.describe(ErrorCode::ConcurrencyFailure, &[])
    }

    /// A by-id lookup miss; `ids` is the comma-joined offending id list.
    pub fn not_found_id(&self, ids: &str) -> OperationError {
        self.describe(ErrorCode::NotFoundId, &[ids])
    }

    /// A uniqueness precondition failure.
    pub fn entity_already_exists(&self, name: &str) -> OperationError {
        self.describe(ErrorCode::EntityAlreadyExists, &[name])
    }

    /// An existence precondition failure.
    pub fn entity_not_found(&self, name: &str) -> OperationError {
        self.describe(ErrorCode::EntityNotFound, &[name])
    }

    /// Batch mutation refused because caching is enabled.
    pub fn enable_cache(&self) -> OperationError {
        self.describe(ErrorCode::EnableCache, &[])
    }
}

/// Hard failures that surface as `Err`, never inside an `OperationResult`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation invoked after the store was disposed.
    #[error("store has been disposed")]
    Disposed,

    /// A required argument was missing or empty; carries the argument name.
    #[error("required argument is missing or empty: {name}")]
    EmptyArgument {
        /// Name of the offending argument.
        name: &'static str,
    },

    /// A cache-keyed lookup was attempted while caching is disabled, or the
    /// configuration requires caching but no cache dependency was provided.
    #[error("cache is not configured for this store")]
    CacheNotConfigured,

    /// Key encode/decode failure.
    #[error("key codec error: {0}")]
    KeyCodec(#[from] KeyCodecError),

    /// Entity snapshot (de)serialization failure.
    #[error("serialization error: {reason}")]
    Serialization {
        /// What went wrong.
        reason: String,
    },

    /// Unmodeled backend failure; propagates untouched.
    #[error("backend error: {reason}")]
    Backend {
        /// Backend-supplied reason.
        reason: String,
    },
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_id_embeds_ids() {
        let descriptor = ErrorDescriptor::new();
        let err = descriptor.not_found_id("a1,b2,c3");
        assert_eq!(err.code, ErrorCode::NotFoundId);
        assert!(err.description.contains("a1,b2,c3"));
    }

    #[test]
    fn test_concurrency_failure_code() {
        let descriptor = ErrorDescriptor::new();
        let err = descriptor.concurrency_failure();
        assert_eq!(err.code, ErrorCode::ConcurrencyFailure);
        assert!(err.description.contains("concurrency"));
    }

    #[test]
    fn test_enable_cache_code() {
        let descriptor = ErrorDescriptor::new();
        let err = descriptor.enable_cache();
        assert_eq!(err.code, ErrorCode::EnableCache);
    }

    #[test]
    fn test_custom_catalog() {
        struct Terse;
        impl MessageCatalog for Terse {
            fn format(&self, code: ErrorCode, _args: &[&str]) -> String {
                format!("{:?}", code)
            }
        }

        let descriptor = ErrorDescriptor::with_catalog(Arc::new(Terse));
        let err = descriptor.not_found_id("x");
        assert_eq!(err.description, "NotFoundId");
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::EmptyArgument { name: "entities" };
        assert!(format!("{}", err).contains("entities"));

        let err = StoreError::Disposed;
        assert!(format!("{}", err).contains("disposed"));
    }
}
