//! The uniform outcome value returned by every mutating store operation.

use crate::error::OperationError;
use serde::{Deserialize, Serialize};

/// Immutable outcome record for a mutating operation.
///
/// Exactly one result is produced per mutating call. Invariants: a succeeded
/// result carries no errors, a failed result carries at least one; the
/// affected-row count is meaningful only on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    succeeded: bool,
    effect_rows: u64,
    errors: Vec<OperationError>,
}

impl OperationResult {
    /// A successful outcome affecting `effect_rows` rows.
    pub fn success(effect_rows: u64) -> Self {
        Self {
            succeeded: true,
            effect_rows,
            errors: Vec::new(),
        }
    }

    /// A failed outcome carrying the given errors.
    pub fn failed(errors: Vec<OperationError>) -> Self {
        debug_assert!(!errors.is_empty(), "failed result requires errors");
        Self {
            succeeded: false,
            effect_rows: 0,
            errors,
        }
    }

    /// A failed outcome carrying a single error.
    pub fn failed_with(error: OperationError) -> Self {
        Self::failed(vec![error])
    }

    /// Whether the operation succeeded.
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Number of rows affected; meaningful only when `succeeded()` is true.
    pub fn effect_rows(&self) -> u64 {
        self.effect_rows
    }

    /// The ordered list of typed errors; empty on success.
    pub fn errors(&self) -> &[OperationError] {
        &self.errors
    }

    /// The first error, if any.
    pub fn first_error(&self) -> Option<&OperationError> {
        self.errors.first()
    }

    /// Whether any error carries the given code.
    pub fn has_code(&self, code: crate::error::ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}
