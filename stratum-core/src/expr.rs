//! Declarative filter and assignment expressions for set-based mutation.
//!
//! These are pure data. The backend collaborator evaluates filters and applies
//! assignments without materializing rows; the in-memory session in
//! `stratum-store` does the same over JSON values.

use serde::{Deserialize, Serialize};

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Contains substring (for strings) or element (for arrays)
    Contains,
    /// In list of values
    In,
}

/// Predicate over an entity's serialized fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Single field comparison.
    Field {
        /// Field to filter on (serialized field name).
        field: String,
        /// Operator to apply.
        op: FilterOp,
        /// Value to compare against.
        value: serde_json::Value,
    },
    /// All sub-filters must match.
    All(Vec<Filter>),
    /// Any sub-filter must match.
    Any(Vec<Filter>),
}

impl Filter {
    /// Create a field comparison filter.
    pub fn field(field: impl Into<String>, op: FilterOp, value: serde_json::Value) -> Self {
        Self::Field {
            field: field.into(),
            op,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::field(field, FilterOp::Eq, value)
    }

    /// Create an inequality filter.
    pub fn ne(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::field(field, FilterOp::Ne, value)
    }

    /// Create a greater-than filter.
    pub fn gt(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::field(field, FilterOp::Gt, value)
    }

    /// Create a less-than filter.
    pub fn lt(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::field(field, FilterOp::Lt, value)
    }

    /// Create a contains filter.
    pub fn contains(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::field(field, FilterOp::Contains, value)
    }

    /// Combine with another filter conjunctively.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All(mut parts) => {
                parts.push(other);
                Filter::All(parts)
            }
            first => Filter::All(vec![first, other]),
        }
    }

    /// Combine with another filter disjunctively.
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Any(mut parts) => {
                parts.push(other);
                Filter::Any(parts)
            }
            first => Filter::Any(vec![first, other]),
        }
    }
}

/// A single field assignment in a set-based update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Field to assign (serialized field name).
    pub field: String,
    /// Value to assign.
    pub value: serde_json::Value,
}

impl Assignment {
    /// Create a new assignment.
    pub fn set(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_and_flattens() {
        let filter = Filter::eq("status", json!("open"))
            .and(Filter::gt("priority", json!(2)))
            .and(Filter::ne("owner", json!(null)));

        match filter {
            Filter::All(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected All, got {:?}", other),
        }
    }

    #[test]
    fn test_or_wraps_pairs() {
        let filter = Filter::eq("a", json!(1)).or(Filter::eq("b", json!(2)));
        assert!(matches!(filter, Filter::Any(ref parts) if parts.len() == 2));
    }

    #[test]
    fn test_assignment_construction() {
        let set = Assignment::set("status", json!("closed"));
        assert_eq!(set.field, "status");
        assert_eq!(set.value, json!("closed"));
    }
}
