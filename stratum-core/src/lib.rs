//! Stratum Core - Entity Store Data Types
//!
//! Pure data structures with no behavior. The store engine in `stratum-store`
//! depends on this crate; backend and cache adapters only ever need the types
//! defined here.

use chrono::{DateTime, Utc};

pub mod entity;
pub mod error;
pub mod expr;
pub mod key;
pub mod options;
pub mod result;

pub use entity::{cache_key_for, StoreEntity};
pub use error::{
    EnglishCatalog, ErrorCode, ErrorDescriptor, MessageCatalog, OperationError, StoreError,
    StoreResult,
};
pub use expr::{Assignment, Filter, FilterOp};
pub use key::{DisplayKeyCodec, KeyCodec, KeyCodecError, UuidKeyCodec};
pub use options::StoreOptions;
pub use result::OperationResult;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
