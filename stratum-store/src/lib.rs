//! Stratum Store - Generic Entity Persistence Facade
//!
//! Composes a transactional backend session with metadata stamping, soft
//! delete, and an optional write-through cache. Backend drivers and cache
//! clients are injected through the traits defined here; in-memory
//! implementations of both ship with the crate.

pub mod cache;
pub mod session;
pub mod stamp;
pub mod store;

pub use cache::{CacheFacade, DistributedCache, MemoryCache};
pub use session::{EntitySession, MemorySession, SessionError};
pub use stamp::MetadataStamper;
pub use store::EntityStore;
