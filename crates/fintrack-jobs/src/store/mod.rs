//! Retry store implementations.
//!
//! - [`RedisStore`]: the production broker.
//! - [`MemoryStore`]: process-local stand-in with the same semantics, for
//!   tests and single-process setups.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::{RedisStore, RedisStoreConfig};
