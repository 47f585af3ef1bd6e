//! querycache Storage - Cache Stores and Atomic Locks
//!
//! The decorator only talks to the [`CacheStore`] trait. This crate defines
//! it, the lock lifecycle used for stampede protection, and a thread-safe
//! in-memory store.

pub mod lock;
pub mod memory;
pub mod traits;

pub use lock::{HeldLock, LockOwner, PendingLock};
pub use memory::MemoryStore;
pub use traits::{CacheStore, LockProvider};
