//! querycache Proxy - Transparent Query Caching
//!
//! Wrap a [`Query`] with [`Cacheable::cache`] (or `cache_with` for an explicit
//! TTL, key or lock wait) and use it exactly like the query itself. Builder
//! calls pass through; terminal calls are served from the connection's cache
//! store when possible:
//!
//! ```ignore
//! let user = connection
//!     .table("users")
//!     .cache()?
//!     .where_eq("id", 1)
//!     .first()?;
//! ```

pub mod classifier;
pub mod connection;
pub mod decorator;
pub mod executor;
mod propagate;
mod protocol;
pub mod query;

pub use classifier::{classify, CallKind};
pub use connection::Connection;
pub use decorator::CachedQuery;
pub use executor::{QueryExecutor, RelationFetch, RelationLoader};
pub use propagate::EagerLoadPropagator;
pub use query::{Cacheable, Query, Terminal};

// Builder surface, so `use querycache_proxy::*` is enough to build queries.
pub use querycache_core::QueryBuilder;
