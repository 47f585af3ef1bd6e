//! querycache Core - Query Definitions and Cache Keys
//!
//! Pure data structures and pure functions. All other crates depend on this.
//! Nothing here performs I/O or logs:
//!
//! - [`QueryDefinition`]: the accumulated state of a query builder
//! - [`QueryBuilder`]: the chainable builder surface every query object shares
//! - [`Retrieval`]: a terminal call and the shape of what it returns
//! - [`fingerprint`]: the stable cache key of a terminal call
//! - [`CachedEnvelope`]: the sentinel codec for values written to a cache store

pub mod builder;
pub mod config;
pub mod definition;
pub mod directive;
pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod pagination;
pub mod retrieval;
pub mod value;

pub use builder::{CachedRelation, QueryBuilder, RelationQuery};
pub use config::{CacheSettings, DEFAULT_NAMESPACE, DEFAULT_PAGE_NAME, DEFAULT_PER_PAGE, DEFAULT_TTL};
pub use definition::{Boolean, Direction, EagerLoad, Operator, Order, Predicate, QueryDefinition};
pub use directive::{CacheDirective, Ttl};
pub use envelope::CachedEnvelope;
pub use error::{
    ConfigError, EnvelopeError, ExecutorError, ProxyError, QueryCacheError, QueryCacheResult,
    StoreError,
};
pub use fingerprint::{canonical_form, fingerprint, Fingerprint};
pub use pagination::{FixedPage, NoPagination, PaginationContext, RequestParams};
pub use retrieval::{Aggregate, Retrieval, RetrievalShape, Write};
pub use value::{Page, QueryResult, Record, ResultShape, Value};
