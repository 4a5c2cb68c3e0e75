//! Reclaim Cache - short-TTL response caching.
//!
//! Two pieces:
//!
//! - [`TtlCache`]: a bounded, insertion-ordered store whose entries expire a
//!   fixed time after they were stored. Expiry is checked lazily on read.
//! - [`with_caching`]: decorates an async fetch function so that calls with
//!   the same key are served from a [`TtlCache`] until the entry expires.
//!
//! The clock is `tokio::time::Instant`, so tests can drive expiry with a
//! paused runtime.

pub mod adapter;
pub mod store;

pub use adapter::{with_caching, Memoized};
pub use store::{CacheConfig, CacheEntry, CacheStats, TtlCache};
