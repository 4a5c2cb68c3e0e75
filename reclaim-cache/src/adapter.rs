//! Memoizing wrapper around asynchronous fetch functions.
//!
//! [`with_caching`] pairs a fetch function with a deterministic key function
//! and a private [`TtlCache`]. Calls first consult the cache; only misses reach
//! the underlying fetch. Failed fetches are never stored, and neither are
//! results of fetches that were overtaken by an invalidation.
//!
//! Mutating calls must not be wrapped: they always go to the network.

use std::fmt;
use std::future::Future;

use crate::store::{CacheConfig, CacheStats, TtlCache};

/// A fetch function decorated with TTL memoization.
pub struct Memoized<F, K, T> {
    fetch: F,
    key_fn: K,
    cache: TtlCache<T>,
}

/// Wrap `fetch` so that repeated calls with the same key are served from a
/// cache for the configured TTL.
///
/// ```ignore
/// let bookings = with_caching(
///     |()| async { gateway.bookings().await },
///     |_: &()| "bookings".to_string(),
///     CacheConfig::new().with_ttl(Duration::from_secs(10)),
/// );
/// let fresh_or_cached = bookings.call(()).await?;
/// ```
pub fn with_caching<F, K, T>(fetch: F, key_fn: K, config: CacheConfig) -> Memoized<F, K, T> {
    Memoized {
        fetch,
        key_fn,
        cache: TtlCache::new(config),
    }
}

impl<F, K, T> Memoized<F, K, T> {
    /// Invoke the wrapped fetch, or return the cached value for the key.
    pub async fn call<A, E, Fut>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        K: Fn(&A) -> String,
        T: Clone,
    {
        let key = (self.key_fn)(&args);

        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(key = %key, "cache hit");
            return Ok(cached);
        }

        tracing::debug!(key = %key, "cache miss, fetching");
        let epoch = self.cache.epoch();
        let data = (self.fetch)(args).await?;
        // An invalidation during the fetch means `data` may predate a write.
        self.cache.set_if_epoch(key, data.clone(), epoch);
        Ok(data)
    }

    /// Drop the cached value that `args` would resolve to.
    pub fn invalidate<A>(&self, args: &A)
    where
        K: Fn(&A) -> String,
    {
        self.cache.invalidate(&(self.key_fn)(args));
    }

    /// Drop a cached value by its key.
    pub fn invalidate_key(&self, key: &str) {
        self.cache.invalidate(key);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &TtlCache<T> {
        &self.cache
    }
}

impl<F, K, T> fmt::Debug for Memoized<F, K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("config", self.cache.config())
            .field("entries", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_fetch(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(u32) -> std::future::Ready<Result<u32, String>> {
        move |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(n * 10))
        }
    }

    #[tokio::test]
    async fn test_hit_skips_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let wrapped = with_caching(
            counting_fetch(calls.clone()),
            |n: &u32| format!("n:{}", n),
            CacheConfig::default(),
        );

        assert_eq!(wrapped.call(4).await, Ok(40));
        assert_eq!(wrapped.call(4).await, Ok(40));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(wrapped.call(5).await, Ok(50));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_after_ttl_refetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let wrapped = with_caching(
            counting_fetch(calls.clone()),
            |_: &u32| "constant".to_string(),
            CacheConfig::new().with_ttl(Duration::from_secs(15)),
        );

        wrapped.call(1).await.unwrap();
        tokio::time::advance(Duration::from_secs(16)).await;
        wrapped.call(1).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let wrapped = with_caching(
            move |()| {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err("backend down".to_string())
                    } else {
                        Ok(7u8)
                    }
                }
            },
            |_: &()| "points_balance".to_string(),
            CacheConfig::default(),
        );

        assert!(wrapped.call(()).await.is_err());
        assert_eq!(wrapped.call(()).await, Ok(7));
        assert_eq!(wrapped.call(()).await, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let wrapped = with_caching(
            counting_fetch(calls.clone()),
            |n: &u32| format!("n:{}", n),
            CacheConfig::default(),
        );

        wrapped.call(2).await.unwrap();
        wrapped.invalidate(&2);
        wrapped.call(2).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        wrapped.invalidate_key("n:2");
        wrapped.clear();
        wrapped.call(2).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(wrapped.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_is_not_undone() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (fetch_gate, counter) = (gate.clone(), calls.clone());
        let wrapped = with_caching(
            move |n: u32| {
                let gate = fetch_gate.clone();
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        gate.notified().await;
                    }
                    Ok::<u32, String>(n + attempt as u32)
                }
            },
            |_: &u32| "bookings".to_string(),
            CacheConfig::default(),
        );

        let (stale, ()) = tokio::join!(wrapped.call(3), async {
            tokio::task::yield_now().await;
            wrapped.invalidate(&3);
            gate.notify_one();
        });

        assert_eq!(stale, Ok(3));
        assert!(wrapped.cache().is_empty());
        assert_eq!(wrapped.call(3).await, Ok(4));
        assert_eq!(wrapped.call(3).await, Ok(4));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
