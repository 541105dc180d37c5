//! A process-wide cache of the current `Date` header value.
//!
//! Formatting an HTTP date costs more than attaching one, so a background
//! service re-formats the current time once per second and swaps it into an
//! atomic reference. The server reads the cache on every response without
//! taking a lock.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::BoxFuture;
use log::trace;

use super::{Service, ShutdownToken};
use crate::helpers::date::now_http_date;

/// The shared, atomically swapped date string. Single writer (the service),
/// many readers.
pub struct DateCache {
    current: ArcSwap<String>,
}

impl DateCache {
    /// A cache primed with the current time.
    pub fn new() -> Arc<DateCache> {
        Arc::new(DateCache {
            current: ArcSwap::from_pointee(now_http_date()),
        })
    }

    /// The current RFC 9110 date string.
    pub fn current(&self) -> Arc<String> {
        self.current.load_full()
    }

    fn refresh(&self) {
        self.current.store(Arc::new(now_http_date()));
    }
}

/// The ticker service keeping a [`DateCache`] fresh.
pub struct DateCacheService {
    cache: Arc<DateCache>,
}

impl DateCacheService {
    /// A service refreshing the given cache once per second.
    pub fn new(cache: Arc<DateCache>) -> DateCacheService {
        DateCacheService { cache }
    }
}

impl Service for DateCacheService {
    fn name(&self) -> &'static str {
        "date-cache"
    }

    fn run(self: Box<Self>, shutdown: ShutdownToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.cache.refresh(),
                    _ = shutdown.cancelled() => break,
                }
            }
            trace!(target: "shrike::services", "date cache stopped");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::date::parse_http_date;

    #[test]
    fn the_cache_holds_a_valid_http_date() {
        let cache = DateCache::new();
        let value = cache.current();
        assert_eq!(value.len(), 29);
        assert!(parse_http_date(&value).is_ok());
    }

    #[test]
    fn refresh_swaps_the_reference() {
        let cache = DateCache::new();
        let before = cache.current();
        cache.refresh();
        let after = cache.current();
        // The string contents may be equal within the same second, but the
        // reference must have been replaced.
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn the_service_stops_on_shutdown() {
        let cache = DateCache::new();
        let service = Box::new(DateCacheService::new(cache));
        let shutdown = ShutdownToken::standalone();
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), service.run(shutdown))
            .await
            .expect("service should stop promptly")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn the_ticker_refreshes_every_second() {
        let cache = DateCache::new();
        let reference = cache.current();

        let service = Box::new(DateCacheService::new(cache.clone()));
        let shutdown = ShutdownToken::standalone();
        let stop = shutdown.clone();
        let handle = tokio::spawn(service.run(shutdown));

        tokio::time::advance(Duration::from_millis(3500)).await;
        tokio::task::yield_now().await;
        assert!(!Arc::ptr_eq(&reference, &cache.current()));

        stop.cancel();
        handle.await.unwrap().unwrap();
    }
}
