use std::sync::Arc;

use tower::Layer;
use tracing::warn;

use strata::{CacheMetrics, KvStore, NoopMetrics, ObjectCache, ObjectCacheConfig};
use strata_http::{PageCacheConfig, PageCacheEngine};

use crate::middleware::PageCacheMiddleware;

/// Tower layer that puts the page cache in front of a service.
///
/// Each request gets its own object cache over the shared store.
pub struct PageCacheLayer<S, M = NoopMetrics>
where
    S: KvStore,
    M: CacheMetrics,
{
    shared: Arc<Shared<S, M>>,
}

pub(crate) struct Shared<S, M> {
    store: Arc<S>,
    cache_config: ObjectCacheConfig,
    page_config: Arc<PageCacheConfig>,
    metrics: Arc<M>,
}

impl<S> PageCacheLayer<S, NoopMetrics>
where
    S: KvStore,
{
    pub fn new(store: Arc<S>, cache_config: ObjectCacheConfig, page_config: PageCacheConfig) -> Self {
        Self::with_metrics(store, cache_config, page_config, Arc::new(NoopMetrics))
    }
}

impl<S, M> PageCacheLayer<S, M>
where
    S: KvStore,
    M: CacheMetrics,
{
    pub fn with_metrics(
        store: Arc<S>,
        cache_config: ObjectCacheConfig,
        page_config: PageCacheConfig,
        metrics: Arc<M>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                cache_config,
                page_config: Arc::new(page_config),
                metrics,
            }),
        }
    }

    pub fn page_config(&self) -> &PageCacheConfig {
        &self.shared.page_config
    }

    /// Expire every cached variant of a URL.
    ///
    /// Returns the new URL version, or `None` if the store could not be updated.
    pub async fn invalidate_url(&self, scheme: &str, host: &str, path: &str) -> Option<i64> {
        let engine = self.shared.engine().await?;
        engine.invalidate_url(scheme, host, path).await
    }
}

impl<S, M> Shared<S, M>
where
    S: KvStore,
    M: CacheMetrics,
{
    /// A page cache engine for one request
    pub(crate) async fn engine(&self) -> Option<PageCacheEngine<S, M>> {
        match ObjectCache::connect_with_metrics(
            self.store.clone(),
            self.cache_config.clone(),
            self.metrics.clone(),
        )
        .await
        {
            Ok(cache) => Some(PageCacheEngine::new(cache, self.page_config.clone())),
            Err(err) => {
                warn!(target: "strata", error = %err, "object cache unavailable");
                None
            }
        }
    }
}

impl<S, M> Clone for PageCacheLayer<S, M>
where
    S: KvStore,
    M: CacheMetrics,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<I, S, M> Layer<I> for PageCacheLayer<S, M>
where
    S: KvStore,
    M: CacheMetrics,
{
    type Service = PageCacheMiddleware<I, S, M>;

    fn layer(&self, inner: I) -> Self::Service {
        PageCacheMiddleware::new(inner, self.shared.clone())
    }
}
