//! End-to-end page cache scenarios

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use bytes::Bytes;
    use http::header::{
        CACHE_CONTROL, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LOCATION, SET_COOKIE,
        TRANSFER_ENCODING,
    };
    use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
    use strata::{Clock, ManualClock, MemoryConfig, MemoryStore, ObjectCache, ObjectCacheConfig};

    use crate::conditional::http_date;
    use crate::{
        Lookup, PageCacheConfig, PageCacheEngine, PageRecord, PageResponse, RequestContext,
        VariantRegistry, fingerprint,
    };

    const START: u64 = 1_700_000_000;

    struct Harness {
        store: Arc<MemoryStore>,
        clock: ManualClock,
        config: Arc<PageCacheConfig>,
    }

    impl Harness {
        fn new(config: PageCacheConfig) -> Self {
            let clock = ManualClock::new(START);
            let store = Arc::new(MemoryStore::with_clock(MemoryConfig::default(), clock.clone()));
            Self {
                store,
                clock,
                config: Arc::new(config),
            }
        }

        /// A fresh engine, as built for each incoming request
        async fn engine(&self) -> PageCacheEngine<MemoryStore> {
            let cache = ObjectCache::connect(self.store.clone(), ObjectCacheConfig::new("t_"))
                .await
                .unwrap();
            PageCacheEngine::with_clock(cache, self.config.clone(), self.clock.clone())
        }

        async fn request(&self, request: &RequestContext, rendered: PageResponse) -> PageResponse {
            let engine = self.engine().await;
            match engine.lookup(request).await {
                Lookup::Cached(response) => response,
                Lookup::Render(pending) => engine.capture(pending, rendered).await,
            }
        }

        async fn record(&self, request: &RequestContext) -> Option<PageRecord> {
            self.record_with(request, &BTreeMap::new()).await
        }

        async fn record_with(
            &self,
            request: &RequestContext,
            variants: &BTreeMap<String, String>,
        ) -> Option<PageRecord> {
            let key = fingerprint::page_key(request, &self.config.ignored_query_args, variants);
            self.engine()
                .await
                .cache()
                .get_fresh(key.as_str(), &self.config.group)
                .await
        }
    }

    fn get(path: &str) -> RequestContext {
        RequestContext::new(Method::GET, "https", "example.com", path)
    }

    fn page() -> PageResponse {
        PageResponse::html("<p>hello</p>")
    }

    fn label(response: &PageResponse) -> &str {
        response
            .cache_status(&HeaderName::from_static("x-cache"))
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_sampling_sequence() {
        let harness = Harness::new(PageCacheConfig::new().sampling(2, 120).max_age(300));
        let request = get("/post");

        let first = harness.request(&request, page()).await;
        assert_eq!(label(&first), "IGNORED");
        assert!(harness.record(&request).await.is_none());

        let second = harness.request(&request, page()).await;
        assert_eq!(label(&second), "MISS");
        assert_eq!(harness.record(&request).await.unwrap().max_age, 300);

        let third = harness.request(&request, page()).await;
        assert_eq!(label(&third), "HIT");
        assert_eq!(third.body, Bytes::from_static(b"<p>hello</p>"));
        assert_eq!(third.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_resampling_window_and_expiry() {
        let harness = Harness::new(PageCacheConfig::new().sampling(2, 120).max_age(300));
        let request = get("/post");
        harness.request(&request, page()).await;
        harness.request(&request, page()).await;

        // Inside the last `seconds` of freshness requests are counted
        harness.clock.advance(200);
        assert_eq!(label(&harness.request(&request, page()).await), "HIT");

        // Reaching the threshold re-renders the still fresh page
        let refreshed = harness.request(&request, PageResponse::html("v2")).await;
        assert_eq!(label(&refreshed), "MISS");
        assert_eq!(harness.record(&request).await.unwrap().rendered_at, START + 200);
        let hit = harness.request(&request, page()).await;
        assert_eq!(label(&hit), "HIT");
        assert_eq!(hit.body, Bytes::from_static(b"v2"));

        // Past max age a request below the threshold gets the stale page
        harness.clock.advance(310);
        assert_eq!(label(&harness.request(&request, page()).await), "STALE");
        assert_eq!(label(&harness.request(&request, page()).await), "EXPIRED");
        let record = harness.record(&request).await.unwrap();
        assert_eq!(record.rendered_at, START + 510);
    }

    #[tokio::test]
    async fn test_counter_and_lock_shared_by_url() {
        let harness = Harness::new(PageCacheConfig::new().sampling(2, 120));
        let first = get("/list").with_query("page=1");
        let second = get("/list").with_query("page=2");

        assert_eq!(label(&harness.request(&first, page()).await), "IGNORED");
        assert_eq!(label(&harness.request(&second, page()).await), "MISS");
        assert!(harness.record(&second).await.is_some());
        assert!(harness.record(&first).await.is_none());
    }

    #[tokio::test]
    async fn test_if_none_match_returns_304() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let request = get("/etag");
        let rendered = page().with_header(ETAG, HeaderValue::from_static("\"v1\""));

        assert_eq!(label(&harness.request(&request, rendered.clone()).await), "MISS");

        let conditional =
            request.clone().with_header(IF_NONE_MATCH, HeaderValue::from_static("\"v1\""));
        let response = harness.request(&conditional, rendered).await;
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert!(response.body.is_empty());
        assert_eq!(label(&response), "HIT");
        assert_eq!(response.headers.get(ETAG).unwrap(), "\"v1\"");
    }

    #[tokio::test]
    async fn test_if_modified_since_returns_304() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let request = get("/ims");
        harness.request(&request, page()).await;
        harness.clock.advance(5);

        let since = HeaderValue::from_str(&http_date(START + 1)).unwrap();
        let response = harness
            .request(&request.clone().with_header(IF_MODIFIED_SINCE, since), page())
            .await;
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);

        let older = HeaderValue::from_str(&http_date(START - 60)).unwrap();
        let response = harness
            .request(&request.with_header(IF_MODIFIED_SINCE, older), page())
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(label(&response), "HIT");
    }

    #[tokio::test]
    async fn test_hit_headers() {
        let harness = Harness::new(
            PageCacheConfig::new()
                .always_store()
                .max_age(300)
                .static_header(
                    HeaderName::from_static("x-served-by"),
                    HeaderValue::from_static("strata"),
                ),
        );
        let request = get("/headers");

        let miss = harness.request(&request, page()).await;
        assert_eq!(miss.headers.get("x-served-by").unwrap(), "strata");
        assert_eq!(
            miss.headers.get(CACHE_CONTROL).unwrap(),
            "max-age=300, must-revalidate"
        );

        harness.clock.advance(100);
        let hit = harness.request(&request, page()).await;
        assert_eq!(hit.headers.get("x-served-by").unwrap(), "strata");
        assert_eq!(
            hit.headers.get(CACHE_CONTROL).unwrap(),
            "max-age=200, must-revalidate"
        );
        assert_eq!(
            hit.headers.get(http::header::LAST_MODIFIED).unwrap(),
            http_date(START).as_str()
        );
    }

    #[tokio::test]
    async fn test_set_cookie_never_stored() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let request = get("/login");
        let rendered = page().with_header(SET_COOKIE, HeaderValue::from_static("sid=1"));

        let response = harness.request(&request, rendered).await;
        assert_eq!(label(&response), "BYPASS");
        assert!(response.headers.contains_key(SET_COOKIE));
        assert!(harness.record(&request).await.is_none());

        // The lock was released, so the next request may regenerate
        let engine = harness.engine().await;
        match engine.lookup(&request).await {
            Lookup::Render(pending) => {
                assert!(pending.holds_lock());
                engine.abandon(pending).await;
            }
            Lookup::Cached(_) => panic!("expected render"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_lock() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let request = get("/busy");
        let a = harness.engine().await;
        let b = harness.engine().await;

        let (first, second) = tokio::join!(a.lookup(&request), b.lookup(&request));
        let pendings = match (first, second) {
            (Lookup::Render(x), Lookup::Render(y)) => [x, y],
            _ => panic!("nothing stored yet; both must render"),
        };
        let holders = pendings.iter().filter(|p| p.holds_lock()).count();
        assert_eq!(holders, 1);

        let [x, y] = pendings;
        let (x, y) = (a.capture(x, page()).await, b.capture(y, page()).await);
        let mut labels = vec![label(&x).to_string(), label(&y).to_string()];
        labels.sort();
        assert_eq!(labels, vec!["MISS", "MISS"]);
        assert!(harness.record(&request).await.is_some());
    }

    #[tokio::test]
    async fn test_version_bump_forces_refresh() {
        let harness = Harness::new(PageCacheConfig::new().sampling(3, 60));
        let request = get("/news");
        for _ in 0..3 {
            harness.request(&request, page()).await;
        }
        assert_eq!(label(&harness.request(&request, page()).await), "HIT");

        let engine = harness.engine().await;
        assert_eq!(engine.invalidate_url("https", "example.com", "/news").await, Some(1));

        // Below the sampling threshold, yet refreshed
        let refreshed = harness.request(&request, PageResponse::html("v2")).await;
        assert_eq!(label(&refreshed), "EXPIRED");
        assert_eq!(harness.record(&request).await.unwrap().url_version, 1);

        let hit = harness.request(&request, page()).await;
        assert_eq!(label(&hit), "HIT");
        assert_eq!(hit.body, Bytes::from_static(b"v2"));
    }

    #[tokio::test]
    async fn test_version_bump_covers_query_variants() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let plain = get("/list");
        let paged = get("/list").with_query("page=2");
        harness.request(&plain, page()).await;
        harness.request(&paged, page()).await;

        harness
            .engine()
            .await
            .invalidate_url("https", "example.com", "/list")
            .await;

        assert_eq!(label(&harness.request(&plain, page()).await), "EXPIRED");
        assert_eq!(label(&harness.request(&paged, page()).await), "EXPIRED");
    }

    #[tokio::test]
    async fn test_stale_served_until_record_expires() {
        let harness = Harness::new(PageCacheConfig::new().sampling(3, 10).max_age(20));
        let request = get("/quiet");
        for _ in 0..3 {
            harness.request(&request, page()).await;
        }
        assert!(harness.record(&request).await.is_some());

        // One request per window never reaches the threshold
        harness.clock.advance(25);
        for _ in 0..4 {
            assert_eq!(label(&harness.request(&request, page()).await), "STALE");
            harness.clock.advance(11);
        }

        // Storage TTL is max_age + seconds + 30
        assert_eq!(harness.clock.now(), START + 69);
        assert_eq!(label(&harness.request(&request, page()).await), "IGNORED");
    }

    #[tokio::test]
    async fn test_stale_served_while_refresh_in_flight() {
        let harness = Harness::new(PageCacheConfig::new().always_store().max_age(60));
        let request = get("/hot");
        harness.request(&request, page()).await;
        harness.clock.advance(61);

        let refresher = harness.engine().await;
        let pending = match refresher.lookup(&request).await {
            Lookup::Render(pending) => pending,
            Lookup::Cached(_) => panic!("expected refresh"),
        };
        assert!(pending.holds_lock());

        let waiting = harness.request(&request, page()).await;
        assert_eq!(label(&waiting), "STALE");
        assert_eq!(waiting.body, Bytes::from_static(b"<p>hello</p>"));

        let refreshed = refresher.capture(pending, PageResponse::html("new")).await;
        assert_eq!(label(&refreshed), "REFRESH");
        assert_eq!(label(&harness.request(&request, page()).await), "HIT");
    }

    #[tokio::test]
    async fn test_server_error_not_stored() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let request = get("/broken");
        let failed = PageResponse::new(StatusCode::BAD_GATEWAY, HeaderMap::new(), "oops");

        assert_eq!(label(&harness.request(&request, failed).await), "BYPASS");
        assert!(harness.record(&request).await.is_none());
        assert_eq!(label(&harness.request(&request, page()).await), "MISS");
    }

    #[tokio::test]
    async fn test_unshareable_response_labelled_bypass_without_lock() {
        let harness = Harness::new(PageCacheConfig::new().sampling(3, 60));
        let failed = PageResponse::new(StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new(), "oops");
        assert_eq!(label(&harness.request(&get("/a"), failed).await), "BYPASS");

        let cookie = page().with_header(SET_COOKIE, HeaderValue::from_static("sid=1"));
        assert_eq!(label(&harness.request(&get("/b"), cookie).await), "BYPASS");

        assert_eq!(label(&harness.request(&get("/c"), page()).await), "IGNORED");
    }

    #[tokio::test]
    async fn test_cancelled_render_not_stored() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let request = get("/preview");
        let engine = harness.engine().await;

        let Lookup::Render(mut pending) = engine.lookup(&request).await else {
            panic!("expected render");
        };
        pending.cancel();
        let response = engine.capture(pending, page()).await;

        assert_eq!(label(&response), "BYPASS");
        assert!(harness.record(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_abandon_releases_lock() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let request = get("/abandoned");

        let engine = harness.engine().await;
        let Lookup::Render(pending) = engine.lookup(&request).await else {
            panic!("expected render");
        };
        assert!(pending.holds_lock());
        engine.abandon(pending).await;

        assert_eq!(label(&harness.request(&request, page()).await), "MISS");
    }

    #[tokio::test]
    async fn test_request_bypass_rules() {
        let harness = Harness::new(
            PageCacheConfig::new()
                .always_store()
                .bypass_cookie_prefix("session")
                .never_bypass_cookie("session_check"),
        );

        let post = RequestContext::new(Method::POST, "https", "example.com", "/form");
        assert_eq!(label(&harness.request(&post, page()).await), "BYPASS");

        let logged_in = get("/").with_cookie("session_id", "abc");
        assert_eq!(label(&harness.request(&logged_in, page()).await), "BYPASS");

        let allowed = get("/").with_cookie("session_check", "1");
        assert_eq!(label(&harness.request(&allowed, page()).await), "MISS");

        let disabled = Harness::new(PageCacheConfig::new().max_age(0));
        assert_eq!(label(&disabled.request(&get("/"), page()).await), "BYPASS");
    }

    #[tokio::test]
    async fn test_store_down() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        harness.store.set_offline(true);

        let response = harness.request(&get("/"), page()).await;
        assert_eq!(label(&response), "DOWN");
        assert_eq!(response.body, Bytes::from_static(b"<p>hello</p>"));
    }

    #[tokio::test]
    async fn test_optional_variant_activated_during_render() {
        let harness = Harness::new(
            PageCacheConfig::new()
                .always_store()
                .variants(VariantRegistry::new().cookie("currency")),
        );
        let eur = get("/shop").with_cookie("currency", "EUR");
        let usd = get("/shop").with_cookie("currency", "USD");

        let engine = harness.engine().await;
        let Lookup::Render(mut pending) = engine.lookup(&eur).await else {
            panic!("expected render");
        };
        pending.vary_on("cookie:currency");
        engine.capture(pending, PageResponse::html("prices in EUR")).await;

        let mut variants = BTreeMap::new();
        variants.insert("cookie:currency".to_string(), "EUR".to_string());
        assert!(harness.record_with(&eur, &variants).await.is_some());
        assert!(harness.record(&eur).await.is_none());

        assert_eq!(label(&harness.request(&usd, PageResponse::html("prices in USD")).await), "MISS");

        let hit = harness.request(&eur, page()).await;
        assert_eq!(label(&hit), "HIT");
        assert_eq!(hit.body, Bytes::from_static(b"prices in EUR"));
    }

    #[tokio::test]
    async fn test_response_policy() {
        let harness = Harness::new(PageCacheConfig::new().always_store());

        let short = page().with_header(CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        harness.request(&get("/short"), short).await;
        assert_eq!(harness.record(&get("/short")).await.unwrap().max_age, 60);

        let private = page().with_header(CACHE_CONTROL, HeaderValue::from_static("private"));
        assert_eq!(label(&harness.request(&get("/private"), private).await), "BYPASS");

        let empty = PageResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::new());
        assert_eq!(label(&harness.request(&get("/empty"), empty).await), "BYPASS");

        let chunked = page().with_header(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        harness.request(&get("/chunked"), chunked).await;
        let record = harness.record(&get("/chunked")).await.unwrap();
        assert!(!record.headers.contains_key("transfer-encoding"));
        assert!(record.headers.contains_key("content-type"));
    }

    #[tokio::test]
    async fn test_redirects_follow_configuration() {
        let redirect = || {
            PageResponse::new(StatusCode::MOVED_PERMANENTLY, HeaderMap::new(), Bytes::new())
                .with_header(LOCATION, HeaderValue::from_static("/new"))
        };

        let skipping = Harness::new(PageCacheConfig::new().always_store());
        assert_eq!(label(&skipping.request(&get("/old"), redirect()).await), "BYPASS");

        let caching = Harness::new(PageCacheConfig::new().always_store().cache_redirects(true));
        assert_eq!(label(&caching.request(&get("/old"), redirect()).await), "MISS");
        let hit = caching.request(&get("/old"), page()).await;
        assert_eq!(hit.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(hit.headers.get(LOCATION).unwrap(), "/new");
    }

    #[tokio::test]
    async fn test_ignored_query_args_share_page() {
        let harness = Harness::new(PageCacheConfig::new().always_store().ignore_query_arg("utm_*"));

        harness.request(&get("/a").with_query("x=1&utm_source=mail"), page()).await;
        let hit = harness.request(&get("/a").with_query("utm_medium=ad&x=1"), page()).await;
        assert_eq!(label(&hit), "HIT");
    }

    #[tokio::test]
    async fn test_head_hit_has_no_body() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let head = RequestContext::new(Method::HEAD, "https", "example.com", "/h");

        harness.request(&head, page()).await;
        let hit = harness.request(&head, page()).await;
        assert_eq!(label(&hit), "HIT");
        assert!(hit.body.is_empty());
    }

    #[tokio::test]
    async fn test_identical_captures_identical_records() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let request = get("/same");

        harness.request(&request, page()).await;
        let first = harness.record(&request).await.unwrap();

        harness.clock.advance(400);
        harness.request(&request, page()).await;
        let second = harness.record(&request).await.unwrap();

        assert_ne!(first.rendered_at, second.rendered_at);
        assert_eq!(
            PageRecord {
                rendered_at: 0,
                ..first
            },
            PageRecord {
                rendered_at: 0,
                ..second
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_record_is_a_miss() {
        let harness = Harness::new(PageCacheConfig::new().always_store());
        let request = get("/corrupt");
        let key = fingerprint::page_key(&request, &[], &BTreeMap::new());
        harness
            .engine()
            .await
            .cache()
            .set(key.as_str(), "not a record", &harness.config.group, 0)
            .await;

        assert_eq!(label(&harness.request(&request, page()).await), "MISS");
        assert!(harness.record(&request).await.is_some());
    }
}
