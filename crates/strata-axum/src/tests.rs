//! Middleware tests driven through an axum router

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Method, Request, Response, StatusCode};
    use axum::routing::get;
    use tower::{Layer, ServiceExt};

    use strata::{MemoryConfig, MemoryStore, ObjectCacheConfig};
    use strata_http::{PageCacheConfig, VariantRegistry};

    use crate::{PageCacheLayer, PageControl};

    fn layer(config: PageCacheConfig) -> PageCacheLayer<MemoryStore> {
        let store = Arc::new(MemoryStore::new(MemoryConfig::default()));
        PageCacheLayer::new(store, ObjectCacheConfig::new("test_"), config)
    }

    fn app(layer: PageCacheLayer<MemoryStore>, renders: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/",
                get(move || {
                    let renders = renders.clone();
                    async move {
                        renders.fetch_add(1, Ordering::SeqCst);
                        "hello"
                    }
                }),
            )
            .route(
                "/draft",
                get(|control: PageControl| async move {
                    control.cancel();
                    "draft"
                }),
            )
            .route(
                "/shop",
                get(|control: PageControl| async move {
                    control.vary_on("cookie:currency");
                    "shop"
                }),
            )
            .route("/form", axum::routing::post(|| async { "posted" }))
            .layer(layer)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let label = response
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, label, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("host", "example.com")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_hit_skips_handler() {
        let renders = Arc::new(AtomicUsize::new(0));
        let app = app(layer(PageCacheConfig::new().always_store()), renders.clone());

        let (status, label, body) = send(&app, get_request("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(label, "MISS");
        assert_eq!(body, "hello");

        let (_, label, body) = send(&app, get_request("/")).await;
        assert_eq!(label, "HIT");
        assert_eq!(body, "hello");
        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sampling_through_router() {
        let renders = Arc::new(AtomicUsize::new(0));
        let app = app(layer(PageCacheConfig::new()), renders.clone());

        let labels = [
            send(&app, get_request("/")).await.1,
            send(&app, get_request("/")).await.1,
            send(&app, get_request("/")).await.1,
        ];
        assert_eq!(labels, ["IGNORED", "MISS", "HIT"]);
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handler_cancels_capture() {
        let app = app(
            layer(PageCacheConfig::new().always_store()),
            Arc::new(AtomicUsize::new(0)),
        );

        let (_, label, body) = send(&app, get_request("/draft")).await;
        assert_eq!(label, "BYPASS");
        assert_eq!(body, "draft");
        // Never stored, so every request renders again
        assert_eq!(send(&app, get_request("/draft")).await.1, "BYPASS");
    }

    #[tokio::test]
    async fn test_handler_activates_variant() {
        let config = PageCacheConfig::new()
            .always_store()
            .variants(VariantRegistry::new().cookie("currency"));
        let app = app(layer(config), Arc::new(AtomicUsize::new(0)));
        let shop = |currency: &str| {
            Request::builder()
                .uri("/shop")
                .header("host", "example.com")
                .header("cookie", format!("currency={currency}"))
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(send(&app, shop("EUR")).await.1, "MISS");
        assert_eq!(send(&app, shop("USD")).await.1, "MISS");
        assert_eq!(send(&app, shop("EUR")).await.1, "HIT");
        assert_eq!(send(&app, shop("USD")).await.1, "HIT");
    }

    #[tokio::test]
    async fn test_invalidate_url() {
        let layer = layer(PageCacheConfig::new().always_store());
        let app = app(layer.clone(), Arc::new(AtomicUsize::new(0)));

        send(&app, get_request("/")).await;
        assert_eq!(send(&app, get_request("/")).await.1, "HIT");

        assert_eq!(layer.invalidate_url("http", "example.com", "/").await, Some(1));
        assert_eq!(send(&app, get_request("/")).await.1, "EXPIRED");
        assert_eq!(send(&app, get_request("/")).await.1, "HIT");
    }

    #[tokio::test]
    async fn test_failed_service_releases_lock() {
        let layer = layer(PageCacheConfig::new().always_store());
        let failing = layer.layer(tower::service_fn(|_request: Request<Body>| async {
            Err::<Response<Body>, _>(std::io::Error::other("render failed"))
        }));
        let result = tokio::spawn(failing.oneshot(get_request("/"))).await.unwrap();
        assert!(result.is_err());

        // The lock is free again, so this render is stored
        let app = app(layer, Arc::new(AtomicUsize::new(0)));
        assert_eq!(send(&app, get_request("/")).await.1, "MISS");
        assert_eq!(send(&app, get_request("/")).await.1, "HIT");
    }

    #[tokio::test]
    async fn test_post_bypasses() {
        let app = app(
            layer(PageCacheConfig::new().always_store()),
            Arc::new(AtomicUsize::new(0)),
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/form")
            .header("host", "example.com")
            .body(Body::empty())
            .unwrap();

        let (status, label, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(label, "BYPASS");
        assert_eq!(body, "posted");
    }

    #[tokio::test]
    async fn test_page_control_outside_layer() {
        let router: Router = Router::new().route(
            "/",
            get(|control: PageControl| async move {
                control.cancel();
                if control.is_cancelled() { "cancelled" } else { "live" }
            }),
        );
        let (_, label, body) = send(&router, get_request("/")).await;
        assert_eq!(label, "");
        assert_eq!(body, "cancelled");
    }
}
