use std::sync::Arc;

use axum::{Router, response::IntoResponse, routing::get};
use strata::{MemoryConfig, MemoryStore, ObjectCacheConfig};
use strata_axum::{PageCacheLayer, PageControl};
use strata_http::{PageCacheConfig, VariantRegistry};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let store = Arc::new(MemoryStore::new(MemoryConfig::default()));

    // Store a page once it is requested twice within two minutes
    let pages = PageCacheConfig::new()
        .sampling(2, 120)
        .max_age(300)
        .bypass_cookie_prefix("session")
        .variants(VariantRegistry::new().cookie("currency"));
    let layer = PageCacheLayer::new(store, ObjectCacheConfig::new("site_"), pages);

    let app = Router::new()
        .route("/", get(home))
        .route("/shop", get(shop))
        .route("/preview", get(preview))
        .layer(layer.clone());

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Listening on {}", listener.local_addr().unwrap());

    // After publishing, expire every cached variant of the shop page:
    // layer.invalidate_url("http", "127.0.0.1:3000", "/shop").await;

    axum::serve(listener, app).await.unwrap();
}

async fn home() -> impl IntoResponse {
    "Welcome"
}

/// Prices depend on the visitor's currency cookie
async fn shop(control: PageControl) -> impl IntoResponse {
    control.vary_on("cookie:currency");
    "Shop"
}

/// Never cached
async fn preview(control: PageControl) -> impl IntoResponse {
    control.cancel();
    "Draft preview"
}
