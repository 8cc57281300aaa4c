use std::sync::Arc;

use strata::TracingMetrics;
use strata::prelude::*;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Profile {
    name: String,
    visits: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("a global subscriber is already installed");
    }

    let store = Arc::new(MemoryStore::new(MemoryConfig::default()));
    let config = ObjectCacheConfig::new("demo_")
        .tenant_prefix("1")
        .global_groups(["users"])
        .ignored_groups(["counts"])
        .max_ttl(3600);
    let metrics = Arc::new(TracingMetrics::new().with_service_name("basic-example"));

    let cache = ObjectCache::connect_with_metrics(store.clone(), config, metrics).await?;

    let profile = Profile {
        name: "Alice".to_string(),
        visits: 3,
    };
    cache.set("alice", &profile, "users", 0).await;
    cache.set("hits", &0i64, "counts", 0).await;
    cache.incr("hits", 1, "counts").await;

    // A second instance shares the store but not the local tier
    let other = ObjectCache::connect(store, ObjectCacheConfig::new("demo_").tenant_prefix("2")).await?;
    other.add_global_groups(["users"]);

    println!("profile: {:?}", other.get::<Profile>("alice", "users").await);
    println!("hits (local only): {:?}", other.get::<i64>("hits", "counts").await);
    println!("stats: {:?}", cache.stats());

    Ok(())
}
