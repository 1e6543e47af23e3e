//! Cache layer behavior through the client: hits, TTL staleness, SWR
//! single-flight, mutation invalidation.

mod common;

use common::{blog_schema, row, StubDriver};
use std::sync::Arc;
use std::time::Duration;
use viborm::cache::{CacheOptions, MemoryCache};
use viborm::prelude::*;
use viborm::Dialect;

fn cached_client(cache: Arc<MemoryCache>) -> Client<StubDriver> {
    Client::builder(
        StubDriver::new(Dialect::PostgreSQL),
        blog_schema(),
        Arc::new(viborm_postgres::PostgresAdapter::new()),
    )
    .cache(cache)
    .build()
}

fn user_row(id: &str) -> viborm::Row {
    row([
        ("id", Value::Text(id.into())),
        ("email", Value::Text(format!("{id}@d.io").into())),
        ("name", Value::Null),
    ])
}

#[tokio::test]
async fn fresh_hits_skip_the_database() {
    let cache = Arc::new(MemoryCache::new());
    let client = cached_client(Arc::clone(&cache)).with_cache(CacheOptions::ttl("1 hour"));
    client.driver().respond_rows(vec![user_row("u1")]);

    let args = FindArgs::filtered(Filter::equals("id", "u1"));
    let first = client.model("user").unwrap().find_many(args.clone()).await.unwrap();
    let second = client.model("user").unwrap().find_many(args).await.unwrap();

    assert_eq!(first, second);
    // One statement total: the second read came from the cache.
    assert_eq!(client.driver().statements().len(), 1);
}

#[tokio::test]
async fn bypass_reads_the_database_but_still_stores() {
    let cache = Arc::new(MemoryCache::new());
    let client = cached_client(Arc::clone(&cache))
        .with_cache(CacheOptions::ttl("1 hour").with_bypass());
    client.driver().respond_rows(vec![user_row("u1")]);
    client.driver().respond_rows(vec![user_row("u1")]);

    let args = FindArgs::filtered(Filter::equals("id", "u1"));
    client.model("user").unwrap().find_many(args.clone()).await.unwrap();
    client.model("user").unwrap().find_many(args).await.unwrap();
    assert_eq!(client.driver().statements().len(), 2);
    assert!(!cache.is_empty().await);
}

#[tokio::test]
async fn expired_entries_without_swr_miss() {
    let cache = Arc::new(MemoryCache::new());
    let client = cached_client(Arc::clone(&cache)).with_cache(CacheOptions::ttl(40u64));
    client.driver().respond_rows(vec![user_row("u1")]);
    client.driver().respond_rows(vec![user_row("u1")]);

    let args = FindArgs::filtered(Filter::equals("id", "u1"));
    client.model("user").unwrap().find_many(args.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    client.model("user").unwrap().find_many(args).await.unwrap();

    assert_eq!(client.driver().statements().len(), 2);
}

#[tokio::test]
async fn swr_serves_stale_and_revalidates_once() {
    let cache = Arc::new(MemoryCache::new());
    let client = cached_client(Arc::clone(&cache))
        .with_cache(CacheOptions::ttl(40u64).with_swr());
    // Initial read + exactly one background revalidation.
    client.driver().respond_rows(vec![user_row("u1")]);
    client.driver().respond_rows(vec![user_row("u1")]);

    let args = FindArgs::filtered(Filter::equals("id", "u1"));
    let handle = client.model("user").unwrap();
    handle.find_many(args.clone()).await.unwrap();
    assert_eq!(client.driver().statements().len(), 1);

    tokio::time::sleep(Duration::from_millis(60)).await;

    // Two stale reads in a row: both serve the cached value immediately;
    // the sentinel lets only one revalidation through.
    let first = handle.find_many(args.clone()).await.unwrap();
    let second = handle.find_many(args.clone()).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);

    // Let the background task drain.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.driver().statements().len(), 2);

    // The refreshed entry serves fresh again, no new statement.
    handle.find_many(args).await.unwrap();
    assert_eq!(client.driver().statements().len(), 2);
}

#[tokio::test]
async fn mutations_invalidate_the_model_prefix() {
    let cache = Arc::new(MemoryCache::new());
    let client = cached_client(Arc::clone(&cache)).with_cache(CacheOptions::ttl("1 hour"));

    client.driver().respond_rows(vec![user_row("u1")]);
    let args = FindArgs::filtered(Filter::equals("id", "u1"));
    client.model("user").unwrap().find_many(args.clone()).await.unwrap();
    assert_eq!(cache.len().await, 1);

    // The create: INSERT .. RETURNING.
    client.driver().respond_rows(vec![user_row("u2")]);
    client
        .model("user")
        .unwrap()
        .create(CreateArgs {
            data: CreateData::new().set("id", "u2").set("email", "u2@d.io"),
            ..CreateArgs::default()
        })
        .await
        .unwrap();

    // The cached read is gone; the next read hits the database again.
    assert_eq!(cache.len().await, 0);
    client.driver().respond_rows(vec![user_row("u1")]);
    client.model("user").unwrap().find_many(args).await.unwrap();
    assert_eq!(client.driver().statements().len(), 3);
}

#[tokio::test]
async fn custom_invalidation_keys_support_prefix_patterns() {
    let cache = Arc::new(MemoryCache::new());
    let plain = cached_client(Arc::clone(&cache));

    // Seed an unrelated entry under a caller-chosen key space.
    let seeded = plain.with_cache(CacheOptions::ttl("1 hour").with_key("app:feed:page1"));
    seeded.driver().respond_rows(vec![user_row("u1")]);
    seeded
        .model("user")
        .unwrap()
        .find_many(FindArgs::default())
        .await
        .unwrap();
    assert_eq!(cache.len().await, 1);

    // A mutation configured to clear `app:feed:*` drops it.
    let invalidating =
        plain.with_cache(CacheOptions::ttl("1 hour").invalidating(["app:feed:*"]));
    invalidating.driver().respond_rows(vec![user_row("u3")]);
    invalidating
        .model("user")
        .unwrap()
        .create(CreateArgs {
            data: CreateData::new().set("id", "u3").set("email", "u3@d.io"),
            ..CreateArgs::default()
        })
        .await
        .unwrap();

    assert_eq!(cache.len().await, 0);
}

#[tokio::test]
async fn invalid_ttl_is_an_error() {
    let cache = Arc::new(MemoryCache::new());
    let client = cached_client(cache).with_cache(CacheOptions::ttl("soon"));
    client.driver().respond_rows(vec![user_row("u1")]);

    let error = client
        .model("user")
        .unwrap()
        .find_many(FindArgs::default())
        .await
        .unwrap_err();
    assert_eq!(error.code(), "invalid_ttl");
}
