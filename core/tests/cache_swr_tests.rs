// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! Behavioural tests for the budgeted stale-while-revalidate cache:
//! freshness windows, error-payload rejection, circuit breaker and
//! degradation when the store is unreachable.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bkgate_core::application::cache::SwrCache;
use bkgate_core::domain::budget::CommandBudget;
use bkgate_core::infrastructure::kv::{InMemoryKvStore, KvError, KvStore};

const TTL: Duration = Duration::from_secs(3600);
const FRESH: Duration = Duration::from_secs(60);

/// Store double that counts operations and can be switched to failing.
struct CountingStore {
    inner: InMemoryKvStore,
    ops: AtomicU64,
    fail: bool,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: InMemoryKvStore::new(),
            ops: AtomicU64::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            inner: InMemoryKvStore::new(),
            ops: AtomicU64::new(0),
            fail: true,
        }
    }

    fn ops(&self) -> u64 {
        self.ops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(KvError::Unavailable("test store down".to_string()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(KvError::Unavailable("test store down".to_string()));
        }
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(KvError::Unavailable("test store down".to_string()));
        }
        self.inner.delete(key).await
    }
}

fn budget() -> Arc<CommandBudget> {
    Arc::new(CommandBudget::new(10_000, 0.8, Utc::now().date_naive()))
}

fn counting_fetch(
    calls: Arc<AtomicU64>,
    payload: Value,
) -> impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, bkgate_core::GateError>> + Send>>
       + Send
       + Sync
       + 'static {
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        let payload = payload.clone();
        Box::pin(async move { Ok(payload) })
    }
}

/// Seed an entry with an arbitrary write timestamp, bypassing the cache.
async fn seed_entry(store: &dyn KvStore, key: &str, data: Value, age: Duration) {
    let timestamp = Utc::now().timestamp_millis() - age.as_millis() as i64;
    let entry = json!({ "timestamp": timestamp, "data": data });
    store
        .put(key, entry.to_string(), TTL)
        .await
        .expect("seeding entry");
}

#[tokio::test]
async fn miss_fetches_synchronously_and_writes_back() {
    let store = Arc::new(CountingStore::new());
    let cache = SwrCache::new(store.clone(), budget());
    let calls = Arc::new(AtomicU64::new(0));

    let result = cache
        .read_through("k", TTL, FRESH, counting_fetch(calls.clone(), json!({"v": 1})))
        .await
        .unwrap();

    assert_eq!(result["v"], 1);
    assert_eq!(result["_cache"], "MISS");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(store.inner.get("k").await.unwrap().is_some());
}

#[tokio::test]
async fn fresh_hit_serves_without_fetch() {
    let store = Arc::new(CountingStore::new());
    let cache = SwrCache::new(store.clone(), budget());
    seed_entry(store.as_ref(), "k", json!({"v": "cached"}), Duration::ZERO).await;

    let calls = Arc::new(AtomicU64::new(0));
    let result = cache
        .read_through("k", TTL, FRESH, counting_fetch(calls.clone(), json!({"v": "new"})))
        .await
        .unwrap();

    assert_eq!(result["v"], "cached");
    assert_eq!(result["_cache"], "HIT-FRESH");
    assert_eq!(calls.load(Ordering::SeqCst), 0, "fresh hit must not fetch");
}

#[tokio::test]
async fn stale_hit_serves_immediately_and_revalidates_exactly_once() {
    let store = Arc::new(CountingStore::new());
    let cache = SwrCache::new(store.clone(), budget());
    seed_entry(
        store.as_ref(),
        "k",
        json!({"v": "stale"}),
        FRESH + Duration::from_secs(5),
    )
    .await;

    let calls = Arc::new(AtomicU64::new(0));
    let result = cache
        .read_through("k", TTL, FRESH, counting_fetch(calls.clone(), json!({"v": "new"})))
        .await
        .unwrap();

    // The stale payload is served without waiting for the revalidation.
    assert_eq!(result["v"], "stale");
    assert_eq!(result["_cache"], "HIT-STALE");

    // Let the background task run, then confirm a single fetch happened and
    // the entry was replaced.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let raw = store.inner.get("k").await.unwrap().unwrap();
    assert!(raw.contains("new"));
}

#[tokio::test]
async fn failed_revalidation_drops_the_stale_entry() {
    let store = Arc::new(CountingStore::new());
    let cache = SwrCache::new(store.clone(), budget());
    seed_entry(
        store.as_ref(),
        "k",
        json!({"v": "stale"}),
        FRESH + Duration::from_secs(5),
    )
    .await;

    let result = cache
        .read_through("k", TTL, FRESH, || async {
            Err(bkgate_core::GateError::UpstreamUnavailable(
                "boom".to_string(),
            ))
        })
        .await
        .unwrap();
    assert_eq!(result["_cache"], "HIT-STALE");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        store.inner.get("k").await.unwrap().is_none(),
        "stale entry must be dropped so the next read blocks on a fetch"
    );
}

#[tokio::test]
async fn error_shaped_payload_is_never_cached() {
    let store = Arc::new(CountingStore::new());
    let cache = SwrCache::new(store.clone(), budget());

    // A pre-existing (here: unreadable) entry must be gone after an
    // error-shaped fetch, not just left alone.
    store
        .inner
        .put("k", "corrupted entry".to_string(), TTL)
        .await
        .unwrap();

    let result = cache
        .read_through("k", TTL, FRESH, || async {
            Ok(json!({"error": "upstream exploded"}))
        })
        .await
        .unwrap();

    assert_eq!(result["error"], "upstream exploded");
    assert!(store.inner.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn error_shaped_revalidation_drops_the_stale_entry() {
    let store = Arc::new(CountingStore::new());
    let cache = SwrCache::new(store.clone(), budget());
    seed_entry(
        store.as_ref(),
        "k",
        json!({"v": "stale"}),
        FRESH + Duration::from_secs(5),
    )
    .await;

    let result = cache
        .read_through("k", TTL, FRESH, || async { Ok(json!({"status": 503})) })
        .await
        .unwrap();
    assert_eq!(result["_cache"], "HIT-STALE");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.inner.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn open_circuit_bypasses_the_store() {
    let store = Arc::new(CountingStore::new());
    let budget = Arc::new(CommandBudget::new(100, 0.8, Utc::now().date_naive()));
    let cache = SwrCache::new(store.clone(), budget.clone());

    // Cross the threshold.
    budget.record(80, Utc::now().date_naive());
    assert!(budget.is_open(Utc::now().date_naive()));

    let calls = Arc::new(AtomicU64::new(0));
    let result = cache
        .read_through("k", TTL, FRESH, counting_fetch(calls.clone(), json!({"v": 7})))
        .await
        .unwrap();

    assert_eq!(result["v"], 7);
    // Direct fetch: no marker, no store traffic.
    assert!(result.get("_cache").is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.ops(), 0);
}

#[tokio::test]
async fn reset_closes_the_circuit_and_counting_restarts() {
    let store = Arc::new(CountingStore::new());
    let budget = Arc::new(CommandBudget::new(100, 0.8, Utc::now().date_naive()));
    let cache = SwrCache::new(store.clone(), budget.clone());

    budget.record(80, Utc::now().date_naive());
    assert!(budget.is_open(Utc::now().date_naive()));

    // Simulated day rollover.
    budget.reset(Utc::now().date_naive());
    assert_eq!(budget.used(Utc::now().date_naive()), 0);

    let calls = Arc::new(AtomicU64::new(0));
    let result = cache
        .read_through("k", TTL, FRESH, counting_fetch(calls.clone(), json!({"v": 9})))
        .await
        .unwrap();

    assert_eq!(result["_cache"], "MISS", "store is in use again");
    assert!(store.ops() > 0);
}

#[tokio::test]
async fn unreachable_store_degrades_to_direct_fetch() {
    let store = Arc::new(CountingStore::failing());
    let cache = SwrCache::new(store.clone(), budget());

    let calls = Arc::new(AtomicU64::new(0));
    let result = cache
        .read_through("k", TTL, FRESH, counting_fetch(calls.clone(), json!({"v": 3})))
        .await
        .unwrap();

    assert_eq!(result["v"], 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unparseable_entry_is_treated_as_miss() {
    let store = Arc::new(CountingStore::new());
    let cache = SwrCache::new(store.clone(), budget());
    store
        .inner
        .put("k", "not json at all".to_string(), TTL)
        .await
        .unwrap();

    let calls = Arc::new(AtomicU64::new(0));
    let result = cache
        .read_through("k", TTL, FRESH, counting_fetch(calls.clone(), json!({"v": 4})))
        .await
        .unwrap();

    assert_eq!(result["_cache"], "MISS");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
