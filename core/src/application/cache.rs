// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Budgeted Stale-While-Revalidate Cache
//!
//! Read-through cache over the shared [`KvStore`], guarded by the daily
//! [`CommandBudget`].
//!
//! ## Policy
//!
//! 1. Store unreachable or circuit open → call `fetch` directly, no cache.
//! 2. Hit younger than the fresh window → serve cached, no fetch.
//! 3. Hit older than the fresh window → serve cached immediately and spawn
//!    exactly one background revalidation; if that revalidation fails, the
//!    stale entry is deleted so the next caller takes a blocking fetch
//!    instead of serving indefinitely-stale data.
//! 4. Miss → blocking fetch; error-shaped payloads are never cached and any
//!    existing entry for the key is deleted.
//!
//! Every store read/write/delete counts one command against the budget.
//! Background revalidation is a detached task: its failure is logged and
//! invalidates the entry, but never reaches the caller that triggered it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::budget::CommandBudget;
use crate::domain::error::GateError;
use crate::domain::store::KvStore;

/// Field injected into object payloads to expose the cache disposition.
pub const CACHE_MARKER: &str = "_cache";

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// Unix milliseconds at write time.
    timestamp: i64,
    data: Value,
}

#[derive(Clone)]
pub struct SwrCache {
    kv: Arc<dyn KvStore>,
    budget: Arc<CommandBudget>,
}

impl SwrCache {
    pub fn new(kv: Arc<dyn KvStore>, budget: Arc<CommandBudget>) -> Self {
        Self { kv, budget }
    }

    /// Read `key` through the cache, producing fresh payloads with `fetch`.
    pub async fn read_through<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fresh: Duration,
        fetch: F,
    ) -> Result<Value, GateError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, GateError>> + Send + 'static,
    {
        let today = Utc::now().date_naive();

        if self.budget.is_open(today) {
            debug!(key, "budget circuit open, bypassing cache");
            return fetch().await;
        }

        self.budget.record(1, today);
        let cached = match self.kv.get(key).await {
            Ok(cached) => cached,
            Err(err) => {
                warn!(key, error = %err, "cache store unreachable, fetching directly");
                return fetch().await;
            }
        };
        let fetch = Arc::new(fetch);

        // An unparseable entry (format change) is treated as a miss.
        let entry = cached.and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok());
        match entry {
            Some(entry) => {
                let age_ms = Utc::now().timestamp_millis() - entry.timestamp;
                if age_ms < fresh.as_millis() as i64 {
                    debug!(key, age_ms, "cache HIT-FRESH");
                    Ok(mark(entry.data, "HIT-FRESH"))
                } else {
                    debug!(key, age_ms, "cache HIT-STALE, revalidating in background");
                    self.spawn_revalidation(key.to_string(), ttl, fetch);
                    Ok(mark(entry.data, "HIT-STALE"))
                }
            }
            None => {
                debug!(key, "cache MISS");
                let data = self.fetch_and_store(key, ttl, fetch.as_ref()).await?;
                Ok(mark(data, "MISS"))
            }
        }
    }

    /// Detached stale-hit revalidation. Never surfaces to the caller.
    fn spawn_revalidation<F, Fut>(&self, key: String, ttl: Duration, fetch: Arc<F>)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, GateError>> + Send + 'static,
    {
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(err) = cache.fetch_and_store(&key, ttl, fetch.as_ref()).await {
                warn!(key = %key, error = %err, "background revalidation failed, dropping stale entry");
                cache.budget.record(1, Utc::now().date_naive());
                if let Err(err) = cache.kv.delete(&key).await {
                    warn!(key = %key, error = %err, "failed to drop stale entry");
                }
            }
        });
    }

    /// Fetch a fresh payload and, unless it is error-shaped, write it back.
    async fn fetch_and_store<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: &F,
    ) -> Result<Value, GateError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, GateError>> + Send,
    {
        let data = fetch().await?;
        let today = Utc::now().date_naive();

        if is_error_shaped(&data) {
            debug!(key, "payload is error-shaped, not caching");
            self.budget.record(1, today);
            if let Err(err) = self.kv.delete(key).await {
                warn!(key, error = %err, "failed to delete entry for error payload");
            }
            return Ok(data);
        }

        let entry = CacheEntry {
            timestamp: Utc::now().timestamp_millis(),
            data: data.clone(),
        };
        self.budget.record(1, today);
        if let Err(err) = self
            .kv
            .put(key, serde_json::to_string(&entry)?, ttl)
            .await
        {
            warn!(key, error = %err, "cache write failed");
        }
        Ok(data)
    }
}

/// Attach the cache-disposition marker to object payloads.
fn mark(data: Value, disposition: &str) -> Value {
    match data {
        Value::Object(mut map) => {
            map.insert(CACHE_MARKER.to_string(), Value::String(disposition.to_string()));
            Value::Object(map)
        }
        other => other,
    }
}

/// Recognize payloads that represent an upstream failure: an `error` field,
/// an explicit `success: false`, or a `status` at or above 400.
fn is_error_shaped(data: &Value) -> bool {
    let Value::Object(map) = data else {
        return false;
    };
    if map.get("error").map(|v| !v.is_null()).unwrap_or(false) {
        return true;
    }
    if map.get("success") == Some(&Value::Bool(false)) {
        return true;
    }
    matches!(
        map.get("status").and_then(Value::as_i64),
        Some(status) if status >= 400
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_shapes_are_recognized() {
        assert!(is_error_shaped(&json!({"error": "boom"})));
        assert!(is_error_shaped(&json!({"success": false})));
        assert!(is_error_shaped(&json!({"status": 502})));
        assert!(!is_error_shaped(&json!({"status": 200, "data": []})));
        assert!(!is_error_shaped(&json!({"error": null, "data": 1})));
        assert!(!is_error_shaped(&json!([1, 2, 3])));
    }

    #[test]
    fn marker_only_applies_to_objects() {
        let marked = mark(json!({"a": 1}), "HIT-FRESH");
        assert_eq!(marked[CACHE_MARKER], "HIT-FRESH");

        let list = mark(json!([1]), "MISS");
        assert_eq!(list, json!([1]));
    }
}
