// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! Shared key-value store contract.
//!
//! The production deployment points this at a metered hosted store; the
//! in-memory implementation in
//! [`crate::infrastructure::kv`] is the default backend and the test
//! double. TTL expiry is enforced by the store itself — readers of an
//! expired key see `None`, and no background sweeper is required.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal TTL-aware key-value contract.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Write `value` under `key` with a fresh TTL, replacing any previous
    /// entry (and its TTL — this is what makes sliding windows slide).
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;
}
