// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! Store-level lifecycle tests: sliding TTLs for sessions and refresh
//! credentials, and expiry enforced by the store alone.

use std::sync::Arc;
use std::time::Duration;

use bkgate_core::domain::session::{RefreshCredential, Session};
use bkgate_core::infrastructure::crypto::RecordCipher;
use bkgate_core::infrastructure::kv::InMemoryKvStore;
use bkgate_core::infrastructure::session_store::SessionStore;

const KEY: &str = "a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c1d2e3f4a5b6c7d8e9f0a1b2";

fn store_with_ttls(session_ttl: Duration, refresh_ttl: Duration) -> SessionStore {
    SessionStore::new(
        Arc::new(InMemoryKvStore::new()),
        RecordCipher::from_hex_key(KEY).unwrap(),
        session_ttl,
        refresh_ttl,
    )
}

#[tokio::test]
async fn session_expires_after_inactivity_window() {
    let store = store_with_ttls(Duration::from_millis(40), Duration::from_secs(60));
    let session = Session::new("2210001", "SESSION=abc", None, None);

    store.save("tok", &session).await.unwrap();
    assert!(store.get("tok").await.is_some());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(store.get("tok").await.is_none(), "expiry is the store's job");
}

#[tokio::test]
async fn saving_slides_the_inactivity_window() {
    let store = store_with_ttls(Duration::from_millis(60), Duration::from_secs(60));
    let mut session = Session::new("2210001", "SESSION=abc", None, None);

    store.save("tok", &session).await.unwrap();

    // Keep touching before the window closes; the session must survive well
    // past the original absolute expiry.
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(30)).await;
        session.touch();
        store.save("tok", &session).await.unwrap();
    }

    assert!(store.get("tok").await.is_some());
}

#[tokio::test]
async fn consuming_a_refresh_credential_rearms_its_ttl() {
    let store = store_with_ttls(Duration::from_secs(60), Duration::from_millis(80));
    let credential = RefreshCredential::new("2210001", "hunter2");

    store.save_refresh("rtok", &credential).await.unwrap();

    // Close to expiry, the credential is consumed and re-written, which is
    // what the sliding seven-day window does at full scale.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let consumed = store.get_refresh("rtok").await.expect("still within TTL");
    store
        .save_refresh("rtok", &RefreshCredential::new(consumed.username, consumed.password))
        .await
        .unwrap();

    // Past the original expiry, the record is still there with a full TTL.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.get_refresh("rtok").await.is_some());

    // And it does eventually expire without further consumption.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(store.get_refresh("rtok").await.is_none());
}
