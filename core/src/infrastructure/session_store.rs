// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Encrypted Session Store
//!
//! Persists [`Session`] and [`RefreshCredential`] records as authenticated
//! ciphertext with store-enforced TTLs.
//!
//! Every write serializes the record, seals it with AES-256-GCM (fresh
//! nonce per write) and stores it with a fresh TTL — saving is what makes
//! the inactivity window slide. Every read opens and authenticates before
//! deserializing; an authentication failure, a malformed blob or a store
//! error all read as "absent", which forces a clean re-login instead of a
//! crash.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::domain::error::GateError;
use crate::domain::session::{RefreshCredential, Session};
use crate::domain::store::KvStore;
use crate::infrastructure::crypto::RecordCipher;

const SESSION_PREFIX: &str = "session:";
const REFRESH_PREFIX: &str = "refresh:";

pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    cipher: RecordCipher,
    session_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionStore {
    pub fn new(
        kv: Arc<dyn KvStore>,
        cipher: RecordCipher,
        session_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            kv,
            cipher,
            session_ttl,
            refresh_ttl,
        }
    }

    /// Fetch and decrypt a session. Any failure along the way is `None`.
    pub async fn get(&self, token: &str) -> Option<Session> {
        self.read_record(&format!("{SESSION_PREFIX}{token}")).await
    }

    /// Serialize, encrypt and store a session, re-arming its TTL.
    pub async fn save(&self, token: &str, session: &Session) -> Result<(), GateError> {
        self.write_record(&format!("{SESSION_PREFIX}{token}"), session, self.session_ttl)
            .await
    }

    pub async fn delete(&self, token: &str) -> Result<(), GateError> {
        self.kv.delete(&format!("{SESSION_PREFIX}{token}")).await?;
        Ok(())
    }

    /// Fetch and decrypt a refresh credential.
    pub async fn get_refresh(&self, token: &str) -> Option<RefreshCredential> {
        self.read_record(&format!("{REFRESH_PREFIX}{token}")).await
    }

    /// Store a refresh credential with the full sliding window. Called both
    /// at creation and after every successful consumption.
    pub async fn save_refresh(
        &self,
        token: &str,
        credential: &RefreshCredential,
    ) -> Result<(), GateError> {
        self.write_record(&format!("{REFRESH_PREFIX}{token}"), credential, self.refresh_ttl)
            .await
    }

    pub async fn delete_refresh(&self, token: &str) -> Result<(), GateError> {
        self.kv.delete(&format!("{REFRESH_PREFIX}{token}")).await?;
        Ok(())
    }

    async fn read_record<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let sealed = match self.kv.get(key).await {
            Ok(sealed) => sealed?,
            Err(err) => {
                warn!(error = %err, "store read failed, treating record as absent");
                return None;
            }
        };
        let plaintext = self.cipher.open(&sealed)?;
        match serde_json::from_slice(&plaintext) {
            Ok(record) => Some(record),
            Err(_) => {
                warn!("stored record decrypted but did not deserialize");
                None
            }
        }
    }

    async fn write_record<T: serde::Serialize>(
        &self,
        key: &str,
        record: &T,
        ttl: Duration,
    ) -> Result<(), GateError> {
        let plaintext = serde_json::to_vec(record)?;
        let sealed = self
            .cipher
            .seal(&plaintext)
            .map_err(|e| GateError::Internal(e.to_string()))?;
        self.kv.put(key, sealed, ttl).await?;
        Ok(())
    }
}
