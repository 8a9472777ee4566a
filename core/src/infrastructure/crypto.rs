// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! AES-256-GCM sealing for records at rest.
//!
//! Wire format: `base64(nonce ‖ ciphertext ‖ tag)` with a fresh random
//! 96-bit nonce per seal. Opening authenticates before returning; any
//! failure — bad base64, truncated payload, wrong key, flipped bit in
//! ciphertext or tag — reads as `None`, never a panic, so stored garbage
//! degrades to "record absent".

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be 64 hex characters")]
    InvalidKey,

    #[error("encryption failed")]
    EncryptFailed,
}

/// Per-process symmetric cipher for stored session material.
#[derive(Clone)]
pub struct RecordCipher {
    cipher: Aes256Gcm,
}

impl RecordCipher {
    /// Build a cipher from a 64-hex-character key.
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key).map_err(|_| CryptoError::InvalidKey)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey);
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt `plaintext` with a fresh nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Decrypt and authenticate a sealed payload. Any failure is `None`.
    pub fn open(&self, sealed: &str) -> Option<Vec<u8>> {
        let raw = BASE64.decode(sealed).ok()?;
        if raw.len() <= NONCE_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher.decrypt(nonce, ciphertext).ok()
    }
}
