// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Session Aggregate
//!
//! Domain model for the per-user portal session and its refresh credential.
//!
//! ## Session Lifecycle
//!
//! ```text
//! POST /auth/login (CAS exchange succeeds)
//!   └─ Session::new(username, cookie, bearer, profile)
//!         └─ mutated in place by the background registration login
//!            (attach_registration_cookie) and by explicit LMS activation
//!            (attach_lms)
//!         └─ touch() on every authenticated request (sliding TTL)
//!         └─ destroyed on logout or store-side TTL expiry
//! ```
//!
//! ## Invariants
//!
//! - A session token is 32 bytes of OS randomness, hex-encoded. It never
//!   encodes identity or any other recoverable information.
//! - The refresh token is an independent random token; the two are never
//!   derivable from each other.
//! - A [`RefreshCredential`] only exists inside the encryption boundary of
//!   the store; it is consumed at most once per re-authentication attempt
//!   and re-written with a fresh TTL on success.

use chrono::{DateTime, Utc};
use rand::TryRngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generate an opaque 256-bit token, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .expect("operating system RNG unavailable");
    hex::encode(bytes)
}

/// Lazily-populated LMS (Moodle) sub-session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LmsSession {
    /// Cookie header for the LMS origin (includes `MoodleSession`).
    pub cookie: String,

    /// Per-login AJAX session key scraped from the LMS landing page.
    pub sesskey: String,

    /// LMS numeric user id, when the landing page exposed it.
    pub userid: Option<String>,
}

/// One authenticated portal identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Owning portal username.
    pub username: String,

    /// Cookie header for the portal app sub-system.
    pub portal_cookie: String,

    /// Bearer token harvested from the post-login page, if any.
    pub bearer_token: Option<String>,

    /// Student profile returned by the verification endpoint, if any.
    pub profile: Option<Value>,

    /// Cookie header for the course-registration sub-system; populated by
    /// the background registration login.
    pub dkmh_cookie: Option<String>,

    /// Whether the background registration login has completed.
    pub dkmh_logged_in: bool,

    /// LMS sub-session; populated on explicit activation.
    pub lms: Option<LmsSession>,

    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(
        username: impl Into<String>,
        portal_cookie: impl Into<String>,
        bearer_token: Option<String>,
        profile: Option<Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            username: username.into(),
            portal_cookie: portal_cookie.into(),
            bearer_token,
            profile,
            dkmh_cookie: None,
            dkmh_logged_in: false,
            lms: None,
            created_at: now,
            last_activity: now,
        }
    }

    /// Record activity; the store re-arms the TTL on the following save.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Merge the background registration login result into this session.
    pub fn attach_registration_cookie(&mut self, cookie: impl Into<String>) {
        self.dkmh_cookie = Some(cookie.into());
        self.dkmh_logged_in = true;
    }

    /// Merge an activated LMS sub-session into this session.
    pub fn attach_lms(&mut self, lms: LmsSession) {
        self.lms = Some(lms);
    }
}

/// Saved credentials for silent re-authentication ("remember me").
///
/// The plaintext only ever exists in process memory; at rest the whole
/// record is encrypted by the session store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshCredential {
    pub username: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

impl RefreshCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            created_at: Utc::now(),
        }
    }
}
