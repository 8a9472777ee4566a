// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! Error taxonomy for the portal bridge.
//!
//! The variants map one-to-one onto the caller-visible failure classes:
//! credential rejection, upstream unavailability, workflow ordering
//! violations and missing session state. Protocol drift (markup that no
//! longer matches the expected patterns) is deliberately *not* an error —
//! parsers degrade to empty or partial results instead, because the
//! upstream's HTML is not contractually stable.

use thiserror::Error;

use crate::domain::store::KvError;

/// Errors surfaced by the gateway, session and workflow layers.
#[derive(Debug, Error)]
pub enum GateError {
    /// The SSO login form could not be loaded or was missing its
    /// anti-forgery tokens. Distinct from bad credentials.
    #[error("SSO login form unavailable")]
    FormUnavailable,

    /// The SSO flow redirected back to its login page: the username or
    /// password was rejected. Non-retryable without new credentials.
    #[error("upstream rejected the credentials")]
    CredentialsRejected,

    /// A cross-service SSO hand-off landed back on the login page: the
    /// single-sign-on session behind the stored cookie jar has expired.
    #[error("SSO session expired, re-login required")]
    SsoSessionExpired,

    /// Network error, timeout or unexpected status from the upstream.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A registration workflow step was invoked before the period was
    /// resolved for this session. The caller restarts at period selection.
    #[error("resolve the registration period first")]
    PeriodNotResolved,

    /// The session has no registration-subsystem cookie yet (the background
    /// login has not completed or failed).
    #[error("registration session not established")]
    RegistrationSessionMissing,

    /// No stored session for the presented token (expired, deleted, or the
    /// stored blob failed authentication).
    #[error("invalid or expired session")]
    SessionAbsent,

    /// An LMS query was made before the LMS sub-session was activated.
    #[error("LMS session not initialized")]
    LmsNotInitialized,

    /// The in-process SSO cookie jar for this session is gone (typically
    /// after a restart); LMS activation needs a fresh login.
    #[error("SSO context not available, re-login to enable LMS features")]
    SsoContextMissing,

    /// The refresh credential is absent from the store (expired or deleted).
    #[error("refresh token expired")]
    RefreshTokenExpired,

    /// The refresh credential was consumed but re-authentication failed;
    /// the credential has been deleted.
    #[error("re-authentication with saved credentials failed")]
    RefreshAuthFailed,

    /// The shared key-value store reported a failure.
    #[error(transparent)]
    Store(#[from] KvError),

    /// Serialization or encryption failure on an internal boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        // Strip the URL so query parameters never reach a log line.
        GateError::UpstreamUnavailable(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::Internal(err.to_string())
    }
}
