// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Authentication Orchestration
//!
//! Ties the credential exchange gateway, the encrypted session store and
//! the in-process automation state together:
//!
//! - `login` exchanges credentials for a portal session, persists it, keeps
//!   the SSO jar live for cross-service hand-offs, and fires the
//!   registration-subsystem login in the background.
//! - `refresh` consumes a stored refresh credential (sliding 7-day window)
//!   to mint a new session without the user re-entering a password.
//! - `authenticate` resolves a bearer token to its session and re-arms the
//!   sliding inactivity TTL.
//! - `activate_lms` lazily establishes the LMS sub-session from the live
//!   SSO jar.
//!
//! The background registration login is a detached task by contract: its
//! outcome is merged into the stored session when it completes and its
//! failure is only logged — it never affects the already-answered login.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::error::GateError;
use crate::domain::masking;
use crate::domain::session::{generate_token, RefreshCredential, Session};
use crate::infrastructure::cas::{AutomationClient, CasGateway};
use crate::infrastructure::lms::LmsGateway;
use crate::infrastructure::session_store::SessionStore;
use crate::application::registration::LiveContexts;

/// Result of a successful login.
#[derive(Debug)]
pub struct LoginOutcome {
    pub token: String,
    pub refresh_token: Option<String>,
    pub profile: Option<Value>,
}

/// Result of a successful LMS activation.
pub struct LmsActivation {
    pub userid: Option<String>,
    /// True when an already-activated sub-session was reused.
    pub cached: bool,
}

pub struct AuthService {
    gateway: Arc<CasGateway>,
    lms_gateway: Arc<LmsGateway>,
    store: Arc<SessionStore>,
    /// Live SSO jars per session token, for cross-service hand-offs.
    /// In-process only; gone after a restart.
    sso_jars: Arc<DashMap<String, AutomationClient>>,
    contexts: Arc<LiveContexts>,
}

impl AuthService {
    pub fn new(
        gateway: Arc<CasGateway>,
        lms_gateway: Arc<LmsGateway>,
        store: Arc<SessionStore>,
        contexts: Arc<LiveContexts>,
    ) -> Self {
        Self {
            gateway,
            lms_gateway,
            store,
            sso_jars: Arc::new(DashMap::new()),
            contexts,
        }
    }

    /// Exchange credentials for a session token.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember: bool,
    ) -> Result<LoginOutcome, GateError> {
        let login = self.gateway.login(username, password).await?;

        let token = generate_token();
        let session = Session::new(
            username,
            login.cookie_header,
            login.bearer_token,
            login.profile.clone(),
        );
        self.store.save(&token, &session).await?;
        self.sso_jars.insert(token.clone(), login.client);
        info!(
            user = %masking::mask_student_id(username),
            "login successful, session saved"
        );

        self.spawn_registration_login(username.to_string(), password.to_string(), token.clone());

        let refresh_token = if remember {
            let refresh_token = generate_token();
            self.store
                .save_refresh(&refresh_token, &RefreshCredential::new(username, password))
                .await?;
            Some(refresh_token)
        } else {
            None
        };

        Ok(LoginOutcome {
            token,
            refresh_token,
            profile: login.profile,
        })
    }

    /// Consume a refresh credential to mint a new session.
    ///
    /// The credential is used exactly once per attempt: a credential
    /// rejection deletes it ([`GateError::RefreshAuthFailed`]); a success
    /// re-writes it with the full sliding window. Transient upstream
    /// failures leave it untouched for a later retry.
    pub async fn refresh(&self, refresh_token: &str) -> Result<LoginOutcome, GateError> {
        let credential = self
            .store
            .get_refresh(refresh_token)
            .await
            .ok_or(GateError::RefreshTokenExpired)?;

        let login = match self
            .gateway
            .login(&credential.username, &credential.password)
            .await
        {
            Ok(login) => login,
            Err(GateError::CredentialsRejected) => {
                warn!(
                    user = %masking::mask_student_id(&credential.username),
                    "saved credentials rejected, deleting refresh credential"
                );
                if let Err(err) = self.store.delete_refresh(refresh_token).await {
                    warn!(error = %err, "failed to delete consumed refresh credential");
                }
                return Err(GateError::RefreshAuthFailed);
            }
            Err(other) => return Err(other),
        };

        let token = generate_token();
        let session = Session::new(
            &credential.username,
            login.cookie_header,
            login.bearer_token,
            login.profile.clone(),
        );
        self.store.save(&token, &session).await?;
        self.sso_jars.insert(token.clone(), login.client);

        self.spawn_registration_login(
            credential.username.clone(),
            credential.password.clone(),
            token.clone(),
        );

        // Sliding window: the consumed credential is re-written with a
        // fresh TTL rather than merely read.
        self.store
            .save_refresh(
                refresh_token,
                &RefreshCredential::new(credential.username, credential.password),
            )
            .await?;

        Ok(LoginOutcome {
            token,
            refresh_token: Some(refresh_token.to_string()),
            profile: login.profile,
        })
    }

    /// Resolve a bearer token to its session, re-arming the sliding TTL.
    pub async fn authenticate(&self, token: &str) -> Result<Session, GateError> {
        let mut session = self.store.get(token).await.ok_or(GateError::SessionAbsent)?;
        session.touch();
        self.store.save(token, &session).await?;
        Ok(session)
    }

    /// Destroy a session and everything hanging off it.
    pub async fn logout(&self, token: &str, refresh_token: Option<&str>) -> Result<(), GateError> {
        self.store.delete(token).await?;
        self.sso_jars.remove(token);
        self.contexts.evict_session(token);
        if let Some(refresh_token) = refresh_token {
            self.store.delete_refresh(refresh_token).await?;
        }
        info!("session deleted");
        Ok(())
    }

    /// Lazily activate the LMS sub-session using the live SSO jar.
    pub async fn activate_lms(&self, token: &str) -> Result<LmsActivation, GateError> {
        let mut session = self.store.get(token).await.ok_or(GateError::SessionAbsent)?;

        if let Some(lms) = &session.lms {
            info!("reusing existing LMS sub-session");
            return Ok(LmsActivation {
                userid: lms.userid.clone(),
                cached: true,
            });
        }

        let sso = self
            .sso_jars
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(GateError::SsoContextMissing)?;

        let lms = self.lms_gateway.login(&sso).await?;
        let userid = lms.userid.clone();
        session.attach_lms(lms);
        self.store.save(token, &session).await?;
        info!("LMS sub-session activated");

        Ok(LmsActivation {
            userid,
            cached: false,
        })
    }

    /// Clear a broken LMS sub-session so the next activation starts fresh.
    pub async fn invalidate_lms(&self, token: &str) -> Result<(), GateError> {
        if let Some(mut session) = self.store.get(token).await {
            session.lms = None;
            self.store.save(token, &session).await?;
        }
        Ok(())
    }

    /// Background registration-subsystem login (fire and forget).
    fn spawn_registration_login(&self, username: String, password: String, token: String) {
        let gateway = self.gateway.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            match gateway.registration_login(&username, &password).await {
                Ok(result) => {
                    // The session may have been logged out in the meantime;
                    // in that case the result is simply dropped.
                    if let Some(mut session) = store.get(&token).await {
                        session.attach_registration_cookie(result.cookie_header);
                        match store.save(&token, &session).await {
                            Ok(()) => info!("background registration login merged into session"),
                            Err(err) => warn!(
                                error = %err,
                                "failed to persist background registration login"
                            ),
                        }
                    }
                }
                Err(err) => info!(error = %err, "background registration login failed"),
            }
        });
    }
}
