// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Registration Workflow Driver
//!
//! Walks the registration sub-system's implicit protocol and keeps the
//! resolved identifiers alive for follow-up calls.
//!
//! ## State machine per (session, period)
//!
//! ```text
//! UNINITIALIZED
//!   └─ period_details(periodId)
//!         └─ prime result view → resolve drawing pair → fetch window
//!            → warm course list → parse current results
//!         └─ PeriodContext { jar, drawingId, ownerId, window } retained
//!            under "token:period"                          → READY
//! READY ── search / class_groups / register / cancel / result ── READY
//! ```
//!
//! Every READY-state operation fails fast with
//! [`GateError::PeriodNotResolved`] when no live context exists for the
//! pair — the caller-visible signal to restart at period selection. The
//! context map is in-process only: after a restart, workflows resume from
//! `period_details`.

use chrono::Local;
use dashmap::DashMap;
use reqwest::header::{ACCEPT, ORIGIN, REFERER};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::domain::config::GateConfig;
use crate::domain::error::GateError;
use crate::domain::session::Session;
use crate::infrastructure::cas::AutomationClient;
use crate::infrastructure::markup::{
    self, ClassGroup, DrawingIds, RegistrationResults, RegistrationRound, RegistrationWindow,
    SearchHit,
};

/// In-process store of live automation contexts, keyed `token:period`.
///
/// Not durable by design: losing it only costs callers a re-resolution.
#[derive(Default)]
pub struct LiveContexts {
    map: DashMap<String, Arc<PeriodContext>>,
}

impl LiveContexts {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(token: &str, period_id: &str) -> String {
        format!("{token}:{period_id}")
    }

    pub fn get(&self, token: &str, period_id: &str) -> Option<Arc<PeriodContext>> {
        self.map.get(&Self::key(token, period_id)).map(|e| e.value().clone())
    }

    pub fn insert(&self, token: &str, period_id: &str, context: Arc<PeriodContext>) {
        self.map.insert(Self::key(token, period_id), context);
    }

    /// Drop every context belonging to a session. Called on logout and on
    /// store-side session deletion.
    pub fn evict_session(&self, token: &str) {
        let prefix = format!("{token}:");
        self.map.retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Resolved upstream state for one (session, period) pair.
pub struct PeriodContext {
    client: AutomationClient,
    pub period_id: String,
    pub drawing_id: String,
    pub owner_id: String,
    pub window: RegistrationWindow,
}

/// Result of resolving a period.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodDetails {
    pub period_id: String,
    pub drawing_id: String,
    pub window: RegistrationWindow,
    pub results: RegistrationResults,
}

/// Outcome of a registration post, success or structured upstream failure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOutcome {
    pub success: bool,
    pub code: Option<String>,
    pub message: String,
    pub force_mode: bool,
}

pub struct RegistrationService {
    config: Arc<GateConfig>,
    contexts: Arc<LiveContexts>,
}

impl RegistrationService {
    pub fn new(config: Arc<GateConfig>, contexts: Arc<LiveContexts>) -> Self {
        Self { config, contexts }
    }

    /// List the registration rounds shown on the form page.
    pub async fn list_periods(&self, session: &Session) -> Result<Vec<RegistrationRound>, GateError> {
        let client = self.seeded_client(session)?;
        let response = client
            .client()
            .get(&self.config.urls.dkmh.form_url)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(REFERER, &self.config.urls.dkmh.home_url)
            .send()
            .await?;
        let html = response.text().await?;
        let mut rounds = markup::parse_registration_rounds(&html, Local::now().naive_local());
        rounds.truncate(10);
        Ok(rounds)
    }

    /// Resolve a period: prime, resolve the drawing pair, fetch the window,
    /// warm the course list, parse the current results and retain the live
    /// context for the follow-up operations.
    pub async fn period_details(
        &self,
        token: &str,
        session: &Session,
        period_id: &str,
    ) -> Result<PeriodDetails, GateError> {
        let client = self.seeded_client(session)?;

        self.post(&client, "ketQuaDangKyView", &[("hocKyId", period_id)])
            .await?;

        let drawing_html = self
            .post(&client, "getDanhSachDotDK", &[("hocKyId", period_id)])
            .await?;
        let ids = markup::extract_drawing_ids(&drawing_html).unwrap_or_else(|| {
            // Degraded mode: address the drawing with the period id itself.
            info!(period = %period_id, "no drawing pair in response, using period id");
            DrawingIds {
                owner_id: period_id.to_string(),
                drawing_id: period_id.to_string(),
            }
        });

        let window_html = self
            .post(
                &client,
                "getLichDangKy",
                &[
                    ("dotDKId", ids.drawing_id.as_str()),
                    ("dotDKHocVienId", ids.owner_id.as_str()),
                ],
            )
            .await?;
        let window = markup::parse_registration_window(&window_html);

        self.post(
            &client,
            "getDanhSachMonHocDangKy",
            &[("dotDKId", ids.drawing_id.as_str())],
        )
        .await?;

        let results_html = self.post(&client, "getKetQuaDangKy", &[]).await?;
        let results = markup::parse_registration_results(&results_html);

        let context = Arc::new(PeriodContext {
            client,
            period_id: period_id.to_string(),
            drawing_id: ids.drawing_id.clone(),
            owner_id: ids.owner_id,
            window: window.clone(),
        });
        self.contexts.insert(token, period_id, context);

        Ok(PeriodDetails {
            period_id: period_id.to_string(),
            drawing_id: ids.drawing_id,
            window,
            results,
        })
    }

    /// Free-text course search against the resolved drawing.
    pub async fn search(
        &self,
        token: &str,
        period_id: &str,
        query: &str,
        force_mode: bool,
    ) -> Result<Vec<SearchHit>, GateError> {
        let context = self.require_context(token, period_id)?;
        if !force_mode {
            // Priming refresh; skippable when upstream state is known current.
            self.post(&context.client, "getKetQuaDangKy", &[]).await?;
        }
        let html = self
            .post(&context.client, "searchMonHocDangKy", &[("msmh", query)])
            .await?;
        Ok(markup::parse_search_results(&html))
    }

    /// Class-group info for one course.
    pub async fn class_groups(
        &self,
        token: &str,
        period_id: &str,
        mon_hoc_id: &str,
    ) -> Result<Vec<ClassGroup>, GateError> {
        let context = self.require_context(token, period_id)?;
        let html = self
            .post(
                &context.client,
                "getThongTinNhomLopMonHoc",
                &[("monHocId", mon_hoc_id)],
            )
            .await?;
        Ok(markup::parse_class_groups(&html))
    }

    /// Post a registration for a class group.
    pub async fn register(
        &self,
        token: &str,
        period_id: &str,
        nlmh_id: &str,
        mon_hoc_id: Option<&str>,
        force_mode: bool,
    ) -> Result<RegisterOutcome, GateError> {
        let context = self.require_context(token, period_id)?;

        if let (Some(mon_hoc_id), false) = (mon_hoc_id, force_mode) {
            self.post(
                &context.client,
                "getThongTinNhomLopMonHoc",
                &[("monHocId", mon_hoc_id)],
            )
            .await?;
        }

        let raw = self
            .post(&context.client, "dangKy", &[("NLMHId", nlmh_id)])
            .await?;
        // The upstream sometimes emits a byte-order-mark before the JSON.
        let text = raw.strip_prefix('\u{feff}').unwrap_or(&raw);
        let value: Value = serde_json::from_str(text).unwrap_or_else(|_| Value::Object(Default::default()));

        let code = value.get("code").and_then(Value::as_str).map(str::to_string);
        let message = value
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if code.as_deref() == Some(self.config.registration.success_code.as_str()) || force_mode {
            if !force_mode {
                // Refresh the result list; the registration itself already
                // went through, so a refresh failure is only logged.
                if let Err(err) = self.post(&context.client, "getKetQuaDangKy", &[]).await {
                    warn!(error = %err, "post-registration result refresh failed");
                }
            }
            Ok(RegisterOutcome {
                success: true,
                code,
                message: if message.is_empty() { "Sent".to_string() } else { message },
                force_mode,
            })
        } else {
            Ok(RegisterOutcome {
                success: false,
                code,
                message: if message.is_empty() { "Failed".to_string() } else { message },
                force_mode,
            })
        }
    }

    /// Fetch and parse the current registration result set.
    pub async fn registration_result(
        &self,
        token: &str,
        period_id: &str,
    ) -> Result<RegistrationResults, GateError> {
        let context = self.require_context(token, period_id)?;
        let html = self.post(&context.client, "getKetQuaDangKy", &[]).await?;
        Ok(markup::parse_registration_results(&html))
    }

    /// Cancel one registration result row.
    pub async fn cancel(
        &self,
        token: &str,
        period_id: &str,
        ketqua_id: &str,
    ) -> Result<(), GateError> {
        let context = self.require_context(token, period_id)?;
        self.post(
            &context.client,
            "xoaKetQuaDangKy",
            &[("ketquaId", ketqua_id)],
        )
        .await?;
        Ok(())
    }

    fn require_context(&self, token: &str, period_id: &str) -> Result<Arc<PeriodContext>, GateError> {
        self.contexts
            .get(token, period_id)
            .ok_or(GateError::PeriodNotResolved)
    }

    fn seeded_client(&self, session: &Session) -> Result<AutomationClient, GateError> {
        let cookie = session
            .dkmh_cookie
            .as_deref()
            .ok_or(GateError::RegistrationSessionMissing)?;
        let base = Url::parse(&self.config.urls.portal_base)
            .map_err(|e| GateError::Internal(e.to_string()))?;
        AutomationClient::seeded(&self.config.http, cookie, &base)
    }

    async fn post(
        &self,
        client: &AutomationClient,
        action: &str,
        form: &[(&str, &str)],
    ) -> Result<String, GateError> {
        let url = self.config.urls.dkmh.action(action);
        let response = client
            .client()
            .post(&url)
            .header(ORIGIN, &self.config.urls.portal_base)
            .header(REFERER, &self.config.urls.dkmh.form_url)
            .form(form)
            .send()
            .await?;
        Ok(response.text().await?)
    }
}
