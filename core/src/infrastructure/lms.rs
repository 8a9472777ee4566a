// LMS (Moodle) Upstream Adapter
//
// Authenticates against the LMS via the existing CAS SSO session and calls
// the Moodle AJAX service for message data.

use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, ORIGIN, REFERER};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::domain::config::GateConfig;
use crate::domain::error::GateError;
use crate::domain::masking;
use crate::domain::session::LmsSession;
use crate::infrastructure::cas::AutomationClient;
use crate::infrastructure::markup;

/// Options for the conversation-list query.
#[derive(Debug, Clone)]
pub struct ConversationQuery {
    /// 1 = private messages.
    pub conversation_type: u32,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ConversationQuery {
    fn default() -> Self {
        Self {
            conversation_type: 1,
            limit: 51,
            offset: 0,
        }
    }
}

/// Moodle integration: SSO hand-off login plus the message AJAX calls.
pub struct LmsGateway {
    config: Arc<GateConfig>,
    http: reqwest::Client,
}

impl LmsGateway {
    pub fn new(config: Arc<GateConfig>) -> Result<Self, GateError> {
        let http = reqwest::Client::builder()
            .user_agent(&config.http.user_agent)
            .timeout(config.http_timeout())
            .build()
            .map_err(GateError::from)?;
        Ok(Self { config, http })
    }

    /// Log in to the LMS by riding the CAS ticket-granting cookie held in
    /// `sso`'s jar. The user must already have a live portal login.
    pub async fn login(&self, sso: &AutomationClient) -> Result<LmsSession, GateError> {
        let login_url = Url::parse_with_params(
            &self.config.urls.login_page,
            &[("service", self.config.urls.lms.service_url.as_str())],
        )
        .map_err(|e| GateError::Internal(e.to_string()))?;

        let response = sso.client().get(login_url).send().await?;
        let final_url = response.url().clone();
        info!(url = %masking::mask_url(final_url.as_str()), "LMS SSO hand-off landed");

        if final_url.as_str().starts_with(&self.config.urls.login_page) {
            warn!("LMS SSO redirect failed, user not authenticated");
            return Err(GateError::SsoSessionExpired);
        }

        let html = response.text().await?;
        let identity = markup::extract_lms_identity(&html).ok_or_else(|| {
            warn!("could not find sesskey on LMS landing page");
            GateError::UpstreamUnavailable("LMS sesskey not found".to_string())
        })?;
        info!(
            sesskey = %masking::mask_sensitive(&identity.sesskey, 4),
            userid = identity.userid.as_deref().unwrap_or("-"),
            "LMS identity resolved"
        );

        let lms_base = Url::parse(&self.config.urls.lms.base_url)
            .map_err(|e| GateError::Internal(e.to_string()))?;
        let cookie = sso.cookie_header(&lms_base).unwrap_or_default();
        if !cookie.contains("MoodleSession") {
            warn!(
                cookies = %masking::mask_cookie(&cookie),
                "MoodleSession cookie not set after hand-off"
            );
            return Err(GateError::UpstreamUnavailable(
                "MoodleSession cookie not set".to_string(),
            ));
        }

        Ok(LmsSession {
            cookie,
            sesskey: identity.sesskey,
            userid: identity.userid,
        })
    }

    /// Fetch the conversation inbox.
    pub async fn conversations(
        &self,
        lms: &LmsSession,
        query: &ConversationQuery,
    ) -> Result<Value, GateError> {
        let userid = require_userid(lms)?;
        self.ajax(
            lms,
            "core_message_get_conversations",
            json!({
                "userid": userid,
                "type": query.conversation_type,
                "limitnum": query.limit,
                "limitfrom": query.offset,
                "favourites": false,
                "mergeself": true,
            }),
        )
        .await
    }

    /// Fetch the messages of one conversation.
    pub async fn conversation_messages(
        &self,
        lms: &LmsSession,
        conversation_id: u64,
        limit: u32,
        offset: u32,
    ) -> Result<Value, GateError> {
        let userid = require_userid(lms)?;
        self.ajax(
            lms,
            "core_message_get_conversation_messages",
            json!({
                "currentuserid": userid,
                "convid": conversation_id,
                "newest": true,
                "limitnum": limit,
                "limitfrom": offset,
            }),
        )
        .await
    }

    /// Fetch unread conversation counts.
    pub async fn unread_counts(&self, lms: &LmsSession) -> Result<Value, GateError> {
        let userid = require_userid(lms)?;
        self.ajax(
            lms,
            "core_message_get_unread_conversation_counts",
            json!({ "userid": userid }),
        )
        .await
    }

    /// One call against the Moodle AJAX service. The service answers an
    /// array of results; the first element carries either `data` or an
    /// error envelope.
    async fn ajax(&self, lms: &LmsSession, method: &str, args: Value) -> Result<Value, GateError> {
        let url = format!(
            "{}?sesskey={}&info={}",
            self.config.urls.lms.ajax_url, lms.sesskey, method
        );
        let payload = json!([{ "index": 0, "methodname": method, "args": args }]);

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/javascript, */*; q=0.01")
            .header(COOKIE, &lms.cookie)
            .header(ORIGIN, &self.config.urls.lms.base_url)
            .header(REFERER, format!("{}/message/", self.config.urls.lms.base_url))
            .header("X-Requested-With", "XMLHttpRequest")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GateError::UpstreamUnavailable(format!(
                "LMS API error: {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        match body.as_array().and_then(|a| a.first()) {
            Some(first) => {
                if first.get("error").map(is_truthy).unwrap_or(false) {
                    let message = first
                        .pointer("/exception/message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error");
                    return Err(GateError::UpstreamUnavailable(format!(
                        "LMS error: {message}"
                    )));
                }
                Ok(first.get("data").cloned().unwrap_or_else(|| first.clone()))
            }
            None => Ok(body),
        }
    }
}

fn require_userid(lms: &LmsSession) -> Result<u64, GateError> {
    lms.userid
        .as_deref()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| GateError::UpstreamUnavailable("LMS userid not available".to_string()))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
