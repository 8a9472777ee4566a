// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Credential Exchange Gateway
//!
//! Drives the CAS SSO login form and exchanges a username/password pair for
//! upstream cookie sessions. Two flows share the form-passing core:
//!
//! - [`CasGateway::login`] authenticates against the portal app service URL,
//!   harvests the app cookies, opportunistically scans for a bearer token
//!   and verifies the session with the "who am I" endpoint.
//! - [`CasGateway::registration_login`] authenticates against the
//!   course-registration service URL and performs three navigation hops
//!   (entry → home → form) to warm the server-side state before the
//!   registration form is usable.
//!
//! The gateway itself is stateless: every invocation gets a fresh
//! [`AutomationClient`] with its own cookie jar.

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, AUTHORIZATION, ORIGIN, REFERER};
use reqwest::redirect::Policy;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::config::{GateConfig, HttpConfig};
use crate::domain::error::GateError;
use crate::domain::masking;
use crate::infrastructure::markup;

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// A cookie-jar-bound HTTP client scoped to one authenticated identity.
///
/// The jar is owned exclusively by this context and is never serialized;
/// a context lost to a process restart is re-established by logging in
/// again or by re-seeding from a stored cookie header.
#[derive(Clone, Debug)]
pub struct AutomationClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
}

impl AutomationClient {
    /// Build a client with a fresh, empty cookie jar.
    pub fn new(http: &HttpConfig) -> Result<Self, GateError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(&http.user_agent)
            .timeout(std::time::Duration::from_secs(http.timeout_secs))
            .redirect(Policy::limited(10))
            .build()
            .map_err(GateError::from)?;
        Ok(Self { client, jar })
    }

    /// Build a client whose jar is seeded from a stored `k=v; k2=v2` cookie
    /// header, scoped to `base`.
    pub fn seeded(http: &HttpConfig, cookie_header: &str, base: &Url) -> Result<Self, GateError> {
        let ctx = Self::new(http)?;
        for part in cookie_header.split("; ") {
            if !part.trim().is_empty() {
                ctx.jar.add_cookie_str(part, base);
            }
        }
        Ok(ctx)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Render the jar's cookies for `url` as a request header value.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        self.jar
            .cookies(url)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }
}

/// Successful portal login.
#[derive(Debug)]
pub struct CasLogin {
    /// Cookie header harvested from the portal app path.
    pub cookie_header: String,
    /// Bearer token found on the post-login page or the verification
    /// response, if any.
    pub bearer_token: Option<String>,
    /// Profile returned by the verification endpoint, if it answered.
    pub profile: Option<Value>,
    /// The jar-bound client, kept live for cross-service SSO hand-offs.
    pub client: AutomationClient,
}

/// Successful registration-subsystem login.
pub struct RegistrationLogin {
    /// Merged cookie header across the SSO, portal and registration paths.
    pub cookie_header: String,
    pub client: AutomationClient,
}

/// Stateless CAS login automation.
pub struct CasGateway {
    config: Arc<GateConfig>,
}

impl CasGateway {
    pub fn new(config: Arc<GateConfig>) -> Self {
        Self { config }
    }

    /// Exchange credentials for a portal app session.
    pub async fn login(&self, username: &str, password: &str) -> Result<CasLogin, GateError> {
        let client = AutomationClient::new(&self.config.http)?;
        let response = self
            .pass_sso_form(&client, &self.config.urls.portal_service, username, password)
            .await?;
        debug!(url = %masking::mask_url(response.url().as_str()), "final URL after login");

        let page = response.text().await?;
        let mut bearer_token = markup::extract_bearer_token(&page);
        if bearer_token.is_none() {
            debug!("no bearer token found on post-login page");
        }

        let app_url = parse_url(&self.config.urls.portal_app)?;
        let cookie_header = client.cookie_header(&app_url).unwrap_or_default();
        if !cookie_header.contains("SESSION") {
            warn!(
                cookies = %masking::mask_cookie(&cookie_header),
                "SESSION cookie missing from portal app path"
            );
        }

        let profile = self
            .verify_identity(&client, &mut bearer_token)
            .await;

        Ok(CasLogin {
            cookie_header,
            bearer_token,
            profile,
            client,
        })
    }

    /// Exchange credentials for a warmed course-registration session.
    pub async fn registration_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<RegistrationLogin, GateError> {
        let client = AutomationClient::new(&self.config.http)?;
        let urls = self.config.urls.dkmh.clone();
        self.pass_sso_form(&client, &urls.service_url, username, password)
            .await?;

        // Three warm-up hops; a bounce back to SSO at any of them means the
        // server-side registration state was never established.
        let entry = client
            .client()
            .get(&urls.entry_url)
            .header(ACCEPT, HTML_ACCEPT)
            .header(REFERER, &urls.service_url)
            .send()
            .await?;
        self.ensure_not_login_page(entry.url())?;
        let entry_url = entry.url().clone();

        let home = client
            .client()
            .get(&urls.home_url)
            .header(ACCEPT, HTML_ACCEPT)
            .header(REFERER, entry_url.as_str())
            .send()
            .await?;
        self.ensure_not_login_page(home.url())?;
        let home_url = home.url().clone();

        let form = client
            .client()
            .get(&urls.form_url)
            .header(ACCEPT, HTML_ACCEPT)
            .header(REFERER, home_url.as_str())
            .send()
            .await?;
        self.ensure_not_login_page(form.url())?;

        let form_html = form.text().await?;
        debug!(length = form_html.len(), "registration form fetched");

        let cookie_header = self.merge_cookies(&client)?;
        Ok(RegistrationLogin {
            cookie_header,
            client,
        })
    }

    /// Steps 1–3 of the CAS flow: fetch the form, extract the anti-forgery
    /// tokens, submit credentials and classify the result by where the
    /// redirects landed.
    async fn pass_sso_form(
        &self,
        client: &AutomationClient,
        service_url: &str,
        username: &str,
        password: &str,
    ) -> Result<reqwest::Response, GateError> {
        let login_url = Url::parse_with_params(&self.config.urls.login_page, &[("service", service_url)])
            .map_err(|e| GateError::Internal(e.to_string()))?;

        let form_response = client.client().get(login_url.clone()).send().await?;
        let html = form_response.text().await?;

        let tokens = match markup::extract_cas_tokens(&html) {
            Some(tokens) => tokens,
            None => {
                warn!(length = html.len(), "could not parse SSO login form");
                return Err(GateError::FormUnavailable);
            }
        };
        debug!(
            execution = %masking::mask_sensitive(&tokens.execution, 4),
            "got SSO form tokens"
        );

        let response = client
            .client()
            .post(login_url)
            .form(&[
                ("username", username),
                ("password", password),
                ("execution", tokens.execution.as_str()),
                ("_eventId", "submit"),
                ("lt", tokens.lt.as_str()),
                ("submit", "Login"),
            ])
            .send()
            .await?;

        // Landing back on the login page means the credentials were
        // rejected; anywhere else counts as success.
        if self.is_login_page(response.url()) {
            return Err(GateError::CredentialsRejected);
        }
        Ok(response)
    }

    /// Call the "who am I" endpoint. Failure never fails the login: the
    /// cookies may still be valid for other sub-systems.
    async fn verify_identity(
        &self,
        client: &AutomationClient,
        bearer_token: &mut Option<String>,
    ) -> Option<Value> {
        let info_url = format!("{}?null", self.config.urls.student_info);
        let mut request = client
            .client()
            .get(&info_url)
            .header(ACCEPT, "application/json")
            .header(REFERER, format!("{}/", self.config.urls.portal_app))
            .header(ORIGIN, &self.config.urls.portal_base);
        if let Some(bearer) = bearer_token.as_deref() {
            request = request.header(AUTHORIZATION, bearer);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                info!(error = %err.without_url(), "identity verification call failed");
                return None;
            }
        };

        if !response.status().is_success() {
            info!(status = %response.status(), "identity verification returned non-success");
            return None;
        }

        // Some deployments rotate the bearer via a response header.
        if let Some(auth) = response
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        {
            *bearer_token = Some(auth.to_string());
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                info!(error = %err.without_url(), "identity verification body unreadable");
                return None;
            }
        };
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => {
                info!("identity verification response was not JSON");
                return None;
            }
        };

        if is_ok_code(value.get("code")) {
            Some(value.get("data").cloned().unwrap_or(value))
        } else {
            info!(
                code = %value.get("code").cloned().unwrap_or_default(),
                "login accepted but identity endpoint denied the request"
            );
            None
        }
    }

    fn is_login_page(&self, url: &Url) -> bool {
        url.as_str().starts_with(&self.config.urls.login_page)
    }

    fn ensure_not_login_page(&self, url: &Url) -> Result<(), GateError> {
        if self.is_login_page(url) || url.path().contains("/cas/login") {
            warn!(
                url = %masking::mask_url(url.as_str()),
                "registration warm-up hop bounced to SSO login"
            );
            return Err(GateError::UpstreamUnavailable(
                "registration portal redirected to login".to_string(),
            ));
        }
        Ok(())
    }

    /// Merge the jar's cookies across the SSO, registration and portal
    /// scopes into one header, later scopes overriding by cookie name.
    fn merge_cookies(&self, client: &AutomationClient) -> Result<String, GateError> {
        let scopes = [
            parse_url(&self.config.urls.login_page)?,
            parse_url(&self.config.urls.dkmh.entry_url)?,
            parse_url(&self.config.urls.portal_base)?,
        ];

        let mut merged: Vec<(String, String)> = Vec::new();
        for scope in &scopes {
            let Some(header) = client.cookie_header(scope) else {
                continue;
            };
            for pair in header.split("; ") {
                let Some((name, value)) = pair.split_once('=') else {
                    continue;
                };
                match merged.iter_mut().find(|(n, _)| n == name) {
                    Some(slot) => slot.1 = value.to_string(),
                    None => merged.push((name.to_string(), value.to_string())),
                }
            }
        }

        Ok(merged
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; "))
    }
}

fn parse_url(raw: &str) -> Result<Url, GateError> {
    Url::parse(raw).map_err(|e| GateError::Internal(format!("invalid configured URL: {e}")))
}

fn is_ok_code(code: Option<&Value>) -> bool {
    match code {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s == "200",
        Some(Value::Number(n)) => n.as_i64() == Some(200),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_codes_cover_string_number_and_absent() {
        assert!(is_ok_code(None));
        assert!(is_ok_code(Some(&Value::Null)));
        assert!(is_ok_code(Some(&Value::String("200".into()))));
        assert!(is_ok_code(Some(&serde_json::json!(200))));
        assert!(!is_ok_code(Some(&Value::String("403".into()))));
        assert!(!is_ok_code(Some(&serde_json::json!(500))));
    }

    #[test]
    fn seeded_client_replays_cookies() {
        let http = crate::domain::config::HttpConfig::default();
        let base = Url::parse("https://mybk.hcmut.edu.vn").unwrap();
        let ctx = AutomationClient::seeded(&http, "SESSION=abc; JSESSIONID=def", &base).unwrap();
        let header = ctx.cookie_header(&base).unwrap();
        assert!(header.contains("SESSION=abc"));
        assert!(header.contains("JSESSIONID=def"));
    }

    #[test]
    fn seeded_client_tolerates_empty_header() {
        let http = crate::domain::config::HttpConfig::default();
        let base = Url::parse("https://mybk.hcmut.edu.vn").unwrap();
        let ctx = AutomationClient::seeded(&http, "", &base).unwrap();
        assert!(ctx.cookie_header(&base).is_none());
    }
}
