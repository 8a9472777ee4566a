// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0

// Gate Configuration Types
//
// Defines the configuration schema for a bkgate node, including:
// - Server bind address
// - Upstream portal URLs (SSO, portal app, registration subsystem, LMS)
// - Session and refresh-credential lifetimes
// - Encryption key for stored records
// - Cache budget and circuit-breaker thresholds

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for a bkgate node.
///
/// Loaded from a YAML file via [`GateConfig::load`]; every section has
/// working defaults so a bare `GateConfig::default()` is a runnable
/// development configuration. The encryption key can always be overridden
/// with the `BKGATE_ENCRYPTION_KEY` environment variable so it never has to
/// live in a checked-in file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GateConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub registration: RegistrationConfig,

    #[serde(default)]
    pub urls: UpstreamUrls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Fixed browser-like identity presented to every upstream.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Bound on every upstream call; a slow upstream fails the enclosing
    /// operation instead of hanging the caller.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sliding inactivity window for stored sessions (seconds).
    #[serde(default = "default_inactivity")]
    pub inactivity_secs: u64,

    /// Sliding lifetime for refresh credentials (seconds).
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,

    /// Login attempts allowed per minute, process-wide.
    #[serde(default = "default_login_rate")]
    pub login_attempts_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// AES-256-GCM key for records at rest, as 64 hex characters.
    /// Set `BKGATE_ENCRYPTION_KEY` in production; the baked-in default is
    /// for development only.
    #[serde(default = "default_encryption_key")]
    pub encryption_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Daily command quota of the shared store.
    #[serde(default = "default_daily_limit")]
    pub daily_command_limit: u64,

    /// Fraction of the daily quota at which the circuit opens.
    #[serde(default = "default_circuit_threshold")]
    pub circuit_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Upstream's registration success code. Inferred from observed
    /// responses, not documented by the upstream, hence configuration.
    #[serde(default = "default_success_code")]
    pub success_code: String,
}

/// Upstream endpoints, grouped per sub-system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamUrls {
    /// CAS login page.
    #[serde(default = "default_login_page")]
    pub login_page: String,

    /// Service URL declared when logging in to the portal app.
    #[serde(default = "default_portal_service")]
    pub portal_service: String,

    /// Portal origin.
    #[serde(default = "default_portal_base")]
    pub portal_base: String,

    /// Portal app path (cookie harvesting scope and Referer).
    #[serde(default = "default_portal_app")]
    pub portal_app: String,

    /// "Who am I" verification endpoint.
    #[serde(default = "default_student_info")]
    pub student_info: String,

    #[serde(default)]
    pub dkmh: DkmhUrls,

    #[serde(default)]
    pub lms: LmsUrls,
}

/// Course-registration sub-system endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkmhUrls {
    /// Service URL declared when logging in for registration.
    #[serde(default = "default_dkmh_service")]
    pub service_url: String,

    #[serde(default = "default_dkmh_entry")]
    pub entry_url: String,

    #[serde(default = "default_dkmh_home")]
    pub home_url: String,

    #[serde(default = "default_dkmh_form")]
    pub form_url: String,

    /// Base for the `*.action` endpoints.
    #[serde(default = "default_dkmh_base")]
    pub base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmsUrls {
    #[serde(default = "default_lms_base")]
    pub base_url: String,

    #[serde(default = "default_lms_service")]
    pub service_url: String,

    #[serde(default = "default_lms_ajax")]
    pub ajax_url: String,
}

impl GateConfig {
    /// Load configuration from an optional YAML file, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                serde_yaml::from_str(&raw)?
            }
            None => Self::default(),
        };

        if let Ok(key) = std::env::var("BKGATE_ENCRYPTION_KEY") {
            config.security.encryption_key = key;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that serde defaults cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.security.encryption_key.len() != 64
            || hex::decode(&self.security.encryption_key).is_err()
        {
            anyhow::bail!("security.encryption_key must be 64 hex characters (32 bytes)");
        }
        if !(0.0..=1.0).contains(&self.cache.circuit_threshold) {
            anyhow::bail!("cache.circuit_threshold must be within 0.0..=1.0");
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.inactivity_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.session.refresh_ttl_secs)
    }
}

impl DkmhUrls {
    /// Absolute URL of a registration-subsystem action endpoint.
    pub fn action(&self, name: &str) -> String {
        format!("{}/{}.action", self.base, name)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_secs: default_inactivity(),
            refresh_ttl_secs: default_refresh_ttl(),
            login_attempts_per_minute: default_login_rate(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key: default_encryption_key(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            daily_command_limit: default_daily_limit(),
            circuit_threshold: default_circuit_threshold(),
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            success_code: default_success_code(),
        }
    }
}

impl Default for UpstreamUrls {
    fn default() -> Self {
        Self {
            login_page: default_login_page(),
            portal_service: default_portal_service(),
            portal_base: default_portal_base(),
            portal_app: default_portal_app(),
            student_info: default_student_info(),
            dkmh: DkmhUrls::default(),
            lms: LmsUrls::default(),
        }
    }
}

impl Default for DkmhUrls {
    fn default() -> Self {
        Self {
            service_url: default_dkmh_service(),
            entry_url: default_dkmh_entry(),
            home_url: default_dkmh_home(),
            form_url: default_dkmh_form(),
            base: default_dkmh_base(),
        }
    }
}

impl Default for LmsUrls {
    fn default() -> Self {
        Self {
            base_url: default_lms_base(),
            service_url: default_lms_service(),
            ajax_url: default_lms_ajax(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_inactivity() -> u64 {
    15 * 60
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_login_rate() -> u32 {
    10
}

fn default_encryption_key() -> String {
    "a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c1d2e3f4a5b6c7d8e9f0a1b2".to_string()
}

fn default_daily_limit() -> u64 {
    10_000
}

fn default_circuit_threshold() -> f64 {
    0.8
}

fn default_success_code() -> String {
    "SUCCESS".to_string()
}

fn default_login_page() -> String {
    "https://sso.hcmut.edu.vn/cas/login".to_string()
}

fn default_portal_service() -> String {
    "https://mybk.hcmut.edu.vn/app/login/cas".to_string()
}

fn default_portal_base() -> String {
    "https://mybk.hcmut.edu.vn".to_string()
}

fn default_portal_app() -> String {
    "https://mybk.hcmut.edu.vn/app".to_string()
}

fn default_student_info() -> String {
    "https://mybk.hcmut.edu.vn/api/v1/student/get-student-info".to_string()
}

fn default_dkmh_service() -> String {
    "https://mybk.hcmut.edu.vn/my/homeSSO.action".to_string()
}

fn default_dkmh_entry() -> String {
    "https://mybk.hcmut.edu.vn/dkmh/".to_string()
}

fn default_dkmh_home() -> String {
    "https://mybk.hcmut.edu.vn/dkmh/home.action".to_string()
}

fn default_dkmh_form() -> String {
    "https://mybk.hcmut.edu.vn/dkmh/dangKyMonHocForm.action".to_string()
}

fn default_dkmh_base() -> String {
    "https://mybk.hcmut.edu.vn/dkmh".to_string()
}

fn default_lms_base() -> String {
    "https://lms.hcmut.edu.vn".to_string()
}

fn default_lms_service() -> String {
    "https://lms.hcmut.edu.vn/login/index.php?authCAS=CAS".to_string()
}

fn default_lms_ajax() -> String {
    "https://lms.hcmut.edu.vn/lib/ajax/service.php".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(GateConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_short_encryption_key() {
        let mut config = GateConfig::default();
        config.security.encryption_key = "deadbeef".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_hex_encryption_key() {
        let mut config = GateConfig::default();
        config.security.encryption_key = "z".repeat(64);
        assert!(config.validate().is_err());
    }

    #[test]
    fn action_urls_are_derived_from_base() {
        let urls = DkmhUrls::default();
        assert_eq!(
            urls.action("getKetQuaDangKy"),
            "https://mybk.hcmut.edu.vn/dkmh/getKetQuaDangKy.action"
        );
    }
}
