// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! Privacy helpers: every value handed to the logger goes through one of
//! these first. Raw passwords are never logged at all; cookies are reduced
//! to their key names; tokens and identifiers are truncated.

use regex::Regex;
use std::sync::LazyLock;

static COOKIE_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=([^;]+)").expect("cookie mask pattern"));

static URL_PARAM_RES: LazyLock<[(Regex, &'static str); 3]> = LazyLock::new(|| {
    [
        (Regex::new(r"masv=\d+").expect("masv pattern"), "masv=***"),
        (
            Regex::new(r"(?i)jsessionid=[^&;/]+").expect("jsessionid pattern"),
            "jsessionid=***",
        ),
        (
            Regex::new(r"(?i)SESSION=[^&;]+").expect("session pattern"),
            "SESSION=***",
        ),
    ]
});

/// Show the first few characters of a sensitive string.
pub fn mask_sensitive(value: &str, show_chars: usize) -> String {
    if value.chars().count() <= show_chars {
        return "***".to_string();
    }
    let shown: String = value.chars().take(show_chars).collect();
    format!("{shown}...")
}

/// Mask a student id, keeping the first three and last two digits.
pub fn mask_student_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 5 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

/// Keep cookie key names, hide every value.
pub fn mask_cookie(cookie: &str) -> String {
    if cookie.is_empty() {
        return "(empty)".to_string();
    }
    COOKIE_VALUE_RE.replace_all(cookie, "=***").into_owned()
}

/// Strip session identifiers and student ids out of a URL.
pub fn mask_url(url: &str) -> String {
    let mut out = url.to_string();
    for (re, replacement) in URL_PARAM_RES.iter() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_short_values_fully_hidden() {
        assert_eq!(mask_sensitive("abc", 4), "***");
        assert_eq!(mask_sensitive("abcdefgh", 4), "abcd...");
    }

    #[test]
    fn student_id_keeps_edges() {
        assert_eq!(mask_student_id("2212345"), "221***45");
        assert_eq!(mask_student_id("221"), "***");
    }

    #[test]
    fn cookie_values_hidden_keys_visible() {
        let masked = mask_cookie("SESSION=secret123; JSESSIONID=other");
        assert_eq!(masked, "SESSION=***; JSESSIONID=***");
        assert_eq!(mask_cookie(""), "(empty)");
    }

    #[test]
    fn url_session_params_hidden() {
        let masked = mask_url("https://portal/x?masv=2212345&SESSION=abc");
        assert!(!masked.contains("2212345"));
        assert!(!masked.contains("abc"));
        assert!(masked.contains("masv=***"));
    }
}
