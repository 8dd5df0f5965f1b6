// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-call tag bag threaded through the interceptor chain (stage 1)
//! and populated by the stages that follow it.

use super::principal::AuthenticatedPrincipal;
use std::collections::HashMap;
use std::time::Instant;

/// Arbitrary key/value annotations attached to a call for logging,
/// auditing and the body-summary stage. Cheap to clone; small by
/// construction (the body summary is capped at 1 KiB).
#[derive(Debug, Clone, Default)]
pub struct RequestTags(HashMap<String, String>);

impl RequestTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Everything the interceptor chain accumulates about one call.
pub struct CallContext {
    pub tags: RequestTags,
    pub method: String,
    pub peer_address: String,
    pub started_at: Instant,
    pub log_level_override: Option<crate::runtime::LogLevel>,
    pub auth_enabled: bool,
    pub principal: AuthenticatedPrincipal,
}

impl CallContext {
    pub fn new(method: impl Into<String>, peer_address: impl Into<String>) -> Self {
        Self {
            tags: RequestTags::new(),
            method: method.into(),
            peer_address: peer_address.into(),
            started_at: Instant::now(),
            log_level_override: None,
            auth_enabled: true,
            principal: AuthenticatedPrincipal::anonymous(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// A truncated, sensitivity-filtered summary of a request body.
///
/// `sensitive_fields` names fields the resource schema marks sensitive;
/// their values are blanked before the summary is assembled and capped
/// at 1 KiB, per the body-to-tags rewriter stage's contract.
pub fn summarize_body(fields: &[(&str, &str)], sensitive_fields: &[&str]) -> String {
    const MAX_LEN: usize = 1024;
    let mut out = String::new();
    for (name, value) in fields {
        if !out.is_empty() {
            out.push(' ');
        }
        if sensitive_fields.contains(name) {
            out.push_str(&format!("{name}=<redacted>"));
        } else {
            out.push_str(&format!("{name}={value}"));
        }
        if out.len() >= MAX_LEN {
            out.truncate(MAX_LEN);
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_body_redacts_sensitive_fields() {
        let summary = summarize_body(&[("name", "worker-1"), ("token", "secret")], &["token"]);
        assert!(summary.contains("name=worker-1"));
        assert!(summary.contains("token=<redacted>"));
        assert!(!summary.contains("secret"));
    }

    #[test]
    fn summarize_body_truncates_at_one_kibibyte() {
        let long_value = "x".repeat(2048);
        let summary = summarize_body(&[("blob", &long_value)], &[]);
        assert!(summary.len() <= 1024);
    }

    #[test]
    fn tags_round_trip() {
        let mut tags = RequestTags::new();
        tags.set("peer", "10.0.0.1");
        assert_eq!(tags.get("peer"), Some("10.0.0.1"));
        assert_eq!(tags.get("missing"), None);
    }
}
