// gateway-delivery/src/redact.rs
// ============================================================================
// Module: Snapshot Redaction
// Description: Bounds and redacts request/response snapshots before they are
//              written into an execution log.
// Purpose: Keep secrets and oversized payloads out of persisted logs.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Every header on a configurable deny-list is replaced with a fixed
//! placeholder; every body is truncated to a bounded length. The deny-list is
//! matched case-insensitively since HTTP header names are case-insensitive.

use std::collections::HashMap;
use std::collections::HashSet;

const REDACTED_PLACEHOLDER: &str = "***redacted***";
const DEFAULT_MAX_BODY_BYTES: usize = 4096;

fn default_deny_list() -> HashSet<String> {
    [
        "authorization",
        "x-api-key",
        "x-integration-signature",
        "cookie",
        "set-cookie",
        "proxy-authorization",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Redacts headers and truncates bodies before they are persisted.
#[derive(Debug, Clone)]
pub struct Redactor {
    deny_list: HashSet<String>,
    max_body_bytes: usize,
}

impl Default for Redactor {
    fn default() -> Self {
        Self { deny_list: default_deny_list(), max_body_bytes: DEFAULT_MAX_BODY_BYTES }
    }
}

impl Redactor {
    /// Builds a redactor with a custom deny-list and body length cap.
    #[must_use]
    pub fn new(deny_list: impl IntoIterator<Item = String>, max_body_bytes: usize) -> Self {
        Self { deny_list: deny_list.into_iter().map(|h| h.to_lowercase()).collect(), max_body_bytes }
    }

    /// Returns a copy of `headers` with denied header values replaced.
    #[must_use]
    pub fn redact_headers(&self, headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                if self.deny_list.contains(&name.to_lowercase()) {
                    (name.clone(), REDACTED_PLACEHOLDER.to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }

    /// Truncates `body` to the configured byte cap, appending a marker when cut.
    #[must_use]
    pub fn truncate_body(&self, body: &str) -> String {
        if body.len() <= self.max_body_bytes {
            return body.to_string();
        }
        let mut end = self.max_body_bytes;
        while end > 0 && !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...<truncated>", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_denied_header_case_insensitively() {
        let redactor = Redactor::default();
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer secret".to_string());
        headers.insert("X-Request-Id".to_string(), "r-1".to_string());
        let redacted = redactor.redact_headers(&headers);
        assert_eq!(redacted["Authorization"], "***redacted***");
        assert_eq!(redacted["X-Request-Id"], "r-1");
    }

    #[test]
    fn truncates_oversized_body() {
        let redactor = Redactor::new(Vec::new(), 8);
        let truncated = redactor.truncate_body("0123456789");
        assert_eq!(truncated, "01234567...<truncated>");
    }

    #[test]
    fn short_body_is_unchanged() {
        let redactor = Redactor::new(Vec::new(), 8);
        assert_eq!(redactor.truncate_body("short"), "short");
    }
}
