// gateway-providers/src/http.rs
// ============================================================================
// Module: Outbound HTTP Client
// Description: Shared reqwest client and SSRF-aware target validation.
// Purpose: Give C9 delivery and the inbound proxy's outbound leg a single,
//          policy-enforcing way to reach external targets.
// Dependencies: reqwest, url
// ============================================================================

//! ## Overview
//! `TargetPolicy` validates a `targetUrl` before any request is sent:
//! scheme, host allow/deny lists, and private/link-local address ranges
//! (SSRF). Redirects are disabled by default so a validated target cannot be
//! silently swapped for one that would have failed validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::net::ToSocketAddrs;
use std::time::Duration;

use thiserror::Error;
use url::Host;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised validating or building an outbound HTTP target.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The URL could not be parsed.
    #[error("invalid target url: {0}")]
    InvalidUrl(String),
    /// The scheme is not allowed (only `https`, or `http` when explicitly enabled).
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
    /// The host is explicitly denied, or not in the configured allowlist.
    #[error("target host rejected by policy: {0}")]
    HostRejected(String),
    /// The host resolves to a private, loopback, or link-local address.
    #[error("target host resolves to a disallowed address range: {0}")]
    PrivateNetwork(String),
    /// DNS resolution failed.
    #[error("dns lookup failed: {0}")]
    DnsLookup(String),
}

// ============================================================================
// SECTION: Target Policy
// ============================================================================

/// Host allow/deny policy enforced on every outbound HTTP target.
#[derive(Debug, Clone, Default)]
pub struct TargetPolicy {
    allow_http: bool,
    allowlist: Option<Vec<HostPattern>>,
    denylist: Vec<HostPattern>,
    allow_private_networks: bool,
}

impl TargetPolicy {
    /// Default policy: `https` only, public networks only, no allowlist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Permits plain `http` targets in addition to `https`.
    #[must_use]
    pub const fn allow_http(mut self) -> Self {
        self.allow_http = true;
        self
    }

    /// Restricts targets to the given hosts (exact match or `*.suffix`).
    #[must_use]
    pub fn allow_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowlist = Some(parse_patterns(hosts));
        self
    }

    /// Explicitly denies the given hosts, checked before the allowlist.
    #[must_use]
    pub fn deny_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.denylist = parse_patterns(hosts);
        self
    }

    /// Permits targets that resolve to private/link-local/loopback ranges.
    /// Intended only for test fixtures against a local mock server.
    #[must_use]
    pub const fn allow_private_networks(mut self) -> Self {
        self.allow_private_networks = true;
        self
    }

    /// Validates `url` against this policy.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError`] when the scheme, host, or resolved address
    /// range is disallowed.
    pub fn validate(&self, url: &Url) -> Result<(), TargetError> {
        match url.scheme() {
            "https" => {}
            "http" if self.allow_http => {}
            other => return Err(TargetError::UnsupportedScheme(other.to_string())),
        }
        let host = url.host().ok_or_else(|| TargetError::HostRejected("missing host".to_string()))?;
        let label = normalize_host_label(&host);
        if self.denylist.iter().any(|pattern| pattern.matches(&label)) {
            return Err(TargetError::HostRejected(label));
        }
        if let Some(allowlist) = &self.allowlist
            && !allowlist.iter().any(|pattern| pattern.matches(&label))
        {
            return Err(TargetError::HostRejected(label));
        }
        if !self.allow_private_networks {
            let ips = resolve_ips(&host, url)?;
            if ips.iter().any(is_private_or_link_local) {
                return Err(TargetError::PrivateNetwork(label));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum HostPattern {
    Exact(String),
    WildcardSuffix(String),
}

impl HostPattern {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let normalized = trimmed.trim_end_matches('.').to_ascii_lowercase();
        if let Some(suffix) = normalized.strip_prefix("*.") {
            if suffix.is_empty() {
                return None;
            }
            return Some(Self::WildcardSuffix(suffix.to_string()));
        }
        Some(Self::Exact(normalized))
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(value) => host == value,
            Self::WildcardSuffix(suffix) => {
                if host.len() <= suffix.len() || !host.ends_with(suffix.as_str()) {
                    return false;
                }
                let boundary = host.len() - suffix.len() - 1;
                host.as_bytes().get(boundary) == Some(&b'.')
            }
        }
    }
}

fn parse_patterns<I, S>(hosts: I) -> Vec<HostPattern>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    hosts.into_iter().filter_map(|host| HostPattern::parse(host.as_ref())).collect()
}

fn normalize_host_label(host: &Host<&str>) -> String {
    match host {
        Host::Domain(domain) => domain.trim_end_matches('.').to_ascii_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    }
}

fn resolve_ips(host: &Host<&str>, url: &Url) -> Result<Vec<IpAddr>, TargetError> {
    match host {
        Host::Ipv4(ip) => Ok(vec![IpAddr::V4(*ip)]),
        Host::Ipv6(ip) => Ok(vec![IpAddr::V6(*ip)]),
        Host::Domain(domain) => {
            let port = url.port_or_known_default().ok_or_else(|| TargetError::DnsLookup("missing port".to_string()))?;
            (*domain, port)
                .to_socket_addrs()
                .map(|iter| iter.map(|addr| addr.ip()).collect())
                .map_err(|err| TargetError::DnsLookup(err.to_string()))
        }
    }
}

const fn is_private_or_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
                || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            addr.is_loopback() || addr.is_unique_local() || addr.is_unicast_link_local() || addr.is_unspecified() || addr.is_multicast()
        }
    }
}

// ============================================================================
// SECTION: Client Builder
// ============================================================================

/// Builds the shared outbound `reqwest::Client` used by the delivery engine
/// and the inbound proxy's outbound leg. Redirects are disabled: a
/// redirected response is a different, unvalidated target.
///
/// # Errors
///
/// Returns [`TargetError`] wrapped as a build failure if the TLS backend or
/// connector cannot initialize.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, TargetError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|err| TargetError::InvalidUrl(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_plain_http_by_default() {
        let policy = TargetPolicy::new();
        let url = Url::parse("http://example.com").expect("url");
        assert!(matches!(policy.validate(&url), Err(TargetError::UnsupportedScheme(_))));
    }

    #[test]
    fn allows_http_when_enabled() {
        let policy = TargetPolicy::new().allow_http().allow_private_networks();
        let url = Url::parse("http://127.0.0.1:8080").expect("url");
        assert!(policy.validate(&url).is_ok());
    }

    #[test]
    fn rejects_private_network_by_default() {
        let policy = TargetPolicy::new().allow_http();
        let url = Url::parse("http://127.0.0.1:8080").expect("url");
        assert!(matches!(policy.validate(&url), Err(TargetError::PrivateNetwork(_))));
    }

    #[test]
    fn denylist_overrides_allowlist() {
        let policy = TargetPolicy::new().allow_hosts(["example.com"]).deny_hosts(["example.com"]);
        let url = Url::parse("https://example.com").expect("url");
        assert!(matches!(policy.validate(&url), Err(TargetError::HostRejected(_))));
    }

    #[test]
    fn wildcard_allowlist_matches_subdomain() {
        let policy = TargetPolicy::new().allow_hosts(["*.example.com"]).allow_private_networks();
        let url = Url::parse("https://api.example.com").expect("url");
        assert!(policy.validate(&url).is_ok());
    }

    #[test]
    fn allowlist_rejects_unlisted_host() {
        let policy = TargetPolicy::new().allow_hosts(["example.com"]);
        let url = Url::parse("https://evil.com").expect("url");
        assert!(matches!(policy.validate(&url), Err(TargetError::HostRejected(_))));
    }
}
