// gateway-providers/src/auth.rs
// ============================================================================
// Module: Auth Provider
// Description: C7 — resolves outbound/inbound credentials and signs requests.
// Purpose: Turn an AuthSpec into request headers, caching and refreshing
//          dynamic tokens with a single-flight guard per integration.
// Dependencies: gateway-core, reqwest, base64, tokio
// ============================================================================

//! ## Overview
//! [`AuthProvider::resolve`] turns one `AuthSpec` into the headers a request
//! needs. Static kinds (`NONE`/`API_KEY`/`BEARER`/`BASIC`) are pure
//! computation. Dynamic kinds (`OAUTH2`/`CUSTOM`) first check the cached
//! token carried on the integration row; on a stale or missing cache they
//! acquire a per-integration lock before fetching, so concurrent deliveries
//! for the same integration never issue more than one token request at a
//! time. The lock guards a `watch` channel that doubles as the shared cache:
//! a waiter that acquires the lock re-checks the channel first, since the
//! previous holder may have already refreshed it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use dashmap::DashMap;
use gateway_core::core::IntegrationId;
use gateway_core::core::Timestamp;
use gateway_core::core::config::AuthSpec;
use gateway_core::core::config::CachedToken;
use gateway_core::core::config::OAuth2Grant;
use gateway_core::core::hashing::SignatureError;
use gateway_core::core::hashing::hmac_sha256_base64;
use gateway_core::core::hashing::signing_message;
use gateway_core::core::config::SigningSpec;
use gateway_core::interfaces::ConfigStore;
use gateway_core::interfaces::StoreError;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::watch;

use crate::jsonpath;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised resolving or refreshing credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint request failed at the transport level.
    #[error("token request failed: {0}")]
    Request(String),
    /// The token endpoint did not return a value at the configured path.
    #[error("token response missing field at path: {0}")]
    InvalidResponse(String),
    /// Persisting the refreshed token failed.
    #[error("failed to persist cached token: {0}")]
    Store(#[from] StoreError),
    /// HMAC signing failed (e.g. an empty secret).
    #[error("signing failed: {0}")]
    Signing(#[from] SignatureError),
}

/// One resolved request header.
pub type Header = (String, String);

/// Errors raised verifying a caller's credentials on an inbound request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InboundAuthError {
    /// The credential the spec requires was not present on the request.
    #[error("missing inbound credential")]
    MissingCredential,
    /// The presented credential did not match.
    #[error("inbound credential mismatch")]
    Mismatch,
    /// `auth.kind` is a dynamic, outbound-only flow (`OAUTH2`/`CUSTOM`).
    #[error("auth kind cannot verify an inbound caller")]
    UnsupportedForInbound,
}

fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
}

// ============================================================================
// SECTION: Auth Provider
// ============================================================================

struct TokenGuard {
    lock: Mutex<()>,
    channel: watch::Sender<Option<CachedToken>>,
}

/// Resolves `AuthSpec` into request headers, with single-flight token refresh.
pub struct AuthProvider {
    client: reqwest::Client,
    guards: DashMap<IntegrationId, Arc<TokenGuard>>,
}

impl AuthProvider {
    /// Builds a provider using the given HTTP client for token endpoint calls.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, guards: DashMap::new() }
    }

    /// Resolves `auth` into the headers one request should carry.
    ///
    /// `message_id`/`timestamp_seconds`/`body` are only used by `HMAC`. For
    /// `OAUTH2`/`CUSTOM`, a fresh token is persisted back through `store`
    /// under `integration_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if a token fetch, its response parsing, or its
    /// persistence fails.
    pub async fn resolve(
        &self,
        integration_id: &IntegrationId,
        auth: &AuthSpec,
        message_id: &str,
        timestamp_seconds: i64,
        body: &str,
        store: &dyn ConfigStore,
    ) -> Result<Vec<Header>, AuthError> {
        match auth {
            AuthSpec::None => Ok(Vec::new()),
            AuthSpec::ApiKey { header_name, api_key } => Ok(vec![(header_name.clone(), api_key.clone())]),
            AuthSpec::Bearer { token } => Ok(vec![("Authorization".to_string(), format!("Bearer {token}"))]),
            AuthSpec::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
                Ok(vec![("Authorization".to_string(), format!("Basic {encoded}"))])
            }
            AuthSpec::Hmac { signing } => self.sign(signing, message_id, timestamp_seconds, body),
            AuthSpec::OAuth2 {
                grant_type,
                token_url,
                client_id,
                client_secret,
                username,
                password,
                token_response_path,
                token_expires_in_path,
                cached_token,
                safety_margin_seconds,
                ..
            } => {
                let token = self
                    .oauth2_token(
                        integration_id,
                        *grant_type,
                        token_url,
                        client_id,
                        client_secret,
                        username.as_deref(),
                        password.as_deref(),
                        token_response_path,
                        token_expires_in_path,
                        cached_token.clone(),
                        *safety_margin_seconds,
                        store,
                    )
                    .await?;
                Ok(vec![("Authorization".to_string(), format!("Bearer {token}"))])
            }
            AuthSpec::Custom {
                token_url,
                method,
                body: request_body,
                token_response_path,
                token_expires_in_path,
                header_name,
                cached_token,
            } => {
                let token = self
                    .custom_token(
                        integration_id,
                        token_url,
                        method,
                        request_body.clone(),
                        token_response_path,
                        token_expires_in_path,
                        cached_token.clone(),
                        store,
                    )
                    .await?;
                Ok(vec![(header_name.clone(), token)])
            }
        }
    }

    /// Verifies an inbound caller's presented credentials against `auth`.
    /// Static kinds (`API_KEY`/`BEARER`/`BASIC`/`HMAC`) are checked directly
    /// against the request's headers; `OAUTH2`/`CUSTOM` are outbound-only
    /// token-acquisition flows and cannot authenticate a caller, so they are
    /// rejected rather than silently accepted.
    ///
    /// # Errors
    ///
    /// Returns [`InboundAuthError`] if the credential is missing, does not
    /// match, or `auth` is a kind that has no inbound meaning.
    pub fn verify_inbound(&self, auth: &AuthSpec, headers: &HashMap<String, String>, message_id: &str, timestamp_seconds: i64, body: &str) -> Result<(), InboundAuthError> {
        match auth {
            AuthSpec::None => Ok(()),
            AuthSpec::ApiKey { header_name, api_key } => {
                let presented = header_value(headers, header_name).ok_or(InboundAuthError::MissingCredential)?;
                if presented == api_key { Ok(()) } else { Err(InboundAuthError::Mismatch) }
            }
            AuthSpec::Bearer { token } => {
                let presented = header_value(headers, "authorization").ok_or(InboundAuthError::MissingCredential)?;
                if presented.strip_prefix("Bearer ") == Some(token.as_str()) { Ok(()) } else { Err(InboundAuthError::Mismatch) }
            }
            AuthSpec::Basic { username, password } => {
                let presented = header_value(headers, "authorization").ok_or(InboundAuthError::MissingCredential)?;
                let expected = format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}")));
                if presented == expected { Ok(()) } else { Err(InboundAuthError::Mismatch) }
            }
            AuthSpec::Hmac { signing } => {
                let presented = header_value(headers, "x-integration-signature").ok_or(InboundAuthError::MissingCredential)?;
                let expected = self.sign(signing, message_id, timestamp_seconds, body).map_err(|_| InboundAuthError::Mismatch)?;
                let expected_signature = expected.into_iter().find(|(name, _)| name == "X-Integration-Signature").map(|(_, value)| value);
                if Some(presented.to_string()) == expected_signature { Ok(()) } else { Err(InboundAuthError::Mismatch) }
            }
            AuthSpec::OAuth2 { .. } | AuthSpec::Custom { .. } => Err(InboundAuthError::UnsupportedForInbound),
        }
    }

    fn sign(&self, signing: &SigningSpec, message_id: &str, timestamp_seconds: i64, body: &str) -> Result<Vec<Header>, AuthError> {
        let message = signing_message(message_id, timestamp_seconds, body);
        let mut signatures = Vec::with_capacity(signing.secrets.len());
        for secret in &signing.secrets {
            let raw = base64::engine::general_purpose::STANDARD.decode(&secret.secret).unwrap_or_else(|_| secret.secret.clone().into_bytes());
            signatures.push(hmac_sha256_base64(&raw, &message)?);
        }
        let signature_header = signatures.iter().map(|sig| format!("v1,{sig}")).collect::<Vec<_>>().join(" ");
        Ok(vec![
            ("X-Integration-Signature".to_string(), signature_header),
            ("X-Integration-Timestamp".to_string(), timestamp_seconds.to_string()),
            ("X-Integration-Id".to_string(), message_id.to_string()),
        ])
    }

    fn guard_for(&self, id: &IntegrationId, seed: Option<CachedToken>) -> Arc<TokenGuard> {
        Arc::clone(
            self.guards
                .entry(id.clone())
                .or_insert_with(|| {
                    let (sender, _receiver) = watch::channel(seed);
                    Arc::new(TokenGuard { lock: Mutex::new(()), channel: sender })
                })
                .value(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    async fn oauth2_token(
        &self,
        id: &IntegrationId,
        grant_type: OAuth2Grant,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        username: Option<&str>,
        password: Option<&str>,
        response_path: &str,
        expires_in_path: &str,
        seed: Option<CachedToken>,
        safety_margin_seconds: i64,
        store: &dyn ConfigStore,
    ) -> Result<String, AuthError> {
        let guard = self.guard_for(id, seed);
        if let Some(token) = fresh_token(&guard.channel.borrow(), safety_margin_seconds) {
            return Ok(token);
        }
        let _held = guard.lock.lock().await;
        if let Some(token) = fresh_token(&guard.channel.borrow(), safety_margin_seconds) {
            return Ok(token);
        }

        let mut form = vec![("client_id", client_id.to_string()), ("client_secret", client_secret.to_string())];
        match grant_type {
            OAuth2Grant::ClientCredentials => form.push(("grant_type", "client_credentials".to_string())),
            OAuth2Grant::Password => {
                form.push(("grant_type", "password".to_string()));
                form.push(("username", username.unwrap_or_default().to_string()));
                form.push(("password", password.unwrap_or_default().to_string()));
            }
        }
        let response = self
            .client
            .post(token_url)
            .form(&form)
            .send()
            .await
            .map_err(|err| AuthError::Request(err.to_string()))?
            .json::<serde_json::Value>()
            .await
            .map_err(|err| AuthError::Request(err.to_string()))?;

        let token = self.cache_token(id, &response, response_path, expires_in_path, store, &guard).await?;
        Ok(token)
    }

    #[allow(clippy::too_many_arguments)]
    async fn custom_token(
        &self,
        id: &IntegrationId,
        token_url: &str,
        method: &str,
        body: Option<serde_json::Value>,
        response_path: &str,
        expires_in_path: &str,
        seed: Option<CachedToken>,
        store: &dyn ConfigStore,
    ) -> Result<String, AuthError> {
        let guard = self.guard_for(id, seed);
        if let Some(token) = fresh_token(&guard.channel.borrow(), DEFAULT_SAFETY_MARGIN_SECONDS) {
            return Ok(token);
        }
        let _held = guard.lock.lock().await;
        if let Some(token) = fresh_token(&guard.channel.borrow(), DEFAULT_SAFETY_MARGIN_SECONDS) {
            return Ok(token);
        }

        let method = reqwest::Method::from_bytes(method.as_bytes()).unwrap_or(reqwest::Method::POST);
        let mut request = self.client.request(method, token_url);
        if let Some(payload) = &body {
            request = request.json(payload);
        }
        let response = request
            .send()
            .await
            .map_err(|err| AuthError::Request(err.to_string()))?
            .json::<serde_json::Value>()
            .await
            .map_err(|err| AuthError::Request(err.to_string()))?;

        let token = self.cache_token(id, &response, response_path, expires_in_path, store, &guard).await?;
        Ok(token)
    }

    async fn cache_token(
        &self,
        id: &IntegrationId,
        response: &serde_json::Value,
        response_path: &str,
        expires_in_path: &str,
        store: &dyn ConfigStore,
        guard: &TokenGuard,
    ) -> Result<String, AuthError> {
        let token = jsonpath::resolve_as_string(response, response_path).ok_or_else(|| AuthError::InvalidResponse(response_path.to_string()))?;
        let expires_in = jsonpath::resolve_as_i64(response, expires_in_path).unwrap_or(DEFAULT_TOKEN_LIFETIME_SECONDS);
        let now = Timestamp::now();
        let cached = CachedToken {
            token: token.clone(),
            expires_at_millis: now.as_millis() + expires_in * 1000,
            last_fetched_millis: now.as_millis(),
        };
        let patch = serde_json::to_value(Some(cached.clone())).map_err(|err| AuthError::InvalidResponse(err.to_string()))?;
        store.update_token_cache(id, patch).await?;
        let _ = guard.channel.send(Some(cached));
        Ok(token)
    }
}

const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 3600;
const DEFAULT_SAFETY_MARGIN_SECONDS: i64 = 300;

fn fresh_token(cached: &Option<CachedToken>, safety_margin_seconds: i64) -> Option<String> {
    let token = cached.as_ref()?;
    let now = Timestamp::now().as_millis();
    if token.expires_at_millis - safety_margin_seconds * 1000 > now {
        Some(token.token.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::core::config::SigningSecret;
    use gateway_core::runtime::store::InMemoryConfigStore;

    fn provider() -> AuthProvider {
        AuthProvider::new(reqwest::Client::new())
    }

    #[tokio::test]
    async fn api_key_resolves_static_header() {
        let auth = AuthSpec::ApiKey { header_name: "X-Api-Key".to_string(), api_key: "secret".to_string() };
        let store = InMemoryConfigStore::default();
        let headers = provider().resolve(&IntegrationId::new("i1"), &auth, "m1", 0, "{}", &store).await.expect("resolve");
        assert_eq!(headers, vec![("X-Api-Key".to_string(), "secret".to_string())]);
    }

    #[tokio::test]
    async fn basic_auth_base64_encodes_credentials() {
        let auth = AuthSpec::Basic { username: "u".to_string(), password: "p".to_string() };
        let store = InMemoryConfigStore::default();
        let headers = provider().resolve(&IntegrationId::new("i1"), &auth, "m1", 0, "{}", &store).await.expect("resolve");
        assert_eq!(headers[0].0, "Authorization");
        assert!(headers[0].1.starts_with("Basic "));
    }

    #[tokio::test]
    async fn hmac_signs_and_emits_headers() {
        let auth = AuthSpec::Hmac {
            signing: SigningSpec {
                enabled: true,
                secrets: vec![SigningSecret { id: "s1".to_string(), secret: "c2VjcmV0".to_string(), primary: true, created_at_millis: 0 }],
            },
        };
        let store = InMemoryConfigStore::default();
        let headers = provider().resolve(&IntegrationId::new("i1"), &auth, "m1", 1_700_000_000, "{}", &store).await.expect("resolve");
        let names: Vec<&str> = headers.iter().map(|(name, _)| name.as_str()).collect();
        assert!(names.contains(&"X-Integration-Signature"));
        assert!(names.contains(&"X-Integration-Timestamp"));
    }

    #[test]
    fn verify_inbound_accepts_a_matching_api_key() {
        let auth = AuthSpec::ApiKey { header_name: "X-Api-Key".to_string(), api_key: "secret".to_string() };
        let mut headers = std::collections::HashMap::new();
        headers.insert("x-api-key".to_string(), "secret".to_string());
        assert_eq!(provider().verify_inbound(&auth, &headers, "m1", 0, "{}"), Ok(()));
    }

    #[test]
    fn verify_inbound_rejects_a_mismatched_api_key() {
        let auth = AuthSpec::ApiKey { header_name: "X-Api-Key".to_string(), api_key: "secret".to_string() };
        let mut headers = std::collections::HashMap::new();
        headers.insert("X-Api-Key".to_string(), "wrong".to_string());
        assert_eq!(provider().verify_inbound(&auth, &headers, "m1", 0, "{}"), Err(InboundAuthError::Mismatch));
    }

    #[test]
    fn verify_inbound_rejects_oauth2() {
        let auth = AuthSpec::OAuth2 {
            grant_type: OAuth2Grant::ClientCredentials,
            token_url: "https://example.invalid/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            username: None,
            password: None,
            token_response_path: "access_token".to_string(),
            token_expires_in_path: "expires_in".to_string(),
            cached_token: None,
            safety_margin_seconds: 300,
            expiration_detection: None,
        };
        assert_eq!(provider().verify_inbound(&auth, &std::collections::HashMap::new(), "m1", 0, "{}"), Err(InboundAuthError::UnsupportedForInbound));
    }

    #[test]
    fn fresh_token_respects_safety_margin() {
        let token = CachedToken { token: "tok".to_string(), expires_at_millis: Timestamp::now().as_millis() + 10_000, last_fetched_millis: 0 };
        assert_eq!(fresh_token(&Some(token.clone()), 0), Some("tok".to_string()));
        assert_eq!(fresh_token(&Some(token), 300), None);
    }
}
