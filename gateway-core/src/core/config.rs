// gateway-core/src/core/config.rs
// ============================================================================
// Module: Gateway Integration Configuration
// Description: The IntegrationConfig aggregate and its nested specifications.
// Purpose: Define the canonical, validated shape of a persisted integration.
// Dependencies: crate::core::{hashing, identifiers}, serde, serde_json
// ============================================================================

//! ## Overview
//! `IntegrationConfig` is the one configuration object every other component
//! reads: the matcher selects by tenant/event type, the transform engine
//! reads `transformation`/`lookups`, the auth provider reads `auth`, the
//! delivery engine reads `targetUrl`/`retryCount`/`rateLimits`/`actions`.
//! Validation enforces the invariants from the data model (exactly one of
//! `actions` or legacy single-action fields, `inboundAuth` required for
//! `INBOUND`, at most one primary signing secret, bounded secret count).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashAlgorithm;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::identifiers::IntegrationId;
use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: Integration Configuration
// ============================================================================

/// Direction an integration operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// The gateway pushes events to an external target.
    Outbound,
    /// The gateway receives calls on behalf of an external caller.
    Inbound,
    /// The gateway fires on a wall-clock schedule rather than an event.
    Scheduled,
}

/// Backing store a scheduled integration's `fetch_query` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FetchSource {
    /// A relational query, run against the configured SQL connection.
    Sql,
    /// A MongoDB query document.
    Mongo,
    /// An HTTP GET against an upstream API.
    Api,
}

/// A templated query a scheduled delivery runs as its `fetch_data` step,
/// before the result is handed to the transform stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchQuerySpec {
    /// Backing store the query targets.
    pub source: FetchSource,
    /// Query text, containing `{{config.*}}`/`{{date.*}}`/`{{env.*}}` tokens.
    pub query: String,
}

/// Tenant scope governing how an integration applies to descendant tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    /// Applies only to the owning tenant.
    EntityOnly,
    /// Applies to the owning tenant and all descendants, except `excludedChildren`.
    IncludeChildren,
}

/// Delivery scheduling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryMode {
    /// Delivered as soon as the event is matched.
    Immediate,
    /// Delivered once at a computed future instant.
    Delayed,
    /// Delivered repeatedly on a computed interval.
    Recurring,
}

/// Ownership scope of an integration within the tenant hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantScope {
    /// Tenant that owns the integration.
    pub tenant_id: TenantId,
    /// Scope of applicability.
    pub scope: Scope,
    /// Descendant tenants excluded from an `IncludeChildren` scope.
    pub excluded_children: BTreeSet<TenantId>,
}

/// Unary transform applied to a mapped field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Transform {
    /// No transform; value is copied as-is.
    None,
    /// Trims leading/trailing whitespace from a string value.
    Trim,
    /// Uppercases a string value.
    Upper,
    /// Lowercases a string value.
    Lower,
    /// Parses and re-renders a date value as ISO-8601.
    DateIso,
    /// Substitutes a static value when the source is null or empty.
    Default {
        /// The substituted value.
        value: serde_json::Value,
    },
    /// Resolves the value through a named lookup table.
    Lookup {
        /// Lookup table type/category.
        lookup_type: String,
    },
}

/// One declarative field mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Destination path in the output document.
    pub target_path: String,
    /// Source path in the input document.
    pub source_path: String,
    /// Unary transform applied after extraction.
    pub transform: Transform,
}

/// A static key/value pair written into the output document regardless of input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticField {
    /// Destination path in the output document.
    pub key: String,
    /// Literal value written at `key`.
    pub value: serde_json::Value,
}

/// A post-transform lookup pass applied to a `SIMPLE`-mode output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSpec {
    /// Path read from the (already transformed) output document.
    pub source_field: String,
    /// Path written with the resolved value.
    pub target_field: String,
    /// Lookup table type/category.
    pub lookup_type: String,
}

/// Transform engine mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformMode {
    /// Output equals input, unmodified.
    Passthrough,
    /// Declarative mapping list + static fields.
    Simple,
    /// User-authored sandboxed script.
    Script,
}

/// Full transformation specification for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransformSpec {
    /// Which engine mode processes the payload.
    pub mode: Option<TransformMode>,
    /// Mapping list used when `mode = SIMPLE`.
    pub mappings: Vec<Mapping>,
    /// Static fields applied when `mode = SIMPLE`.
    pub static_fields: Vec<StaticField>,
    /// Script source used when `mode = SCRIPT`.
    pub script: Option<String>,
}

impl TransformSpec {
    /// Returns the effective mode, defaulting to `PASSTHROUGH` when unset.
    #[must_use]
    pub fn effective_mode(&self) -> TransformMode {
        self.mode.unwrap_or(TransformMode::Passthrough)
    }
}

/// Outbound or inbound credential resolution strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthSpec {
    /// No authentication.
    None,
    /// A static header carrying an API key.
    ApiKey {
        /// Header name the key is sent under.
        header_name: String,
        /// The API key value.
        api_key: String,
    },
    /// `Authorization: Bearer <token>` using a static token.
    Bearer {
        /// The bearer token value.
        token: String,
    },
    /// `Authorization: Basic base64(user:pass)`.
    Basic {
        /// Basic-auth username.
        username: String,
        /// Basic-auth password.
        password: String,
    },
    /// OAuth2 client-credentials or password grant with token caching.
    OAuth2 {
        /// Grant type.
        grant_type: OAuth2Grant,
        /// Token endpoint URL.
        token_url: String,
        /// Client identifier.
        client_id: String,
        /// Client secret.
        client_secret: String,
        /// Resource-owner username, required for the password grant.
        username: Option<String>,
        /// Resource-owner password, required for the password grant.
        password: Option<String>,
        /// JSON path within the token response body yielding the access token.
        token_response_path: String,
        /// JSON path within the token response body yielding the token lifetime (seconds).
        token_expires_in_path: String,
        /// Cached token, bypassing the read-mostly config cache.
        #[serde(default)]
        cached_token: Option<CachedToken>,
        /// Safety margin subtracted from `expiresAt` before the token is considered stale.
        #[serde(default = "default_safety_margin_seconds")]
        safety_margin_seconds: i64,
        /// Token-expiration detection configuration.
        #[serde(default)]
        expiration_detection: Option<TokenExpirationDetection>,
    },
    /// Fully configurable credential flow: custom request, custom response extraction.
    Custom {
        /// Token endpoint URL.
        token_url: String,
        /// HTTP method used to request a token.
        method: String,
        /// Request body template.
        body: Option<serde_json::Value>,
        /// JSON path within the token response body yielding the access token.
        token_response_path: String,
        /// JSON path within the token response body yielding the token lifetime (seconds).
        token_expires_in_path: String,
        /// Destination header for the resolved token, defaults to `Authorization`.
        #[serde(default = "default_auth_header")]
        header_name: String,
        /// Cached token, bypassing the read-mostly config cache.
        #[serde(default)]
        cached_token: Option<CachedToken>,
    },
    /// Outbound HMAC request signing.
    Hmac {
        /// Active signing configuration.
        signing: SigningSpec,
    },
}

fn default_safety_margin_seconds() -> i64 {
    300
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

/// OAuth2 grant type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuth2Grant {
    /// `client_credentials` grant.
    ClientCredentials,
    /// `password` grant.
    Password,
}

/// A cached bearer/OAuth2 token, persisted on the integration row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    /// The cached token value.
    pub token: String,
    /// Unix-millis expiration instant.
    pub expires_at_millis: i64,
    /// Unix-millis instant the token was last fetched.
    pub last_fetched_millis: i64,
}

/// Token-expiration detection from response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenExpirationDetection {
    /// Whether detection is enabled.
    pub enabled: bool,
    /// JSON path read from the response body.
    pub response_path: String,
    /// Values (case-insensitive substring match) that indicate expiration.
    pub expired_values: Vec<String>,
}

/// One signing secret, part of a rotation set of at most three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningSecret {
    /// Opaque identifier for the secret (for audit/rotation bookkeeping).
    pub id: String,
    /// Secret bytes, base64-encoded on the wire.
    pub secret: String,
    /// Whether this is the primary (most-recently-created) secret.
    pub primary: bool,
    /// Unix-millis creation instant.
    pub created_at_millis: i64,
}

/// Outbound signing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SigningSpec {
    /// Whether signing is enabled.
    pub enabled: bool,
    /// Active secrets, at most three, at most one marked primary.
    pub secrets: Vec<SigningSecret>,
}

/// Sliding-window rate-limit configuration for one integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSpec {
    /// Whether rate limiting is enforced.
    pub enabled: bool,
    /// Maximum requests allowed per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_seconds: u32,
}

/// One step in a multi-action delivery chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Stable identifier for this action within its integration.
    pub id: String,
    /// Target URL for this action.
    pub target_url: String,
    /// HTTP method for this action.
    pub http_method: String,
    /// Per-action request timeout.
    pub timeout_ms: u64,
    /// Per-action static headers.
    pub headers: HashMap<String, String>,
    /// Per-action transform.
    pub transformation: TransformSpec,
    /// Per-action auth resolution, falling back to the integration's `auth` when absent.
    pub auth: Option<AuthSpec>,
    /// Optional condition script evaluated against the prior action's output.
    pub condition: Option<String>,
}

/// Resume policy applied after a mid-chain multi-action failure, per Open Question #1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionResumeMode {
    /// Resume from the failed action; earlier successful actions do not re-execute.
    #[default]
    ResumeFromFailure,
    /// Restart the entire chain from the first action.
    RestartChain,
}

/// Canonical integration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Integration identifier.
    pub id: IntegrationId,
    /// Owning tenant, scope, and exclusion set.
    pub tenant: TenantScope,
    /// Operator-facing name.
    pub name: String,
    /// Operator-facing description.
    #[serde(default)]
    pub description: Option<String>,
    /// Operator-facing free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Direction this integration operates in.
    pub direction: Direction,
    /// Whether the integration is currently active.
    pub is_active: bool,
    /// Event type this integration matches, or `"*"` for all types.
    pub event_type: String,
    /// Default target URL, used when `actions` is absent.
    pub target_url: String,
    /// Default HTTP method, used when `actions` is absent.
    pub http_method: String,
    /// Default request timeout, used when `actions` is absent.
    pub timeout_ms: u64,
    /// Maximum retry attempts before a failed delivery is abandoned.
    pub retry_count: u32,
    /// Default static headers, used when `actions` is absent.
    pub headers: HashMap<String, String>,
    /// Outbound credential resolution.
    pub auth: AuthSpec,
    /// Inbound credential resolution, required when `direction = INBOUND`.
    pub inbound_auth: Option<AuthSpec>,
    /// Default transformation, used when `actions` is absent.
    pub transformation: TransformSpec,
    /// Post-transform lookup passes.
    pub lookups: Vec<LookupSpec>,
    /// Optional fan-out condition script.
    pub condition: Option<String>,
    /// Rate-limit configuration.
    pub rate_limits: RateLimitSpec,
    /// Outbound signing configuration.
    pub signing: SigningSpec,
    /// Delivery scheduling mode.
    pub delivery_mode: DeliveryMode,
    /// Scheduling script, required when `delivery_mode != IMMEDIATE`.
    pub scheduling_script: Option<String>,
    /// `fetch_data` query run at fire time for a `SCHEDULED` integration,
    /// absent for event-triggered integrations.
    #[serde(default)]
    pub fetch_query: Option<FetchQuerySpec>,
    /// Multi-action chain; when present, takes precedence over the legacy
    /// single-action fields (`target_url`, `http_method`, `transformation`, `auth`).
    pub actions: Option<Vec<Action>>,
    /// Delay, in milliseconds, inserted between successive actions.
    #[serde(default)]
    pub multi_action_delay_ms: Option<u64>,
    /// Resume policy for multi-action chains.
    #[serde(default)]
    pub action_resume_mode: ActionResumeMode,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validation errors for an [`IntegrationConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `direction = INBOUND` but `inboundAuth` is absent.
    #[error("integration {0} has direction=INBOUND but no inboundAuth")]
    MissingInboundAuth(String),
    /// `delivery_mode != IMMEDIATE` but `scheduling_script` is absent.
    #[error("integration {0} has delivery_mode != IMMEDIATE but no schedulingScript")]
    MissingSchedulingScript(String),
    /// More than three signing secrets were configured.
    #[error("integration {0} has {1} signing secrets, the maximum is 3")]
    TooManySigningSecrets(String, usize),
    /// More than one signing secret was marked primary.
    #[error("integration {0} has more than one primary signing secret")]
    MultiplePrimarySecrets(String),
    /// `actions` was present but empty.
    #[error("integration {0} has an empty actions list")]
    EmptyActions(String),
}

impl IntegrationConfig {
    /// Validates the cross-field invariants documented on the data model.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invariant violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.direction, Direction::Inbound) && self.inbound_auth.is_none() {
            return Err(ConfigError::MissingInboundAuth(self.id.to_string()));
        }
        if !matches!(self.delivery_mode, DeliveryMode::Immediate) && self.scheduling_script.is_none()
        {
            return Err(ConfigError::MissingSchedulingScript(self.id.to_string()));
        }
        if self.signing.secrets.len() > 3 {
            return Err(ConfigError::TooManySigningSecrets(
                self.id.to_string(),
                self.signing.secrets.len(),
            ));
        }
        if self.signing.secrets.iter().filter(|s| s.primary).count() > 1 {
            return Err(ConfigError::MultiplePrimarySecrets(self.id.to_string()));
        }
        if let Some(actions) = &self.actions {
            if actions.is_empty() {
                return Err(ConfigError::EmptyActions(self.id.to_string()));
            }
        }
        Ok(())
    }

    /// Returns the effective per-attempt action list: `actions` when present,
    /// otherwise a single synthetic action built from the legacy fields.
    #[must_use]
    pub fn effective_actions(&self) -> Vec<Action> {
        if let Some(actions) = &self.actions {
            return actions.clone();
        }
        vec![Action {
            id: "default".to_string(),
            target_url: self.target_url.clone(),
            http_method: self.http_method.clone(),
            timeout_ms: self.timeout_ms,
            headers: self.headers.clone(),
            transformation: self.transformation.clone(),
            auth: Some(self.auth.clone()),
            condition: None,
        }]
    }

    /// Computes the canonical hash of the configuration using the default algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Canonicalization`] when serialization fails.
    pub fn canonical_hash(&self) -> Result<HashDigest, HashError> {
        crate::core::hashing::hash_canonical_json(DEFAULT_HASH_ALGORITHM, self)
    }

    /// Computes the canonical hash using a specific algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Canonicalization`] when serialization fails.
    pub fn canonical_hash_with(&self, algorithm: HashAlgorithm) -> Result<HashDigest, HashError> {
        crate::core::hashing::hash_canonical_json(algorithm, self)
    }

    /// Returns whether `candidate` is in scope for this integration's tenant
    /// hierarchy rule (does not check event type or condition).
    #[must_use]
    pub fn covers_tenant(&self, candidate: &TenantId, ancestors_of_candidate: &[TenantId]) -> bool {
        if &self.tenant.tenant_id == candidate {
            return true;
        }
        match self.tenant.scope {
            Scope::EntityOnly => false,
            Scope::IncludeChildren => {
                ancestors_of_candidate.contains(&self.tenant.tenant_id)
                    && !self.tenant.excluded_children.contains(candidate)
            }
        }
    }

    /// Returns whether this integration matches the given event type
    /// (literal equality, or a configured wildcard `"*"`).
    #[must_use]
    pub fn matches_event_type(&self, event_type: &str) -> bool {
        self.event_type == "*" || self.event_type == event_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> IntegrationConfig {
        IntegrationConfig {
            id: IntegrationId::new("int-1"),
            tenant: TenantScope {
                tenant_id: TenantId::new("t1"),
                scope: Scope::EntityOnly,
                excluded_children: BTreeSet::new(),
            },
            name: "test".to_string(),
            description: None,
            tags: Vec::new(),
            direction: Direction::Outbound,
            is_active: true,
            event_type: "OP_VISIT_CREATED".to_string(),
            target_url: "http://sink/ok".to_string(),
            http_method: "POST".to_string(),
            timeout_ms: 5000,
            retry_count: 3,
            headers: HashMap::new(),
            auth: AuthSpec::None,
            inbound_auth: None,
            transformation: TransformSpec {
                mode: Some(TransformMode::Passthrough),
                ..Default::default()
            },
            lookups: Vec::new(),
            condition: None,
            rate_limits: RateLimitSpec {
                enabled: false,
                max_requests: 0,
                window_seconds: 0,
            },
            signing: SigningSpec::default(),
            delivery_mode: DeliveryMode::Immediate,
            scheduling_script: None,
            fetch_query: None,
            actions: None,
            multi_action_delay_ms: None,
            action_resume_mode: ActionResumeMode::default(),
        }
    }

    #[test]
    fn inbound_requires_inbound_auth() {
        let mut config = base_config();
        config.direction = Direction::Inbound;
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingInboundAuth("int-1".to_string()))
        );
    }

    #[test]
    fn delayed_requires_scheduling_script() {
        let mut config = base_config();
        config.delivery_mode = DeliveryMode::Delayed;
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingSchedulingScript("int-1".to_string()))
        );
    }

    #[test]
    fn covers_tenant_respects_exclusions() {
        let mut config = base_config();
        config.tenant.scope = Scope::IncludeChildren;
        config.tenant.excluded_children.insert(TenantId::new("child-2"));

        let child1 = TenantId::new("child-1");
        let child2 = TenantId::new("child-2");
        let ancestors = vec![TenantId::new("t1")];

        assert!(config.covers_tenant(&child1, &ancestors));
        assert!(!config.covers_tenant(&child2, &ancestors));
    }

    #[test]
    fn effective_actions_falls_back_to_legacy_fields() {
        let config = base_config();
        let actions = config.effective_actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].target_url, "http://sink/ok");
    }
}
