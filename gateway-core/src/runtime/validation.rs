// gateway-core/src/runtime/validation.rs
// ============================================================================
// Module: Gateway Payload Validation
// Description: C9 step 1 — structural checks run before transform/delivery.
// Purpose: Reject malformed inbound payloads before they reach scripts or HTTP calls.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! Validation here is intentionally shallow: it checks that the payload is a
//! JSON object and that any paths an integration's mappings/lookups read from
//! are syntactically well-formed, catching configuration typos early rather
//! than failing deep inside the transform engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::IntegrationConfig;
use crate::runtime::transform::read_path;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised validating an inbound payload against an integration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The payload's top-level value is not a JSON object.
    #[error("payload must be a JSON object")]
    NotAnObject,
    /// The payload exceeded the configured maximum size in bytes.
    #[error("payload of {0} bytes exceeds the maximum of {1} bytes")]
    TooLarge(usize, usize),
    /// A mapping's source path referenced an array index out of a depth the
    /// validator is willing to traverse, indicating a malformed mapping.
    #[error("mapping source path {0:?} is malformed")]
    MalformedPath(String),
}

/// Default maximum accepted payload size, matching the bounded-snapshot size
/// used for execution-log request/response capture.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1_048_576;

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Validates inbound payloads before they enter the transform/delivery pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_payload_bytes: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl Validator {
    /// Builds a validator with an explicit size cap.
    #[must_use]
    pub const fn with_max_bytes(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    /// Validates `payload` is a well-formed object within the size cap, and
    /// that `config`'s mapping source paths resolve against it without
    /// hitting a malformed path. Missing fields are not an error here;
    /// only syntactic path problems and gross shape mismatches are.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] on shape or size violations.
    pub fn validate(&self, payload: &Value, config: &IntegrationConfig) -> Result<(), ValidationError> {
        if !payload.is_object() {
            return Err(ValidationError::NotAnObject);
        }

        let size = serde_json::to_vec(payload).map(|bytes| bytes.len()).unwrap_or(0);
        if size > self.max_payload_bytes {
            return Err(ValidationError::TooLarge(size, self.max_payload_bytes));
        }

        for action in config.effective_actions() {
            for mapping in &action.transformation.mappings {
                if mapping.source_path.is_empty() || mapping.target_path.is_empty() {
                    return Err(ValidationError::MalformedPath(mapping.source_path.clone()));
                }
                // A syntactically valid path either resolves or is simply
                // absent in this payload; both are fine here.
                let _ = read_path(payload, &mapping.source_path);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AuthSpec;
    use crate::core::DeliveryMode;
    use crate::core::Direction;
    use crate::core::IntegrationId;
    use crate::core::Mapping;
    use crate::core::RateLimitSpec;
    use crate::core::Scope;
    use crate::core::SigningSpec;
    use crate::core::TenantId;
    use crate::core::TenantScope;
    use crate::core::Transform;
    use crate::core::TransformMode;
    use crate::core::TransformSpec;
    use std::collections::BTreeSet;
    use std::collections::HashMap;

    fn config_with_mapping(source_path: &str) -> IntegrationConfig {
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
            target_url: "http://sink".to_string(),
            http_method: "POST".to_string(),
            timeout_ms: 1000,
            retry_count: 3,
            headers: HashMap::new(),
            auth: AuthSpec::None,
            inbound_auth: None,
            transformation: TransformSpec {
                mode: Some(TransformMode::Simple),
                mappings: vec![Mapping {
                    target_path: "out".to_string(),
                    source_path: source_path.to_string(),
                    transform: Transform::None,
                }],
                static_fields: Vec::new(),
                script: None,
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
            action_resume_mode: crate::core::config::ActionResumeMode::default(),
        }
    }

    #[test]
    fn rejects_non_object_payload() {
        let validator = Validator::default();
        let config = config_with_mapping("foo");
        let result = validator.validate(&serde_json::json!([1, 2, 3]), &config);
        assert_eq!(result, Err(ValidationError::NotAnObject));
    }

    #[test]
    fn rejects_oversized_payload() {
        let validator = Validator::with_max_bytes(8);
        let config = config_with_mapping("foo");
        let payload = serde_json::json!({"foo": "a value far longer than eight bytes"});
        assert!(validator.validate(&payload, &config).is_err());
    }

    #[test]
    fn rejects_empty_mapping_path() {
        let validator = Validator::default();
        let config = config_with_mapping("");
        let payload = serde_json::json!({"foo": "bar"});
        assert_eq!(
            validator.validate(&payload, &config),
            Err(ValidationError::MalformedPath(String::new()))
        );
    }

    #[test]
    fn accepts_well_formed_payload_with_missing_optional_field() {
        let validator = Validator::default();
        let config = config_with_mapping("visitId");
        let payload = serde_json::json!({"other": "value"});
        assert!(validator.validate(&payload, &config).is_ok());
    }
}
