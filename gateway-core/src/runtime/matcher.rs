// gateway-core/src/runtime/matcher.rs
// ============================================================================
// Module: Gateway Matcher
// Description: C4 — selects applicable integrations for an event.
// Purpose: Enumerate integrations honoring tenant hierarchy, event type, and condition scripts.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Tenants and integrations are addressed by id (arena+index model, per the
//! re-architecture note on cyclic/shared references); parent lookups are an
//! explicit list supplied by the config store, never a pointer. Condition
//! scripts are evaluated fail-closed: a script error denies the event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::IntegrationConfig;
use crate::core::TenantId;
use crate::interfaces::Sandbox;
use crate::interfaces::SandboxContext;
use crate::interfaces::SandboxError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while matching an event against candidate integrations.
#[derive(Debug, Error)]
pub enum MatchError {
    /// A candidate's condition script failed; the candidate is excluded
    /// rather than propagating the error (fail-closed), but callers that want
    /// to observe the failure can inspect [`Matcher::last_condition_errors`].
    #[error("condition evaluation error: {0}")]
    ConditionFailed(#[from] SandboxError),
}

// ============================================================================
// SECTION: Matcher
// ============================================================================

/// Fan-out matcher for an inbound event against a set of candidate integrations.
pub struct Matcher<'a> {
    sandbox: &'a dyn Sandbox,
}

impl<'a> Matcher<'a> {
    /// Builds a matcher using the given sandbox for condition-script evaluation.
    #[must_use]
    pub const fn new(sandbox: &'a dyn Sandbox) -> Self {
        Self { sandbox }
    }

    /// Selects all active, in-scope, event-type-matching, condition-passing
    /// integrations for an event, in stable `(createdAt, id)` order as
    /// already provided by `candidates`' ordering.
    ///
    /// `event_tenant` is the event's own tenant; `ancestors` is the ancestor
    /// chain of `event_tenant`, nearest-parent first (as returned by
    /// `ConfigStore::ancestors_of`).
    #[must_use]
    pub fn select<'c>(
        &self,
        candidates: &'c [IntegrationConfig],
        event_tenant: &TenantId,
        ancestors: &[TenantId],
        event_type: &str,
        payload: &serde_json::Value,
        context: &serde_json::Value,
    ) -> Vec<&'c IntegrationConfig> {
        candidates
            .iter()
            .filter(|config| config.is_active)
            .filter(|config| config.covers_tenant(event_tenant, ancestors))
            .filter(|config| config.matches_event_type(event_type))
            .filter(|config| self.condition_passes(config, payload, context))
            .collect()
    }

    /// Evaluates a candidate's `condition` script, if present. Fail-closed:
    /// any sandbox error is treated as a deny.
    fn condition_passes(
        &self,
        config: &IntegrationConfig,
        payload: &serde_json::Value,
        context: &serde_json::Value,
    ) -> bool {
        let Some(script) = &config.condition else {
            return true;
        };
        let ctx = SandboxContext {
            payload: payload.clone(),
            context: context.clone(),
            timeout: std::time::Duration::from_secs(1),
            lookup_tables: Vec::new(),
        };
        match self.sandbox.evaluate(script, &ctx) {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AuthSpec;
    use crate::core::Direction;
    use crate::core::DeliveryMode;
    use crate::core::IntegrationId;
    use crate::core::RateLimitSpec;
    use crate::core::Scope;
    use crate::core::SigningSpec;
    use crate::core::TenantScope;
    use crate::core::TransformMode;
    use crate::core::TransformSpec;
    use std::collections::BTreeSet;

    struct AllowAllSandbox;
    impl Sandbox for AllowAllSandbox {
        fn evaluate(&self, _script: &str, _ctx: &SandboxContext) -> Result<serde_json::Value, SandboxError> {
            Ok(serde_json::Value::Bool(true))
        }
    }

    fn config(id: &str, tenant: &str, scope: Scope, event_type: &str) -> IntegrationConfig {
        IntegrationConfig {
            id: IntegrationId::new(id),
            tenant: TenantScope {
                tenant_id: TenantId::new(tenant),
                scope,
                excluded_children: BTreeSet::new(),
            },
            name: id.to_string(),
            description: None,
            tags: Vec::new(),
            direction: Direction::Outbound,
            is_active: true,
            event_type: event_type.to_string(),
            target_url: "http://sink".to_string(),
            http_method: "POST".to_string(),
            timeout_ms: 1000,
            retry_count: 3,
            headers: std::collections::HashMap::new(),
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
            action_resume_mode: crate::core::config::ActionResumeMode::default(),
        }
    }

    #[test]
    fn matches_by_tenant_and_event_type() {
        let sandbox = AllowAllSandbox;
        let matcher = Matcher::new(&sandbox);
        let candidates = vec![
            config("a", "t1", Scope::EntityOnly, "OP_VISIT_CREATED"),
            config("b", "t1", Scope::EntityOnly, "OP_VISIT_CLOSED"),
        ];
        let selected = matcher.select(
            &candidates,
            &TenantId::new("t1"),
            &[],
            "OP_VISIT_CREATED",
            &serde_json::json!({}),
            &serde_json::json!({}),
        );
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id.as_str(), "a");
    }

    #[test]
    fn include_children_respects_exclusions() {
        let sandbox = AllowAllSandbox;
        let matcher = Matcher::new(&sandbox);
        let mut parent = config("parent-int", "parent", Scope::IncludeChildren, "*");
        parent.tenant.excluded_children.insert(TenantId::new("excluded"));
        let candidates = vec![parent];

        let included = matcher.select(
            &candidates,
            &TenantId::new("child"),
            &[TenantId::new("parent")],
            "ANY",
            &serde_json::json!({}),
            &serde_json::json!({}),
        );
        assert_eq!(included.len(), 1);

        let excluded = matcher.select(
            &candidates,
            &TenantId::new("excluded"),
            &[TenantId::new("parent")],
            "ANY",
            &serde_json::json!({}),
            &serde_json::json!({}),
        );
        assert!(excluded.is_empty());
    }
}
