// gateway-delivery/src/test_support.rs
// ============================================================================
// Module: Test Fixtures
// Description: Shared integration-config builders and a no-op sandbox for
//              worker unit tests.
// Purpose: Avoid repeating the same IntegrationConfig literal in every test
//          module.
// Dependencies: gateway-core
// ============================================================================

#![cfg(test)]

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::core::AuthSpec;
use gateway_core::core::Direction;
use gateway_core::core::DeliveryMode;
use gateway_core::core::IntegrationConfig;
use gateway_core::core::IntegrationId;
use gateway_core::core::RateLimitSpec;
use gateway_core::core::Scope;
use gateway_core::core::SigningSpec;
use gateway_core::core::TenantId;
use gateway_core::core::TenantScope;
use gateway_core::core::TransformMode;
use gateway_core::core::TransformSpec;
use gateway_core::interfaces::Sandbox;
use gateway_core::interfaces::SandboxContext;
use gateway_core::interfaces::SandboxError;
use gateway_providers::AuthProvider;
use gateway_providers::RateLimiter;
use gateway_providers::TargetPolicy;

use crate::metrics::CountingMetrics;
use crate::pipeline::DeliveryEngine;

/// A sandbox that evaluates every condition/script as `true`/passthrough.
pub struct AllowAllSandbox;

impl Sandbox for AllowAllSandbox {
    fn evaluate(&self, _script: &str, _ctx: &SandboxContext) -> Result<serde_json::Value, SandboxError> {
        Ok(serde_json::Value::Bool(true))
    }
}

/// Builds a minimal, active, passthrough outbound integration targeting `url`.
pub fn config(id: &str, tenant: &str, event_type: &str, url: &str) -> IntegrationConfig {
    IntegrationConfig {
        id: IntegrationId::new(id),
        tenant: TenantScope { tenant_id: TenantId::new(tenant), scope: Scope::EntityOnly, excluded_children: BTreeSet::new() },
        name: id.to_string(),
        description: None,
        tags: Vec::new(),
        direction: Direction::Outbound,
        is_active: true,
        event_type: event_type.to_string(),
        target_url: url.to_string(),
        http_method: "POST".to_string(),
        timeout_ms: 2000,
        retry_count: 3,
        headers: HashMap::new(),
        auth: AuthSpec::None,
        inbound_auth: None,
        transformation: TransformSpec { mode: Some(TransformMode::Passthrough), ..Default::default() },
        lookups: Vec::new(),
        condition: None,
        rate_limits: RateLimitSpec { enabled: false, max_requests: 0, window_seconds: 0 },
        signing: SigningSpec::default(),
        delivery_mode: DeliveryMode::Immediate,
        scheduling_script: None,
        fetch_query: None,
        actions: None,
        multi_action_delay_ms: None,
        action_resume_mode: gateway_core::core::config::ActionResumeMode::default(),
    }
}

/// Builds a [`DeliveryEngine`] over fresh in-memory stores and an
/// [`AllowAllSandbox`], suitable for tests that drive real HTTP requests
/// against a local test server.
pub fn engine(
    config_store: Arc<dyn gateway_core::interfaces::ConfigStore>,
    log_store: Arc<dyn gateway_core::interfaces::ExecutionLogStore>,
    dlq_store: Arc<dyn gateway_core::interfaces::DlqStore>,
) -> DeliveryEngine {
    let client = gateway_providers::build_client(std::time::Duration::from_secs(5)).expect("build http client");
    DeliveryEngine::new(
        config_store,
        log_store,
        dlq_store,
        Arc::new(AllowAllSandbox),
        Arc::new(AuthProvider::new(client.clone())),
        Arc::new(RateLimiter::new()),
        client,
        TargetPolicy::new().allow_http(),
        Arc::new(CountingMetrics::default()),
    )
}
