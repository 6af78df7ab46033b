// gateway-delivery/tests/pipeline_delivery.rs
// ============================================================================
// Test: End-to-End Delivery
// Description: Drives DeliveryEngine against a local wiremock target to
//              cover the success, retry, and abandonment paths.
// Dependencies: wiremock, tokio
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::core::AuthSpec;
use gateway_core::core::Direction;
use gateway_core::core::DeliveryMode;
use gateway_core::core::EventId;
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
use gateway_core::runtime::InMemoryConfigStore;
use gateway_core::runtime::InMemoryDlqStore;
use gateway_core::runtime::InMemoryExecutionLogStore;
use gateway_delivery::CountingMetrics;
use gateway_delivery::DeliveryEngine;
use gateway_delivery::DeliveryOutcome;
use gateway_delivery::InboundOutcome;
use gateway_delivery::InboundRequest;
use gateway_providers::AuthProvider;
use gateway_providers::RateLimiter;
use gateway_providers::TargetPolicy;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

struct AllowAllSandbox;

impl Sandbox for AllowAllSandbox {
    fn evaluate(&self, _script: &str, _ctx: &SandboxContext) -> Result<serde_json::Value, SandboxError> {
        Ok(serde_json::Value::Bool(true))
    }
}

fn passthrough_config(id: &str, url: &str) -> IntegrationConfig {
    IntegrationConfig {
        id: IntegrationId::new(id),
        tenant: TenantScope { tenant_id: TenantId::new("tenant-a"), scope: Scope::EntityOnly, excluded_children: BTreeSet::new() },
        name: id.to_string(),
        description: None,
        tags: Vec::new(),
        direction: Direction::Outbound,
        is_active: true,
        event_type: "order.created".to_string(),
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

fn engine(config_store: Arc<InMemoryConfigStore>, dlq_store: Arc<InMemoryDlqStore>) -> DeliveryEngine {
    let client = gateway_providers::build_client(std::time::Duration::from_secs(5)).expect("build http client");
    DeliveryEngine::new(
        config_store,
        Arc::new(InMemoryExecutionLogStore::new()),
        dlq_store,
        Arc::new(AllowAllSandbox),
        Arc::new(AuthProvider::new(client.clone())),
        Arc::new(RateLimiter::new()),
        client,
        TargetPolicy::new().allow_http(),
        Arc::new(CountingMetrics::default()),
    )
}

#[tokio::test]
async fn deliver_event_succeeds_against_a_2xx_target() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/sink")).respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true}))).mount(&server).await;

    let config_store = Arc::new(InMemoryConfigStore::new());
    let dlq_store = Arc::new(InMemoryDlqStore::new());
    let integration = passthrough_config("int-1", &format!("{}/sink", server.uri()));
    let engine = engine(config_store, dlq_store.clone());

    let outcome = engine
        .deliver_event(&integration, &EventId::new("evt-1"), &TenantId::new("tenant-a"), serde_json::json!({"orderId": "o-1"}))
        .await
        .expect("deliver_event");

    assert_eq!(outcome, DeliveryOutcome::Success);
    assert!(dlq_store.list(10).await.expect("list").is_empty());
}

#[tokio::test]
async fn deliver_event_against_a_5xx_target_retries_via_the_dlq() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/sink")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

    let config_store = Arc::new(InMemoryConfigStore::new());
    let dlq_store = Arc::new(InMemoryDlqStore::new());
    let integration = passthrough_config("int-2", &format!("{}/sink", server.uri()));
    let engine = engine(config_store, dlq_store.clone());

    let outcome = engine
        .deliver_event(&integration, &EventId::new("evt-2"), &TenantId::new("tenant-a"), serde_json::json!({"orderId": "o-2"}))
        .await
        .expect("deliver_event");

    assert_eq!(outcome, DeliveryOutcome::Retried);
    let entries = dlq_store.list(10).await.expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].retry_count, 1);
}

#[tokio::test]
async fn deliver_event_against_a_4xx_target_fails_terminally_without_a_dlq_entry() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/sink")).respond_with(ResponseTemplate::new(400)).mount(&server).await;

    let config_store = Arc::new(InMemoryConfigStore::new());
    let dlq_store = Arc::new(InMemoryDlqStore::new());
    let integration = passthrough_config("int-3", &format!("{}/sink", server.uri()));
    let engine = engine(config_store, dlq_store.clone());

    let outcome = engine
        .deliver_event(&integration, &EventId::new("evt-3"), &TenantId::new("tenant-a"), serde_json::json!({"orderId": "o-3"}))
        .await
        .expect("deliver_event");

    assert_eq!(outcome, DeliveryOutcome::Failed);
}

fn inbound_config(id: &str, url: &str) -> IntegrationConfig {
    let mut config = passthrough_config(id, url);
    config.direction = Direction::Inbound;
    config.inbound_auth = Some(AuthSpec::ApiKey { header_name: "X-Api-Key".to_string(), api_key: "secret".to_string() });
    config
}

#[tokio::test]
async fn deliver_inbound_proxies_a_verified_call_to_the_target_and_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/sink")).respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"echoed": true}))).mount(&server).await;

    let config_store = Arc::new(InMemoryConfigStore::new());
    let dlq_store = Arc::new(InMemoryDlqStore::new());
    let integration = inbound_config("int-inbound-1", &format!("{}/sink", server.uri()));
    let engine = engine(config_store, dlq_store);

    let mut headers = HashMap::new();
    headers.insert("x-api-key".to_string(), "secret".to_string());
    let request = InboundRequest { request_id: "req-1".to_string(), headers, body: serde_json::json!({"orderId": "o-1"}) };

    let InboundOutcome::Response(response) = engine.deliver_inbound(&integration, request).await.expect("deliver_inbound");
    assert_eq!(response.status, 200);
    assert_eq!(response.body, serde_json::json!({"echoed": true}));
}

#[tokio::test]
async fn deliver_inbound_rejects_a_call_with_no_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/sink")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    let config_store = Arc::new(InMemoryConfigStore::new());
    let dlq_store = Arc::new(InMemoryDlqStore::new());
    let integration = inbound_config("int-inbound-2", &format!("{}/sink", server.uri()));
    let engine = engine(config_store, dlq_store);

    let request = InboundRequest { request_id: "req-2".to_string(), headers: HashMap::new(), body: serde_json::json!({}) };

    let InboundOutcome::Response(response) = engine.deliver_inbound(&integration, request).await.expect("deliver_inbound");
    assert_eq!(response.status, 401);
}

#[tokio::test]
async fn deliver_inbound_rejects_an_outbound_configured_integration() {
    let config_store = Arc::new(InMemoryConfigStore::new());
    let dlq_store = Arc::new(InMemoryDlqStore::new());
    let integration = passthrough_config("int-inbound-3", "http://example.invalid/sink");
    let engine = engine(config_store, dlq_store);

    let request = InboundRequest { request_id: "req-3".to_string(), headers: HashMap::new(), body: serde_json::json!({}) };

    let InboundOutcome::Response(response) = engine.deliver_inbound(&integration, request).await.expect("deliver_inbound");
    assert_eq!(response.status, 400);
}
