// gateway-delivery/src/pipeline.rs
// ============================================================================
// Module: Delivery Pipeline
// Description: C9 — validate/rate-limit/transform/auth/http/classify/post-process.
// Purpose: Drive one delivery attempt (event-triggered, retried, or scheduled)
//          across a multi-action chain and record every step through the
//          single-writer execution logger.
// Dependencies: gateway-core, gateway-providers, gateway-sandbox, reqwest
// ============================================================================

//! ## Overview
//! [`DeliveryEngine`] owns every collaborator a delivery attempt needs: the
//! config/log/DLQ stores, the sandbox, the auth provider, the rate limiter,
//! and an outbound HTTP client built behind [`gateway_providers::TargetPolicy`].
//! [`DeliveryEngine::deliver_event`], [`DeliveryEngine::redeliver`], and
//! [`DeliveryEngine::deliver_scheduled`] are the three entry points; all three
//! funnel into the private `run` method that walks the pipeline steps and the
//! multi-action chain.
//!
//! `ExecutionLogger` is the sole writer for a given `traceId`: every
//! `record_step`/`finalize` call takes a per-trace `tokio::sync::Mutex` before
//! reading, mutating, and re-saving the log, so concurrent attempts for the
//! same trace (a worker retry racing a late duplicate delivery) can never
//! interleave steps.
//!
//! Multi-action resume: a retriable failure mid-chain records the failed
//! action's id in `ErrorDetail.code`. `ActionResumeMode::ResumeFromFailure`
//! (the default) uses that id to skip already-succeeded actions on redelivery;
//! `RestartChain` always starts over. Each action re-runs against the
//! original event payload — actions do not chain their outputs into one
//! another's inputs, only a `previousOutput` hint is exposed to condition
//! scripts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use gateway_core::core::EventId;
use gateway_core::core::LookupTable;
use gateway_core::core::TenantId;
use gateway_core::core::Timestamp;
use gateway_core::core::TraceId;
use gateway_core::core::category::ErrorCategory;
use gateway_core::core::config::Action;
use gateway_core::core::config::ActionResumeMode;
use gateway_core::core::config::AuthSpec;
use gateway_core::core::config::Direction;
use gateway_core::core::config::IntegrationConfig;
use gateway_core::core::config::Transform;
use gateway_core::core::config::TransformMode;
use gateway_core::core::dlq::DLQEntry;
use gateway_core::core::dlq::ErrorDetail;
use gateway_core::core::dlq::ResolutionMethod;
use gateway_core::core::dlq::RetryStrategy;
use gateway_core::core::log::ExecutionLog;
use gateway_core::core::log::LogStatus;
use gateway_core::core::log::RequestSnapshot;
use gateway_core::core::log::ResponseSnapshot;
use gateway_core::core::log::Step;
use gateway_core::core::log::TriggerType;
use gateway_core::interfaces::ConfigStore;
use gateway_core::interfaces::DlqStore;
use gateway_core::interfaces::ExecutionLogStore;
use gateway_core::interfaces::Sandbox;
use gateway_core::interfaces::SandboxContext;
use gateway_core::interfaces::StoreError;
use gateway_core::runtime::TransformEngine;
use gateway_core::runtime::Validator;
use gateway_providers::AuthProvider;
use gateway_providers::RateLimiter;
use gateway_providers::TargetPolicy;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use url::Url;

use crate::inbound::InboundError;
use crate::inbound::InboundOutcome;
use crate::inbound::InboundRequest;
use crate::inbound::InboundResponse;
use crate::metrics::GatewayMetrics;
use crate::redact::Redactor;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Infrastructure-level failures surfaced out of a delivery attempt. Business
/// failures (4xx, timeouts, transform errors, ...) never reach this type —
/// they are recorded into the execution log and DLQ instead.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Execution Logger
// ============================================================================

/// Single-writer execution logger, keyed by `traceId`.
pub struct ExecutionLogger {
    store: Arc<dyn ExecutionLogStore>,
    locks: DashMap<TraceId, Arc<AsyncMutex<()>>>,
}

impl ExecutionLogger {
    /// Builds a logger writing through `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ExecutionLogStore>) -> Self {
        Self { store, locks: DashMap::new() }
    }

    fn lock_for(&self, trace_id: &TraceId) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.locks.entry(trace_id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).value())
    }

    /// Opens `log` if no log exists yet for its `traceId`; otherwise this is a no-op.
    async fn ensure_open(&self, log: ExecutionLog) -> Result<(), StoreError> {
        let lock = self.lock_for(&log.trace_id);
        let _held = lock.lock().await;
        if self.store.get(&log.trace_id).await?.is_none() {
            self.store.open(log).await?;
        }
        Ok(())
    }

    /// Appends `step` to the log for `trace_id`.
    async fn record_step(&self, trace_id: &TraceId, step: Step) -> Result<(), StoreError> {
        let lock = self.lock_for(trace_id);
        let _held = lock.lock().await;
        let mut log = self.store.get(trace_id).await?.ok_or_else(|| StoreError::NotFound(trace_id.to_string()))?;
        log.record_step(step);
        self.store.save(&log).await
    }

    /// Attaches the request/response snapshot taken for the `http_request` step.
    async fn attach_snapshot(&self, trace_id: &TraceId, request: RequestSnapshot, response: Option<ResponseSnapshot>) -> Result<(), StoreError> {
        let lock = self.lock_for(trace_id);
        let _held = lock.lock().await;
        let mut log = self.store.get(trace_id).await?.ok_or_else(|| StoreError::NotFound(trace_id.to_string()))?;
        log.request = Some(request);
        log.response = response;
        self.store.save(&log).await
    }

    /// Finalizes the log for `trace_id` with a terminal status.
    async fn finalize(&self, trace_id: &TraceId, status: LogStatus, error: Option<String>) -> Result<(), StoreError> {
        let lock = self.lock_for(trace_id);
        let _held = lock.lock().await;
        let mut log = self.store.get(trace_id).await?.ok_or_else(|| StoreError::NotFound(trace_id.to_string()))?;
        log.finalize(status, error);
        self.store.save(&log).await
    }
}

// ============================================================================
// SECTION: Attempt Outcome
// ============================================================================

/// Result of running the full action chain for one attempt.
enum ChainOutcome {
    Success,
    Retriable { category: ErrorCategory, message: String, failed_action_id: String },
    Terminal { category: ErrorCategory, message: String },
}

/// Outcome of one delivery attempt, returned to the caller after the log and
/// DLQ bookkeeping have already been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Every action succeeded.
    Success,
    /// A retriable failure created or updated a DLQ entry.
    Retried,
    /// A terminal failure was recorded with no DLQ entry.
    Failed,
}

// ============================================================================
// SECTION: Delivery Engine
// ============================================================================

/// Runs delivery attempts against a fixed set of collaborators.
pub struct DeliveryEngine {
    config_store: Arc<dyn ConfigStore>,
    dlq_store: Arc<dyn DlqStore>,
    sandbox: Arc<dyn Sandbox>,
    auth: Arc<AuthProvider>,
    rate_limiter: Arc<RateLimiter>,
    http: reqwest::Client,
    target_policy: TargetPolicy,
    validator: Validator,
    metrics: Arc<dyn GatewayMetrics>,
    redactor: Redactor,
    logger: ExecutionLogger,
}

impl DeliveryEngine {
    /// Builds a delivery engine.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "every field is a distinct required collaborator")]
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        log_store: Arc<dyn ExecutionLogStore>,
        dlq_store: Arc<dyn DlqStore>,
        sandbox: Arc<dyn Sandbox>,
        auth: Arc<AuthProvider>,
        rate_limiter: Arc<RateLimiter>,
        http: reqwest::Client,
        target_policy: TargetPolicy,
        metrics: Arc<dyn GatewayMetrics>,
    ) -> Self {
        Self {
            config_store,
            dlq_store,
            sandbox,
            auth,
            rate_limiter,
            http,
            target_policy,
            validator: Validator::default(),
            metrics,
            redactor: Redactor::default(),
            logger: ExecutionLogger::new(log_store),
        }
    }

    /// Runs a fresh attempt triggered by a matched source event.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] only for store-layer failures; business
    /// failures are recorded into the log/DLQ and reported via the return value.
    pub async fn deliver_event(
        &self,
        integration: &IntegrationConfig,
        event_id: &EventId,
        tenant_id: &TenantId,
        payload: Value,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let trace_id = TraceId::new(format!("{event_id}:{}", integration.id));
        self.run(integration, &trace_id, event_id.as_str(), TriggerType::Event, tenant_id, payload, None).await
    }

    /// Runs an attempt triggered by a scheduled delivery firing.
    ///
    /// # Errors
    ///
    /// See [`Self::deliver_event`].
    pub async fn deliver_scheduled(
        &self,
        integration: &IntegrationConfig,
        schedule_id: &str,
        tenant_id: &TenantId,
        payload: Value,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let trace_id = TraceId::new(format!("{schedule_id}:{}", integration.id));
        self.run(integration, &trace_id, schedule_id, TriggerType::Schedule, tenant_id, payload, None).await
    }

    /// Re-runs a DLQ entry's delivery attempt, resuming from its failed action
    /// per the integration's `action_resume_mode`.
    ///
    /// # Errors
    ///
    /// See [`Self::deliver_event`].
    pub async fn redeliver(&self, entry: &DLQEntry, integration: &IntegrationConfig) -> Result<DeliveryOutcome, DeliveryError> {
        let resume_from = match integration.action_resume_mode {
            ActionResumeMode::ResumeFromFailure => entry.error.code.as_deref(),
            ActionResumeMode::RestartChain => None,
        };
        self.run(
            integration,
            &entry.trace_id,
            entry.trace_id.as_str(),
            TriggerType::Event,
            &entry.tenant_id,
            entry.payload.clone(),
            resume_from,
        )
        .await
    }

    /// Runs the inbound proxy pipeline for one call received on the inbound
    /// endpoint: `inbound_auth -> request_transform -> http_request (outbound
    /// leg) -> response_transform`. A `PASSTHROUGH`-mode integration's
    /// response is streamed back without a `response_transform` step.
    /// Every failure, including auth and transform failures, resolves to a
    /// response rather than a `DeliveryError` — there is no caller-side DLQ
    /// for an inbound request to fall back to.
    ///
    /// # Errors
    ///
    /// Returns [`InboundError`] only for store-layer failures.
    #[allow(clippy::too_many_lines, reason = "one pipeline step sequence, splitting it would scatter the state it shares")]
    pub async fn deliver_inbound(&self, integration: &IntegrationConfig, request: InboundRequest) -> Result<InboundOutcome, InboundError> {
        if integration.direction != Direction::Inbound {
            return Ok(InboundOutcome::Response(InboundResponse {
                status: 400,
                headers: HashMap::new(),
                body: serde_json::json!({"error": "integration is not configured for inbound direction"}),
            }));
        }

        let tenant_id = integration.tenant.tenant_id.clone();
        let trace_id = TraceId::new(format!("inbound:{}:{}", integration.id, request.request_id));
        self.logger
            .ensure_open(ExecutionLog::open(
                trace_id.clone(),
                request.request_id.clone(),
                integration.direction,
                TriggerType::Api,
                integration.id.clone(),
                tenant_id.clone(),
            ))
            .await?;

        let inbound_auth = integration.inbound_auth.clone().unwrap_or(AuthSpec::None);
        let body_string = serde_json::to_string(&request.body).unwrap_or_default();
        if let Err(err) =
            self.auth.verify_inbound(&inbound_auth, &request.headers, request.request_id.as_str(), Timestamp::now().as_unix_seconds(), &body_string)
        {
            let message = err.to_string();
            self.logger
                .record_step(&trace_id, Step::failed("inbound_auth", Timestamp::now(), 0, message.clone(), ErrorCategory::AuthError, Value::Null))
                .await?;
            self.logger.finalize(&trace_id, LogStatus::Failed, Some(message.clone())).await?;
            self.metrics.delivery_attempted(integration.id.as_str(), "inbound_auth_failed");
            return Ok(InboundOutcome::Response(InboundResponse { status: 401, headers: HashMap::new(), body: serde_json::json!({"error": message}) }));
        }
        self.logger.record_step(&trace_id, Step::success("inbound_auth", Timestamp::now(), 0, Value::Null)).await?;

        let lookup_map = self.build_lookup_map(&tenant_id, integration).await?;
        let transformed = match self.apply_top_level_transform(integration, &tenant_id, &request.body, &lookup_map) {
            Ok(value) => value,
            Err(message) => {
                self.logger
                    .record_step(&trace_id, Step::failed("request_transform", Timestamp::now(), 0, message.clone(), ErrorCategory::DataError, Value::Null))
                    .await?;
                self.logger.finalize(&trace_id, LogStatus::Failed, Some(message.clone())).await?;
                self.metrics.delivery_attempted(integration.id.as_str(), "inbound_transform_failed");
                return Ok(InboundOutcome::Response(InboundResponse { status: 502, headers: HashMap::new(), body: serde_json::json!({"error": message}) }));
            }
        };
        self.logger.record_step(&trace_id, Step::success("request_transform", Timestamp::now(), 0, Value::Null)).await?;

        let Ok(url) = Url::parse(&integration.target_url) else {
            let message = format!("invalid target url: {}", integration.target_url);
            self.logger
                .record_step(&trace_id, Step::failed("http_request", Timestamp::now(), 0, message.clone(), ErrorCategory::ClientError, Value::Null))
                .await?;
            self.logger.finalize(&trace_id, LogStatus::Failed, Some(message.clone())).await?;
            return Ok(InboundOutcome::Response(InboundResponse { status: 502, headers: HashMap::new(), body: serde_json::json!({"error": message}) }));
        };
        if let Err(err) = self.target_policy.validate(&url) {
            let message = err.to_string();
            self.logger
                .record_step(&trace_id, Step::failed("http_request", Timestamp::now(), 0, message.clone(), ErrorCategory::ClientError, Value::Null))
                .await?;
            self.logger.finalize(&trace_id, LogStatus::Failed, Some(message.clone())).await?;
            return Ok(InboundOutcome::Response(InboundResponse { status: 502, headers: HashMap::new(), body: serde_json::json!({"error": message}) }));
        }

        let body = serde_json::to_string(&transformed).unwrap_or_else(|_| "{}".to_string());
        let outbound_headers = self
            .auth
            .resolve(&integration.id, &integration.auth, trace_id.as_str(), Timestamp::now().as_unix_seconds(), &body, self.config_store.as_ref())
            .await;
        let outbound_headers = match outbound_headers {
            Ok(headers) => headers,
            Err(err) => {
                let message = err.to_string();
                self.logger
                    .record_step(&trace_id, Step::failed("http_request", Timestamp::now(), 0, message.clone(), ErrorCategory::AuthError, Value::Null))
                    .await?;
                self.logger.finalize(&trace_id, LogStatus::Failed, Some(message.clone())).await?;
                return Ok(InboundOutcome::Response(InboundResponse { status: 502, headers: HashMap::new(), body: serde_json::json!({"error": message}) }));
            }
        };

        let method = reqwest::Method::from_bytes(integration.http_method.as_bytes()).unwrap_or(reqwest::Method::POST);
        let mut request_headers = integration.headers.clone();
        for (name, value) in &outbound_headers {
            request_headers.insert(name.clone(), value.clone());
        }
        let mut outbound = self.http.request(method, url.clone()).timeout(Duration::from_millis(integration.timeout_ms)).body(body.clone());
        for (name, value) in &request_headers {
            outbound = outbound.header(name, value);
        }

        let request_snapshot = RequestSnapshot {
            url: url.to_string(),
            method: integration.http_method.clone(),
            headers: self.redactor.redact_headers(&request_headers),
            body: Some(self.redactor.truncate_body(&body)),
        };

        let started = Timestamp::now();
        let response = outbound.send().await;
        let duration_ms = Timestamp::now().abs_diff_millis(started);

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.logger.attach_snapshot(&trace_id, request_snapshot, None).await?;
                let category = if err.is_timeout() { ErrorCategory::Timeout } else { ErrorCategory::Network };
                let message = err.to_string();
                self.logger.record_step(&trace_id, Step::failed("http_request", started, duration_ms, message.clone(), category, Value::Null)).await?;
                self.logger.finalize(&trace_id, LogStatus::Failed, Some(message.clone())).await?;
                self.metrics.delivery_attempted(integration.id.as_str(), "inbound_network_failed");
                return Ok(InboundOutcome::Response(InboundResponse { status: 502, headers: HashMap::new(), body: serde_json::json!({"error": message}) }));
            }
        };

        let status = response.status();
        let response_headers: HashMap<String, String> =
            response.headers().iter().map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string())).collect();
        let response_body = response.text().await.unwrap_or_default();
        let response_snapshot = ResponseSnapshot {
            status_code: status.as_u16(),
            headers: self.redactor.redact_headers(&response_headers),
            body: Some(self.redactor.truncate_body(&response_body)),
        };
        self.logger.attach_snapshot(&trace_id, request_snapshot, Some(response_snapshot)).await?;
        self.logger
            .record_step(&trace_id, Step::success("http_request", started, duration_ms, serde_json::json!({"statusCode": status.as_u16()})))
            .await?;

        let response_json: Value = serde_json::from_str(&response_body).unwrap_or(Value::Null);
        let stream_mode = integration.transformation.effective_mode() == TransformMode::Passthrough;
        let final_body = if stream_mode {
            self.logger
                .record_step(&trace_id, Step::success("response_transform", Timestamp::now(), 0, serde_json::json!({"streamed": true})))
                .await?;
            response_json
        } else {
            match self.apply_top_level_transform(integration, &tenant_id, &response_json, &lookup_map) {
                Ok(value) => {
                    self.logger.record_step(&trace_id, Step::success("response_transform", Timestamp::now(), 0, Value::Null)).await?;
                    value
                }
                Err(message) => {
                    self.logger
                        .record_step(&trace_id, Step::failed("response_transform", Timestamp::now(), 0, message.clone(), ErrorCategory::DataError, Value::Null))
                        .await?;
                    self.logger.finalize(&trace_id, LogStatus::Failed, Some(message.clone())).await?;
                    self.metrics.delivery_attempted(integration.id.as_str(), "inbound_response_transform_failed");
                    return Ok(InboundOutcome::Response(InboundResponse { status: 502, headers: HashMap::new(), body: serde_json::json!({"error": message}) }));
                }
            }
        };

        self.logger.finalize(&trace_id, LogStatus::Success, None).await?;
        self.metrics.delivery_attempted(integration.id.as_str(), "inbound_success");
        Ok(InboundOutcome::Response(InboundResponse { status: status.as_u16(), headers: HashMap::new(), body: final_body }))
    }

    #[allow(clippy::too_many_arguments, reason = "each argument identifies a distinct attempt dimension")]
    async fn run(
        &self,
        integration: &IntegrationConfig,
        trace_id: &TraceId,
        message_id: &str,
        trigger_type: TriggerType,
        tenant_id: &TenantId,
        payload: Value,
        resume_action_id: Option<&str>,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        self.logger
            .ensure_open(ExecutionLog::open(
                trace_id.clone(),
                message_id.to_string(),
                integration.direction,
                trigger_type,
                integration.id.clone(),
                tenant_id.clone(),
            ))
            .await?;

        if let Err(err) = self.validator.validate(&payload, integration) {
            self.logger
                .record_step(trace_id, Step::failed("validation", Timestamp::now(), 0, err.to_string(), ErrorCategory::ValidationError, Value::Null))
                .await?;
            self.logger.finalize(trace_id, LogStatus::Failed, Some(err.to_string())).await?;
            self.metrics.delivery_attempted(integration.id.as_str(), "validation_failed");
            return Ok(DeliveryOutcome::Failed);
        }
        self.logger.record_step(trace_id, Step::success("validation", Timestamp::now(), 0, Value::Null)).await?;

        if integration.rate_limits.enabled {
            let decision = self.rate_limiter.check_and_increment(
                (integration.id.clone(), tenant_id.clone()),
                Timestamp::now(),
                integration.rate_limits.max_requests,
                integration.rate_limits.window_seconds,
            );
            if !decision.allowed {
                let message = "rate limit exceeded".to_string();
                self.logger
                    .record_step(
                        trace_id,
                        Step::failed("rate_limit", Timestamp::now(), 0, message.clone(), ErrorCategory::RateLimit, serde_json::json!({"retryAfterSeconds": decision.retry_after_seconds})),
                    )
                    .await?;
                let first_action = integration.effective_actions().first().map(|a| a.id.clone()).unwrap_or_default();
                self.upsert_dlq(integration, trace_id, tenant_id, &payload, ErrorCategory::RateLimit, message, None, &first_action).await?;
                self.logger.finalize(trace_id, LogStatus::Retrying, None).await?;
                self.metrics.delivery_attempted(integration.id.as_str(), "rate_limited");
                return Ok(DeliveryOutcome::Retried);
            }
            self.logger
                .record_step(trace_id, Step::success("rate_limit", Timestamp::now(), 0, serde_json::json!({"remaining": decision.remaining})))
                .await?;
        }

        let lookup_map = self.build_lookup_map(tenant_id, integration).await?;
        let actions = integration.effective_actions();
        let resume_index = match integration.action_resume_mode {
            ActionResumeMode::ResumeFromFailure => resume_action_id.and_then(|id| actions.iter().position(|a| a.id == id)).unwrap_or(0),
            ActionResumeMode::RestartChain => 0,
        };

        let mut previous_output: Option<Value> = None;
        let outcome = 'chain: {
            for (index, action) in actions.iter().enumerate().skip(resume_index) {
                if index > resume_index {
                    if let Some(delay_ms) = integration.multi_action_delay_ms {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }

                if let Some(condition) = &action.condition {
                    match self.evaluate_condition(condition, integration, tenant_id, &payload, &previous_output) {
                        Ok(true) => {}
                        Ok(false) => {
                            self.logger
                                .record_step(trace_id, Step::success(format!("{}:condition", action.id), Timestamp::now(), 0, serde_json::json!({"skipped": true})))
                                .await?;
                            continue;
                        }
                        Err(message) => {
                            self.logger
                                .record_step(
                                    trace_id,
                                    Step::failed(format!("{}:condition", action.id), Timestamp::now(), 0, message, ErrorCategory::ValidationError, Value::Null),
                                )
                                .await?;
                            break 'chain ChainOutcome::Terminal { category: ErrorCategory::ValidationError, message: "condition evaluation failed".to_string() };
                        }
                    }
                }

                match self.run_action(integration, tenant_id, action, trace_id, &payload, &previous_output, &lookup_map).await? {
                    ActionOutcome::Success(output) => previous_output = Some(output),
                    ActionOutcome::Retriable { category, message } => {
                        break 'chain ChainOutcome::Retriable { category, message, failed_action_id: action.id.clone() };
                    }
                    ActionOutcome::Terminal { category, message } => {
                        break 'chain ChainOutcome::Terminal { category, message };
                    }
                }
            }
            ChainOutcome::Success
        };

        match outcome {
            ChainOutcome::Success => {
                if let Some(existing) = self.find_dlq_for_trace(integration, trace_id).await? {
                    self.resolve_dlq(existing).await?;
                }
                self.logger.finalize(trace_id, LogStatus::Success, None).await?;
                self.metrics.delivery_attempted(integration.id.as_str(), "success");
                Ok(DeliveryOutcome::Success)
            }
            ChainOutcome::Retriable { category, message, failed_action_id } => {
                self.upsert_dlq(integration, trace_id, tenant_id, &payload, category, message, None, &failed_action_id).await?;
                self.logger.finalize(trace_id, LogStatus::Retrying, None).await?;
                self.metrics.delivery_attempted(integration.id.as_str(), "retriable_failure");
                Ok(DeliveryOutcome::Retried)
            }
            ChainOutcome::Terminal { message, .. } => {
                self.logger.finalize(trace_id, LogStatus::Failed, Some(message)).await?;
                self.metrics.delivery_attempted(integration.id.as_str(), "terminal_failure");
                Ok(DeliveryOutcome::Failed)
            }
        }
    }

    fn evaluate_condition(
        &self,
        script: &str,
        integration: &IntegrationConfig,
        tenant_id: &TenantId,
        payload: &Value,
        previous_output: &Option<Value>,
    ) -> Result<bool, String> {
        let ctx = SandboxContext {
            payload: payload.clone(),
            context: serde_json::json!({
                "eventType": integration.event_type,
                "tenantId": tenant_id.as_str(),
                "previousOutput": previous_output,
            }),
            timeout: Duration::from_secs(1),
            lookup_tables: Vec::new(),
        };
        match self.sandbox.evaluate(script, &ctx) {
            Ok(Value::Bool(flag)) => Ok(flag),
            Ok(other) => Ok(!other.is_null() && other != Value::Bool(false)),
            Err(err) => Err(err.to_string()),
        }
    }

    #[allow(clippy::too_many_lines, reason = "one pipeline step sequence, splitting it would scatter the state it shares")]
    #[allow(clippy::too_many_arguments, reason = "each argument identifies a distinct attempt dimension")]
    async fn run_action(
        &self,
        integration: &IntegrationConfig,
        tenant_id: &TenantId,
        action: &Action,
        trace_id: &TraceId,
        event_payload: &Value,
        previous_output: &Option<Value>,
        lookup_map: &HashMap<String, Vec<LookupTable>>,
    ) -> Result<ActionOutcome, DeliveryError> {
        let transformed = match self.apply_transform(integration, tenant_id, action, event_payload, previous_output, lookup_map) {
            Ok(value) => value,
            Err(message) => {
                self.logger
                    .record_step(trace_id, Step::failed(format!("{}:transform", action.id), Timestamp::now(), 0, message.clone(), ErrorCategory::DataError, Value::Null))
                    .await?;
                return Ok(ActionOutcome::Terminal { category: ErrorCategory::DataError, message });
            }
        };
        self.logger.record_step(trace_id, Step::success(format!("{}:transform", action.id), Timestamp::now(), 0, Value::Null)).await?;

        let body = serde_json::to_string(&transformed).unwrap_or_else(|_| "{}".to_string());
        let auth_spec = action.auth.clone();
        let auth_spec = auth_spec.as_ref();
        let headers = match auth_spec {
            Some(spec) => {
                self.auth
                    .resolve(&integration.id, spec, trace_id.as_str(), Timestamp::now().as_unix_seconds(), &body, self.config_store.as_ref())
                    .await
            }
            None => Ok(Vec::new()),
        };
        let headers = match headers {
            Ok(headers) => headers,
            Err(err) => {
                let message = err.to_string();
                self.logger
                    .record_step(trace_id, Step::failed(format!("{}:auth", action.id), Timestamp::now(), 0, message.clone(), ErrorCategory::AuthError, Value::Null))
                    .await?;
                return Ok(ActionOutcome::Retriable { category: ErrorCategory::AuthError, message });
            }
        };
        self.logger.record_step(trace_id, Step::success(format!("{}:auth", action.id), Timestamp::now(), 0, Value::Null)).await?;

        let Ok(url) = Url::parse(&action.target_url) else {
            let message = format!("invalid target url: {}", action.target_url);
            self.logger
                .record_step(trace_id, Step::failed(format!("{}:http_request", action.id), Timestamp::now(), 0, message.clone(), ErrorCategory::ClientError, Value::Null))
                .await?;
            return Ok(ActionOutcome::Terminal { category: ErrorCategory::ClientError, message });
        };
        if let Err(err) = self.target_policy.validate(&url) {
            let message = err.to_string();
            self.logger
                .record_step(trace_id, Step::failed(format!("{}:http_request", action.id), Timestamp::now(), 0, message.clone(), ErrorCategory::ClientError, Value::Null))
                .await?;
            return Ok(ActionOutcome::Terminal { category: ErrorCategory::ClientError, message });
        }

        let method = reqwest::Method::from_bytes(action.http_method.as_bytes()).unwrap_or(reqwest::Method::POST);
        let mut request_headers: HashMap<String, String> = action.headers.clone();
        for (name, value) in &headers {
            request_headers.insert(name.clone(), value.clone());
        }
        let mut request = self.http.request(method, url.clone()).timeout(Duration::from_millis(action.timeout_ms)).body(body.clone());
        for (name, value) in &request_headers {
            request = request.header(name, value);
        }

        let request_snapshot = RequestSnapshot {
            url: url.to_string(),
            method: action.http_method.clone(),
            headers: self.redactor.redact_headers(&request_headers),
            body: Some(self.redactor.truncate_body(&body)),
        };

        let started = Timestamp::now();
        let response = request.send().await;
        let duration_ms = Timestamp::now().abs_diff_millis(started);

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.logger.attach_snapshot(trace_id, request_snapshot, None).await?;
                let category = if err.is_timeout() { ErrorCategory::Timeout } else { ErrorCategory::Network };
                let message = err.to_string();
                self.logger
                    .record_step(trace_id, Step::failed(format!("{}:http_request", action.id), started, duration_ms, message.clone(), category, Value::Null))
                    .await?;
                return Ok(ActionOutcome::Retriable { category, message });
            }
        };

        let status = response.status();
        let response_headers: HashMap<String, String> =
            response.headers().iter().map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string())).collect();
        let response_body = response.text().await.unwrap_or_default();
        let response_snapshot = ResponseSnapshot {
            status_code: status.as_u16(),
            headers: self.redactor.redact_headers(&response_headers),
            body: Some(self.redactor.truncate_body(&response_body)),
        };
        self.logger.attach_snapshot(trace_id, request_snapshot, Some(response_snapshot)).await?;
        self.logger
            .record_step(trace_id, Step::success(format!("{}:http_request", action.id), started, duration_ms, serde_json::json!({"statusCode": status.as_u16()})))
            .await?;

        if status.is_success() {
            if let Some(expired) = expiration_detection_of(auth_spec) {
                if expired.enabled {
                    let response_json: Value = serde_json::from_str(&response_body).unwrap_or(Value::Null);
                    if response_indicates_expired(&response_json, &expired.response_path, &expired.expired_values) {
                        let _ = self.config_store.update_token_cache(&integration.id, Value::Null).await;
                        let message = "token expiration detected in response body".to_string();
                        self.logger
                            .record_step(trace_id, Step::failed(format!("{}:classify", action.id), Timestamp::now(), 0, message.clone(), ErrorCategory::AuthError, Value::Null))
                            .await?;
                        return Ok(ActionOutcome::Retriable { category: ErrorCategory::AuthError, message });
                    }
                }
            }
            self.logger.record_step(trace_id, Step::success(format!("{}:classify", action.id), Timestamp::now(), 0, Value::Null)).await?;
            let output: Value = serde_json::from_str(&response_body).unwrap_or(Value::Null);
            self.logger
                .record_step(trace_id, Step::success(format!("{}:post_process", action.id), Timestamp::now(), 0, Value::Null))
                .await?;
            return Ok(ActionOutcome::Success(output));
        }

        let category = classify_status(status.as_u16());
        let message = format!("target responded with status {}", status.as_u16());
        self.logger
            .record_step(trace_id, Step::failed(format!("{}:classify", action.id), Timestamp::now(), 0, message.clone(), category, serde_json::json!({"statusCode": status.as_u16()})))
            .await?;
        if category.is_retriable() {
            Ok(ActionOutcome::Retriable { category, message })
        } else {
            Ok(ActionOutcome::Terminal { category, message })
        }
    }

    #[allow(clippy::too_many_arguments, reason = "each argument identifies a distinct attempt dimension")]
    fn apply_transform(
        &self,
        integration: &IntegrationConfig,
        tenant_id: &TenantId,
        action: &Action,
        event_payload: &Value,
        previous_output: &Option<Value>,
        lookup_map: &HashMap<String, Vec<LookupTable>>,
    ) -> Result<Value, String> {
        match action.transformation.effective_mode() {
            TransformMode::Passthrough => Ok(TransformEngine::passthrough(event_payload)),
            TransformMode::Simple => {
                let resolver = |lookup_type: &str| -> Option<Vec<LookupTable>> { Some(lookup_map.get(lookup_type).cloned().unwrap_or_default()) };
                TransformEngine::apply_simple(event_payload, &action.transformation.mappings, &action.transformation.static_fields, &resolver).map_err(|err| err.to_string())
            }
            TransformMode::Script => {
                let Some(script) = &action.transformation.script else {
                    return Err("script mode configured without a script body".to_string());
                };
                let all_tables: Vec<LookupTable> = lookup_map.values().flatten().cloned().collect();
                let ctx = SandboxContext {
                    payload: event_payload.clone(),
                    context: serde_json::json!({
                        "eventType": integration.event_type,
                        "tenantId": tenant_id.as_str(),
                        "previousOutput": previous_output,
                    }),
                    timeout: Duration::from_secs(5),
                    lookup_tables: all_tables,
                };
                self.sandbox.evaluate(script, &ctx).map_err(|err| err.to_string())
            }
        }
    }

    /// Runs the integration's top-level `transformation` (the one config a
    /// single inbound call has, as opposed to a multi-action chain's
    /// per-action transforms) against `payload`.
    fn apply_top_level_transform(
        &self,
        integration: &IntegrationConfig,
        tenant_id: &TenantId,
        payload: &Value,
        lookup_map: &HashMap<String, Vec<LookupTable>>,
    ) -> Result<Value, String> {
        match integration.transformation.effective_mode() {
            TransformMode::Passthrough => Ok(TransformEngine::passthrough(payload)),
            TransformMode::Simple => {
                let resolver = |lookup_type: &str| -> Option<Vec<LookupTable>> { Some(lookup_map.get(lookup_type).cloned().unwrap_or_default()) };
                TransformEngine::apply_simple(payload, &integration.transformation.mappings, &integration.transformation.static_fields, &resolver)
                    .map_err(|err| err.to_string())
            }
            TransformMode::Script => {
                let Some(script) = &integration.transformation.script else {
                    return Err("script mode configured without a script body".to_string());
                };
                let all_tables: Vec<LookupTable> = lookup_map.values().flatten().cloned().collect();
                let ctx = SandboxContext {
                    payload: payload.clone(),
                    context: serde_json::json!({"eventType": integration.event_type, "tenantId": tenant_id.as_str()}),
                    timeout: Duration::from_secs(5),
                    lookup_tables: all_tables,
                };
                self.sandbox.evaluate(script, &ctx).map_err(|err| err.to_string())
            }
        }
    }

    async fn build_lookup_map(&self, tenant_id: &TenantId, config: &IntegrationConfig) -> Result<HashMap<String, Vec<LookupTable>>, StoreError> {
        let lookup_types = lookup_types_used(config);
        if lookup_types.is_empty() {
            return Ok(HashMap::new());
        }
        let ancestors = self.config_store.ancestors_of(tenant_id).await?;
        let mut map = HashMap::new();
        for lookup_type in lookup_types {
            let mut chain = Vec::new();
            if let Some(table) = self.config_store.get_lookup_table(tenant_id, &lookup_type).await? {
                chain.push(table);
            }
            for ancestor in &ancestors {
                if let Some(table) = self.config_store.get_lookup_table(ancestor, &lookup_type).await? {
                    chain.push(table);
                }
            }
            map.insert(lookup_type, chain);
        }
        Ok(map)
    }

    #[allow(clippy::too_many_arguments, reason = "each argument identifies a distinct DLQ field")]
    async fn upsert_dlq(
        &self,
        integration: &IntegrationConfig,
        trace_id: &TraceId,
        tenant_id: &TenantId,
        payload: &Value,
        category: ErrorCategory,
        message: String,
        status_code: Option<u16>,
        failed_action_id: &str,
    ) -> Result<(), DeliveryError> {
        let error = ErrorDetail { message, code: Some(failed_action_id.to_string()), category, status_code };
        let existing = self.find_dlq_for_trace(integration, trace_id).await?;
        let mut entry = existing.unwrap_or_else(|| fresh_dlq_entry(integration, trace_id, tenant_id, payload.clone()));
        // First failure transitions pending -> retrying; a redelivery failure
        // is already retrying. Either way record_failed_attempt computes the
        // next retryCount/nextRetryAt uniformly.
        let _ = entry.claim();
        let _ = entry.record_failed_attempt(error);
        let abandoning = entry.status == gateway_core::core::dlq::DlqStatus::Abandoned;
        self.dlq_store.upsert(&entry).await?;
        if abandoning {
            self.metrics.dlq_abandoned(integration.id.as_str());
        }
        Ok(())
    }

    async fn find_dlq_for_trace(&self, integration: &IntegrationConfig, trace_id: &TraceId) -> Result<Option<DLQEntry>, DeliveryError> {
        let candidates = self.dlq_store.list(256).await?;
        Ok(candidates.into_iter().find(|entry| entry.integration_id == integration.id && entry.trace_id == *trace_id))
    }

    async fn resolve_dlq(&self, mut entry: DLQEntry) -> Result<(), DeliveryError> {
        let _ = entry.resolve(ResolutionMethod::AutoRetry, None, None);
        self.dlq_store.upsert(&entry).await?;
        Ok(())
    }
}

enum ActionOutcome {
    Success(Value),
    Retriable { category: ErrorCategory, message: String },
    Terminal { category: ErrorCategory, message: String },
}

fn expiration_detection_of(auth: Option<&AuthSpec>) -> Option<&gateway_core::core::config::TokenExpirationDetection> {
    match auth? {
        AuthSpec::OAuth2 { expiration_detection, .. } => expiration_detection.as_ref(),
        _ => None,
    }
}

fn response_indicates_expired(response: &Value, response_path: &str, expired_values: &[String]) -> bool {
    gateway_providers::resolve_as_string(response, response_path).is_some_and(|actual| {
        let actual = actual.to_lowercase();
        expired_values.iter().any(|expected| actual.contains(&expected.to_lowercase()))
    })
}

fn classify_status(status: u16) -> ErrorCategory {
    match status {
        429 => ErrorCategory::RateLimit,
        408 => ErrorCategory::Timeout,
        500..=599 => ErrorCategory::ServerError,
        400..=499 => ErrorCategory::ClientError,
        _ => ErrorCategory::Unknown,
    }
}

fn lookup_types_used(config: &IntegrationConfig) -> BTreeSet<String> {
    let mut types: BTreeSet<String> = config.lookups.iter().map(|spec| spec.lookup_type.clone()).collect();
    for action in config.effective_actions() {
        for mapping in &action.transformation.mappings {
            if let Transform::Lookup { lookup_type } = &mapping.transform {
                types.insert(lookup_type.clone());
            }
        }
    }
    types
}

fn fresh_dlq_entry(integration: &IntegrationConfig, trace_id: &TraceId, tenant_id: &TenantId, payload: Value) -> DLQEntry {
    let now = Timestamp::now();
    DLQEntry {
        dlq_id: gateway_core::core::DlqId::new(trace_id.as_str()),
        trace_id: trace_id.clone(),
        execution_log_id: trace_id.clone(),
        integration_id: integration.id.clone(),
        tenant_id: tenant_id.clone(),
        direction: Direction::Outbound,
        payload,
        error: ErrorDetail { message: String::new(), code: None, category: ErrorCategory::Unknown, status_code: None },
        retry_strategy: RetryStrategy::Exponential,
        retry_count: 0,
        max_retries: integration.retry_count,
        next_retry_at: now,
        last_attempt_at: now,
        status: gateway_core::core::dlq::DlqStatus::Pending,
        resolution: None,
    }
}
