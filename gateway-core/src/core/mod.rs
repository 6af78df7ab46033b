// gateway-core/src/core/mod.rs
// ============================================================================
// Module: Gateway Core Types
// Description: Canonical integration gateway schema and run-state structures.
// Purpose: Provide stable, serializable types shared by every collaborator crate.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Core types define integration configuration, event audit state, execution
//! logs, dead-letter entries, scheduled deliveries, rate-limit windows, and
//! lookup tables. These types are the canonical source of truth for every
//! derived surface (HTTP, persistence, worker loops).

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod category;
pub mod config;
pub mod dlq;
pub mod hashing;
pub mod identifiers;
pub mod log;
pub mod lookup;
pub mod ratelimit;
pub mod schedule;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::EventAudit;
pub use audit::EventStatus;
pub use audit::SkipCategory;
pub use category::ErrorCategory;
pub use config::Action;
pub use config::AuthSpec;
pub use config::Direction;
pub use config::IntegrationConfig;
pub use config::LookupSpec;
pub use config::Mapping;
pub use config::RateLimitSpec;
pub use config::Scope;
pub use config::SigningSecret;
pub use config::SigningSpec;
pub use config::StaticField;
pub use config::TenantScope;
pub use config::Transform;
pub use config::TransformMode;
pub use config::TransformSpec;
pub use config::ConfigError;
pub use config::DeliveryMode;
pub use config::FetchQuerySpec;
pub use config::FetchSource;
pub use dlq::DlqStatus;
pub use dlq::DLQEntry;
pub use dlq::ErrorDetail;
pub use dlq::Resolution;
pub use dlq::RetryStrategy;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::SignatureError;
pub use identifiers::DlqId;
pub use identifiers::EventId;
pub use identifiers::IntegrationId;
pub use identifiers::OrgId;
pub use identifiers::ScheduleId;
pub use identifiers::TenantId;
pub use identifiers::TraceId;
pub use log::ExecutionLog;
pub use log::LogStatus;
pub use log::RequestSnapshot;
pub use log::ResponseSnapshot;
pub use log::Step;
pub use log::StepStatus;
pub use log::TriggerType;
pub use lookup::LookupTable;
pub use lookup::UnmappedBehavior;
pub use ratelimit::RateLimitDecision;
pub use ratelimit::RateLimitWindow;
pub use schedule::ScheduleMode;
pub use schedule::ScheduleStatus;
pub use schedule::ScheduledDelivery;
pub use time::Timestamp;
