// gateway-config/src/lib.rs
// ============================================================================
// Module: Gateway Config Library
// Description: Canonical process settings model, validation, and artifact generation.
// Purpose: Single source of truth for gateway.toml semantics and the C1 cache layer.
// Dependencies: gateway-core, gateway-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `gateway-config` defines the canonical process settings model for the
//! gateway binary (`gateway.toml`), with strict, fail-closed validation and
//! deterministic generators for settings schema, examples, and docs. It also
//! provides [`cache::CachedConfigStore`], the C1 TTL-caching decorator that
//! sits in front of any `gateway_core::interfaces::ConfigStore` so the C4
//! matcher does not hit the durable store on every event.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod docs;
pub mod examples;
pub mod schema;
pub mod settings;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::CachedConfigStore;
pub use docs::config_docs_markdown;
pub use docs::verify_config_docs;
pub use docs::write_config_docs;
pub use examples::gateway_toml_example;
pub use schema::config_schema;
pub use settings::GatewayAuthConfig;
pub use settings::GatewaySettings;
pub use settings::SettingsError;
pub use settings::SqliteStoreSettings;
pub use settings::StoreConfig;
