// gateway-config/src/schema.rs
// ============================================================================
// Module: Settings Schema
// Description: JSON schema builder for gateway.toml.
// Purpose: Provide canonical validation schema for settings tooling and docs.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Defines the JSON Schema for `gateway.toml`. Used by the docs generator
//! and by `jsonschema`-backed tests to catch schema/model drift.

use serde_json::Value;
use serde_json::json;

use crate::settings::MAX_CACHE_ENTRIES;
use crate::settings::MAX_CACHE_TTL_MS;
use crate::settings::MAX_POLL_INTERVAL_MS;
use crate::settings::MAX_SANDBOX_MEMORY_BYTES;
use crate::settings::MAX_SANDBOX_TIMEOUT_MS;
use crate::settings::MIN_CACHE_TTL_MS;
use crate::settings::MIN_POLL_INTERVAL_MS;
use crate::settings::MIN_SANDBOX_MEMORY_BYTES;
use crate::settings::MIN_SANDBOX_TIMEOUT_MS;

/// Returns the JSON schema for `gateway.toml`.
#[must_use]
pub fn config_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "GatewaySettings",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "server": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "bind_addr": { "type": "string" },
                    "max_body_bytes": { "type": "integer", "minimum": 1 }
                }
            },
            "store": {
                "type": "object",
                "properties": {
                    "backend": { "type": "string", "enum": ["memory", "sqlite"] },
                    "path": { "type": "string" },
                    "busy_timeout_ms": { "type": "integer", "minimum": 1 },
                    "journal_mode": { "type": "string", "enum": ["wal", "delete"] },
                    "sync_mode": { "type": "string", "enum": ["full", "normal"] }
                }
            },
            "cache": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "ttl_ms": { "type": "integer", "minimum": MIN_CACHE_TTL_MS, "maximum": MAX_CACHE_TTL_MS },
                    "max_entries": { "type": "integer", "minimum": 1, "maximum": MAX_CACHE_ENTRIES }
                }
            },
            "sandbox": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "timeout_ms": {
                        "type": "integer",
                        "minimum": MIN_SANDBOX_TIMEOUT_MS,
                        "maximum": MAX_SANDBOX_TIMEOUT_MS
                    },
                    "memory_limit_bytes": {
                        "type": "integer",
                        "minimum": MIN_SANDBOX_MEMORY_BYTES,
                        "maximum": MAX_SANDBOX_MEMORY_BYTES
                    }
                }
            },
            "workers": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "watchdog_interval_ms": {
                        "type": "integer",
                        "minimum": MIN_POLL_INTERVAL_MS,
                        "maximum": MAX_POLL_INTERVAL_MS
                    },
                    "stuck_threshold_ms": { "type": "integer", "minimum": 1 },
                    "retry_poll_interval_ms": {
                        "type": "integer",
                        "minimum": MIN_POLL_INTERVAL_MS,
                        "maximum": MAX_POLL_INTERVAL_MS
                    },
                    "schedule_poll_interval_ms": {
                        "type": "integer",
                        "minimum": MIN_POLL_INTERVAL_MS,
                        "maximum": MAX_POLL_INTERVAL_MS
                    },
                    "source_poll_interval_ms": {
                        "type": "integer",
                        "minimum": MIN_POLL_INTERVAL_MS,
                        "maximum": MAX_POLL_INTERVAL_MS
                    }
                }
            },
            "auth": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "api_key": { "type": "string" },
                    "jwt_secret": { "type": "string" }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_compiles_under_draft7() {
        let schema = config_schema();
        let compiled = jsonschema::options().with_draft(jsonschema::Draft::Draft7).build(&schema);
        assert!(compiled.is_ok(), "schema must itself be a valid draft-07 schema");
    }

    #[test]
    fn default_toml_example_parses_to_settings() {
        let parsed: crate::settings::GatewaySettings =
            toml::from_str(&crate::examples::gateway_toml_example()).expect("parse example");
        assert!(parsed.validate().is_ok());
    }
}
