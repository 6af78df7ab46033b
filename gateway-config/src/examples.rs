// gateway-config/src/examples.rs
// ============================================================================
// Module: Settings Examples
// Description: Canonical example process configuration payloads.
// Purpose: Deterministic examples for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for `gateway.toml`. Kept in sync with [`crate::schema`]
//! and [`crate::docs`].

/// Returns a canonical example `gateway.toml` configuration.
#[must_use]
pub fn gateway_toml_example() -> String {
    String::from(
        r#"[server]
bind_addr = "0.0.0.0:8080"
max_body_bytes = 1048576

[store]
backend = "sqlite"
path = "gateway.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000

[cache]
ttl_ms = 300000
max_entries = 16384

[sandbox]
timeout_ms = 2000
memory_limit_bytes = 16777216

[workers]
watchdog_interval_ms = 30000
stuck_threshold_ms = 300000
retry_poll_interval_ms = 5000
schedule_poll_interval_ms = 1000
source_poll_interval_ms = 2000

[auth]
# api_key and jwt_secret are expected to be supplied via environment
# override (API_KEY, JWT_SECRET), not committed here.
"#,
    )
}
