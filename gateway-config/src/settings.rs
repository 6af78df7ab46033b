// gateway-config/src/settings.rs
// ============================================================================
// Module: Gateway Process Settings
// Description: Static process configuration loading and validation.
// Purpose: Provide strict, fail-closed settings parsing for the gateway binary.
// Dependencies: gateway-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Process settings are loaded from a TOML file (or environment variable
//! overrides, applied by the CLI) with strict size and path limits. Missing
//! or invalid settings fail closed rather than falling back to a silently
//! permissive default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use gateway_store_sqlite::SqliteStoreMode;
use gateway_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

const DEFAULT_CONFIG_NAME: &str = "gateway.toml";
pub(crate) const CONFIG_ENV_VAR: &str = "GATEWAY_CONFIG";
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
pub(crate) const MIN_CACHE_TTL_MS: u64 = 0;
pub(crate) const MAX_CACHE_TTL_MS: u64 = 60 * 60 * 1000;
pub(crate) const MAX_CACHE_ENTRIES: usize = 1_000_000;
pub(crate) const MIN_SANDBOX_TIMEOUT_MS: u64 = 1;
pub(crate) const MAX_SANDBOX_TIMEOUT_MS: u64 = 30_000;
pub(crate) const MIN_SANDBOX_MEMORY_BYTES: u64 = 1024 * 1024;
pub(crate) const MAX_SANDBOX_MEMORY_BYTES: u64 = 512 * 1024 * 1024;
pub(crate) const MIN_POLL_INTERVAL_MS: u64 = 50;
pub(crate) const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;

pub(crate) fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

pub(crate) const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

pub(crate) const fn default_cache_ttl_ms() -> u64 {
    5 * 60 * 1000
}

pub(crate) const fn default_cache_max_entries() -> usize {
    16_384
}

pub(crate) const fn default_sandbox_timeout_ms() -> u64 {
    2_000
}

pub(crate) const fn default_sandbox_memory_bytes() -> u64 {
    16 * 1024 * 1024
}

pub(crate) const fn default_watchdog_interval_ms() -> u64 {
    30_000
}

pub(crate) const fn default_stuck_threshold_ms() -> u64 {
    5 * 60 * 1000
}

pub(crate) const fn default_retry_poll_interval_ms() -> u64 {
    5_000
}

pub(crate) const fn default_schedule_poll_interval_ms() -> u64 {
    1_000
}

pub(crate) const fn default_source_poll_interval_ms() -> u64 {
    2_000
}

pub(crate) const fn default_busy_timeout_ms() -> u64 {
    5_000
}

// ============================================================================
// SECTION: Settings Model
// ============================================================================

/// Root process settings for a gateway instance.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Durable store selection and connection settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// C1 config cache tuning.
    #[serde(default)]
    pub cache: CacheConfig,
    /// C5 sandbox resource limits.
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Worker poll/scan interval tuning (C2, C3, C10, C11).
    #[serde(default)]
    pub workers: WorkerConfig,
    /// Inbound/outbound auth secrets for the control surfaces named in spec.md §6.
    #[serde(default)]
    pub auth: GatewayAuthConfig,
    /// Source-config metadata; not serialized.
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl GatewaySettings {
    /// Loads settings from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| SettingsError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(SettingsError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| SettingsError::Invalid("config file must be utf-8".to_string()))?;
        let mut settings: Self =
            toml::from_str(content).map_err(|err| SettingsError::Parse(err.to_string()))?;
        settings.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        settings.validate()?;
        Ok(settings)
    }

    /// Validates settings for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when settings are invalid.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.server.validate()?;
        self.store.validate()?;
        self.cache.validate()?;
        self.sandbox.validate()?;
        self.workers.validate()?;
        Ok(())
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            sandbox: SandboxConfig::default(),
            workers: WorkerConfig::default(),
            auth: GatewayAuthConfig::default(),
            source_modified_at: None,
        }
    }
}

/// HTTP server bind and body-size limits.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the axum router binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Maximum accepted inbound request body size, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        self.bind_addr
            .parse::<SocketAddr>()
            .map_err(|_| SettingsError::Invalid("server.bind_addr is not a valid socket address".to_string()))?;
        if self.max_body_bytes == 0 {
            return Err(SettingsError::Invalid("server.max_body_bytes must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Durable store backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Non-durable, process-local reference stores (testing/dev only).
    Memory,
    /// SQLite-backed durable persistence.
    Sqlite(SqliteStoreSettings),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        match self {
            Self::Memory => Ok(()),
            Self::Sqlite(settings) => settings.validate(),
        }
    }
}

/// SQLite store connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreSettings {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Busy timeout, in milliseconds, before a locked-database error surfaces.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode (`wal` or `delete`).
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Synchronous mode (`full` or `normal`).
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        validate_path_string("store.path", &self.path.to_string_lossy())?;
        if self.busy_timeout_ms == 0 {
            return Err(SettingsError::Invalid("store.busy_timeout_ms must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// C1 config-store cache tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Time a cached entry remains valid before a re-fetch is forced.
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
    /// Maximum number of cached entries per shard before eviction kicks in.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl_ms(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_CACHE_TTL_MS..=MAX_CACHE_TTL_MS).contains(&self.ttl_ms) {
            return Err(SettingsError::Invalid(format!(
                "cache.ttl_ms must be between {MIN_CACHE_TTL_MS} and {MAX_CACHE_TTL_MS}"
            )));
        }
        if self.max_entries == 0 || self.max_entries > MAX_CACHE_ENTRIES {
            return Err(SettingsError::Invalid(format!(
                "cache.max_entries must be between 1 and {MAX_CACHE_ENTRIES}"
            )));
        }
        Ok(())
    }
}

/// C5 sandbox execution limits.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    /// Wall-clock execution budget per script invocation, in milliseconds.
    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,
    /// Memory ceiling for the QuickJS runtime, in bytes.
    #[serde(default = "default_sandbox_memory_bytes")]
    pub memory_limit_bytes: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_sandbox_timeout_ms(),
            memory_limit_bytes: default_sandbox_memory_bytes(),
        }
    }
}

impl SandboxConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_SANDBOX_TIMEOUT_MS..=MAX_SANDBOX_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(SettingsError::Invalid(format!(
                "sandbox.timeout_ms must be between {MIN_SANDBOX_TIMEOUT_MS} and {MAX_SANDBOX_TIMEOUT_MS}"
            )));
        }
        if !(MIN_SANDBOX_MEMORY_BYTES..=MAX_SANDBOX_MEMORY_BYTES).contains(&self.memory_limit_bytes) {
            return Err(SettingsError::Invalid(format!(
                "sandbox.memory_limit_bytes must be between {MIN_SANDBOX_MEMORY_BYTES} and {MAX_SANDBOX_MEMORY_BYTES}"
            )));
        }
        Ok(())
    }
}

/// Worker poll/scan interval tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// C2 watchdog scan interval.
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
    /// C2 `PROCESSING` age after which an event is declared stuck.
    #[serde(default = "default_stuck_threshold_ms")]
    pub stuck_threshold_ms: u64,
    /// C10 retry/DLQ claim-due poll interval.
    #[serde(default = "default_retry_poll_interval_ms")]
    pub retry_poll_interval_ms: u64,
    /// C11 scheduler claim-due poll interval.
    #[serde(default = "default_schedule_poll_interval_ms")]
    pub schedule_poll_interval_ms: u64,
    /// C3 source adapter poll interval.
    #[serde(default = "default_source_poll_interval_ms")]
    pub source_poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            watchdog_interval_ms: default_watchdog_interval_ms(),
            stuck_threshold_ms: default_stuck_threshold_ms(),
            retry_poll_interval_ms: default_retry_poll_interval_ms(),
            schedule_poll_interval_ms: default_schedule_poll_interval_ms(),
            source_poll_interval_ms: default_source_poll_interval_ms(),
        }
    }
}

impl WorkerConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        for (field, value) in [
            ("workers.watchdog_interval_ms", self.watchdog_interval_ms),
            ("workers.retry_poll_interval_ms", self.retry_poll_interval_ms),
            ("workers.schedule_poll_interval_ms", self.schedule_poll_interval_ms),
            ("workers.source_poll_interval_ms", self.source_poll_interval_ms),
        ] {
            if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&value) {
                return Err(SettingsError::Invalid(format!(
                    "{field} must be between {MIN_POLL_INTERVAL_MS} and {MAX_POLL_INTERVAL_MS}"
                )));
            }
        }
        if self.stuck_threshold_ms == 0 {
            return Err(SettingsError::Invalid("workers.stuck_threshold_ms must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Control-surface auth secrets (spec.md §6). Values are expected to be
/// supplied via environment override at the CLI layer, not committed to a
/// checked-in TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayAuthConfig {
    /// Static API key accepted on the DLQ/execution-log control surfaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// HMAC secret used to verify bearer JWTs on the control surfaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised loading or validating process settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// I/O failure while reading settings.
    #[error("settings io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("settings parse error: {0}")]
    Parse(String),
    /// Invalid settings data.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn resolve_path(path: Option<&Path>) -> Result<PathBuf, SettingsError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(SettingsError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

fn validate_path(path: &Path) -> Result<(), SettingsError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SettingsError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SettingsError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

fn validate_path_string(field: &str, value: &str) -> Result<(), SettingsError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SettingsError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SettingsError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SettingsError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        let settings = GatewaySettings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn server_rejects_invalid_bind_addr() {
        let mut settings = GatewaySettings::default();
        settings.server.bind_addr = "not-an-address".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn cache_rejects_zero_max_entries() {
        let mut settings = GatewaySettings::default();
        settings.cache.max_entries = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn sqlite_store_requires_non_empty_path() {
        let settings = StoreConfig::Sqlite(SqliteStoreSettings {
            path: PathBuf::new(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        });
        assert!(settings.validate().is_err());
    }

    #[test]
    fn load_parses_toml_from_explicit_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gateway.toml");
        fs::write(&path, "[server]\nbind_addr = \"127.0.0.1:9000\"\n").expect("write config");
        let settings = GatewaySettings::load(Some(&path)).expect("load settings");
        assert_eq!(settings.server.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn load_rejects_oversized_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gateway.toml");
        let oversized = "# ".to_string() + &"x".repeat(MAX_CONFIG_FILE_SIZE + 1);
        fs::write(&path, oversized).expect("write config");
        let result = GatewaySettings::load(Some(&path));
        assert!(result.is_err());
    }
}
