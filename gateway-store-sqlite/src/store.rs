// gateway-store-sqlite/src/store.rs
// ============================================================================
// Module: Gateway SQLite Store
// Description: SQLite-backed ConfigStore/AuditStore/ExecutionLogStore/DlqStore/ScheduleStore.
// Purpose: Persist gateway aggregates across restarts with WAL durability.
// Dependencies: gateway-core, rusqlite, serde_json, tokio
// ============================================================================

//! ## Overview
//! Every method offloads its `rusqlite` work to a blocking thread via
//! [`tokio::task::spawn_blocking`], since the underlying connection is
//! synchronous. A single [`Mutex`]-guarded [`Connection`] serializes all
//! access, which doubles as the compare-and-swap mechanism for `claim` /
//! `claim_due`: the whole read-mutate-write sequence runs under one lock
//! acquisition, so no other caller can observe or act on an intermediate
//! state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use gateway_core::core::DLQEntry;
use gateway_core::core::DlqId;
use gateway_core::core::DlqStatus;
use gateway_core::core::EventAudit;
use gateway_core::core::EventId;
use gateway_core::core::ExecutionLog;
use gateway_core::core::IntegrationConfig;
use gateway_core::core::IntegrationId;
use gateway_core::core::LookupTable;
use gateway_core::core::ScheduleId;
use gateway_core::core::ScheduleStatus;
use gateway_core::core::ScheduledDelivery;
use gateway_core::core::TenantId;
use gateway_core::core::Timestamp;
use gateway_core::core::TraceId;
use gateway_core::interfaces::AuditStore;
use gateway_core::interfaces::ConfigStore;
use gateway_core::interfaces::DlqStore;
use gateway_core::interfaces::ExecutionLogStore;
use gateway_core::interfaces::ScheduleStore;
use gateway_core::interfaces::StoreError;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version written to `schema_version` on first initialization.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms) before `SQLITE_BUSY` is surfaced to the caller.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum size, in bytes, of any single stored JSON blob.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended for concurrent readers).
    #[default]
    Wal,
    /// Delete journal mode (legacy, simpler for single-writer deployments).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the pragma value for this mode.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` synchronous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest, fsyncs on every commit).
    #[default]
    Full,
    /// Normal synchronous mode, safe under WAL, faster under load.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the pragma value for this mode.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for [`GatewaySqliteStore`].
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised opening or operating the `SQLite` store.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Filesystem or connection I/O failure.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored JSON failed to deserialize or violated an invariant on read.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// A row's expected precondition did not hold (CAS miss).
    #[error("sqlite store cas precondition failed: {0}")]
    CasFailed(String),
    /// The requested record does not exist.
    #[error("sqlite store record not found: {0}")]
    NotFound(String),
    /// A stored payload exceeded [`MAX_RECORD_BYTES`].
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::CasFailed(message) => Self::CasFailed(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::TooLarge { max_bytes, actual_bytes } => {
                Self::Invalid(format!("payload exceeds size limit: {actual_bytes} bytes (max {max_bytes})"))
            }
        }
    }
}

fn join_error(err: tokio::task::JoinError) -> StoreError {
    StoreError::Io(format!("sqlite worker task panicked: {err}"))
}

// ============================================================================
// SECTION: Connection Setup
// ============================================================================

fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| SqliteStoreError::Io(e.to_string()))?;
        }
    }
    Ok(())
}

fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let connection = Connection::open_with_flags(
        &config.path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
    connection
        .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
    connection
        .pragma_update(None, "synchronous", config.sync_mode.pragma_value())
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
    connection
        .pragma_update(None, "foreign_keys", "on")
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
    Ok(connection)
}

fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|e| SqliteStoreError::Db(e.to_string()))?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);

         CREATE TABLE IF NOT EXISTS integration_configs (
             id TEXT PRIMARY KEY,
             tenant_id TEXT NOT NULL,
             is_active INTEGER NOT NULL,
             config_json BLOB NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_integration_configs_tenant ON integration_configs(tenant_id);
         CREATE INDEX IF NOT EXISTS idx_integration_configs_active ON integration_configs(is_active);

         CREATE TABLE IF NOT EXISTS tenant_parents (
             child TEXT PRIMARY KEY,
             parent TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS lookup_tables (
             tenant_id TEXT NOT NULL,
             lookup_type TEXT NOT NULL,
             table_json BLOB NOT NULL,
             PRIMARY KEY (tenant_id, lookup_type)
         );

         CREATE TABLE IF NOT EXISTS event_audit (
             event_id TEXT PRIMARY KEY,
             tenant_id TEXT NOT NULL,
             status TEXT NOT NULL,
             started_at INTEGER,
             checkpoint_offset INTEGER NOT NULL,
             audit_json BLOB NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_event_audit_tenant ON event_audit(tenant_id);
         CREATE INDEX IF NOT EXISTS idx_event_audit_status ON event_audit(status);

         CREATE TABLE IF NOT EXISTS execution_logs (
             trace_id TEXT PRIMARY KEY,
             started_at INTEGER NOT NULL,
             log_json BLOB NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_execution_logs_started_at ON execution_logs(started_at);

         CREATE TABLE IF NOT EXISTS failed_deliveries (
             dlq_id TEXT PRIMARY KEY,
             status TEXT NOT NULL,
             next_retry_at INTEGER NOT NULL,
             entry_json BLOB NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_failed_deliveries_due ON failed_deliveries(status, next_retry_at);

         CREATE TABLE IF NOT EXISTS scheduled_deliveries (
             schedule_id TEXT PRIMARY KEY,
             status TEXT NOT NULL,
             fire_at INTEGER NOT NULL,
             entry_json BLOB NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_scheduled_deliveries_due ON scheduled_deliveries(status, fire_at);",
    )
    .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
    tx.execute("INSERT INTO schema_version (version) SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM schema_version)", params![SCHEMA_VERSION])
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
    tx.commit().map_err(|e| SqliteStoreError::Db(e.to_string()))
}

// ============================================================================
// SECTION: Serialization Helpers
// ============================================================================

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, SqliteStoreError> {
    let bytes = serde_json::to_vec(value).map_err(|e| SqliteStoreError::Invalid(e.to_string()))?;
    if bytes.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge { max_bytes: MAX_RECORD_BYTES, actual_bytes: bytes.len() });
    }
    Ok(bytes)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, SqliteStoreError> {
    serde_json::from_slice(bytes).map_err(|e| SqliteStoreError::Invalid(e.to_string()))
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed persistence for every durable gateway aggregate.
#[derive(Clone)]
pub struct GatewaySqliteStore {
    connection: Arc<Mutex<Connection>>,
}

impl GatewaySqliteStore {
    /// Opens (creating if absent) a `SQLite`-backed store at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the database cannot be opened,
    /// configured, or schema-initialized.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: ConfigStore
// ============================================================================

#[async_trait]
impl ConfigStore for GatewaySqliteStore {
    async fn get_by_id(&self, id: &IntegrationId) -> Result<Option<IntegrationConfig>, StoreError> {
        let store = self.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || store.get_by_id_blocking(&id))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn list_for_tenant_and_event(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<Vec<IntegrationConfig>, StoreError> {
        let store = self.clone();
        let tenant_id = tenant_id.clone();
        let event_type = event_type.to_string();
        tokio::task::spawn_blocking(move || store.list_for_tenant_and_event_blocking(&tenant_id, &event_type))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn ancestors_of(&self, tenant_id: &TenantId) -> Result<Vec<TenantId>, StoreError> {
        let store = self.clone();
        let tenant_id = tenant_id.clone();
        tokio::task::spawn_blocking(move || store.ancestors_of_blocking(&tenant_id))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn update_token_cache(&self, id: &IntegrationId, patch: Value) -> Result<(), StoreError> {
        let store = self.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || store.update_token_cache_blocking(&id, patch))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn save(&self, config: &IntegrationConfig) -> Result<(), StoreError> {
        let store = self.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || store.save_config_blocking(&config))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn get_lookup_table(
        &self,
        tenant_id: &TenantId,
        lookup_type: &str,
    ) -> Result<Option<LookupTable>, StoreError> {
        let store = self.clone();
        let tenant_id = tenant_id.clone();
        let lookup_type = lookup_type.to_string();
        tokio::task::spawn_blocking(move || store.get_lookup_table_blocking(&tenant_id, &lookup_type))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }
}

impl GatewaySqliteStore {
    fn get_by_id_blocking(&self, id: &IntegrationId) -> Result<Option<IntegrationConfig>, SqliteStoreError> {
        let conn = self.lock()?;
        let blob: Option<Vec<u8>> = conn
            .query_row("SELECT config_json FROM integration_configs WHERE id = ?1", params![id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        blob.map(|bytes| decode(&bytes)).transpose()
    }

    fn list_for_tenant_and_event_blocking(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<Vec<IntegrationConfig>, SqliteStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT config_json FROM integration_configs WHERE is_active = 1")
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let mut configs = Vec::new();
        for row in rows {
            let bytes = row.map_err(|e| SqliteStoreError::Db(e.to_string()))?;
            let config: IntegrationConfig = decode(&bytes)?;
            let in_scope = &config.tenant.tenant_id == tenant_id
                || matches!(config.tenant.scope, gateway_core::core::Scope::IncludeChildren);
            if in_scope && config.matches_event_type(event_type) {
                configs.push(config);
            }
        }
        Ok(configs)
    }

    fn ancestors_of_blocking(&self, tenant_id: &TenantId) -> Result<Vec<TenantId>, SqliteStoreError> {
        let conn = self.lock()?;
        let mut chain = Vec::new();
        let mut current = tenant_id.clone();
        loop {
            let parent: Option<String> = conn
                .query_row("SELECT parent FROM tenant_parents WHERE child = ?1", params![current.as_str()], |row| row.get(0))
                .optional()
                .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
            let Some(parent) = parent else { break };
            let parent = TenantId::new(parent);
            chain.push(parent.clone());
            current = parent;
            if chain.len() > 64 {
                return Err(SqliteStoreError::Invalid(format!("tenant hierarchy cycle detected at {tenant_id}")));
            }
        }
        Ok(chain)
    }

    fn update_token_cache_blocking(&self, id: &IntegrationId, patch: Value) -> Result<(), SqliteStoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let blob: Option<Vec<u8>> = tx
            .query_row("SELECT config_json FROM integration_configs WHERE id = ?1", params![id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let Some(blob) = blob else {
            return Err(SqliteStoreError::NotFound(id.to_string()));
        };
        let mut config: IntegrationConfig = decode(&blob)?;
        match &mut config.auth {
            gateway_core::core::AuthSpec::OAuth2 { cached_token, .. }
            | gateway_core::core::AuthSpec::Custom { cached_token, .. } => {
                *cached_token = serde_json::from_value(patch).map_err(|e| SqliteStoreError::Invalid(e.to_string()))?;
            }
            _ => {}
        }
        let encoded = encode(&config)?;
        tx.execute("UPDATE integration_configs SET config_json = ?1 WHERE id = ?2", params![encoded, id.as_str()])
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        tx.commit().map_err(|e| SqliteStoreError::Db(e.to_string()))
    }

    fn save_config_blocking(&self, config: &IntegrationConfig) -> Result<(), SqliteStoreError> {
        let conn = self.lock()?;
        let encoded = encode(config)?;
        conn.execute(
            "INSERT INTO integration_configs (id, tenant_id, is_active, config_json) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET tenant_id = excluded.tenant_id, is_active = excluded.is_active, config_json = excluded.config_json",
            params![config.id.as_str(), config.tenant.tenant_id.as_str(), i64::from(config.is_active), encoded],
        )
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        Ok(())
    }

    fn get_lookup_table_blocking(&self, tenant_id: &TenantId, lookup_type: &str) -> Result<Option<LookupTable>, SqliteStoreError> {
        let conn = self.lock()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT table_json FROM lookup_tables WHERE tenant_id = ?1 AND lookup_type = ?2",
                params![tenant_id.as_str(), lookup_type],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        blob.map(|bytes| decode(&bytes)).transpose()
    }

    /// Registers `child`'s parent tenant for [`ConfigStore::ancestors_of`] resolution.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on I/O failure.
    pub fn set_parent(&self, child: &TenantId, parent: &TenantId) -> Result<(), SqliteStoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tenant_parents (child, parent) VALUES (?1, ?2)
             ON CONFLICT(child) DO UPDATE SET parent = excluded.parent",
            params![child.as_str(), parent.as_str()],
        )
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        Ok(())
    }

    /// Inserts or replaces a lookup table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on I/O failure.
    pub fn set_lookup_table(&self, table: &LookupTable) -> Result<(), SqliteStoreError> {
        let conn = self.lock()?;
        let encoded = encode(table)?;
        conn.execute(
            "INSERT INTO lookup_tables (tenant_id, lookup_type, table_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id, lookup_type) DO UPDATE SET table_json = excluded.table_json",
            params![table.tenant_id.as_str(), table.lookup_type, encoded],
        )
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: AuditStore
// ============================================================================

#[async_trait]
impl AuditStore for GatewaySqliteStore {
    async fn ingest(&self, audit: EventAudit) -> Result<(), StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.ingest_blocking(&audit))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn claim(&self, event_id: &EventId) -> Result<EventAudit, StoreError> {
        let store = self.clone();
        let event_id = event_id.clone();
        tokio::task::spawn_blocking(move || store.claim_blocking(&event_id))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn finalize(&self, audit: &EventAudit) -> Result<(), StoreError> {
        let store = self.clone();
        let audit = audit.clone();
        tokio::task::spawn_blocking(move || store.ingest_blocking(&audit))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn find_stuck_candidates(&self, threshold: Timestamp) -> Result<Vec<EventAudit>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.find_stuck_candidates_blocking(threshold))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn last_checkpoint(&self, tenant_id: &TenantId) -> Result<Option<i64>, StoreError> {
        let store = self.clone();
        let tenant_id = tenant_id.clone();
        tokio::task::spawn_blocking(move || store.last_checkpoint_blocking(&tenant_id))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }
}

impl GatewaySqliteStore {
    fn ingest_blocking(&self, audit: &EventAudit) -> Result<(), SqliteStoreError> {
        let conn = self.lock()?;
        let encoded = encode(audit)?;
        let status = format!("{:?}", audit.status).to_uppercase();
        conn.execute(
            "INSERT INTO event_audit (event_id, tenant_id, status, started_at, checkpoint_offset, audit_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(event_id) DO UPDATE SET tenant_id = excluded.tenant_id, status = excluded.status,
                 started_at = excluded.started_at, checkpoint_offset = excluded.checkpoint_offset, audit_json = excluded.audit_json",
            params![
                audit.event_id.as_str(),
                audit.tenant_id.as_str(),
                status,
                audit.started_at.map(|t| t.as_millis()),
                audit.checkpoint_offset,
                encoded,
            ],
        )
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        Ok(())
    }

    fn claim_blocking(&self, event_id: &EventId) -> Result<EventAudit, SqliteStoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let blob: Option<Vec<u8>> = tx
            .query_row("SELECT audit_json FROM event_audit WHERE event_id = ?1", params![event_id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let Some(blob) = blob else {
            return Err(SqliteStoreError::NotFound(event_id.to_string()));
        };
        let mut audit: EventAudit = decode(&blob)?;
        if !audit.try_claim() {
            return Err(SqliteStoreError::CasFailed(event_id.to_string()));
        }
        let encoded = encode(&audit)?;
        let status = format!("{:?}", audit.status).to_uppercase();
        tx.execute(
            "UPDATE event_audit SET status = ?1, started_at = ?2, audit_json = ?3 WHERE event_id = ?4",
            params![status, audit.started_at.map(|t| t.as_millis()), encoded, event_id.as_str()],
        )
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        tx.commit().map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        Ok(audit)
    }

    fn find_stuck_candidates_blocking(&self, threshold: Timestamp) -> Result<Vec<EventAudit>, SqliteStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT audit_json FROM event_audit WHERE status = 'PROCESSING' AND started_at IS NOT NULL AND started_at <= ?1")
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let rows = stmt
            .query_map(params![threshold.as_millis()], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(decode(&row.map_err(|e| SqliteStoreError::Db(e.to_string()))?)?);
        }
        Ok(out)
    }

    fn last_checkpoint_blocking(&self, tenant_id: &TenantId) -> Result<Option<i64>, SqliteStoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT MAX(checkpoint_offset) FROM event_audit WHERE tenant_id = ?1",
            params![tenant_id.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| SqliteStoreError::Db(e.to_string()))
    }
}

// ============================================================================
// SECTION: ExecutionLogStore
// ============================================================================

#[async_trait]
impl ExecutionLogStore for GatewaySqliteStore {
    async fn open(&self, log: ExecutionLog) -> Result<(), StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save_log_blocking(&log))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn save(&self, log: &ExecutionLog) -> Result<(), StoreError> {
        let store = self.clone();
        let log = log.clone();
        tokio::task::spawn_blocking(move || store.save_log_blocking(&log))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn get(&self, trace_id: &TraceId) -> Result<Option<ExecutionLog>, StoreError> {
        let store = self.clone();
        let trace_id = trace_id.clone();
        tokio::task::spawn_blocking(move || store.get_log_blocking(&trace_id))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ExecutionLog>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.list_recent_logs_blocking(limit))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }
}

impl GatewaySqliteStore {
    fn save_log_blocking(&self, log: &ExecutionLog) -> Result<(), SqliteStoreError> {
        let conn = self.lock()?;
        let encoded = encode(log)?;
        conn.execute(
            "INSERT INTO execution_logs (trace_id, started_at, log_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(trace_id) DO UPDATE SET started_at = excluded.started_at, log_json = excluded.log_json",
            params![log.trace_id.as_str(), log.started_at.as_millis(), encoded],
        )
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        Ok(())
    }

    fn get_log_blocking(&self, trace_id: &TraceId) -> Result<Option<ExecutionLog>, SqliteStoreError> {
        let conn = self.lock()?;
        let blob: Option<Vec<u8>> = conn
            .query_row("SELECT log_json FROM execution_logs WHERE trace_id = ?1", params![trace_id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        blob.map(|bytes| decode(&bytes)).transpose()
    }

    fn list_recent_logs_blocking(&self, limit: usize) -> Result<Vec<ExecutionLog>, SqliteStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT log_json FROM execution_logs ORDER BY started_at DESC LIMIT ?1")
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let rows = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(decode(&row.map_err(|e| SqliteStoreError::Db(e.to_string()))?)?);
        }
        Ok(out)
    }
}

// ============================================================================
// SECTION: DlqStore
// ============================================================================

#[async_trait]
impl DlqStore for GatewaySqliteStore {
    async fn upsert(&self, entry: &DLQEntry) -> Result<(), StoreError> {
        let store = self.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || store.upsert_dlq_blocking(&entry))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn get(&self, dlq_id: &DlqId) -> Result<Option<DLQEntry>, StoreError> {
        let store = self.clone();
        let dlq_id = dlq_id.clone();
        tokio::task::spawn_blocking(move || store.get_dlq_blocking(&dlq_id))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn list(&self, limit: usize) -> Result<Vec<DLQEntry>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.list_dlq_blocking(limit))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn claim_due(&self, now: Timestamp, batch_size: usize) -> Result<Vec<DLQEntry>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.claim_due_dlq_blocking(now, batch_size))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn delete(&self, dlq_id: &DlqId) -> Result<(), StoreError> {
        let store = self.clone();
        let dlq_id = dlq_id.clone();
        tokio::task::spawn_blocking(move || store.delete_dlq_blocking(&dlq_id))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }
}

fn dlq_status_label(status: DlqStatus) -> &'static str {
    match status {
        DlqStatus::Pending => "pending",
        DlqStatus::Retrying => "retrying",
        DlqStatus::Resolved => "resolved",
        DlqStatus::Abandoned => "abandoned",
    }
}

impl GatewaySqliteStore {
    fn upsert_dlq_blocking(&self, entry: &DLQEntry) -> Result<(), SqliteStoreError> {
        let conn = self.lock()?;
        let encoded = encode(entry)?;
        conn.execute(
            "INSERT INTO failed_deliveries (dlq_id, status, next_retry_at, entry_json) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(dlq_id) DO UPDATE SET status = excluded.status, next_retry_at = excluded.next_retry_at, entry_json = excluded.entry_json",
            params![entry.dlq_id.as_str(), dlq_status_label(entry.status), entry.next_retry_at.as_millis(), encoded],
        )
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        Ok(())
    }

    fn get_dlq_blocking(&self, dlq_id: &DlqId) -> Result<Option<DLQEntry>, SqliteStoreError> {
        let conn = self.lock()?;
        let blob: Option<Vec<u8>> = conn
            .query_row("SELECT entry_json FROM failed_deliveries WHERE dlq_id = ?1", params![dlq_id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        blob.map(|bytes| decode(&bytes)).transpose()
    }

    fn list_dlq_blocking(&self, limit: usize) -> Result<Vec<DLQEntry>, SqliteStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT entry_json FROM failed_deliveries LIMIT ?1")
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let rows = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(decode(&row.map_err(|e| SqliteStoreError::Db(e.to_string()))?)?);
        }
        Ok(out)
    }

    fn claim_due_dlq_blocking(&self, now: Timestamp, batch_size: usize) -> Result<Vec<DLQEntry>, SqliteStoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let ids: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT dlq_id FROM failed_deliveries WHERE status = 'pending' AND next_retry_at <= ?1 LIMIT ?2")
                .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
            let rows = stmt
                .query_map(params![now.as_millis(), i64::try_from(batch_size).unwrap_or(i64::MAX)], |row| row.get::<_, String>(0))
                .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|e| SqliteStoreError::Db(e.to_string()))?
        };
        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            let blob: Vec<u8> = tx
                .query_row("SELECT entry_json FROM failed_deliveries WHERE dlq_id = ?1", params![id], |row| row.get(0))
                .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
            let mut entry: DLQEntry = decode(&blob)?;
            if entry.claim().is_err() {
                continue;
            }
            let encoded = encode(&entry)?;
            tx.execute(
                "UPDATE failed_deliveries SET status = ?1, entry_json = ?2 WHERE dlq_id = ?3",
                params![dlq_status_label(entry.status), encoded, id],
            )
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
            claimed.push(entry);
        }
        tx.commit().map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        Ok(claimed)
    }

    fn delete_dlq_blocking(&self, dlq_id: &DlqId) -> Result<(), SqliteStoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM failed_deliveries WHERE dlq_id = ?1", params![dlq_id.as_str()])
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: ScheduleStore
// ============================================================================

#[async_trait]
impl ScheduleStore for GatewaySqliteStore {
    async fn upsert(&self, entry: &ScheduledDelivery) -> Result<(), StoreError> {
        let store = self.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || store.upsert_schedule_blocking(&entry))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn get(&self, schedule_id: &ScheduleId) -> Result<Option<ScheduledDelivery>, StoreError> {
        let store = self.clone();
        let schedule_id = schedule_id.clone();
        tokio::task::spawn_blocking(move || store.get_schedule_blocking(&schedule_id))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }

    async fn claim_due(&self, now: Timestamp, batch_size: usize) -> Result<Vec<ScheduledDelivery>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.claim_due_schedule_blocking(now, batch_size))
            .await
            .map_err(join_error)?
            .map_err(StoreError::from)
    }
}

fn schedule_status_label(status: ScheduleStatus) -> &'static str {
    match status {
        ScheduleStatus::Pending => "PENDING",
        ScheduleStatus::Sent => "SENT",
        ScheduleStatus::Cancelled => "CANCELLED",
        ScheduleStatus::Overdue => "OVERDUE",
        ScheduleStatus::Failed => "FAILED",
    }
}

impl GatewaySqliteStore {
    fn upsert_schedule_blocking(&self, entry: &ScheduledDelivery) -> Result<(), SqliteStoreError> {
        let conn = self.lock()?;
        let encoded = encode(entry)?;
        conn.execute(
            "INSERT INTO scheduled_deliveries (schedule_id, status, fire_at, entry_json) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(schedule_id) DO UPDATE SET status = excluded.status, fire_at = excluded.fire_at, entry_json = excluded.entry_json",
            params![entry.schedule_id.as_str(), schedule_status_label(entry.status), entry.fire_at.as_millis(), encoded],
        )
        .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        Ok(())
    }

    fn get_schedule_blocking(&self, schedule_id: &ScheduleId) -> Result<Option<ScheduledDelivery>, SqliteStoreError> {
        let conn = self.lock()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT entry_json FROM scheduled_deliveries WHERE schedule_id = ?1",
                params![schedule_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        blob.map(|bytes| decode(&bytes)).transpose()
    }

    fn claim_due_schedule_blocking(&self, now: Timestamp, batch_size: usize) -> Result<Vec<ScheduledDelivery>, SqliteStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT entry_json FROM scheduled_deliveries
                 WHERE status IN ('PENDING', 'OVERDUE') AND fire_at <= ?1 LIMIT ?2",
            )
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let rows = stmt
            .query_map(params![now.as_millis(), i64::try_from(batch_size).unwrap_or(i64::MAX)], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| SqliteStoreError::Db(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(decode(&row.map_err(|e| SqliteStoreError::Db(e.to_string()))?)?);
        }
        Ok(out)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::collections::HashMap;

    use super::*;
    use gateway_core::core::AuthSpec;
    use gateway_core::core::Direction;
    use gateway_core::core::ErrorCategory;
    use gateway_core::core::ErrorDetail;
    use gateway_core::core::EventStatus;
    use gateway_core::core::RateLimitSpec;
    use gateway_core::core::RetryStrategy;
    use gateway_core::core::Scope;
    use gateway_core::core::SigningSpec;
    use gateway_core::core::TenantScope;
    use gateway_core::core::TransformMode;
    use gateway_core::core::TransformSpec;

    fn test_store() -> (GatewaySqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig {
            path: dir.path().join("gateway.sqlite3"),
            busy_timeout_ms: 1_000,
            journal_mode: SqliteStoreMode::Wal,
            sync_mode: SqliteSyncMode::Normal,
        };
        (GatewaySqliteStore::open(config).expect("open store"), dir)
    }

    fn sample_config(id: &str, tenant: &str) -> IntegrationConfig {
        IntegrationConfig {
            id: IntegrationId::new(id),
            tenant: TenantScope { tenant_id: TenantId::new(tenant), scope: Scope::EntityOnly, excluded_children: BTreeSet::new() },
            name: "sample".to_string(),
            description: None,
            tags: Vec::new(),
            direction: Direction::Outbound,
            is_active: true,
            event_type: "OP_VISIT_CREATED".to_string(),
            target_url: "https://example.test/hook".to_string(),
            http_method: "POST".to_string(),
            timeout_ms: 5_000,
            retry_count: 3,
            headers: HashMap::new(),
            auth: AuthSpec::None,
            inbound_auth: None,
            transformation: TransformSpec { mode: Some(TransformMode::Passthrough), ..Default::default() },
            lookups: Vec::new(),
            condition: None,
            rate_limits: RateLimitSpec { enabled: false, max_requests: 0, window_seconds: 0 },
            signing: SigningSpec::default(),
            delivery_mode: gateway_core::core::DeliveryMode::Immediate,
            scheduling_script: None,
            fetch_query: None,
            actions: None,
            multi_action_delay_ms: None,
            action_resume_mode: gateway_core::core::config::ActionResumeMode::ResumeFromFailure,
        }
    }

    #[tokio::test]
    async fn config_round_trips_through_sqlite() {
        let (store, _dir) = test_store();
        let config = sample_config("int-1", "tenant-a");
        store.save(&config).await.expect("save");
        let fetched = store.get_by_id(&IntegrationId::new("int-1")).await.expect("get").expect("present");
        assert_eq!(fetched.id, config.id);
        assert_eq!(fetched.tenant.tenant_id, config.tenant.tenant_id);
    }

    #[tokio::test]
    async fn ancestors_of_walks_parent_chain() {
        let (store, _dir) = test_store();
        store.set_parent(&TenantId::new("child"), &TenantId::new("parent")).expect("set parent");
        store.set_parent(&TenantId::new("parent"), &TenantId::new("root")).expect("set parent");
        let chain = store.ancestors_of(&TenantId::new("child")).await.expect("ancestors");
        assert_eq!(chain, vec![TenantId::new("parent"), TenantId::new("root")]);
    }

    #[tokio::test]
    async fn audit_claim_is_cas_across_restarts() {
        let (store, _dir) = test_store();
        let audit = EventAudit::ingest(
            EventId::new("e1"),
            TenantId::new("t1"),
            "OP_VISIT_CREATED".to_string(),
            1,
            serde_json::json!({}),
            None,
            None,
        );
        store.ingest(audit).await.expect("ingest");
        let claimed = store.claim(&EventId::new("e1")).await.expect("claim");
        assert_eq!(claimed.status, EventStatus::Processing);
        assert!(store.claim(&EventId::new("e1")).await.is_err());
    }

    #[tokio::test]
    async fn dlq_claim_due_only_returns_due_pending_entries() {
        let (store, _dir) = test_store();
        let entry = DLQEntry {
            dlq_id: DlqId::new("dlq-1"),
            trace_id: TraceId::new("trace-1"),
            execution_log_id: TraceId::new("trace-1"),
            integration_id: IntegrationId::new("int-1"),
            tenant_id: TenantId::new("t1"),
            direction: Direction::Outbound,
            payload: serde_json::json!({}),
            error: ErrorDetail { message: "boom".to_string(), code: None, category: ErrorCategory::Network, status_code: None },
            retry_strategy: RetryStrategy::Exponential,
            retry_count: 0,
            max_retries: 3,
            next_retry_at: Timestamp::from_millis(1_000),
            last_attempt_at: Timestamp::from_millis(0),
            status: DlqStatus::Pending,
            resolution: None,
        };
        store.upsert(&entry).await.expect("upsert");
        assert!(store.claim_due(Timestamp::from_millis(0), 10).await.expect("claim due").is_empty());
        let claimed = store.claim_due(Timestamp::from_millis(1_000), 10).await.expect("claim due");
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, DlqStatus::Retrying);
    }

    #[tokio::test]
    async fn schedule_claim_due_respects_fire_at() {
        let (store, _dir) = test_store();
        let entry = ScheduledDelivery {
            schedule_id: ScheduleId::new("s1"),
            integration_id: IntegrationId::new("int-1"),
            tenant_id: TenantId::new("t1"),
            payload: serde_json::json!({}),
            mode: gateway_core::core::ScheduleMode::Delayed,
            fire_at: Timestamp::from_millis(5_000),
            occurrences_fired: 0,
            status: ScheduleStatus::Pending,
        };
        store.upsert(&entry).await.expect("upsert");
        assert!(store.claim_due(Timestamp::from_millis(0), 10).await.expect("claim due").is_empty());
        let due = store.claim_due(Timestamp::from_millis(5_000), 10).await.expect("claim due");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].schedule_id, entry.schedule_id);
    }

    #[tokio::test]
    async fn execution_log_list_recent_orders_newest_first() {
        let (store, _dir) = test_store();
        for (trace, started) in [("t1", 1_000_i64), ("t2", 2_000), ("t3", 1_500)] {
            let log = ExecutionLog {
                trace_id: TraceId::new(trace),
                message_id: "m-1".to_string(),
                direction: Direction::Outbound,
                trigger_type: gateway_core::core::TriggerType::Event,
                integration_id: IntegrationId::new("int-1"),
                tenant_id: TenantId::new("t1"),
                status: gateway_core::core::LogStatus::Pending,
                started_at: Timestamp::from_millis(started),
                finished_at: None,
                duration_ms: None,
                request: None,
                response: None,
                steps: Vec::new(),
                error: None,
            };
            store.open(log).await.expect("open");
        }
        let recent = store.list_recent(2).await.expect("list recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].trace_id, TraceId::new("t2"));
        assert_eq!(recent[1].trace_id, TraceId::new("t3"));
    }
}
