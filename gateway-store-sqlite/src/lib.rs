// gateway-store-sqlite/src/lib.rs
// ============================================================================
// Module: Gateway SQLite Store
// Description: Durable SQLite-backed implementations of every gateway-core store trait.
// Purpose: Production persistence for integration configs, audit, execution logs, DLQ, and schedules.
// Dependencies: gateway-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate persists every durable aggregate the gateway defines:
//! integration configurations and lookup tables (C1), the event audit ledger
//! (C2), the unified execution log (C12), the dead-letter queue (C10), and
//! scheduled deliveries (C11). Rate-limit windows are intentionally not
//! persisted here; they remain an in-memory, best-effort concern owned by
//! `gateway-providers`, since no durable store trait exists for them.

pub mod store;

pub use store::GatewaySqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
