// gateway-delivery/src/fetch.rs
// ============================================================================
// Module: Scheduled Fetch-Data Step
// Description: Runs a scheduled integration's templated SQL/Mongo/API query.
// Purpose: Source the payload a scheduled delivery hands to the transform
//          stage, rendering its query template first.
// Dependencies: gateway-core, reqwest, rusqlite
// ============================================================================

//! ## Overview
//! A `SCHEDULED` integration's `fetch_query` names a backing store and a
//! templated query. [`DataSource::fetch`] renders the template via
//! [`crate::template::render_template`] and dispatches to the matching
//! backend. Mongo has no driver wired into this deployment; its variant
//! exists so configuration round-trips even where the backend is absent,
//! and fails loudly rather than silently returning nothing.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use gateway_core::core::IntegrationId;
use gateway_core::core::TenantId;
use gateway_core::core::config::FetchQuerySpec;
use gateway_core::core::config::FetchSource;
use serde_json::Value;
use thiserror::Error;

use crate::template::TemplateContext;
use crate::template::render_template;

/// Errors raised running a scheduled integration's `fetch_data` step.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The rendered query failed against its backing store.
    #[error("fetch_data query failed: {0}")]
    Query(String),
    /// No driver is configured for the requested source.
    #[error("{0:?} data sources are not wired in this deployment")]
    Unsupported(FetchSource),
}

/// Runs a scheduled integration's `fetch_data` step.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Renders `spec.query` and runs it against `spec.source`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the query fails or the source has no driver.
    async fn fetch(&self, spec: &FetchQuerySpec, tenant_id: &TenantId, integration_id: &IntegrationId) -> Result<Value, FetchError>;
}

/// A [`DataSource`] backing SQL queries with a local `rusqlite` connection
/// and API queries with a plain HTTP GET.
pub struct GatewayDataSource {
    http: reqwest::Client,
    sqlite: Option<Arc<StdMutex<rusqlite::Connection>>>,
}

impl GatewayDataSource {
    /// Builds a data source over the given collaborators. `sqlite` is
    /// `None` in deployments with no SQL-sourced scheduled integrations.
    #[must_use]
    pub fn new(http: reqwest::Client, sqlite: Option<Arc<StdMutex<rusqlite::Connection>>>) -> Self {
        Self { http, sqlite }
    }
}

#[async_trait]
impl DataSource for GatewayDataSource {
    async fn fetch(&self, spec: &FetchQuerySpec, tenant_id: &TenantId, integration_id: &IntegrationId) -> Result<Value, FetchError> {
        let ctx = TemplateContext { tenant_id, integration_id };
        let rendered = render_template(&spec.query, &ctx);
        match spec.source {
            FetchSource::Api => {
                let response = self.http.get(&rendered).send().await.map_err(|err| FetchError::Query(err.to_string()))?;
                response.json::<Value>().await.map_err(|err| FetchError::Query(err.to_string()))
            }
            FetchSource::Sql => {
                let Some(conn) = self.sqlite.clone() else {
                    return Err(FetchError::Unsupported(FetchSource::Sql));
                };
                tokio::task::spawn_blocking(move || run_sql_query(&conn, &rendered))
                    .await
                    .map_err(|err| FetchError::Query(err.to_string()))?
            }
            FetchSource::Mongo => Err(FetchError::Unsupported(FetchSource::Mongo)),
        }
    }
}

fn run_sql_query(conn: &StdMutex<rusqlite::Connection>, query: &str) -> Result<Value, FetchError> {
    let guard = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let mut stmt = guard.prepare(query).map_err(|err| FetchError::Query(err.to_string()))?;
    let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
    let rows = stmt
        .query_map([], |row| {
            let mut obj = serde_json::Map::new();
            for (index, name) in columns.iter().enumerate() {
                let value: rusqlite::types::Value = row.get(index)?;
                obj.insert(name.clone(), sql_value_to_json(value));
            }
            Ok(Value::Object(obj))
        })
        .map_err(|err| FetchError::Query(err.to_string()))?;
    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|err| FetchError::Query(err.to_string()))?);
    }
    Ok(Value::Array(results))
}

fn sql_value_to_json(value: rusqlite::types::Value) -> Value {
    match value {
        rusqlite::types::Value::Null => Value::Null,
        rusqlite::types::Value::Integer(i) => Value::Number(i.into()),
        rusqlite::types::Value::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        rusqlite::types::Value::Text(s) => Value::String(s),
        rusqlite::types::Value::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sql_source_without_a_connection_is_unsupported() {
        let source = GatewayDataSource::new(reqwest::Client::new(), None);
        let spec = FetchQuerySpec { source: FetchSource::Sql, query: "SELECT 1".to_string() };
        let err = source.fetch(&spec, &TenantId::new("tenant-a"), &IntegrationId::new("int-1")).await.unwrap_err();
        assert!(matches!(err, FetchError::Unsupported(FetchSource::Sql)));
    }

    #[tokio::test]
    async fn mongo_source_is_unsupported() {
        let source = GatewayDataSource::new(reqwest::Client::new(), None);
        let spec = FetchQuerySpec { source: FetchSource::Mongo, query: "{}".to_string() };
        let err = source.fetch(&spec, &TenantId::new("tenant-a"), &IntegrationId::new("int-1")).await.unwrap_err();
        assert!(matches!(err, FetchError::Unsupported(FetchSource::Mongo)));
    }

    #[tokio::test]
    async fn sql_source_runs_a_rendered_query_against_an_in_memory_connection() {
        let conn = rusqlite::Connection::open_in_memory().expect("open sqlite");
        conn.execute("CREATE TABLE orders (tenant TEXT, amount INTEGER)", []).expect("create table");
        conn.execute("INSERT INTO orders VALUES ('tenant-a', 42)", []).expect("seed row");
        let source = GatewayDataSource::new(reqwest::Client::new(), Some(Arc::new(StdMutex::new(conn))));
        let spec = FetchQuerySpec { source: FetchSource::Sql, query: "SELECT * FROM orders WHERE tenant = '{{config.tenantId}}'".to_string() };

        let result = source.fetch(&spec, &TenantId::new("tenant-a"), &IntegrationId::new("int-1")).await.expect("fetch");
        let rows = result.as_array().expect("array result");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["amount"], serde_json::json!(42));
    }
}
