// gateway-config/src/cache.rs
// ============================================================================
// Module: Config Store Cache
// Description: TTL-caching decorator over any `ConfigStore` implementation.
// Purpose: Keep the C4 matcher off the durable store's hot path under load.
// Dependencies: gateway-core, dashmap, tracing
// ============================================================================

//! ## Overview
//! `CachedConfigStore<S>` wraps an inner [`ConfigStore`] with a sharded,
//! hand-rolled TTL cache keyed by `(tenantId, eventType)` and by `id`.
//! Writes (`save`, `update_token_cache`) always go to the inner store first
//! and then invalidate the relevant cache entries; `update_token_cache` in
//! particular bypasses the cache entirely on the read side too, since a
//! stale cached token would make the auth provider hand out an expired
//! credential to every request behind the cache until the TTL lapses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use gateway_core::core::IntegrationConfig;
use gateway_core::core::IntegrationId;
use gateway_core::core::LookupTable;
use gateway_core::core::TenantId;
use gateway_core::interfaces::ConfigStore;
use gateway_core::interfaces::StoreError;
use serde_json::Value;

use crate::settings::CacheConfig;

// ============================================================================
// SECTION: Cache Entry
// ============================================================================

struct Entry<T> {
    value: T,
    inserted_at: Instant,
}

impl<T> Entry<T> {
    fn fresh(value: T) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

// ============================================================================
// SECTION: Cached Config Store
// ============================================================================

/// Decorates a `ConfigStore` with a TTL cache keyed by id, by
/// `(tenantId, eventType)`, and by `(tenantId, lookupType)`.
pub struct CachedConfigStore<S> {
    inner: Arc<S>,
    ttl: Duration,
    max_entries: usize,
    by_id: DashMap<IntegrationId, Entry<Option<IntegrationConfig>>>,
    by_tenant_event: DashMap<(TenantId, String), Entry<Vec<IntegrationConfig>>>,
    ancestors: DashMap<TenantId, Entry<Vec<TenantId>>>,
    lookups: DashMap<(TenantId, String), Entry<Option<LookupTable>>>,
}

impl<S: ConfigStore> CachedConfigStore<S> {
    /// Wraps `inner` with a cache configured by `config`.
    #[must_use]
    pub fn new(inner: S, config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(inner),
            ttl: Duration::from_millis(config.ttl_ms),
            max_entries: config.max_entries,
            by_id: DashMap::new(),
            by_tenant_event: DashMap::new(),
            ancestors: DashMap::new(),
            lookups: DashMap::new(),
        }
    }

    fn evict_if_full<K: std::hash::Hash + Eq + Clone, V>(map: &DashMap<K, Entry<V>>, max_entries: usize) {
        if map.len() < max_entries {
            return;
        }
        if let Some(stale) = map.iter().min_by_key(|item| item.value().inserted_at).map(|item| item.key().clone()) {
            map.remove(&stale);
        }
    }

    /// Drops every cached entry for `id`, forcing the next read through.
    pub fn invalidate_id(&self, id: &IntegrationId) {
        self.by_id.remove(id);
        self.by_tenant_event.clear();
    }
}

#[async_trait]
impl<S: ConfigStore> ConfigStore for CachedConfigStore<S> {
    async fn get_by_id(&self, id: &IntegrationId) -> Result<Option<IntegrationConfig>, StoreError> {
        if let Some(entry) = self.by_id.get(id) {
            if !entry.is_expired(self.ttl) {
                return Ok(entry.value.clone());
            }
        }
        tracing::debug!(integration_id = %id, "config cache miss: get_by_id");
        let value = self.inner.get_by_id(id).await?;
        Self::evict_if_full(&self.by_id, self.max_entries);
        self.by_id.insert(id.clone(), Entry::fresh(value.clone()));
        Ok(value)
    }

    async fn list_for_tenant_and_event(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<Vec<IntegrationConfig>, StoreError> {
        let key = (tenant_id.clone(), event_type.to_string());
        if let Some(entry) = self.by_tenant_event.get(&key) {
            if !entry.is_expired(self.ttl) {
                return Ok(entry.value.clone());
            }
        }
        tracing::debug!(tenant_id = %tenant_id, event_type, "config cache miss: list_for_tenant_and_event");
        let value = self.inner.list_for_tenant_and_event(tenant_id, event_type).await?;
        Self::evict_if_full(&self.by_tenant_event, self.max_entries);
        self.by_tenant_event.insert(key, Entry::fresh(value.clone()));
        Ok(value)
    }

    async fn ancestors_of(&self, tenant_id: &TenantId) -> Result<Vec<TenantId>, StoreError> {
        if let Some(entry) = self.ancestors.get(tenant_id) {
            if !entry.is_expired(self.ttl) {
                return Ok(entry.value.clone());
            }
        }
        tracing::debug!(tenant_id = %tenant_id, "config cache miss: ancestors_of");
        let value = self.inner.ancestors_of(tenant_id).await?;
        Self::evict_if_full(&self.ancestors, self.max_entries);
        self.ancestors.insert(tenant_id.clone(), Entry::fresh(value.clone()));
        Ok(value)
    }

    async fn update_token_cache(&self, id: &IntegrationId, patch: Value) -> Result<(), StoreError> {
        self.inner.update_token_cache(id, patch).await?;
        self.invalidate_id(id);
        Ok(())
    }

    async fn save(&self, config: &IntegrationConfig) -> Result<(), StoreError> {
        self.inner.save(config).await?;
        self.invalidate_id(&config.id);
        self.ancestors.clear();
        Ok(())
    }

    async fn get_lookup_table(
        &self,
        tenant_id: &TenantId,
        lookup_type: &str,
    ) -> Result<Option<LookupTable>, StoreError> {
        let key = (tenant_id.clone(), lookup_type.to_string());
        if let Some(entry) = self.lookups.get(&key) {
            if !entry.is_expired(self.ttl) {
                return Ok(entry.value.clone());
            }
        }
        tracing::debug!(tenant_id = %tenant_id, lookup_type, "config cache miss: get_lookup_table");
        let value = self.inner.get_lookup_table(tenant_id, lookup_type).await?;
        Self::evict_if_full(&self.lookups, self.max_entries);
        self.lookups.insert(key, Entry::fresh(value.clone()));
        Ok(value)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::collections::HashMap;

    use gateway_core::core::AuthSpec;
    use gateway_core::core::Direction;
    use gateway_core::core::RateLimitSpec;
    use gateway_core::core::Scope;
    use gateway_core::core::SigningSpec;
    use gateway_core::core::TenantScope;
    use gateway_core::core::TransformMode;
    use gateway_core::core::TransformSpec;
    use gateway_core::runtime::store::InMemoryConfigStore;

    use super::*;

    fn sample_config(id: &str, tenant: &str) -> IntegrationConfig {
        IntegrationConfig {
            id: IntegrationId::new(id),
            tenant: TenantScope {
                tenant_id: TenantId::new(tenant),
                scope: Scope::EntityOnly,
                excluded_children: BTreeSet::new(),
            },
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
            transformation: TransformSpec {
                mode: Some(TransformMode::Passthrough),
                ..Default::default()
            },
            lookups: Vec::new(),
            condition: None,
            rate_limits: RateLimitSpec {
                enabled: false,
                max_requests: 0,
                window_seconds: 0,
            },
            signing: SigningSpec::default(),
            delivery_mode: gateway_core::core::DeliveryMode::Immediate,
            scheduling_script: None,
            fetch_query: None,
            actions: None,
            multi_action_delay_ms: None,
            action_resume_mode: gateway_core::core::config::ActionResumeMode::ResumeFromFailure,
        }
    }

    fn cache_config(ttl_ms: u64) -> CacheConfig {
        CacheConfig {
            ttl_ms,
            max_entries: 16,
        }
    }

    #[tokio::test]
    async fn get_by_id_caches_until_ttl_expires() {
        let inner = InMemoryConfigStore::default();
        let config = sample_config("int-1", "tenant-a");
        inner.save(&config).await.expect("save");
        let cached = CachedConfigStore::new(inner, &cache_config(50));

        let first = cached.get_by_id(&config.id).await.expect("get");
        assert!(first.is_some());

        cached.inner.save(&{
            let mut updated = config.clone();
            updated.name = "renamed".to_string();
            updated
        }).await.expect("save underneath cache");

        let still_cached = cached.get_by_id(&config.id).await.expect("get cached");
        assert_eq!(still_cached.expect("present").name, "sample");

        tokio::time::sleep(Duration::from_millis(60)).await;
        let refreshed = cached.get_by_id(&config.id).await.expect("get refreshed");
        assert_eq!(refreshed.expect("present").name, "renamed");
    }

    #[tokio::test]
    async fn save_invalidates_cached_entry_immediately() {
        let inner = InMemoryConfigStore::default();
        let config = sample_config("int-2", "tenant-b");
        inner.save(&config).await.expect("save");
        let cached = CachedConfigStore::new(inner, &cache_config(60_000));

        let _ = cached.get_by_id(&config.id).await.expect("warm cache");

        let mut updated = config.clone();
        updated.is_active = false;
        cached.save(&updated).await.expect("save through cache");

        let fetched = cached.get_by_id(&config.id).await.expect("get after save");
        assert!(!fetched.expect("present").is_active);
    }

    #[tokio::test]
    async fn update_token_cache_invalidates_read_cache() {
        let inner = InMemoryConfigStore::default();
        let config = sample_config("int-3", "tenant-c");
        inner.save(&config).await.expect("save");
        let cached = CachedConfigStore::new(inner, &cache_config(60_000));

        let _ = cached.get_by_id(&config.id).await.expect("warm cache");
        cached
            .update_token_cache(&config.id, serde_json::json!({"cached_token": "abc"}))
            .await
            .expect("update token cache");

        assert!(!cached.by_id.contains_key(&config.id));
    }
}
