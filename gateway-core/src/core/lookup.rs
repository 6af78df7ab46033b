// gateway-core/src/core/lookup.rs
// ============================================================================
// Module: Gateway Lookup Tables
// Description: Per-tenant code-translation tables with hierarchical fallback.
// Purpose: Back the transform engine's `lookup(code, type)` helper and post-transform pass.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! A lookup table is keyed by `(tenantId, type, key)`. Resolution first
//! checks the owning tenant's table; on miss it walks to the parent tenant
//! (supplied by the caller, since the hierarchy itself lives in the config
//! store); on final miss it applies `unmappedBehavior`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: Unmapped Behavior
// ============================================================================

/// Behavior applied when a lookup key has no mapping anywhere in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnmappedBehavior {
    /// Return the original code unchanged.
    Passthrough,
    /// Raise an error, failing the step.
    Fail,
    /// Return a configured default value.
    Default {
        /// The value returned on miss.
        value: Value,
    },
}

// ============================================================================
// SECTION: Lookup Table
// ============================================================================

/// A per-tenant code-translation table for one lookup `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupTable {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Lookup category/type, e.g. `"department_code"`.
    pub lookup_type: String,
    /// Key-to-value entries.
    pub entries: HashMap<String, Value>,
    /// Behavior on miss, after walking the full ancestor chain.
    pub unmapped_behavior: UnmappedBehavior,
}

/// Errors raised resolving a lookup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    /// No mapping was found anywhere in the chain and `unmappedBehavior = FAIL`.
    #[error("no mapping for key {0:?} in lookup type {1:?}")]
    Unmapped(String, String),
}

impl LookupTable {
    /// Resolves `key` against this table only (no ancestor walk).
    #[must_use]
    pub fn resolve_local(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }
}

/// Resolves `key` against an ordered chain of tables (owning tenant first,
/// then ancestors nearest-first), falling back to `unmapped_behavior` taken
/// from the first (owning-tenant) table in the chain.
///
/// # Errors
///
/// Returns [`LookupError::Unmapped`] when no table in the chain has a
/// mapping and the owning table's `unmapped_behavior = FAIL`.
pub fn resolve_hierarchical(
    chain: &[&LookupTable],
    key: &str,
) -> Result<Value, LookupError> {
    for table in chain {
        if let Some(value) = table.resolve_local(key) {
            return Ok(value.clone());
        }
    }
    let Some(owning) = chain.first() else {
        return Err(LookupError::Unmapped(key.to_string(), "unknown".to_string()));
    };
    match &owning.unmapped_behavior {
        UnmappedBehavior::Passthrough => Ok(Value::String(key.to_string())),
        UnmappedBehavior::Default { value } => Ok(value.clone()),
        UnmappedBehavior::Fail => Err(LookupError::Unmapped(key.to_string(), owning.lookup_type.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(tenant: &str, entries: &[(&str, &str)], behavior: UnmappedBehavior) -> LookupTable {
        LookupTable {
            tenant_id: TenantId::new(tenant),
            lookup_type: "department_code".to_string(),
            entries: entries
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
            unmapped_behavior: behavior,
        }
    }

    #[test]
    fn falls_back_to_parent_tenant() {
        let child = table("child", &[], UnmappedBehavior::Passthrough);
        let parent = table("parent", &[("X", "Cardiology")], UnmappedBehavior::Passthrough);
        let resolved = resolve_hierarchical(&[&child, &parent], "X").unwrap();
        assert_eq!(resolved, Value::String("Cardiology".to_string()));
    }

    #[test]
    fn passthrough_on_total_miss() {
        let child = table("child", &[], UnmappedBehavior::Passthrough);
        let resolved = resolve_hierarchical(&[&child], "Z").unwrap();
        assert_eq!(resolved, Value::String("Z".to_string()));
    }

    #[test]
    fn fail_on_total_miss() {
        let child = table("child", &[], UnmappedBehavior::Fail);
        assert!(resolve_hierarchical(&[&child], "Z").is_err());
    }
}
