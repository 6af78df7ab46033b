// gateway-core/src/core/identifiers.rs
// ============================================================================
// Module: Gateway Identifiers
// Description: Canonical opaque identifiers for tenants, integrations, and messages.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the opaque string-based identifiers used throughout
//! the gateway. Identifiers serialize as plain strings; validation of their
//! contents is handled at the boundary that constructs them, not here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

macro_rules! opaque_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

opaque_id!(TenantId, "Tenant / org-unit identifier.");
opaque_id!(OrgId, "Organization identifier supplied on inbound requests.");
opaque_id!(IntegrationId, "Identifier of a persisted integration configuration.");
opaque_id!(EventId, "Natural key of a normalized source event.");
opaque_id!(TraceId, "Identifier of a single execution-log trace.");
opaque_id!(DlqId, "Identifier of a dead-letter queue entry.");
opaque_id!(ScheduleId, "Identifier of a scheduled delivery.");
