// gateway-providers/src/lib.rs
// ============================================================================
// Crate: gateway-providers
// Description: C7 Auth Provider, C8 Rate Limiter, shared outbound HTTP client.
// Purpose: Re-export the provider surface used by gateway-delivery and gateway-server.
// Dependencies: gateway-core, reqwest, dashmap
// ============================================================================

mod auth;
mod http;
mod jsonpath;
mod ratelimit;

pub use auth::AuthError;
pub use auth::AuthProvider;
pub use auth::Header;
pub use auth::InboundAuthError;
pub use http::TargetError;
pub use http::TargetPolicy;
pub use http::build_client;
pub use jsonpath::resolve_as_string;
pub use ratelimit::RateLimitKey;
pub use ratelimit::RateLimiter;
