// gateway-server/src/lib.rs
// ============================================================================
// Crate: gateway-server
// Description: Axum HTTP surface for the gateway process.
// Purpose: Expose the inbound proxy, synthetic event injection, DLQ control,
//          and execution-log read endpoints over HTTP, and the state/auth
//          plumbing gateway-cli needs to assemble and bind them.
// Dependencies: axum, gateway-config, gateway-contract, gateway-core,
//               gateway-delivery, gateway-providers, tower-http, tracing
// ============================================================================

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use auth::control_surface_guard;
pub use error::ServerError;
pub use server::GatewayServer;
pub use server::GatewayServerError;
pub use state::AppState;
