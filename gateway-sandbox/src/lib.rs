// gateway-sandbox/src/lib.rs
// ============================================================================
// Crate: gateway-sandbox
// Description: Sandboxed script execution for transform/condition/scheduling (C5).
// Purpose: Re-export the QuickJS sandbox engine and its timeout primitive.
// Dependencies: gateway-core, rquickjs
// ============================================================================

mod engine;
mod timeout;

pub use engine::QuickJsSandbox;
pub use engine::SandboxInitError;
pub use timeout::TimeoutTicker;
