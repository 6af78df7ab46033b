// gateway-delivery/src/lib.rs
// ============================================================================
// Module: Delivery Crate Root
// Description: Re-exports the event ingestion, matching, delivery, retry,
//              scheduling, and watchdog surface as one crate.
// Purpose: Single entrypoint for the server and CLI crates to wire up
//          background processing.
// Dependencies: gateway-core, gateway-providers, gateway-sandbox
// ============================================================================

pub mod fetch;
pub mod inbound;
pub mod matching;
pub mod metrics;
pub mod pipeline;
pub mod redact;
pub mod retry;
pub mod schedule;
pub mod source;
pub mod template;
#[cfg(test)]
mod test_support;
pub mod watchdog;
pub mod worker;

pub use fetch::DataSource;
pub use fetch::FetchError;
pub use fetch::GatewayDataSource;
pub use inbound::InboundError;
pub use inbound::InboundOutcome;
pub use inbound::InboundRequest;
pub use inbound::InboundResponse;
pub use matching::DispatchError;
pub use matching::EventDispatcher;
pub use metrics::CountingMetrics;
pub use metrics::GatewayMetrics;
pub use metrics::TracingMetrics;
pub use pipeline::DeliveryEngine;
pub use pipeline::DeliveryError;
pub use pipeline::DeliveryOutcome;
pub use pipeline::ExecutionLogger;
pub use redact::Redactor;
pub use retry::RetryError;
pub use retry::RetryWorker;
pub use schedule::ScheduleWorker;
pub use schedule::ScheduleWorkerError;
pub use source::EventSource;
pub use source::Ingested;
pub use source::LogConsumer;
pub use source::LogSource;
pub use source::RawEvent;
pub use source::RelationalRows;
pub use source::RelationalSource;
pub use source::SourceError;
pub use template::TemplateContext;
pub use template::render_template;
pub use watchdog::Watchdog;
pub use watchdog::WatchdogError;
pub use worker::WorkerConfig;
pub use worker::WorkerHandles;
pub use worker::Workers;
