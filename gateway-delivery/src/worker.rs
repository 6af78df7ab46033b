// gateway-delivery/src/worker.rs
// ============================================================================
// Module: Background Worker Loops
// Description: Wires ingestion, dispatch, retry, scheduling, and the
//              watchdog into independently cancellable poll loops.
// Purpose: Give the process entrypoint one call to start everything and one
//          channel to stop it.
// Dependencies: tokio, gateway-core
// ============================================================================

//! ## Overview
//! [`Workers::spawn_all`] starts one `tokio::spawn`ed loop per concern and
//! returns a [`WorkerHandles`] the caller can use to wait for clean shutdown.
//! Every loop shares one `tokio::sync::watch<bool>` shutdown signal; flipping
//! it to `true` and awaiting the handles drains in-flight work before
//! returning, the same `tokio::select!`-against-a-receiver shape used to stop
//! the rest of this codebase's background listeners.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::matching::EventDispatcher;
use crate::retry::RetryWorker;
use crate::schedule::ScheduleWorker;
use crate::source::EventSource;
use crate::watchdog::Watchdog;

/// Poll cadences and batch sizes for the background loops.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to poll the event source for new rows.
    pub ingest_interval: Duration,
    /// Max rows pulled per ingest poll.
    pub ingest_batch_size: usize,
    /// How often to claim and redrive due DLQ entries.
    pub retry_interval: Duration,
    /// Max DLQ entries claimed per retry poll.
    pub retry_batch_size: usize,
    /// How often to claim and fire due scheduled deliveries.
    pub schedule_interval: Duration,
    /// Max scheduled deliveries claimed per poll.
    pub schedule_batch_size: usize,
    /// How often to sweep for stuck audit rows.
    pub watchdog_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ingest_interval: Duration::from_secs(2),
            ingest_batch_size: 100,
            retry_interval: Duration::from_secs(5),
            retry_batch_size: 50,
            schedule_interval: Duration::from_secs(2),
            schedule_batch_size: 50,
            watchdog_interval: Duration::from_secs(30),
        }
    }
}

/// Join handles for every spawned loop, plus the shutdown signal.
pub struct WorkerHandles {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandles {
    /// Signals every loop to stop and waits for each to finish its current
    /// iteration.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Starts every background loop the gateway needs to run unattended.
pub struct Workers;

impl Workers {
    /// Spawns the ingestion/dispatch, retry, scheduling, and watchdog loops.
    #[must_use]
    pub fn spawn_all(
        config: WorkerConfig,
        source: std::sync::Arc<dyn EventSource>,
        dispatcher: std::sync::Arc<EventDispatcher>,
        retry: std::sync::Arc<RetryWorker>,
        schedule: std::sync::Arc<ScheduleWorker>,
        watchdog: std::sync::Arc<Watchdog>,
    ) -> WorkerHandles {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        handles.push(spawn_ingest_loop(config.ingest_interval, config.ingest_batch_size, source, dispatcher, shutdown_rx.clone()));
        handles.push(spawn_poll_loop(config.retry_interval, shutdown_rx.clone(), move || {
            let retry = std::sync::Arc::clone(&retry);
            async move {
                if let Err(err) = retry.run_once(config.retry_batch_size).await {
                    tracing::error!(error = %err, "retry worker iteration failed");
                }
            }
        }));
        handles.push(spawn_poll_loop(config.schedule_interval, shutdown_rx.clone(), move || {
            let schedule = std::sync::Arc::clone(&schedule);
            async move {
                if let Err(err) = schedule.run_once(config.schedule_batch_size).await {
                    tracing::error!(error = %err, "schedule worker iteration failed");
                }
            }
        }));
        handles.push(spawn_poll_loop(config.watchdog_interval, shutdown_rx, move || {
            let watchdog = std::sync::Arc::clone(&watchdog);
            async move {
                if let Err(err) = watchdog.sweep().await {
                    tracing::error!(error = %err, "watchdog sweep failed");
                }
            }
        }));

        WorkerHandles { shutdown: shutdown_tx, handles }
    }
}

fn spawn_ingest_loop(
    period: Duration,
    batch_size: usize,
    source: std::sync::Arc<dyn EventSource>,
    dispatcher: std::sync::Arc<EventDispatcher>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match source.poll(batch_size).await {
                        Ok(ingested) => {
                            for item in ingested {
                                if let Err(err) = dispatcher.dispatch(&item.event_id, &item.tenant_id).await {
                                    tracing::error!(error = %err, event_id = %item.event_id, "dispatch failed");
                                }
                            }
                        }
                        Err(err) => tracing::error!(error = %err, "event source poll failed"),
                    }
                }
            }
        }
    })
}

fn spawn_poll_loop<F, Fut>(period: Duration, mut shutdown_rx: watch::Receiver<bool>, mut iteration: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    iteration().await;
                }
            }
        }
    })
}
