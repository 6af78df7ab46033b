// gateway-sandbox/src/timeout.rs
// ============================================================================
// Module: Sandbox Timeout Ticker
// Description: Wall-clock cancellation for a single script invocation.
// Purpose: Trip an interrupt flag after a fixed budget without an epoch-style engine.
// Dependencies: std::thread
// ============================================================================

//! ## Overview
//! `rquickjs` has no epoch-increment cancellation like wasmtime; instead its
//! `Runtime::set_interrupt_handler` is polled by the bytecode interpreter
//! loop and returns `true` to abort. [`TimeoutTicker`] adapts the
//! epoch-interruption pattern to that shape: a background thread sleeps in
//! short increments up to the configured timeout and flips a shared flag
//! once it elapses, instead of incrementing a shared epoch counter on a
//! fixed-interval loop. One ticker is scoped to exactly one script
//! invocation, since every invocation has its own budget (10s transform,
//! 1s condition, 2s scheduling).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

/// Poll interval for the ticker's early-exit check.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

// ============================================================================
// SECTION: Timeout Ticker
// ============================================================================

/// Owns a background thread that trips a shared flag after `timeout`
/// elapses, unless [`TimeoutTicker::cancel`] is called first.
pub struct TimeoutTicker {
    flag: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimeoutTicker {
    /// Starts a new ticker for `timeout`.
    #[must_use]
    pub fn start(timeout: Duration) -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let cancel = Arc::new(AtomicBool::new(false));
        let flag_thread = Arc::clone(&flag);
        let cancel_thread = Arc::clone(&cancel);
        let handle = thread::spawn(move || {
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                if cancel_thread.load(Ordering::Relaxed) {
                    return;
                }
                thread::sleep(POLL_INTERVAL.min(timeout));
            }
            flag_thread.store(true, Ordering::Relaxed);
        });
        Self {
            flag,
            cancel,
            handle: Some(handle),
        }
    }

    /// Returns a clone of the interrupt flag, to hand to `rquickjs`'s
    /// interrupt handler.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Returns whether the ticker has tripped.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Stops the ticker thread, joining it. Safe to call whether or not the
    /// timeout has already elapsed.
    pub fn cancel(mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimeoutTicker {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_timeout_elapses() {
        let ticker = TimeoutTicker::start(Duration::from_millis(20));
        thread::sleep(Duration::from_millis(60));
        assert!(ticker.timed_out());
    }

    #[test]
    fn does_not_trip_before_timeout() {
        let ticker = TimeoutTicker::start(Duration::from_secs(5));
        assert!(!ticker.timed_out());
        ticker.cancel();
    }

    #[test]
    fn cancel_stops_the_thread_promptly() {
        let ticker = TimeoutTicker::start(Duration::from_secs(30));
        let start = Instant::now();
        ticker.cancel();
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
