// Performance metrics module
//
// Provides lightweight metrics tracking for monitoring build pipeline
// performance

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Global performance metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// Metrics are collected throughout a build run and logged on shutdown for
/// performance analysis.
#[derive(Debug)]
pub struct Metrics {
    /// Total number of builds that completed successfully
    pub builds_succeeded: AtomicUsize,

    /// Total number of builds that failed
    pub builds_failed: AtomicUsize,

    /// Total number of builds cancelled before completion
    pub builds_cancelled: AtomicUsize,

    /// Number of external-tool stages executed
    pub stages_run: AtomicUsize,

    /// Total build time in milliseconds
    pub total_build_time_ms: AtomicU64,

    /// Number of tool output lines streamed to observers
    pub lines_streamed: AtomicU64,

    /// Number of build events broadcast
    pub events_broadcast: AtomicU64,

    /// Number of build events dropped (no subscribers)
    pub events_dropped: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            builds_succeeded: AtomicUsize::new(0),
            builds_failed: AtomicUsize::new(0),
            builds_cancelled: AtomicUsize::new(0),
            stages_run: AtomicUsize::new(0),
            total_build_time_ms: AtomicU64::new(0),
            lines_streamed: AtomicU64::new(0),
            events_broadcast: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_build_succeeded(&self) {
        self.builds_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build_failed(&self) {
        self.builds_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build_cancelled(&self) {
        self.builds_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage_run(&self) {
        self.stages_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build_time(&self, duration: Duration) {
        self.total_build_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_line_streamed(&self) {
        self.lines_streamed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_broadcast(&self) {
        self.events_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average wall-clock time per build in milliseconds
    pub fn avg_build_time_ms(&self) -> f64 {
        let total = self.total_build_time_ms.load(Ordering::Relaxed);
        let count = self.builds_succeeded.load(Ordering::Relaxed)
            + self.builds_failed.load(Ordering::Relaxed)
            + self.builds_cancelled.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Performance Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Builds: {} succeeded, {} failed, {} cancelled ({} stages run)",
            self.builds_succeeded.load(Ordering::Relaxed),
            self.builds_failed.load(Ordering::Relaxed),
            self.builds_cancelled.load(Ordering::Relaxed),
            self.stages_run.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total build time: {:.2}s (avg: {:.2}ms per build)",
            self.total_build_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_build_time_ms()
        );
        tracing::info!(
            "Output lines streamed: {}, events broadcast: {}, dropped: {}",
            self.lines_streamed.load(Ordering::Relaxed),
            self.events_broadcast.load(Ordering::Relaxed),
            self.events_dropped.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
