use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Shared request counters for the /api/performance report.
///
/// Counters are relaxed atomics; the report is a point-in-time reading, not
/// a consistent cut across all three.
pub struct ServerStats {
    started: Instant,
    total_requests: AtomicU64,
    error_count: AtomicU64,
    total_request_us: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        ServerStats {
            started: Instant::now(),
            total_requests: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_request_us: AtomicU64::new(0),
        }
    }

    pub fn record(&self, duration: Duration, is_error: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_request_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if is_error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn report(&self, active_games: usize, active_rooms: usize) -> PerformanceReport {
        let total = self.total_requests.load(Ordering::Relaxed);
        let total_us = self.total_request_us.load(Ordering::Relaxed);
        let avg_response_time = if total > 0 {
            (total_us as f64 / total as f64) / 1_000_000.0
        } else {
            0.0
        };
        PerformanceReport {
            uptime: self.started.elapsed().as_secs_f64(),
            total_requests: total,
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_response_time,
            active_games,
            active_rooms,
        }
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    /// Seconds since server start.
    pub uptime: f64,
    pub total_requests: u64,
    pub error_count: u64,
    /// Mean request duration in seconds.
    pub avg_response_time: f64,
    pub active_games: usize,
    pub active_rooms: usize,
}
