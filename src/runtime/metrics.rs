//! Per-context latency and error accounting.
//!
//! Percentiles are computed over a bounded window of the most recent samples,
//! not over all-time data, so memory stays constant under sustained load.

use std::collections::VecDeque;

use serde::Serialize;

/// Default number of latency samples retained per context.
pub const DEFAULT_LATENCY_WINDOW: usize = 1000;

/// Accumulator for one execution context.
///
/// Not synchronized on its own; the router keeps each instance behind a mutex.
#[derive(Debug, Clone)]
pub struct RuntimeMetrics {
    request_count: u64,
    error_count: u64,
    total_latency_ms: f64,
    min_latency_ms: f64,
    max_latency_ms: f64,
    recent_latencies_ms: VecDeque<f64>,
    window: usize,
}

/// Read-only projection of [`RuntimeMetrics`] for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub average_latency_ms: f64,
    /// Zero until the first request is recorded.
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

impl RuntimeMetrics {
    /// Creates an empty accumulator with the default window.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_LATENCY_WINDOW)
    }

    /// Creates an empty accumulator retaining at most `window` samples.
    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            request_count: 0,
            error_count: 0,
            total_latency_ms: 0.0,
            min_latency_ms: f64::INFINITY,
            max_latency_ms: 0.0,
            recent_latencies_ms: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Records one completed request.
    pub fn record_request(&mut self, latency_ms: f64, is_error: bool) {
        self.request_count += 1;
        if is_error {
            self.error_count += 1;
        }

        self.total_latency_ms += latency_ms;
        self.min_latency_ms = self.min_latency_ms.min(latency_ms);
        self.max_latency_ms = self.max_latency_ms.max(latency_ms);

        self.recent_latencies_ms.push_back(latency_ms);
        while self.recent_latencies_ms.len() > self.window {
            self.recent_latencies_ms.pop_front();
        }
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn total_latency_ms(&self) -> f64 {
        self.total_latency_ms
    }

    /// `+inf` until the first request is recorded.
    pub fn min_latency_ms(&self) -> f64 {
        self.min_latency_ms
    }

    pub fn max_latency_ms(&self) -> f64 {
        self.max_latency_ms
    }

    /// Retained samples, oldest first.
    pub fn recent_latencies_ms(&self) -> &VecDeque<f64> {
        &self.recent_latencies_ms
    }

    /// Mean latency over all recorded requests, 0 when empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_latency_ms(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.total_latency_ms / self.request_count as f64
        }
    }

    /// Latency at fraction `p` of the retained window, 0 when empty.
    ///
    /// Picks the element at `floor(len * p)` of a sorted copy, clamped to the
    /// last index.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percentile(&self, p: f64) -> f64 {
        if self.recent_latencies_ms.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f64> = self.recent_latencies_ms.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let len = sorted.len();
        let index = ((len as f64) * p.clamp(0.0, 1.0)).floor() as usize;
        sorted[index.min(len - 1)]
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            request_count: self.request_count,
            error_count: self.error_count,
            average_latency_ms: self.average_latency_ms(),
            min_latency_ms: if self.request_count == 0 { 0.0 } else { self.min_latency_ms },
            max_latency_ms: self.max_latency_ms,
            p95_latency_ms: self.percentile(0.95),
            p99_latency_ms: self.percentile(0.99),
        }
    }

    /// Discards all recorded data, keeping the window size.
    pub fn reset(&mut self) {
        *self = Self::with_window(self.window);
    }
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let m = RuntimeMetrics::new();
        assert_eq!(m.request_count(), 0);
        assert_eq!(m.error_count(), 0);
        assert_eq!(m.total_latency_ms(), 0.0);
        assert!(m.min_latency_ms().is_infinite());
        assert_eq!(m.max_latency_ms(), 0.0);
        assert_eq!(m.average_latency_ms(), 0.0);
        assert_eq!(m.percentile(0.95), 0.0);
    }

    #[test]
    fn test_record_request_accumulates() {
        let mut m = RuntimeMetrics::new();
        let samples = [12.5, 3.0, 40.0, 7.25];
        for s in samples {
            m.record_request(s, false);
        }

        assert_eq!(m.request_count(), 4);
        assert_eq!(m.error_count(), 0);
        assert_eq!(m.total_latency_ms(), samples.iter().sum::<f64>());
        assert_eq!(m.min_latency_ms(), 3.0);
        assert_eq!(m.max_latency_ms(), 40.0);
        assert!((m.average_latency_ms() - 15.6875).abs() < 1e-9);
    }

    #[test]
    fn test_error_count_bounded_by_requests() {
        let mut m = RuntimeMetrics::new();
        m.record_request(1.0, true);
        m.record_request(1.0, false);
        m.record_request(1.0, true);
        assert_eq!(m.request_count(), 3);
        assert_eq!(m.error_count(), 2);
        assert!(m.error_count() <= m.request_count());
    }

    #[test]
    fn test_window_evicts_oldest_first() {
        let mut m = RuntimeMetrics::new();
        for i in 1..=1500 {
            m.record_request(f64::from(i), false);
        }

        assert_eq!(m.request_count(), 1500);
        assert_eq!(m.recent_latencies_ms().len(), DEFAULT_LATENCY_WINDOW);
        assert_eq!(m.recent_latencies_ms().front().copied(), Some(501.0));
        assert_eq!(m.recent_latencies_ms().back().copied(), Some(1500.0));
        // All-time min survives eviction from the window
        assert_eq!(m.min_latency_ms(), 1.0);
    }

    #[test]
    fn test_percentiles_over_one_to_hundred() {
        let mut m = RuntimeMetrics::new();
        // Insert out of order; percentile sorts a copy
        for i in (1..=100).rev() {
            m.record_request(f64::from(i), false);
        }

        let p95 = m.percentile(0.95);
        let p99 = m.percentile(0.99);
        assert!((94.0..=96.0).contains(&p95), "p95 was {}", p95);
        assert!((98.0..=100.0).contains(&p99), "p99 was {}", p99);
        assert_eq!(m.percentile(1.0), 100.0);
        assert_eq!(m.percentile(0.0), 1.0);

        // The window itself keeps insertion order
        assert_eq!(m.recent_latencies_ms().front().copied(), Some(100.0));
    }

    #[test]
    fn test_single_sample_percentile() {
        let mut m = RuntimeMetrics::new();
        m.record_request(8.0, false);
        assert_eq!(m.percentile(0.5), 8.0);
        assert_eq!(m.percentile(0.99), 8.0);
    }

    #[test]
    fn test_custom_window() {
        let mut m = RuntimeMetrics::with_window(3);
        for i in 1..=5 {
            m.record_request(f64::from(i), false);
        }
        let window: Vec<f64> = m.recent_latencies_ms().iter().copied().collect();
        assert_eq!(window, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_snapshot() {
        let mut m = RuntimeMetrics::new();
        assert_eq!(m.snapshot().min_latency_ms, 0.0);

        m.record_request(10.0, false);
        m.record_request(30.0, true);

        let snap = m.snapshot();
        assert_eq!(snap.request_count, 2);
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.average_latency_ms, 20.0);
        assert_eq!(snap.min_latency_ms, 10.0);
        assert_eq!(snap.max_latency_ms, 30.0);
        assert_eq!(snap.p95_latency_ms, 30.0);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["request_count"], 2);
    }

    #[test]
    fn test_reset() {
        let mut m = RuntimeMetrics::with_window(10);
        m.record_request(5.0, true);
        m.reset();
        assert_eq!(m.request_count(), 0);
        assert_eq!(m.error_count(), 0);
        assert!(m.recent_latencies_ms().is_empty());
        assert!(m.min_latency_ms().is_infinite());
    }
}
