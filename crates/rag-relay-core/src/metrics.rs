//! Per-service request metrics.
//!
//! Each service owns one [`MetricsCollector`]. Request handlers call
//! [`MetricsCollector::record`] once per request; the collector keeps the
//! most recent `max_history` entries and derives latency statistics from
//! them on demand.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Default number of requests kept per collector.
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// One recorded request.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    /// RFC 3339 UTC timestamp of the record call.
    pub timestamp: String,
    pub app_name: String,
    pub query_id: String,
    pub latency_ms: f64,
    pub success: bool,
    pub error: Option<String>,
}

/// Latency and error statistics over the retained history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsStats {
    pub total_requests: usize,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub error_count: usize,
    pub error_rate: f64,
}

/// Bounded, thread-safe request history for one service.
pub struct MetricsCollector {
    app_name: String,
    max_history: usize,
    history: Mutex<VecDeque<Metric>>,
}

impl MetricsCollector {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self::with_capacity(app_name, DEFAULT_MAX_HISTORY)
    }

    pub fn with_capacity(app_name: impl Into<String>, max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            app_name: app_name.into(),
            max_history,
            history: Mutex::new(VecDeque::with_capacity(max_history)),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Append a request record, evicting the oldest beyond capacity.
    pub fn record(&self, query_id: &str, latency_ms: f64, success: bool, error: Option<String>) {
        tracing::info!(
            event = "request_completed",
            app = %self.app_name,
            query_id = %query_id,
            latency_ms,
            success,
            error = error.as_deref().unwrap_or(""),
        );

        let metric = Metric {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            app_name: self.app_name.clone(),
            query_id: query_id.to_string(),
            latency_ms,
            success,
            error,
        };

        let mut history = match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if history.len() == self.max_history {
            history.pop_front();
        }
        history.push_back(metric);
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the retained records, oldest first.
    pub fn snapshot(&self) -> Vec<Metric> {
        match self.history.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Statistics over the retained records, `None` when nothing was recorded.
    pub fn stats(&self) -> Option<MetricsStats> {
        let history = self.snapshot();
        if history.is_empty() {
            return None;
        }

        let n = history.len();
        let mut latencies: Vec<f64> = history.iter().map(|m| m.latency_ms).collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let p99_index = if n > 1 { (n as f64 * 0.99) as usize } else { 0 };
        let error_count = history.iter().filter(|m| !m.success).count();

        Some(MetricsStats {
            total_requests: n,
            avg_latency_ms: latencies.iter().sum::<f64>() / n as f64,
            p50_latency_ms: latencies[n / 2],
            p99_latency_ms: latencies[p99_index.min(n - 1)],
            min_latency_ms: latencies[0],
            max_latency_ms: latencies[n - 1],
            error_count,
            error_rate: error_count as f64 / n as f64,
        })
    }

    /// Emit an `app_summary` event with the current statistics.
    pub fn log_summary(&self) {
        let Some(stats) = self.stats() else {
            return;
        };
        tracing::info!(
            event = "app_summary",
            app = %self.app_name,
            total_requests = stats.total_requests,
            avg_latency_ms = stats.avg_latency_ms,
            p50_latency_ms = stats.p50_latency_ms,
            p99_latency_ms = stats.p99_latency_ms,
            min_latency_ms = stats.min_latency_ms,
            max_latency_ms = stats.max_latency_ms,
            error_count = stats.error_count,
            error_rate = stats.error_rate,
        );
    }
}

/// Wall-clock stopwatch started at construction.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collector_has_no_stats() {
        let collector = MetricsCollector::new("retrieval");
        assert!(collector.stats().is_none());
        assert!(collector.is_empty());
        collector.log_summary();
    }

    #[test]
    fn test_stats_percentiles() {
        let collector = MetricsCollector::new("retrieval");
        for i in 1..=10 {
            collector.record(&format!("q{}", i), i as f64 * 10.0, true, None);
        }
        let stats = collector.stats().unwrap();
        assert_eq!(stats.total_requests, 10);
        assert_eq!(stats.avg_latency_ms, 55.0);
        assert_eq!(stats.p50_latency_ms, 60.0);
        assert_eq!(stats.p99_latency_ms, 100.0);
        assert_eq!(stats.min_latency_ms, 10.0);
        assert_eq!(stats.max_latency_ms, 100.0);
        assert_eq!(stats.error_count, 0);
        assert_eq!(stats.error_rate, 0.0);
    }

    #[test]
    fn test_single_record() {
        let collector = MetricsCollector::new("synthesis");
        collector.record("q", 42.0, false, Some("boom".into()));
        let stats = collector.stats().unwrap();
        assert_eq!(stats.p50_latency_ms, 42.0);
        assert_eq!(stats.p99_latency_ms, 42.0);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.error_rate, 1.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let collector = MetricsCollector::with_capacity("ingestion", 3);
        for i in 0..5 {
            collector.record(&format!("q{}", i), i as f64, true, None);
        }
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].query_id, "q2");
        assert_eq!(snapshot[2].query_id, "q4");
        assert_eq!(collector.stats().unwrap().min_latency_ms, 2.0);
    }

    #[test]
    fn test_metric_fields() {
        let collector = MetricsCollector::new("frontend");
        collector.record("abc", 1.5, true, None);
        let m = &collector.snapshot()[0];
        assert_eq!(m.app_name, "frontend");
        assert!(m.timestamp.ends_with('Z'));
        assert!(m.error.is_none());
    }

    #[test]
    fn test_timer_measures_elapsed() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 5.0);
    }
}
