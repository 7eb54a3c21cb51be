//! Batch metrics for a graph service
//!
//! Lightweight, thread-safe counters shared by every worker of one service.
//! `GET Graph {"host": ..., "port": ...}` reports a snapshot in the response
//! foot.
//!
//! # Overview
//!
//! - Batch latencies with percentile calculations (p50, p95, p99)
//! - Committed / aborted batch counts
//! - Per-verb request counters
//! - Slow batch detection and logging
//!
//! # Design Decisions
//!
//! - **Thread-safe**: counters are `AtomicU64`; only the rolling windows sit
//!   behind a mutex
//! - **Bounded memory**: fixed-size buffers prevent unbounded growth
//! - **O(1) per batch**: recording is O(1) amortized
//!
//! # Example
//!
//! ```
//! use zerograph::metrics::Metrics;
//! use zerograph::protocol::Verb;
//!
//! let metrics = Metrics::new(100);
//! metrics.record_batch(&[Verb::Create, Verb::Get], 15, true, "CREATE Node");
//!
//! let stats = metrics.snapshot();
//! assert_eq!(stats.batch_count, 1);
//! assert_eq!(stats.request_count, 2);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::warn;

use crate::protocol::Verb;
use crate::value::{Map, Value};

/// Number of batch latencies kept for percentile calculation.
const LATENCY_WINDOW_SIZE: usize = 1000;

/// Only the most recent slow batches are kept.
const MAX_SLOW_BATCHES: usize = 10;

/// Default slow batch threshold in milliseconds.
pub const SLOW_BATCH_THRESHOLD_MS: u64 = 100;

pub struct Metrics {
    // ========================================================================
    // Batch Metrics
    // ========================================================================
    batch_count: AtomicU64,
    committed_count: AtomicU64,
    aborted_count: AtomicU64,
    request_count: AtomicU64,

    /// Rolling window of recent batch latencies
    latencies_ms: Mutex<VecDeque<u64>>,

    /// Sum of all latencies in window (for average calculation)
    latency_sum_ms: AtomicU64,

    // ========================================================================
    // Requests by verb, indexed like `Verb::ALL`
    // ========================================================================
    verb_counts: [AtomicU64; 6],

    // ========================================================================
    // Slow Batch Tracking
    // ========================================================================
    slow_threshold_ms: u64,
    slow_batch_count: AtomicU64,
    slow_batches: Mutex<VecDeque<SlowBatch>>,

    started_at: Instant,
}

/// A batch that took at least the slow threshold
#[derive(Clone, Debug, PartialEq)]
pub struct SlowBatch {
    /// First request line of the batch
    pub summary: String,
    pub requests: usize,
    pub duration_ms: u64,
    /// When the batch finished (ms since metrics started)
    pub timestamp_ms: u64,
}

/// Point-in-time copy of all metrics
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub batch_count: u64,
    pub committed_count: u64,
    pub aborted_count: u64,
    pub request_count: u64,
    pub batch_p50_ms: u64,
    pub batch_p95_ms: u64,
    pub batch_p99_ms: u64,
    pub batch_avg_ms: u64,
    pub slow_batch_count: u64,
    pub top_slow_batches: Vec<SlowBatch>,
    /// Non-zero request counts per verb
    pub verb_counts: Vec<(Verb, u64)>,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Map form sent as a response foot
    pub fn to_map(&self) -> Map {
        let mut map = Map::new();
        let mut put = |key: &str, value: u64| {
            map.insert(key.to_string(), Value::Int(value as i64));
        };
        put("batch_count", self.batch_count);
        put("committed_count", self.committed_count);
        put("aborted_count", self.aborted_count);
        put("request_count", self.request_count);
        put("batch_p50_ms", self.batch_p50_ms);
        put("batch_p95_ms", self.batch_p95_ms);
        put("batch_p99_ms", self.batch_p99_ms);
        put("batch_avg_ms", self.batch_avg_ms);
        put("slow_batch_count", self.slow_batch_count);
        put("uptime_secs", self.uptime_secs);

        let verbs = self
            .verb_counts
            .iter()
            .map(|(verb, count)| (verb.to_string(), Value::Int(*count as i64)))
            .collect();
        map.insert("requests_by_verb".into(), Value::Map(verbs));

        let slow = self
            .top_slow_batches
            .iter()
            .map(|batch| {
                let mut entry = Map::new();
                entry.insert("summary".into(), Value::String(batch.summary.clone()));
                entry.insert("requests".into(), Value::Int(batch.requests as i64));
                entry.insert("duration_ms".into(), Value::Int(batch.duration_ms as i64));
                entry.insert("timestamp_ms".into(), Value::Int(batch.timestamp_ms as i64));
                Value::Map(entry)
            })
            .collect();
        map.insert("slow_batches".into(), Value::List(slow));
        map
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(SLOW_BATCH_THRESHOLD_MS)
    }
}

impl Metrics {
    pub fn new(slow_threshold_ms: u64) -> Self {
        Self {
            batch_count: AtomicU64::new(0),
            committed_count: AtomicU64::new(0),
            aborted_count: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            latency_sum_ms: AtomicU64::new(0),
            verb_counts: Default::default(),
            slow_threshold_ms,
            slow_batch_count: AtomicU64::new(0),
            slow_batches: Mutex::new(VecDeque::with_capacity(MAX_SLOW_BATCHES)),
            started_at: Instant::now(),
        }
    }

    /// Record one finished batch.
    ///
    /// `verbs` are the verbs of its requests, `summary` identifies the batch
    /// in slow batch reports.
    pub fn record_batch(&self, verbs: &[Verb], duration_ms: u64, committed: bool, summary: &str) {
        self.batch_count.fetch_add(1, Ordering::Relaxed);
        self.request_count.fetch_add(verbs.len() as u64, Ordering::Relaxed);
        if committed {
            self.committed_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.aborted_count.fetch_add(1, Ordering::Relaxed);
        }

        for verb in verbs {
            self.verb_counter(*verb).fetch_add(1, Ordering::Relaxed);
        }

        {
            let mut latencies = self.latencies_ms.lock();
            if latencies.len() >= LATENCY_WINDOW_SIZE {
                if let Some(old) = latencies.pop_front() {
                    self.latency_sum_ms.fetch_sub(old, Ordering::Relaxed);
                }
            }
            latencies.push_back(duration_ms);
            self.latency_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        }

        if duration_ms >= self.slow_threshold_ms {
            self.slow_batch_count.fetch_add(1, Ordering::Relaxed);
            warn!(duration_ms, requests = verbs.len(), batch = summary, "Slow batch");

            let slow_batch = SlowBatch {
                summary: summary.to_string(),
                requests: verbs.len(),
                duration_ms,
                timestamp_ms: self.started_at.elapsed().as_millis() as u64,
            };
            let mut slow_batches = self.slow_batches.lock();
            if slow_batches.len() >= MAX_SLOW_BATCHES {
                slow_batches.pop_front();
            }
            slow_batches.push_back(slow_batch);
        }
    }

    fn verb_counter(&self, verb: Verb) -> &AtomicU64 {
        let index = Verb::ALL.iter().position(|v| *v == verb).unwrap_or(0);
        &self.verb_counts[index]
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (p50, p95, p99, avg) = {
            let latencies = self.latencies_ms.lock();
            if latencies.is_empty() {
                (0, 0, 0, 0)
            } else {
                let mut sorted: Vec<u64> = latencies.iter().copied().collect();
                sorted.sort_unstable();

                let len = sorted.len();
                let p50 = sorted[len * 50 / 100];
                let p95 = sorted[len * 95 / 100];
                let p99 = sorted.get(len * 99 / 100).copied().unwrap_or(sorted[len - 1]);
                let avg = self.latency_sum_ms.load(Ordering::Relaxed) / len as u64;

                (p50, p95, p99, avg)
            }
        };

        let verb_counts = Verb::ALL
            .iter()
            .map(|verb| (*verb, self.verb_counter(*verb).load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();

        MetricsSnapshot {
            batch_count: self.batch_count.load(Ordering::Relaxed),
            committed_count: self.committed_count.load(Ordering::Relaxed),
            aborted_count: self.aborted_count.load(Ordering::Relaxed),
            request_count: self.request_count.load(Ordering::Relaxed),
            batch_p50_ms: p50,
            batch_p95_ms: p95,
            batch_p99_ms: p99,
            batch_avg_ms: avg,
            slow_batch_count: self.slow_batch_count.load(Ordering::Relaxed),
            top_slow_batches: self.slow_batches.lock().iter().cloned().collect(),
            verb_counts,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod metrics_tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let snapshot = Metrics::default().snapshot();
        assert_eq!(snapshot.batch_count, 0);
        assert_eq!(snapshot.batch_p50_ms, 0);
        assert!(snapshot.top_slow_batches.is_empty());
        assert!(snapshot.verb_counts.is_empty());
    }

    #[test]
    fn test_commit_and_abort_counts() {
        let metrics = Metrics::new(100);
        metrics.record_batch(&[Verb::Create], 1, true, "CREATE Node");
        metrics.record_batch(&[Verb::Get, Verb::Get], 1, false, "GET Node");
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batch_count, 2);
        assert_eq!(snapshot.committed_count, 1);
        assert_eq!(snapshot.aborted_count, 1);
        assert_eq!(snapshot.request_count, 3);
        assert_eq!(snapshot.verb_counts, vec![(Verb::Get, 2), (Verb::Create, 1)]);
    }

    #[test]
    fn test_percentiles() {
        let metrics = Metrics::new(1000);
        for ms in 1..=100 {
            metrics.record_batch(&[Verb::Get], ms, true, "GET Node");
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batch_p50_ms, 51);
        assert_eq!(snapshot.batch_p95_ms, 96);
        assert_eq!(snapshot.batch_p99_ms, 100);
        assert_eq!(snapshot.batch_avg_ms, 50);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = Metrics::new(u64::MAX);
        for _ in 0..LATENCY_WINDOW_SIZE + 500 {
            metrics.record_batch(&[Verb::Get], 2, true, "GET Node");
        }
        assert_eq!(metrics.latencies_ms.lock().len(), LATENCY_WINDOW_SIZE);
        assert_eq!(metrics.snapshot().batch_avg_ms, 2);
    }

    #[test]
    fn test_slow_batches_keep_most_recent() {
        let metrics = Metrics::new(10);
        for i in 0..15 {
            metrics.record_batch(&[Verb::Execute], 10 + i, true, &format!("batch {}", i));
        }
        metrics.record_batch(&[Verb::Execute], 1, true, "fast");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.slow_batch_count, 15);
        assert_eq!(snapshot.top_slow_batches.len(), MAX_SLOW_BATCHES);
        assert_eq!(snapshot.top_slow_batches[0].summary, "batch 5");
    }

    #[test]
    fn test_snapshot_map_for_foot() {
        let metrics = Metrics::new(100);
        metrics.record_batch(&[Verb::Patch], 3, true, "PATCH NodeSet");
        let map = metrics.snapshot().to_map();
        assert_eq!(map.get("batch_count"), Some(&Value::Int(1)));
        match map.get("requests_by_verb") {
            Some(Value::Map(verbs)) => assert_eq!(verbs.get("PATCH"), Some(&Value::Int(1))),
            other => panic!("Expected verb map, got {:?}", other),
        }
    }
}
