//! Request metrics and periodic summaries for the scoring server.

use crate::error::HandlerError;
use crate::models::ScoreOutcome;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

/// Counters and latency samples shared by all connections
pub struct ServerMetrics {
    /// Connections accepted by the listener
    pub connections_accepted: AtomicU64,
    /// Verdicts written with passed = true
    pub verdicts_passed: AtomicU64,
    /// Verdicts written with passed = false
    pub verdicts_failed: AtomicU64,
    /// Requests rejected while decoding
    pub decode_failures: AtomicU64,
    /// Requests dropped because a model failed
    pub inference_failures: AtomicU64,
    /// Connections lost to I/O errors or timeouts
    pub io_failures: AtomicU64,
    /// Model evaluations performed
    pub models_evaluated: AtomicU64,
    /// Model evaluations avoided by early exit
    pub models_skipped: AtomicU64,
    /// Request processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Evaluations per model name
    model_calls: RwLock<HashMap<String, u64>>,
    /// Verdicts per score
    score_counts: RwLock<BTreeMap<u32, u64>>,
    start_time: Instant,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            connections_accepted: AtomicU64::new(0),
            verdicts_passed: AtomicU64::new(0),
            verdicts_failed: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            io_failures: AtomicU64::new(0),
            models_evaluated: AtomicU64::new(0),
            models_skipped: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            model_calls: RwLock::new(HashMap::new()),
            score_counts: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_connection(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a verdict; `evaluated` are the names of the models that ran
    pub fn record_verdict(
        &self,
        outcome: &ScoreOutcome,
        registry_len: usize,
        evaluated: &[&str],
        processing_time: Duration,
    ) {
        if outcome.verdict.passed {
            self.verdicts_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.verdicts_failed.fetch_add(1, Ordering::Relaxed);
        }

        let ran = outcome.models_evaluated as u64;
        self.models_evaluated.fetch_add(ran, Ordering::Relaxed);
        self.models_skipped
            .fetch_add((registry_len as u64).saturating_sub(ran), Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Ok(mut calls) = self.model_calls.write() {
            for name in evaluated {
                *calls.entry((*name).to_string()).or_insert(0) += 1;
            }
        }

        if let Ok(mut counts) = self.score_counts.write() {
            *counts.entry(outcome.verdict.score).or_insert(0) += 1;
        }
    }

    /// Record a connection that ended without a verdict
    pub fn record_failure(&self, error: &HandlerError) {
        let counter = match error {
            HandlerError::Decode(_) => &self.decode_failures,
            HandlerError::Prediction(_) | HandlerError::Task(_) => &self.inference_failures,
            HandlerError::Io(_) | HandlerError::Timeout(_) => &self.io_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn verdicts(&self) -> u64 {
        self.verdicts_passed.load(Ordering::Relaxed) + self.verdicts_failed.load(Ordering::Relaxed)
    }

    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = match self.processing_times.read() {
            Ok(times) => times,
            Err(_) => return ProcessingStats::default(),
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: sorted[count - 1],
        }
    }

    pub fn get_model_calls(&self) -> HashMap<String, u64> {
        self.model_calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn get_score_counts(&self) -> BTreeMap<u32, u64> {
        self.score_counts.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Verdicts per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.verdicts() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        let connections = self.connections_accepted.load(Ordering::Relaxed);
        let passed = self.verdicts_passed.load(Ordering::Relaxed);
        let failed = self.verdicts_failed.load(Ordering::Relaxed);
        let evaluated = self.models_evaluated.load(Ordering::Relaxed);
        let skipped = self.models_skipped.load(Ordering::Relaxed);
        let saved = if evaluated + skipped > 0 {
            (skipped as f64 / (evaluated + skipped) as f64) * 100.0
        } else {
            0.0
        };
        let processing = self.get_processing_stats();

        info!(
            connections = connections,
            passed = passed,
            failed = failed,
            decode_failures = self.decode_failures.load(Ordering::Relaxed),
            inference_failures = self.inference_failures.load(Ordering::Relaxed),
            io_failures = self.io_failures.load(Ordering::Relaxed),
            throughput = format!("{:.1} req/s", self.get_throughput()),
            "Scoring summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Processing time"
        );
        info!(
            evaluated = evaluated,
            skipped = skipped,
            early_exit_savings = format!("{:.1}%", saved),
            calls = ?self.get_model_calls(),
            "Model evaluations"
        );
        info!(scores = ?self.get_score_counts(), "Score distribution");
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, PartialEq)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Logs a metrics summary on a fixed interval until shutdown
pub struct MetricsReporter {
    metrics: Arc<ServerMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServerMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Run until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        // First tick completes immediately
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => self.metrics.print_summary(),
                _ = shutdown.changed() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestDecodeError;
    use crate::types::Verdict;

    fn outcome(passed: bool, score: u32, models_evaluated: usize) -> ScoreOutcome {
        ScoreOutcome {
            verdict: Verdict::new(passed, score),
            models_evaluated,
        }
    }

    #[test]
    fn test_verdict_recording() {
        let metrics = ServerMetrics::new();

        metrics.record_verdict(&outcome(true, 1, 1), 3, &["rf"], Duration::from_micros(100));
        metrics.record_verdict(&outcome(false, 0, 3), 3, &["rf", "ae", "nb"], Duration::from_micros(300));

        assert_eq!(metrics.verdicts_passed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.verdicts_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.models_evaluated.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.models_skipped.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.get_model_calls().get("rf"), Some(&2));
        assert_eq!(metrics.get_score_counts().get(&0), Some(&1));

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean_us, 200);
        assert_eq!(stats.max_us, 300);
    }

    #[test]
    fn test_failure_recording() {
        let metrics = ServerMetrics::new();
        metrics.record_failure(&HandlerError::Decode(RequestDecodeError::InvalidUtf8));
        metrics.record_failure(&HandlerError::Timeout("read"));

        assert_eq!(metrics.decode_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.io_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.inference_failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_empty_stats() {
        assert_eq!(ServerMetrics::new().get_processing_stats(), ProcessingStats::default());
    }
}
