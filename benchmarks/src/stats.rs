//! Shared counters and latency samples for concurrently running clients.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientClass {
    Fast,
    Slow,
}

impl ClientClass {
    pub fn label(self) -> &'static str {
        match self {
            ClientClass::Fast => "fast",
            ClientClass::Slow => "slow",
        }
    }
}

/// Nearest-rank percentile over an ascending slice: index `floor(p * n)`,
/// clamped to the last element. Empty input yields 0.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let index = ((sorted.len() as f64) * p) as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        Self {
            count: sorted.len(),
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            mean_ms: sum as f64 / sorted.len() as f64,
            p50_ms: percentile(&sorted, 0.50),
            p90_ms: percentile(&sorted, 0.90),
            p99_ms: percentile(&sorted, 0.99),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounts {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub fast_attempts: u64,
    pub slow_attempts: u64,
}

#[derive(Default)]
struct Samples {
    fast: Vec<u64>,
    slow: Vec<u64>,
}

/// Results accumulated by every client of a load run.
#[derive(Default)]
pub struct LoadStats {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    fast_attempts: AtomicU64,
    slow_attempts: AtomicU64,
    samples: Mutex<Samples>,
}

impl LoadStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self, class: ClientClass) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match class {
            ClientClass::Fast => self.fast_attempts.fetch_add(1, Ordering::Relaxed),
            ClientClass::Slow => self.slow_attempts.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_success(&self, class: ClientClass, latency_ms: u64) {
        self.success.fetch_add(1, Ordering::Relaxed);
        let mut samples = self.samples.lock();
        match class {
            ClientClass::Fast => samples.fast.push(latency_ms),
            ClientClass::Slow => samples.slow.push(latency_ms),
        }
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> RequestCounts {
        RequestCounts {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            fast_attempts: self.fast_attempts.load(Ordering::Relaxed),
            slow_attempts: self.slow_attempts.load(Ordering::Relaxed),
        }
    }

    /// Copies of the (fast, slow) latency samples in milliseconds.
    pub fn samples(&self) -> (Vec<u64>, Vec<u64>) {
        let samples = self.samples.lock();
        (samples.fast.clone(), samples.slow.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted = [10, 20, 30, 40, 50];
        assert_eq!(percentile(&sorted, 0.50), 30);
        assert_eq!(percentile(&sorted, 0.90), 50);
        assert_eq!(percentile(&sorted, 0.99), 50);
        assert_eq!(percentile(&sorted, 0.0), 10);
    }

    #[test]
    fn test_percentile_empty_and_single() {
        assert_eq!(percentile(&[], 0.5), 0);
        assert_eq!(percentile(&[7], 0.99), 7);
    }

    #[test]
    fn test_summary_sorts_input() {
        let summary = LatencySummary::from_samples(&[50, 10, 40, 20, 30]);
        assert_eq!(summary.count, 5);
        assert_eq!(summary.min_ms, 10);
        assert_eq!(summary.max_ms, 50);
        assert_eq!(summary.mean_ms, 30.0);
        assert_eq!(summary.p50_ms, 30);
        assert_eq!(summary.p90_ms, 50);
        assert_eq!(summary.p99_ms, 50);
    }

    #[test]
    fn test_summary_keeps_fractional_mean() {
        let summary = LatencySummary::from_samples(&[1, 2]);
        assert_eq!(summary.mean_ms, 1.5);
    }

    #[test]
    fn test_empty_summary_is_zeroed() {
        assert_eq!(LatencySummary::from_samples(&[]), LatencySummary::default());
    }

    #[test]
    fn test_concurrent_recording() {
        let stats = Arc::new(LoadStats::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    let class = if t % 2 == 0 {
                        ClientClass::Fast
                    } else {
                        ClientClass::Slow
                    };
                    for i in 0..1000 {
                        stats.record_attempt(class);
                        if i % 10 == 0 {
                            stats.record_failure();
                        } else {
                            stats.record_success(class, i);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let counts = stats.counts();
        assert_eq!(counts.total, 8000);
        assert_eq!(counts.fast_attempts, 4000);
        assert_eq!(counts.slow_attempts, 4000);
        assert_eq!(counts.failed, 800);
        assert_eq!(counts.success, 7200);

        let (fast, slow) = stats.samples();
        assert_eq!(fast.len(), 3600);
        assert_eq!(slow.len(), 3600);
    }
}
