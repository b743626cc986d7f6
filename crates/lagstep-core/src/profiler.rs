//! Mean-latency profilers used for rollout timing stats.
//!
//! The first `burnin` samples are discarded so one-off warm-up costs
//! (thread spawn, first allocation) do not skew the mean.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Samples discarded by [`Profiler::default`].
pub const DEFAULT_BURNIN: u64 = 1;

/// Single-owner latency accumulator.
#[derive(Clone, Debug)]
pub struct Profiler {
    total: Duration,
    count: u64,
    seen: u64,
    burnin: u64,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new(DEFAULT_BURNIN)
    }
}

impl Profiler {
    /// Create a profiler that ignores its first `burnin` samples.
    pub fn new(burnin: u64) -> Self {
        Self {
            total: Duration::ZERO,
            count: 0,
            seen: 0,
            burnin,
        }
    }

    /// Time `f` and record its duration.
    pub fn time<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        self.record(start.elapsed());
        out
    }

    /// Record one sample.
    pub fn record(&mut self, elapsed: Duration) {
        self.seen += 1;
        if self.seen > self.burnin {
            self.total += elapsed;
            self.count += 1;
        }
    }

    /// Number of samples counted in the mean.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean sample, in microseconds. Zero before any sample is counted.
    pub fn mean_us(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() * 1e6 / self.count as f64
    }
}

/// Lock-free latency accumulator shared between a worker thread that
/// records and a handle that reads.
#[derive(Debug)]
pub struct SharedProfiler {
    total_ns: AtomicU64,
    count: AtomicU64,
    seen: AtomicU64,
    burnin: u64,
}

// Compile-time assertion: SharedProfiler must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<SharedProfiler>();
};

impl Default for SharedProfiler {
    fn default() -> Self {
        Self::new(DEFAULT_BURNIN)
    }
}

impl SharedProfiler {
    /// Create a shared profiler that ignores its first `burnin` samples.
    pub fn new(burnin: u64) -> Self {
        Self {
            total_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
            seen: AtomicU64::new(0),
            burnin,
        }
    }

    /// Record one sample.
    pub fn record(&self, elapsed: Duration) {
        let seen = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen > self.burnin {
            let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
            self.total_ns.fetch_add(ns, Ordering::Relaxed);
            self.count.fetch_add(1, Ordering::Release);
        }
    }

    /// Number of samples counted in the mean.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Mean sample, in microseconds. Zero before any sample is counted.
    pub fn mean_us(&self) -> f64 {
        let count = self.count.load(Ordering::Acquire);
        if count == 0 {
            return 0.0;
        }
        self.total_ns.load(Ordering::Relaxed) as f64 / 1e3 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burnin_samples_are_ignored() {
        let mut p = Profiler::new(2);
        p.record(Duration::from_millis(100));
        p.record(Duration::from_millis(100));
        assert_eq!(p.count(), 0);
        assert_eq!(p.mean_us(), 0.0);
        p.record(Duration::from_micros(10));
        p.record(Duration::from_micros(30));
        assert_eq!(p.count(), 2);
        assert!((p.mean_us() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn time_returns_closure_value() {
        let mut p = Profiler::new(0);
        let v = p.time(|| 7);
        assert_eq!(v, 7);
        assert_eq!(p.count(), 1);
    }

    #[test]
    fn shared_profiler_mean() {
        let p = SharedProfiler::new(1);
        p.record(Duration::from_secs(1));
        p.record(Duration::from_micros(4));
        p.record(Duration::from_micros(6));
        assert_eq!(p.count(), 2);
        assert!((p.mean_us() - 5.0).abs() < 1e-6);
    }
}
