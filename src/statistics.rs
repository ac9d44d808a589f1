//! Statistics tracking for the simulation loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

/// Represents a snapshot of the simulation loop's performance metrics.
///
/// Returned by [`Simulator::statistics`](crate::Simulator::statistics) and
/// served by `GET /simulator/statistics`.
///
/// # Fields
///
/// - `runtime`: The elapsed time since the simulator was created. Serialized as seconds.
/// - `step_count`: The number of model steps executed, including manual steps.
/// - `error_count`: The number of failed steps and loop errors.
/// - `frequency`: The average step rate, calculated as `(step_count / runtime)`.
///
/// A frequency well below `1 / dt` while the simulator is running means the
/// loop cannot keep up with real time.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    #[serde(serialize_with = "as_seconds")]
    pub runtime: Duration,
    pub step_count: u64,
    pub error_count: u64,
    pub frequency: f64,
}

fn as_seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Statistics engine for tracking simulation steps.
#[derive(Debug)]
pub(crate) struct StatisticsEngine {
    start_time: Instant,
    step_count: AtomicU64,
    error_count: AtomicU64,
}

impl StatisticsEngine {
    pub fn new() -> Self {
        StatisticsEngine {
            start_time: Instant::now(),
            step_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Statistics {
        Statistics {
            runtime: self.start_time.elapsed(),
            step_count: self.step_count(),
            error_count: self.error_count(),
            frequency: self.frequency(),
        }
    }

    fn step_count(&self) -> u64 {
        self.step_count.load(Ordering::Relaxed)
    }

    fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub(crate) fn increment_step_count(&self) {
        self.step_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_error_count(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    fn frequency(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.step_count() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for StatisticsEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn new_starts_with_zero_counts() {
        let engine = StatisticsEngine::new();
        let snapshot = engine.snapshot();

        assert_eq!(snapshot.step_count, 0);
        assert_eq!(snapshot.error_count, 0);
    }

    #[test]
    fn increment_step_count_increases_count() {
        let engine = StatisticsEngine::new();

        engine.increment_step_count();
        engine.increment_step_count();
        engine.increment_step_count();

        assert_eq!(engine.snapshot().step_count, 3);
    }

    #[test]
    fn increment_error_count_increases_count() {
        let engine = StatisticsEngine::new();

        engine.increment_error_count();
        engine.increment_error_count();

        assert_eq!(engine.snapshot().error_count, 2);
    }

    #[test]
    fn runtime_increases_over_time() {
        let engine = StatisticsEngine::new();

        thread::sleep(Duration::from_millis(10));

        let snapshot = engine.snapshot();
        assert!(snapshot.runtime >= Duration::from_millis(10));
    }

    #[test]
    fn frequency_calculated_correctly() {
        let engine = StatisticsEngine::new();

        thread::sleep(Duration::from_millis(50));
        engine.increment_step_count();
        engine.increment_step_count();

        let snapshot = engine.snapshot();
        // Roughly 2 / 0.05 = 40, but allow wide margin
        assert!(snapshot.frequency > 0.0);
        assert!(snapshot.frequency < 100.0);
    }

    #[test]
    fn serializes_runtime_as_seconds() {
        let statistics = Statistics {
            runtime: Duration::from_millis(1500),
            step_count: 90,
            error_count: 1,
            frequency: 60.0,
        };

        let json = serde_json::to_value(&statistics).unwrap();

        assert_eq!(json["runtime"], 1.5);
        assert_eq!(json["step_count"], 90);
        assert_eq!(json["error_count"], 1);
    }
}
