use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Counters for background buffering activity.
pub struct BufferMetrics {
    inner: Mutex<Metrics>,
}

struct Metrics {
    frames_built: usize,
    runs_completed: usize,
    runs_cancelled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub frames_built: usize,
    pub runs_completed: usize,
    pub runs_cancelled: usize,
}

impl BufferMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics {
                frames_built: 0,
                runs_completed: 0,
                runs_cancelled: 0,
            }),
        }
    }

    pub fn record_frame(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.frames_built += 1;
        }
    }

    pub fn record_completed(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.runs_completed += 1;
        }
    }

    pub fn record_cancelled(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.runs_cancelled += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            MetricsSnapshot {
                frames_built: metrics.frames_built,
                runs_completed: metrics.runs_completed,
                runs_cancelled: metrics.runs_cancelled,
            }
        } else {
            MetricsSnapshot {
                frames_built: 0,
                runs_completed: 0,
                runs_cancelled: 0,
            }
        }
    }
}

impl Default for BufferMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = BufferMetrics::new();
        metrics.record_frame();
        metrics.record_frame();
        metrics.record_completed();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_built, 2);
        assert_eq!(snapshot.runs_completed, 1);
        assert_eq!(snapshot.runs_cancelled, 0);
    }
}
