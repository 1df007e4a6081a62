pub mod metrics;

pub use metrics::{BufferMetrics, MetricsSnapshot};
