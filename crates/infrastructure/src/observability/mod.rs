//! Observability module
//!
//! 结构化日志事件与调度器指标。

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
