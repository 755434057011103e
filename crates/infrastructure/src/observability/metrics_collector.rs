//! Metrics collector for the media scheduler
//!
//! 通过 `metrics` 门面记录指标，具体导出方式由宿主进程决定。

use metrics::{counter, gauge, histogram};
use tracing::debug;

/// 调度器指标
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished workflow run
    pub fn record_run(&self, status: &str, duration_seconds: f64) {
        counter!("media_scheduler_runs_total", "status" => status.to_string()).increment(1);
        histogram!("media_scheduler_run_duration_seconds").record(duration_seconds);
        debug!(status, duration_seconds, "记录任务执行指标");
    }

    /// Record a run failure by error kind
    pub fn record_failure(&self, error_kind: &'static str) {
        counter!("media_scheduler_run_failures_total", "kind" => error_kind).increment(1);
    }

    /// Record a retry being armed
    pub fn record_retry(&self, attempt: u32) {
        counter!("media_scheduler_run_retries_total").increment(1);
        debug!(attempt, "记录重试指标");
    }

    /// Record a self-healed timer
    pub fn record_timer_heal(&self, reason: &'static str) {
        counter!("media_scheduler_timer_heals_total", "reason" => reason).increment(1);
    }

    pub fn record_lock_contention(&self) {
        counter!("media_scheduler_lock_contention_total").increment(1);
    }

    pub fn set_live_timers(&self, count: usize) {
        gauge!("media_scheduler_live_timers").set(count as f64);
    }
}
