//! Structured logging utilities
//!
//! 调度器生命周期中的关键事件统一在这里输出，字段名保持稳定，
//! 方便按 `event` 字段检索。

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use media_scheduler_core::SchedulerError;

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log task scheduling event
    pub fn log_task_scheduled(task_id: &str, task_name: &str, next_run: DateTime<Utc>) {
        info!(
            event = "task_scheduled",
            task.id = task_id,
            task.name = task_name,
            task.next_run = %next_run,
            "任务已安排执行"
        );
    }

    /// Log queue placement produced by conflict resolution
    pub fn log_task_queued(task_id: &str, position: u32, run_at: DateTime<Utc>) {
        info!(
            event = "task_queued",
            task.id = task_id,
            queue.position = position,
            task.run_at = %run_at,
            "任务因调度冲突进入排队"
        );
    }

    pub fn log_conflict_shift(task_id: &str, original: DateTime<Utc>, shifted: DateTime<Utc>) {
        info!(
            event = "conflict_shift",
            task.id = task_id,
            task.original_run = %original,
            task.shifted_run = %shifted,
            "调度冲突已通过平移执行时间解决"
        );
    }

    /// Log task execution start
    pub fn log_run_started(task_id: &str, task_name: &str, attempt: u32) {
        info!(
            event = "task_run_start",
            task.id = task_id,
            task.name = task_name,
            run.attempt = attempt,
            "开始执行任务"
        );
    }

    /// Log task execution completion
    pub fn log_run_finished(
        task_id: &str,
        task_name: &str,
        status: &str,
        duration_ms: u64,
        error_message: Option<&str>,
    ) {
        match error_message {
            None => info!(
                event = "task_run_complete",
                task.id = task_id,
                task.name = task_name,
                run.status = status,
                run.duration_ms = duration_ms,
                "任务执行完成"
            ),
            Some(message) => warn!(
                event = "task_run_failed",
                task.id = task_id,
                task.name = task_name,
                run.status = status,
                run.duration_ms = duration_ms,
                run.error = message,
                "任务执行未成功"
            ),
        }
    }

    pub fn log_timer_healed(task_id: &str, reason: &str) {
        warn!(
            event = "timer_healed",
            task.id = task_id,
            heal.reason = reason,
            "定时器自愈"
        );
    }

    pub fn log_item_reassociated(task_id: &str, old_item_id: &str, new_item_id: &str, strategy: &str) {
        warn!(
            event = "item_reassociated",
            task.id = task_id,
            item.old_id = old_item_id,
            item.new_id = new_item_id,
            match.strategy = strategy,
            "任务关联的媒体条目已重新匹配"
        );
    }

    pub fn log_task_retired(task_id: &str, item_id: &str) {
        info!(
            event = "task_retired",
            task.id = task_id,
            item.id = item_id,
            "条目已完结，自动删除任务"
        );
    }

    /// Log system error
    pub fn log_system_error(component: &str, operation: &str, error: &SchedulerError) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error.kind = error.kind(),
            error.message = %error,
            "System error occurred"
        );
    }
}
