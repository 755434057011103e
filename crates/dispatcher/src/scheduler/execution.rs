use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use media_scheduler_core::{
    models::{RunStatus, TaskType},
    SchedulerError, SchedulerResult, Task,
};
use media_scheduler_infrastructure::StructuredLogger;

use super::{RunOutcome, TaskScheduler};

const LOCK_PURPOSE: &str = "定时导入任务";

/// 执行集合中的登记，离开作用域时自动移除
struct ExecutionGuard {
    set: Arc<Mutex<HashSet<String>>>,
    task_id: String,
}

impl ExecutionGuard {
    fn enter(set: &Arc<Mutex<HashSet<String>>>, task_id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id.to_string());
        inserted.then(|| Self {
            set: set.clone(),
            task_id: task_id.to_string(),
        })
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.task_id);
    }
}

impl TaskScheduler {
    /// 执行定时器到期：执行任务并根据结果重试、删除或重新调度
    #[instrument(skip(self))]
    pub async fn run_now(&self, task_id: &str, attempt: u32) -> SchedulerResult<RunOutcome> {
        if self.is_executing(task_id) {
            debug!("任务 {} 正在执行，跳过本次触发", task_id);
            if let Some(task) = self.store.get_task(task_id).await? {
                self.schedule_task(&task).await?;
            }
            return Ok(RunOutcome::AlreadyRunning);
        }

        let Some(task) = self.store.get_task(task_id).await? else {
            warn!("任务 {} 已不存在，移除定时器", task_id);
            self.teardown(task_id).await?;
            return Ok(RunOutcome::Skipped);
        };
        if !task.enabled {
            debug!("任务 {} 已禁用，不再调度", task_id);
            self.teardown(task_id).await?;
            return Ok(RunOutcome::Skipped);
        }

        let result = self.execute_task(task, attempt).await;
        self.after_run(task_id, attempt, result).await
    }

    /// 执行一次任务：加锁、登记执行集合、运行工作流、持久化结果，最后释放锁。
    ///
    /// 只有基础设施错误以 `Err` 返回（由调用方决定是否重试），
    /// 工作流失败以 `RunOutcome::Failed` 返回。
    pub async fn execute_task(&self, task: Task, attempt: u32) -> SchedulerResult<RunOutcome> {
        if task.task_type == TaskType::Unknown {
            let err = SchedulerError::UnknownTaskType(task.task_type.to_string());
            warn!("任务 {} 无法执行: {}", task.id, err);
            return Ok(RunOutcome::Unsupported);
        }

        let acquisition = self
            .lock
            .acquire(&task.id, LOCK_PURPOSE, self.config.lock_ttl())
            .await?;
        if !acquisition.acquired {
            let err = SchedulerError::LockUnavailable {
                key: task.id.clone(),
                reason: acquisition.error.unwrap_or_default(),
            };
            warn!("{}，按计划重新调度", err);
            self.metrics.record_lock_contention();
            return Ok(RunOutcome::LockUnavailable);
        }

        let result = self.run_locked(task.clone(), attempt).await;

        if let Err(e) = self.lock.release(&task.id).await {
            warn!("释放任务 {} 的锁失败: {}", task.id, e);
        }
        result
    }

    async fn run_locked(&self, mut task: Task, attempt: u32) -> SchedulerResult<RunOutcome> {
        let Some(_guard) = ExecutionGuard::enter(&self.executing, &task.id) else {
            return Ok(RunOutcome::AlreadyRunning);
        };

        let now = self.clock.now();
        task.last_run = Some(now);
        self.record_run_start(&task.id, now).await?;

        StructuredLogger::log_run_started(&task.id, &task.name, attempt);
        let started = Instant::now();
        let result = self.workflow.run(&mut task).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(report) => {
                task.last_run_status = Some(RunStatus::Success);
                task.last_run_error = None;
                Ok(RunOutcome::Succeeded(report))
            }
            Err(e) => {
                task.last_run_status = Some(e.run_status());
                task.last_run_error = Some(e.to_string());
                self.metrics.record_failure(e.kind());
                if e.is_retryable() {
                    Err(e)
                } else if e.is_user_interrupted() {
                    Ok(RunOutcome::Interrupted(e))
                } else {
                    Ok(RunOutcome::Failed(e))
                }
            }
        };

        let status = task
            .last_run_status
            .map(|s| s.as_str())
            .unwrap_or("unknown");
        StructuredLogger::log_run_finished(
            &task.id,
            &task.name,
            status,
            elapsed.as_millis() as u64,
            task.last_run_error.as_deref(),
        );
        self.metrics.record_run(status, elapsed.as_secs_f64());

        self.persist_run_state(&task).await?;
        outcome
    }

    async fn record_run_start(&self, task_id: &str, now: DateTime<Utc>) -> SchedulerResult<()> {
        let Some(mut latest) = self.store.get_task(task_id).await? else {
            debug!("任务 {} 在开始执行前被删除", task_id);
            return Ok(());
        };
        latest.last_run = Some(now);
        latest.touch(now);
        self.store.update_task(&latest).await?;
        Ok(())
    }

    /// 把运行结果写回最新的任务记录。关联字段已在恢复时单独写入，这里不覆盖。
    async fn persist_run_state(&self, ran: &Task) -> SchedulerResult<()> {
        let Some(mut latest) = self.store.get_task(&ran.id).await? else {
            debug!("任务 {} 在执行期间被删除", ran.id);
            return Ok(());
        };
        latest.last_run = ran.last_run;
        latest.last_run_status = ran.last_run_status;
        latest.last_run_error = ran.last_run_error.clone();
        latest.touch(self.clock.now());
        self.store.update_task(&latest).await?;
        Ok(())
    }

    /// 执行结束后的处理：重试、完结删除或按计划重新调度
    async fn after_run(
        &self,
        task_id: &str,
        attempt: u32,
        result: SchedulerResult<RunOutcome>,
    ) -> SchedulerResult<RunOutcome> {
        if let Err(e) = &result {
            if self.retry.should_retry(attempt, e) {
                let delay = self.retry.backoff(attempt);
                let run_at = self.arm_retry(task_id, attempt + 1, delay).await?;
                self.metrics.record_retry(attempt + 1);
                warn!(
                    "任务 {} 第 {} 次执行失败: {}，将于 {} 重试",
                    task_id,
                    attempt + 1,
                    e,
                    run_at
                );
                return result;
            }
            warn!("任务 {} 执行失败且不再重试: {}", task_id, e);
        }

        if matches!(result, Ok(RunOutcome::AlreadyRunning)) {
            if let Some(task) = self.store.get_task(task_id).await? {
                self.schedule_task(&task).await?;
            }
            return result;
        }

        if self.retire_if_completed(task_id).await? {
            return Ok(RunOutcome::Retired);
        }

        match self.store.get_task(task_id).await? {
            Some(task) if task.enabled => {
                self.schedule_task(&task).await?;
            }
            Some(_) => {
                info!("任务 {} 在执行期间被禁用", task_id);
                self.teardown(task_id).await?;
            }
            None => {
                info!("任务 {} 在执行期间被删除", task_id);
                self.teardown(task_id).await?;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_guard_is_exclusive_and_released_on_drop() {
        let set = Arc::new(Mutex::new(HashSet::new()));
        let guard = ExecutionGuard::enter(&set, "task-1").unwrap();
        assert!(ExecutionGuard::enter(&set, "task-1").is_none());
        assert_eq!(set.lock().unwrap().len(), 1);

        drop(guard);
        assert!(set.lock().unwrap().is_empty());
        assert!(ExecutionGuard::enter(&set, "task-1").is_some());
    }
}
