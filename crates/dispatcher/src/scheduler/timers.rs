use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use media_scheduler_core::{models::ConflictResolution, SchedulerError, SchedulerResult, Task};
use media_scheduler_infrastructure::StructuredLogger;

use super::{ScheduleOutcome, TaskScheduler};
use crate::schedule_calc::ScheduleCalculator;
use crate::timer_queue::{FireReason, TimerSlot};

impl TaskScheduler {
    fn seconds(value: u64) -> Duration {
        Duration::seconds(value as i64)
    }

    /// 校验定时器的间隔：距下次执行时间的一半，限制在上下限之间
    pub(super) fn validation_delay(&self, until_next: Duration) -> Duration {
        let min = Self::seconds(self.config.validation_min_seconds);
        let max = Self::seconds(self.config.validation_max_seconds);
        (until_next / 2).clamp(min, max)
    }

    /// 为任务布置执行定时器。已有的定时器会先被取消。
    #[instrument(skip_all, fields(task.id = %task.id))]
    pub async fn schedule_task(&self, task: &Task) -> SchedulerResult<ScheduleOutcome> {
        self.timers().cancel_all(&task.id);

        if !task.enabled {
            self.detector.unregister(&task.id).await?;
            debug!("任务 {} 未启用，不布置定时器", task.id);
            return Ok(ScheduleOutcome::Disabled);
        }

        let now = self.clock.now();
        let mut next = ScheduleCalculator::next_run_utc(&task.schedule, now)?;

        let conflicts = self.detector.detect(task, next).await?;
        if !conflicts.is_empty() {
            debug!("任务 {} 在 {} 与 {} 个任务冲突", task.id, next, conflicts.len());
            match self.resolver.resolve(task, next, &conflicts).await? {
                Some(ConflictResolution::Shift { new_time }) => {
                    StructuredLogger::log_conflict_shift(&task.id, next, new_time);
                    next = new_time;
                }
                Some(ConflictResolution::Queue { position }) => {
                    let wait = Self::seconds(
                        self.config
                            .queue_slot_seconds
                            .saturating_mul(u64::from(position)),
                    );
                    let run_at = now
                        .checked_add_signed(wait)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC)
                        .max(now + Self::seconds(self.config.min_delay_seconds));
                    self.timers()
                        .arm(&task.id, TimerSlot::Execution, run_at, FireReason::Queued);
                    self.notify_dispatcher();
                    StructuredLogger::log_task_queued(&task.id, position, run_at);
                    return Ok(ScheduleOutcome::Queued { run_at, position });
                }
                None => {}
            }
        }

        let earliest = now + Self::seconds(self.config.min_delay_seconds);
        if next < earliest {
            debug!("任务 {} 的执行时间 {} 过近，推迟到 {}", task.id, next, earliest);
            next = earliest;
        }

        self.persist_next_run(&task.id, next).await?;
        self.detector.register(task, next).await?;

        {
            let mut timers = self.timers();
            timers.arm(&task.id, TimerSlot::Execution, next, FireReason::Scheduled);
            timers.arm(
                &task.id,
                TimerSlot::Validation,
                now + self.validation_delay(next - now),
                FireReason::Validation,
            );
        }
        self.notify_dispatcher();

        StructuredLogger::log_task_scheduled(&task.id, &task.name, next);
        debug!("任务 {} 的执行频率: {}", task.id, ScheduleCalculator::describe(&task.schedule));
        Ok(ScheduleOutcome::Armed { next_run: next })
    }

    pub(super) async fn persist_next_run(
        &self,
        task_id: &str,
        next_run: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let mut stored = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| SchedulerError::task_not_found(task_id))?;
        stored.next_run = Some(next_run);
        stored.touch(self.clock.now());
        if !self.store.update_task(&stored).await? {
            return Err(SchedulerError::task_not_found(task_id));
        }
        Ok(())
    }

    /// 在 `delay` 之后布置一次重试
    pub(super) async fn arm_retry(
        &self,
        task_id: &str,
        attempt: u32,
        delay: std::time::Duration,
    ) -> SchedulerResult<DateTime<Utc>> {
        let delay = Duration::from_std(delay)
            .map_err(|e| SchedulerError::Internal(format!("无效的重试间隔: {e}")))?;
        let run_at = self.clock.now() + delay;
        self.persist_next_run(task_id, run_at).await?;
        self.timers().arm(
            task_id,
            TimerSlot::Execution,
            run_at,
            FireReason::Retry { attempt },
        );
        self.notify_dispatcher();
        Ok(run_at)
    }

    /// 只取消执行定时器
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let cancelled = self.timers().cancel(task_id, TimerSlot::Execution);
        if cancelled {
            debug!("已取消任务 {} 的执行定时器", task_id);
        }
        cancelled
    }

    /// 取消全部定时器并从冲突检测器注销
    pub(super) async fn teardown(&self, task_id: &str) -> SchedulerResult<()> {
        self.timers().cancel_all(task_id);
        self.detector.unregister(task_id).await
    }

    /// 禁用任务：移除定时器并持久化 `enabled = false`
    pub async fn disable_task(&self, task_id: &str) -> SchedulerResult<bool> {
        self.teardown(task_id).await?;
        let Some(mut task) = self.store.get_task(task_id).await? else {
            warn!("禁用的任务 {} 不存在", task_id);
            return Ok(false);
        };
        task.enabled = false;
        task.touch(self.clock.now());
        let updated = self.store.update_task(&task).await?;
        info!("任务 {} 已禁用", task_id);
        Ok(updated)
    }

    /// 删除任务：移除定时器并从存储中删除
    pub async fn delete_task(&self, task_id: &str) -> SchedulerResult<bool> {
        self.teardown(task_id).await?;
        let deleted = self.store.delete_task(task_id).await?;
        if deleted {
            info!("任务 {} 已删除", task_id);
        } else {
            warn!("删除的任务 {} 不存在", task_id);
        }
        Ok(deleted)
    }

    /// 任务的启用状态或执行时间被修改后调用，重新布置或移除定时器
    pub async fn on_task_updated(&self, task: &Task) -> SchedulerResult<ScheduleOutcome> {
        if task.enabled {
            self.schedule_task(task).await
        } else {
            self.teardown(&task.id).await?;
            Ok(ScheduleOutcome::Disabled)
        }
    }
}
