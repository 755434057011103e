//! 定时器自愈、漏执行补偿、关联校验与完结清理

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, instrument, warn};

use media_scheduler_core::{SchedulerResult, Task};
use media_scheduler_infrastructure::StructuredLogger;

use super::TaskScheduler;
use crate::schedule_calc::ScheduleCalculator;
use crate::timer_queue::{FireReason, TimerSlot};

impl TaskScheduler {
    pub(super) fn stuck_threshold(&self) -> Duration {
        Duration::seconds(self.config.stuck_threshold_seconds as i64)
    }

    /// 校验定时器到期：发现丢失的定时器就重新布置，发现卡住的定时器就立即执行
    #[instrument(skip(self))]
    pub async fn validate_timer(self: &Arc<Self>, task_id: &str) -> SchedulerResult<()> {
        let Some(task) = self.store.get_task(task_id).await? else {
            debug!("任务 {} 已不存在，停止校验", task_id);
            self.teardown(task_id).await?;
            return Ok(());
        };
        if !task.enabled {
            self.teardown(task_id).await?;
            return Ok(());
        }

        let now = self.clock.now();
        let min_interval = Duration::seconds(self.config.validation_min_seconds as i64);

        if self.is_executing(task_id) {
            // 正在执行时执行定时器本来就不存在，执行结束后会重新布置
            self.timers().arm(
                task_id,
                TimerSlot::Validation,
                now + min_interval,
                FireReason::Validation,
            );
            self.notify_dispatcher();
            return Ok(());
        }

        let Some(due_at) = self.timer_due(task_id) else {
            StructuredLogger::log_timer_healed(task_id, "timer_loss");
            self.metrics.record_timer_heal("timer_loss");
            self.schedule_task(&task).await?;
            return Ok(());
        };

        if let Some(next_run) = task.next_run {
            if ScheduleCalculator::is_overdue(next_run, now, self.stuck_threshold()) {
                StructuredLogger::log_timer_healed(task_id, "stuck_timer");
                self.metrics.record_timer_heal("stuck_timer");
                self.cancel_task(task_id);
                self.spawn_run(task_id);
                return Ok(());
            }
        }

        let until_next = (due_at - now).max(min_interval);
        self.timers().arm(
            task_id,
            TimerSlot::Validation,
            now + until_next,
            FireReason::Validation,
        );
        self.notify_dispatcher();
        debug!("任务 {} 定时器正常，{} 后再次校验", task_id, until_next);
        Ok(())
    }

    /// 全量校验：为缺少执行定时器的启用任务重新布置，移除禁用任务的定时器。
    /// 返回修复的任务数。
    pub async fn validate_all_timers(&self) -> SchedulerResult<usize> {
        let tasks = self.store.get_tasks().await?;
        let mut healed = 0;

        for task in &tasks {
            if !task.enabled {
                if self.has_timer(&task.id) || self.has_validation_timer(&task.id) {
                    self.teardown(&task.id).await?;
                }
                continue;
            }
            if self.has_timer(&task.id) || self.is_executing(&task.id) {
                continue;
            }
            StructuredLogger::log_timer_healed(&task.id, "fleet_validation");
            self.metrics.record_timer_heal("fleet_validation");
            match self.schedule_task(task).await {
                Ok(_) => healed += 1,
                Err(e) => StructuredLogger::log_system_error("scheduler", "validate_all_timers", &e),
            }
        }

        // 存储中已不存在的任务
        for task_id in self.scheduled_task_ids() {
            if !tasks.iter().any(|t| t.id == task_id) {
                debug!("任务 {} 已不存在，移除定时器", task_id);
                self.teardown(&task_id).await?;
            }
        }

        if healed > 0 {
            info!("全量校验修复了 {} 个任务的定时器", healed);
        }
        Ok(healed)
    }

    /// 补偿执行：启用任务的 `next_run` 已过去超过阈值、既未执行也没有
    /// 即将触发的定时器时立即执行。返回补偿的任务数。
    pub async fn check_missed_tasks(self: &Arc<Self>) -> SchedulerResult<usize> {
        let now = self.clock.now();
        let tasks = self.store.get_tasks().await?;
        let mut missed = 0;

        for task in tasks.iter().filter(|t| t.enabled) {
            let Some(next_run) = task.next_run else {
                continue;
            };
            if !ScheduleCalculator::is_overdue(next_run, now, self.stuck_threshold()) {
                continue;
            }
            if self.is_executing(&task.id) {
                continue;
            }
            if self.timer_due(&task.id).is_some_and(|due| due > now) {
                continue;
            }
            warn!(
                "任务 {} 错过了计划执行时间 {}，立即补偿执行",
                task.id, next_run
            );
            self.cancel_task(&task.id);
            self.spawn_run(&task.id);
            missed += 1;
        }
        Ok(missed)
    }

    /// 校验全部任务的条目关联，修复可恢复的失效关联。不使用兜底策略。
    /// 返回修复的任务数。
    pub async fn revalidate_associations(&self) -> SchedulerResult<usize> {
        let items = self.store.get_items().await?;
        let tasks = self.store.get_tasks().await?;
        let mut healed = 0;

        for mut task in tasks {
            if self.is_executing(&task.id) {
                // 运行中的任务会在本次运行里自行解析条目
                continue;
            }
            match self.item_resolver.resolve_without_fallback(&task, &items) {
                Some(matched) if matched.strategy.requires_heal() => {
                    self.workflow.heal_association(&mut task, &matched).await?;
                    healed += 1;
                }
                Some(_) => {}
                None => {
                    warn!(
                        "任务 {}（{}）关联的条目 {} 无法解析",
                        task.id, task.name, task.target_item_id
                    );
                }
            }
        }
        Ok(healed)
    }

    /// 删除条目已完结且开启了自动删除的任务。返回删除的任务数。
    pub async fn cleanup_completed_tasks(&self) -> SchedulerResult<usize> {
        let tasks = self.store.get_tasks().await?;
        let mut removed = 0;
        for task in tasks.iter().filter(|t| t.action.auto_delete_when_completed) {
            if self.is_executing(&task.id) {
                continue;
            }
            if self.retire_if_completed(&task.id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// 条目已完结且任务开启了自动删除时删除任务
    pub(super) async fn retire_if_completed(&self, task_id: &str) -> SchedulerResult<bool> {
        let Some(task) = self.store.get_task(task_id).await? else {
            return Ok(false);
        };
        if !self.target_completed(&task).await? {
            return Ok(false);
        }
        self.delete_task(task_id).await?;
        StructuredLogger::log_task_retired(task_id, &task.target_item_id);
        Ok(true)
    }

    async fn target_completed(&self, task: &Task) -> SchedulerResult<bool> {
        if !task.action.auto_delete_when_completed {
            return Ok(false);
        }
        let items = self.store.get_items().await?;
        Ok(items
            .iter()
            .find(|item| item.id == task.target_item_id)
            .is_some_and(|item| item.is_completed()))
    }
}
