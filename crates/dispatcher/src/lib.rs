//! 调度核心：执行时间计算、定时器队列、重试策略、条目解析、导入工作流与调度器

pub mod item_resolver;
pub mod retry_service;
pub mod schedule_calc;
pub mod scheduler;
pub mod timer_queue;
pub mod workflow;

pub use item_resolver::{ItemMatch, ItemResolver, MatchStrategy};
pub use retry_service::RetryPolicy;
pub use schedule_calc::ScheduleCalculator;
pub use scheduler::{MaintenanceJob, RunOutcome, ScheduleOutcome, SchedulerDeps, TaskScheduler};
pub use timer_queue::{FireReason, TimerEntry, TimerQueue, TimerSlot};
pub use workflow::ImportWorkflow;
