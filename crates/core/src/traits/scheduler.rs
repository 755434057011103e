use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    models::{
        Conflict, ConflictResolution, ExtractOutput, ImportOutput, ImportRequest, MediaItem,
        PruneOutput, StepOptions, StepResult, Task,
    },
    SchedulerResult,
};

/// 加锁结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockAcquisition {
    pub acquired: bool,
    pub error: Option<String>,
}

impl LockAcquisition {
    pub fn acquired() -> Self {
        Self {
            acquired: true,
            error: None,
        }
    }

    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        Self {
            acquired: false,
            error: Some(reason.into()),
        }
    }
}

/// 带过期时间的互斥锁（建议性锁）
#[async_trait]
pub trait TimeoutLock: Send + Sync {
    /// 尝试获取锁，已被占用时返回 `acquired = false` 而不是错误
    async fn acquire(&self, key: &str, purpose: &str, ttl: Duration)
        -> SchedulerResult<LockAcquisition>;

    /// 释放锁
    async fn release(&self, key: &str) -> SchedulerResult<()>;
}

/// 调度冲突检测
#[async_trait]
pub trait ConflictDetector: Send + Sync {
    /// 返回与候选执行时间冲突的已登记任务
    async fn detect(&self, task: &Task, candidate: DateTime<Utc>) -> SchedulerResult<Vec<Conflict>>;

    /// 以确定的执行时间登记任务
    async fn register(&self, task: &Task, resolved: DateTime<Utc>) -> SchedulerResult<()>;

    /// 注销任务
    async fn unregister(&self, task_id: &str) -> SchedulerResult<()>;
}

/// 调度冲突解决策略
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// 返回 `None` 表示维持原定时间
    async fn resolve(
        &self,
        task: &Task,
        candidate: DateTime<Utc>,
        conflicts: &[Conflict],
    ) -> SchedulerResult<Option<ConflictResolution>>;
}

/// 导入工作流的外部步骤
///
/// 每个步骤都接收一个取消令牌，超时时由调用方取消；步骤应尽快停止并返回。
#[async_trait]
pub trait WorkflowSteps: Send + Sync {
    /// 从平台抓取条目数据，生成中间文件
    async fn extract(
        &self,
        item: &MediaItem,
        season: u32,
        cancel: CancellationToken,
    ) -> StepResult<ExtractOutput>;

    /// 删除中间文件里已标记完成的剧集行
    async fn prune_marked(
        &self,
        path: &Path,
        item: &MediaItem,
        season: u32,
        options: StepOptions,
        cancel: CancellationToken,
    ) -> StepResult<PruneOutput>;

    /// 中间文件中是否还残留引用条目标题的行
    async fn check_residue(
        &self,
        path: &Path,
        title: &str,
        cancel: CancellationToken,
    ) -> StepResult<bool>;

    /// 提交导入
    async fn import(
        &self,
        item: &MediaItem,
        request: &ImportRequest,
        cancel: CancellationToken,
    ) -> StepResult<ImportOutput>;

    /// 导入后仍留在文件中的集数（即未成功导入的集数）
    async fn analyze_remaining(
        &self,
        path: &Path,
        cancel: CancellationToken,
    ) -> StepResult<BTreeSet<u32>>;
}

/// 时间源，测试中可替换为手动时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
