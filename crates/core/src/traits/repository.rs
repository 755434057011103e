//! 任务与媒体条目存储接口
//!
//! 调度器不关心存储的具体实现，只通过 `TaskStore` 读取任务、回写运行状态、
//! 读取媒体条目以及在导入成功后回写剧集标记。
//!
//! ## 设计原则
//!
//! - 所有操作都是异步的，返回 `SchedulerResult<T>` 统一错误处理
//! - 实现 `Send + Sync`，可以在多个并发运行的任务之间共享
//! - `update_task` / `delete_task` 返回记录是否存在，而不是把"不存在"当成错误
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use media_scheduler_core::traits::TaskStore;
//!
//! async fn enabled_count(store: &dyn TaskStore) -> SchedulerResult<usize> {
//!     let tasks = store.get_tasks().await?;
//!     Ok(tasks.iter().filter(|t| t.enabled).count())
//! }
//! ```

use async_trait::async_trait;

use crate::{
    models::{MediaItem, Task},
    SchedulerResult,
};

/// 任务存储接口
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 获取全部任务
    async fn get_tasks(&self) -> SchedulerResult<Vec<Task>>;

    /// 按ID获取任务
    async fn get_task(&self, id: &str) -> SchedulerResult<Option<Task>> {
        let tasks = self.get_tasks().await?;
        Ok(tasks.into_iter().find(|t| t.id == id))
    }

    /// 更新任务，记录不存在时返回 `false`
    async fn update_task(&self, task: &Task) -> SchedulerResult<bool>;

    /// 删除任务，记录不存在时返回 `false`
    async fn delete_task(&self, id: &str) -> SchedulerResult<bool>;

    /// 获取全部媒体条目
    async fn get_items(&self) -> SchedulerResult<Vec<MediaItem>>;

    /// 更新媒体条目，记录不存在时返回 `false`
    async fn update_item(&self, item: &MediaItem) -> SchedulerResult<bool>;
}
