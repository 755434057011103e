//! 任务与媒体条目存储实现
//!
//! - `InMemoryTaskStore`: 进程内存储，适合测试与临时运行
//! - `JsonFileTaskStore`: 单个 JSON 文件持久化，每次写入整体落盘

mod json_file;
mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use media_scheduler_core::{
    config::{StoreConfig, StoreKind},
    MediaItem, SchedulerResult, Task, TaskStore,
};

pub use json_file::JsonFileTaskStore;
pub use memory::InMemoryTaskStore;

/// 存储内容的序列化形式
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub items: Vec<MediaItem>,
}

impl CatalogSnapshot {
    pub(crate) fn replace_task(&mut self, task: &Task) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => {
                *existing = task.clone();
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_task(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    pub(crate) fn replace_item(&mut self, item: &MediaItem) -> bool {
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => {
                *existing = item.clone();
                true
            }
            None => false,
        }
    }
}

/// 根据配置创建存储
pub async fn create_store(config: &StoreConfig) -> SchedulerResult<Arc<dyn TaskStore>> {
    match config.kind {
        StoreKind::Memory => {
            info!("使用内存存储");
            Ok(Arc::new(InMemoryTaskStore::new()))
        }
        StoreKind::Json => {
            info!("使用 JSON 文件存储: {}", config.path);
            Ok(Arc::new(JsonFileTaskStore::open(&config.path).await?))
        }
    }
}
