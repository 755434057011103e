use async_trait::async_trait;
use tokio::sync::RwLock;

use media_scheduler_core::{MediaItem, SchedulerResult, Task, TaskStore};

use super::CatalogSnapshot;

/// 内存存储
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    state: RwLock<CatalogSnapshot>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(tasks: Vec<Task>, items: Vec<MediaItem>) -> Self {
        Self {
            state: RwLock::new(CatalogSnapshot { tasks, items }),
        }
    }

    /// 新增或覆盖任务
    pub async fn insert_task(&self, task: Task) {
        let mut state = self.state.write().await;
        if !state.replace_task(&task) {
            state.tasks.push(task);
        }
    }

    /// 新增或覆盖媒体条目
    pub async fn insert_item(&self, item: MediaItem) {
        let mut state = self.state.write().await;
        if !state.replace_item(&item) {
            state.items.push(item);
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get_tasks(&self) -> SchedulerResult<Vec<Task>> {
        Ok(self.state.read().await.tasks.clone())
    }

    async fn update_task(&self, task: &Task) -> SchedulerResult<bool> {
        Ok(self.state.write().await.replace_task(task))
    }

    async fn delete_task(&self, id: &str) -> SchedulerResult<bool> {
        Ok(self.state.write().await.remove_task(id))
    }

    async fn get_items(&self) -> SchedulerResult<Vec<MediaItem>> {
        Ok(self.state.read().await.items.clone())
    }

    async fn update_item(&self, item: &MediaItem) -> SchedulerResult<bool> {
        Ok(self.state.write().await.replace_item(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_scheduler_core::TaskSchedule;

    #[tokio::test]
    async fn test_update_and_delete_report_presence() {
        let store = InMemoryTaskStore::new();
        let mut task = Task::new("t1", "每日导入", "item-1", TaskSchedule::daily(9, 0));

        assert!(!store.update_task(&task).await.unwrap());
        store.insert_task(task.clone()).await;

        task.enabled = false;
        assert!(store.update_task(&task).await.unwrap());
        assert!(!store.get_task("t1").await.unwrap().unwrap().enabled);

        assert!(store.delete_task("t1").await.unwrap());
        assert!(!store.delete_task("t1").await.unwrap());
        assert!(store.get_task("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_item() {
        let store = InMemoryTaskStore::new();
        let mut item = MediaItem::new("item-1", "示例剧集");
        assert!(!store.update_item(&item).await.unwrap());

        store.insert_item(item.clone()).await;
        item.title = "新标题".to_string();
        assert!(store.update_item(&item).await.unwrap());
        assert_eq!(store.get_items().await.unwrap()[0].title, "新标题");
    }
}
