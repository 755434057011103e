use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use media_scheduler_core::{MediaItem, SchedulerError, SchedulerResult, Task, TaskStore};

use super::CatalogSnapshot;

/// JSON 文件存储
///
/// 启动时整体读入内存，每次修改后先写临时文件再重命名，避免写到一半的文件。
#[derive(Debug)]
pub struct JsonFileTaskStore {
    path: PathBuf,
    state: RwLock<CatalogSnapshot>,
}

impl JsonFileTaskStore {
    /// 打开存储文件，文件不存在时以空数据开始
    pub async fn open(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => CatalogSnapshot::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SchedulerError::store_error(format!("解析存储文件 {} 失败: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("存储文件 {} 不存在，使用空数据", path.display());
                CatalogSnapshot::default()
            }
            Err(e) => return Err(e.into()),
        };

        debug!(
            "加载存储文件 {}: {} 个任务, {} 个条目",
            path.display(),
            state.tasks.len(),
            state.items.len()
        );

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, snapshot: &CatalogSnapshot) -> SchedulerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// 新增或覆盖任务并落盘
    pub async fn insert_task(&self, task: Task) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        if !state.replace_task(&task) {
            state.tasks.push(task);
        }
        self.persist(&state).await
    }

    /// 新增或覆盖媒体条目并落盘
    pub async fn insert_item(&self, item: MediaItem) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        if !state.replace_item(&item) {
            state.items.push(item);
        }
        self.persist(&state).await
    }
}

#[async_trait]
impl TaskStore for JsonFileTaskStore {
    async fn get_tasks(&self) -> SchedulerResult<Vec<Task>> {
        Ok(self.state.read().await.tasks.clone())
    }

    async fn update_task(&self, task: &Task) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        if !state.replace_task(task) {
            return Ok(false);
        }
        self.persist(&state).await?;
        Ok(true)
    }

    async fn delete_task(&self, id: &str) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        if !state.remove_task(id) {
            return Ok(false);
        }
        self.persist(&state).await?;
        Ok(true)
    }

    async fn get_items(&self) -> SchedulerResult<Vec<MediaItem>> {
        Ok(self.state.read().await.items.clone())
    }

    async fn update_item(&self, item: &MediaItem) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        if !state.replace_item(item) {
            return Ok(false);
        }
        self.persist(&state).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_scheduler_core::TaskSchedule;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileTaskStore::open(dir.path().join("catalog.json"))
            .await
            .unwrap();
        assert!(store.get_tasks().await.unwrap().is_empty());
        assert!(store.get_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_changes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("catalog.json");

        let store = JsonFileTaskStore::open(&path).await.unwrap();
        let mut task = Task::new("t1", "周更导入", "item-1", TaskSchedule::weekly(2, 20, 0));
        store.insert_task(task.clone()).await.unwrap();
        store
            .insert_item(MediaItem::new("item-1", "示例剧集"))
            .await
            .unwrap();

        task.target_item_id = "item-2".to_string();
        assert!(store.update_task(&task).await.unwrap());
        drop(store);

        let reopened = JsonFileTaskStore::open(&path).await.unwrap();
        let loaded = reopened.get_task("t1").await.unwrap().unwrap();
        assert_eq!(loaded.target_item_id, "item-2");
        assert_eq!(loaded.schedule, TaskSchedule::weekly(2, 20, 0));
        assert_eq!(reopened.get_items().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_store_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = JsonFileTaskStore::open(&path).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Store(_)));
    }

    #[tokio::test]
    async fn test_delete_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        let store = JsonFileTaskStore::open(&path).await.unwrap();
        store
            .insert_task(Task::new("t1", "a", "i", TaskSchedule::daily(1, 0)))
            .await
            .unwrap();
        assert!(store.delete_task("t1").await.unwrap());

        let reopened = JsonFileTaskStore::open(&path).await.unwrap();
        assert!(reopened.get_tasks().await.unwrap().is_empty());
    }
}
