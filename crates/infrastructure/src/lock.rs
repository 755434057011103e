//! 进程内的超时锁
//!
//! 锁在 TTL 到期后自动失效，持有者崩溃时不会永久占用。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use media_scheduler_core::{traits::LockAcquisition, SchedulerResult, TimeoutLock};

#[derive(Debug, Clone)]
struct LockEntry {
    purpose: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct InMemoryTimeoutLock {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryTimeoutLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前是否被持有（已过期的不算）
    pub fn is_held(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }
}

#[async_trait]
impl TimeoutLock for InMemoryTimeoutLock {
    async fn acquire(
        &self,
        key: &str,
        purpose: &str,
        ttl: Duration,
    ) -> SchedulerResult<LockAcquisition> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                debug!("锁 {} 已被占用: {}", key, existing.purpose);
                return Ok(LockAcquisition::rejected(format!(
                    "锁已被占用: {}",
                    existing.purpose
                )));
            }
            warn!("锁 {} 已过期，重新分配 (原用途: {})", key, existing.purpose);
        }

        entries.insert(
            key.to_string(),
            LockEntry {
                purpose: purpose.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(LockAcquisition::acquired())
    }

    async fn release(&self, key: &str) -> SchedulerResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_none() {
            debug!("释放未持有的锁: {}", key);
        }
        Ok(())
    }
}
