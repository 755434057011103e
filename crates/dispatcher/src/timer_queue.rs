//! 按代数标记的定时器最小堆
//!
//! 每个任务最多有一个执行定时器和一个校验定时器。重新布置或取消只更新
//! `live` 表中的代数，堆里过期的条目在弹出时按代数不匹配丢弃。

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};

/// 定时器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerSlot {
    Execution,
    Validation,
}

/// 定时器到期后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireReason {
    /// 按计划执行
    Scheduled,
    /// 冲突解决后排队执行
    Queued,
    /// 基础设施错误后的重试，`attempt` 从 1 开始
    Retry { attempt: u32 },
    /// 自愈校验
    Validation,
}

/// 到期的定时器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEntry {
    pub task_id: String,
    pub slot: TimerSlot,
    pub reason: FireReason,
    pub due_at: DateTime<Utc>,
}

impl TimerEntry {
    /// 本次执行对应的尝试序号，非重试为 0
    pub fn attempt(&self) -> u32 {
        match self.reason {
            FireReason::Retry { attempt } => attempt,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct HeapKey {
    due_at: DateTime<Utc>,
    generation: u64,
    task_id: String,
    slot: TimerSlot,
}

#[derive(Debug, Clone, Copy)]
struct LiveTimer {
    generation: u64,
    due_at: DateTime<Utc>,
    reason: FireReason,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<HeapKey>>,
    live: HashMap<(String, TimerSlot), LiveTimer>,
    next_generation: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 布置定时器，替换同一任务同一种类的旧定时器。返回是否替换了旧定时器。
    pub fn arm(
        &mut self,
        task_id: &str,
        slot: TimerSlot,
        due_at: DateTime<Utc>,
        reason: FireReason,
    ) -> bool {
        self.next_generation += 1;
        let generation = self.next_generation;
        let replaced = self
            .live
            .insert(
                (task_id.to_string(), slot),
                LiveTimer {
                    generation,
                    due_at,
                    reason,
                },
            )
            .is_some();
        self.heap.push(Reverse(HeapKey {
            due_at,
            generation,
            task_id: task_id.to_string(),
            slot,
        }));
        self.maybe_compact();
        replaced
    }

    pub fn cancel(&mut self, task_id: &str, slot: TimerSlot) -> bool {
        self.live.remove(&(task_id.to_string(), slot)).is_some()
    }

    /// 取消任务的全部定时器，返回取消的数量
    pub fn cancel_all(&mut self, task_id: &str) -> usize {
        [TimerSlot::Execution, TimerSlot::Validation]
            .into_iter()
            .filter(|slot| self.cancel(task_id, *slot))
            .count()
    }

    pub fn contains(&self, task_id: &str, slot: TimerSlot) -> bool {
        self.live.contains_key(&(task_id.to_string(), slot))
    }

    pub fn due_at(&self, task_id: &str, slot: TimerSlot) -> Option<DateTime<Utc>> {
        self.live
            .get(&(task_id.to_string(), slot))
            .map(|timer| timer.due_at)
    }

    pub fn reason(&self, task_id: &str, slot: TimerSlot) -> Option<FireReason> {
        self.live
            .get(&(task_id.to_string(), slot))
            .map(|timer| timer.reason)
    }

    /// 最早的有效到期时间
    pub fn next_deadline(&mut self) -> Option<DateTime<Utc>> {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.is_current(top) {
                return Some(top.due_at);
            }
            self.heap.pop();
        }
        None
    }

    /// 弹出所有到期（`due_at <= now`）的有效定时器，按到期时间排序
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<TimerEntry> {
        let mut due = Vec::new();
        while let Some(Reverse(top)) = self.heap.peek() {
            if top.due_at > now {
                break;
            }
            let Some(Reverse(key)) = self.heap.pop() else {
                break;
            };
            if !self.is_current(&key) {
                continue;
            }
            let Some(timer) = self.live.remove(&(key.task_id.clone(), key.slot)) else {
                continue;
            };
            due.push(TimerEntry {
                task_id: key.task_id,
                slot: key.slot,
                reason: timer.reason,
                due_at: key.due_at,
            });
        }
        due
    }

    /// 有效定时器数量
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    /// 持有某种定时器的任务ID
    pub fn task_ids(&self, slot: TimerSlot) -> Vec<String> {
        let mut ids: Vec<String> = self
            .live
            .keys()
            .filter(|(_, s)| *s == slot)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn is_current(&self, key: &HeapKey) -> bool {
        self.live
            .get(&(key.task_id.clone(), key.slot))
            .is_some_and(|timer| timer.generation == key.generation)
    }

    fn maybe_compact(&mut self) {
        if self.heap.len() <= self.live.len() * 2 + 64 {
            return;
        }
        let live = &self.live;
        self.heap.retain(|Reverse(key)| {
            live.get(&(key.task_id.clone(), key.slot))
                .is_some_and(|timer| timer.generation == key.generation)
        });
    }
}
