//! 媒体库定时导入调度器的核心类型
//!
//! 包含错误类型、领域模型（任务、媒体条目、冲突、工作流步骤）、
//! 外部协作方接口以及配置。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
pub use models::{MediaItem, RunStatus, Task, TaskSchedule, WorkflowStep};
pub use traits::{
    Clock, ConflictDetector, ConflictResolver, SystemClock, TaskStore, TimeoutLock,
    WorkflowSteps,
};
