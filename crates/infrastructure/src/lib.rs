//! 调度器的基础设施实现
//!
//! 存储、超时锁、冲突检测、外部命令步骤以及日志与指标。

pub mod command_steps;
pub mod conflict;
pub mod lock;
pub mod observability;
pub mod store;
pub mod timeout_handler;

pub use command_steps::CommandWorkflowSteps;
pub use conflict::{ShiftConflictResolver, WindowConflictDetector};
pub use lock::InMemoryTimeoutLock;
pub use observability::{MetricsCollector, StructuredLogger};
pub use store::{create_store, CatalogSnapshot, InMemoryTaskStore, JsonFileTaskStore};
pub use timeout_handler::run_step;
