//! # Media Scheduler Testing Utils
//!
//! Shared testing utilities for the media scheduler workspace.
//!
//! ## Features
//!
//! - **Mock Collaborators**: in-memory store, lock, conflict detector/resolver
//!   and scripted workflow steps with failure injection and call counters
//! - **Manual Clock**: a clock that only moves when the test moves it
//! - **Test Data Builders**: `TaskBuilder` and `MediaItemBuilder`
//! - **Helpers**: condition polling and fixed timestamps
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! media-scheduler-testing-utils = { path = "../testing-utils" }
//! ```
//!
//! ```rust,ignore
//! use media_scheduler_testing_utils::*;
//!
//! let store = MockTaskStore::new();
//! store.insert_task(TaskBuilder::new("task-1").daily(9, 0).build());
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
