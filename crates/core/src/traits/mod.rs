pub mod repository;
pub mod scheduler;

pub use repository::*;
pub use scheduler::*;
