pub mod conflict;
pub mod item;
pub mod task;
pub mod workflow;

pub use conflict::*;
pub use item::*;
pub use task::*;
pub use workflow::*;
