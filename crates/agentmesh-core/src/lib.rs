//! agentmesh-core - shared types, error taxonomy, events, naming and the
//! global task log used by every other agentmesh crate.

pub mod error;
pub mod event;
pub mod namer;
pub mod task_log;
pub mod types;

pub use error::{Error, Result};
pub use event::{Event, EventBus, EventListener};
pub use namer::Namer;
pub use task_log::{TaskLog, TaskRecord, TaskStatus};
pub use types::*;
