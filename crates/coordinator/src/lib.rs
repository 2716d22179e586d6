pub mod error;
pub mod remote_task;
pub mod stage;
pub mod stage_manager;

pub use error::{CoordinatorError, Result};
pub use remote_task::HttpRemoteTask;
pub use stage::{RemoteTask, StageExecution};
pub use stage_manager::{InMemoryStageManager, StageManager};
