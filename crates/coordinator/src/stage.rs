//! Execution state of one stage of a distributed query plan.

use igloo_common::{StageInfo, StageState, TaskInfo};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Coordinator-side handle of a task scheduled on a worker.
pub trait RemoteTask: Send + Sync {
    fn task_id(&self) -> &str;

    /// Latest known snapshot of the task.
    fn task_info(&self) -> TaskInfo;

    /// Signals the task to stop. Must not block and must tolerate repeated calls.
    fn cancel(&self);
}

/// A registered stage: its tasks, the stages feeding it and its state.
///
/// Everything except the state is fixed at creation. Once the state is
/// terminal it never changes again.
pub struct StageExecution {
    query_id: String,
    stage_id: String,
    location: Url,
    state: RwLock<StageState>,
    tasks: Vec<Arc<dyn RemoteTask>>,
    sub_stages: Vec<Arc<StageExecution>>,
}

impl StageExecution {
    pub fn new(
        query_id: String,
        stage_id: String,
        location: Url,
        tasks: Vec<Arc<dyn RemoteTask>>,
        sub_stages: Vec<Arc<StageExecution>>,
    ) -> Self {
        Self {
            query_id,
            stage_id,
            location,
            state: RwLock::new(StageState::Planned),
            tasks,
            sub_stages,
        }
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn state(&self) -> StageState {
        *self.state.read()
    }

    pub fn tasks(&self) -> &[Arc<dyn RemoteTask>] {
        &self.tasks
    }

    pub fn sub_stages(&self) -> &[Arc<StageExecution>] {
        &self.sub_stages
    }

    /// Moves the stage to `new_state`. Returns `false` if the stage was
    /// already terminal and therefore left untouched.
    pub fn transition_to(&self, new_state: StageState) -> bool {
        let mut state = self.state.write();
        if state.is_done() {
            return false;
        }
        *state = new_state;
        true
    }

    /// Cancels this stage and every stage below it. A stage that already
    /// reached a terminal state is left as is, together with its subtree.
    pub fn cancel(&self) {
        if !self.transition_to(StageState::Canceled) {
            return;
        }
        debug!(
            query_id = %self.query_id,
            stage_id = %self.stage_id,
            tasks = self.tasks.len(),
            "Canceled stage"
        );
        for task in &self.tasks {
            task.cancel();
        }
        for sub_stage in &self.sub_stages {
            sub_stage.cancel();
        }
    }

    /// Snapshot of the whole stage tree rooted here.
    pub fn stage_info(&self) -> StageInfo {
        StageInfo {
            query_id: self.query_id.clone(),
            stage_id: self.stage_id.clone(),
            state: self.state(),
            self_uri: self.location.clone(),
            tasks: self.tasks.iter().map(|task| task.task_info()).collect(),
            sub_stages: self.sub_stages.iter().map(|stage| stage.stage_info()).collect(),
        }
    }
}

impl fmt::Debug for StageExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageExecution")
            .field("query_id", &self.query_id)
            .field("stage_id", &self.stage_id)
            .field("location", &self.location.as_str())
            .field("state", &self.state())
            .field("tasks", &self.tasks.len())
            .field("sub_stages", &self.sub_stages.len())
            .finish()
    }
}
