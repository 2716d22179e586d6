//! Registry of the stages the coordinator has scheduled.

use crate::error::{CoordinatorError, Result};
use crate::stage::{RemoteTask, StageExecution};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use igloo_common::StageInfo;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Stage registry shared by plan scheduling and the cancellation paths.
pub trait StageManager: Send + Sync {
    /// Snapshots of every registered stage, ordered by stage id.
    fn get_all_stages(&self) -> Vec<StageInfo>;

    fn get_stage(&self, stage_id: &str) -> Result<StageInfo>;

    /// Registers a stage. Stage ids are never reused, so registering an id
    /// twice fails even if the first stage has finished.
    fn create_stage(
        &self,
        query_id: &str,
        stage_id: &str,
        location: Url,
        tasks: Vec<Arc<dyn RemoteTask>>,
        sub_stages: Vec<Arc<StageExecution>>,
    ) -> Result<Arc<StageExecution>>;

    /// Cancels the stage tree rooted at `stage_id`. Canceling a stage that is
    /// already terminal is a no-op.
    fn cancel_stage(&self, stage_id: &str) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryStageManager {
    stages: DashMap<String, Arc<StageExecution>>,
}

impl InMemoryStageManager {
    pub fn new() -> Self {
        Self::default()
    }

    // Clone the handle out so no shard lock is held while tasks are touched.
    fn stage(&self, stage_id: &str) -> Result<Arc<StageExecution>> {
        self.stages
            .get(stage_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CoordinatorError::StageNotFound(stage_id.to_string()))
    }
}

impl StageManager for InMemoryStageManager {
    fn get_all_stages(&self) -> Vec<StageInfo> {
        let stages: Vec<Arc<StageExecution>> =
            self.stages.iter().map(|entry| Arc::clone(entry.value())).collect();
        let mut infos: Vec<StageInfo> = stages.iter().map(|stage| stage.stage_info()).collect();
        infos.sort_by(|a, b| a.stage_id.cmp(&b.stage_id));
        infos
    }

    fn get_stage(&self, stage_id: &str) -> Result<StageInfo> {
        Ok(self.stage(stage_id)?.stage_info())
    }

    fn create_stage(
        &self,
        query_id: &str,
        stage_id: &str,
        location: Url,
        tasks: Vec<Arc<dyn RemoteTask>>,
        sub_stages: Vec<Arc<StageExecution>>,
    ) -> Result<Arc<StageExecution>> {
        match self.stages.entry(stage_id.to_string()) {
            Entry::Occupied(_) => Err(CoordinatorError::StageAlreadyExists(stage_id.to_string())),
            Entry::Vacant(entry) => {
                let stage = Arc::new(StageExecution::new(
                    query_id.to_string(),
                    stage_id.to_string(),
                    location,
                    tasks,
                    sub_stages,
                ));
                entry.insert(Arc::clone(&stage));
                info!(
                    query_id,
                    stage_id,
                    tasks = stage.tasks().len(),
                    sub_stages = stage.sub_stages().len(),
                    "Registered stage"
                );
                Ok(stage)
            }
        }
    }

    fn cancel_stage(&self, stage_id: &str) -> Result<()> {
        let stage = self.stage(stage_id)?;
        stage.cancel();
        Ok(())
    }
}
