//! Status payloads exchanged between the coordinator, workers and clients.
//!
//! These are snapshots: the coordinator owns the authoritative state and
//! every poll returns a fresh copy.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Path segments of the canonical task resource on a worker.
pub const TASK_RESOURCE_PATH: [&str; 2] = ["v1", "task"];

/// Column type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Boolean,
    Int,
    Bigint,
    Double,
    Varchar,
    Varbinary,
}

/// Ordered column type descriptors of a result stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    columns: Vec<ColumnType>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnType>) -> Self {
        Self { columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[ColumnType] {
        &self.columns
    }

    /// One channel per column.
    pub fn channel_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl From<Vec<ColumnType>> for Schema {
    fn from(columns: Vec<ColumnType>) -> Self {
        Self::new(columns)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Finished,
    Failed,
    Canceled,
}

impl QueryState {
    pub fn is_done(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    Planned,
    Scheduling,
    Running,
    Finished,
    Canceled,
    Failed,
}

impl StageState {
    pub fn is_done(self) -> bool {
        matches!(self, Self::Finished | Self::Canceled | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Planned,
    Running,
    Finished,
    Canceled,
    Failed,
}

impl TaskState {
    pub fn is_done(self) -> bool {
        matches!(self, Self::Finished | Self::Canceled | Self::Failed)
    }
}

/// State of one named output buffer of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BufferState {
    Open,
    NoMorePages,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_id: String,
    pub state: TaskState,
    #[serde(rename = "self")]
    pub self_uri: Url,
    pub schema: Schema,
    #[serde(default)]
    pub output_buffer_states: BTreeMap<String, BufferState>,
}

impl TaskInfo {
    /// Canonical task resource: the worker origin of `self` followed by
    /// `/v1/task/<task id>`.
    pub fn task_uri(&self) -> Result<Url> {
        let mut uri = self.self_uri.clone();
        uri.set_query(None);
        uri.set_fragment(None);
        uri.path_segments_mut()
            .map_err(|_| Error::NotABaseLocation(self.self_uri.to_string()))?
            .clear()
            .extend(TASK_RESOURCE_PATH)
            .push(&self.task_id);
        Ok(uri)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInfo {
    pub query_id: String,
    pub stage_id: String,
    pub state: StageState,
    #[serde(rename = "self")]
    pub self_uri: Url,
    #[serde(default)]
    pub tasks: Vec<TaskInfo>,
    #[serde(default)]
    pub sub_stages: Vec<StageInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryInfo {
    pub query_id: String,
    pub state: QueryState,
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_uri: Option<Url>,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_stage: Option<StageInfo>,
}
