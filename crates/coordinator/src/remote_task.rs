//! HTTP handle of a task running on a worker.

use crate::error::Result;
use crate::stage::RemoteTask;
use igloo_common::{TaskInfo, TaskState};
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

pub struct HttpRemoteTask {
    task_id: String,
    task_uri: Url,
    task_info: RwLock<TaskInfo>,
    http: reqwest::Client,
    executor: Handle,
}

impl HttpRemoteTask {
    /// Fails if the task's location cannot be turned into a task resource.
    pub fn new(task_info: TaskInfo, http: reqwest::Client, executor: Handle) -> Result<Self> {
        let task_uri = task_info.task_uri()?;
        Ok(Self {
            task_id: task_info.task_id.clone(),
            task_uri,
            task_info: RwLock::new(task_info),
            http,
            executor,
        })
    }

    pub fn task_uri(&self) -> &Url {
        &self.task_uri
    }

    /// Replaces the snapshot with a fresher one from the worker. A snapshot
    /// in a terminal state is kept as is.
    pub fn update_task_info(&self, task_info: TaskInfo) {
        let mut current = self.task_info.write();
        if current.state.is_done() {
            return;
        }
        *current = task_info;
    }

    /// Cancels the task and returns the handle of the in-flight DELETE, or
    /// `None` if the task was already done.
    pub fn cancel_remote(&self) -> Option<JoinHandle<()>> {
        {
            let mut task_info = self.task_info.write();
            if task_info.state.is_done() {
                return None;
            }
            task_info.state = TaskState::Canceled;
        }

        let http = self.http.clone();
        let task_id = self.task_id.clone();
        let task_uri = self.task_uri.clone();
        Some(self.executor.spawn(async move {
            match http.delete(task_uri).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(task_id = %task_id, "Remote task canceled");
                }
                Ok(response) => {
                    warn!(
                        task_id = %task_id,
                        status = %response.status(),
                        "Worker rejected task cancel"
                    );
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Failed to cancel remote task");
                }
            }
        }))
    }
}

impl RemoteTask for HttpRemoteTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn task_info(&self) -> TaskInfo {
        self.task_info.read().clone()
    }

    fn cancel(&self) {
        let _ = self.cancel_remote();
    }
}
