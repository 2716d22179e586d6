//! Coordinator-side handle of one submitted query.

use crate::config::ClientSettings;
use crate::error::{ClientError, Result};
use crate::fan_in::FanInOperator;
use crate::operator::ResultsOperator;
use crate::task_client::HttpTaskClient;
use igloo_common::{QueryInfo, QueryState, Schema, StageInfo, TaskInfo};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use tokio::runtime::Handle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

const QUERY_RESOURCE_PATH: [&str; 2] = ["v1", "query"];

#[derive(Debug, Clone)]
pub struct HttpQueryClient {
    http: reqwest::Client,
    executor: Handle,
    settings: ClientSettings,
    /// Location as announced by the coordinator.
    query_location: String,
    /// Resolved form of `query_location` used for requests.
    query_uri: Url,
    schema: Schema,
}

impl HttpQueryClient {
    /// Submits `query` to the coordinator. Submission is not idempotent and
    /// is never retried.
    pub async fn submit(
        query: &str,
        http: reqwest::Client,
        executor: Handle,
        settings: ClientSettings,
    ) -> Result<Self> {
        let mut submit_uri = Url::parse(&settings.coordinator_url)?;
        submit_uri
            .path_segments_mut()
            .map_err(|_| igloo_common::Error::NotABaseLocation(settings.coordinator_url.clone()))?
            .pop_if_empty()
            .extend(QUERY_RESOURCE_PATH);

        debug!(uri = %submit_uri, "Submitting query");
        let response = http
            .post(submit_uri.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(query.to_string())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::SubmissionRejected { status, message });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .ok_or(ClientError::MissingLocation)?
            .to_str()
            .map_err(|_| ClientError::MalformedResponse {
                uri: submit_uri.clone(),
                reason: "Location header is not valid ASCII".to_string(),
            })?;
        // An absolute header is recorded verbatim; `Url` normalizes on parse.
        let (query_location, query_uri) = match Url::parse(location) {
            Ok(uri) => (location.to_string(), uri),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let uri = submit_uri.join(location)?;
                (uri.to_string(), uri)
            }
            Err(e) => return Err(e.into()),
        };

        let info: QueryInfo = serde_json::from_slice(&response.bytes().await?)?;
        info!(
            query_id = %info.query_id,
            location = %query_location,
            columns = info.schema.channel_count(),
            "Query submitted"
        );

        Ok(Self { http, executor, settings, query_location, query_uri, schema: info.schema })
    }

    pub fn query_location(&self) -> &str {
        &self.query_location
    }

    /// Schema negotiated at submission.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Current status of the query, or `None` once the coordinator no longer
    /// tracks it.
    pub async fn query_info(&self) -> Result<Option<QueryInfo>> {
        let response = self.http.get(self.query_uri.clone()).send().await?;
        match response.status() {
            StatusCode::GONE => {
                debug!(location = %self.query_location, "Query is no longer tracked");
                Ok(None)
            }
            StatusCode::OK => Ok(Some(serde_json::from_slice(&response.bytes().await?)?)),
            status => Err(ClientError::ProtocolViolation { uri: self.query_uri.clone(), status }),
        }
    }

    /// Builds the operator for the output stage as currently reported.
    /// Before the output stage exists this is the empty operator.
    pub async fn results_operator(&self) -> Result<ResultsOperator> {
        let info = self.query_info().await?;
        match info.and_then(|info| info.output_stage) {
            Some(stage) => self.fan_in(&stage).map(ResultsOperator::FanIn),
            None => Ok(ResultsOperator::empty(self.schema.clone())),
        }
    }

    /// Polls until the output stage is scheduled or the query can no longer
    /// produce one.
    pub async fn await_results_operator(&self) -> Result<ResultsOperator> {
        loop {
            let Some(info) = self.query_info().await? else {
                return Ok(ResultsOperator::empty(self.schema.clone()));
            };
            if matches!(info.state, QueryState::Failed | QueryState::Canceled) {
                return Err(ClientError::QueryFailed { query_id: info.query_id, state: info.state });
            }
            match info.output_stage {
                Some(stage) if !stage.tasks.is_empty() || info.state == QueryState::Finished => {
                    return self.fan_in(&stage).map(ResultsOperator::FanIn);
                }
                None if info.state == QueryState::Finished => {
                    return Ok(ResultsOperator::empty(self.schema.clone()));
                }
                _ => {
                    debug!(
                        query_id = %info.query_id,
                        state = ?info.state,
                        "Output stage not scheduled yet"
                    );
                    sleep(self.settings.poll_interval()).await;
                }
            }
        }
    }

    /// Best-effort removal of the query from the coordinator. The result may
    /// be ignored.
    pub async fn destroy(&self) -> Result<()> {
        let result = match self.http.delete(self.query_uri.clone()).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(ClientError::ProtocolViolation {
                uri: self.query_uri.clone(),
                status: response.status(),
            }),
            Err(e) => Err(e.into()),
        };
        match &result {
            Ok(()) => debug!(location = %self.query_location, "Query destroyed"),
            Err(e) => warn!(location = %self.query_location, error = %e, "Failed to destroy query"),
        }
        result
    }

    fn fan_in(&self, stage: &StageInfo) -> Result<FanInOperator> {
        let sources = stage
            .tasks
            .iter()
            .map(|task| self.task_client(task))
            .collect::<Result<Vec<_>>>()?;
        let schema = stage
            .tasks
            .first()
            .map(|task| task.schema.clone())
            .unwrap_or_else(|| self.schema.clone());

        debug!(stage_id = %stage.stage_id, tasks = sources.len(), "Building fan-in operator");
        Ok(FanInOperator::new(
            schema,
            sources,
            self.settings.fan_in_width,
            self.settings.page_buffer_size,
            self.executor.clone(),
        ))
    }

    fn task_client(&self, task: &TaskInfo) -> Result<HttpTaskClient> {
        let mut buffers = task.output_buffer_states.keys();
        let buffer_id = match (buffers.next(), buffers.next()) {
            (Some(buffer_id), None) => buffer_id.clone(),
            _ => {
                return Err(ClientError::BufferCardinality {
                    task_id: task.task_id.clone(),
                    buffers: task.output_buffer_states.keys().cloned().collect(),
                })
            }
        };
        Ok(HttpTaskClient::new(
            task.task_id.clone(),
            task.task_uri()?,
            buffer_id,
            task.schema.clone(),
            self.http.clone(),
            &self.settings,
        ))
    }
}
