#![allow(dead_code)]

//! In-process coordinator and worker speaking the query and buffer protocols.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use igloo_client::ClientSettings;
use igloo_common::page::{
    encode_pages, HEADER_BUFFER_COMPLETE, HEADER_PAGE_NEXT_TOKEN, PAGES_CONTENT_TYPE,
};
use igloo_common::{
    BufferState, ColumnType, Page, QueryInfo, QueryState, Schema, StageInfo, StageState, TaskInfo,
    TaskState,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use url::Url;

pub const QUERY_ID: &str = "q1";

#[derive(Debug, Clone)]
pub enum LocationHeader {
    /// `http://<fake>/v1/query/q1`
    Default,
    Custom(String),
    Missing,
}

#[derive(Debug, Clone)]
pub struct SubmitScript {
    pub status: StatusCode,
    pub location: LocationHeader,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub enum StatusReply {
    Info(QueryInfo),
    Gone,
    Status(StatusCode),
}

#[derive(Debug, Clone)]
pub struct FakeTask {
    pub pages: Vec<Page>,
    pub pages_per_response: usize,
    /// Polls at or past this token answer 500.
    pub fail_at: Option<u64>,
    /// Never reports the buffer complete; polls past the end answer 204.
    pub stays_open: bool,
    /// Reports the requested token as the next one, even with pages.
    pub stalls_token: bool,
}

impl FakeTask {
    pub fn with_pages(count: u32) -> Self {
        Self {
            pages: (0..count).map(|i| Page::new(i + 1, vec![i as u8; 4])).collect(),
            pages_per_response: 1,
            fail_at: None,
            stays_open: false,
            stalls_token: false,
        }
    }

    pub fn failing_after(count: u32) -> Self {
        Self { fail_at: Some(u64::from(count)), stays_open: true, ..Self::with_pages(count) }
    }

    pub fn open(count: u32) -> Self {
        Self { stays_open: true, ..Self::with_pages(count) }
    }
}

pub struct ClusterState {
    addr: SocketAddr,
    submit: Mutex<SubmitScript>,
    submitted: Mutex<Vec<String>>,
    statuses: Mutex<VecDeque<StatusReply>>,
    status_polls: Mutex<usize>,
    delete_status: Mutex<StatusCode>,
    query_deletes: Mutex<Vec<String>>,
    tasks: Mutex<HashMap<String, FakeTask>>,
    acknowledged: Mutex<Vec<(String, String, u64)>>,
    released: Mutex<HashSet<(String, String)>>,
    buffer_polls: Mutex<Vec<(String, u64)>>,
}

pub struct FakeCluster {
    pub addr: SocketAddr,
    state: Arc<ClusterState>,
}

impl FakeCluster {
    pub async fn start() -> Self {
        Self::start_at(SocketAddr::from(([127, 0, 0, 1], 0)), Vec::new()).await
    }

    /// Binds `addr` with `tasks` already registered, so no poll can see the
    /// worker without them.
    pub async fn start_at(addr: SocketAddr, tasks: Vec<(&str, FakeTask)>) -> Self {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind fake cluster");
        let addr = listener.local_addr().expect("Failed to read fake cluster address");

        let state = Arc::new(ClusterState {
            addr,
            submit: Mutex::new(SubmitScript {
                status: StatusCode::CREATED,
                location: LocationHeader::Default,
                schema: Schema::new(vec![ColumnType::Int]),
            }),
            submitted: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            status_polls: Mutex::new(0),
            delete_status: Mutex::new(StatusCode::NO_CONTENT),
            query_deletes: Mutex::new(Vec::new()),
            tasks: Mutex::new(
                tasks.into_iter().map(|(id, task)| (id.to_string(), task)).collect(),
            ),
            acknowledged: Mutex::new(Vec::new()),
            released: Mutex::new(HashSet::new()),
            buffer_polls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/query", post(submit_query))
            .route("/v1/query/:query_id", get(query_status).delete(delete_query))
            .route("/v1/task/:task_id/results/:buffer_id", delete(release_buffer))
            .route("/v1/task/:task_id/results/:buffer_id/:token", get(get_pages))
            .route(
                "/v1/task/:task_id/results/:buffer_id/:token/acknowledge",
                get(acknowledge),
            )
            .with_state(state.clone());

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Fake cluster failed: {}", e);
            }
        });
        Self { addr, state }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    pub fn query_location(&self) -> String {
        format!("http://{}/v1/query/{}", self.addr, QUERY_ID)
    }

    /// Settings pointing at this cluster with short poll intervals.
    pub fn settings(&self) -> ClientSettings {
        ClientSettings {
            coordinator_url: self.url().to_string(),
            poll_interval_ms: 20,
            idle_poll_interval_ms: 10,
            request_timeout_secs: 5,
            ..ClientSettings::default()
        }
    }

    pub async fn script_submit(&self, script: SubmitScript) {
        *self.state.submit.lock().await = script;
    }

    pub async fn set_submit_location(&self, location: LocationHeader) {
        self.state.submit.lock().await.location = location;
    }

    /// Replies to successive status polls in order; the last one repeats.
    pub async fn script_statuses(&self, replies: Vec<StatusReply>) {
        *self.state.statuses.lock().await = replies.into();
    }

    pub async fn set_delete_status(&self, status: StatusCode) {
        *self.state.delete_status.lock().await = status;
    }

    pub async fn add_task(&self, task_id: &str, task: FakeTask) {
        self.state.tasks.lock().await.insert(task_id.to_string(), task);
    }

    pub async fn submitted(&self) -> Vec<String> {
        self.state.submitted.lock().await.clone()
    }

    pub async fn status_polls(&self) -> usize {
        *self.state.status_polls.lock().await
    }

    pub async fn query_deletes(&self) -> Vec<String> {
        self.state.query_deletes.lock().await.clone()
    }

    pub async fn acknowledged(&self) -> Vec<(String, String, u64)> {
        self.state.acknowledged.lock().await.clone()
    }

    pub async fn released(&self) -> Vec<(String, String)> {
        let mut released: Vec<_> = self.state.released.lock().await.iter().cloned().collect();
        released.sort();
        released
    }

    pub async fn buffer_polls(&self) -> Vec<(String, u64)> {
        self.state.buffer_polls.lock().await.clone()
    }

    /// Waits until `count` buffers were released, or gives up after a second.
    pub async fn wait_for_releases(&self, count: usize) -> Vec<(String, String)> {
        for _ in 0..100 {
            if self.state.released.lock().await.len() >= count {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        self.released().await
    }

    pub fn task_info(&self, task_id: &str, buffers: &[&str]) -> TaskInfo {
        TaskInfo {
            task_id: task_id.to_string(),
            state: TaskState::Running,
            self_uri: Url::parse(&format!("http://{}/v1/task/{}", self.addr, task_id)).unwrap(),
            schema: Schema::new(vec![ColumnType::Int]),
            output_buffer_states: buffers
                .iter()
                .map(|b| (b.to_string(), BufferState::Open))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    pub fn query_info(&self, state: QueryState, tasks: Option<Vec<TaskInfo>>) -> QueryInfo {
        QueryInfo {
            query_id: QUERY_ID.to_string(),
            state,
            self_uri: Some(Url::parse(&self.query_location()).unwrap()),
            schema: Schema::new(vec![ColumnType::Int]),
            output_stage: tasks.map(|tasks| StageInfo {
                query_id: QUERY_ID.to_string(),
                stage_id: format!("{}.0", QUERY_ID),
                state: StageState::Running,
                self_uri: Url::parse(&format!("http://{}/v1/stage/{}.0", self.addr, QUERY_ID))
                    .unwrap(),
                tasks,
                sub_stages: Vec::new(),
            }),
        }
    }
}

/// Address nothing listens on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

async fn submit_query(State(state): State<Arc<ClusterState>>, body: String) -> Response {
    state.submitted.lock().await.push(body);
    let script = state.submit.lock().await.clone();
    if script.status != StatusCode::CREATED {
        return (script.status, "query rejected: syntax error").into_response();
    }

    let location = match script.location {
        LocationHeader::Default => Some(format!("http://{}/v1/query/{}", state.addr, QUERY_ID)),
        LocationHeader::Custom(location) => Some(location),
        LocationHeader::Missing => None,
    };
    let info = QueryInfo {
        query_id: QUERY_ID.to_string(),
        state: QueryState::Queued,
        self_uri: None,
        schema: script.schema,
        output_stage: None,
    };
    let mut response = (StatusCode::CREATED, Json(info)).into_response();
    if let Some(location) = location {
        response
            .headers_mut()
            .insert(LOCATION, HeaderValue::from_str(&location).unwrap());
    }
    response
}

async fn query_status(
    State(state): State<Arc<ClusterState>>,
    Path(_query_id): Path<String>,
) -> Response {
    *state.status_polls.lock().await += 1;
    let reply = {
        let mut statuses = state.statuses.lock().await;
        if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        }
    };
    match reply {
        Some(StatusReply::Info(info)) => Json(info).into_response(),
        Some(StatusReply::Status(status)) => status.into_response(),
        Some(StatusReply::Gone) | None => StatusCode::GONE.into_response(),
    }
}

async fn delete_query(
    State(state): State<Arc<ClusterState>>,
    Path(query_id): Path<String>,
) -> StatusCode {
    state.query_deletes.lock().await.push(query_id);
    *state.delete_status.lock().await
}

async fn get_pages(
    State(state): State<Arc<ClusterState>>,
    Path((task_id, buffer_id, token)): Path<(String, String, u64)>,
) -> Response {
    state.buffer_polls.lock().await.push((task_id.clone(), token));
    if state.released.lock().await.contains(&(task_id.clone(), buffer_id)) {
        return StatusCode::GONE.into_response();
    }
    let Some(task) = state.tasks.lock().await.get(&task_id).cloned() else {
        return StatusCode::GONE.into_response();
    };
    if task.fail_at.is_some_and(|fail_at| token >= fail_at) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "task failed").into_response();
    }

    let start = (token as usize).min(task.pages.len());
    let end = (start + task.pages_per_response.max(1)).min(task.pages.len());
    let pages = task.pages[start..end].to_vec();
    let complete = end == task.pages.len() && !task.stays_open;
    let next_token = if task.stalls_token { start } else { end };
    let status = if pages.is_empty() { StatusCode::NO_CONTENT } else { StatusCode::OK };

    (
        status,
        [
            (HEADER_PAGE_NEXT_TOKEN, next_token.to_string()),
            (HEADER_BUFFER_COMPLETE, complete.to_string()),
            ("content-type", PAGES_CONTENT_TYPE.to_string()),
        ],
        Bytes::from(encode_pages(pages)),
    )
        .into_response()
}

async fn acknowledge(
    State(state): State<Arc<ClusterState>>,
    Path((task_id, buffer_id, token)): Path<(String, String, u64)>,
) -> StatusCode {
    state.acknowledged.lock().await.push((task_id, buffer_id, token));
    StatusCode::NO_CONTENT
}

async fn release_buffer(
    State(state): State<Arc<ClusterState>>,
    Path((task_id, buffer_id)): Path<(String, String)>,
) -> StatusCode {
    state.released.lock().await.insert((task_id, buffer_id));
    StatusCode::NO_CONTENT
}
