use igloo_common::QueryState;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Query submission rejected with status {status}: {message}")]
    SubmissionRejected { status: StatusCode, message: String },

    #[error("Coordinator accepted the query without a Location header")]
    MissingLocation,

    #[error("Invalid location: {0}")]
    InvalidLocation(#[from] url::ParseError),

    #[error("Unexpected status {status} from {uri}")]
    ProtocolViolation { uri: Url, status: StatusCode },

    #[error("Malformed response from {uri}: {reason}")]
    MalformedResponse { uri: Url, reason: String },

    #[error("Expected a single output buffer for task {task_id}, but found {buffers:?}")]
    BufferCardinality { task_id: String, buffers: Vec<String> },

    #[error("Result stream of task {task_id} failed: {source}")]
    StreamFailure {
        task_id: String,
        #[source]
        source: Box<ClientError>,
    },

    #[error("Query {query_id} is {state:?} and will not produce results")]
    QueryFailed { query_id: String, state: QueryState },

    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid status payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] igloo_common::Error),

    #[error("An internal error occurred: {0}")]
    Internal(String),
}

impl ClientError {
    pub fn stream_failure(task_id: &str, source: ClientError) -> Self {
        ClientError::StreamFailure { task_id: task_id.to_string(), source: Box::new(source) }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
