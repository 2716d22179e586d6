//! Drains the single output buffer of one remote task.
//!
//! Buffer protocol, relative to the task resource:
//!
//! - `GET results/<buffer>/<token>` returns the pages from `token` on,
//!   together with the next token and whether the buffer is complete.
//!   `410 Gone` means the buffer no longer exists.
//! - `GET results/<buffer>/<token>/acknowledge` lets the worker drop every
//!   page before `token`.
//! - `DELETE results/<buffer>` releases the buffer.

use crate::config::ClientSettings;
use crate::error::{ClientError, Result};
use crate::source::PageSource;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use igloo_common::page::{decode_pages, HEADER_BUFFER_COMPLETE, HEADER_PAGE_NEXT_TOKEN};
use igloo_common::{Page, Schema};
use reqwest::{Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug)]
pub struct HttpTaskClient {
    task_id: String,
    task_uri: Url,
    buffer_id: String,
    schema: Schema,
    http: reqwest::Client,
    token: u64,
    finished: bool,
    /// Set once the buffer was released or found gone.
    released: bool,
    idle_poll_interval: Duration,
    retry_window: Option<Duration>,
}

impl HttpTaskClient {
    pub fn new(
        task_id: String,
        task_uri: Url,
        buffer_id: String,
        schema: Schema,
        http: reqwest::Client,
        settings: &ClientSettings,
    ) -> Self {
        Self {
            task_id,
            task_uri,
            buffer_id,
            schema,
            http,
            token: 0,
            finished: false,
            released: false,
            idle_poll_interval: settings.idle_poll_interval(),
            retry_window: settings.drain_retry_window(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_uri(&self) -> &Url {
        &self.task_uri
    }

    pub fn buffer_id(&self) -> &str {
        &self.buffer_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Token of the first page not yet received.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn buffer_uri(&self, trailing: &[&str]) -> Result<Url> {
        let mut uri = self.task_uri.clone();
        uri.path_segments_mut()
            .map_err(|_| igloo_common::Error::NotABaseLocation(self.task_uri.to_string()))?
            .pop_if_empty()
            .push("results")
            .push(&self.buffer_id)
            .extend(trailing);
        Ok(uri)
    }

    async fn send_get(&self, uri: &Url) -> reqwest::Result<Response> {
        let Some(window) = self.retry_window else {
            return self.http.get(uri.clone()).send().await;
        };

        // Token reads are idempotent, so transport failures may be retried.
        let policy = ExponentialBackoff {
            current_interval: Duration::from_millis(50),
            initial_interval: Duration::from_millis(50),
            max_elapsed_time: Some(window),
            ..ExponentialBackoff::default()
        };
        retry(policy, || {
            let http = self.http.clone();
            let uri = uri.clone();
            let task_id = self.task_id.clone();
            async move {
                http.get(uri).send().await.map_err(|e| {
                    debug!(task_id = %task_id, error = %e, "Buffer poll failed, retrying");
                    backoff::Error::transient(e)
                })
            }
        })
        .await
    }

    /// One poll of the buffer. Returns the received pages, possibly none.
    async fn poll(&mut self) -> Result<Vec<Page>> {
        let uri = self.buffer_uri(&[self.token.to_string().as_str()])?;
        let response = self.send_get(&uri).await?;

        let status = response.status();
        if status == StatusCode::GONE {
            debug!(task_id = %self.task_id, buffer_id = %self.buffer_id, "Output buffer is gone");
            self.finished = true;
            self.released = true;
            return Ok(Vec::new());
        }
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(ClientError::ProtocolViolation { uri, status });
        }

        let next_token: u64 = header(&response, HEADER_PAGE_NEXT_TOKEN, &uri)?
            .ok_or_else(|| ClientError::MalformedResponse {
                uri: uri.clone(),
                reason: format!("missing {} header", HEADER_PAGE_NEXT_TOKEN),
            })?;
        let complete: bool = header(&response, HEADER_BUFFER_COMPLETE, &uri)?.unwrap_or(false);
        if next_token < self.token {
            return Err(ClientError::MalformedResponse {
                uri,
                reason: format!("next token {} is behind token {}", next_token, self.token),
            });
        }

        let pages = decode_pages(response.bytes().await?)?;
        if !pages.is_empty() && next_token == self.token {
            return Err(ClientError::MalformedResponse {
                uri,
                reason: format!(
                    "{} pages returned without advancing token {}",
                    pages.len(),
                    self.token
                ),
            });
        }
        debug!(
            task_id = %self.task_id,
            token = self.token,
            next_token,
            pages = pages.len(),
            complete,
            "Received pages"
        );

        if next_token > self.token {
            self.token = next_token;
            self.acknowledge().await;
        }
        if complete {
            self.finished = true;
            self.release().await;
        }
        Ok(pages)
    }

    /// Failure only delays buffer cleanup on the worker: the next poll
    /// implies the acknowledgement.
    async fn acknowledge(&self) {
        let uri = match self.buffer_uri(&[self.token.to_string().as_str(), "acknowledge"]) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(task_id = %self.task_id, error = %e, "Cannot build acknowledge URI");
                return;
            }
        };
        match self.http.get(uri).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(task_id = %self.task_id, status = %response.status(), "Acknowledge rejected");
            }
            Err(e) => warn!(task_id = %self.task_id, error = %e, "Acknowledge failed"),
        }
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let uri = match self.buffer_uri(&[]) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(task_id = %self.task_id, error = %e, "Cannot build buffer URI");
                return;
            }
        };
        match self.http.delete(uri).send().await {
            Ok(response)
                if response.status().is_success() || response.status() == StatusCode::GONE =>
            {
                debug!(
                    task_id = %self.task_id,
                    buffer_id = %self.buffer_id,
                    "Released output buffer"
                );
            }
            Ok(response) => {
                warn!(
                    task_id = %self.task_id,
                    status = %response.status(),
                    "Buffer release rejected"
                );
            }
            Err(e) => warn!(task_id = %self.task_id, error = %e, "Buffer release failed"),
        }
    }
}

#[async_trait]
impl PageSource for HttpTaskClient {
    fn source_id(&self) -> &str {
        &self.task_id
    }

    async fn next_pages(&mut self) -> Result<Option<Vec<Page>>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            let pages = match self.poll().await {
                Ok(pages) => pages,
                Err(e) => {
                    self.finished = true;
                    return Err(ClientError::stream_failure(&self.task_id, e));
                }
            };
            if !pages.is_empty() {
                return Ok(Some(pages));
            }
            if !self.finished {
                sleep(self.idle_poll_interval).await;
            }
        }
    }

    /// Releases the buffer unless that already happened, including after a
    /// failed poll.
    async fn abort(&mut self) {
        self.finished = true;
        self.release().await;
    }
}

fn header<T: std::str::FromStr>(response: &Response, name: &str, uri: &Url) -> Result<Option<T>> {
    let Some(value) = response.headers().get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| ClientError::MalformedResponse {
            uri: uri.clone(),
            reason: format!("invalid {} header", name),
        })
}
