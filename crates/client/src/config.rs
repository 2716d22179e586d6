use crate::error::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    /// Base URL of the coordinator; queries are posted to `<url>/v1/query`.
    #[serde(default = "default_coordinator_url")]
    pub coordinator_url: String,
    /// Maximum number of task buffers drained at the same time.
    #[serde(default = "default_fan_in_width")]
    pub fan_in_width: usize,
    /// Pages held between the drain tasks and the consumer.
    #[serde(default = "default_page_buffer_size")]
    pub page_buffer_size: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_idle_poll_interval_ms")]
    pub idle_poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 0 disables retries: any failed buffer poll fails its stream.
    #[serde(default)]
    pub drain_retry_window_ms: u64,
}

fn default_coordinator_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_fan_in_width() -> usize {
    10
}

fn default_page_buffer_size() -> usize {
    16
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_idle_poll_interval_ms() -> u64 {
    50
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            coordinator_url: default_coordinator_url(),
            fan_in_width: default_fan_in_width(),
            page_buffer_size: default_page_buffer_size(),
            poll_interval_ms: default_poll_interval_ms(),
            idle_poll_interval_ms: default_idle_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            drain_retry_window_ms: 0,
        }
    }
}

impl ClientSettings {
    /// Loads settings from `config_path` (required when given), otherwise from
    /// `IGLOO_CLIENT_CONFIG_PATH` or the bundled default file if present.
    /// `IGLOO_CLIENT__*` environment variables override file values.
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        let config_file_path = config_path
            .map(str::to_string)
            .or_else(|| std::env::var("IGLOO_CLIENT_CONFIG_PATH").ok())
            .unwrap_or_else(|| "crates/client/config/default.toml".to_string());

        let s = config::Config::builder()
            .add_source(
                config::File::with_name(&config_file_path).required(config_path.is_some()),
            )
            .add_source(config::Environment::with_prefix("IGLOO_CLIENT").separator("__"))
            .build()?;
        Ok(s.try_deserialize()?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn drain_retry_window(&self) -> Option<Duration> {
        (self.drain_retry_window_ms > 0).then(|| Duration::from_millis(self.drain_retry_window_ms))
    }
}
