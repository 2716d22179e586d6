//! Client side of distributed query execution.
//!
//! [`HttpQueryClient`] submits a query to the coordinator and tracks it.
//! Once the output stage is scheduled it hands out a [`ResultsOperator`]
//! that merges the output buffers of every output task into one stream of
//! pages.
//!
//! # Example
//! ```no_run
//! use futures::StreamExt;
//! use igloo_client::{ClientSettings, HttpQueryClient};
//!
//! # async fn run() -> igloo_client::Result<()> {
//! let settings = ClientSettings::default();
//! let http = reqwest::Client::builder().timeout(settings.request_timeout()).build()?;
//! let executor = tokio::runtime::Handle::current();
//! let client = HttpQueryClient::submit("SELECT 1", http, executor, settings).await?;
//! let mut pages = client.await_results_operator().await?.pages();
//! while let Some(page) = pages.next().await {
//!     println!("{} rows", page?.position_count);
//! }
//! let _ = client.destroy().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fan_in;
pub mod operator;
pub mod query_client;
pub mod source;
pub mod task_client;

pub use config::ClientSettings;
pub use error::{ClientError, Result};
pub use fan_in::{FanInOperator, DEFAULT_FAN_IN_WIDTH};
pub use operator::{PageStream, ResultsOperator};
pub use query_client::HttpQueryClient;
pub use source::PageSource;
pub use task_client::HttpTaskClient;
