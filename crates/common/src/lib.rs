//! Common crate
//!
//! Status payloads, schema descriptors, page batches and error handling
//! shared by the Igloo coordinator and its clients.
//!
//! # Example
//! ```rust
//! use igloo_common::{ColumnType, Schema};
//! let schema = Schema::new(vec![ColumnType::Int, ColumnType::Varchar]);
//! assert_eq!(schema.channel_count(), 2);
//! ```

pub mod error;
pub mod page;
pub mod types;

pub use error::{Error, Result};
pub use page::{Page, PageBatch};
pub use types::{
    BufferState, ColumnType, QueryInfo, QueryState, Schema, StageInfo, StageState, TaskInfo,
    TaskState,
};
