use crate::error::Result;
use async_trait::async_trait;
use igloo_common::Page;

/// A remote stream of pages that the fan-in operator drains.
#[async_trait]
pub trait PageSource: Send + 'static {
    /// Identifier used in logs and errors, usually the task id.
    fn source_id(&self) -> &str;

    /// Next pages in emitted order. `Ok(None)` means the source is exhausted;
    /// a returned batch is never empty. After `Ok(None)` or an error the
    /// source stays exhausted.
    async fn next_pages(&mut self) -> Result<Option<Vec<Page>>>;

    /// Best-effort release of the remote side when the source will not be
    /// drained to the end.
    async fn abort(&mut self);
}
