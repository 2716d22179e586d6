//! Merges the page streams of many sources into one stream.
//!
//! A driver task keeps at most `width` sources draining at once, each on its
//! own tokio task, all feeding one bounded channel. Pages reach the consumer
//! as soon as any source produces them, so there is no order across sources.
//! The first failure stops every other source and becomes the last item of
//! the merged stream. Dropping the stream stops every source as well.

use crate::error::{ClientError, Result};
use crate::operator::PageStream;
use crate::source::PageSource;
use crate::task_client::HttpTaskClient;
use futures::Stream;
use igloo_common::{Page, Schema};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

pub const DEFAULT_FAN_IN_WIDTH: usize = 10;

#[derive(Debug)]
pub struct FanInOperator<S = HttpTaskClient> {
    schema: Schema,
    sources: Vec<S>,
    width: usize,
    page_buffer_size: usize,
    executor: Handle,
}

impl<S: PageSource> FanInOperator<S> {
    pub fn new(
        schema: Schema,
        sources: Vec<S>,
        width: usize,
        page_buffer_size: usize,
        executor: Handle,
    ) -> Self {
        Self {
            schema,
            sources,
            width: width.max(1),
            page_buffer_size: page_buffer_size.max(1),
            executor,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.schema.channel_count()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn sources(&self) -> &[S] {
        &self.sources
    }

    /// Starts draining. Nothing touches the sources before this call.
    pub fn pages(self) -> PageStream {
        let (tx, rx) = mpsc::channel(self.page_buffer_size);
        debug!(sources = self.sources.len(), width = self.width, "Starting fan-in");
        self.executor
            .spawn(drive(self.sources, self.width, tx, self.executor.clone()));
        Box::pin(FanInStream { pages: ReceiverStream::new(rx), failed: false })
    }
}

async fn drive<S: PageSource>(
    sources: Vec<S>,
    width: usize,
    pages: mpsc::Sender<Result<Page>>,
    executor: Handle,
) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut pending = sources.into_iter();
    let mut running = JoinSet::new();
    for source in pending.by_ref().take(width) {
        running.spawn_on(drain(source, pages.clone(), stop_rx.clone()), &executor);
    }

    let mut failure: Option<ClientError> = None;
    while let Some(joined) = running.join_next().await {
        let outcome = joined.unwrap_or_else(|e| {
            Err(ClientError::Internal(format!("page source task failed: {}", e)))
        });
        match outcome {
            Ok(()) => {
                if failure.is_none() && !pages.is_closed() {
                    if let Some(source) = pending.next() {
                        running.spawn_on(drain(source, pages.clone(), stop_rx.clone()), &executor);
                    }
                }
            }
            Err(e) if failure.is_none() => {
                warn!(error = %e, "Result stream failed, stopping remaining sources");
                let _ = stop_tx.send(true);
                failure = Some(e);
            }
            Err(e) => debug!(error = %e, "Ignoring failure after the first one"),
        }
    }

    // Whatever never started still holds a buffer on its worker.
    let leftovers: Vec<S> = pending.collect();
    if !leftovers.is_empty() {
        debug!(sources = leftovers.len(), "Aborting sources that were never started");
        futures::future::join_all(leftovers.into_iter().map(|mut source| async move {
            source.abort().await;
        }))
        .await;
    }

    if let Some(e) = failure {
        let _ = pages.send(Err(e)).await;
    }
}

/// Drains one source into the shared channel until it is exhausted, fails,
/// the consumer goes away or the driver raises the stop signal.
async fn drain<S: PageSource>(
    mut source: S,
    pages: mpsc::Sender<Result<Page>>,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let next = tokio::select! {
            _ = stopped(&mut stop) => {
                source.abort().await;
                return Ok(());
            }
            _ = pages.closed() => {
                debug!(source = source.source_id(), "Consumer went away");
                source.abort().await;
                return Ok(());
            }
            next = source.next_pages() => next,
        };

        let batch = match next {
            Ok(Some(batch)) => batch,
            Ok(None) => return Ok(()),
            Err(e) => {
                source.abort().await;
                return Err(e);
            }
        };

        for page in batch {
            tokio::select! {
                _ = stopped(&mut stop) => {
                    source.abort().await;
                    return Ok(());
                }
                sent = pages.send(Ok(page)) => {
                    if sent.is_err() {
                        source.abort().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop.
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Ends right after the first error.
struct FanInStream {
    pages: ReceiverStream<Result<Page>>,
    failed: bool,
}

impl Stream for FanInStream {
    type Item = Result<Page>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.failed {
            return Poll::Ready(None);
        }
        let next = ready!(Pin::new(&mut self.pages).poll_next(cx));
        if matches!(next, Some(Err(_))) {
            self.failed = true;
        }
        Poll::Ready(next)
    }
}
