use crate::error::Result;
use crate::fan_in::FanInOperator;
use futures::{stream, Stream};
use igloo_common::{Page, Schema};
use std::pin::Pin;

pub type PageStream = Pin<Box<dyn Stream<Item = Result<Page>> + Send>>;

/// Operator the consumer pulls query results from.
#[derive(Debug)]
pub enum ResultsOperator {
    /// Produces no pages. Used when the query is no longer tracked or
    /// finished without an output stage.
    Empty { schema: Schema },
    FanIn(FanInOperator),
}

impl ResultsOperator {
    pub fn empty(schema: Schema) -> Self {
        ResultsOperator::Empty { schema }
    }

    /// Number of channels in each page. Always 0 for the empty operator.
    pub fn channel_count(&self) -> usize {
        match self {
            ResultsOperator::Empty { .. } => 0,
            ResultsOperator::FanIn(fan_in) => fan_in.channel_count(),
        }
    }

    pub fn schema(&self) -> &Schema {
        match self {
            ResultsOperator::Empty { schema } => schema,
            ResultsOperator::FanIn(fan_in) => fan_in.schema(),
        }
    }

    pub fn is_fan_in(&self) -> bool {
        matches!(self, ResultsOperator::FanIn(_))
    }

    pub fn pages(self) -> PageStream {
        match self {
            ResultsOperator::Empty { .. } => Box::pin(stream::empty()),
            ResultsOperator::FanIn(fan_in) => fan_in.pages(),
        }
    }
}
