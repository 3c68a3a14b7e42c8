//! Parsed price feed over a multicast line source
//!
//! Every accessor registers a fresh multicaster consumer, so each branch
//! of the pipeline walks the whole feed on its own. All branches must be
//! attached before `start()`.

use futures::future;
use futures::stream::{StreamExt, TryStreamExt};
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::multicast::{LineMulticaster, MulticastError, MulticastSummary};
use crate::parser::{parse_line, InvalidLine, ParseOutcome};
use crate::source::{LineSource, SourceError};
use crate::stream::{RecordStream, ValueStream};

pub struct PriceFeed {
    lines: LineMulticaster,
}

impl PriceFeed {
    pub fn new(source: impl LineSource + 'static) -> Self {
        Self {
            lines: LineMulticaster::new(source),
        }
    }

    /// Every line as a parse outcome, in source order.
    pub fn parsed(&self) -> Result<ValueStream<ParseOutcome>, MulticastError> {
        let subscription = self.lines.subscribe()?;
        Ok(subscription
            .into_stream()
            .map(|event| {
                event
                    .map(|line| parse_line(Some(&*line)))
                    .map_err(PipelineError::from)
            })
            .boxed())
    }

    /// Lines that failed to parse, with the reason.
    pub fn failed_to_parse(&self) -> Result<ValueStream<InvalidLine>, MulticastError> {
        Ok(self
            .parsed()?
            .try_filter_map(|outcome| future::ready(Ok(outcome.into_invalid())))
            .boxed())
    }

    /// Successfully parsed records.
    pub fn prices(&self) -> Result<RecordStream, MulticastError> {
        Ok(self
            .parsed()?
            .try_filter_map(|outcome| future::ready(Ok(outcome.into_valid())))
            .boxed())
    }

    /// Hand a fresh record stream to `attachment` and return what it builds.
    pub fn attach<R, F>(&self, attachment: F) -> Result<R, MulticastError>
    where
        F: FnOnce(RecordStream) -> R,
    {
        Ok(attachment(self.prices()?))
    }

    /// Start reading the source. Everything attached so far receives it.
    pub fn start(&self) -> Result<JoinHandle<Result<MulticastSummary, SourceError>>, MulticastError> {
        self.lines.start()
    }

    pub fn lines_delivered(&self) -> u64 {
        self.lines.lines_delivered()
    }
}
