//! Top-level pipeline error
//!
//! Carried in-band by every stream item so a failure upstream reaches
//! whichever consumer folds the stream.

use std::sync::Arc;

use thiserror::Error;

use crate::aggregation::AggregationError;
use crate::multicast::MulticastError;
use crate::sink::SinkError;
use crate::source::SourceError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Multiplier lookup for {instrument} failed: {source}")]
    Lookup {
        instrument: String,
        #[source]
        source: StoreError,
    },

    #[error("Enriched price for {instrument} overflows the decimal range")]
    EnrichmentOverflow { instrument: String },

    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Multicast error: {0}")]
    Multicast(#[from] MulticastError),

    #[error("Pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// One upstream failure delivered to several consumers.
    #[error("{0}")]
    Shared(Arc<PipelineError>),
}

impl PipelineError {
    /// Short label for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Source(_) => "source",
            PipelineError::Lookup { .. } => "lookup",
            PipelineError::EnrichmentOverflow { .. } => "enrichment_overflow",
            PipelineError::Aggregation(_) => "aggregation",
            PipelineError::Sink(_) => "sink",
            PipelineError::Multicast(_) => "multicast",
            PipelineError::Task(_) => "task",
            PipelineError::Shared(inner) => inner.kind(),
        }
    }
}
