//! Price Aggregator Service
//!
//! Reads instrument price lines once and feeds them to independent
//! consumers:
//! - An error channel for lines that fail to parse
//! - A sink writing multiplier-enriched records to disk
//! - Mean / max / top-K aggregations fanned back in as snapshots
//!
//! Multipliers come from an external store behind a TTL cache.
//!
//! # Architecture
//!
//! ```text
//!      Line Source
//!          │
//!   ┌──────▼──────┐
//!   │ Multicaster │  ← one-shot start, one queue per consumer
//!   └──────┬──────┘
//!          │ parse
//!   ┌──────┴──────────────┐
//!   │                     │
//! ┌─▼──────┐        ┌─────▼────┐
//! │Invalid │        │ Records  │
//! └────────┘        └─────┬────┘
//!                         │ filter + enrich (TTL cache)
//!              ┌──────────┴──────────┐
//!              │                     │
//!          ┌───▼──┐      ┌───────────▼───────────┐
//!          │ Sink │      │ mean / max / top-K sum│
//!          └──────┘      └───────────┬───────────┘
//!                                    │
//!                           ┌────────▼───────┐
//!                           │ combine_latest │
//!                           └────────────────┘
//! ```

pub mod aggregation;
pub mod cache;
pub mod combine;
pub mod config;
pub mod driver;
pub mod enrichment;
pub mod error;
pub mod feed;
pub mod filters;
pub mod metrics;
pub mod multicast;
pub mod parser;
pub mod sink;
pub mod source;
pub mod store;
pub mod stream;
pub mod top_k;

pub use config::AggregatorConfig;
pub use driver::{RunReport, Snapshot, StreamDriver};
pub use error::PipelineError;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
