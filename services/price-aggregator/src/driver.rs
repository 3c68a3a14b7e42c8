//! Standard aggregation run
//!
//! Wires one feed into a parse-failure branch and a single enriched stream,
//! then fans the enriched stream out before starting the feed:
//!
//! ```text
//!            ┌─► failed lines ─► warn! + count
//!            │
//! source ─► feed ─► valid_as_of ─► enrich ─┬─► sink
//!                                          ├─► mean(instrument 1)            ─┐
//!                                          ├─► mean(instrument 2, month)     ─┤
//!                                          ├─► max(instrument 3)             ─┼─► combine_latest ─► snapshots
//!                                          └─► sum(newest K of the others)   ─┘
//! ```
//!
//! Each record is enriched exactly once, so the file and the snapshots see
//! the same multiplier even when the cache is invalidated mid-run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::stream::{StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::io::AsyncWrite;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::aggregation;
use crate::combine::combine_latest;
use crate::config::AggregatorConfig;
use crate::enrichment::{enrich, MultiplierProvider};
use crate::error::PipelineError;
use crate::feed::PriceFeed;
use crate::filters;
use crate::metrics::PipelineMetrics;
use crate::multicast::MulticastError;
use crate::parser::InvalidLine;
use crate::sink::RecordSink;
use crate::source::{LineSource, ReaderLineSource};
use crate::store::MultiplierStore;
use crate::stream::{filter_records, tee, RecordStream, ValueStream};
use crate::top_k::{by_date, most_relevant};

/// One labelled aggregation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotValue {
    pub label: String,
    pub value: Option<Decimal>,
}

/// The latest value of every aggregation at one point of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub values: Vec<SnapshotValue>,
}

impl Snapshot {
    fn new(labels: &[String], values: Vec<Option<Decimal>>) -> Self {
        Self {
            values: labels
                .iter()
                .cloned()
                .zip(values)
                .map(|(label, value)| SnapshotValue { label, value })
                .collect(),
        }
    }

    /// Value of the aggregation labelled `label`.
    pub fn get(&self, label: &str) -> Option<Option<Decimal>> {
        self.values.iter().find(|v| v.label == label).map(|v| v.value)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, entry) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match entry.value {
                Some(value) => write!(f, "{}={}", entry.label, value)?,
                None => write!(f, "{}=none", entry.label)?,
            }
        }
        write!(f, "]")
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub snapshots: Vec<Snapshot>,
    pub lines_delivered: u64,
    pub parse_failures: u64,
    pub records_written: u64,
    /// Branches that failed, by name.
    pub failures: BTreeMap<&'static str, String>,
    pub metrics: BTreeMap<String, u64>,
}

pub struct StreamDriver {
    config: AggregatorConfig,
    provider: Arc<MultiplierProvider>,
    metrics: Arc<PipelineMetrics>,
}

impl StreamDriver {
    pub fn new(config: AggregatorConfig, store: Arc<dyn MultiplierStore>) -> Self {
        let provider = MultiplierProvider::with_ttl(store, config.cache_ttl());
        Self {
            config,
            provider: Arc::new(provider),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Shared multiplier provider, for cache invalidation while running.
    pub fn provider(&self) -> Arc<MultiplierProvider> {
        Arc::clone(&self.provider)
    }

    /// Labels of the snapshot values, in snapshot order.
    pub fn labels(&self) -> Vec<String> {
        let [first, second, third] = &self.config.instruments;
        let month = self.config.mean_month;
        vec![
            format!("mean({first})"),
            format!("mean({second} in {:04}-{:02})", month.year, month.month),
            format!("max({third})"),
            format!("sum(newest {} others)", self.config.top_k),
        ]
    }

    /// Run over the configured input file, writing to the configured output.
    pub async fn run_from_config(&self) -> Result<RunReport, PipelineError> {
        let source = ReaderLineSource::open(&self.config.input_path).await?;
        self.run(source).await
    }

    /// Run over `source`, writing enriched records to the configured output.
    pub async fn run(&self, source: impl LineSource + 'static) -> Result<RunReport, PipelineError> {
        let sink = RecordSink::create(&self.config.output_path).await?;
        self.run_with_sink(source, sink).await
    }

    pub async fn run_with_sink<W>(
        &self,
        source: impl LineSource + 'static,
        sink: RecordSink<W>,
    ) -> Result<RunReport, PipelineError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let run_id = Uuid::now_v7();
        let span = tracing::info_span!("run", %run_id);
        self.run_inner(run_id, PriceFeed::new(source), sink)
            .instrument(span)
            .await
    }

    async fn run_inner<W>(
        &self,
        run_id: Uuid,
        feed: PriceFeed,
        sink: RecordSink<W>,
    ) -> Result<RunReport, PipelineError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let errors = tokio::spawn(
            report_parse_failures(feed.failed_to_parse()?, Arc::clone(&self.metrics)).in_current_span(),
        );

        let enriched = {
            let metrics = Arc::clone(&self.metrics);
            let counted_metrics = Arc::clone(&self.metrics);
            self.enriched(&feed)?
                .inspect_ok(move |_| counted_metrics.record_enriched())
                .inspect_err(move |err| {
                    if matches!(err, PipelineError::Lookup { .. }) {
                        metrics.record_lookup_failure();
                    }
                })
                .boxed()
        };
        let ([to_sink, first, second, third, others], fan_out) = tee::<_, 5>(enriched);

        let written = tokio::spawn(sink.drain(to_sink).in_current_span());
        let labels = self.labels();
        let snapshots = tokio::spawn(
            collect_snapshots(
                self.aggregations([first, second, third, others])?,
                labels,
                Arc::clone(&self.metrics),
            )
            .in_current_span(),
        );
        let fan_out = tokio::spawn(fan_out.in_current_span());

        let pump = feed.start()?;
        let summary = pump.await?;
        let fanned_out = fan_out.await?;
        let written = written.await?;
        let snapshots = snapshots.await?;
        let parse_failures = errors.await?;

        let summary = summary.map_err(|err| {
            error!(error = %err, "Source failed, run aborted");
            PipelineError::from(err)
        })?;
        self.metrics.set_lines_delivered(summary.lines);

        let mut failures = BTreeMap::new();
        let records_written = branch_result("sink", written, &mut failures).unwrap_or(0);
        self.metrics.set_records_written(records_written);
        let snapshots = branch_result("aggregations", snapshots, &mut failures).unwrap_or_default();
        let parse_failures = branch_result("parse_failures", parse_failures, &mut failures).unwrap_or(0);

        let metrics = self.metrics.export(self.provider.cache_stats());
        info!(
            lines = summary.lines,
            parse_failures,
            fanned_out,
            records_written,
            snapshots = snapshots.len(),
            failed_branches = failures.len(),
            metrics = ?metrics,
            "Run complete"
        );

        Ok(RunReport {
            run_id,
            snapshots,
            lines_delivered: summary.lines,
            parse_failures,
            records_written,
            failures,
            metrics,
        })
    }

    /// Subscription of valid, non-future business-day records, enriched.
    fn enriched(&self, feed: &PriceFeed) -> Result<RecordStream, MulticastError> {
        let valid = filters::valid_as_of(self.config.as_of);
        let provider = Arc::clone(&self.provider);
        feed.attach(move |prices| enrich(filter_records(prices, valid), provider))
    }

    /// Combined aggregations, one input stream per aggregation.
    fn aggregations(&self, inputs: [RecordStream; 4]) -> Result<ValueStream<Vec<Option<Decimal>>>, PipelineError> {
        let [first, second, third] = self.config.instruments.clone();
        let month = self.config.mean_month;
        let [first_input, second_input, third_input, others_input] = inputs;

        let first_mean = aggregation::mean(filter_records(first_input, filters::any_of([first])));

        let second_in_month = filter_records(second_input, filters::any_of([second]));
        let second_mean = aggregation::mean(filter_records(
            second_in_month,
            filters::in_month(month.year, month.month),
        ));

        let third_max = aggregation::max(filter_records(third_input, filters::any_of([third])));

        let others = filter_records(others_input, filters::none_of(self.config.instruments.clone()));
        let newest_sum = aggregation::sum(most_relevant(others, self.config.top_k, by_date)?);

        Ok(combine_latest(vec![first_mean, second_mean, third_max, newest_sum]))
    }
}

/// Log every failed line and count them.
async fn report_parse_failures(
    mut failures: ValueStream<InvalidLine>,
    metrics: Arc<PipelineMetrics>,
) -> Result<u64, PipelineError> {
    let mut count = 0;
    while let Some(invalid) = failures.try_next().await? {
        warn!(raw_line = %invalid.raw, error = %invalid.error, "Failed to parse line");
        metrics.record_parse_failure();
        count += 1;
    }
    Ok(count)
}

async fn collect_snapshots(
    mut combined: ValueStream<Vec<Option<Decimal>>>,
    labels: Vec<String>,
    metrics: Arc<PipelineMetrics>,
) -> Result<Vec<Snapshot>, PipelineError> {
    let mut snapshots = Vec::new();
    while let Some(values) = combined.try_next().await? {
        let snapshot = Snapshot::new(&labels, values);
        info!(%snapshot, "Snapshot emitted");
        metrics.record_snapshot();
        snapshots.push(snapshot);
    }
    Ok(snapshots)
}

fn branch_result<T>(
    branch: &'static str,
    result: Result<T, PipelineError>,
    failures: &mut BTreeMap<&'static str, String>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            error!(branch, kind = err.kind(), error = %err, "Branch failed");
            failures.insert(branch, err.to_string());
            None
        }
    }
}
