//! Stream aliases and small adapters shared by the pipeline stages
//!
//! Every stage exchanges `Result` items so that a fatal upstream failure
//! (source error, lookup error) travels in-band to whoever folds the stream.

use std::future::Future;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use types::record::Record;

use crate::error::PipelineError;

/// Stream of records, each item possibly carrying an upstream failure.
pub type RecordStream = BoxStream<'static, Result<Record, PipelineError>>;

/// Stream of arbitrary pipeline values.
pub type ValueStream<T> = BoxStream<'static, Result<T, PipelineError>>;

/// Adapt an unbounded receiver into a stream that ends when every sender is gone.
pub fn receiver_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// Wrap a single eventual value as a one-element stream.
pub fn single<T, F>(value: F) -> ValueStream<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, PipelineError>> + Send + 'static,
{
    stream::once(value).boxed()
}

/// Keep only records matching `predicate`; failures pass through untouched.
pub fn filter_records<P>(records: RecordStream, predicate: P) -> RecordStream
where
    P: Fn(&Record) -> bool + Send + 'static,
{
    records
        .try_filter(move |record| future::ready(predicate(record)))
        .boxed()
}

/// Fan `input` out to `N` outputs that each see every item in order.
///
/// A failure is delivered to every output as [`PipelineError::Shared`] and
/// ends the fan-out. Outputs that are dropped stop receiving. The returned
/// future drives the fan-out and resolves to the number of values forwarded.
pub fn tee<T, const N: usize>(
    mut input: ValueStream<T>,
) -> ([ValueStream<T>; N], impl Future<Output = u64> + Send + 'static)
where
    T: Clone + Send + 'static,
{
    let mut senders = Vec::with_capacity(N);
    let outputs = std::array::from_fn(|_| {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.push(tx);
        receiver_stream(rx)
    });

    let pump = async move {
        let mut forwarded = 0;
        while let Some(item) = input.next().await {
            match item {
                Ok(value) => {
                    senders.retain(|tx| tx.send(Ok(value.clone())).is_ok());
                    if senders.is_empty() {
                        break;
                    }
                    forwarded += 1;
                }
                Err(err) => {
                    let err = Arc::new(err);
                    for tx in &senders {
                        let _ = tx.send(Err(PipelineError::Shared(Arc::clone(&err))));
                    }
                    break;
                }
            }
        }
        forwarded
    };

    (outputs, pump)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use types::ids::InstrumentName;

    fn record(name: &str, price: i64) -> Record {
        Record::new(
            InstrumentName::new(name),
            NaiveDate::from_ymd_opt(2014, 11, 3).unwrap(),
            Decimal::from(price),
        )
    }

    #[tokio::test]
    async fn test_receiver_stream_ends_with_senders() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        drop(tx);

        let items: Vec<i32> = receiver_stream(rx).collect().await;
        assert_eq!(items, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_filter_records_keeps_failures() {
        let items = vec![
            Ok(record("A", 1)),
            Err(PipelineError::from(crate::source::SourceError::new(2, "boom"))),
            Ok(record("B", 2)),
        ];
        let filtered: Vec<_> = filter_records(stream::iter(items).boxed(), |r| r.name().as_str() == "B")
            .collect()
            .await;

        assert_eq!(filtered.len(), 2);
        assert!(filtered[0].is_err());
        assert_eq!(filtered[1].as_ref().unwrap().name().as_str(), "B");
    }

    #[tokio::test]
    async fn test_tee_delivers_every_value_to_every_output() {
        let input = stream::iter((1..=3).map(|p| Ok(record("A", p)))).boxed();
        let ([left, right], pump) = tee::<_, 2>(input);

        assert_eq!(pump.await, 3);
        for output in [left, right] {
            let prices: Vec<Decimal> = output.map_ok(|r| r.price()).try_collect().await.unwrap();
            assert_eq!(prices, vec![Decimal::ONE, Decimal::TWO, Decimal::from(3)]);
        }
    }

    #[tokio::test]
    async fn test_tee_shares_failure_and_stops() {
        let input = stream::iter(vec![
            Ok(record("A", 1)),
            Err(PipelineError::from(crate::source::SourceError::new(2, "boom"))),
            Ok(record("A", 2)),
        ])
        .boxed();
        let ([left, right], pump) = tee::<_, 2>(input);

        assert_eq!(pump.await, 1);
        for output in [left, right] {
            let items: Vec<_> = output.collect().await;
            assert_eq!(items.len(), 2);
            let err = items[1].as_ref().unwrap_err();
            assert_eq!(err.kind(), "source");
            assert!(err.to_string().contains("boom"));
        }
    }

    #[tokio::test]
    async fn test_tee_keeps_feeding_remaining_outputs() {
        let input = stream::iter((1..=2).map(|p| Ok(record("A", p)))).boxed();
        let ([dropped, kept], pump) = tee::<_, 2>(input);
        drop(dropped);

        assert_eq!(pump.await, 2);
        let items: Vec<_> = kept.collect().await;
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_single_emits_once() {
        let values: Vec<_> = single(async { Ok(7) }).collect().await;
        assert_eq!(values.len(), 1);
        assert_eq!(*values[0].as_ref().unwrap(), 7);
    }
}
