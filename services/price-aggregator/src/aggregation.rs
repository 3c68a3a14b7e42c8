//! Terminal aggregations over record streams
//!
//! Each aggregation consumes its stream to completion and resolves to a
//! single `Option<Decimal>`: `None` when no record was observed. The
//! stream forms (`mean`, `max`, `sum`) wrap that value as a one-element
//! stream so it can take part in fan-in.
//!
//! The accumulators are plain values: `accumulate` consumes and returns
//! the accumulator, so folds never share mutable state.

use futures::future;
use futures::stream::TryStreamExt;
use rust_decimal::Decimal;
use types::numeric::divide;

use crate::error::PipelineError;
use crate::stream::{single, RecordStream, ValueStream};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("capacity must be positive, got {0}")]
    InvalidCapacity(usize),

    #[error("{aggregation} overflowed after {count} records")]
    Overflow { aggregation: &'static str, count: u64 },
}

/// Running `(sum, count)` for an arithmetic mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeanAccumulator {
    sum: Decimal,
    count: u64,
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(self, price: Decimal) -> Result<Self, AggregationError> {
        let sum = self.sum.checked_add(price).ok_or(AggregationError::Overflow {
            aggregation: "mean",
            count: self.count,
        })?;
        Ok(Self {
            sum,
            count: self.count + 1,
        })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `sum / count` rounded to 16 significant digits, None when empty.
    pub fn mean(&self) -> Option<Decimal> {
        if self.count == 0 {
            return None;
        }
        divide(self.sum, Decimal::from(self.count))
    }
}

/// Running maximum. Starts empty, so all-negative inputs keep their sign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaxAccumulator {
    max: Option<Decimal>,
}

impl MaxAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(self, price: Decimal) -> Self {
        let max = match self.max {
            Some(current) => current.max(price),
            None => price,
        };
        Self { max: Some(max) }
    }

    pub fn max(&self) -> Option<Decimal> {
        self.max
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SumAccumulator {
    sum: Option<Decimal>,
    count: u64,
}

impl SumAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(self, price: Decimal) -> Result<Self, AggregationError> {
        let sum = self
            .sum
            .unwrap_or(Decimal::ZERO)
            .checked_add(price)
            .ok_or(AggregationError::Overflow {
                aggregation: "sum",
                count: self.count,
            })?;
        Ok(Self {
            sum: Some(sum),
            count: self.count + 1,
        })
    }

    pub fn sum(&self) -> Option<Decimal> {
        self.sum
    }
}

/// Mean price of every record in `records`.
pub async fn mean_of(records: RecordStream) -> Result<Option<Decimal>, PipelineError> {
    let acc = records
        .try_fold(MeanAccumulator::new(), |acc, record| {
            future::ready(acc.accumulate(record.price()).map_err(PipelineError::from))
        })
        .await?;
    Ok(acc.mean())
}

/// Highest price in `records`.
pub async fn max_of(records: RecordStream) -> Result<Option<Decimal>, PipelineError> {
    let acc = records
        .try_fold(MaxAccumulator::new(), |acc, record| {
            future::ready(Ok(acc.accumulate(record.price())))
        })
        .await?;
    Ok(acc.max())
}

/// Sum of prices in `records`.
pub async fn sum_of(records: RecordStream) -> Result<Option<Decimal>, PipelineError> {
    let acc = records
        .try_fold(SumAccumulator::new(), |acc, record| {
            future::ready(acc.accumulate(record.price()).map_err(PipelineError::from))
        })
        .await?;
    Ok(acc.sum())
}

pub fn mean(records: RecordStream) -> ValueStream<Option<Decimal>> {
    single(mean_of(records))
}

pub fn max(records: RecordStream) -> ValueStream<Option<Decimal>> {
    single(max_of(records))
}

pub fn sum(records: RecordStream) -> ValueStream<Option<Decimal>> {
    single(sum_of(records))
}
