//! Bounded most-relevant selection
//!
//! `BoundedTopK` is a fixed-capacity binary min-heap ordered by a
//! caller-supplied comparator. The root is always the least relevant
//! retained item, so a newcomer only has to beat the root to get in.
//!
//! Ties at the capacity boundary keep the incumbent. Which of several
//! equally relevant records survives therefore depends on arrival order.

use std::cmp::Ordering;

use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use types::record::Record;

use crate::aggregation::AggregationError;
use crate::error::PipelineError;
use crate::stream::RecordStream;

pub struct BoundedTopK<T, C> {
    heap: Vec<T>,
    capacity: usize,
    cmp: C,
}

impl<T, C> BoundedTopK<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    pub fn new(capacity: usize, cmp: C) -> Result<Self, AggregationError> {
        if capacity == 0 {
            return Err(AggregationError::InvalidCapacity(capacity));
        }
        Ok(Self {
            heap: Vec::with_capacity(capacity),
            capacity,
            cmp,
        })
    }

    /// Insert `item`, evicting the least relevant one when over capacity.
    ///
    /// Returns the evicted item, or `item` itself when it was not admitted.
    pub fn offer(&mut self, item: T) -> Option<T> {
        if self.heap.len() < self.capacity {
            self.heap.push(item);
            self.sift_up(self.heap.len() - 1);
            return None;
        }

        if (self.cmp)(&item, &self.heap[0]) != Ordering::Greater {
            return Some(item);
        }

        let evicted = std::mem::replace(&mut self.heap[0], item);
        self.sift_down(0);
        Some(evicted)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Least relevant retained item.
    pub fn peek_least(&self) -> Option<&T> {
        self.heap.first()
    }

    /// Retained items in heap order.
    pub fn into_vec(self) -> Vec<T> {
        self.heap
    }

    /// Retained items, most relevant first.
    pub fn into_sorted_vec(self) -> Vec<T> {
        let cmp = self.cmp;
        let mut items = self.heap;
        items.sort_by(|a, b| cmp(b, a));
        items
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if (self.cmp)(&self.heap[idx], &self.heap[parent]) != Ordering::Less {
                break;
            }
            self.heap.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;

            if left < len && (self.cmp)(&self.heap[left], &self.heap[smallest]) == Ordering::Less {
                smallest = left;
            }
            if right < len && (self.cmp)(&self.heap[right], &self.heap[smallest]) == Ordering::Less {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.heap.swap(idx, smallest);
            idx = smallest;
        }
    }
}

/// Newer records are more relevant.
pub fn by_date(a: &Record, b: &Record) -> Ordering {
    a.date().cmp(&b.date())
}

/// Higher prices are more relevant.
pub fn by_price(a: &Record, b: &Record) -> Ordering {
    a.price().cmp(&b.price())
}

/// The `k` most relevant records of `records` under `cmp`.
///
/// Emits the retained records in unspecified order once `records`
/// completes. `k == 0` is rejected up front.
pub fn most_relevant<C>(records: RecordStream, k: usize, cmp: C) -> Result<RecordStream, AggregationError>
where
    C: Fn(&Record, &Record) -> Ordering + Send + 'static,
{
    let top = BoundedTopK::new(k, cmp)?;
    let retained = records.try_fold(top, |mut top, record| {
        top.offer(record);
        future::ready(Ok::<_, PipelineError>(top))
    });

    Ok(stream::once(retained)
        .map(|result| match result {
            Ok(top) => stream::iter(top.into_vec().into_iter().map(Ok)).left_stream(),
            Err(err) => stream::once(future::ready(Err(err))).right_stream(),
        })
        .flatten()
        .boxed())
}
