//! Combine-latest fan-in
//!
//! Merges N value streams into one stream of N-element snapshots. Nothing
//! is emitted until every input has produced a value; after that, every
//! new value from any input emits a fresh snapshot of the latest values.
//! The first error from any input is forwarded and ends the combined
//! stream.
//!
//! With single-shot inputs (one value each, as the aggregations produce)
//! this emits exactly one snapshot once all inputs have completed.

use futures::stream::{self, SelectAll, StreamExt};

use crate::error::PipelineError;
use crate::stream::ValueStream;

type Tagged<T> = futures::stream::BoxStream<'static, (usize, Result<T, PipelineError>)>;

struct CombineState<T> {
    inputs: SelectAll<Tagged<T>>,
    latest: Vec<Option<T>>,
    missing: usize,
    failed: bool,
}

/// Snapshot stream of the latest value of each input, in input order.
pub fn combine_latest<T>(inputs: Vec<ValueStream<T>>) -> ValueStream<Vec<T>>
where
    T: Clone + Send + 'static,
{
    let width = inputs.len();
    if width == 0 {
        return stream::empty().boxed();
    }

    let tagged = inputs
        .into_iter()
        .enumerate()
        .map(|(idx, input)| input.map(move |item| (idx, item)).boxed());

    let state = CombineState {
        inputs: stream::select_all(tagged),
        latest: vec![None; width],
        missing: width,
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        loop {
            let (idx, item) = state.inputs.next().await?;
            match item {
                Err(err) => {
                    state.failed = true;
                    return Some((Err(err), state));
                }
                Ok(value) => {
                    if state.latest[idx].replace(value).is_none() {
                        state.missing -= 1;
                    }
                    if state.missing == 0 {
                        let snapshot: Vec<T> = state.latest.iter().flatten().cloned().collect();
                        return Some((Ok(snapshot), state));
                    }
                }
            }
        }
    })
    .boxed()
}
