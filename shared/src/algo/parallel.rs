//! Parallel processing utilities for chunked array workloads
//!
//! This module pulls work items from a (possibly lazy) iterator in bounded
//! batches, processes each batch in parallel, and hands the results to a
//! sequential consumer in input order. Memory stays proportional to one
//! batch and the output order is deterministic.

use rayon::prelude::*;

/// Process items in parallel batches, feeding results to a sequential sink
///
/// Items are pulled from `items` in batches of `rayon::current_num_threads()`
/// (or one at a time when `parallel` is false). Every item in a batch is
/// processed concurrently, then the results are passed to `sink` in the
/// order the iterator produced them before the next batch is pulled. Pulling
/// is sequential, so a lazy iterator only materializes one batch at a time.
///
/// # Arguments
/// * `items` - Work items, consumed in order
/// * `parallel` - Whether to fan each batch out over the rayon pool
/// * `work` - Closure producing a result for one item
/// * `sink` - Closure consuming results sequentially (e.g. a file writer)
///
/// # Returns
/// The first error produced by `work` or `sink`. No further batches are
/// pulled once an error occurs.
pub fn process_in_parallel_batches<I, T, E, F, S>(
    items: I,
    parallel: bool,
    work: F,
    mut sink: S,
) -> Result<(), E>
where
    I: IntoIterator,
    I::Item: Send,
    T: Send,
    E: Send,
    F: Fn(I::Item) -> Result<T, E> + Send + Sync,
    S: FnMut(T) -> Result<(), E>,
{
    let batch_size = if parallel {
        rayon::current_num_threads().max(1)
    } else {
        1
    };

    let mut items = items.into_iter();
    loop {
        let batch: Vec<I::Item> = items.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }

        let results: Vec<Result<T, E>> = if parallel && batch.len() > 1 {
            batch.into_par_iter().map(&work).collect()
        } else {
            batch.into_iter().map(&work).collect()
        };

        for result in results {
            sink(result?)?;
        }
    }

    Ok(())
}
