//! Algorithms for batch processing of array workloads.

pub mod parallel;

pub use parallel::process_in_parallel_batches;
