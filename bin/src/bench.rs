//! The array-sum workload driven around the reduction.

use std::time::{Duration, Instant};

use tree_reduce::{ReduceResult, Reducer, Transport};

/// What the coordinator learns from one timed run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub sum: f64,
    pub expected: f64,
    pub elapsed: Duration,
}

impl Report {
    #[inline]
    pub fn is_correct(&self) -> bool {
        self.sum == self.expected
    }
}

/// Elements each worker holds; a remainder of `elements` is dropped.
#[inline]
pub fn local_count(elements: usize, world_size: usize) -> usize {
    elements / world_size
}

/// Closed form of the global sum when rank `r` holds `local_count` copies of `r + 1`.
pub fn expected_sum(world_size: usize, local_count: usize) -> f64 {
    (0..world_size)
        .map(|rank| ((rank + 1) * local_count) as f64)
        .fold(0.0, |acc, x| acc + x)
}

/// Fill this worker's slice of the array, sum it and reduce the partial sums.
/// The clock covers the local sum and the reduction, not the allocation.
pub fn run_worker<T: Transport>(
    reducer: &mut Reducer<T>,
    elements: usize,
) -> ReduceResult<Option<Report>> {
    let world_size = reducer.world_size();
    let rank = reducer.world_rank();
    let n = local_count(elements, world_size);
    let array = vec![(rank + 1) as f64; n];

    let start = Instant::now();
    let local = array.iter().fold(0.0, |acc, x| acc + x);
    let sum = reducer.reduce(local)?;
    let elapsed = start.elapsed();

    log::debug!("rank {} contributed {} from {} elements", rank, local, n);

    Ok(sum.map(|sum| Report {
        sum,
        expected: expected_sum(world_size, n),
        elapsed,
    }))
}
