use mpi_config::{ThreadConfig, Transport};
use rayon::ThreadPoolBuilder;
use topology::TopologyError;

use crate::{ReduceConfig, ReduceResult, Reducer};

/// Run `op` once for every endpoint of `world`, each on a thread of its own, and collect the
/// results in rank order.
///
/// The pool has exactly one thread per endpoint, so a worker blocked in a receive never keeps
/// another worker from running.
pub fn run_on_threads<R, F>(world: &[ThreadConfig], op: F) -> ReduceResult<Vec<R>>
where
    R: Send,
    F: Fn(&ThreadConfig) -> R + Sync,
{
    if world.is_empty() {
        return Ok(vec![]);
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(world.len())
        .thread_name(|i| format!("worker-{i}"))
        .build()?;

    Ok(pool.broadcast(|ctx| op(&world[ctx.index()])))
}

/// Reduce `values[rank]` of an in-process world with one worker per value.
///
/// Returns the coordinator's sum, or the first failure in rank order.
pub fn reduce_on_threads(values: &[f64], config: ReduceConfig) -> ReduceResult<f64> {
    if values.is_empty() {
        return Err(TopologyError::InvalidTopology {
            rank: 0,
            size: 0,
            coordinator: config.coordinator,
            reason: "no workers".to_string(),
        }
        .into());
    }

    let world = ThreadConfig::world(values.len());
    let results = run_on_threads(&world, |endpoint| {
        Reducer::new(endpoint, config).reduce(values[endpoint.world_rank()])
    })?;

    let mut sum = None;
    for (rank, result) in results.into_iter().enumerate() {
        let value = result?;
        if rank == config.coordinator {
            sum = value;
        }
    }

    // a successful call always leaves the sum at the coordinator
    sum.ok_or_else(|| {
        TopologyError::InvalidTopology {
            rank: config.coordinator,
            size: values.len(),
            coordinator: config.coordinator,
            reason: "coordinator produced no sum".to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::ReduceError;

    #[test]
    fn test_pool_failure_is_reported() {
        let err = ThreadPoolBuilder::new()
            .num_threads(2)
            .spawn_handler(|_| Err(io::Error::new(io::ErrorKind::Other, "no threads left")))
            .build()
            .unwrap_err();
        let err = ReduceError::from(err);
        assert!(matches!(err, ReduceError::ThreadPool(_)));
        assert_eq!(err.to_string(), "failed to start worker threads");
    }

    #[test]
    fn test_empty_world_runs_nothing() {
        let results = run_on_threads(&[], |endpoint| endpoint.world_rank()).unwrap();
        assert!(results.is_empty());
    }
}
