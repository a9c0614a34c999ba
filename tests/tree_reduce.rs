use ark_std::{rand::Rng, test_rng};
use tree_reduce::{
    num_rounds, reduce_on_threads, run_on_threads, world_plans, ReduceConfig, ReduceError,
    Reducer, Role, ThreadConfig, Transport,
};

/// Sum `values` in exactly the order the binomial tree folds them.
fn tree_order_sum(values: &[f64], coordinator: usize) -> f64 {
    let plans = world_plans(values.len(), coordinator).unwrap();
    let mut acc = values.to_vec();
    for round in 0..num_rounds(values.len()) {
        for p in &plans {
            let step = p.steps()[round];
            if step.role == Role::Receiver {
                acc[p.rank()] += acc[step.partner.unwrap()];
            }
        }
    }
    acc[coordinator]
}

#[test]
fn test_four_workers() {
    let sum = reduce_on_threads(&[1.0, 2.0, 3.0, 4.0], ReduceConfig::default()).unwrap();
    assert_eq!(sum, 10.0);
    assert_eq!(num_rounds(4), 2);
}

#[test]
fn test_eight_workers() {
    let values = (0..8).map(|rank| (rank + 1) as f64).collect::<Vec<_>>();
    let sum = reduce_on_threads(&values, ReduceConfig::default()).unwrap();
    assert_eq!(sum, 36.0);
    assert_eq!(num_rounds(8), 3);
}

#[test]
fn test_every_size_and_coordinator() {
    for size in 1..=17 {
        let values = (0..size).map(|rank| (rank * rank + 1) as f64).collect::<Vec<_>>();
        let expected: f64 = values.iter().sum();
        for coordinator in 0..size {
            let config = ReduceConfig::default().with_coordinator(coordinator);
            assert_eq!(
                reduce_on_threads(&values, config).unwrap(),
                expected,
                "size {size} coordinator {coordinator}"
            );
        }
    }
}

#[test]
fn test_bit_identical_across_runs() {
    let mut rng = test_rng();
    let values = (0..23)
        .map(|_| rng.gen::<f64>() * 1e6 - 5e5)
        .collect::<Vec<_>>();

    for coordinator in [0, 7, 22] {
        let config = ReduceConfig::default().with_coordinator(coordinator);
        let expected = tree_order_sum(&values, coordinator);
        for _ in 0..5 {
            let sum = reduce_on_threads(&values, config).unwrap();
            assert_eq!(sum.to_bits(), expected.to_bits());
        }
    }
}

#[test]
fn test_nan_is_data() {
    let sum = reduce_on_threads(&[1.0, f64::NAN, 3.0], ReduceConfig::default()).unwrap();
    assert!(sum.is_nan());

    let sum = reduce_on_threads(&[1.0, f64::INFINITY, 3.0, 4.0], ReduceConfig::default()).unwrap();
    assert_eq!(sum, f64::INFINITY);
}

#[test]
fn test_only_coordinator_gets_the_sum() {
    let world = ThreadConfig::world(6);
    let results = run_on_threads(&world, |endpoint| {
        let mut reducer = Reducer::new(endpoint, ReduceConfig::default().with_coordinator(4));
        reducer.reduce(1.5)
    })
    .unwrap();

    for (rank, result) in results.into_iter().enumerate() {
        let result = result.unwrap();
        if rank == 4 {
            assert_eq!(result, Some(9.0));
        } else {
            assert_eq!(result, None);
        }
    }
}

#[test]
fn test_repeated_calls_stay_apart() {
    const CALLS: usize = 6;
    let size = 7;
    let world = ThreadConfig::world(size);

    let results = run_on_threads(&world, |endpoint| {
        let rank = endpoint.world_rank();
        let mut reducer = Reducer::new(endpoint, ReduceConfig::default());
        (0..CALLS)
            .map(|call| {
                // alternate coordinators so the cached plan is refreshed between calls
                let coordinator = call % 3;
                reducer
                    .reduce_to(((call + 1) * (rank + 1)) as f64, coordinator)
                    .unwrap()
            })
            .collect::<Vec<_>>()
    })
    .unwrap();

    let rank_total = (1..=size).sum::<usize>();
    for call in 0..CALLS {
        let coordinator = call % 3;
        for (rank, per_call) in results.iter().enumerate() {
            if rank == coordinator {
                assert_eq!(per_call[call], Some(((call + 1) * rank_total) as f64));
            } else {
                assert_eq!(per_call[call], None);
            }
        }
    }
    assert!(world.iter().all(|endpoint| endpoint.parked_len() == 0));
}

#[test]
fn test_invalid_coordinator() {
    let world = ThreadConfig::world(4);
    let results = run_on_threads(&world, |endpoint| {
        Reducer::new(endpoint, ReduceConfig::default().with_coordinator(5)).reduce(1.0)
    })
    .unwrap();

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(ReduceError::InvalidTopology(_)))));
    assert!(world.iter().all(|endpoint| endpoint.parked_len() == 0));

    assert!(matches!(
        reduce_on_threads(&[1.0; 4], ReduceConfig::default().with_coordinator(5)),
        Err(ReduceError::InvalidTopology(_))
    ));
    assert!(matches!(
        reduce_on_threads(&[], ReduceConfig::default()),
        Err(ReduceError::InvalidTopology(_))
    ));
}

#[test]
fn test_silent_partner() {
    let _ = env_logger::builder().is_test(true).try_init();

    let world = ThreadConfig::world(4);
    let config = ReduceConfig::default().with_timeout(std::time::Duration::from_millis(100));

    // rank 1 is alive but never takes part
    let results = run_on_threads(&world, |endpoint| {
        if endpoint.world_rank() == 1 {
            return None;
        }
        Some(Reducer::new(endpoint, config).reduce(1.0))
    })
    .unwrap();

    match &results[0] {
        Some(Err(ReduceError::PeerUnavailable { round, partner, .. })) => {
            assert_eq!((*round, *partner), (0, 1));
        }
        other => panic!("coordinator should have stalled, got {:?}", other),
    }
    assert!(matches!(results[2], Some(Ok(None))));
    assert!(matches!(results[3], Some(Ok(None))));
}

#[test]
fn test_silent_leaf_stalls_later_round() {
    let world = ThreadConfig::world(4);
    let config = ReduceConfig::default().with_timeout(std::time::Duration::from_millis(100));

    // rank 3 never sends, so rank 2 gives up before forwarding and the coordinator stalls in
    // round 1 waiting for rank 2
    let results = run_on_threads(&world, |endpoint| {
        if endpoint.world_rank() == 3 {
            return None;
        }
        Some(Reducer::new(endpoint, config).reduce(1.0))
    })
    .unwrap();

    assert!(matches!(
        results[2],
        Some(Err(ReduceError::PeerUnavailable {
            round: 0,
            partner: 3,
            ..
        }))
    ));
    assert!(matches!(
        results[0],
        Some(Err(ReduceError::PeerUnavailable {
            round: 1,
            partner: 2,
            ..
        }))
    ));
}

#[test]
fn test_departed_partner() {
    let mut world = ThreadConfig::world(2);
    drop(world.pop());

    let mut reducer = Reducer::new(&world[0], ReduceConfig::default());
    assert!(matches!(
        reducer.reduce(1.0),
        Err(ReduceError::PeerUnavailable {
            round: 0,
            partner: 1,
            ..
        })
    ));
}

#[test]
fn test_retry_after_timeout_ignores_late_value() {
    let world = ThreadConfig::world(2);
    let short = ReduceConfig::default().with_timeout(std::time::Duration::from_millis(50));

    // first call: rank 1 is too late and the coordinator gives up
    let first = Reducer::new(&world[0], short).reduce(1.0);
    assert!(matches!(
        first,
        Err(ReduceError::PeerUnavailable {
            round: 0,
            partner: 1,
            ..
        })
    ));
    assert_eq!(
        Reducer::new(&world[1], short).reduce(100.0).unwrap(),
        None
    );

    // retry with fresh reducers on the same endpoints
    let results = run_on_threads(&world, |endpoint| {
        let value = (endpoint.world_rank() + 1) as f64;
        Reducer::new(endpoint, ReduceConfig::default()).reduce(value)
    })
    .unwrap();

    assert_eq!(results[0].as_ref().unwrap(), &Some(3.0));
    assert_eq!(results[1].as_ref().unwrap(), &None);
    assert!(world.iter().all(|endpoint| endpoint.parked_len() == 0));
}

#[test]
fn test_unbounded_timeout() {
    let config = ReduceConfig::default().with_timeout(std::time::Duration::MAX);
    assert_eq!(reduce_on_threads(&[1.0, 2.0, 3.0, 4.0, 5.0], config).unwrap(), 15.0);

    let mut world = ThreadConfig::world(2);
    drop(world.pop());
    assert!(matches!(
        Reducer::new(&world[0], config).reduce(1.0),
        Err(ReduceError::PeerUnavailable { partner: 1, .. })
    ));
}
