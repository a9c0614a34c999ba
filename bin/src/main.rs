use std::{process::exit, time::Duration};

use clap::Parser;
use log::error;
use tree_reduce::{plan, run_on_threads, ReduceConfig, ReduceResult, Reducer, ThreadConfig};

mod bench;
use bench::{run_worker, Report};

/// Sum a large array split across workers and time the binomial-tree reduction of the partial
/// sums at the coordinator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transport: threads, mpi
    #[arg(short, long, default_value_t = String::from("threads"))]
    backend: String,

    /// number of in-process workers, threads backend only
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// total number of array elements, split evenly across workers
    #[arg(short = 'n', long, default_value_t = 100 * (1 << 20))]
    elements: usize,

    /// rank that receives the sum
    #[arg(short, long, default_value_t = 0)]
    coordinator: usize,

    /// how long a worker waits for its partner, in milliseconds
    #[arg(short, long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// number of repeat
    #[arg(short, long, default_value_t = 1)]
    repeats: usize,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    print_info(&args);

    let config = ReduceConfig::new(args.coordinator, Duration::from_millis(args.timeout_ms));

    let outcome = match args.backend.as_str() {
        "threads" => run_threads(&args, config),
        "mpi" => run_mpi(&args, config),
        other => {
            error!("unknown backend: {}. Use 'threads' or 'mpi'", other);
            exit(2);
        }
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => exit(1),
        Err(e) => {
            error!("reduction failed: {}", e);
            exit(1);
        }
    }
}

fn run_threads(args: &Args, config: ReduceConfig) -> ReduceResult<bool> {
    // reject a bad world before spawning anything
    plan(0, args.workers, config.coordinator)?;

    let world = ThreadConfig::world(args.workers);
    let per_rank = run_on_threads(&world, |endpoint| {
        let mut reducer = Reducer::new(endpoint, config);
        (0..args.repeats)
            .map(|_| run_worker(&mut reducer, args.elements))
            .collect::<ReduceResult<Vec<_>>>()
    })?;

    let mut correct = true;
    for (rank, reports) in per_rank.into_iter().enumerate() {
        let reports = reports?;
        if rank == config.coordinator {
            for (i, report) in reports.iter().flatten().enumerate() {
                correct &= print_report(i, report);
            }
        }
    }
    Ok(correct)
}

#[cfg(feature = "mpi")]
fn run_mpi(args: &Args, config: ReduceConfig) -> ReduceResult<bool> {
    use tree_reduce::MPIConfig;

    let Some(world) = MPIConfig::init() else {
        error!("MPI was already initialized in this process");
        return Ok(false);
    };
    let mut reducer = Reducer::new(&world, config);

    let mut correct = true;
    for i in 0..args.repeats {
        // start every repetition together so the clock measures the reduction, not stragglers
        world.barrier();
        if let Some(report) = run_worker(&mut reducer, args.elements)? {
            correct &= print_report(i, &report);
        }
    }
    Ok(correct)
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_args: &Args, _config: ReduceConfig) -> ReduceResult<bool> {
    error!("reduce-bench was built without the `mpi` feature");
    Ok(false)
}

fn print_report(i: usize, report: &Report) -> bool {
    if !report.is_correct() {
        println!(
            "Wrong result, expected {:.6}, got {:.6}",
            report.expected, report.sum
        );
    }
    println!("{}-run: Sum time: {:.6} s", i, report.elapsed.as_secs_f64());
    report.is_correct()
}

fn print_info(args: &Args) {
    println!("===============================");
    println!("binomial tree sum over {}", args.backend);
    if args.backend == "threads" {
        println!("workers:        {}", args.workers);
    }
    println!("elements:       {}", args.elements);
    println!("coordinator:    {}", args.coordinator);
    println!("timeout:        {} ms", args.timeout_ms);
    println!("#bench repeats: {}", args.repeats);
    println!("===============================")
}
