//! Rooted sum reduction over a binomial tree.
//!
//! Each worker owns one [`Reducer`] wrapping its transport endpoint. A call to
//! [`Reducer::reduce`] walks the worker's [`TopologyPlan`] round by round; the coordinator gets
//! the sum of every worker's partial value, everybody else gets `None`.

mod config;
pub use config::*;

mod error;
pub use error::*;

mod reducer;
pub use reducer::*;

mod threads;
pub use threads::*;

pub use mpi_config::{ThreadConfig, Transport, TransportError};
#[cfg(feature = "mpi")]
pub use mpi_config::MPIConfig;
pub use topology::{num_rounds, plan, world_plans, Role, RoundStep, TopologyError, TopologyPlan};
