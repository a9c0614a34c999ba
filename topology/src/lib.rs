//! Binomial-tree schedules for rooted reductions.
//!
//! Every worker derives its own [`TopologyPlan`] from `(rank, size, coordinator)` alone, so the
//! whole world agrees on who talks to whom in which round without exchanging a single message.

mod error;
pub use error::*;

mod plan;
pub use plan::*;
