//! Point-to-point transports the reduction engine runs on.
//!
//! A transport endpoint belongs to exactly one worker and knows that worker's rank and the size
//! of the world. Every message carries a single `f64` and a tag; the tag scopes the message to one
//! collective call so values of different calls are never confused. Tags are handed out by the
//! endpoint itself and only ever grow, so a value left behind by an aborted call is recognised as
//! stale and dropped.

use std::time::Duration;

mod error;
pub use error::*;

mod thread_config;
pub use thread_config::ThreadConfig;

#[cfg(feature = "mpi")]
mod mpi_config;
#[cfg(feature = "mpi")]
pub use mpi_config::MPIConfig;

pub trait Transport {
    fn world_rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Hand `value` to `to`. Does not wait for the receiver.
    fn send(&self, to: usize, tag: u64, value: f64) -> TransportResult<()>;

    /// Block until `from` has sent a value under `tag`, or fail with
    /// [`TransportError::Timeout`] once `timeout` has elapsed.
    /// Messages from `from` under an older tag are discarded. A `timeout` too large to
    /// represent as a deadline waits without limit.
    fn receive(&self, from: usize, tag: u64, timeout: Duration) -> TransportResult<f64>;

    /// Tag of the next collective call on this endpoint; every call takes a fresh one.
    fn next_call_tag(&self) -> u64;

    #[inline(always)]
    fn is_single_process(&self) -> bool {
        self.world_size() == 1
    }

    #[inline]
    fn check_peer(&self, peer: usize) -> TransportResult<()> {
        if peer >= self.world_size() || peer == self.world_rank() {
            Err(TransportError::InvalidPeer {
                rank: self.world_rank(),
                peer,
                world_size: self.world_size(),
            })
        } else {
            Ok(())
        }
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    #[inline(always)]
    fn world_rank(&self) -> usize {
        (**self).world_rank()
    }

    #[inline(always)]
    fn world_size(&self) -> usize {
        (**self).world_size()
    }

    #[inline]
    fn send(&self, to: usize, tag: u64, value: f64) -> TransportResult<()> {
        (**self).send(to, tag, value)
    }

    #[inline]
    fn receive(&self, from: usize, tag: u64, timeout: Duration) -> TransportResult<f64> {
        (**self).receive(from, tag, timeout)
    }

    #[inline]
    fn next_call_tag(&self) -> u64 {
        (**self).next_call_tag()
    }
}
