use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

use mpi::{
    environment::Universe,
    topology::{Rank, SimpleCommunicator},
    traits::*,
    Tag,
};

use crate::{Transport, TransportError, TransportResult};

/// Endpoint backed by the MPI world communicator.
///
/// The MPI environment lives as long as this value; dropping it finalizes MPI.
pub struct MPIConfig {
    // keeps MPI initialized, must outlive `world`
    _universe: Universe,
    world: SimpleCommunicator,
    world_size: usize,
    world_rank: usize,
    next_call: AtomicU64,
    // (peer, mpi tag, value) that arrived ahead of the call waiting for them
    parked: Mutex<Vec<(usize, Tag, f64)>>,
}

impl Debug for MPIConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MPIConfig")
            .field("world_size", &self.world_size)
            .field("world_rank", &self.world_rank)
            .finish()
    }
}

impl MPIConfig {
    /// MPI only promises tags up to 32767, call tags wrap around inside that space.
    const TAG_SPACE: u64 = 1 << 15;

    /// Initialize MPI. Returns `None` if MPI was already initialized in this process.
    pub fn init() -> Option<Self> {
        let universe = mpi::initialize()?;
        let world = universe.world();
        let world_size = world.size() as usize;
        let world_rank = world.rank() as usize;
        log::debug!("mpi world initialized: rank {} of {}", world_rank, world_size);

        Some(Self {
            _universe: universe,
            world,
            world_size,
            world_rank,
            next_call: AtomicU64::new(0),
            parked: Mutex::new(vec![]),
        })
    }

    #[inline(always)]
    fn mpi_tag(tag: u64) -> Tag {
        (tag % Self::TAG_SPACE) as Tag
    }

    /// Whether `seen` belongs to a call before `current`. Folded tags wrap, so anything up to
    /// half the tag space behind counts as older.
    #[inline]
    pub(crate) fn is_stale(seen: Tag, current: Tag) -> bool {
        let behind = (current as u64 + Self::TAG_SPACE - seen as u64) % Self::TAG_SPACE;
        behind > 0 && behind <= Self::TAG_SPACE / 2
    }

    #[inline(always)]
    pub fn barrier(&self) {
        self.world.barrier();
    }
}

impl Transport for MPIConfig {
    #[inline(always)]
    fn world_rank(&self) -> usize {
        self.world_rank
    }

    #[inline(always)]
    fn world_size(&self) -> usize {
        self.world_size
    }

    fn send(&self, to: usize, tag: u64, value: f64) -> TransportResult<()> {
        self.check_peer(to)?;
        self.world
            .process_at_rank(to as Rank)
            .send_with_tag(&value, Self::mpi_tag(tag));
        Ok(())
    }

    fn receive(&self, from: usize, tag: u64, timeout: Duration) -> TransportResult<f64> {
        self.check_peer(from)?;
        let process = self.world.process_at_rank(from as Rank);
        let mpi_tag = Self::mpi_tag(tag);
        let deadline = Instant::now().checked_add(timeout);

        {
            let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
            parked.retain(|&(peer, seen, _)| peer != from || !Self::is_stale(seen, mpi_tag));
            if let Some(pos) = parked
                .iter()
                .position(|&(peer, seen, _)| peer == from && seen == mpi_tag)
            {
                return Ok(parked.remove(pos).2);
            }
        }

        // poll so that a silent peer turns into a timeout instead of a hang
        loop {
            match process.immediate_matched_probe() {
                Some((message, status)) => {
                    let (value, _) = message.matched_receive::<f64>();
                    let seen = status.tag();
                    if seen == mpi_tag {
                        return Ok(value);
                    } else if Self::is_stale(seen, mpi_tag) {
                        log::debug!(
                            "rank {} drops stale tag {} from {} while waiting for tag {}",
                            self.world_rank,
                            seen,
                            from,
                            mpi_tag
                        );
                    } else {
                        self.parked
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((from, seen, value));
                    }
                }
                None => {
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        return Err(TransportError::Timeout {
                            peer: from,
                            tag,
                            waited: timeout,
                        });
                    }
                    std::thread::yield_now();
                }
            }
        }
    }

    #[inline]
    fn next_call_tag(&self) -> u64 {
        self.next_call.fetch_add(1, Ordering::Relaxed)
    }
}
