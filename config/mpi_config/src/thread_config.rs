use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

use crate::{Transport, TransportError, TransportResult};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Envelope {
    tag: u64,
    value: f64,
}

/// Messages from a single peer. Messages that arrive under a tag nobody is waiting for yet are
/// parked until a receive with that tag asks for them; messages under an older tag are dropped.
#[derive(Debug)]
struct Inbox {
    receiver: Receiver<Envelope>,
    parked: VecDeque<Envelope>,
}

impl Inbox {
    #[inline]
    fn new(receiver: Receiver<Envelope>) -> Self {
        Self {
            receiver,
            parked: VecDeque::new(),
        }
    }

    #[inline]
    fn take_parked(&mut self, tag: u64) -> Option<f64> {
        self.parked.retain(|e| e.tag >= tag);
        let pos = self.parked.iter().position(|e| e.tag == tag)?;
        self.parked.remove(pos).map(|e| e.value)
    }

    /// Wait for the next message; `deadline == None` waits without limit.
    #[inline]
    fn next(&self, deadline: Option<Instant>) -> Result<Envelope, RecvTimeoutError> {
        match deadline {
            Some(deadline) => self
                .receiver
                .recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => self
                .receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        }
    }
}

/// In-process endpoint of one worker
/// Assumptions
/// 1. Each worker runs on its own thread and owns its endpoint
/// 2. Any two workers are connected by a dedicated FIFO channel in each direction
/// 3. Only the owning worker reads its inboxes
/// 4. All workers issue their collective calls in the same order
#[derive(Debug)]
pub struct ThreadConfig {
    world_rank: usize,
    world_size: usize,
    next_call: AtomicU64,
    // indexed by destination rank, own slot is None
    outboxes: Vec<Option<Sender<Envelope>>>,
    // indexed by source rank, own slot is None
    inboxes: Vec<Option<Mutex<Inbox>>>,
}

impl ThreadConfig {
    /// Build a fully connected world of `world_size` endpoints, indexed by rank.
    pub fn world(world_size: usize) -> Vec<Self> {
        let mut outboxes: Vec<Vec<Option<Sender<Envelope>>>> = (0..world_size)
            .map(|_| (0..world_size).map(|_| None).collect())
            .collect();
        let mut inboxes: Vec<Vec<Option<Mutex<Inbox>>>> = (0..world_size)
            .map(|_| (0..world_size).map(|_| None).collect())
            .collect();

        for src in 0..world_size {
            for dst in 0..world_size {
                if src == dst {
                    continue;
                }
                let (sender, receiver) = mpsc::channel();
                outboxes[src][dst] = Some(sender);
                inboxes[dst][src] = Some(Mutex::new(Inbox::new(receiver)));
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(world_rank, (outboxes, inboxes))| Self {
                world_rank,
                world_size,
                next_call: AtomicU64::new(0),
                outboxes,
                inboxes,
            })
            .collect()
    }

    /// Number of messages received under a tag that has not been asked for yet
    pub fn parked_len(&self) -> usize {
        self.inboxes
            .iter()
            .flatten()
            .map(|inbox| inbox.lock().unwrap_or_else(PoisonError::into_inner).parked.len())
            .sum()
    }
}

impl Transport for ThreadConfig {
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
        let outbox = self.outboxes[to]
            .as_ref()
            .ok_or(TransportError::Disconnected { peer: to })?;
        outbox
            .send(Envelope { tag, value })
            .map_err(|_| TransportError::Disconnected { peer: to })
    }

    fn receive(&self, from: usize, tag: u64, timeout: Duration) -> TransportResult<f64> {
        self.check_peer(from)?;
        let mut inbox = self.inboxes[from]
            .as_ref()
            .ok_or(TransportError::Disconnected { peer: from })?
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(value) = inbox.take_parked(tag) {
            return Ok(value);
        }

        let deadline = Instant::now().checked_add(timeout);
        loop {
            match inbox.next(deadline) {
                Ok(envelope) if envelope.tag == tag => return Ok(envelope.value),
                Ok(envelope) if envelope.tag < tag => {
                    log::debug!(
                        "rank {} drops stale tag {} from {} while waiting for tag {}",
                        self.world_rank,
                        envelope.tag,
                        from,
                        tag
                    );
                }
                Ok(envelope) => {
                    log::trace!(
                        "rank {} parks tag {} from {} while waiting for tag {}",
                        self.world_rank,
                        envelope.tag,
                        from,
                        tag
                    );
                    inbox.parked.push_back(envelope);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(TransportError::Timeout {
                        peer: from,
                        tag,
                        waited: timeout,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::Disconnected { peer: from })
                }
            }
        }
    }

    #[inline]
    fn next_call_tag(&self) -> u64 {
        self.next_call.fetch_add(1, Ordering::Relaxed)
    }
}
