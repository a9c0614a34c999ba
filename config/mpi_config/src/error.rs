use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("rank {peer} is not a peer of rank {rank} in a world of {world_size}")]
    InvalidPeer {
        rank: usize,
        peer: usize,
        world_size: usize,
    },

    #[error("peer {peer} hung up")]
    Disconnected { peer: usize },

    #[error("nothing from peer {peer} under tag {tag} after {waited:?}")]
    Timeout {
        peer: usize,
        tag: u64,
        waited: Duration,
    },
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;
