use mpi_config::TransportError;
use thiserror::Error;
use topology::TopologyError;

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error(transparent)]
    InvalidTopology(#[from] TopologyError),

    #[error("peer {partner} unavailable in round {round}")]
    PeerUnavailable {
        round: usize,
        partner: usize,
        #[source]
        source: TransportError,
    },

    #[error("transport failure")]
    Transport(#[from] TransportError),

    #[error("failed to start worker threads")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type ReduceResult<T> = std::result::Result<T, ReduceError>;

impl ReduceError {
    /// Attribute a transport failure to the round and partner it happened with.
    /// A silent or vanished partner becomes [`ReduceError::PeerUnavailable`].
    pub(crate) fn in_round(source: TransportError, round: usize, partner: usize) -> Self {
        match source {
            TransportError::Timeout { .. } | TransportError::Disconnected { .. } => {
                Self::PeerUnavailable {
                    round,
                    partner,
                    source,
                }
            }
            other => Self::Transport(other),
        }
    }
}
