use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("invalid topology (rank {rank}, size {size}, coordinator {coordinator}): {reason}")]
    InvalidTopology {
        rank: usize,
        size: usize,
        coordinator: usize,
        reason: String,
    },
}

pub type TopologyResult<T> = std::result::Result<T, TopologyError>;

impl TopologyError {
    #[inline]
    pub(crate) fn invalid(
        rank: usize,
        size: usize,
        coordinator: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTopology {
            rank,
            size,
            coordinator,
            reason: reason.into(),
        }
    }
}
