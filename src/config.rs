use std::time::Duration;

/// Knobs of a [`Reducer`](crate::Reducer), identical on every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReduceConfig {
    /// rank that ends up holding the sum
    pub coordinator: usize,
    /// how long a receiver waits for its partner before giving up on the call
    pub timeout: Duration,
}

impl Default for ReduceConfig {
    #[inline]
    fn default() -> Self {
        Self {
            coordinator: 0,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

impl ReduceConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    #[inline]
    pub fn new(coordinator: usize, timeout: Duration) -> Self {
        Self {
            coordinator,
            timeout,
        }
    }

    #[inline]
    pub fn with_coordinator(mut self, coordinator: usize) -> Self {
        self.coordinator = coordinator;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
