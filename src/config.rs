use std::time::Duration;
use crate::error::ConfigError;
use crate::initial::RunSorterKind;
use crate::orchestrator::ShutdownPolicy;
use crate::source::ValueDistribution;

pub const N: usize = 1 << 22;  // size of the final sorted array
pub const LEAVES: usize = 4;
pub const TIME_ALLOWED: Duration = Duration::from_secs(10);
pub const HAND_OFF_TIMEOUT: Duration = Duration::from_secs(10);
pub const HAND_OFF_RETRIES: u32 = 0;
pub const PARALLEL_THRESHOLD: usize = 1 << 14;

pub(crate) const fn is_power_of_two(x: usize) -> bool {
    (x!=0) && ((x & (x-1)) == 0)
}

const _: () = {
    assert!(is_power_of_two(N), "N must be a power of two");
    assert!(is_power_of_two(LEAVES), "LEAVES must be a power of two");
    assert!(N >= 2 * LEAVES, "every leaf needs a run of at least two elements");
    assert!(is_power_of_two(PARALLEL_THRESHOLD), "PARALLEL_THRESHOLD must be a power of two");
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandOffSettings {
    pub timeout: Duration,
    /// Extra attempts after a timed-out hand-off. Zero makes the first timeout terminal.
    pub retries: u32,
}

impl Default for HandOffSettings {
    fn default() -> Self {
        HandOffSettings {
            timeout: HAND_OFF_TIMEOUT,
            retries: HAND_OFF_RETRIES,
        }
    }
}

impl HandOffSettings {
    pub fn new(timeout: Duration) -> HandOffSettings {
        HandOffSettings { timeout, retries: 0 }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub array_len: usize,
    pub leaves: usize,
    pub duration: Duration,
    pub hand_off: HandOffSettings,
    pub seed: Option<u64>,
    pub distribution: ValueDistribution,
    pub run_sorter: RunSorterKind,
    pub parallel_merge: bool,
    pub shutdown: ShutdownPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            array_len: N,
            leaves: LEAVES,
            duration: TIME_ALLOWED,
            hand_off: HandOffSettings::default(),
            seed: None,
            distribution: ValueDistribution::Uniform,
            run_sorter: RunSorterKind::Std,
            parallel_merge: false,
            shutdown: ShutdownPolicy::Detach,
        }
    }
}

impl PipelineConfig {
    pub fn with_array_len(mut self, array_len: usize) -> Self {
        self.array_len = array_len;
        self
    }

    pub fn with_leaves(mut self, leaves: usize) -> Self {
        self.leaves = leaves;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_hand_off(mut self, hand_off: HandOffSettings) -> Self {
        self.hand_off = hand_off;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_distribution(mut self, distribution: ValueDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_run_sorter(mut self, run_sorter: RunSorterKind) -> Self {
        self.run_sorter = run_sorter;
        self
    }

    pub fn with_parallel_merge(mut self, parallel_merge: bool) -> Self {
        self.parallel_merge = parallel_merge;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownPolicy) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn run_len(&self) -> usize {
        self.array_len / self.leaves
    }

    pub fn chunk_len(&self) -> usize {
        self.run_len() / 2
    }

    pub fn tiers(&self) -> u32 {
        self.leaves.checked_ilog2().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_power_of_two(self.array_len) {
            return Err(ConfigError::ArrayLenNotPowerOfTwo(self.array_len));
        }
        if !is_power_of_two(self.leaves) {
            return Err(ConfigError::LeavesNotPowerOfTwo(self.leaves));
        }
        if self.array_len < 2 * self.leaves {
            return Err(ConfigError::ArrayTooShort { array_len: self.array_len, leaves: self.leaves });
        }
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        if self.hand_off.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}
