use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandOffError {
    #[error("hand-off timed out after {0:?}")]
    TimedOut(Duration),
    #[error("hand-off cancelled")]
    Cancelled,
    #[error("peer endpoint disconnected")]
    Disconnected,
}

/// A failed `put`. The value is handed back to the caller.
#[derive(Error)]
#[error("{kind}")]
pub struct PutError<T> {
    pub kind: HandOffError,
    pub value: T,
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutError").field("kind", &self.kind).finish_non_exhaustive()
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum VerificationFailure {
    #[error("expected {expected} elements, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("not ascending at index {index}: {previous} > {next}")]
    OutOfOrder { index: usize, previous: f64, next: f64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("array length {0} is not a power of two")]
    ArrayLenNotPowerOfTwo(usize),
    #[error("leaf count {0} is not a power of two")]
    LeavesNotPowerOfTwo(usize),
    #[error("array length {array_len} is too short for {leaves} leaves")]
    ArrayTooShort { array_len: usize, leaves: usize },
    #[error("run duration must be non-zero")]
    ZeroDuration,
    #[error("hand-off timeout must be non-zero")]
    ZeroTimeout,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("channel {0} has {1} writers, expected exactly one")]
    Writers(usize, usize),
    #[error("channel {0} has {1} readers, expected exactly one")]
    Readers(usize, usize),
    #[error("{stage} refers to unknown channel {channel}")]
    UnknownChannel { stage: String, channel: usize },
    #[error("endpoint of channel {0} was already handed out")]
    EndpointTaken(usize),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("failed to spawn stage thread: {0}")]
    Spawn(#[from] io::Error),
}
