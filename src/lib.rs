pub mod bitonic;
pub mod channel;
pub mod config;
pub mod error;
pub mod initial;
pub mod orchestrator;
pub mod source;
pub mod stage;
pub mod topology;

pub use bitonic::{bitonic_sort, is_sorted, merge, merge_parallel, Run};
pub use channel::{cancellation, rendezvous, CancelToken, Canceller, Consumer, Producer};
pub use config::{HandOffSettings, PipelineConfig, HAND_OFF_TIMEOUT, LEAVES, N, TIME_ALLOWED};
pub use error::{ConfigError, HandOffError, PipelineError, PutError, TopologyError, VerificationFailure};
pub use initial::{InitialMergeStage, RunSorter, RunSorterKind};
pub use orchestrator::{drive, verify, Orchestrator, RunOutcome, RunReport, ShutdownPolicy, ShutdownSummary};
pub use source::{RandomSource, ValueDistribution};
pub use stage::{spawn, ExitReport, HandOff, MergeStage, Stage, StageExit, StageHandle};
pub use topology::{ChannelId, Pipeline, StageKind, StageNode, TopologyPlan};
