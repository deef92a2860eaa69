use std::fmt;
use std::io;
use std::thread::{self, JoinHandle};
use crossbeam_channel::Sender;
use log::{debug, trace, warn};
use crate::bitonic::{merge, merge_parallel, Run};
use crate::channel::{CancelToken, Consumer, Producer};
use crate::config::HandOffSettings;
use crate::error::HandOffError;

pub trait Stage: Send + 'static {
    fn name(&self) -> &str;

    /// Runs until cancelled or until a hand-off fails for good.
    fn run(self, cancel: CancelToken) -> StageExit;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandOff {
    Take,
    Put,
}

impl fmt::Display for HandOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandOff::Take => f.write_str("take"),
            HandOff::Put => f.write_str("put"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
    Cancelled,
    Retired { during: HandOff, cause: HandOffError },
}

impl StageExit {
    pub(crate) fn from_failure(name: &str, during: HandOff, cause: HandOffError) -> StageExit {
        match cause {
            HandOffError::Cancelled => {
                trace!("{name} cancelled during {during}");
                StageExit::Cancelled
            }
            cause => {
                warn!("{name} got no value on {during} ({cause}); retiring");
                StageExit::Retired { during, cause }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub stage: String,
    pub exit: StageExit,
}

pub struct StageHandle {
    pub name: String,
    pub thread: JoinHandle<()>,
}

pub fn spawn<S: Stage>(stage: S, cancel: CancelToken, exits: Sender<ExitReport>) -> io::Result<StageHandle> {
    let name = stage.name().to_owned();
    let thread = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let stage_name = stage.name().to_owned();
            let exit = stage.run(cancel);
            // nobody listening once the orchestrator detached
            let _ = exits.send(ExitReport { stage: stage_name, exit });
        })?;
    Ok(StageHandle { name, thread })
}

pub(crate) fn take_with_retry<T>(name: &str, input: &Consumer<T>, settings: &HandOffSettings, cancel: &CancelToken) -> Result<T, HandOffError> {
    let mut attempt = 0;
    loop {
        match input.take(settings.timeout, cancel) {
            Err(HandOffError::TimedOut(_)) if attempt < settings.retries => {
                attempt += 1;
                debug!("{name} take timed out, retry {attempt}/{}", settings.retries);
            }
            result => return result,
        }
    }
}

pub(crate) fn put_with_retry<T>(name: &str, output: &Producer<T>, mut value: T, settings: &HandOffSettings, cancel: &CancelToken) -> Result<(), HandOffError> {
    let mut attempt = 0;
    loop {
        match output.put(value, settings.timeout, cancel) {
            Ok(()) => return Ok(()),
            Err(err) if matches!(err.kind, HandOffError::TimedOut(_)) && attempt < settings.retries => {
                attempt += 1;
                debug!("{name} put timed out, retry {attempt}/{}", settings.retries);
                value = err.value;
            }
            Err(err) => return Err(err.kind),
        }
    }
}

pub struct MergeStage {
    name: String,
    left: Consumer<Run>,
    right: Consumer<Run>,
    output: Producer<Run>,
    hand_off: HandOffSettings,
    parallel: bool,
}

impl MergeStage {
    pub fn new(name: impl Into<String>, left: Consumer<Run>, right: Consumer<Run>, output: Producer<Run>, hand_off: HandOffSettings) -> MergeStage {
        MergeStage {
            name: name.into(),
            left,
            right,
            output,
            hand_off,
            parallel: false,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn process(&self, left: Run, right: Run) -> Run {
        if self.parallel {
            merge_parallel(left, right)
        } else {
            merge(left, right)
        }
    }
}

impl Stage for MergeStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self, cancel: CancelToken) -> StageExit {
        loop {
            let left = match take_with_retry(&self.name, &self.left, &self.hand_off, &cancel) {
                Ok(run) => run,
                Err(cause) => return StageExit::from_failure(&self.name, HandOff::Take, cause),
            };
            let right = match take_with_retry(&self.name, &self.right, &self.hand_off, &cancel) {
                Ok(run) => run,
                Err(cause) => return StageExit::from_failure(&self.name, HandOff::Take, cause),
            };
            trace!("{} merging runs of {} and {}", self.name, left.len(), right.len());

            let merged = self.process(left, right);
            if let Err(cause) = put_with_retry(&self.name, &self.output, merged, &self.hand_off, &cancel) {
                return StageExit::from_failure(&self.name, HandOff::Put, cause);
            }
        }
    }
}
