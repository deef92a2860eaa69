use std::fmt;
use std::str::FromStr;
use log::trace;
use rayon::slice::ParallelSliceMut;
use crate::bitonic::{self, Run};
use crate::channel::{CancelToken, Consumer, Producer};
use crate::config::HandOffSettings;
use crate::stage::{put_with_retry, take_with_retry, HandOff, Stage, StageExit};

pub trait RunSorter: Send + 'static {
    fn sort_run(&mut self, run: &mut [f64]);
}

#[derive(Debug, Default)]
pub struct StdSorter;

#[derive(Debug, Default)]
pub struct ParallelSorter;

#[derive(Debug, Default)]
pub struct BitonicSorter;

impl RunSorter for StdSorter {
    fn sort_run(&mut self, run: &mut [f64]) {
        run.sort_unstable_by(f64::total_cmp);
    }
}

impl RunSorter for ParallelSorter {
    fn sort_run(&mut self, run: &mut [f64]) {
        run.par_sort_unstable_by(f64::total_cmp);
    }
}

impl RunSorter for BitonicSorter {
    fn sort_run(&mut self, run: &mut [f64]) {
        bitonic::sort(run);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunSorterKind {
    #[default]
    Std,
    Parallel,
    Bitonic,
}

impl RunSorterKind {
    pub fn build(&self) -> Box<dyn RunSorter> {
        match self {
            RunSorterKind::Std => Box::new(StdSorter),
            RunSorterKind::Parallel => Box::new(ParallelSorter),
            RunSorterKind::Bitonic => Box::new(BitonicSorter),
        }
    }
}

impl FromStr for RunSorterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "std" => Ok(RunSorterKind::Std),
            "parallel" => Ok(RunSorterKind::Parallel),
            "bitonic" => Ok(RunSorterKind::Bitonic),
            other => Err(format!("unknown run sorter '{other}' (expected std, parallel or bitonic)")),
        }
    }
}

impl fmt::Display for RunSorterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunSorterKind::Std => "std",
            RunSorterKind::Parallel => "parallel",
            RunSorterKind::Bitonic => "bitonic",
        };
        f.write_str(name)
    }
}

pub struct InitialMergeStage {
    name: String,
    input: Consumer<Run>,
    output: Producer<Run>,
    sorter: Box<dyn RunSorter>,
    hand_off: HandOffSettings,
}

impl InitialMergeStage {
    pub fn new(name: impl Into<String>, input: Consumer<Run>, output: Producer<Run>, hand_off: HandOffSettings) -> InitialMergeStage {
        InitialMergeStage {
            name: name.into(),
            input,
            output,
            sorter: Box::new(StdSorter),
            hand_off,
        }
    }

    pub fn with_sorter(mut self, sorter: Box<dyn RunSorter>) -> Self {
        self.sorter = sorter;
        self
    }
}

impl Stage for InitialMergeStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(mut self, cancel: CancelToken) -> StageExit {
        loop {
            let mut run = match take_with_retry(&self.name, &self.input, &self.hand_off, &cancel) {
                Ok(chunk) => chunk,
                Err(cause) => return StageExit::from_failure(&self.name, HandOff::Take, cause),
            };
            let mut second = match take_with_retry(&self.name, &self.input, &self.hand_off, &cancel) {
                Ok(chunk) => chunk,
                Err(cause) => return StageExit::from_failure(&self.name, HandOff::Take, cause),
            };
            run.append(&mut second);
            self.sorter.sort_run(&mut run);
            trace!("{} sorted a run of {}", self.name, run.len());

            if let Err(cause) = put_with_retry(&self.name, &self.output, run, &self.hand_off, &cancel) {
                return StageExit::from_failure(&self.name, HandOff::Put, cause);
            }
        }
    }
}
