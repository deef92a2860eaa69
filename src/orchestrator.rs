use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use log::{debug, error, info, warn};
use crate::bitonic::Run;
use crate::channel::Consumer;
use crate::config::PipelineConfig;
use crate::error::{HandOffError, PipelineError, VerificationFailure};
use crate::topology::{Pipeline, TopologyPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    #[default]
    Detach,
    Join { grace: Duration },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub cancelled: usize,
    pub retired: Vec<String>,
    pub panicked: Vec<String>,
    pub unresponsive: Vec<String>,
    pub detached: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    pub sorted: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub array_len: usize,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn drained(&self) -> u64 {
        self.sorted + self.failed
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sorted {} arrays (each: {} doubles) in {:.2} seconds",
            self.sorted, self.array_len, self.elapsed.as_secs_f64())
    }
}

pub fn verify(run: &[f64], expected_len: usize) -> Result<(), VerificationFailure> {
    if run.len() != expected_len {
        return Err(VerificationFailure::WrongLength { expected: expected_len, actual: run.len() });
    }
    for index in 1..run.len() {
        if run[index - 1] > run[index] {
            return Err(VerificationFailure::OutOfOrder { index, previous: run[index - 1], next: run[index] });
        }
    }
    Ok(())
}

/// Drains `drain` until `duration` has elapsed, verifying every array.
pub fn drive(drain: &Consumer<Run>, expected_len: usize, duration: Duration, timeout: Duration) -> RunReport {
    let start = Instant::now();
    let mut sorted = 0;
    let mut failed = 0;
    let mut timeouts = 0;

    loop {
        let elapsed = start.elapsed();
        if elapsed >= duration {
            break;
        }
        let wait = timeout.min(duration - elapsed);

        match drain.take_timeout(wait) {
            Ok(run) => match verify(&run, expected_len) {
                Ok(()) => {
                    sorted += 1;
                    debug!("array {} verified", sorted + failed);
                }
                Err(failure) => {
                    failed += 1;
                    error!("array {} failed verification: {}", sorted + failed, failure);
                }
            },
            Err(HandOffError::TimedOut(_)) if wait == timeout => {
                timeouts += 1;
                warn!("no array arrived within {:?}", timeout);
            }
            Err(HandOffError::TimedOut(_)) => {}
            Err(err) => {
                // nothing more can arrive; sit out the rest of the budget
                warn!("final stage gone ({err}); idling for the remaining {:?}", duration - elapsed);
                thread::sleep(duration - elapsed);
                break;
            }
        }
    }

    RunReport { sorted, failed, timeouts, array_len: expected_len, elapsed: start.elapsed() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub report: RunReport,
    pub shutdown: ShutdownSummary,
}

pub struct Orchestrator {
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Orchestrator {
        Orchestrator { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self) -> Result<RunOutcome, PipelineError> {
        let plan = TopologyPlan::binary_tree(&self.config)?;
        info!("merge tree: {} leaves, {} tiers, arrays of {} doubles",
            self.config.leaves, plan.merge_tiers(), plan.array_len());

        let pipeline = Pipeline::launch(&plan, &self.config)?;
        let report = drive(pipeline.drain(), plan.array_len(), self.config.duration, self.config.hand_off.timeout);
        if report.failed > 0 {
            warn!("{} of {} arrays failed verification", report.failed, report.drained());
        }

        let shutdown = pipeline.shutdown(self.config.shutdown);
        Ok(RunOutcome { report, shutdown })
    }
}
