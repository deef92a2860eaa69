use std::fmt;
use std::str::FromStr;
use log::{debug, trace};
use rand::distributions::{Distribution, Standard};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Exp1, StandardNormal};
use crate::bitonic::Run;
use crate::channel::{CancelToken, Producer};
use crate::config::HandOffSettings;
use crate::error::HandOffError;
use crate::stage::{HandOff, Stage, StageExit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueDistribution {
    #[default]
    Uniform,
    Normal,
    Exponential,
}

impl ValueDistribution {
    pub fn sample_chunk(&self, rng: &mut StdRng, len: usize) -> Run {
        match self {
            ValueDistribution::Uniform => Distribution::<f64>::sample_iter(Standard, rng).take(len).collect(),
            ValueDistribution::Normal => Distribution::<f64>::sample_iter(StandardNormal, rng).take(len).collect(),
            ValueDistribution::Exponential => Distribution::<f64>::sample_iter(Exp1, rng).take(len).collect(),
        }
    }
}

impl FromStr for ValueDistribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(ValueDistribution::Uniform),
            "normal" => Ok(ValueDistribution::Normal),
            "exponential" | "exp" => Ok(ValueDistribution::Exponential),
            other => Err(format!("unknown distribution '{other}' (expected uniform, normal or exponential)")),
        }
    }
}

impl fmt::Display for ValueDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueDistribution::Uniform => "uniform",
            ValueDistribution::Normal => "normal",
            ValueDistribution::Exponential => "exponential",
        };
        f.write_str(name)
    }
}

pub struct RandomSource {
    name: String,
    chunk_len: usize,
    output: Producer<Run>,
    rng: StdRng,
    distribution: ValueDistribution,
    hand_off: HandOffSettings,
}

impl RandomSource {
    pub fn new(name: impl Into<String>, chunk_len: usize, output: Producer<Run>, hand_off: HandOffSettings) -> RandomSource {
        RandomSource {
            name: name.into(),
            chunk_len,
            output,
            rng: StdRng::from_entropy(),
            distribution: ValueDistribution::Uniform,
            hand_off,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_distribution(mut self, distribution: ValueDistribution) -> Self {
        self.distribution = distribution;
        self
    }
}

impl Stage for RandomSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(mut self, cancel: CancelToken) -> StageExit {
        debug!("{} producing {} {} values per chunk", self.name, self.chunk_len, self.distribution);
        loop {
            let mut chunk = self.distribution.sample_chunk(&mut self.rng, self.chunk_len);
            // a busy consumer is not a failure; only cancellation or a dropped reader stops a source
            loop {
                match self.output.put(chunk, self.hand_off.timeout, &cancel) {
                    Ok(()) => break,
                    Err(err) if matches!(err.kind, HandOffError::TimedOut(_)) => {
                        debug!("{} still waiting to hand off a chunk ({})", self.name, err.kind);
                        chunk = err.value;
                    }
                    Err(err) => return StageExit::from_failure(&self.name, HandOff::Put, err.kind),
                }
            }
            trace!("{} handed off a chunk", self.name);
        }
    }
}
