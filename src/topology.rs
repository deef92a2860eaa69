use std::fmt;
use std::time::Instant;
use crossbeam_channel::{unbounded, Receiver};
use log::{debug, info, warn};
use crate::bitonic::Run;
use crate::channel::{cancellation, rendezvous, Canceller, Consumer, Producer};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError, TopologyError};
use crate::initial::InitialMergeStage;
use crate::orchestrator::{ShutdownPolicy, ShutdownSummary};
use crate::source::RandomSource;
use crate::stage::{spawn, ExitReport, MergeStage, StageExit, StageHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub usize);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Source { leaf: usize, chunk_len: usize },
    Initial { leaf: usize, run_len: usize },
    /// `tier` starts at 1 for the merges directly above the initial stages.
    Merge { tier: u32, input_len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageNode {
    pub name: String,
    pub kind: StageKind,
    pub inputs: Vec<ChannelId>,
    pub output: ChannelId,
}

#[derive(Debug, Clone)]
pub struct TopologyPlan {
    channels: usize,
    stages: Vec<StageNode>,
    drain: ChannelId,
    array_len: usize,
}

fn next_channel(count: &mut usize) -> ChannelId {
    let id = ChannelId(*count);
    *count += 1;
    id
}

impl TopologyPlan {
    pub fn binary_tree(config: &PipelineConfig) -> Result<TopologyPlan, ConfigError> {
        config.validate()?;
        let chunk_len = config.chunk_len();
        let run_len = config.run_len();

        let mut channels = 0;
        let mut stages = Vec::new();
        let mut frontier = Vec::with_capacity(config.leaves);

        for leaf in 0..config.leaves {
            let raw = next_channel(&mut channels);
            let run = next_channel(&mut channels);
            stages.push(StageNode {
                name: format!("source-{leaf}"),
                kind: StageKind::Source { leaf, chunk_len },
                inputs: Vec::new(),
                output: raw,
            });
            stages.push(StageNode {
                name: format!("initial-{leaf}"),
                kind: StageKind::Initial { leaf, run_len },
                inputs: vec![raw],
                output: run,
            });
            frontier.push(run);
        }

        let mut tier = 1;
        let mut input_len = run_len;
        while frontier.len() > 1 {
            let mut next = Vec::with_capacity(frontier.len() / 2);
            for (index, pair) in frontier.chunks_exact(2).enumerate() {
                let output = next_channel(&mut channels);
                stages.push(StageNode {
                    name: format!("merge-t{tier}-{index}"),
                    kind: StageKind::Merge { tier, input_len },
                    inputs: pair.to_vec(),
                    output,
                });
                next.push(output);
            }
            frontier = next;
            tier += 1;
            input_len *= 2;
        }

        // leaves >= 1, so exactly one channel is left
        let drain = frontier[0];
        Ok(TopologyPlan { channels, stages, drain, array_len: config.array_len })
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn stages(&self) -> &[StageNode] {
        &self.stages
    }

    pub fn drain(&self) -> ChannelId {
        self.drain
    }

    pub fn array_len(&self) -> usize {
        self.array_len
    }

    pub fn merge_tiers(&self) -> u32 {
        self.stages.iter()
            .filter_map(|node| match node.kind {
                StageKind::Merge { tier, .. } => Some(tier),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Every channel has exactly one writer and one reader. The drain's reader is the orchestrator.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut writers = vec![0; self.channels];
        let mut readers = vec![0; self.channels];

        for node in &self.stages {
            let unknown = |channel: &ChannelId| TopologyError::UnknownChannel { stage: node.name.clone(), channel: channel.0 };
            *writers.get_mut(node.output.0).ok_or_else(|| unknown(&node.output))? += 1;
            for input in &node.inputs {
                *readers.get_mut(input.0).ok_or_else(|| unknown(input))? += 1;
            }
        }
        *readers.get_mut(self.drain.0).ok_or(TopologyError::UnknownChannel { stage: "drain".to_owned(), channel: self.drain.0 })? += 1;

        for id in 0..self.channels {
            if writers[id] != 1 {
                return Err(TopologyError::Writers(id, writers[id]));
            }
            if readers[id] != 1 {
                return Err(TopologyError::Readers(id, readers[id]));
            }
        }
        Ok(())
    }
}

fn take_endpoint<E>(slots: &mut [Option<E>], id: ChannelId) -> Result<E, TopologyError> {
    slots.get_mut(id.0)
        .and_then(Option::take)
        .ok_or(TopologyError::EndpointTaken(id.0))
}

pub struct Pipeline {
    drain: Consumer<Run>,
    stages: Vec<StageHandle>,
    canceller: Canceller,
    exits: Receiver<ExitReport>,
}

impl Pipeline {
    pub fn launch(plan: &TopologyPlan, config: &PipelineConfig) -> Result<Pipeline, PipelineError> {
        plan.validate()?;

        let mut producers: Vec<Option<Producer<Run>>> = Vec::with_capacity(plan.channel_count());
        let mut consumers: Vec<Option<Consumer<Run>>> = Vec::with_capacity(plan.channel_count());
        for _ in 0..plan.channel_count() {
            let (producer, consumer) = rendezvous();
            producers.push(Some(producer));
            consumers.push(Some(consumer));
        }

        // dropping the canceller on an early return stops whatever was already spawned
        let (canceller, token) = cancellation();
        let (exit_tx, exits) = unbounded();
        let mut stages = Vec::with_capacity(plan.stages().len());

        for node in plan.stages() {
            let output = take_endpoint(&mut producers, node.output)?;
            let mut inputs = Vec::with_capacity(node.inputs.len());
            for input in &node.inputs {
                inputs.push(take_endpoint(&mut consumers, *input)?);
            }
            let mut inputs = inputs.into_iter();

            let handle = match node.kind {
                StageKind::Source { leaf, chunk_len } => {
                    let mut source = RandomSource::new(node.name.as_str(), chunk_len, output, config.hand_off)
                        .with_distribution(config.distribution);
                    if let Some(seed) = config.seed {
                        source = source.with_seed(seed.wrapping_add(leaf as u64));
                    }
                    spawn(source, token.clone(), exit_tx.clone())?
                }
                StageKind::Initial { .. } => {
                    let input = inputs.next().ok_or(TopologyError::Readers(node.output.0, 0))?;
                    let stage = InitialMergeStage::new(node.name.as_str(), input, output, config.hand_off)
                        .with_sorter(config.run_sorter.build());
                    spawn(stage, token.clone(), exit_tx.clone())?
                }
                StageKind::Merge { .. } => {
                    let (left, right) = match (inputs.next(), inputs.next()) {
                        (Some(left), Some(right)) => (left, right),
                        _ => return Err(TopologyError::Readers(node.output.0, 0).into()),
                    };
                    let stage = MergeStage::new(node.name.as_str(), left, right, output, config.hand_off)
                        .parallel(config.parallel_merge);
                    spawn(stage, token.clone(), exit_tx.clone())?
                }
            };
            debug!("started {} ({:?})", handle.name, node.kind);
            stages.push(handle);
        }

        let drain = take_endpoint(&mut consumers, plan.drain())?;
        info!("pipeline running: {} stages over {} channels", stages.len(), plan.channel_count());
        Ok(Pipeline { drain, stages, canceller, exits })
    }

    pub fn drain(&self) -> &Consumer<Run> {
        &self.drain
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|handle| handle.name.as_str())
    }

    pub fn shutdown(self, policy: ShutdownPolicy) -> ShutdownSummary {
        let Pipeline { drain, stages, canceller, exits } = self;
        canceller.cancel();

        let mut summary = ShutdownSummary::default();
        let mut record = |report: ExitReport| match report.exit {
            StageExit::Cancelled => summary.cancelled += 1,
            StageExit::Retired { .. } => summary.retired.push(report.stage),
        };

        match policy {
            ShutdownPolicy::Detach => {
                exits.try_iter().for_each(&mut record);
                drop(record);
                summary.detached = stages.len() - summary.cancelled - summary.retired.len();
                info!("detached from {} stages", summary.detached);
            }
            ShutdownPolicy::Join { grace } => {
                let deadline = Instant::now() + grace;
                let mut pending = stages.len();
                while pending > 0 {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match exits.recv_timeout(remaining) {
                        Ok(report) => {
                            record(report);
                            pending -= 1;
                        }
                        Err(_) => break,
                    }
                }
                drop(record);

                for handle in stages {
                    if !handle.thread.is_finished() {
                        summary.unresponsive.push(handle.name);
                    } else if handle.thread.join().is_err() {
                        warn!("{} panicked", handle.name);
                        summary.panicked.push(handle.name);
                    }
                }
                info!("joined stages: {} cancelled, {} retired, {} unresponsive",
                    summary.cancelled, summary.retired.len(), summary.unresponsive.len());
            }
        }
        drop(drain);
        summary
    }
}
