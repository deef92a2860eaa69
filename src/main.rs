use std::error::Error;
use std::time::Duration;
use clap::Parser;
use log::{info, LevelFilter};
use bitonic_pipeline::{HandOffSettings, Orchestrator, PipelineConfig, RunSorterKind, ShutdownPolicy, ValueDistribution};
use bitonic_pipeline::config::{HAND_OFF_RETRIES, HAND_OFF_TIMEOUT, LEAVES, N, TIME_ALLOWED};

/// Continuously sorts random arrays through a pipelined bitonic merge tree.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Length of every fully sorted array (power of two)
    #[arg(short = 'n', long, default_value_t = N)]
    array_len: usize,

    /// Number of random sources feeding the merge tree (power of two)
    #[arg(short, long, default_value_t = LEAVES)]
    leaves: usize,

    /// Wall-clock budget of the run, in seconds
    #[arg(short, long, default_value_t = TIME_ALLOWED.as_secs_f64())]
    seconds: f64,

    /// How long a put/take may block, in milliseconds
    #[arg(long, default_value_t = HAND_OFF_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,

    /// Retries after a timed-out hand-off before a stage retires
    #[arg(long, default_value_t = HAND_OFF_RETRIES)]
    retries: u32,

    /// Seed for the random sources; entropy when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// uniform, normal or exponential
    #[arg(long, default_value_t = ValueDistribution::Uniform)]
    distribution: ValueDistribution,

    /// How the first tier sorts its runs: std, parallel or bitonic
    #[arg(long, default_value_t = RunSorterKind::Std)]
    run_sorter: RunSorterKind,

    /// Sort independent halves of each merge on the rayon pool
    #[arg(long)]
    parallel_merge: bool,

    /// Wait this many milliseconds for stages to exit after the run instead of detaching
    #[arg(long)]
    join_ms: Option<u64>,

    /// Size of the rayon pool used by parallel sorting
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, default_value_t = LevelFilter::Warn)]
    log_level: LevelFilter,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(cli.log_level)
        .parse_default_env()
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let shutdown = match cli.join_ms {
        Some(ms) => ShutdownPolicy::Join { grace: Duration::from_millis(ms) },
        None => ShutdownPolicy::Detach,
    };
    let mut config = PipelineConfig::default()
        .with_array_len(cli.array_len)
        .with_leaves(cli.leaves)
        .with_duration(Duration::try_from_secs_f64(cli.seconds)?)
        .with_hand_off(HandOffSettings { timeout: Duration::from_millis(cli.timeout_ms), retries: cli.retries })
        .with_distribution(cli.distribution)
        .with_run_sorter(cli.run_sorter)
        .with_parallel_merge(cli.parallel_merge)
        .with_shutdown(shutdown);
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }

    let outcome = Orchestrator::new(config).run()?;
    println!("{}", outcome.report);
    info!("shutdown: {:?}", outcome.shutdown);

    Ok(())
}
