#[cfg(test)]
mod pipeline {
    use std::sync::{Mutex, Once};
    use std::thread;
    use std::time::{Duration, Instant};
    use crossbeam_channel::unbounded;
    use lazy_static::lazy_static;
    use log::{Level, LevelFilter, Log, Metadata, Record};

    use bitonic_pipeline::{cancellation, drive, rendezvous, spawn, CancelToken, HandOff, HandOffError, HandOffSettings,
                           MergeStage, Orchestrator, PipelineConfig, Producer, Run, RunSorterKind, ShutdownPolicy, Stage,
                           StageExit, ValueDistribution};

    const LONG: Duration = Duration::from_secs(5);

    lazy_static! {
        static ref RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());
    }

    struct CapturedLog;

    static CAPTURED_LOG: CapturedLog = CapturedLog;
    static INSTALL: Once = Once::new();

    impl Log for CapturedLog {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Warn
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                RECORDS.lock().unwrap().push((record.level(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    fn capture_logs() {
        INSTALL.call_once(|| {
            log::set_logger(&CAPTURED_LOG).unwrap();
            log::set_max_level(LevelFilter::Warn);
        });
    }

    fn logged_errors(needle: &str) -> usize {
        RECORDS.lock().unwrap().iter()
            .filter(|(level, message)| *level == Level::Error && message.contains(needle))
            .count()
    }

    fn feed(producer: Producer<Run>, run: Run, cancel: CancelToken) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            producer.put(run, LONG, &cancel).unwrap();
        })
    }

    #[test]
    fn two_tier_tree_merges_fixed_runs() {
        let settings = HandOffSettings::new(LONG);
        let (canceller, token) = cancellation();
        let (exit_tx, exit_rx) = unbounded();

        let (in0_tx, in0_rx) = rendezvous();
        let (in1_tx, in1_rx) = rendezvous();
        let (in2_tx, in2_rx) = rendezvous();
        let (in3_tx, in3_rx) = rendezvous();
        let (mid0_tx, mid0_rx) = rendezvous();
        let (mid1_tx, mid1_rx) = rendezvous();
        let (out_tx, out_rx) = rendezvous();

        let stages = vec![
            spawn(MergeStage::new("merge-t1-0", in0_rx, in1_rx, mid0_tx, settings), token.clone(), exit_tx.clone()).unwrap(),
            spawn(MergeStage::new("merge-t1-1", in2_rx, in3_rx, mid1_tx, settings), token.clone(), exit_tx.clone()).unwrap(),
            spawn(MergeStage::new("merge-t2-0", mid0_rx, mid1_rx, out_tx, settings), token.clone(), exit_tx).unwrap(),
        ];

        // feed in reverse to show the result does not depend on arrival order
        let feeders = vec![
            feed(in3_tx, vec![12.0, 13.0, 14.0, 15.0], token.clone()),
            feed(in2_tx, vec![0.0, 9.0, 10.0, 11.0], token.clone()),
            feed(in1_tx, vec![2.0, 4.0, 6.0, 8.0], token.clone()),
            feed(in0_tx, vec![1.0, 3.0, 5.0, 7.0], token.clone()),
        ];

        let result = out_rx.take_timeout(LONG).unwrap();
        let expected: Run = (0..16).map(|v| v as f64).collect();
        assert_eq!(result, expected);

        for feeder in feeders {
            feeder.join().unwrap();
        }
        canceller.cancel();
        for handle in stages {
            handle.thread.join().unwrap();
        }
        let exits: Vec<StageExit> = exit_rx.try_iter().map(|report| report.exit).collect();
        assert_eq!(exits.len(), 3);
    }

    #[test]
    fn merge_stage_with_silent_partner_retires() {
        let timeout = Duration::from_millis(100);
        let (left_tx, left_rx) = rendezvous();
        let (_right_tx, right_rx) = rendezvous::<Run>();
        let (out_tx, out_rx) = rendezvous();
        let (_canceller, token) = cancellation();
        let stage = MergeStage::new("merge-t1-0", left_rx, right_rx, out_tx, HandOffSettings::new(timeout));

        let start = Instant::now();
        let worker = thread::spawn(move || stage.run(token));
        let (_keep, idle) = cancellation();
        left_tx.put(vec![4.0, 5.0], LONG, &idle).unwrap();

        let exit = worker.join().unwrap();
        assert_eq!(exit, StageExit::Retired { during: HandOff::Take, cause: HandOffError::TimedOut(timeout) });
        assert!(start.elapsed() < LONG);

        // the orchestrator side does not hang either
        let report = drive(&out_rx, 4, Duration::from_millis(300), timeout);
        assert_eq!(report.drained(), 0);
    }

    #[test]
    fn drain_times_out_when_no_stage_completes() {
        let timeout = Duration::from_millis(50);
        let (_left_tx, left_rx) = rendezvous::<Run>();
        let (_right_tx, right_rx) = rendezvous::<Run>();
        let (out_tx, out_rx) = rendezvous();
        let (canceller, token) = cancellation();
        let stage = MergeStage::new("merge-t1-0", left_rx, right_rx, out_tx, HandOffSettings::new(LONG));
        let worker = thread::spawn(move || stage.run(token));

        let start = Instant::now();
        let report = drive(&out_rx, 4, Duration::from_millis(250), timeout);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(report.drained(), 0);
        assert!(report.timeouts > 0);

        canceller.cancel();
        assert_eq!(worker.join().unwrap(), StageExit::Cancelled);
    }

    // every other run is descending
    struct FaultyStage {
        output: Producer<Run>,
    }

    impl Stage for FaultyStage {
        fn name(&self) -> &str {
            "faulty"
        }

        fn run(self, cancel: CancelToken) -> StageExit {
            let mut cycle = 0;
            loop {
                let run = if cycle % 2 == 0 { vec![1.0, 2.0, 3.0, 4.0] } else { vec![4.0, 3.0, 2.0, 1.0] };
                if let Err(err) = self.output.put(run, LONG, &cancel) {
                    return match err.kind {
                        HandOffError::Cancelled => StageExit::Cancelled,
                        cause => StageExit::Retired { during: HandOff::Put, cause },
                    };
                }
                cycle += 1;
            }
        }
    }

    #[test]
    fn failed_verifications_are_not_counted_as_sorted() {
        capture_logs();
        let (out_tx, out_rx) = rendezvous();
        let (canceller, token) = cancellation();
        let (exit_tx, _exit_rx) = unbounded();
        let handle = spawn(FaultyStage { output: out_tx }, token, exit_tx).unwrap();

        let report = drive(&out_rx, 4, Duration::from_millis(200), Duration::from_millis(100));
        canceller.cancel();
        handle.thread.join().unwrap();

        assert!(report.failed > 0);
        assert!(report.sorted > 0);
        assert!(report.sorted.abs_diff(report.failed) <= 1);
        // only this test feeds the drain unsorted arrays
        assert_eq!(logged_errors("failed verification") as u64, report.failed);
    }

    #[test]
    fn orchestrator_runs_for_its_budget() {
        let config = PipelineConfig::default()
            .with_array_len(1 << 12)
            .with_leaves(4)
            .with_duration(Duration::from_millis(500))
            .with_hand_off(HandOffSettings::new(Duration::from_secs(2)))
            .with_seed(12345)
            .with_shutdown(ShutdownPolicy::Join { grace: LONG });

        let start = Instant::now();
        let outcome = Orchestrator::new(config).run().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));

        let report = outcome.report;
        assert!(report.sorted > 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.array_len, 1 << 12);
        assert!(report.to_string().starts_with(&format!("sorted {} arrays (each: 4096 doubles) in ", report.sorted)));

        let shutdown = outcome.shutdown;
        assert_eq!(shutdown.cancelled + shutdown.retired.len(), 11);
        assert!(shutdown.unresponsive.is_empty());
    }

    #[test]
    fn orchestrator_with_alternative_stages() {
        let config = PipelineConfig::default()
            .with_array_len(1 << 14)
            .with_leaves(8)
            .with_duration(Duration::from_millis(300))
            .with_hand_off(HandOffSettings::new(Duration::from_secs(2)))
            .with_distribution(ValueDistribution::Normal)
            .with_run_sorter(RunSorterKind::Bitonic)
            .with_parallel_merge(true)
            .with_shutdown(ShutdownPolicy::Join { grace: LONG });

        let outcome = Orchestrator::new(config).run().unwrap();
        assert!(outcome.report.sorted > 0);
        assert_eq!(outcome.report.failed, 0);
        assert_eq!(outcome.shutdown.cancelled + outcome.shutdown.retired.len(), 23);
    }

    #[test]
    fn orchestrator_rejects_invalid_config() {
        let config = PipelineConfig::default().with_array_len(100);
        assert!(Orchestrator::new(config).run().is_err());
    }
}
