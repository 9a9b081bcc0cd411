//! The fuzzing campaign: a provided-inputs phase followed by a mix of
//! generation and mutation rounds against a SAT solver, ending with the
//! best crashing inputs saved to the output directory.
//!
//! The driver only sees the [`Campaign`] trait. `start` blocks for the whole
//! campaign; `shutdown` may be called from another thread at any time and
//! makes `start` return promptly through the shared [`ShutdownToken`].

use crate::config::{CoverageType, FuzzerConfig};
use crate::corpus::{CrashCorpus, OutputDir, RunOutcome, collect_seed_files, input_hash};
use crate::coverage::{CoverageProbe, GcovProbe, NullProbe};
use crate::error::FuzzError;
use crate::executor::{CommandExecutor, CommandExecutorConfig, ExecutionStatus, Executor};
use crate::feedback::{Feedback, MutationFeedback};
use crate::generator::WeightedGenerator;
use crate::input::CnfFile;
use crate::mutator::WeightedMutator;
use crate::observer::{Observer, StderrObserver};
use crate::oracle::{Oracle, ProgramCrash, SanitizerOracle};
use crate::scheduler::{QueueScheduler, Scheduler};
use crate::shutdown::ShutdownToken;
use log::{debug, error, info, warn};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What the driver needs from a fuzzing engine.
pub trait Campaign: Send + Sync {
    /// Runs the campaign until it is cancelled or reaches its iteration cap.
    fn start(&self) -> Result<CampaignSummary, FuzzError>;

    /// Stops the campaign and saves its results. Only the first call does
    /// any work.
    fn shutdown(&self) -> Result<ShutdownReport, FuzzError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignSummary {
    pub iterations: u64,
    pub distinct_crashes: usize,
    pub total_crashes: usize,
    /// `true` if the campaign stopped because it was cancelled.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReport {
    /// Results were saved; `saved` lists the file names kept.
    Completed { saved: Vec<String> },
    AlreadyFinished,
}

/// Where the campaign points the solver and where it takes seeds from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignArgs {
    pub sut_dir: PathBuf,
    pub inputs_dir: PathBuf,
    pub seed: Option<String>,
}

/// Parses a decimal seed, falling back to `default` when none was given.
/// Negative seeds are taken bit for bit as their two's complement.
pub fn parse_seed(seed: Option<&str>, default: u64) -> Result<u64, FuzzError> {
    let Some(text) = seed else {
        return Ok(default);
    };
    let digits = text.trim();
    digits
        .parse::<u64>()
        .or_else(|_| digits.parse::<i64>().map(|signed| signed as u64))
        .map_err(|_| FuzzError::InvalidSeed(text.to_string()))
}

fn should_report_progress(iteration: u64) -> bool {
    let freq = if iteration < 10 {
        1
    } else if iteration < 100 {
        10
    } else if iteration > 1000 {
        500
    } else {
        100
    };
    iteration % freq == 0
}

struct CampaignState {
    rng: ChaCha8Rng,
    generator: WeightedGenerator<ChaCha8Rng>,
    mutator: WeightedMutator<ChaCha8Rng>,
    executor: CommandExecutor,
    stderr_observer: StderrObserver,
    oracle: SanitizerOracle,
    feedback: MutationFeedback,
    probe: Box<dyn CoverageProbe>,
    crashes: CrashCorpus,
    scheduler: QueueScheduler,
}

pub struct Fuzzer {
    sut_dir: PathBuf,
    inputs_dir: PathBuf,
    config: FuzzerConfig,
    output: OutputDir,
    token: ShutdownToken,
    state: Mutex<CampaignState>,
    /// Set once the results have been saved. Held for the whole save.
    finished: Mutex<bool>,
}

impl Fuzzer {
    /// Prepares a campaign. Recreates the output directory as a side effect.
    pub fn new(
        args: CampaignArgs,
        config: FuzzerConfig,
        token: ShutdownToken,
    ) -> Result<Self, FuzzError> {
        config.validate()?;
        let seed = parse_seed(args.seed.as_deref(), config.default_seed)?;
        info!("seeding campaign with {seed}");

        let output = OutputDir::recreate(&config.output_dir)?;

        let script = args.sut_dir.join(&config.solver_script);
        let executor = CommandExecutor::new(CommandExecutorConfig::for_script(script))
            .with_shutdown_token(token.clone());

        let probe: Box<dyn CoverageProbe> = match config.coverage.coverage_type {
            CoverageType::Gcov => Box::new(GcovProbe::new(
                config.coverage.gcov_binary.clone(),
                config.coverage.reset_counters,
            )),
            CoverageType::None => Box::new(NullProbe),
        };

        let state = CampaignState {
            rng: ChaCha8Rng::seed_from_u64(seed),
            generator: WeightedGenerator::standard()?,
            mutator: WeightedMutator::standard()?,
            executor,
            stderr_observer: StderrObserver::new(),
            oracle: SanitizerOracle::new(),
            feedback: MutationFeedback::new(),
            probe,
            crashes: CrashCorpus::new(),
            scheduler: QueueScheduler::new(),
        };

        Ok(Self {
            sut_dir: args.sut_dir,
            inputs_dir: args.inputs_dir,
            config,
            output,
            token,
            state: Mutex::new(state),
            finished: Mutex::new(false),
        })
    }

    pub fn output_dir(&self) -> &Path {
        self.output.path()
    }

    pub fn shutdown_token(&self) -> &ShutdownToken {
        &self.token
    }

    /// (distinct crash kinds, total crashing inputs) found so far.
    pub fn crash_counts(&self) -> (usize, usize) {
        let state = self.lock_state();
        (
            state.crashes.distinct_crashes(),
            state.crashes.total_crashes(),
        )
    }

    fn lock_state(&self) -> MutexGuard<'_, CampaignState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the campaign state unless cancellation was requested. Every
    /// write to the output directory during `start` happens under this
    /// lock, so nothing is written once `shutdown` has saved the results.
    fn lock_unless_cancelled(&self) -> Option<MutexGuard<'_, CampaignState>> {
        if self.token.is_triggered() {
            return None;
        }
        let guard = self.lock_state();
        if self.token.is_triggered() {
            return None;
        }
        Some(guard)
    }

    fn write_placeholders(&self) -> Result<(), FuzzError> {
        for i in 0..self.config.max_saved_tests {
            let Some(mut guard) = self.lock_unless_cancelled() else {
                return Ok(());
            };
            let state = &mut *guard;
            let bytes = state.generator.generate(&mut state.rng);
            self.output.write_placeholder(i, &bytes)?;
        }
        Ok(())
    }

    fn run_provided_inputs(&self) -> Result<(), FuzzError> {
        let seeds = collect_seed_files(&self.inputs_dir)?;
        info!(
            "running {} provided inputs from {:?}",
            seeds.len(),
            self.inputs_dir
        );
        for seed in seeds {
            let Some(mut guard) = self.lock_unless_cancelled() else {
                return Ok(());
            };
            if let Err(e) = self.provided_input_round(&mut guard, &seed) {
                error!("provided input {seed:?} failed: {e}");
            }
        }
        Ok(())
    }

    /// Runs the solver on `input` and returns the crash it caused, if any.
    fn execute(
        &self,
        state: &mut CampaignState,
        input: &Vec<u8>,
        timeout: Duration,
    ) -> Option<ProgramCrash> {
        let status = {
            let mut observers: Vec<&mut dyn Observer> = vec![&mut state.stderr_observer];
            state.executor.execute_sync(input, timeout, &mut observers)
        };
        match &status {
            ExecutionStatus::Cancelled => return None,
            ExecutionStatus::ObserverError(msg) | ExecutionStatus::Other(msg) => {
                warn!("solver run failed: {msg}");
            }
            _ => {}
        }

        // Counters are flushed by the solver's exit handlers.
        self.token.sleep(self.config.timeouts.pre_coverage_delay());

        let stderr = state.stderr_observer.take();
        let crash = state.oracle.examine(&status, &stderr);
        if crash.is_none() {
            if let Err(e) = state.probe.discard(&self.sut_dir) {
                debug!("could not discard coverage counters: {e}");
            }
        }
        crash
    }

    /// Whether `input` already produced `crash`. Repeats are neither saved
    /// nor queued, and their coverage counters are dropped.
    fn already_recorded(
        &self,
        state: &mut CampaignState,
        crash: &ProgramCrash,
        input: &[u8],
    ) -> bool {
        if !state.crashes.is_duplicate(crash, &input_hash(input)) {
            return false;
        }
        if let Err(e) = state.probe.discard(&self.sut_dir) {
            debug!("could not discard coverage counters: {e}");
        }
        true
    }

    fn measure_coverage(&self, state: &mut CampaignState) -> f64 {
        match state.probe.measure(&self.sut_dir) {
            Ok(coverage) => coverage,
            Err(e) => {
                warn!("coverage measurement failed, recording 0%: {e}");
                0.0
            }
        }
    }

    /// Stores a crashing input and frees a placeholder slot for it.
    fn save_crash(&self, dest_name: &str, input: &[u8]) -> Result<PathBuf, FuzzError> {
        let dest = self.output.write(dest_name, input)?;
        self.output.remove_one_placeholder()?;
        Ok(dest)
    }

    fn provided_input_round(
        &self,
        state: &mut CampaignState,
        path: &Path,
    ) -> Result<(), FuzzError> {
        let input = fs::read(path).map_err(|e| FuzzError::io(path, e))?;
        let Some(crash) = self.execute(state, &input, self.config.timeouts.provided_input())
        else {
            return Ok(());
        };
        if self.already_recorded(state, &crash, &input) {
            debug!("skipping {path:?}: same input already recorded for {crash}");
            return Ok(());
        }
        let coverage = self.measure_coverage(state);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "provided_input.cnf".to_string());
        let dest = self.save_crash(&name, &input)?;
        info!("provided input {name} crashes the solver: {crash}");

        let outcome = RunOutcome::new(dest, crash, coverage, &input);
        if state.crashes.record(outcome.clone()) {
            state.scheduler.push(outcome);
        }
        Ok(())
    }

    fn generation_round(&self, state: &mut CampaignState, iteration: u64) -> Result<(), FuzzError> {
        let input = state.generator.generate(&mut state.rng);
        let Some(crash) = self.execute(state, &input, self.config.timeouts.generation()) else {
            return Ok(());
        };
        if self.already_recorded(state, &crash, &input) {
            return Ok(());
        }
        let coverage = self.measure_coverage(state);

        let dest = self.save_crash(&format!("crashing_test_{iteration}.cnf"), &input)?;
        debug!("generated input crashed the solver ({crash}, {coverage:.2}% coverage)");

        let outcome = RunOutcome::new(dest, crash, coverage, &input);
        if state.crashes.record(outcome.clone()) {
            state.scheduler.push(outcome);
        }
        Ok(())
    }

    fn mutation_round(&self, state: &mut CampaignState, iteration: u64) -> Result<(), FuzzError> {
        let Ok(parent) = state.scheduler.next() else {
            return Ok(());
        };
        let bytes =
            fs::read(&parent.test_file).map_err(|e| FuzzError::io(&parent.test_file, e))?;
        let Some(file) = CnfFile::parse(&bytes) else {
            debug!("dropping {:?}: no mutable CNF structure", parent.test_file);
            return Ok(());
        };

        let (strategy, input) = state.mutator.mutate(&file, &mut state.rng);
        let Some(crash) = self.execute(state, &input, self.config.timeouts.mutation()) else {
            return Ok(());
        };
        if self.already_recorded(state, &crash, &input) {
            debug!("{strategy} mutation reproduced a recorded input");
            state.scheduler.push(parent);
            return Ok(());
        }
        let coverage = self.measure_coverage(state);

        let dest = self.save_crash(&format!("crashing_test_{iteration}.cnf"), &input)?;
        debug!("{strategy} mutation crashed the solver ({crash}, {coverage:.2}% coverage)");

        let child = RunOutcome::new(dest, crash, coverage, &input);
        let kind_was_known = state.crashes.contains(&child.crash);
        let verdict = state.feedback.judge(&parent, &child, kind_was_known);
        state.crashes.record(child.clone());
        if verdict.keep_child {
            state.scheduler.push(child);
        }
        if verdict.keep_parent {
            state.scheduler.push(parent);
        }
        Ok(())
    }

    fn run_loop(&self) -> (u64, bool) {
        let mut iteration = 0;
        loop {
            if let Some(max) = self.config.max_iterations {
                if iteration >= max {
                    return (iteration, false);
                }
            }
            let Some(mut guard) = self.lock_unless_cancelled() else {
                return (iteration, true);
            };
            let state = &mut *guard;
            iteration += 1;

            if should_report_progress(iteration) {
                println!(
                    "Iteration {iteration}: distinct crash types found {}, total crashes found: {}",
                    state.crashes.distinct_crashes(),
                    state.crashes.total_crashes()
                );
            }

            let result = if state.rng.random_bool(self.config.generation_probability) {
                self.generation_round(state, iteration)
            } else {
                self.mutation_round(state, iteration)
            };
            if let Err(e) = result {
                error!("fuzzing iteration {iteration} failed: {e}");
            }
        }
    }

    /// Keeps the best crashing inputs and deletes everything else in the
    /// output directory. Runs at most once per campaign; a concurrent call
    /// waits for the running save before reporting `AlreadyFinished`.
    fn finalize(&self) -> Result<ShutdownReport, FuzzError> {
        let mut finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        if *finished {
            return Ok(ShutdownReport::AlreadyFinished);
        }
        *finished = true;
        println!("\n\nShutting down fuzzer, saving the best files to disk");

        let state = self.lock_state();
        let best = state.crashes.select_best(self.config.max_saved_tests);
        println!("Saving {} tests to output directory", best.len());

        let keep: Vec<String> = best.iter().filter_map(RunOutcome::file_name).collect();
        println!("Keeping {keep:?}");
        let removed = self.output.retain_only(&keep)?;
        debug!("removed {removed} files from {:?}", self.output.path());

        println!("---------- FUZZER FINISHED ----------");
        Ok(ShutdownReport::Completed { saved: keep })
    }
}

impl Campaign for Fuzzer {
    fn start(&self) -> Result<CampaignSummary, FuzzError> {
        println!("Running fuzzer against SUT in {}", self.sut_dir.display());

        if self.config.placeholder_files {
            self.write_placeholders()?;
        }
        self.run_provided_inputs()?;

        let (iterations, cancelled) = self.run_loop();
        if !cancelled {
            info!("iteration cap reached after {iterations} iterations");
            self.finalize()?;
        }

        let (distinct_crashes, total_crashes) = self.crash_counts();
        Ok(CampaignSummary {
            iterations,
            distinct_crashes,
            total_crashes,
            cancelled,
        })
    }

    fn shutdown(&self) -> Result<ShutdownReport, FuzzError> {
        self.token.trigger();
        self.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    #[test]
    fn seed_parsing() {
        assert_eq!(parse_seed(None, 42).unwrap(), 42);
        assert_eq!(parse_seed(Some("7"), 42).unwrap(), 7);
        assert_eq!(parse_seed(Some("-3"), 42).unwrap(), u64::MAX - 2);
        assert_eq!(
            parse_seed(Some("-3"), 42).unwrap(),
            parse_seed(Some(" -3 "), 42).unwrap()
        );
        assert_ne!(parse_seed(Some("-3"), 42).unwrap(), 3);
        assert_eq!(parse_seed(Some("18446744073709551615"), 42).unwrap(), u64::MAX);
        assert!(matches!(
            parse_seed(Some("abc"), 42),
            Err(FuzzError::InvalidSeed(_))
        ));
    }

    #[test]
    fn progress_schedule() {
        let reported: Vec<u64> = (1..=2000).filter(|&i| should_report_progress(i)).collect();
        assert_eq!(&reported[..9], &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(&reported[9..18], &[10, 20, 30, 40, 50, 60, 70, 80, 90]);
        assert!(reported.contains(&100));
        assert!(reported.contains(&1000));
        assert!(!reported.contains(&1100));
        assert!(reported.contains(&1500));
        assert!(reported.contains(&2000));
    }

    struct Workspace {
        root: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let root = tempdir().unwrap();
            fs::create_dir(root.path().join("sut")).unwrap();
            fs::create_dir(root.path().join("inputs")).unwrap();
            Self { root }
        }

        fn args(&self, seed: Option<&str>) -> CampaignArgs {
            CampaignArgs {
                sut_dir: self.root.path().join("sut"),
                inputs_dir: self.root.path().join("inputs"),
                seed: seed.map(str::to_string),
            }
        }

        fn config(&self) -> FuzzerConfig {
            let mut config = FuzzerConfig::default();
            config.output_dir = self.root.path().join("fuzzed-tests");
            config.coverage.coverage_type = CoverageType::None;
            config.timeouts.pre_coverage_delay_ms = 0;
            config.timeouts.generation_ms = 5_000;
            config.timeouts.mutation_ms = 5_000;
            config.timeouts.provided_input_ms = 5_000;
            config.max_saved_tests = 3;
            config
        }

        fn input(&self, name: &str, contents: &str) {
            fs::write(self.root.path().join("inputs").join(name), contents).unwrap();
        }

        fn output_files(&self) -> Vec<String> {
            let mut names: Vec<String> = fs::read_dir(self.root.path().join("fuzzed-tests"))
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }

        #[cfg(unix)]
        fn solver(&self, body: &str) {
            use std::os::unix::fs::PermissionsExt;
            let path = self.root.path().join("sut").join("runsat.sh");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    const ASAN_CRASH: &str =
        "echo '==1==ERROR: AddressSanitizer: heap-buffer-overflow on address 0x1' >&2; exit 1";

    #[test]
    fn invalid_seed_fails_construction() {
        let ws = Workspace::new();
        let result = Fuzzer::new(ws.args(Some("abc")), ws.config(), ShutdownToken::new());
        assert!(matches!(result, Err(FuzzError::InvalidSeed(_))));
    }

    #[test]
    fn negative_seed_gives_a_reproducible_campaign() {
        let placeholder_of = |ws: &Workspace| {
            let fuzzer =
                Fuzzer::new(ws.args(Some("-3")), ws.config(), ShutdownToken::new()).unwrap();
            fuzzer.write_placeholders().unwrap();
            fs::read(fuzzer.output_dir().join("dummy_0.cnf")).unwrap()
        };
        let first = Workspace::new();
        let second = Workspace::new();
        assert_eq!(placeholder_of(&first), placeholder_of(&second));
    }

    #[test]
    fn concurrent_shutdowns_return_after_the_save() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let ws = Workspace::new();
        let fuzzer = Fuzzer::new(ws.args(None), ws.config(), ShutdownToken::new()).unwrap();
        for i in 0..200 {
            fuzzer.output.write_placeholder(i, b"p cnf 1 1\n1 0\n").unwrap();
        }
        let fuzzer = Arc::new(fuzzer);

        let callers = 4;
        let barrier = Arc::new(Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let fuzzer = Arc::clone(&fuzzer);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let report = fuzzer.shutdown().unwrap();
                    let left = fs::read_dir(fuzzer.output_dir()).unwrap().count();
                    (report, left)
                })
            })
            .collect();

        let results: Vec<(ShutdownReport, usize)> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let completed = results
            .iter()
            .filter(|(report, _)| matches!(report, ShutdownReport::Completed { .. }))
            .count();
        assert_eq!(completed, 1);
        for (_, left) in results {
            assert_eq!(left, 0);
        }
    }

    #[test]
    fn construction_recreates_output_directory() {
        let ws = Workspace::new();
        let out = ws.root.path().join("fuzzed-tests");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("stale.cnf"), b"old").unwrap();

        let fuzzer = Fuzzer::new(ws.args(None), ws.config(), ShutdownToken::new()).unwrap();
        assert_eq!(fuzzer.output_dir(), out.as_path());
        assert!(ws.output_files().is_empty());
    }

    #[test]
    fn shutdown_before_start_is_idempotent_and_start_does_nothing() {
        let ws = Workspace::new();
        let fuzzer = Fuzzer::new(ws.args(None), ws.config(), ShutdownToken::new()).unwrap();

        assert_eq!(
            fuzzer.shutdown().unwrap(),
            ShutdownReport::Completed { saved: vec![] }
        );
        assert_eq!(fuzzer.shutdown().unwrap(), ShutdownReport::AlreadyFinished);
        assert!(fuzzer.shutdown_token().is_triggered());

        let summary = fuzzer.start().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.iterations, 0);
        assert!(ws.output_files().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn generation_campaign_keeps_best_crashes() {
        let ws = Workspace::new();
        ws.solver(ASAN_CRASH);
        let mut config = ws.config();
        config.generation_probability = 1.0;
        config.max_iterations = Some(5);

        let fuzzer = Fuzzer::new(ws.args(Some("1")), config, ShutdownToken::new()).unwrap();
        let summary = fuzzer.start().unwrap();
        assert_eq!(
            summary,
            CampaignSummary {
                iterations: 5,
                distinct_crashes: 1,
                total_crashes: 5,
                cancelled: false,
            }
        );
        assert_eq!(
            ws.output_files(),
            vec![
                "crashing_test_1.cnf",
                "crashing_test_2.cnf",
                "crashing_test_3.cnf"
            ]
        );
        assert_eq!(fuzzer.shutdown().unwrap(), ShutdownReport::AlreadyFinished);
    }

    #[cfg(unix)]
    #[test]
    fn clean_solver_leaves_no_files_behind() {
        let ws = Workspace::new();
        ws.solver("exit 10");
        ws.input("sat.cnf", "p cnf 1 1\n1 0\n");
        let mut config = ws.config();
        config.max_iterations = Some(3);

        let fuzzer = Fuzzer::new(ws.args(None), config, ShutdownToken::new()).unwrap();
        let summary = fuzzer.start().unwrap();
        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.total_crashes, 0);
        assert!(ws.output_files().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn crashing_provided_inputs_are_copied_to_output() {
        let ws = Workspace::new();
        ws.solver(
            "if grep -q CRASH \"$1\"; then echo '==1==ERROR: AddressSanitizer: SEGV on unknown address' >&2; exit 1; fi; exit 0",
        );
        ws.input("boom.cnf", "p cnf 1 1\nCRASH 0\n");
        ws.input("fine.cnf", "p cnf 1 1\n1 0\n");
        ws.input("notes.txt", "CRASH");
        let mut config = ws.config();
        config.max_iterations = Some(0);

        let fuzzer = Fuzzer::new(ws.args(None), config, ShutdownToken::new()).unwrap();
        let summary = fuzzer.start().unwrap();
        assert_eq!(summary.total_crashes, 1);
        assert_eq!(ws.output_files(), vec!["boom.cnf"]);
        assert_eq!(
            fs::read_to_string(ws.root.path().join("fuzzed-tests").join("boom.cnf")).unwrap(),
            "p cnf 1 1\nCRASH 0\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn identical_crashing_inputs_are_recorded_once() {
        let ws = Workspace::new();
        ws.solver(ASAN_CRASH);
        ws.input("a.cnf", "p cnf 2 1\n1 -2 0\n");
        ws.input("b.cnf", "p cnf 2 1\n1 -2 0\n");
        ws.input("c.cnf", "p cnf 2 1\n2 0\n");
        let mut config = ws.config();
        config.max_iterations = Some(0);

        let fuzzer = Fuzzer::new(ws.args(None), config, ShutdownToken::new()).unwrap();
        let summary = fuzzer.start().unwrap();
        assert_eq!(summary.total_crashes, 2);
        assert_eq!(ws.output_files(), vec!["a.cnf", "c.cnf"]);
    }

    #[cfg(unix)]
    #[test]
    fn mutation_rounds_requeue_the_parent() {
        let ws = Workspace::new();
        ws.solver(ASAN_CRASH);
        let clauses: String = (1..=40).map(|i| format!("{i} -{} 0\n", i + 1)).collect();
        ws.input("seed.cnf", &format!("p cnf 41 40\n{clauses}"));
        let mut config = ws.config();
        config.generation_probability = 0.0;
        config.max_iterations = Some(3);
        config.max_saved_tests = 10;

        let fuzzer = Fuzzer::new(ws.args(None), config, ShutdownToken::new()).unwrap();
        let summary = fuzzer.start().unwrap();
        assert_eq!(summary.distinct_crashes, 1);
        assert_eq!(summary.total_crashes, 4);
        assert_eq!(
            ws.output_files(),
            vec![
                "crashing_test_1.cnf",
                "crashing_test_2.cnf",
                "crashing_test_3.cnf",
                "seed.cnf"
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn shutdown_interrupts_a_running_campaign() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Instant;

        let ws = Workspace::new();
        ws.solver("sleep 30");
        let mut config = ws.config();
        config.generation_probability = 1.0;
        config.timeouts.generation_ms = 60_000;

        let fuzzer = Arc::new(Fuzzer::new(ws.args(None), config, ShutdownToken::new()).unwrap());
        let runner = Arc::clone(&fuzzer);
        let started = Instant::now();
        let handle = thread::spawn(move || runner.start());

        thread::sleep(Duration::from_millis(300));
        assert!(matches!(
            fuzzer.shutdown().unwrap(),
            ShutdownReport::Completed { .. }
        ));
        let summary = handle.join().unwrap().unwrap();
        assert!(summary.cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(ws.output_files().is_empty());
    }
}
