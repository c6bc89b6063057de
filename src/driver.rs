//! The sweep driver: one benchmark process per (queue, work, threads) cell.
//!
//! Cells run strictly one after the other. The benchmarks are timing
//! sensitive, so two of them must never share the machine.
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::command::{BenchmarkKind, CommandBuilder, OutputMode, RunRecord};
use crate::config::Config;
use crate::error::{Error, IoContext, Result};
use crate::process::{CancelToken, Exit, Launcher};

/// What to sweep over and where the results go.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    pub queues: Vec<String>,
    pub works: Vec<u64>,
    pub threads: Vec<u32>,
    /// Value passed to every queue that has a tunable.
    pub max_partitions: u32,
    pub prefill: u64,
    pub output_directory: PathBuf,
    pub mode: OutputMode,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Print the commands instead of running them.
    pub dry_run: bool,
    /// Remove the output directory first.
    pub clean: bool,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellOutcome {
    /// The output file was already there.
    Skipped,
    Completed,
    Failed(Option<i32>),
    SpawnFailed(String),
    TimedOut,
    Cancelled,
    DryRun,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub cells: Vec<(RunRecord, CellOutcome)>,
}

impl SweepReport {
    fn count<F: Fn(&CellOutcome) -> bool>(&self, f: F) -> usize {
        self.cells.iter().filter(|c| f(&c.1)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|o| *o == CellOutcome::Completed)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == CellOutcome::Skipped)
    }

    /// Cells that were attempted and did not produce a result.
    pub fn failed(&self) -> usize {
        self.count(|o| match *o {
            CellOutcome::Failed(_)
            | CellOutcome::SpawnFailed(_)
            | CellOutcome::TimedOut
            | CellOutcome::Cancelled => true,
            _ => false,
        })
    }
}

fn builder<'a>(spec: &'a SweepSpec, kind: &'a BenchmarkKind, config: &'a Config) -> CommandBuilder<'a> {
    CommandBuilder {
        kind,
        registry: &config.registry,
        directory: &spec.output_directory,
        bin_dir: &config.bin_dir,
        max_partitions: spec.max_partitions,
        prefill: spec.prefill,
        mode: spec.mode,
    }
}

fn works(spec: &SweepSpec, kind: &BenchmarkKind) -> Vec<Option<u64>> {
    if kind.work_axis {
        spec.works.iter().map(|&w| Some(w)).collect()
    } else {
        vec![None]
    }
}

/// Check everything that can be checked before the first process starts.
pub fn validate<L: Launcher>(
    spec: &SweepSpec,
    kind: &BenchmarkKind,
    config: &Config,
    launcher: &L,
    check_executables: bool,
) -> Result<()> {
    if spec.queues.is_empty() {
        return Err(Error::EmptyAxis("queues"));
    }
    if kind.work_axis && spec.works.is_empty() {
        return Err(Error::EmptyAxis("works"));
    }
    if spec.threads.is_empty() {
        return Err(Error::EmptyAxis("thread counts"));
    }
    let b = builder(spec, kind, config);
    let work = works(spec, kind)[0];
    for queue in &spec.queues {
        let (_, inv) = b.build(queue, work, spec.threads[0])?;
        if check_executables && !launcher.is_available(&inv.program) {
            return Err(Error::ExecutableNotFound {
                queue: queue.clone(),
                program: inv.program,
            });
        }
    }
    Ok(())
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove partial output");
        }
    }
}

/// Run every cell of the sweep, queue outermost and thread count innermost.
///
/// Only configuration problems are returned as errors, and only before
/// anything has run. A cell that fails is logged and recorded in the report
/// and the sweep moves on.
pub fn run_sweep<L: Launcher>(
    spec: &SweepSpec,
    kind: &BenchmarkKind,
    config: &Config,
    launcher: &L,
    options: &RunOptions,
) -> Result<SweepReport> {
    validate(spec, kind, config, launcher, !options.dry_run)?;

    let dir = &spec.output_directory;
    if !options.dry_run {
        if options.clean && dir.exists() {
            info!(path = %dir.display(), "removing old results");
            fs::remove_dir_all(dir).at(dir)?;
        }
        fs::create_dir_all(dir).at(dir)?;
    }

    let b = builder(spec, kind, config);
    let works = works(spec, kind);
    let mut report = SweepReport::default();

    'sweep: for queue in &spec.queues {
        for &work in &works {
            for &threads in &spec.threads {
                let (record, inv) = b.build(queue, work, threads)?;
                let path = record.output_path.clone();

                if options.cancel.is_cancelled() {
                    report.cells.push((record, CellOutcome::Cancelled));
                    break 'sweep;
                }
                if path.exists() {
                    debug!(path = %path.display(), "already done");
                    report.cells.push((record, CellOutcome::Skipped));
                    continue;
                }
                if options.dry_run {
                    println!("{}", inv);
                    report.cells.push((record, CellOutcome::DryRun));
                    continue;
                }

                info!(queue = %queue, threads, work = ?work, "{}", inv);
                discard(&path);
                let outcome = match File::create(&path) {
                    Err(e) => CellOutcome::SpawnFailed(e.to_string()),
                    Ok(file) => match launcher.launch(&inv, file, &options.cancel) {
                        Ok(Exit::Success) => CellOutcome::Completed,
                        Ok(Exit::Failed(code)) => CellOutcome::Failed(code),
                        Ok(Exit::TimedOut) => CellOutcome::TimedOut,
                        Ok(Exit::Cancelled) => CellOutcome::Cancelled,
                        Err(e) => CellOutcome::SpawnFailed(e.to_string()),
                    },
                };
                if outcome != CellOutcome::Completed {
                    warn!(
                        queue = %queue,
                        path = %path.display(),
                        outcome = ?outcome,
                        "benchmark did not complete"
                    );
                    discard(&path);
                }
                let stop = outcome == CellOutcome::Cancelled;
                report.cells.push((record, outcome));
                if stop {
                    break 'sweep;
                }
            }
        }
    }

    info!(
        completed = report.completed(),
        skipped = report.skipped(),
        failed = report.failed(),
        "sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::command::Invocation;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Writes the command line into the output file instead of running it.
    struct FakeLauncher {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
        fail_queue: Option<&'static str>,
        unspawnable: Option<&'static str>,
        available: bool,
    }

    impl FakeLauncher {
        fn new() -> Self {
            FakeLauncher {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(vec![]),
                fail_queue: None,
                unspawnable: None,
                available: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&self, inv: &Invocation, mut stdout: File, _: &CancelToken) -> io::Result<Exit> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let line = inv.to_string();
            self.seen.lock().unwrap().push(line.clone());
            if let Some(q) = self.unspawnable {
                if inv.program.ends_with(q) {
                    return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
                }
            }
            writeln!(stdout, "{}", line)?;
            if let Some(q) = self.fail_queue {
                if inv.program.ends_with(q) {
                    return Ok(Exit::Failed(Some(1)));
                }
            }
            Ok(Exit::Success)
        }

        fn is_available(&self, _: &str) -> bool {
            self.available
        }
    }

    fn spec(dir: &std::path::Path) -> SweepSpec {
        SweepSpec {
            queues: vec!["ms".to_string(), "lb".to_string()],
            works: vec![0, 1000],
            threads: vec![1, 2, 4],
            max_partitions: 24,
            prefill: 0,
            output_directory: dir.to_path_buf(),
            mode: OutputMode::Performance,
        }
    }

    fn prodcon() -> BenchmarkKind {
        BenchmarkKind::builtin("prodcon").unwrap()
    }

    #[test]
    fn second_run_launches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(&dir.path().join("out"));
        let config = Config::default();
        let launcher = FakeLauncher::new();

        let first = run_sweep(&spec, &prodcon(), &config, &launcher, &RunOptions::default()).unwrap();
        assert_eq!(first.completed(), 12);
        assert_eq!(launcher.calls(), 12);

        let second = run_sweep(&spec, &prodcon(), &config, &launcher, &RunOptions::default()).unwrap();
        assert_eq!(launcher.calls(), 12);
        assert_eq!(second.skipped(), 12);
    }

    #[test]
    fn queue_outer_work_middle_thread_inner() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let report = run_sweep(&spec, &prodcon(), &Config::default(), &FakeLauncher::new(), &RunOptions::default()).unwrap();
        let order: Vec<(String, Option<u64>, u32)> = report
            .cells
            .iter()
            .map(|c| (c.0.algorithm.clone(), c.0.work, c.0.threads))
            .collect();
        assert_eq!(order[0], ("ms".to_string(), Some(0), 1));
        assert_eq!(order[1], ("ms".to_string(), Some(0), 2));
        assert_eq!(order[3], ("ms".to_string(), Some(1000), 1));
        assert_eq!(order[6], ("lb".to_string(), Some(0), 1));
        assert_eq!(order.len(), 12);
    }

    #[test]
    fn failures_do_not_stop_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let mut launcher = FakeLauncher::new();
        launcher.fail_queue = Some("prodcon-ms");
        let report = run_sweep(&spec, &prodcon(), &Config::default(), &launcher, &RunOptions::default()).unwrap();
        assert_eq!(launcher.calls(), 12);
        assert_eq!(report.failed(), 6);
        assert_eq!(report.completed(), 6);
        // Failed cells leave nothing behind, so a resume retries them.
        assert!(!dir.path().join("ms-t1-c0.txt").exists());
        assert!(dir.path().join("lb-t1-c0.txt").exists());
    }

    #[test]
    fn spawn_failures_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let mut launcher = FakeLauncher::new();
        launcher.unspawnable = Some("prodcon-lb");
        let report = run_sweep(&spec, &prodcon(), &Config::default(), &launcher, &RunOptions::default()).unwrap();
        let spawn_failures = report
            .cells
            .iter()
            .filter(|c| match c.1 {
                CellOutcome::SpawnFailed(_) => true,
                _ => false,
            })
            .count();
        assert_eq!(spawn_failures, 6);
        assert!(!dir.path().join("lb-t4-c1000.txt").exists());
    }

    #[test]
    fn missing_executables_abort_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let mut launcher = FakeLauncher::new();
        launcher.available = false;
        let e = run_sweep(&spec, &prodcon(), &Config::default(), &launcher, &RunOptions::default()).unwrap_err();
        match e {
            Error::ExecutableNotFound { ref queue, ref program } => {
                assert_eq!(queue, "ms");
                assert_eq!(program, "../prodcon-ms");
            }
            e => panic!("unexpected {:?}", e),
        }
        assert_eq!(launcher.calls(), 0);
    }

    #[test]
    fn empty_axes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = spec(dir.path());
        s.threads.clear();
        let e = run_sweep(&s, &prodcon(), &Config::default(), &FakeLauncher::new(), &RunOptions::default()).unwrap_err();
        assert_eq!(e.class(), crate::error::ErrorClass::Configuration);

        // Without a work axis an empty work list does not matter.
        let mut s = spec(dir.path());
        s.works.clear();
        let sp = BenchmarkKind::builtin("shortest-path").unwrap();
        let report = run_sweep(&s, &sp, &Config::default(), &FakeLauncher::new(), &RunOptions::default()).unwrap();
        assert_eq!(report.completed(), 6);
        assert!(dir.path().join("lb-t4.txt").exists());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never");
        let spec = spec(&out);
        let mut launcher = FakeLauncher::new();
        launcher.available = false;
        let options = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = run_sweep(&spec, &prodcon(), &Config::default(), &launcher, &options).unwrap();
        assert_eq!(report.cells.len(), 12);
        assert_eq!(launcher.calls(), 0);
        assert!(!out.exists());
    }

    #[test]
    fn clean_reruns_everything() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let launcher = FakeLauncher::new();
        fs::write(dir.path().join("ms-t1-c0.txt"), "old").unwrap();
        fs::write(dir.path().join("unrelated.txt"), "old").unwrap();
        let options = RunOptions {
            clean: true,
            ..Default::default()
        };
        let report = run_sweep(&spec, &prodcon(), &Config::default(), &launcher, &options).unwrap();
        assert_eq!(report.completed(), 12);
        assert!(!dir.path().join("unrelated.txt").exists());
        let fresh = fs::read_to_string(dir.path().join("ms-t1-c0.txt")).unwrap();
        assert!(fresh.starts_with("../prodcon-ms -producers 1"));
    }

    #[test]
    fn cancellation_stops_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let launcher = FakeLauncher::new();
        let options = RunOptions::default();
        options.cancel.cancel();
        let report = run_sweep(&spec, &prodcon(), &Config::default(), &launcher, &options).unwrap();
        assert_eq!(report.cells.len(), 1);
        assert_eq!(report.cells[0].1, CellOutcome::Cancelled);
        assert_eq!(launcher.calls(), 0);
    }

    #[test]
    fn tunable_ceiling_reaches_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = spec(dir.path());
        s.queues = vec!["uskfifo".to_string()];
        s.works = vec![0];
        s.threads = vec![2];
        let launcher = FakeLauncher::new();
        run_sweep(&s, &prodcon(), &Config::default(), &launcher, &RunOptions::default()).unwrap();
        let seen = launcher.seen.lock().unwrap();
        assert!(seen[0].contains("-k 24"), "{}", seen[0]);
        assert!(dir.path().join("uskfifo-t2-k24-c0.txt").exists());
    }
}
