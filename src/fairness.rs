//! Age/op-fairness analysis of operation logs.
//!
//! Unlike the sweep, this step is not timing sensitive: every log is fed to
//! the external analyzer on a fixed pool of worker threads. Workers share
//! nothing but the job and result channels.
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam::channel;
use tracing::{info, warn};

use crate::command::Invocation;
use crate::error::{Error, IoContext, Result};
use crate::process::{CancelToken, Exit, Launcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Analyzed,
    /// The output file already exists.
    Skipped,
    /// The log is empty or vanished.
    Empty,
    Failed(Option<i32>),
    SpawnFailed(String),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Default)]
pub struct FairnessReport {
    /// Sorted by log path.
    pub jobs: Vec<(PathBuf, JobOutcome)>,
}

impl FairnessReport {
    pub fn analyzed(&self) -> usize {
        self.jobs.iter().filter(|j| j.1 == JobOutcome::Analyzed).count()
    }
}

/// One worker per available processor.
pub fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Number of lines, counting a final line without a newline.
pub fn count_lines(path: &Path) -> io::Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = 0;
    for segment in reader.split(b'\n') {
        segment?;
        lines += 1;
    }
    Ok(lines)
}

fn analyze_one<L: Launcher>(
    log: &Path,
    output_dir: &Path,
    analyzer: &str,
    launcher: &L,
    cancel: &CancelToken,
) -> JobOutcome {
    let lines = match count_lines(log) {
        Ok(n) if n > 0 => n,
        _ => {
            warn!(path = %log.display(), "log is empty or does not exist");
            return JobOutcome::Empty;
        }
    };
    let output = match log.file_name() {
        Some(name) => output_dir.join(name),
        None => return JobOutcome::Empty,
    };
    if output.exists() {
        return JobOutcome::Skipped;
    }
    if cancel.is_cancelled() {
        return JobOutcome::Cancelled;
    }

    let inv = Invocation {
        program: analyzer.to_string(),
        args: vec![lines.to_string(), log.to_string_lossy().into_owned()],
        output: output.clone(),
    };
    info!(log = %log.display(), output = %output.display(), "analyzing");
    let outcome = match File::create(&output) {
        Err(e) => JobOutcome::SpawnFailed(e.to_string()),
        Ok(file) => match launcher.launch(&inv, file, cancel) {
            Ok(Exit::Success) => JobOutcome::Analyzed,
            Ok(Exit::Failed(code)) => JobOutcome::Failed(code),
            Ok(Exit::TimedOut) => JobOutcome::TimedOut,
            Ok(Exit::Cancelled) => JobOutcome::Cancelled,
            Err(e) => JobOutcome::SpawnFailed(e.to_string()),
        },
    };
    if outcome != JobOutcome::Analyzed {
        warn!(log = %log.display(), outcome = ?outcome, "the analyzer failed");
        let _ = fs::remove_file(&output);
    }
    outcome
}

/// Run `analyzer <lines> <log>` for every log in `log_dir`, writing its
/// stdout to a file of the same name in `output_dir`. Returns once every job
/// has finished.
pub fn analyze_logs<L: Launcher>(
    log_dir: &Path,
    output_dir: &Path,
    analyzer: &str,
    workers: usize,
    launcher: &L,
    cancel: &CancelToken,
) -> Result<FairnessReport> {
    if !log_dir.is_dir() {
        return Err(Error::NotADirectory(log_dir.to_path_buf()));
    }
    if !launcher.is_available(analyzer) {
        return Err(Error::ExecutableNotFound {
            queue: "fairness analyzer".to_string(),
            program: analyzer.to_string(),
        });
    }
    fs::create_dir_all(output_dir).at(output_dir)?;

    let (job_tx, job_rx) = channel::unbounded::<PathBuf>();
    let (result_tx, result_rx) = channel::unbounded();
    for entry in fs::read_dir(log_dir).at(log_dir)? {
        let path = entry.at(log_dir)?.path();
        if path.is_file() {
            // The receiver is alive until the end of this function.
            let _ = job_tx.send(path);
        }
    }
    drop(job_tx);

    let workers = workers.max(1);
    let scoped = crossbeam::scope(|s| {
        for _ in 0..workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            s.spawn(move |_| {
                for log in jobs.iter() {
                    let outcome = analyze_one(&log, output_dir, analyzer, launcher, cancel);
                    let _ = results.send((log, outcome));
                }
            });
        }
    });
    if let Err(panic) = scoped {
        std::panic::resume_unwind(panic);
    }
    drop(result_tx);

    let mut report = FairnessReport {
        jobs: result_rx.iter().collect(),
    };
    report.jobs.sort_by(|a, b| a.0.cmp(&b.0));
    info!(
        logs = report.jobs.len(),
        analyzed = report.analyzed(),
        workers,
        "fairness analysis finished"
    );
    Ok(report)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Pretends to be the analyzer: writes `<lines> <log name>`.
    struct FakeAnalyzer {
        calls: AtomicUsize,
        threads: Mutex<Vec<thread::ThreadId>>,
    }

    impl FakeAnalyzer {
        fn new() -> Self {
            FakeAnalyzer {
                calls: AtomicUsize::new(0),
                threads: Mutex::new(vec![]),
            }
        }
    }

    impl Launcher for FakeAnalyzer {
        fn launch(&self, inv: &Invocation, mut stdout: File, _: &CancelToken) -> io::Result<Exit> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.threads.lock().unwrap().push(thread::current().id());
            if inv.args[1].ends_with("broken.log") {
                return Ok(Exit::Failed(Some(2)));
            }
            let name = Path::new(&inv.args[1]).file_name().unwrap().to_string_lossy().into_owned();
            writeln!(stdout, "{} {}", inv.args[0], name)?;
            Ok(Exit::Success)
        }

        fn is_available(&self, _: &str) -> bool {
            true
        }
    }

    #[test]
    fn counting_lines() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("l");
        fs::write(&p, "a\nb\nc\n").unwrap();
        assert_eq!(count_lines(&p).unwrap(), 3);
        fs::write(&p, "a\nb").unwrap();
        assert_eq!(count_lines(&p).unwrap(), 2);
        fs::write(&p, "").unwrap();
        assert_eq!(count_lines(&p).unwrap(), 0);
        assert!(count_lines(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn every_log_is_analyzed_once() {
        let root = tempfile::tempdir().unwrap();
        let logs = root.path().join("logs");
        let out = root.path().join("age");
        fs::create_dir(&logs).unwrap();
        for i in 0..20 {
            let body: String = (0..=i).map(|n| format!("op {}\n", n)).collect();
            fs::write(logs.join(format!("q{:02}.log", i)), body).unwrap();
        }
        fs::write(logs.join("empty.log"), "").unwrap();
        fs::write(logs.join("broken.log"), "x\n").unwrap();

        let analyzer = FakeAnalyzer::new();
        let report = analyze_logs(&logs, &out, "analyzer", 4, &analyzer, &CancelToken::new()).unwrap();
        assert_eq!(report.jobs.len(), 22);
        assert_eq!(report.analyzed(), 20);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 21);
        assert_eq!(fs::read_to_string(out.join("q04.log")).unwrap(), "5 q04.log\n");
        assert!(!out.join("empty.log").exists());
        assert!(!out.join("broken.log").exists());
        let broken = report.jobs.iter().find(|j| j.0.ends_with("broken.log")).unwrap();
        assert_eq!(broken.1, JobOutcome::Failed(Some(2)));
        // The calling thread only waits.
        let current = thread::current().id();
        assert!(analyzer.threads.lock().unwrap().iter().all(|&t| t != current));

        let again = analyze_logs(&logs, &out, "analyzer", 4, &analyzer, &CancelToken::new()).unwrap();
        assert_eq!(again.analyzed(), 0);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 22);
    }

    #[test]
    fn log_dir_must_exist() {
        let root = tempfile::tempdir().unwrap();
        let e = analyze_logs(
            &root.path().join("nope"),
            &root.path().join("out"),
            "analyzer",
            2,
            &FakeAnalyzer::new(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(e, Error::NotADirectory(_)));
    }
}
