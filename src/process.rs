//! Running the external benchmark and analyzer binaries.
use std::env;
use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::command::Invocation;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    /// Non-zero exit. `None` if the child was killed by a signal.
    Failed(Option<i32>),
    TimedOut,
    Cancelled,
}

/// Shared stop flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Something that can run an [`Invocation`] with its stdout going to a file.
///
/// `Sync` so the fairness pool can share one launcher between its workers.
pub trait Launcher: Sync {
    /// Run to completion. An `Err` means the child could not be spawned.
    fn launch(&self, invocation: &Invocation, stdout: File, cancel: &CancelToken) -> io::Result<Exit>;

    /// Whether `program` can be found at all.
    fn is_available(&self, program: &str) -> bool {
        program_exists(program)
    }
}

/// Paths are checked directly; bare names are looked up on `PATH`.
pub fn program_exists(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// Spawns real processes, one blocking call per invocation.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        ProcessLauncher {
            timeout: None,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl ProcessLauncher {
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        ProcessLauncher {
            timeout,
            ..Default::default()
        }
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, invocation: &Invocation, stdout: File, cancel: &CancelToken) -> io::Result<Exit> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .spawn()?;

        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(if status.success() {
                    Exit::Success
                } else {
                    Exit::Failed(status.code())
                });
            }
            let outcome = if cancel.is_cancelled() {
                Some(Exit::Cancelled)
            } else {
                match self.timeout {
                    Some(t) if start.elapsed() >= t => Some(Exit::TimedOut),
                    _ => None,
                }
            };
            if let Some(outcome) = outcome {
                // The child may have exited in the meantime; either way reap it.
                let _ = child.kill();
                child.wait()?;
                return Ok(outcome);
            }
            thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(all(test, unix))]
mod test {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn sh(script: &str, output: PathBuf) -> Invocation {
        Invocation {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            output,
        }
    }

    #[test]
    fn stdout_goes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let inv = sh("echo 1 2 3", out.clone());
        let exit = ProcessLauncher::default()
            .launch(&inv, File::create(&out).unwrap(), &CancelToken::new())
            .unwrap();
        assert_eq!(exit, Exit::Success);
        assert_eq!(fs::read_to_string(&out).unwrap(), "1 2 3\n");
    }

    #[test]
    fn exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let inv = sh("exit 3", out.clone());
        let exit = ProcessLauncher::default()
            .launch(&inv, File::create(&out).unwrap(), &CancelToken::new())
            .unwrap();
        assert_eq!(exit, Exit::Failed(Some(3)));
    }

    #[test]
    fn timeout_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let inv = sh("sleep 10", out.clone());
        let launcher = ProcessLauncher::with_timeout(Some(Duration::from_millis(200)));
        let start = Instant::now();
        let exit = launcher
            .launch(&inv, File::create(&out).unwrap(), &CancelToken::new())
            .unwrap();
        assert_eq!(exit, Exit::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let cancel = CancelToken::new();
        cancel.cancel();
        let exit = ProcessLauncher::default()
            .launch(&sh("sleep 10", out.clone()), File::create(&out).unwrap(), &cancel)
            .unwrap();
        assert_eq!(exit, Exit::Cancelled);
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let inv = Invocation {
            program: dir.path().join("nope").to_string_lossy().into_owned(),
            args: vec![],
            output: out.clone(),
        };
        assert!(ProcessLauncher::default()
            .launch(&inv, File::create(&out).unwrap(), &CancelToken::new())
            .is_err());
        assert!(!program_exists(&inv.program));
        assert!(program_exists("/bin/sh"));
        assert!(program_exists("sh"));
    }
}
