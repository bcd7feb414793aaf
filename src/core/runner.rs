//! Compile/execute collaborator: byte-compiles and runs staged candidates.

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::repair::CancelToken;
use crate::infra::config::RunnerConfig;

/// Exit code reported for timeouts and processes that never started.
pub const SYNTHETIC_EXIT_CODE: i32 = -1;

/// Result of compiling or executing a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunOutcome {
    fn failed(stderr: impl Into<String>) -> Self {
        Self { success: false, stdout: String::new(), stderr: stderr.into(), exit_code: SYNTHETIC_EXIT_CODE }
    }

    /// Error text fed back into the next refinement request.
    pub fn error_report(&self) -> String {
        format!("Exit Code: {}\nError Output:\n{}", self.exit_code, self.stderr.trim_end())
    }
}

/// Validation collaborator used by the repair loop.
pub trait Executor {
    /// Syntax-check the file at `path` without running it.
    fn compile(&mut self, path: &Path) -> Result<RunOutcome>;

    /// Run the file at `path`; a timeout yields a failed outcome, not an error.
    fn execute(&mut self, path: &Path, timeout: Duration) -> Result<RunOutcome>;
}

struct CommandRun {
    status: Option<ExitStatus>,
    stdout: String,
    stderr: String,
    timed_out: bool,
    cancelled: bool,
}

/// Run a command with captured pipes and a wall-clock deadline. The child
/// is also killed as soon as `cancel` is set.
fn run_command_with_timeout(
    command: &mut Command,
    timeout: Duration,
    cancel: Option<&CancelToken>,
) -> Result<CommandRun, String> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to start command: {e}"))?;

    let stdout = child.stdout.take().ok_or_else(|| "Failed to capture stdout".to_string())?;
    let stderr = child.stderr.take().ok_or_else(|| "Failed to capture stderr".to_string())?;

    // Drain both pipes off-thread so a chatty child cannot block on a full pipe
    let stdout_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = BufReader::new(stdout).read_to_end(&mut buf);
        buf
    });
    let stderr_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = BufReader::new(stderr).read_to_end(&mut buf);
        buf
    });

    let start = Instant::now();
    let mut timed_out = false;
    let mut cancelled = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                cancelled = cancel.is_some_and(CancelToken::is_cancelled);
                timed_out = !cancelled && start.elapsed() >= timeout;
                if cancelled || timed_out {
                    let _ = child.kill();
                    break child.wait().ok();
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(format!("Failed to wait for command: {e}")),
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandRun {
        status,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        timed_out,
        cancelled,
    })
}

/// Executor that shells out to a Python interpreter.
pub struct PythonRunner {
    interpreter: String,
    /// Directory of the real file; used as cwd and prepended to PYTHONPATH.
    search_dir: Option<PathBuf>,
    compile_timeout: Duration,
    cancel: Option<CancelToken>,
}

impl PythonRunner {
    pub fn new(cfg: &RunnerConfig) -> Self {
        Self {
            interpreter: cfg.interpreter.clone(),
            search_dir: None,
            compile_timeout: Duration::from_secs(30),
            cancel: None,
        }
    }

    /// Kill a running child once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Resolve sibling imports against the real file's directory.
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        if let Some(dir) = &self.search_dir {
            cmd.current_dir(dir);
            let joined = match std::env::var_os("PYTHONPATH") {
                Some(existing) => {
                    let mut paths = vec![dir.clone()];
                    paths.extend(std::env::split_paths(&existing));
                    std::env::join_paths(paths).unwrap_or_else(|_| dir.clone().into_os_string())
                }
                None => dir.clone().into_os_string(),
            };
            cmd.env("PYTHONPATH", joined);
        }
        cmd
    }

    fn run(&self, mut cmd: Command, timeout: Duration) -> RunOutcome {
        match run_command_with_timeout(&mut cmd, timeout, self.cancel.as_ref()) {
            Err(msg) => RunOutcome::failed(msg),
            Ok(run) if run.cancelled => RunOutcome {
                success: false,
                stdout: run.stdout,
                stderr: "Cancelled".to_string(),
                exit_code: SYNTHETIC_EXIT_CODE,
            },
            Ok(run) if run.timed_out => RunOutcome {
                success: false,
                stdout: run.stdout,
                stderr: format!("Timeout: script exceeded {}s", timeout.as_secs()),
                exit_code: SYNTHETIC_EXIT_CODE,
            },
            Ok(run) => {
                let exit_code = run.status.and_then(|s| s.code()).unwrap_or(SYNTHETIC_EXIT_CODE);
                RunOutcome {
                    success: run.status.is_some_and(|s| s.success()),
                    stdout: run.stdout,
                    stderr: run.stderr,
                    exit_code,
                }
            }
        }
    }
}

impl Executor for PythonRunner {
    #[instrument(skip(self), fields(interpreter = %self.interpreter))]
    fn compile(&mut self, path: &Path) -> Result<RunOutcome> {
        let mut cmd = self.command();
        cmd.arg("-m").arg("py_compile").arg(path);
        let outcome = self.run(cmd, self.compile_timeout);
        debug!(success = outcome.success, code = outcome.exit_code, "compiled");
        Ok(outcome)
    }

    #[instrument(skip(self), fields(interpreter = %self.interpreter))]
    fn execute(&mut self, path: &Path, timeout: Duration) -> Result<RunOutcome> {
        let mut cmd = self.command();
        cmd.arg(path);
        let outcome = self.run(cmd, timeout);
        debug!(success = outcome.success, code = outcome.exit_code, "executed");
        Ok(outcome)
    }
}
