use crate::input::Input;
use crate::observer::Observer;
use crate::shutdown::ShutdownToken;
use log::{debug, warn};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a running solver is polled for exit, timeout and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long a solver gets to exit after SIGTERM before it is killed outright.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Exited with status 0.
    Ok,
    /// Exited on its own with a non-zero status. Solvers use exit codes to
    /// report SAT/UNSAT, so this alone is not a crash.
    Exited(i32),
    /// Terminated by a signal it did not receive from us.
    Crash(String),
    Timeout,
    /// The campaign was cancelled while the solver was running.
    Cancelled,
    ObserverError(String),
    Other(String),
}

pub trait Executor<I: Input> {
    fn execute_sync(
        &mut self,
        input: &I,
        timeout: Duration,
        observers: &mut [&mut dyn Observer],
    ) -> ExecutionStatus;
}

/// The solver command line. Each input is written to a temporary `.cnf`
/// file whose path is passed as the last argument.
pub struct CommandExecutorConfig {
    pub command: Vec<String>,
}

impl CommandExecutorConfig {
    /// The usual solver invocation: `<script> <input-file>`.
    pub fn for_script(script: PathBuf) -> Self {
        Self {
            command: vec![script.to_string_lossy().into_owned()],
        }
    }
}

pub struct CommandExecutor {
    config: CommandExecutorConfig,
    shutdown: Option<ShutdownToken>,
}

#[derive(Debug, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

impl CommandExecutor {
    pub fn new(config: CommandExecutorConfig) -> Self {
        Self {
            config,
            shutdown: None,
        }
    }

    /// Makes running solvers abort as soon as `token` is triggered.
    pub fn with_shutdown_token(mut self, token: ShutdownToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    fn cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(ShutdownToken::is_triggered)
    }

    fn wait_with_timeout(&self, child: &mut Child, timeout: Duration) -> io::Result<WaitOutcome> {
        let start_time = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(WaitOutcome::Exited(status));
            }
            if self.cancelled() {
                debug!("campaign cancelled, terminating solver pid {}", child.id());
                terminate(child);
                return Ok(WaitOutcome::Cancelled);
            }
            if start_time.elapsed() > timeout {
                debug!("solver pid {} timed out after {timeout:?}", child.id());
                terminate(child);
                return Ok(WaitOutcome::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Sends SIGTERM to the solver's process group, then SIGKILL if it is still
/// alive after [`TERMINATE_GRACE`], and reaps it.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        signal_group(child, libc::SIGTERM);
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => {
                    // The group may still hold our pipes open.
                    signal_group(child, libc::SIGKILL);
                    return;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(_) => break,
            }
        }
        signal_group(child, libc::SIGKILL);
    }
    if let Err(e) = child.kill() {
        if e.kind() != io::ErrorKind::InvalidInput {
            warn!("failed to kill solver process: {e}");
        }
    }
    let _ = child.wait();
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) has no memory-safety preconditions; a stale group id
    // only yields ESRCH.
    unsafe {
        libc::kill(-pgid, signal);
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    source.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn describe_exit(status: &ExitStatus) -> ExecutionStatus {
    if status.success() {
        return ExecutionStatus::Ok;
    }
    if let Some(code) = status.code() {
        return ExecutionStatus::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExecutionStatus::Crash(format!("Terminated by signal {signal}"));
        }
    }
    ExecutionStatus::Crash("Exited abnormally".to_string())
}

fn run_post_exec(
    observers: &mut [&mut dyn Observer],
    status: ExecutionStatus,
    output: Option<&ProcessOutput>,
) -> ExecutionStatus {
    let mut post_exec_error: Option<String> = None;
    for obs in observers.iter_mut() {
        if let Err(e) = obs.post_exec(&status, output) {
            let error_msg = format!("Observer '{}' post_exec failed: {}", obs.name(), e);
            warn!("{error_msg}");
            if post_exec_error.is_none() {
                post_exec_error = Some(error_msg);
            }
        }
    }
    match (status, post_exec_error) {
        (ExecutionStatus::Ok, Some(msg)) | (ExecutionStatus::Exited(_), Some(msg)) => {
            ExecutionStatus::ObserverError(msg)
        }
        (status, _) => status,
    }
}

impl<I: Input> Executor<I> for CommandExecutor {
    fn execute_sync(
        &mut self,
        input: &I,
        timeout: Duration,
        observers: &mut [&mut dyn Observer],
    ) -> ExecutionStatus {
        for obs in observers.iter_mut() {
            if let Err(e) = obs.pre_exec() {
                let error_msg = format!("Observer '{}' pre_exec failed: {}", obs.name(), e);
                warn!("{error_msg}");
                return ExecutionStatus::ObserverError(error_msg);
            }
        }

        if self.cancelled() {
            return run_post_exec(observers, ExecutionStatus::Cancelled, None);
        }

        let Some(program) = self.config.command.first() else {
            return run_post_exec(
                observers,
                ExecutionStatus::Other("Empty solver command".to_string()),
                None,
            );
        };
        let mut cmd = Command::new(program);
        cmd.args(&self.config.command[1..]);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        // Held until the solver has been reaped.
        let mut input_file = match tempfile::Builder::new().suffix(".cnf").tempfile() {
            Ok(f) => f,
            Err(e) => {
                return run_post_exec(
                    observers,
                    ExecutionStatus::Other(format!("Failed to create temp file: {e}")),
                    None,
                );
            }
        };
        if let Err(e) = input_file
            .write_all(input.as_bytes())
            .and_then(|_| input_file.flush())
        {
            return run_post_exec(
                observers,
                ExecutionStatus::Other(format!(
                    "Failed to write to temp file {:?}: {}",
                    input_file.path(),
                    e
                )),
                None,
            );
        }
        cmd.arg(input_file.path());

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child_process = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let error_msg =
                    format!("Failed to spawn command '{:?}': {}", self.config.command, e);
                warn!("{error_msg}");
                return run_post_exec(observers, ExecutionStatus::Other(error_msg), None);
            }
        };

        let stdout_reader = drain(child_process.stdout.take());
        let stderr_reader = drain(child_process.stderr.take());

        let wait_result = self.wait_with_timeout(&mut child_process, timeout);

        let mut process_output_data = ProcessOutput {
            stdout: collect(stdout_reader),
            stderr: collect(stderr_reader),
            ..Default::default()
        };

        let final_status = match wait_result {
            Ok(WaitOutcome::Exited(status)) => {
                process_output_data.exit_code = status.code();
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    process_output_data.signal = status.signal();
                }
                describe_exit(&status)
            }
            Ok(WaitOutcome::TimedOut) => ExecutionStatus::Timeout,
            Ok(WaitOutcome::Cancelled) => ExecutionStatus::Cancelled,
            Err(e) => {
                warn!("error waiting for solver process: {e}");
                terminate(&mut child_process);
                ExecutionStatus::Other(format!("Error waiting for child: {e}"))
            }
        };

        drop(input_file);

        run_post_exec(observers, final_status, Some(&process_output_data))
    }
}
