use crate::executor::{ExecutionStatus, ProcessOutput};
use std::any::Any;

/// An `Observer` monitors a single execution of the solver and keeps
/// whatever it needs from it.
///
/// Observers are invoked by an `Executor` before (`pre_exec`) and after
/// (`post_exec`) the solver runs. The engine reads the collected data back
/// through the concrete observer type once the execution has finished.
pub trait Observer: Send + Sync {
    /// Returns a static string name identifying the observer.
    fn name(&self) -> &'static str;

    /// Called by the `Executor` immediately before the solver is spawned.
    ///
    /// Implementations typically clear whatever the previous execution left
    /// behind (often by calling `self.reset()`).
    fn pre_exec(&mut self) -> Result<(), anyhow::Error>;

    /// Called by the `Executor` once the solver has exited, timed out or been
    /// cancelled.
    ///
    /// # Arguments
    /// * `status`: The `ExecutionStatus` reported by the `Executor`.
    /// * `output`: The captured process output. `None` when the process could
    ///   not be spawned at all.
    fn post_exec(
        &mut self,
        status: &ExecutionStatus,
        output: Option<&ProcessOutput>,
    ) -> Result<(), anyhow::Error>;

    /// Resets the internal state of the observer.
    fn reset(&mut self) -> Result<(), anyhow::Error>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An observer that performs no actions and collects no data.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoOpObserver;

impl Observer for NoOpObserver {
    fn name(&self) -> &'static str {
        "NoOpObserver"
    }

    fn pre_exec(&mut self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    fn post_exec(
        &mut self,
        _status: &ExecutionStatus,
        _output: Option<&ProcessOutput>,
    ) -> Result<(), anyhow::Error> {
        Ok(())
    }

    fn reset(&mut self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Keeps the standard error stream of the most recent execution.
///
/// Sanitizer reports are written to stderr, so this is what the oracle
/// examines to decide whether, and how, the solver crashed. Invalid UTF-8
/// is decoded lossily.
#[derive(Default, Debug, Clone)]
pub struct StderrObserver {
    last_stderr: Option<String>,
}

impl StderrObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stderr text of the last execution, or an empty string if nothing
    /// was captured.
    pub fn stderr(&self) -> &str {
        self.last_stderr.as_deref().unwrap_or("")
    }

    pub fn take(&mut self) -> String {
        self.last_stderr.take().unwrap_or_default()
    }
}

impl Observer for StderrObserver {
    fn name(&self) -> &'static str {
        "StderrObserver"
    }

    fn pre_exec(&mut self) -> Result<(), anyhow::Error> {
        self.reset()
    }

    fn post_exec(
        &mut self,
        _status: &ExecutionStatus,
        output: Option<&ProcessOutput>,
    ) -> Result<(), anyhow::Error> {
        self.last_stderr = output.map(|out| String::from_utf8_lossy(&out.stderr).into_owned());
        Ok(())
    }

    fn reset(&mut self) -> Result<(), anyhow::Error> {
        self.last_stderr = None;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
