//! Process lifecycle around a single campaign: build the engine, start it,
//! and make sure a termination signal turns into exactly one `shutdown`.

use crate::args::Invocation;
use crate::signals::TerminationKind;
use anyhow::Context;
use log::{debug, error, info, warn};
use satfuzz_core::{Campaign, CampaignSummary, ShutdownReport, ShutdownToken};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Exit status of a process stopped by a termination signal.
pub const TERMINATION_EXIT_CODE: i32 = 0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DriverError {
    #[error("An engine has already been assigned to this process")]
    AlreadyAssigned,
}

struct SlotState<E> {
    engine: Option<Arc<E>>,
    terminating: bool,
}

/// The process-wide handle to the engine, shared between the normal flow
/// and the termination path.
///
/// Assigned once, right before the campaign starts. The termination path
/// only ever reads it. Both sides decide under one lock, so either the
/// termination path sees the engine or the normal flow sees that
/// termination is already under way, never neither.
pub struct EngineSlot<E> {
    inner: Arc<Mutex<SlotState<E>>>,
}

impl<E> Clone for EngineSlot<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EngineSlot<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotState {
                engine: None,
                terminating: false,
            })),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Assigned,
    /// Termination was requested before the engine was in place; it must
    /// not be started.
    TerminationPending,
}

enum TerminationStart<E> {
    Engine(Arc<E>),
    NotAssigned,
    AlreadyRequested,
}

impl<E> EngineSlot<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn assign(&self, engine: Arc<E>) -> Result<Assignment, DriverError> {
        let mut state = self.lock();
        if state.engine.is_some() {
            return Err(DriverError::AlreadyAssigned);
        }
        state.engine = Some(engine);
        if state.terminating {
            Ok(Assignment::TerminationPending)
        } else {
            Ok(Assignment::Assigned)
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.lock().terminating
    }

    fn begin_termination(&self) -> TerminationStart<E> {
        let mut state = self.lock();
        if state.terminating {
            return TerminationStart::AlreadyRequested;
        }
        state.terminating = true;
        match &state.engine {
            Some(engine) => TerminationStart::Engine(Arc::clone(engine)),
            None => TerminationStart::NotAssigned,
        }
    }
}

/// What happened to the engine when a termination signal was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The signal arrived before an engine existed.
    NotAssigned,
    /// An earlier signal already took care of shutdown.
    AlreadyRequested,
    /// `shutdown` returned; errors are kept as text.
    Completed(Result<ShutdownReport, String>),
    /// `shutdown` did not return within the grace period.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub kind: TerminationKind,
    pub shutdown: ShutdownOutcome,
}

impl Termination {
    /// Termination is never a failure, whatever `shutdown` reported.
    pub fn exit_code(&self) -> i32 {
        TERMINATION_EXIT_CODE
    }
}

#[derive(Debug)]
pub enum DriverExit {
    /// `start` returned on its own.
    Completed(CampaignSummary),
    Terminated(Termination),
}

/// Handles one termination signal: cancels the campaign and, the first
/// time only, runs the engine's `shutdown` bounded by `grace`.
pub async fn on_termination_signal<E>(
    kind: TerminationKind,
    slot: &EngineSlot<E>,
    token: &ShutdownToken,
    grace: Duration,
) -> Termination
where
    E: Campaign + 'static,
{
    token.trigger();
    let shutdown = match slot.begin_termination() {
        TerminationStart::AlreadyRequested => {
            debug!("{kind} ignored, shutdown already requested");
            ShutdownOutcome::AlreadyRequested
        }
        TerminationStart::NotAssigned => {
            info!("{kind} received before the fuzzer was started, exiting");
            ShutdownOutcome::NotAssigned
        }
        TerminationStart::Engine(engine) => {
            info!("{kind} received, shutting down the fuzzer");
            let task = tokio::task::spawn_blocking(move || engine.shutdown());
            match tokio::time::timeout(grace, task).await {
                Ok(Ok(Ok(report))) => ShutdownOutcome::Completed(Ok(report)),
                Ok(Ok(Err(e))) => {
                    error!("fuzzer shutdown failed: {e}");
                    ShutdownOutcome::Completed(Err(e.to_string()))
                }
                Ok(Err(join_error)) => {
                    error!("fuzzer shutdown panicked: {join_error}");
                    ShutdownOutcome::Completed(Err(join_error.to_string()))
                }
                Err(_) => {
                    warn!("fuzzer shutdown did not finish within {grace:?}, exiting anyway");
                    ShutdownOutcome::TimedOut
                }
            }
        }
    };
    Termination { kind, shutdown }
}

/// Waits for the first signal and reports how it was handled through
/// `done`. Later signals are still consumed so they cannot kill the
/// process, but never reach the engine.
pub async fn watch_termination<E>(
    mut signals: mpsc::Receiver<TerminationKind>,
    slot: EngineSlot<E>,
    token: ShutdownToken,
    grace: Duration,
    done: oneshot::Sender<Termination>,
) where
    E: Campaign + 'static,
{
    let Some(kind) = signals.recv().await else {
        debug!("signal channel closed");
        return;
    };
    let termination = on_termination_signal(kind, &slot, &token, grace).await;
    let _ = done.send(termination);

    while let Some(kind) = signals.recv().await {
        on_termination_signal(kind, &slot, &token, grace).await;
    }
}

/// Runs one campaign to completion or termination.
///
/// `build` constructs the engine from the validated invocation and the
/// shutdown token the termination path will trigger. Errors from `build`
/// and from `start` are returned unchanged unless termination is already
/// under way.
pub async fn run<E, F>(
    invocation: Invocation,
    signals: mpsc::Receiver<TerminationKind>,
    build: F,
    grace: Duration,
) -> anyhow::Result<DriverExit>
where
    E: Campaign + 'static,
    F: FnOnce(Invocation, ShutdownToken) -> anyhow::Result<E> + Send + 'static,
{
    let token = ShutdownToken::new();
    let slot: EngineSlot<E> = EngineSlot::new();
    let (done_tx, mut done_rx) = oneshot::channel();
    tokio::spawn(watch_termination(
        signals,
        slot.clone(),
        token.clone(),
        grace,
        done_tx,
    ));

    let build_token = token.clone();
    let building = tokio::task::spawn_blocking(move || build(invocation, build_token));
    let built = tokio::select! {
        Ok(termination) = &mut done_rx => return Ok(DriverExit::Terminated(termination)),
        built = building => built.context("fuzzer construction panicked")?,
    };
    let engine = match built {
        Ok(engine) => Arc::new(engine),
        Err(e) if slot.is_terminating() => {
            debug!("fuzzer construction failed during termination: {e:#}");
            return await_termination(done_rx).await;
        }
        Err(e) => return Err(e),
    };

    if slot.assign(Arc::clone(&engine))? == Assignment::TerminationPending {
        return await_termination(done_rx).await;
    }

    let campaign = Arc::clone(&engine);
    let running = tokio::task::spawn_blocking(move || campaign.start());
    tokio::select! {
        Ok(termination) = &mut done_rx => Ok(DriverExit::Terminated(termination)),
        started = running => {
            if slot.is_terminating() {
                if let Ok(Err(e)) = &started {
                    debug!("fuzzer stopped with an error during shutdown: {e}");
                }
                return await_termination(done_rx).await;
            }
            let summary = started.context("fuzzer thread panicked")??;
            Ok(DriverExit::Completed(summary))
        }
    }
}

/// Waits for the termination path to finish once it is known to be running.
async fn await_termination(done: oneshot::Receiver<Termination>) -> anyhow::Result<DriverExit> {
    let termination = done
        .await
        .context("termination watcher stopped before reporting")?;
    Ok(DriverExit::Terminated(termination))
}
