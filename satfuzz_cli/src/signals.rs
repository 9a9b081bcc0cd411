use std::fmt;
use std::io;
use tokio::sync::mpsc;

/// The signals that end a campaign. They all take the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationKind {
    Interrupt,
    Quit,
    Terminate,
}

impl fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationKind::Interrupt => "SIGINT",
            TerminationKind::Quit => "SIGQUIT",
            TerminationKind::Terminate => "SIGTERM",
        };
        f.write_str(name)
    }
}

const SIGNAL_BUFFER: usize = 8;

/// Registers handlers for interrupt, quit and terminate and forwards every
/// delivery into the returned channel.
///
/// The handlers are registered before this returns, so the default
/// disposition (killing the process) no longer applies. Must be called from
/// within a tokio runtime.
#[cfg(unix)]
pub fn install_signal_handlers() -> io::Result<mpsc::Receiver<TerminationKind>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);

    tokio::spawn(async move {
        loop {
            let kind = tokio::select! {
                Some(()) = interrupt.recv() => TerminationKind::Interrupt,
                Some(()) = quit.recv() => TerminationKind::Quit,
                Some(()) = terminate.recv() => TerminationKind::Terminate,
                else => break,
            };
            log::debug!("received {kind}");
            if tx.send(kind).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

#[cfg(not(unix))]
pub fn install_signal_handlers() -> io::Result<mpsc::Receiver<TerminationKind>> {
    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(TerminationKind::Interrupt).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}
