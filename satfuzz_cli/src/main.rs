mod args;
mod driver;
mod signals;

use args::{ArgsError, Invocation};
use driver::DriverExit;
use satfuzz_core::{Fuzzer, FuzzerConfig, ShutdownToken};
use std::path::Path;
use std::time::Duration;

/// How long the fuzzer gets to save its results after a termination signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn build_fuzzer(invocation: Invocation, token: ShutdownToken) -> anyhow::Result<Fuzzer> {
    let config = FuzzerConfig::discover(Path::new("."))?;
    Ok(Fuzzer::new(invocation.into(), config, token)?)
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let invocation = match args::validate_and_parse(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(e) => {
            if let ArgsError::Usage(detail) = &e {
                log::debug!("argument parsing failed: {detail}");
            }
            println!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    let signals = signals::install_signal_handlers()?;

    match driver::run(invocation, signals, build_fuzzer, SHUTDOWN_GRACE).await? {
        DriverExit::Completed(summary) => {
            log::info!(
                "campaign finished after {} iterations: {} distinct crashes, {} total",
                summary.iterations,
                summary.distinct_crashes,
                summary.total_crashes
            );
            Ok(())
        }
        DriverExit::Terminated(termination) => {
            log::debug!("terminated by {}: {:?}", termination.kind, termination.shutdown);
            // The campaign thread may still be unwinding; do not wait for it.
            std::process::exit(termination.exit_code());
        }
    }
}
