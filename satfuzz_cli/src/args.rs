use clap::Parser;
use satfuzz_core::CampaignArgs;
use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

pub const USAGE: &str = "Usage: satfuzz <sut_source_dir> <inputs_dir> [<seed>]";

#[derive(Parser, Debug)]
#[clap(
    name = "satfuzz",
    about,
    long_about = None,
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// Source directory of the solver under test. Must contain runsat.sh.
    sut_source_dir: PathBuf,
    /// Directory whose .cnf files are run before fuzzing starts.
    inputs_dir: PathBuf,
    /// Seed for the campaign's random number generator.
    #[arg(allow_hyphen_values = true)]
    seed: Option<String>,
}

#[derive(Error, Debug)]
pub enum ArgsError {
    #[error("{}", USAGE)]
    Usage(String),
    #[error("Error: {} is not an existing directory", path.display())]
    InvalidPath { path: PathBuf },
}

impl ArgsError {
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// The validated command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub sut_dir: PathBuf,
    pub inputs_dir: PathBuf,
    pub seed: Option<String>,
}

impl From<Invocation> for CampaignArgs {
    fn from(invocation: Invocation) -> Self {
        CampaignArgs {
            sut_dir: invocation.sut_dir,
            inputs_dir: invocation.inputs_dir,
            seed: invocation.seed,
        }
    }
}

fn require_dir(path: PathBuf) -> Result<PathBuf, ArgsError> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(ArgsError::InvalidPath { path })
    }
}

/// Parses the raw argument list, program name included, and checks that
/// both directories exist. The seed is passed through untouched.
pub fn validate_and_parse<I, T>(args: I) -> Result<Invocation, ArgsError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| ArgsError::Usage(e.to_string()))?;

    Ok(Invocation {
        sut_dir: require_dir(cli.sut_source_dir)?,
        inputs_dir: require_dir(cli.inputs_dir)?,
        seed: cli.seed,
    })
}
