pub mod config;
pub mod corpus;
pub mod coverage;
pub mod error;
pub mod executor;
pub mod feedback;
pub mod fuzzer;
pub mod generator;
pub mod input;
pub mod mutator;
pub mod observer;
pub mod oracle;
pub mod scheduler;
pub mod shutdown;

pub use config::{ConfigError, FuzzerConfig};
pub use corpus::{CorpusError, CrashCorpus, OutputDir, RunOutcome};
pub use coverage::{CoverageError, CoverageProbe, GcovProbe, NullProbe};
pub use error::FuzzError;
pub use executor::{CommandExecutor, CommandExecutorConfig, ExecutionStatus, Executor};
pub use feedback::{Feedback, MutationFeedback, Verdict};
pub use fuzzer::{Campaign, CampaignArgs, CampaignSummary, Fuzzer, ShutdownReport};
pub use generator::{Generator, WeightedGenerator};
pub use input::{CnfFile, Input};
pub use mutator::{Mutator, WeightedMutator};
pub use observer::{NoOpObserver, Observer, StderrObserver};
pub use oracle::{CrashKind, Oracle, ProgramCrash, SanitizerOracle};
pub use scheduler::{QueueScheduler, Scheduler, SchedulerError};
pub use shutdown::ShutdownToken;
