use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File looked up in the working directory by [`FuzzerConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "satfuzz.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TimeoutSettings {
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_ms: u64,
    #[serde(default = "default_mutation_timeout_ms")]
    pub mutation_ms: u64,
    #[serde(default = "default_provided_input_timeout_ms")]
    pub provided_input_ms: u64,
    /// Pause between a solver run and reading its coverage counters.
    #[serde(default = "default_pre_coverage_delay_ms")]
    pub pre_coverage_delay_ms: u64,
}

fn default_generation_timeout_ms() -> u64 {
    10_000
}
fn default_mutation_timeout_ms() -> u64 {
    40_000
}
fn default_provided_input_timeout_ms() -> u64 {
    60_000
}
fn default_pre_coverage_delay_ms() -> u64 {
    250
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            generation_ms: default_generation_timeout_ms(),
            mutation_ms: default_mutation_timeout_ms(),
            provided_input_ms: default_provided_input_timeout_ms(),
            pre_coverage_delay_ms: default_pre_coverage_delay_ms(),
        }
    }
}

impl TimeoutSettings {
    pub fn generation(&self) -> Duration {
        Duration::from_millis(self.generation_ms)
    }
    pub fn mutation(&self) -> Duration {
        Duration::from_millis(self.mutation_ms)
    }
    pub fn provided_input(&self) -> Duration {
        Duration::from_millis(self.provided_input_ms)
    }
    pub fn pre_coverage_delay(&self) -> Duration {
        Duration::from_millis(self.pre_coverage_delay_ms)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageType {
    #[default]
    Gcov,
    None,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CoverageSettings {
    #[serde(default)]
    pub coverage_type: CoverageType,
    #[serde(default = "default_gcov_binary")]
    pub gcov_binary: String,
    /// Delete `.gcda` counters after each measurement so every value covers
    /// a single run.
    #[serde(default = "default_reset_counters")]
    pub reset_counters: bool,
}

fn default_gcov_binary() -> String {
    "gcov".to_string()
}
fn default_reset_counters() -> bool {
    true
}

impl Default for CoverageSettings {
    fn default() -> Self {
        Self {
            coverage_type: CoverageType::default(),
            gcov_binary: default_gcov_binary(),
            reset_counters: default_reset_counters(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzerConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Script inside the SUT source directory that runs the solver on one file.
    #[serde(default = "default_solver_script")]
    pub solver_script: String,
    #[serde(default = "default_max_saved_tests")]
    pub max_saved_tests: usize,
    #[serde(default = "default_generation_probability")]
    pub generation_probability: f64,
    #[serde(default = "default_seed")]
    pub default_seed: u64,
    /// Stop after this many iterations instead of running until cancelled.
    #[serde(default)]
    pub max_iterations: Option<u64>,
    /// Fill the output directory with generated placeholders until real
    /// crashes replace them.
    #[serde(default = "default_placeholder_files")]
    pub placeholder_files: bool,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub coverage: CoverageSettings,
}

pub fn default_output_dir() -> PathBuf {
    PathBuf::from("fuzzed-tests")
}
fn default_solver_script() -> String {
    "runsat.sh".to_string()
}
pub fn default_max_saved_tests() -> usize {
    20
}
fn default_generation_probability() -> f64 {
    0.35
}
pub fn default_seed() -> u64 {
    42
}
fn default_placeholder_files() -> bool {
    true
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            solver_script: default_solver_script(),
            max_saved_tests: default_max_saved_tests(),
            generation_probability: default_generation_probability(),
            default_seed: default_seed(),
            max_iterations: None,
            placeholder_files: default_placeholder_files(),
            timeouts: TimeoutSettings::default(),
            coverage: CoverageSettings::default(),
        }
    }
}

impl FuzzerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: FuzzerConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Loads `satfuzz.toml` from `dir` if it exists, built-in defaults otherwise.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            log::info!("loading engine configuration from {candidate:?}");
            Self::load_from_file(&candidate)
        } else {
            log::debug!("no {CONFIG_FILE_NAME} in {dir:?}, using built-in defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.generation_probability) {
            return Err(ConfigError::Invalid {
                field: "generation-probability",
                reason: format!("{} is not within [0, 1]", self.generation_probability),
            });
        }
        if self.solver_script.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "solver-script",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
