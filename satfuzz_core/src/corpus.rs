use crate::oracle::ProgramCrash;
use log::{debug, warn};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Defines errors that can arise while managing crashing inputs and the
/// output directory they are saved to.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// An I/O error occurred while reading seeds or writing test cases.
    /// Contains a string describing the underlying I/O error.
    #[error("Corpus I/O error: {0}")]
    Io(String),

    /// A path that must be a directory exists but is something else.
    #[error("{0:?} exists but is not a directory")]
    NotADirectory(PathBuf),
}

impl From<std::io::Error> for CorpusError {
    fn from(err: std::io::Error) -> Self {
        CorpusError::Io(err.to_string())
    }
}

/// A solver run that crashed, together with what is needed to rank it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Where the crashing input lives inside the output directory.
    pub test_file: PathBuf,
    pub crash: ProgramCrash,
    /// Line coverage of the solver for this run, in percent.
    pub coverage: f64,
    /// Hex md5 of the input bytes.
    pub input_hash: String,
}

/// Hex md5 of `input`, the identity of a test case in the corpus.
pub fn input_hash(input: &[u8]) -> String {
    format!("{:x}", md5::compute(input))
}

impl RunOutcome {
    pub fn new(test_file: PathBuf, crash: ProgramCrash, coverage: f64, input: &[u8]) -> Self {
        Self {
            test_file,
            crash,
            coverage,
            input_hash: input_hash(input),
        }
    }

    /// File name of the saved input, as kept by [`OutputDir::retain_only`].
    pub fn file_name(&self) -> Option<String> {
        self.test_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// Heap entry ordering outcomes by coverage so the best run pops first.
#[derive(Debug, Clone)]
struct RankedOutcome(RunOutcome);

impl PartialEq for RankedOutcome {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedOutcome {}

impl PartialOrd for RankedOutcome {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedOutcome {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .coverage
            .total_cmp(&other.0.coverage)
            // Earlier files win ties.
            .then_with(|| other.0.test_file.cmp(&self.0.test_file))
    }
}

/// Every crashing input found so far, grouped by crash kind and ranked by
/// coverage within each kind.
#[derive(Debug, Default)]
pub struct CrashCorpus {
    by_crash: BTreeMap<ProgramCrash, BinaryHeap<RankedOutcome>>,
    seen: BTreeSet<(ProgramCrash, String)>,
    total: usize,
}

impl CrashCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `outcome`. Returns `true` if its crash kind had not been seen
    /// before.
    pub fn record(&mut self, outcome: RunOutcome) -> bool {
        let is_new = !self.by_crash.contains_key(&outcome.crash);
        self.seen.insert((outcome.crash.clone(), outcome.input_hash.clone()));
        self.by_crash
            .entry(outcome.crash.clone())
            .or_default()
            .push(RankedOutcome(outcome));
        self.total += 1;
        is_new
    }

    pub fn contains(&self, crash: &ProgramCrash) -> bool {
        self.by_crash.contains_key(crash)
    }

    /// Whether an input with this hash was already recorded for `crash`.
    pub fn is_duplicate(&self, crash: &ProgramCrash, input_hash: &str) -> bool {
        self.seen.contains(&(crash.clone(), input_hash.to_string()))
    }

    pub fn distinct_crashes(&self) -> usize {
        self.by_crash.len()
    }

    pub fn total_crashes(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Picks up to `n` outcomes, taking the best remaining run of each crash
    /// kind in turn so that as many distinct bugs as possible are kept.
    pub fn select_best(&self, n: usize) -> Vec<RunOutcome> {
        let to_save = n.min(self.total);
        let mut heaps: Vec<BinaryHeap<RankedOutcome>> = self.by_crash.values().cloned().collect();
        let mut chosen = Vec::with_capacity(to_save);
        while chosen.len() < to_save {
            for heap in heaps.iter_mut() {
                if chosen.len() == to_save {
                    break;
                }
                if let Some(RankedOutcome(outcome)) = heap.pop() {
                    chosen.push(outcome);
                }
            }
        }
        chosen
    }
}

/// The directory crashing inputs are written to.
#[derive(Debug, Clone)]
pub struct OutputDir {
    path: PathBuf,
}

impl OutputDir {
    const PLACEHOLDER_PREFIX: &'static str = "dummy_";
    const TEST_EXTENSION: &'static str = "cnf";

    /// Removes any previous directory at `path` and creates it afresh.
    ///
    /// When the old directory cannot be removed its contents are kept and a
    /// warning is printed; only failing to create the directory is an error.
    pub fn recreate(path: impl Into<PathBuf>) -> Result<Self, CorpusError> {
        let path = path.into();
        if path.exists() {
            if !path.is_dir() {
                return Err(CorpusError::NotADirectory(path));
            }
            if let Err(e) = fs::remove_dir_all(&path) {
                println!(
                    "Could not delete directory {} ({e}), continuing with previous contents",
                    path.display()
                );
                warn!("failed to clear output directory {path:?}: {e}");
            }
        }
        fs::create_dir_all(&path).map_err(|e| {
            CorpusError::Io(format!(
                "Failed to create output directory at {:?}: {}",
                path, e
            ))
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `name` inside the directory.
    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn crashing_test_path(&self, iteration: u64) -> PathBuf {
        self.join(&format!("crashing_test_{iteration}.{}", Self::TEST_EXTENSION))
    }

    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, CorpusError> {
        let dest = self.join(name);
        fs::write(&dest, bytes)
            .map_err(|e| CorpusError::Io(format!("Failed to write {:?}: {}", dest, e)))?;
        Ok(dest)
    }

    pub fn write_placeholder(&self, index: usize, bytes: &[u8]) -> Result<PathBuf, CorpusError> {
        self.write(
            &format!("{}{index}.{}", Self::PLACEHOLDER_PREFIX, Self::TEST_EXTENSION),
            bytes,
        )
    }

    fn is_placeholder(name: &str) -> bool {
        name.starts_with(Self::PLACEHOLDER_PREFIX)
            && name.ends_with(&format!(".{}", Self::TEST_EXTENSION))
    }

    /// Deletes one placeholder file, if any are left. Returns whether one
    /// was removed.
    pub fn remove_one_placeholder(&self) -> Result<bool, CorpusError> {
        let mut placeholders = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && Self::is_placeholder(&entry.file_name().to_string_lossy())
            {
                placeholders.push(entry.path());
            }
        }
        placeholders.sort();
        let Some(victim) = placeholders.first() else {
            return Ok(false);
        };
        match fs::remove_file(victim) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("could not remove placeholder {victim:?}: {e}");
                Ok(false)
            }
        }
    }

    /// Deletes every entry whose file name is not in `keep`. Returns how
    /// many entries were deleted.
    pub fn retain_only(&self, keep: &[String]) -> Result<usize, CorpusError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep.contains(&name) {
                continue;
            }
            let path = entry.path();
            let result = if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("could not remove {path:?} from output directory: {e}"),
            }
        }
        Ok(removed)
    }
}

/// Lists the regular `*.cnf` files directly inside `dir`, sorted by name.
pub fn collect_seed_files(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        CorpusError::Io(format!("Failed to read seed directory {:?}: {}", dir, e))
    })?;
    let mut seeds = Vec::new();
    for entry_result in entries {
        let entry = entry_result
            .map_err(|e| CorpusError::Io(format!("Error reading entry in {:?}: {}", dir, e)))?;
        let path = entry.path();
        let is_cnf = entry.file_name().to_string_lossy().ends_with(".cnf");
        if is_cnf && path.is_file() {
            seeds.push(path);
        }
    }
    seeds.sort();
    Ok(seeds)
}
