use log::{debug, warn};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use thiserror::Error;

static FILE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^File '(.+)'$").expect("valid gcov file regex"));
static LINES_EXECUTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Lines executed:\s*([0-9.]+)% of (\d+)$").expect("valid gcov summary regex")
});

/// Sources outside the solver tree (system headers) do not count.
const SYSTEM_PREFIXES: &[&str] = &["/usr/", "/opt/", "<built-in>"];

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("I/O error while scanning {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

/// Measures how much of the solver the last execution covered.
pub trait CoverageProbe: Send {
    /// Returns line coverage of the solver in `sut_dir` as a percentage.
    fn measure(&mut self, sut_dir: &Path) -> Result<f64, CoverageError>;

    /// Throws away counters left by a run that is not going to be measured.
    fn discard(&mut self, _sut_dir: &Path) -> Result<(), CoverageError> {
        Ok(())
    }
}

/// For solvers built without coverage instrumentation. Always reports 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProbe;

impl CoverageProbe for NullProbe {
    fn measure(&mut self, _sut_dir: &Path) -> Result<f64, CoverageError> {
        Ok(0.0)
    }
}

/// Reads gcc `--coverage` counters through `gcov`.
#[derive(Debug, Clone)]
pub struct GcovProbe {
    gcov_binary: String,
    reset_counters: bool,
}

impl GcovProbe {
    pub fn new(gcov_binary: impl Into<String>, reset_counters: bool) -> Self {
        Self {
            gcov_binary: gcov_binary.into(),
            reset_counters,
        }
    }

    fn run_gcov(&self, dir: &Path, files: &[PathBuf]) -> Result<String, CoverageError> {
        let output = Command::new(&self.gcov_binary)
            .arg("-n")
            .args(files.iter().filter_map(|f| f.file_name()))
            .current_dir(dir)
            .output()
            .map_err(|source| CoverageError::Spawn {
                binary: self.gcov_binary.clone(),
                source,
            })?;
        if !output.status.success() {
            warn!(
                "{} exited with {} in {dir:?}: {}",
                self.gcov_binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Collects every `.gcda` file under `root`, grouped by directory.
pub fn find_gcda_files(root: &Path) -> Result<BTreeMap<PathBuf, Vec<PathBuf>>, CoverageError> {
    let mut grouped: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| CoverageError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| CoverageError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|source| CoverageError::Io {
                path: path.clone(),
                source,
            })?;
            if file_type.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "gcda") {
                grouped.entry(dir.clone()).or_default().push(path);
            }
        }
    }
    for files in grouped.values_mut() {
        files.sort();
    }
    Ok(grouped)
}

/// Totals `gcov` stdout into (executed lines, executable lines), skipping
/// system headers and the per-object summaries that follow no `File` line.
pub fn parse_gcov_summary(output: &str) -> (f64, u64) {
    let mut executed = 0.0;
    let mut total = 0;
    let mut current_file: Option<String> = None;
    for line in output.lines().map(str::trim) {
        if let Some(caps) = FILE_LINE.captures(line) {
            current_file = Some(caps[1].to_string());
            continue;
        }
        let Some(caps) = LINES_EXECUTED.captures(line) else {
            continue;
        };
        let Some(file) = current_file.take() else {
            continue;
        };
        if SYSTEM_PREFIXES.iter().any(|prefix| file.starts_with(prefix)) {
            continue;
        }
        let (Ok(percent), Ok(lines)) = (caps[1].parse::<f64>(), caps[2].parse::<u64>()) else {
            continue;
        };
        executed += percent / 100.0 * lines as f64;
        total += lines;
    }
    (executed, total)
}

impl CoverageProbe for GcovProbe {
    fn measure(&mut self, sut_dir: &Path) -> Result<f64, CoverageError> {
        let grouped = find_gcda_files(sut_dir)?;
        if grouped.is_empty() {
            debug!("no .gcda files under {sut_dir:?}, reporting zero coverage");
            return Ok(0.0);
        }

        let mut executed = 0.0;
        let mut total = 0;
        for (dir, files) in &grouped {
            let (dir_executed, dir_total) = parse_gcov_summary(&self.run_gcov(dir, files)?);
            executed += dir_executed;
            total += dir_total;
        }

        if self.reset_counters {
            remove_counters(&grouped);
        }

        if total == 0 {
            return Ok(0.0);
        }
        Ok(100.0 * executed / total as f64)
    }

    fn discard(&mut self, sut_dir: &Path) -> Result<(), CoverageError> {
        if self.reset_counters {
            remove_counters(&find_gcda_files(sut_dir)?);
        }
        Ok(())
    }
}

fn remove_counters(grouped: &BTreeMap<PathBuf, Vec<PathBuf>>) {
    for file in grouped.values().flatten() {
        if let Err(e) = fs::remove_file(file) {
            warn!("could not reset coverage counters {file:?}: {e}");
        }
    }
}
