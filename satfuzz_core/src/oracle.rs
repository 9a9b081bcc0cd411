use crate::executor::ExecutionStatus;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static ASAN_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ERROR: AddressSanitizer: ([A-Za-z0-9_-]+)").expect("valid ASan regex")
});
static LSAN_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ERROR: LeakSanitizer: detected memory leaks").expect("valid LSan regex")
});
static UBSAN_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\S+?):(\d+):\d+: runtime error: (.+)$").expect("valid UBSan regex")
});
/// A symbolized stack frame carrying a source location, e.g.
/// `#1 0x4f2a10 in parse_clause /src/solver/parser.c:88:13`.
static FRAME_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*#\d+ 0x[0-9a-fA-F]+ in \S+ (\S+?):(\d+)(?::\d+)?\s*$")
        .expect("valid frame regex")
});
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\b(0x[0-9a-fA-F]+|\d+)\b").expect("valid number regex"));

/// Source-tree fragments that identify sanitizer runtime or libc frames.
const RUNTIME_FRAME_MARKERS: &[&str] = &["compiler-rt", "sanitizer_common", "/libc", "libc-"];

/// What class of failure a crash belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrashKind {
    /// `ERROR: AddressSanitizer: <kind>`, e.g. `heap-buffer-overflow`.
    AddressSanitizer(String),
    LeakSanitizer,
    /// A UBSan `runtime error:` message with its numeric operands blanked.
    UndefinedBehavior(String),
    /// Terminated by a signal without any sanitizer report.
    Signal(String),
}

/// A deduplicated crash: the kind of failure and, when the report names
/// one, the first source location inside the solver.
///
/// Two crashing inputs with equal `ProgramCrash` values are considered the
/// same bug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramCrash {
    pub kind: CrashKind,
    pub location: Option<String>,
}

impl fmt::Display for ProgramCrash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CrashKind::AddressSanitizer(kind) => write!(f, "AddressSanitizer: {kind}")?,
            CrashKind::LeakSanitizer => write!(f, "LeakSanitizer: memory leak")?,
            CrashKind::UndefinedBehavior(msg) => write!(f, "runtime error: {msg}")?,
            CrashKind::Signal(desc) => write!(f, "{desc}")?,
        }
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}

/// An `Oracle` examines the outcome of a solver execution to determine
/// whether a bug has occurred.
pub trait Oracle: Send + Sync {
    /// Returns the crash described by `status` and `stderr`, or `None` if the
    /// run was uninteresting.
    fn examine(&self, status: &ExecutionStatus, stderr: &str) -> Option<ProgramCrash>;
}

/// Classifies sanitizer reports found on stderr.
///
/// AddressSanitizer takes precedence over LeakSanitizer, which takes
/// precedence over UndefinedBehaviorSanitizer. A run killed by a signal with
/// no sanitizer report is still a crash. Timeouts and cancelled runs never
/// are, whatever they printed.
#[derive(Debug, Default)]
pub struct SanitizerOracle;

impl SanitizerOracle {
    pub fn new() -> Self {
        SanitizerOracle
    }
}

fn first_solver_frame(report: &str) -> Option<String> {
    FRAME_LOCATION
        .captures_iter(report)
        .filter(|caps| {
            let file = &caps[1];
            !RUNTIME_FRAME_MARKERS
                .iter()
                .any(|marker| file.contains(marker))
        })
        .map(|caps| format!("{}:{}", &caps[1], &caps[2]))
        .next()
}

fn normalize_message(message: &str) -> String {
    NUMBER.replace_all(message.trim(), "N").into_owned()
}

/// Parses a sanitizer report. Exposed separately from the oracle so stderr
/// captured elsewhere can be classified too.
pub fn analyse_program_crash(stderr: &str) -> Option<ProgramCrash> {
    if let Some(caps) = ASAN_ERROR.captures(stderr) {
        let report = &stderr[caps.get(0)?.start()..];
        return Some(ProgramCrash {
            kind: CrashKind::AddressSanitizer(caps[1].to_string()),
            location: first_solver_frame(report),
        });
    }

    if let Some(found) = LSAN_ERROR.find(stderr) {
        return Some(ProgramCrash {
            kind: CrashKind::LeakSanitizer,
            location: first_solver_frame(&stderr[found.start()..]),
        });
    }

    UBSAN_ERROR.captures(stderr).map(|caps| ProgramCrash {
        kind: CrashKind::UndefinedBehavior(normalize_message(&caps[3])),
        location: Some(format!("{}:{}", &caps[1], &caps[2])),
    })
}

impl Oracle for SanitizerOracle {
    fn examine(&self, status: &ExecutionStatus, stderr: &str) -> Option<ProgramCrash> {
        match status {
            ExecutionStatus::Timeout | ExecutionStatus::Cancelled => None,
            ExecutionStatus::Crash(description) => {
                analyse_program_crash(stderr).or_else(|| {
                    Some(ProgramCrash {
                        kind: CrashKind::Signal(description.clone()),
                        location: None,
                    })
                })
            }
            _ => analyse_program_crash(stderr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASAN_REPORT: &str = "\
=================================================================
==4242==ERROR: AddressSanitizer: heap-buffer-overflow on address 0x602000000014 at pc 0x4f2a10
READ of size 4 at 0x602000000014 thread T0
    #0 0x4f2a10 in __interceptor_memcpy /llvm/compiler-rt/lib/asan/asan_interceptors.cpp:22:3
    #1 0x4f3b20 in parse_clause /src/solver/parser.c:88:13
    #2 0x4f3c30 in main /src/solver/main.c:12:5
SUMMARY: AddressSanitizer: heap-buffer-overflow /src/solver/parser.c:88:13 in parse_clause
";

    const UBSAN_REPORT: &str = "\
c parsing input
solver.c:120:17: runtime error: signed integer overflow: 2147483647 + 1 cannot be represented in type 'int'
s SATISFIABLE
";

    const LSAN_REPORT: &str = "\
==77==ERROR: LeakSanitizer: detected memory leaks

Direct leak of 64 byte(s) in 1 object(s) allocated from:
    #0 0x4a1b2c in malloc /llvm/compiler-rt/lib/asan/asan_malloc_linux.cpp:69:3
    #1 0x4c2d3e in new_clause /src/solver/clause.c:31:20
";

    #[test]
    fn classifies_address_sanitizer_report() {
        let crash = analyse_program_crash(ASAN_REPORT).expect("ASan report is a crash");
        assert_eq!(
            crash.kind,
            CrashKind::AddressSanitizer("heap-buffer-overflow".to_string())
        );
        assert_eq!(crash.location.as_deref(), Some("/src/solver/parser.c:88"));
        assert_eq!(
            crash.to_string(),
            "AddressSanitizer: heap-buffer-overflow at /src/solver/parser.c:88"
        );
    }

    #[test]
    fn classifies_ubsan_report_and_blanks_operands() {
        let crash = analyse_program_crash(UBSAN_REPORT).expect("UBSan report is a crash");
        assert_eq!(crash.location.as_deref(), Some("solver.c:120"));
        match &crash.kind {
            CrashKind::UndefinedBehavior(msg) => {
                assert_eq!(
                    msg,
                    "signed integer overflow: N + N cannot be represented in type 'int'"
                );
            }
            other => panic!("Expected UndefinedBehavior, got {other:?}"),
        }
    }

    #[test]
    fn ubsan_reports_with_different_operands_deduplicate() {
        let other = UBSAN_REPORT.replace("2147483647 + 1", "2147483600 + 99");
        assert_eq!(
            analyse_program_crash(UBSAN_REPORT),
            analyse_program_crash(&other)
        );
    }

    #[test]
    fn classifies_leak_report_skipping_allocator_frames() {
        let crash = analyse_program_crash(LSAN_REPORT).expect("LSan report is a crash");
        assert_eq!(crash.kind, CrashKind::LeakSanitizer);
        assert_eq!(crash.location.as_deref(), Some("/src/solver/clause.c:31"));
    }

    #[test]
    fn clean_stderr_is_not_a_crash() {
        assert!(analyse_program_crash("c done\ns UNSATISFIABLE\n").is_none());
        assert!(analyse_program_crash("").is_none());
    }

    #[test]
    fn oracle_reports_bare_signals() {
        let oracle = SanitizerOracle::new();
        let status = ExecutionStatus::Crash("Terminated by signal 11".to_string());
        let crash = oracle.examine(&status, "").expect("signal is a crash");
        assert_eq!(
            crash.kind,
            CrashKind::Signal("Terminated by signal 11".to_string())
        );
        assert!(crash.location.is_none());
    }

    #[test]
    fn oracle_prefers_sanitizer_report_over_signal() {
        let oracle = SanitizerOracle::new();
        let status = ExecutionStatus::Crash("Terminated by signal 6".to_string());
        let crash = oracle.examine(&status, ASAN_REPORT).unwrap();
        assert!(matches!(crash.kind, CrashKind::AddressSanitizer(_)));
    }

    #[test]
    fn oracle_reads_stderr_of_ordinary_exits() {
        let oracle = SanitizerOracle::new();
        assert!(oracle.examine(&ExecutionStatus::Exited(1), ASAN_REPORT).is_some());
        assert!(oracle.examine(&ExecutionStatus::Ok, UBSAN_REPORT).is_some());
        assert!(oracle.examine(&ExecutionStatus::Exited(10), "s SATISFIABLE").is_none());
    }

    #[test]
    fn oracle_ignores_timeouts_and_cancellation() {
        let oracle = SanitizerOracle::new();
        assert!(oracle.examine(&ExecutionStatus::Timeout, ASAN_REPORT).is_none());
        assert!(oracle.examine(&ExecutionStatus::Cancelled, ASAN_REPORT).is_none());
    }
}
