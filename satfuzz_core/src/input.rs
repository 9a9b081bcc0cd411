pub trait Input: Clone + Send + Sync + std::fmt::Debug + 'static {
    fn as_bytes(&self) -> &[u8];
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
}

impl Input for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }
    fn len(&self) -> usize {
        self.len()
    }
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

/// A line-oriented view of a DIMACS CNF test case, as consumed by the mutators.
///
/// The header is kept verbatim. `declared_atoms` and `declared_clauses` are
/// only populated when both counts in a `p cnf <atoms> <clauses>` header
/// parse as integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnfFile {
    pub header: String,
    pub declared_atoms: Option<i64>,
    pub declared_clauses: Option<i64>,
    pub actual_clauses: usize,
    pub lines: Vec<String>,
}

impl CnfFile {
    /// Splits raw test case bytes into a header and body lines.
    ///
    /// Returns `None` when the file has fewer than two lines or when the
    /// header does not have exactly four whitespace-separated tokens; such
    /// files are not worth mutating structurally.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(bytes);
        let mut all_lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        if all_lines.len() < 2 {
            return None;
        }

        let header = all_lines.remove(0);
        let headings: Vec<&str> = header.split_whitespace().collect();
        if headings.len() != 4 {
            return None;
        }

        let (declared_atoms, declared_clauses) =
            match (headings[2].parse::<i64>(), headings[3].parse::<i64>()) {
                (Ok(atoms), Ok(clauses)) => (Some(atoms), Some(clauses)),
                _ => (None, None),
            };

        Some(Self {
            actual_clauses: all_lines.len(),
            header,
            declared_atoms,
            declared_clauses,
            lines: all_lines,
        })
    }
}
