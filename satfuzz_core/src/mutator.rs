use crate::error::FuzzError;
use crate::generator::random_clause_len;
use crate::input::CnfFile;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

/// Probability that a mutator leaves the header's clause count untouched
/// even though it changed the number of lines.
const KEEP_STALE_HEADER_PROBABILITY: f64 = 0.15;
/// Upper bound (exclusive) for variables invented by the mutators.
const MAX_INVENTED_VAR: i64 = 1000;
/// Tolerance used when checking that strategy weights sum to one.
const WEIGHT_EPSILON: f64 = 1e-9;

/// A `Mutator` derives a new test case from an existing CNF file.
///
/// Mutators are the engine's second source of inputs next to the
/// generators: they take a crashing case off the work queue and perturb it,
/// hoping to reach the same bug with more coverage or a different bug
/// nearby.
///
/// # Type Parameters
/// * `R`: The type of random number generator used for mutation decisions.
pub trait Mutator<R: Rng + ?Sized>: Send {
    fn name(&self) -> &'static str;

    /// Produces the bytes of the mutated file, header included.
    fn mutate(&self, file: &CnfFile, rng: &mut R) -> Vec<u8>;
}

/// Rewrites the clause count of a `p cnf <atoms> <clauses>` header.
///
/// Occasionally the stale header is kept on purpose, and headers that do not
/// have four tokens are returned unchanged.
pub fn change_number_of_clauses<R: Rng + ?Sized>(header: &str, clauses: usize, rng: &mut R) -> String {
    if rng.random_bool(KEEP_STALE_HEADER_PROBABILITY) {
        return header.to_string();
    }
    let headings: Vec<&str> = header.split_whitespace().collect();
    if headings.len() != 4 {
        return header.to_string();
    }
    format!("{} {} {} {}", headings[0], headings[1], headings[2], clauses)
}

fn join_lines(header: String, body: Vec<String>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(header);
    out.extend(body);
    out.join("\n").into_bytes()
}

fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches('0').trim_end()
}

/// Merges randomly chosen neighbouring lines into one.
///
/// The first line of a merged pair usually loses its `0` terminator, the
/// second one rarely does, so merges mostly produce one long valid clause
/// and sometimes a clause with a terminator in the middle.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineMergerMutator;

impl<R: Rng + ?Sized> Mutator<R> for LineMergerMutator {
    fn name(&self) -> &'static str {
        "line-merger"
    }

    fn mutate(&self, file: &CnfFile, rng: &mut R) -> Vec<u8> {
        let delete_first_zero = rng.random_bool(0.9);
        let delete_second_zero = rng.random_bool(0.1);

        let lines = &file.lines;
        let mut out = Vec::with_capacity(lines.len());
        let mut i = 0;
        while i < lines.len() {
            if i + 1 < lines.len() && rng.random_bool(0.10) {
                let fst = if delete_first_zero {
                    strip_terminator(&lines[i])
                } else {
                    lines[i].as_str()
                };
                let snd = if delete_second_zero {
                    strip_terminator(&lines[i + 1])
                } else {
                    lines[i + 1].as_str()
                };
                out.push(format!("{fst} {snd}"));
                i += 2;
            } else {
                out.push(lines[i].clone());
                i += 1;
            }
        }

        let header = change_number_of_clauses(&file.header, out.len(), rng);
        join_lines(header, out)
    }
}

/// Either drops about a quarter of the lines or inserts a fresh random
/// clause after about a quarter of them; which of the two is decided once
/// per file.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineRemoverMutator;

impl LineRemoverMutator {
    fn generate_new_line<R: Rng + ?Sized>(file: &CnfFile, rng: &mut R) -> String {
        let num_vars = match file.declared_atoms {
            Some(atoms) if atoms > 0 && rng.random_bool(0.5) => atoms,
            _ => rng.random_range(1..MAX_INVENTED_VAR),
        };
        (0..random_clause_len(rng))
            .map(|_| rng.random_range(-num_vars..=num_vars).to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<R: Rng + ?Sized> Mutator<R> for LineRemoverMutator {
    fn name(&self) -> &'static str {
        "line-remover"
    }

    fn mutate(&self, file: &CnfFile, rng: &mut R) -> Vec<u8> {
        let remove = rng.random_bool(0.5);
        let mut out = Vec::with_capacity(file.lines.len());
        for line in &file.lines {
            if !rng.random_bool(0.25) {
                out.push(line.clone());
                continue;
            }
            if !remove {
                out.push(line.clone());
                out.push(Self::generate_new_line(file, rng));
            }
        }

        let header = change_number_of_clauses(&file.header, out.len(), rng);
        join_lines(header, out)
    }
}

/// Rewrites literals inside about a quarter of the clauses: flips signs,
/// and either removes literals or inserts new ones (decided once per file).
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomChangerMutator;

impl AtomChangerMutator {
    fn flip_sign(atom: &str) -> String {
        match atom.strip_prefix('-') {
            Some(positive) => positive.to_string(),
            None => format!("-{atom}"),
        }
    }

    fn new_atom<R: Rng + ?Sized>(rng: &mut R) -> String {
        let var = rng.random_range(1..MAX_INVENTED_VAR);
        if rng.random_bool(0.5) {
            format!("-{var}")
        } else {
            var.to_string()
        }
    }
}

impl<R: Rng + ?Sized> Mutator<R> for AtomChangerMutator {
    fn name(&self) -> &'static str {
        "atom-changer"
    }

    fn mutate(&self, file: &CnfFile, rng: &mut R) -> Vec<u8> {
        let remove = rng.random_bool(0.5);
        let mut out = Vec::with_capacity(file.lines.len());
        for line in &file.lines {
            if !rng.random_bool(0.25) {
                out.push(line.clone());
                continue;
            }
            let atoms: Vec<&str> = line.split(' ').collect();
            let mut new_line: Vec<String> = Vec::with_capacity(atoms.len() + 1);
            // The last token is the terminator and is re-appended below.
            for atom in &atoms[..atoms.len() - 1] {
                if atom.is_empty() {
                    continue;
                }
                let roll: f64 = rng.random();
                if roll < 0.25 {
                    new_line.push(Self::flip_sign(atom));
                } else if roll < 0.5 {
                    if !remove {
                        new_line.push(atom.to_string());
                        new_line.push(Self::new_atom(rng));
                    }
                } else {
                    new_line.push(atom.to_string());
                }
            }
            new_line.push("0".to_string());
            out.push(new_line.join(" "));
        }
        join_lines(file.header.clone(), out)
    }
}

/// Replaces about a quarter of the body's bytes with random bytes. The
/// header is left intact so the solver gets past its first check.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteMutator;

impl<R: Rng + ?Sized> Mutator<R> for ByteMutator {
    fn name(&self) -> &'static str {
        "byte"
    }

    fn mutate(&self, file: &CnfFile, rng: &mut R) -> Vec<u8> {
        let body = file.lines.join("\n");
        let mut out = Vec::with_capacity(file.header.len() + 1 + body.len());
        out.extend_from_slice(file.header.as_bytes());
        out.push(b'\n');
        for byte in body.bytes() {
            if rng.random_bool(0.25) {
                out.push(rng.random());
            } else {
                out.push(byte);
            }
        }
        out
    }
}

/// Picks one of several mutators per file according to fixed weights.
pub struct WeightedMutator<R: Rng + ?Sized> {
    strategies: Vec<Box<dyn Mutator<R>>>,
    index: WeightedIndex<f64>,
}

impl<R: Rng + ?Sized> WeightedMutator<R> {
    /// Fails with [`FuzzError::InvalidWeights`] unless the weights are
    /// non-negative and sum to one.
    pub fn new(weighted: Vec<(Box<dyn Mutator<R>>, f64)>) -> Result<Self, FuzzError> {
        let total: f64 = weighted.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() > WEIGHT_EPSILON {
            return Err(FuzzError::InvalidWeights(format!(
                "mutator weights sum to {total}, expected 1"
            )));
        }
        let index = WeightedIndex::new(weighted.iter().map(|(_, w)| *w))
            .map_err(|e| FuzzError::InvalidWeights(format!("mutator weights: {e}")))?;
        Ok(Self {
            strategies: weighted.into_iter().map(|(s, _)| s).collect(),
            index,
        })
    }

    /// Returns the name of the chosen strategy together with the mutated bytes.
    pub fn mutate(&self, file: &CnfFile, rng: &mut R) -> (&'static str, Vec<u8>) {
        let strategy = &self.strategies[self.index.sample(rng)];
        (strategy.name(), strategy.mutate(file, rng))
    }
}

impl<R: Rng + 'static> WeightedMutator<R> {
    /// Line merger 0.2, line remover 0.2, atom changer 0.4, byte mutator 0.2.
    pub fn standard() -> Result<Self, FuzzError> {
        Self::new(vec![
            (Box::new(LineMergerMutator) as Box<dyn Mutator<R>>, 0.2),
            (Box::new(LineRemoverMutator), 0.2),
            (Box::new(AtomChangerMutator), 0.4),
            (Box::new(ByteMutator), 0.2),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn sample_file(clauses: usize) -> CnfFile {
        let mut text = format!("p cnf 50 {clauses}");
        for i in 0..clauses {
            let v = (i % 50) as i64 + 1;
            text.push_str(&format!("\n{} -{} {} 0", v, (v % 50) + 1, ((v + 7) % 50) + 1));
        }
        CnfFile::parse(text.as_bytes()).unwrap()
    }

    fn parse(bytes: &[u8]) -> CnfFile {
        CnfFile::parse(bytes).expect("mutated file should keep a header and body")
    }

    #[test]
    fn header_rewrite_sets_clause_count_or_keeps_header() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut rewritten = 0;
        for _ in 0..200 {
            let header = change_number_of_clauses("p cnf 10 20", 7, &mut rng);
            if header == "p cnf 10 7" {
                rewritten += 1;
            } else {
                assert_eq!(header, "p cnf 10 20");
            }
        }
        assert!(rewritten > 140, "header rewritten only {rewritten} times");

        assert_eq!(
            change_number_of_clauses("p cnf 10", 7, &mut rng),
            "p cnf 10".to_string()
        );
    }

    #[test]
    fn line_merger_never_grows_the_file() {
        let file = sample_file(200);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mutated = parse(&LineMergerMutator.mutate(&file, &mut rng));
        assert!(mutated.actual_clauses < 200);
        assert!(mutated.actual_clauses >= 100);
        if let Some(declared) = mutated.declared_clauses {
            assert!(declared == 200 || declared == mutated.actual_clauses as i64);
        }
    }

    #[test]
    fn line_remover_either_shrinks_or_grows() {
        let file = sample_file(200);
        for seed in 0..10 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mutated = parse(&LineRemoverMutator.mutate(&file, &mut rng));
            assert_ne!(mutated.actual_clauses, 200, "seed {seed} changed nothing");
            assert!(mutated.lines.iter().all(|l| l.len() < 64));
        }
    }

    #[test]
    fn atom_changer_keeps_header_and_line_count() {
        let file = sample_file(100);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mutated = parse(&AtomChangerMutator.mutate(&file, &mut rng));
        assert_eq!(mutated.header, file.header);
        assert_eq!(mutated.actual_clauses, 100);
        assert!(mutated.lines.iter().all(|l| l.ends_with('0')));
        assert_ne!(mutated.lines, file.lines);
    }

    #[test]
    fn flip_sign_round_trips() {
        assert_eq!(AtomChangerMutator::flip_sign("5"), "-5");
        assert_eq!(AtomChangerMutator::flip_sign("-5"), "5");
    }

    #[test]
    fn byte_mutator_preserves_header_and_length() {
        let file = sample_file(50);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mutated = ByteMutator.mutate(&file, &mut rng);
        let original = join_lines(file.header.clone(), file.lines.clone());
        assert_eq!(mutated.len(), original.len());
        assert!(mutated.starts_with(b"p cnf 50 50\n"));
        assert_ne!(mutated, original);
    }

    #[test]
    fn weighted_mutator_rejects_bad_weights() {
        let result = WeightedMutator::<ChaCha8Rng>::new(vec![(
            Box::new(ByteMutator) as Box<dyn Mutator<ChaCha8Rng>>,
            0.4,
        )]);
        assert!(matches!(result, Err(FuzzError::InvalidWeights(_))));
    }

    #[test]
    fn weighted_mutator_uses_every_strategy() {
        let mutator = WeightedMutator::<ChaCha8Rng>::standard().unwrap();
        let file = sample_file(20);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let (name, bytes) = mutator.mutate(&file, &mut rng);
            assert!(!bytes.is_empty());
            seen.insert(name);
        }
        assert_eq!(seen.len(), 4, "strategies seen: {seen:?}");
    }
}
