//! Generation of DIMACS CNF test cases from scratch.
//!
//! Each [`Generator`] produces a whole file. The strategies range from
//! well-formed inputs that stress the solver's search, through files whose
//! syntax is valid but whose header lies about its contents, to plain
//! garbage that only exercises the parser.

use crate::error::FuzzError;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use std::fmt::Write;

/// Clause lengths and their weights. Empty and unit clauses are rare but
/// kept: solvers that never validate operand counts tend to break on them.
const CLAUSE_LENGTH_DISTRIBUTION: [(usize, f64); 6] = [
    (0, 0.005),
    (1, 0.005),
    (2, 0.2475),
    (3, 0.2475),
    (4, 0.2475),
    (5, 0.2475),
];

/// Python's `string.printable`: digits, letters, punctuation and whitespace.
const PRINTABLE: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~ \t\n\r\x0b\x0c";

const I32_MAX: i64 = i32::MAX as i64;
const I32_MIN: i64 = i32::MIN as i64;

/// Tolerance used when checking that strategy weights sum to one.
const WEIGHT_EPSILON: f64 = 1e-9;

pub fn random_clause_len<R: Rng + ?Sized>(rng: &mut R) -> usize {
    let mut roll: f64 = rng.random();
    for (len, weight) in CLAUSE_LENGTH_DISTRIBUTION {
        if roll < weight {
            return len;
        }
        roll -= weight;
    }
    CLAUSE_LENGTH_DISTRIBUTION[CLAUSE_LENGTH_DISTRIBUTION.len() - 1].0
}

fn write_clause<R: Rng + ?Sized>(out: &mut String, rng: &mut R, max_var: i64) {
    let len = random_clause_len(rng);
    for i in 0..len {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{}", rng.random_range(-max_var..=max_var));
    }
}

pub trait Generator<R: Rng + ?Sized>: Send {
    fn name(&self) -> &'static str;
    fn generate(&self, rng: &mut R) -> Vec<u8>;
}

/// Syntactically and semantically valid CNF.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidGenerator;

impl<R: Rng + ?Sized> Generator<R> for ValidGenerator {
    fn name(&self) -> &'static str {
        "valid"
    }

    fn generate(&self, rng: &mut R) -> Vec<u8> {
        let num_vars = rng.random_range(3..5000i64);
        let num_clauses = rng.random_range(3000..10000usize);

        let mut out = format!("p cnf {num_vars} {num_clauses}\n");
        for _ in 0..num_clauses {
            write_clause(&mut out, rng, num_vars);
            out.push_str(" 0\n");
        }
        out.into_bytes()
    }
}

/// Valid header, but most clauses are missing their `0` terminator.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvalidSyntaxGenerator;

impl<R: Rng + ?Sized> Generator<R> for InvalidSyntaxGenerator {
    fn name(&self) -> &'static str {
        "invalid-syntax"
    }

    fn generate(&self, rng: &mut R) -> Vec<u8> {
        let num_vars = rng.random_range(3..5000i64);
        let num_clauses = rng.random_range(3000..10000usize);

        let mut out = format!("p cnf {num_vars} {num_clauses}\n");
        for _ in 0..num_clauses {
            write_clause(&mut out, rng, num_vars);
            if rng.random_bool(0.3) {
                out.push_str(" 0");
            }
            out.push('\n');
        }
        out.into_bytes()
    }
}

/// Well-formed clauses under a header whose counts are unrelated to the
/// body, occasionally with a variable count that overflows a 32-bit int.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvalidSemanticsGenerator;

impl InvalidSemanticsGenerator {
    fn num_clauses<R: Rng + ?Sized>(rng: &mut R) -> usize {
        rng.random_range(3..1000)
    }

    fn num_vars<R: Rng + ?Sized>(rng: &mut R) -> i64 {
        rng.random_range(3..5000)
    }

    fn overflowed_int<R: Rng + ?Sized>(rng: &mut R) -> i64 {
        if rng.random_bool(0.75) {
            rng.random_range(I32_MAX + 1..2 * I32_MAX)
        } else {
            rng.random_range(2 * I32_MIN..I32_MIN - 1)
        }
    }
}

impl<R: Rng + ?Sized> Generator<R> for InvalidSemanticsGenerator {
    fn name(&self) -> &'static str {
        "invalid-semantics"
    }

    fn generate(&self, rng: &mut R) -> Vec<u8> {
        let mut declared_vars = Self::num_vars(rng);
        if rng.random_bool(0.1) {
            declared_vars = Self::overflowed_int(rng);
        }

        let mut out = format!("p cnf {} {}\n", declared_vars, Self::num_clauses(rng));
        for _ in 0..Self::num_clauses(rng) {
            let len = random_clause_len(rng);
            for i in 0..len {
                if i > 0 {
                    out.push(' ');
                }
                let low = -Self::num_vars(rng);
                let high = Self::num_vars(rng);
                let _ = write!(out, "{}", rng.random_range(low..=high));
            }
            out.push_str(" 0\n");
        }
        out.into_bytes()
    }
}

/// A `p cnf` prefix followed by printable noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomGenerator;

impl RandomGenerator {
    fn random_string<R: Rng + ?Sized>(rng: &mut R, min_len: usize, max_len: usize) -> String {
        let len = rng.random_range(min_len..=max_len);
        (0..len)
            .map(|_| PRINTABLE[rng.random_range(0..PRINTABLE.len())] as char)
            .collect()
    }
}

impl<R: Rng + ?Sized> Generator<R> for RandomGenerator {
    fn name(&self) -> &'static str {
        "random"
    }

    fn generate(&self, rng: &mut R) -> Vec<u8> {
        let mut out = format!(
            "p cnf {} {}\n",
            Self::random_string(rng, 0, 5),
            Self::random_string(rng, 0, 5)
        );
        for _ in 0..rng.random_range(0..100) {
            out.push_str(&Self::random_string(rng, 0, 3));
            out.push(' ');
            if rng.random_bool(0.5) {
                out.push('0');
            }
            if rng.random_bool(0.85) {
                out.push('\n');
            }
        }
        out.into_bytes()
    }
}

/// Picks one of several generators per file according to fixed weights.
pub struct WeightedGenerator<R: Rng + ?Sized> {
    strategies: Vec<Box<dyn Generator<R>>>,
    index: WeightedIndex<f64>,
}

impl<R: Rng + ?Sized> WeightedGenerator<R> {
    /// Fails with [`FuzzError::InvalidWeights`] unless the weights are
    /// non-negative and sum to one.
    pub fn new(weighted: Vec<(Box<dyn Generator<R>>, f64)>) -> Result<Self, FuzzError> {
        let total: f64 = weighted.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() > WEIGHT_EPSILON {
            return Err(FuzzError::InvalidWeights(format!(
                "generator weights sum to {total}, expected 1"
            )));
        }
        let index = WeightedIndex::new(weighted.iter().map(|(_, w)| *w))
            .map_err(|e| FuzzError::InvalidWeights(format!("generator weights: {e}")))?;
        Ok(Self {
            strategies: weighted.into_iter().map(|(s, _)| s).collect(),
            index,
        })
    }

    pub fn generate(&self, rng: &mut R) -> Vec<u8> {
        let strategy = &self.strategies[self.index.sample(rng)];
        strategy.generate(rng)
    }
}

impl<R: Rng + 'static> WeightedGenerator<R> {
    /// Valid 0.3, valid-syntax/invalid-semantics 0.5, invalid-syntax 0.1, random 0.1.
    pub fn standard() -> Result<Self, FuzzError> {
        Self::new(vec![
            (Box::new(ValidGenerator) as Box<dyn Generator<R>>, 0.3),
            (Box::new(InvalidSemanticsGenerator), 0.5),
            (Box::new(InvalidSyntaxGenerator), 0.1),
            (Box::new(RandomGenerator), 0.1),
        ])
    }
}
