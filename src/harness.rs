//! Differential testing of `2^128 - 159` modular multiplication.
//!
//! A candidate implementation is fed the fixed boundary pairs from
//! [`MULMOD_VECTORS`] followed by pseudorandom pairs, and every answer is
//! compared with an independent reference field.  The first disagreement ends
//! the run.
//!
//! Candidates are either linked in-process (anything implementing
//! [`FieldArithmetic`]) or driven over the line protocol implemented by
//! [`encode_request`] / [`parse_response`], see [`crate::ExternalMulMod`].

use std::fmt;
use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant};

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::field::{FieldArithmetic, ShiftAddField, P128};
use crate::prng::OperandStream;

/// Boundary pairs every run starts with, in order.
pub const MULMOD_VECTORS: [(u128, u128); 5] = [
    (u128::MAX, 1),
    (u128::MAX - 5, 1),
    (u128::MAX - 5, 2),
    (P128, 1),
    (u128::MAX, u128::MAX),
];

/// Which part of a run an operand pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// One of the boundary pairs in [`MULMOD_VECTORS`].
    Fixed,
    /// A pseudorandom pair.
    Random,
}

/// A disagreement between candidate and reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Phase the failing pair belongs to.
    pub phase: Phase,
    /// Position of the pair within its phase.
    pub index: u64,
    /// Left operand.
    pub a: u128,
    /// Right operand.
    pub b: u128,
    /// Reference result.
    pub expected: u128,
    /// Candidate result.
    pub actual: u128,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mismatch on {:?} pair #{}: {:#034x} * {:#034x} expected {:#x}, got {:#x}",
            self.phase, self.index, self.a, self.b, self.expected, self.actual
        )
    }
}

/// Reasons a differential run stops.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{0}")]
    /// The candidate returned a wrong value.
    Mismatch(Box<Mismatch>),
    #[error("failed to start {program}: {source}")]
    /// The external candidate could not be started.
    Spawn {
        /// Program that was launched.
        program: String,
        /// Underlying launch failure.
        #[source]
        source: io::Error,
    },
    #[error("i/o failure talking to candidate: {0}")]
    /// Reading from or writing to the candidate failed (e.g. broken pipe).
    Io(#[from] io::Error),
    #[error("candidate closed its output before answering")]
    /// The candidate's output stream ended, or the candidate was stopped
    /// after an earlier failed exchange.
    Closed,
    #[error("no response from candidate within {0:?}")]
    /// The candidate did not answer in time.
    Timeout(Duration),
    #[error("malformed line {line:?}: {reason}")]
    /// A line did not follow the wire protocol.
    Protocol {
        /// Offending line, without its terminator.
        line: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Something that claims to compute `(a * b) mod (2^128 - 159)`.
pub trait MulModCandidate {
    /// Returns the candidate's answer for one pair.
    fn mul_mod(&mut self, a: u128, b: u128) -> Result<u128, HarnessError>;
}

impl<F: FieldArithmetic> MulModCandidate for F {
    fn mul_mod(&mut self, a: u128, b: u128) -> Result<u128, HarnessError> {
        Ok(FieldArithmetic::mul_mod(self, a, b))
    }
}

/// Summary of a run in which every pair agreed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarnessReport {
    /// Seed of the random phase.
    pub seed: u64,
    /// Number of boundary pairs checked.
    pub fixed: usize,
    /// Number of random pairs checked.
    pub random: u64,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

/// Fail-fast differential checker.
#[derive(Debug, Clone)]
pub struct DifferentialHarness<R = ShiftAddField> {
    reference: R,
    trials: u64,
    seed: u64,
}

impl DifferentialHarness<ShiftAddField> {
    /// Creates a harness using the shift-and-add reference over `2^128 - 159`.
    pub fn new(config: &HarnessConfig) -> Self {
        Self::with_reference(ShiftAddField::new(P128), config.trials, config.seed)
    }
}

impl<R: FieldArithmetic> DifferentialHarness<R> {
    /// Creates a harness with an explicit reference implementation.
    pub fn with_reference(reference: R, trials: u64, seed: u64) -> Self {
        Self {
            reference,
            trials,
            seed,
        }
    }

    /// Returns the seed of the random phase.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn check(
        &self,
        phase: Phase,
        index: u64,
        (a, b): (u128, u128),
        actual: u128,
    ) -> Result<(), HarnessError> {
        let expected = self.reference.mul_mod(a, b);
        if expected == actual {
            Ok(())
        } else {
            Err(HarnessError::Mismatch(Box::new(Mismatch {
                phase,
                index,
                a,
                b,
                expected,
                actual,
            })))
        }
    }

    /// Runs the boundary pairs, then the random pairs, one at a time.
    ///
    /// Each request is answered before the next is sent.
    ///
    /// # Errors
    ///
    /// Stops at the first [`HarnessError::Mismatch`] or candidate failure.
    pub fn run<C: MulModCandidate + ?Sized>(
        &self,
        candidate: &mut C,
    ) -> Result<HarnessReport, HarnessError> {
        let start = Instant::now();
        info!(seed = self.seed, trials = self.trials, "starting mulmod differential run");

        for (index, &pair) in MULMOD_VECTORS.iter().enumerate() {
            let actual = candidate.mul_mod(pair.0, pair.1)?;
            self.check(Phase::Fixed, index as u64, pair, actual)?;
            debug!(index, "boundary pair matched");
        }

        let mut stream = OperandStream::new(self.seed);
        for index in 0..self.trials {
            let pair = stream.next_pair();
            let actual = candidate.mul_mod(pair.0, pair.1)?;
            self.check(Phase::Random, index, pair, actual)?;
            if (index + 1) % 10_000 == 0 {
                debug!(checked = index + 1, "random pairs matched");
            }
        }

        let report = HarnessReport {
            seed: self.seed,
            fixed: MULMOD_VECTORS.len(),
            random: self.trials,
            elapsed: start.elapsed(),
        };
        info!(elapsed_ms = report.elapsed.as_millis() as u64, "all pairs matched");
        Ok(report)
    }
}

impl<R: FieldArithmetic + Sync> DifferentialHarness<R> {
    /// Checks an in-process candidate over the same pairs as [`Self::run`],
    /// spreading the random phase across threads.
    ///
    /// The reported mismatch is the lowest failing pair, so the outcome does
    /// not depend on scheduling.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Mismatch`] for the first disagreement.
    pub fn run_parallel<F: FieldArithmetic + Sync>(
        &self,
        candidate: &F,
    ) -> Result<HarnessReport, HarnessError> {
        let start = Instant::now();
        info!(seed = self.seed, trials = self.trials, "starting parallel mulmod sweep");

        for (index, &(a, b)) in MULMOD_VECTORS.iter().enumerate() {
            self.check(Phase::Fixed, index as u64, (a, b), candidate.mul_mod(a, b))?;
        }

        let seed = self.seed;
        let disagrees = |index: &u64| {
            let (a, b) = OperandStream::pair_at(seed, *index);
            candidate.mul_mod(a, b) != self.reference.mul_mod(a, b)
        };

        #[cfg(not(target_arch = "wasm32"))]
        let failing = (0..self.trials).into_par_iter().find_first(disagrees);
        #[cfg(target_arch = "wasm32")]
        let failing = (0..self.trials).find(disagrees);

        if let Some(index) = failing {
            let pair = OperandStream::pair_at(seed, index);
            self.check(Phase::Random, index, pair, candidate.mul_mod(pair.0, pair.1))?;
        }

        let report = HarnessReport {
            seed,
            fixed: MULMOD_VECTORS.len(),
            random: self.trials,
            elapsed: start.elapsed(),
        };
        info!(elapsed_ms = report.elapsed.as_millis() as u64, "all pairs matched");
        Ok(report)
    }
}

/// Formats one request line: both operands as space-separated 64-bit halves.
pub fn encode_request(a: u128, b: u128) -> String {
    format!(
        "{:016x} {:016x} {:016x} {:016x}\n",
        (a >> 64) as u64,
        a as u64,
        (b >> 64) as u64,
        b as u64
    )
}

fn protocol_error(line: &str, reason: impl Into<String>) -> HarnessError {
    HarnessError::Protocol {
        line: line.trim_end().to_string(),
        reason: reason.into(),
    }
}

/// Parses a request line back into its two operands.
///
/// Halves are hexadecimal, optionally `0x`-prefixed.
pub fn parse_request(line: &str) -> Result<(u128, u128), HarnessError> {
    let halves = line
        .split_whitespace()
        .map(|tok| {
            let digits = tok
                .strip_prefix("0x")
                .or_else(|| tok.strip_prefix("0X"))
                .unwrap_or(tok);
            u64::from_str_radix(digits, 16)
                .map_err(|err| protocol_error(line, format!("bad half {tok:?}: {err}")))
        })
        .collect::<Result<Vec<u64>, _>>()?;
    match halves.as_slice() {
        &[a_hi, a_lo, b_hi, b_lo] => Ok((
            (u128::from(a_hi) << 64) | u128::from(a_lo),
            (u128::from(b_hi) << 64) | u128::from(b_lo),
        )),
        other => Err(protocol_error(
            line,
            format!("expected 4 hex halves, found {}", other.len()),
        )),
    }
}

/// Parses a response line as an integer, detecting the base from its prefix.
///
/// Accepts `0x`, `0o` and `0b` prefixes (either case) and plain decimal.
/// Surrounding whitespace and a trailing `L` are ignored.
pub fn parse_response(line: &str) -> Result<u128, HarnessError> {
    let body = line.trim().trim_end_matches(|c| c == 'L' || c == 'l');
    let lower = body.get(..2).map(str::to_ascii_lowercase);
    let (digits, radix) = match lower.as_deref() {
        Some("0x") => (&body[2..], 16),
        Some("0o") => (&body[2..], 8),
        Some("0b") => (&body[2..], 2),
        _ => (body, 10),
    };
    if digits.is_empty() {
        return Err(protocol_error(line, "empty integer"));
    }
    u128::from_str_radix(digits, radix).map_err(|err| protocol_error(line, err.to_string()))
}

/// Formats one response line.
pub fn encode_response(value: u128) -> String {
    format!("0x{value:032x}\n")
}

/// Answers request lines from `reader` until end of input.
///
/// This is the implementation-under-test side of the protocol.  Malformed
/// lines are logged and skipped without a reply.  Returns the number of
/// requests answered.
pub fn serve_mulmod<R, W, F>(reader: R, mut writer: W, field: &F) -> io::Result<u64>
where
    R: BufRead,
    W: Write,
    F: FieldArithmetic,
{
    let mut answered = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_request(&line) {
            Ok((a, b)) => {
                writer.write_all(encode_response(field.mul_mod(a, b)).as_bytes())?;
                writer.flush()?;
                answered += 1;
            }
            Err(err) => warn!(%err, "skipping request"),
        }
    }
    Ok(answered)
}
