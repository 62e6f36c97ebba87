//! Rotation-key reduction
//!
//! Every distinct rotation step needs its own key. When a function uses more steps than the key
//! budget allows, some steps are rewritten as chains of power-of-two rotations given by their
//! non-adjacent form, so that they share keys with other steps.

use super::trs::rulesets::is_identity_rotation;
use crate::ir::term::{Func, OpCode, TermError, TermId};

use fxhash::FxHashMap;
use itertools::Itertools;
use log::{debug, info, trace};
use thiserror::Error;

use std::collections::{BTreeMap, BTreeSet};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Why the rotation keys could not be reduced
pub enum RotationKeyError {
    #[error("cannot use fewer than {reached} rotation keys; the threshold {threshold} is too low")]
    /// Decomposing every eligible step still leaves too many keys
    InfeasibleBudget {
        /// The requested budget
        threshold: usize,
        /// The fewest keys reachable
        reached: usize,
    },
    #[error("rotation step {0} has no non-adjacent form in 64 bits")]
    /// A step too large to decompose
    StepOutOfRange(i64),
    #[error(transparent)]
    /// Rewriting a rotation failed
    Term(#[from] TermError),
}

/// The non-adjacent form of `value`: signed powers of two, in increasing magnitude, summing to
/// `value`, no two of them adjacent powers.
///
/// `None` for the large positive values whose form needs the digit `2^63`.
pub fn naf(value: i64) -> Option<Vec<i64>> {
    let negative = value < 0;
    let mut rest = (value as i128).abs();
    let mut digits = Vec::new();
    let mut i = 0;
    while rest != 0 {
        let z = if rest & 1 == 1 { 2 - (rest & 3) } else { 0 };
        rest = (rest - z) >> 1;
        if z != 0 {
            let d = z << i;
            digits.push(i64::try_from(if negative { -d } else { d }).ok()?);
        }
        i += 1;
    }
    Some(digits)
}

/// `s` as the step in `(-n/2, n/2]` rotating alike on a cyclic function with `n` slots.
fn normalize_step(f: &Func, s: i64) -> i64 {
    if !f.need_cyclic_rotation() {
        return s;
    }
    let n = f.slot_count() as i64;
    let r = s.rem_euclid(n);
    if r > n / 2 {
        r - n
    } else {
        r
    }
}

fn is_power_of_two_step(s: i64) -> bool {
    s.unsigned_abs().is_power_of_two()
}

/// Decide which steps to decompose. Returns the kept keys and each decomposed step's digits.
fn plan(
    f: &Func,
    freq: &BTreeMap<i64, usize>,
    threshold: usize,
) -> Result<(BTreeSet<i64>, Vec<(i64, Vec<i64>)>), RotationKeyError> {
    let mut keys: BTreeSet<i64> = freq.keys().copied().collect();
    let mut decomposed = Vec::new();
    if keys.len() <= threshold {
        return Ok((keys, decomposed));
    }
    // (extra rotations if decomposed, digits, step), cheapest first
    let mut candidates = Vec::new();
    for (s, n) in freq.iter().filter(|(s, _)| !is_power_of_two_step(**s)) {
        let digits = naf(*s).ok_or(RotationKeyError::StepOutOfRange(*s))?;
        candidates.push((n * (digits.len() - 1), digits, *s));
    }
    for (cost, digits, s) in candidates.into_iter().sorted() {
        trace!("decompose {} into {:?} (cost {})", s, digits, cost);
        keys.remove(&s);
        keys.extend(digits.iter().copied().filter(|d| !is_identity_rotation(f, *d)));
        decomposed.push((s, digits));
        if keys.len() <= threshold {
            break;
        }
    }
    if keys.len() > threshold {
        return Err(RotationKeyError::InfeasibleBudget {
            threshold,
            reached: keys.len(),
        });
    }
    Ok((keys, decomposed))
}

/// Rewrite `t = x << s` as a chain of rotations by `steps`, in order.
fn decompose(f: &mut Func, t: TermId, steps: &[i64]) -> Result<(), TermError> {
    let x = f.get(t)?.cs()[0];
    let mut acc = x;
    for s in steps {
        if !is_identity_rotation(f, *s) {
            acc = f.insert_op_term(OpCode::Rotate(*s), vec![acc])?;
        }
    }
    if acc != x {
        f.replace_term_with(t, acc)?;
    }
    Ok(())
}

/// Bring the number of distinct ciphertext rotation steps of `f` down to `threshold`.
///
/// On cyclic functions, steps are first brought into `(-n/2, n/2]` modulo the slot count `n`.
/// Steps that are not (signed) powers of two are decomposed into their non-adjacent forms, the
/// ones adding the fewest rotations first, until the budget is met. Returns the steps that need
/// keys. Identity rotations need none. `f` is left untouched when the budget cannot be met.
pub fn reduce_rotation_keys(
    f: &mut Func,
    threshold: usize,
) -> Result<BTreeSet<i64>, RotationKeyError> {
    let mut freq: BTreeMap<i64, usize> = BTreeMap::new();
    for t in f.terms().filter(|t| t.is_cipher()) {
        if let OpCode::Rotate(s) = t.op() {
            if !is_identity_rotation(f, *s) {
                *freq.entry(normalize_step(f, *s)).or_insert(0) += 1;
            }
        }
    }
    debug!(
        "'{}' rotates by {} distinct steps, threshold {}",
        f.name(),
        freq.len(),
        threshold
    );
    let (keys, decomposed) = plan(f, &freq, threshold)?;
    let chains: FxHashMap<i64, Vec<i64>> = decomposed
        .into_iter()
        .map(|(s, digits)| (s, digits.into_iter().sorted_by(|a, b| b.cmp(a)).collect()))
        .collect();
    for t in f.get_top_sorted_terms() {
        // Merges may have removed `t`.
        let step = match f.term(t) {
            Some(term) if term.is_cipher() => term.op().steps(),
            _ => None,
        };
        let s = match step {
            Some(s) if !is_identity_rotation(f, s) => s,
            _ => continue,
        };
        let normal = normalize_step(f, s);
        if let Some(chain) = chains.get(&normal) {
            decompose(f, t, chain)?;
        } else if normal != s {
            decompose(f, t, &[normal])?;
        }
    }
    info!("'{}' needs rotation keys {:?}", f.name(), keys);
    Ok(keys)
}
