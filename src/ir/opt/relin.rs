//! Relinearization insertion
//!
//! A ciphertext-ciphertext product has degree two. Products cannot be multiplied, rotated or
//! summed further until they are relinearized back to degree one, but they can be added,
//! subtracted and negated.

use crate::ir::term::{Func, OpCode, TermError, TermId};

use fxhash::FxHashMap;
use hecirc_opt::RelinPolicy;
use log::{debug, trace};

/// Is every use of `t` already a relinearization?
fn already_relinearized(f: &Func, t: TermId) -> bool {
    !f.data_flow().is_output(t)
        && f.consumer_count(t) > 0
        && f.consumers(t)
            .all(|c| f.term(c).map_or(false, |c| c.op() == &OpCode::Relin))
}

/// The degree of `t`, given the degrees of its operands.
fn degree(f: &Func, degrees: &FxHashMap<TermId, u8>, t: TermId) -> u8 {
    let term = match f.term(t) {
        Some(term) if term.is_cipher() => term,
        _ => return 0,
    };
    let below = || {
        term.cs()
            .iter()
            .map(|c| degrees.get(c).copied().unwrap_or(1))
            .max()
            .unwrap_or(1)
    };
    match term.op() {
        OpCode::Nop | OpCode::Relin => 1,
        _ if f.is_ctxt_ctxt_mul(term) => 2,
        _ => below(),
    }
}

/// Can the degree-two term `t` stay unrelinearized?
fn can_defer(f: &Func, t: TermId) -> bool {
    if f.data_flow().is_output(t) || f.consumer_count(t) != 1 {
        return false;
    }
    f.consumers(t).all(|c| {
        f.term(c).map_or(false, |c| {
            matches!(c.op(), OpCode::Add | OpCode::Sub | OpCode::Negate)
        })
    })
}

fn relin(f: &mut Func, t: TermId) -> Result<TermId, TermError> {
    trace!("relin {}", t);
    f.interpose(t, OpCode::Relin)
}

/// Relinearize every ciphertext-ciphertext product. Returns the number of relinearizations.
pub fn relin_after_ctxt_ctxt_mul(f: &mut Func) -> Result<usize, TermError> {
    let mut count = 0;
    for t in f.get_top_sorted_terms() {
        let product = f.term(t).map_or(false, |term| f.is_ctxt_ctxt_mul(term));
        if product && !already_relinearized(f, t) {
            relin(f, t)?;
            count += 1;
        }
    }
    debug!("'{}': {} eager relinearizations", f.name(), count);
    Ok(count)
}

/// Relinearize products as late as possible: sums and differences of products stay at degree
/// two, and are relinearized once, where a degree-one operand is needed or at an output.
/// Returns the number of relinearizations.
pub fn lazy_relin_heuristic(f: &mut Func) -> Result<usize, TermError> {
    let mut degrees: FxHashMap<TermId, u8> = FxHashMap::default();
    let mut count = 0;
    for t in f.get_top_sorted_terms() {
        if !f.contains(t) {
            continue;
        }
        let d = degree(f, &degrees, t);
        degrees.insert(t, d);
        if d < 2 || can_defer(f, t) || already_relinearized(f, t) {
            continue;
        }
        let r = relin(f, t)?;
        degrees.insert(r, 1);
        count += 1;
    }
    debug!("'{}': {} lazy relinearizations", f.name(), count);
    Ok(count)
}

/// Insert relinearizations according to `policy`. Returns how many were inserted.
pub fn insert_relin_ops(f: &mut Func, policy: RelinPolicy) -> Result<usize, TermError> {
    match policy {
        RelinPolicy::Lazy => lazy_relin_heuristic(f),
        RelinPolicy::Eager => relin_after_ctxt_ctxt_mul(f),
    }
}
