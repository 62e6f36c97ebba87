//! Commutative common-subexpression elimination
//!
//! Merges terms computing the same operation over the same operands, where the operands of
//! commutative operations are compared as multisets. Constants are merged by value.

use crate::ir::term::{Func, OpCode, TermError, TermId};

use fxhash::FxHashMap;
use log::{debug, trace};

use std::hash::Hash;

type Key = (OpCode, Vec<TermId>);

/// The live representative of `key`, registering `t` if there is none.
fn canonical<K: Hash + Eq>(
    f: &Func,
    reps: &mut FxHashMap<K, TermId>,
    key: K,
    t: TermId,
) -> TermId {
    match reps.get(&key) {
        // A merge may have pruned the representative.
        Some(r) if f.contains(*r) => *r,
        _ => {
            reps.insert(key, t);
            t
        }
    }
}

/// Merge duplicate terms of `f`. Returns how many terms were merged away.
pub fn cse_commut(f: &mut Func) -> Result<usize, TermError> {
    let before = f.term_count();
    let mut ops: FxHashMap<Key, TermId> = FxHashMap::default();
    let mut consts: FxHashMap<Vec<i64>, TermId> = FxHashMap::default();
    let mut merged = 0;
    for t in f.get_top_sorted_terms() {
        // Earlier merges may have deleted `t`.
        let term = match f.term(t) {
            Some(term) => term,
            None => continue,
        };
        let existing = if let Some(v) = f.data_flow().const_value(t) {
            canonical(f, &mut consts, v.to_vec(), t)
        } else if term.is_operation() {
            let mut cs = term.cs().to_vec();
            if term.op().is_commutative() {
                cs.sort();
            }
            canonical(f, &mut ops, (term.op().clone(), cs), t)
        } else {
            t
        };
        if existing != t {
            trace!("cse: {} is {}", t, existing);
            f.replace_term_with(t, existing)?;
            merged += 1;
        }
    }
    debug!(
        "cse_commut on '{}': {} merges, {} -> {} terms",
        f.name(),
        merged,
        before,
        f.term_count()
    );
    Ok(merged)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::term::dist::ArbitraryFunc;
    use crate::ir::term::eval::agree_on_random_inputs;
    use crate::ir::term::{InsertOpts, TermType};

    use quickcheck_macros::quickcheck;

    #[test]
    fn merges_commuted_operands() {
        let mut f = Func::new("f", 4, 8, false, true).unwrap();
        let x = f.add_input("x", TermType::Cipher, (0, 3)).unwrap();
        let y = f.add_input("y", TermType::Cipher, (0, 3)).unwrap();
        let c1 = f.add_scalar_const(2).unwrap();
        let c2 = f.add_scalar_const(2).unwrap();
        let a = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
        let b = f.insert_op_term(OpCode::Mul, vec![y, x]).unwrap();
        let s1 = f.insert_op_term(OpCode::Sub, vec![a, c1]).unwrap();
        let s2 = f.insert_op_term(OpCode::Sub, vec![b, c2]).unwrap();
        let d1 = f.insert_op_term(OpCode::Sub, vec![x, y]).unwrap();
        let d2 = f.insert_op_term(OpCode::Sub, vec![y, x]).unwrap();
        f.set_output(s1, "s1").unwrap();
        f.set_output(s2, "s2").unwrap();
        f.set_output(d1, "d1").unwrap();
        f.set_output(d2, "d2").unwrap();
        let g = f.clone();
        assert_eq!(cse_commut(&mut f).unwrap(), 3);
        assert_eq!(f.data_flow().output_by_label("s2"), Some(s1));
        assert!(!f.contains(b) && !f.contains(c2));
        // Subtraction is not commutative.
        assert_ne!(
            f.data_flow().output_by_label("d1"),
            f.data_flow().output_by_label("d2")
        );
        assert!(agree_on_random_inputs(&g, &f, 2, 0).unwrap());
    }

    #[quickcheck]
    fn leaves_no_duplicates(ArbitraryFunc(f): ArbitraryFunc) -> bool {
        let mut g = f.clone();
        g.set_insert_opts(InsertOpts::default());
        cse_commut(&mut g).unwrap();
        let mut seen = std::collections::HashSet::new();
        let unique = g.terms().filter(|t| t.is_operation()).all(|t| {
            let mut cs = t.cs().to_vec();
            if t.op().is_commutative() {
                cs.sort();
            }
            seen.insert((t.op().clone(), cs))
        });
        unique && agree_on_random_inputs(&f, &g, 2, 5).unwrap()
    }
}
