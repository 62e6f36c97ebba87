//! The shipped rulesets
//!
//! Every rule either removes operations, or trades expensive operations for cheaper ones, or
//! (for the depth rules) keeps the operation count while lowering the multiplicative depth.
//! Rules that would duplicate a shared subterm are guarded to fire only when the subterm has a
//! single consumer.

use super::pattern::dsl::*;
use super::pattern::{Pat, Subst};
use super::{Lhs, Rhs, Rule, Ruleset};
use crate::ir::term::eval::eval_op;
use crate::ir::term::{Func, OpCode, TermError, TermId};

use fxhash::FxHashSet;

/// Is `t` used exactly once, and not an output?
fn single_use(f: &Func, t: TermId) -> bool {
    f.consumer_count(t) == 1 && !f.data_flow().is_output(t)
}

/// Does rotating by `s` leave every vector of `f` unchanged?
pub(crate) fn is_identity_rotation(f: &Func, s: i64) -> bool {
    s == 0 || (f.need_cyclic_rotation() && s % f.slot_count() as i64 == 0)
}

fn rotate(f: &mut Func, t: TermId, s: i64) -> Result<TermId, TermError> {
    if is_identity_rotation(f, s) {
        Ok(t)
    } else {
        f.insert_op_term(OpCode::Rotate(s), vec![t])
    }
}

/// The step `base + k * d`. It wraps on cyclic functions, whose slot count divides 2^64, and is
/// checked otherwise.
fn offset(f: &Func, base: i64, k: i64, d: i64) -> Option<i64> {
    if f.need_cyclic_rotation() {
        Some(base.wrapping_add(k.wrapping_mul(d)))
    } else {
        k.checked_mul(d).and_then(|kd| base.checked_add(kd))
    }
}

fn checked_offset(f: &Func, base: i64, k: i64, d: i64) -> Result<i64, TermError> {
    offset(f, base, k, d).ok_or(TermError::StepOutOfRange(base, k, d))
}

/// Build `sum_{k < w} (x << (o0 + k * d))` as a doubling tree.
///
/// With `s_0 = x` and `s_{j+1} = s_j + (s_j << 2^j d)`, `s_j` sums `2^j` consecutive strides. The
/// window is the sum of the `s_j` for the set bits of `w`, each rotated to its offset.
pub fn window_sum(
    f: &mut Func,
    x: TermId,
    o0: i64,
    d: i64,
    w: u64,
) -> Result<TermId, TermError> {
    if w == 0 {
        return f.add_scalar_const(0);
    }
    let top = 63 - w.leading_zeros() as usize;
    let mut powers = vec![x];
    for j in 0..top {
        let s = powers[j];
        let step = checked_offset(f, 0, 1 << j, d)?;
        let r = rotate(f, s, step)?;
        powers.push(f.insert_op_term(OpCode::Add, vec![s, r])?);
    }
    // The top bit of `w` is set.
    let mut acc = rotate(f, powers[top], o0)?;
    let mut off = 1i64 << top;
    for j in (0..top).rev() {
        if (w >> j) & 1 == 1 {
            let step = checked_offset(f, o0, off, d)?;
            let part = rotate(f, powers[j], step)?;
            acc = f.insert_op_term(OpCode::Add, vec![acc, part])?;
            off += 1 << j;
        }
    }
    Ok(acc)
}

// Cost weights, used to decide whether a windowed sum is worth restructuring.
const ADD_COST: usize = 2;
const ROT_COST: usize = 3;

/// The cost of [window_sum], or `None` when one of its steps does not fit in 64 bits.
fn window_cost(f: &Func, o0: i64, d: i64, w: u64) -> Option<usize> {
    let top = 63 - w.leading_zeros() as usize;
    for j in 0..top {
        offset(f, 0, 1 << j, d)?;
    }
    let mut rots = top;
    let mut off = 0i64;
    for j in (0..=top).rev() {
        if (w >> j) & 1 == 1 {
            if !is_identity_rotation(f, offset(f, o0, off, d)?) {
                rots += 1;
            }
            off += 1 << j;
        }
    }
    let adds = top + w.count_ones() as usize - 1;
    Some(rots * ROT_COST + adds * ADD_COST)
}

/// Match the root of a sum of rotations of one term by offsets in arithmetic progression.
///
/// Binds `x` (the rotated term) and the steps `o0` (first offset), `d` (stride), and `w` (count).
/// Only matches when the doubling tree is cheaper than the sum.
fn match_windowed_sum(f: &Func, t: TermId) -> Option<Subst> {
    let term = f.term(t)?;
    if term.op() != &OpCode::Add {
        return None;
    }
    // Only the root of an addition tree.
    let feeds_add = f
        .consumers(t)
        .any(|c| f.term(c).map_or(false, |c| c.op() == &OpCode::Add));
    if single_use(f, t) && feeds_add {
        return None;
    }
    let mut leaves = Vec::new();
    let mut stack = vec![t];
    while let Some(n) = stack.pop() {
        let nt = f.term(n)?;
        if nt.op() == &OpCode::Add && (n == t || single_use(f, n)) {
            stack.extend(nt.cs().iter().copied());
        } else {
            leaves.push(n);
        }
    }
    if leaves.len() < 3 {
        return None;
    }
    let mut base = None;
    let mut offsets = Vec::with_capacity(leaves.len());
    for l in leaves {
        let lt = f.term(l)?;
        let (b, o) = match lt.op() {
            OpCode::Rotate(s) => (lt.cs()[0], *s),
            _ => (l, 0),
        };
        if *base.get_or_insert(b) != b {
            return None;
        }
        offsets.push(o);
    }
    offsets.sort_unstable();
    let d = offsets[1].checked_sub(offsets[0])?;
    if d == 0 || offsets.windows(2).any(|p| p[1].checked_sub(p[0]) != Some(d)) {
        return None;
    }
    let w = offsets.len() as u64;
    let o0 = offsets[0];
    let naive_rots = offsets
        .iter()
        .filter(|o| !is_identity_rotation(f, **o))
        .count();
    let naive = naive_rots * ROT_COST + (offsets.len() - 1) * ADD_COST;
    if window_cost(f, o0, d, w)? >= naive {
        return None;
    }
    let mut s = Subst::default();
    s.bind("x", base?);
    s.bind_step("o0", o0);
    s.bind_step("d", d);
    s.bind_step("w", w as i64);
    Some(s)
}

fn build_windowed_sum(f: &mut Func, s: &Subst) -> Result<TermId, TermError> {
    window_sum(f, s.get("x"), s.step("o0"), s.step("d"), s.step("w") as u64)
}

fn build_sumvec(f: &mut Func, s: &Subst) -> Result<TermId, TermError> {
    window_sum(f, s.get("x"), 0, 1, s.step("w") as u64)
}

fn build_merged_rotation(f: &mut Func, s: &Subst) -> Result<TermId, TermError> {
    let x = s.get("x");
    let step = s.step("a").wrapping_add(s.step("b"));
    rotate(f, x, step)
}

fn fold_consts(f: &mut Func, s: &Subst, op: OpCode) -> Result<TermId, TermError> {
    let df = f.data_flow();
    let (a, b) = (s.get("c1"), s.get("c2"));
    let (va, vb) = match (df.const_value(a), df.const_value(b)) {
        (Some(va), Some(vb)) => (va, vb),
        _ => return Err(TermError::NoSuchTerm(a, f.name().to_owned())),
    };
    let folded = eval_op(&op, &[va, vb], f.slot_count());
    let c = f.add_const(folded)?;
    f.insert_op_term(op, vec![s.get("x"), c])
}

fn fold_add_consts(f: &mut Func, s: &Subst) -> Result<TermId, TermError> {
    fold_consts(f, s, OpCode::Add)
}

fn fold_mul_consts(f: &mut Func, s: &Subst) -> Result<TermId, TermError> {
    fold_consts(f, s, OpCode::Mul)
}

fn simplify() -> Vec<Rule> {
    vec![
        Rule::new("add-zero", add(v("x"), lit(0)), v("x")),
        Rule::new("sub-zero", sub(v("x"), lit(0)), v("x")),
        Rule::new("zero-sub", sub(lit(0), v("x")), neg(v("x"))),
        Rule::new("mul-one", mul(v("x"), lit(1)), v("x")),
        Rule::new("mul-zero", mul(v("x"), lit(0)), lit(0)),
        Rule::new("sub-self", sub(v("x"), v("x")), lit(0)),
        Rule::new("neg-neg", neg(neg(v("x"))), v("x")),
        Rule::new("add-neg", add(v("x"), named("n", neg(v("y")))), sub(v("x"), v("y")))
            .when(|f, _, s| single_use(f, s.get("n"))),
        Rule::new("sub-neg", sub(v("x"), named("n", neg(v("y")))), add(v("x"), v("y")))
            .when(|f, _, s| single_use(f, s.get("n"))),
        Rule::new("neg-sub", neg(named("n", sub(v("x"), v("y")))), sub(v("y"), v("x")))
            .when(|f, _, s| single_use(f, s.get("n"))),
        Rule::new("mul-self", mul(v("x"), v("x")), square(v("x"))),
        Rule::new("square-neg", square(named("n", neg(v("x")))), square(v("x")))
            .when(|f, _, s| single_use(f, s.get("n"))),
    ]
}

fn rotations() -> Vec<Rule> {
    vec![
        Rule::new("rot-identity", rot(v("x"), "s"), v("x"))
            .when(|f, _, s| is_identity_rotation(f, s.step("s"))),
        Rule::new("rot-uniform", rot(k("x"), "s"), v("x")).when(|f, _, s| {
            f.need_cyclic_rotation()
                && f.data_flow()
                    .constants_info()
                    .get(&s.get("x"))
                    .map_or(false, |c| c.scalar().is_some())
        }),
        Rule::gen("rot-rot", rot(named("i", rot(v("x"), "a")), "b"), build_merged_rotation)
            .when(|f, _, s| f.need_cyclic_rotation() && single_use(f, s.get("i"))),
    ]
}

fn hoist_pays(f: &Func, _: TermId, s: &Subst) -> bool {
    let (r1, r2) = (s.get("r1"), s.get("r2"));
    r1 != r2 && single_use(f, r1) && single_use(f, r2)
}

/// `(x << a << b) + (y << a)` becomes `((x << b) + y) << a`. Fires when it does not add rotations.
fn shared_rotation_pays(f: &Func, t: TermId, s: &Subst) -> bool {
    let (outer, inner, r) = (s.get("o"), s.get("i"), s.get("r"));
    if !f.need_cyclic_rotation() || !single_use(f, outer) {
        return false;
    }
    let x = s.get("x");
    if f.term(x).map_or(true, |x| matches!(x.op(), OpCode::Rotate(_))) {
        return false;
    }
    let removable: FxHashSet<TermId> = [outer, t].iter().copied().collect();
    let inner_dies =
        !f.data_flow().is_output(inner) && f.consumers(inner).all(|c| removable.contains(&c));
    let removed = 1 + (r != inner && single_use(f, r)) as usize + inner_dies as usize;
    let added = 1 + f
        .lookup_op_term(&OpCode::Rotate(s.step("b")), &[x])
        .is_none() as usize;
    added <= removed
}

fn hoisted(name: &'static str, op: fn(Pat, Pat) -> Pat) -> Rule {
    Rule::new(
        name,
        op(named("r1", rot(v("x"), "s")), named("r2", rot(v("y"), "s"))),
        rot(op(v("x"), v("y")), "s"),
    )
    .when(hoist_pays)
}

fn hoisting() -> Vec<Rule> {
    vec![
        hoisted("hoist-add", add),
        hoisted("hoist-sub", sub),
        hoisted("hoist-mul", mul),
        Rule::new(
            "share-rotation",
            add(
                named("o", rot(named("i", rot(v("x"), "a")), "b")),
                named("r", rot(v("y"), "a")),
            ),
            rot(add(rot(v("x"), "b"), v("y")), "a"),
        )
        .when(shared_rotation_pays),
    ]
}

fn factoring() -> Vec<Rule> {
    let both_single = |f: &Func, _: TermId, s: &Subst| {
        let (m1, m2) = (s.get("m1"), s.get("m2"));
        m1 != m2 && single_use(f, m1) && single_use(f, m2)
    };
    vec![
        Rule::new(
            "factor-add",
            add(
                named("m1", mul(v("a"), v("b"))),
                named("m2", mul(v("a"), v("c"))),
            ),
            mul(v("a"), add(v("b"), v("c"))),
        )
        .when(both_single),
        Rule::new(
            "factor-sub",
            sub(
                named("m1", mul(v("a"), v("b"))),
                named("m2", mul(v("a"), v("c"))),
            ),
            mul(v("a"), sub(v("b"), v("c"))),
        )
        .when(both_single),
        Rule::gen(
            "fold-add-consts",
            add(named("i", add(v("x"), k("c1"))), k("c2")),
            fold_add_consts,
        )
        .when(|f, _, s| single_use(f, s.get("i"))),
        Rule::gen(
            "fold-mul-consts",
            mul(named("i", mul(v("x"), k("c1"))), k("c2")),
            fold_mul_consts,
        )
        .when(|f, _, s| single_use(f, s.get("i"))),
    ]
}

/// Reassociate `(x * y) * z` into `x * (y * z)` when `x` is the deepest operand.
fn rebalance_pays(f: &Func, _: TermId, s: &Subst) -> bool {
    let i = s.get("i");
    if !single_use(f, i) || !f.term(i).map_or(false, |i| f.is_ctxt_ctxt_mul(i)) {
        return false;
    }
    let depths = f.mul_depths();
    let d = |v: &str| depths.get(&s.get(v)).copied().unwrap_or(0);
    d("x") > d("y").max(d("z"))
}

/// Rules lowering multiplicative and rotation depth.
pub fn depth() -> Ruleset {
    let mut rules = simplify();
    rules.extend(rotations());
    rules.push(
        Rule::new(
            "mul-rebalance",
            mul(named("i", mul(v("x"), v("y"))), v("z")),
            mul(v("x"), mul(v("y"), v("z"))),
        )
        .when(rebalance_pays),
    );
    Ruleset::new("depth", rules)
}

/// Rules lowering the weighted operation count.
pub fn ops_cost() -> Ruleset {
    let mut rules = simplify();
    rules.extend(rotations());
    rules.extend(hoisting());
    rules.extend(factoring());
    Ruleset::new("ops_cost", rules)
}

/// The depth rules, then the operation-count rules.
pub fn joined() -> Ruleset {
    let mut rules = depth().rules;
    let mut seen: FxHashSet<&'static str> = rules.iter().map(|r| r.name).collect();
    for r in ops_cost().rules {
        if seen.insert(r.name) {
            rules.push(r);
        }
    }
    Ruleset::new("joined", rules)
}

/// Sums of evenly spaced rotations into doubling trees.
pub fn log2_reduct() -> Ruleset {
    Ruleset::new(
        "log2_reduct",
        vec![Rule {
            name: "windowed-sum",
            lhs: Lhs::Custom(match_windowed_sum),
            rhs: Rhs::Gen(build_windowed_sum),
            guard: None,
        }],
    )
}

/// `SumVec` into doubling trees.
pub fn sumvec_reduct() -> Ruleset {
    Ruleset::new(
        "SumVec_reduct",
        vec![Rule::gen("sumvec-expand", sumvec(v("x"), "w"), build_sumvec)],
    )
}

#[cfg(test)]
mod test {
    use super::super::{rewrite, RewriteStats};
    use super::*;
    use crate::ir::term::dist::ArbitraryFunc;
    use crate::ir::term::eval::agree_on_random_inputs;
    use crate::ir::term::{InsertOpts, TermType};

    use hecirc_opt::RewriteHeuristic::{self, BottomUp, TopDown};
    use quickcheck_macros::quickcheck;

    fn func() -> (Func, TermId, TermId) {
        let mut f = Func::new("f", 16, 16, true, true).unwrap();
        f.set_insert_opts(InsertOpts {
            cse: true,
            order_operands: true,
            const_folding: false,
        });
        let x = f.add_input("x", TermType::Cipher, (-10, 10)).unwrap();
        let y = f.add_input("y", TermType::Cipher, (-10, 10)).unwrap();
        (f, x, y)
    }

    fn run(f: &mut Func, rs: &Ruleset, h: RewriteHeuristic) -> RewriteStats {
        let _ = env_logger::builder().is_test(true).try_init();
        rewrite(f, rs, h, 1000).unwrap()
    }

    fn out(f: &Func) -> String {
        f.expr_str(f.data_flow().output_by_label("out").unwrap())
    }

    #[test]
    fn simplifications() {
        let (mut f, x, y) = func();
        let zero = f.add_scalar_const(0).unwrap();
        let one = f.add_scalar_const(1).unwrap();
        let a = f.insert_op_term(OpCode::Add, vec![x, zero]).unwrap();
        let m = f.insert_op_term(OpCode::Mul, vec![one, a]).unwrap();
        let n = f.insert_op_term(OpCode::Negate, vec![y]).unwrap();
        let s = f.insert_op_term(OpCode::Add, vec![m, n]).unwrap();
        let r = f.insert_op_term(OpCode::Rotate(16), vec![s]).unwrap();
        f.set_output(r, "out").unwrap();
        let g = f.clone();
        run(&mut f, &ops_cost(), BottomUp);
        assert_eq!(out(&f), "( - x y )");
        assert!(agree_on_random_inputs(&g, &f, 4, 0).unwrap());
        // The unused constants are gone.
        assert!(f.data_flow().constants_info().is_empty());
    }

    #[test]
    fn self_products() {
        let (mut f, x, _) = func();
        let n = f.insert_op_term(OpCode::Negate, vec![x]).unwrap();
        let m = f.insert_op_term(OpCode::Mul, vec![n, n]).unwrap();
        let s = f.insert_op_term(OpCode::Sub, vec![m, m]).unwrap();
        let t = f.insert_op_term(OpCode::Add, vec![s, m]).unwrap();
        f.set_output(t, "out").unwrap();
        run(&mut f, &ops_cost(), BottomUp);
        assert_eq!(out(&f), "( square x )");
    }

    #[test]
    fn shared_negation_is_kept() {
        let (mut f, x, y) = func();
        let n = f.insert_op_term(OpCode::Negate, vec![y]).unwrap();
        let a = f.insert_op_term(OpCode::Add, vec![x, n]).unwrap();
        f.set_output(a, "out").unwrap();
        f.set_output(n, "neg").unwrap();
        run(&mut f, &ops_cost(), BottomUp);
        assert_eq!(out(&f), "( + x ( - y ) )");
    }

    #[test]
    fn hoist_common_rotation() {
        let (mut f, x, y) = func();
        let rx = f.insert_op_term(OpCode::Rotate(3), vec![x]).unwrap();
        let ry = f.insert_op_term(OpCode::Rotate(3), vec![y]).unwrap();
        let m = f.insert_op_term(OpCode::Mul, vec![rx, ry]).unwrap();
        f.set_output(m, "out").unwrap();
        let g = f.clone();
        run(&mut f, &ops_cost(), BottomUp);
        assert_eq!(out(&f), "( << ( * x y ) 3 )");
        assert_eq!(f.rotation_count(), 1);
        assert!(agree_on_random_inputs(&g, &f, 4, 1).unwrap());
    }

    #[test]
    fn merge_rotations() {
        let (mut f, x, _) = func();
        let r1 = f.insert_op_term(OpCode::Rotate(5), vec![x]).unwrap();
        let r2 = f.insert_op_term(OpCode::Rotate(-2), vec![r1]).unwrap();
        let r3 = f.insert_op_term(OpCode::Rotate(13), vec![r2]).unwrap();
        f.set_output(r3, "out").unwrap();
        run(&mut f, &depth(), TopDown);
        assert_eq!(f.rotation_count(), 0);
        assert_eq!(out(&f), "x");
    }

    #[test]
    fn factor_and_fold() {
        let (mut f, x, y) = func();
        let c = f.add_scalar_const(3).unwrap();
        let d = f.add_scalar_const(4).unwrap();
        let m1 = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
        let m2 = f.insert_op_term(OpCode::Mul, vec![x, c]).unwrap();
        let s = f.insert_op_term(OpCode::Add, vec![m1, m2]).unwrap();
        let a1 = f.insert_op_term(OpCode::Add, vec![s, c]).unwrap();
        let a2 = f.insert_op_term(OpCode::Add, vec![a1, d]).unwrap();
        f.set_output(a2, "out").unwrap();
        let g = f.clone();
        run(&mut f, &ops_cost(), BottomUp);
        assert_eq!(f.op_counts()["mul"], 1);
        assert_eq!(f.op_counts()["add"], 2);
        assert!(agree_on_random_inputs(&g, &f, 4, 2).unwrap());
    }

    #[test]
    fn rebalance_lowers_depth() {
        let (mut f, x, y) = func();
        let z = f.add_input("z", TermType::Cipher, (0, 3)).unwrap();
        let w = f.add_input("w", TermType::Cipher, (0, 3)).unwrap();
        let m1 = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
        let m2 = f.insert_op_term(OpCode::Mul, vec![m1, z]).unwrap();
        let m3 = f.insert_op_term(OpCode::Mul, vec![m2, w]).unwrap();
        f.set_output(m3, "out").unwrap();
        let g = f.clone();
        let depth_of = |f: &Func| f.mul_depths()[&f.data_flow().output_by_label("out").unwrap()];
        assert_eq!(depth_of(&f), 3);
        run(&mut f, &depth(), BottomUp);
        assert_eq!(depth_of(&f), 2);
        assert_eq!(f.op_counts()["mul"], 3);
        assert!(agree_on_random_inputs(&g, &f, 4, 3).unwrap());
    }

    #[test]
    fn windowed_sum_becomes_tree() {
        let (mut f, x, _) = func();
        let mut acc = x;
        for k in 1..8 {
            let r = f.insert_op_term(OpCode::Rotate(2 * k), vec![x]).unwrap();
            acc = f.insert_op_term(OpCode::Add, vec![acc, r]).unwrap();
        }
        f.set_output(acc, "out").unwrap();
        let g = f.clone();
        assert_eq!(f.rotation_count(), 7);
        run(&mut f, &log2_reduct(), TopDown);
        assert_eq!(f.rotation_count(), 3);
        assert_eq!(f.op_counts()["add"], 3);
        assert!(agree_on_random_inputs(&g, &f, 4, 4).unwrap());
    }

    #[test]
    fn short_or_irregular_sums_are_kept() {
        let (mut f, x, _) = func();
        let r1 = f.insert_op_term(OpCode::Rotate(1), vec![x]).unwrap();
        let r2 = f.insert_op_term(OpCode::Rotate(2), vec![x]).unwrap();
        let r5 = f.insert_op_term(OpCode::Rotate(5), vec![x]).unwrap();
        let a = f.insert_op_term(OpCode::Add, vec![x, r1]).unwrap();
        let b = f.insert_op_term(OpCode::Add, vec![a, r2]).unwrap();
        let c = f.insert_op_term(OpCode::Add, vec![b, r5]).unwrap();
        f.set_output(b, "three").unwrap();
        f.set_output(c, "out").unwrap();
        let stats = run(&mut f, &log2_reduct(), TopDown);
        assert_eq!(stats.rewrites, 0);
    }

    #[test]
    fn uniform_rotation_needs_wraparound() {
        for cyclic in [true, false] {
            let mut f = Func::new("f", 16, 16, true, cyclic).unwrap();
            let c = f.add_scalar_const(7).unwrap();
            let r = f.insert_op_term(OpCode::Rotate(3), vec![c]).unwrap();
            f.set_output(r, "out").unwrap();
            let stats = run(&mut f, &ops_cost(), BottomUp);
            assert_eq!(stats.rewrites > 0, cyclic);
            let rots = f.count_terms(|t| matches!(t.op(), OpCode::Rotate(_)));
            assert_eq!(rots, if cyclic { 0 } else { 1 });
        }
    }

    #[test]
    fn window_steps_wrap_or_fail() {
        let mut f = Func::new("f", 16, 16, true, false).unwrap();
        let x = f.add_input("x", TermType::Cipher, (-10, 10)).unwrap();
        assert!(matches!(
            window_sum(&mut f, x, 0, i64::MAX, 3),
            Err(TermError::StepOutOfRange(0, 2, i64::MAX))
        ));

        // 2 * (2^62 + 1) wraps to a step that is 2 modulo the slot count.
        let (mut f, x, _) = func();
        let mut g = f.clone();
        let s = window_sum(&mut f, x, 0, (1 << 62) + 1, 3).unwrap();
        f.set_output(s, "out").unwrap();
        let s = window_sum(&mut g, x, 0, 1, 3).unwrap();
        g.set_output(s, "out").unwrap();
        assert!(agree_on_random_inputs(&f, &g, 4, 5).unwrap());
    }

    #[test]
    fn extreme_offsets_are_not_windowed() {
        let mut f = Func::new("f", 16, 16, true, false).unwrap();
        let x = f.add_input("x", TermType::Cipher, (-10, 10)).unwrap();
        let lo = f.insert_op_term(OpCode::Rotate(i64::MIN), vec![x]).unwrap();
        let hi = f.insert_op_term(OpCode::Rotate(i64::MAX), vec![x]).unwrap();
        let a = f.insert_op_term(OpCode::Add, vec![lo, x]).unwrap();
        let b = f.insert_op_term(OpCode::Add, vec![a, hi]).unwrap();
        f.set_output(b, "out").unwrap();
        let stats = run(&mut f, &log2_reduct(), TopDown);
        assert_eq!(stats.rewrites, 0);
        assert_eq!(f.rotation_count(), 2);
    }

    #[test]
    fn sumvec_expansion() {
        for w in 0..10usize {
            let (mut f, x, _) = func();
            let s = f.insert_op_term(OpCode::SumVec(w), vec![x]).unwrap();
            f.set_output(s, "out").unwrap();
            let g = f.clone();
            run(&mut f, &sumvec_reduct(), TopDown);
            assert_eq!(f.count_terms(|t| matches!(t.op(), OpCode::SumVec(_))), 0);
            assert!(agree_on_random_inputs(&g, &f, 3, w as u64).unwrap());
        }
    }

    #[test]
    fn lookup_by_name() {
        for n in &["depth", "ops_cost", "joined", "log2_reduct", "SumVec_reduct"] {
            assert_eq!(Ruleset::by_name(n).unwrap().name(), *n);
        }
        assert!(Ruleset::by_name("fastest").is_none());
        let j = joined();
        let names: FxHashSet<_> = j.rules().iter().map(|r| r.name).collect();
        assert_eq!(names.len(), j.rules().len());
    }

    fn preserves_semantics(f: Func, rs: Ruleset, h: RewriteHeuristic) -> bool {
        let mut g = f.clone();
        let stats = run(&mut g, &rs, h);
        if !stats.fixpoint || !agree_on_random_inputs(&f, &g, 3, 11).unwrap() {
            return false;
        }
        // A second run finds nothing to do.
        run(&mut g, &rs, h).rewrites == 0
    }

    #[quickcheck]
    fn depth_bottom_up(ArbitraryFunc(f): ArbitraryFunc) -> bool {
        preserves_semantics(f, depth(), BottomUp)
    }

    #[quickcheck]
    fn depth_top_down(ArbitraryFunc(f): ArbitraryFunc) -> bool {
        preserves_semantics(f, depth(), TopDown)
    }

    #[quickcheck]
    fn ops_cost_bottom_up(ArbitraryFunc(f): ArbitraryFunc) -> bool {
        preserves_semantics(f, ops_cost(), BottomUp)
    }

    #[quickcheck]
    fn ops_cost_top_down(ArbitraryFunc(f): ArbitraryFunc) -> bool {
        preserves_semantics(f, ops_cost(), TopDown)
    }

    #[quickcheck]
    fn joined_bottom_up(ArbitraryFunc(f): ArbitraryFunc) -> bool {
        preserves_semantics(f, joined(), BottomUp)
    }

    #[quickcheck]
    fn joined_top_down(ArbitraryFunc(f): ArbitraryFunc) -> bool {
        preserves_semantics(f, joined(), TopDown)
    }

    #[quickcheck]
    fn log2_reduct_top_down(ArbitraryFunc(f): ArbitraryFunc) -> bool {
        preserves_semantics(f, log2_reduct(), TopDown)
    }

    #[quickcheck]
    fn sumvec_reduct_bottom_up(ArbitraryFunc(f): ArbitraryFunc) -> bool {
        preserves_semantics(f, sumvec_reduct(), BottomUp)
    }
}
