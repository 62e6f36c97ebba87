use super::dist::ArbitraryFunc;
use super::eval::{agree_on_random_inputs, eval_func};
use super::*;

use quickcheck_macros::quickcheck;

fn opts(cse: bool, order_operands: bool, const_folding: bool) -> InsertOpts {
    InsertOpts {
        cse,
        order_operands,
        const_folding,
    }
}

fn func(o: InsertOpts) -> (Func, TermId, TermId) {
    let mut f = Func::new("f", 4, 8, false, true).unwrap();
    f.set_insert_opts(o);
    let x = f.add_input("x", TermType::Cipher, (0, 255)).unwrap();
    let y = f.add_input("y", TermType::Cipher, (0, 255)).unwrap();
    (f, x, y)
}

fn inputs(pairs: &[(&str, Vec<i64>)]) -> FxHashMap<String, Vec<i64>> {
    pairs
        .iter()
        .map(|(l, v)| (l.to_string(), v.clone()))
        .collect()
}

#[test]
fn bad_shapes() {
    assert_eq!(
        Func::new("f", 6, 8, false, true).unwrap_err(),
        TermError::BadSlotCount(6)
    );
    assert_eq!(
        Func::new("f", 8, 0, false, true).unwrap_err(),
        TermError::BadBitWidth(0)
    );
    let (mut f, x, _) = func(InsertOpts::default());
    assert_eq!(
        f.insert_op_term(OpCode::Add, vec![x]),
        Err(TermError::Arity {
            op: OpCode::Add,
            expected: 2,
            found: 1
        })
    );
    assert_eq!(
        f.add_input("x", TermType::Plain, (0, 1)),
        Err(TermError::DuplicateInput("x".into()))
    );
    let c = f.add_scalar_const(3).unwrap();
    assert_eq!(
        f.insert_op_term(OpCode::Relin, vec![c]),
        Err(TermError::NotCipher(OpCode::Relin))
    );
    assert_eq!(
        f.add_const(vec![1, 2]),
        Err(TermError::ConstWidth {
            expected: 4,
            found: 2
        })
    );
}

#[test]
fn input_labels_print_as_one_symbol() {
    let (mut f, _, _) = func(InsertOpts::default());
    for bad in ["c0", "c17", "img 1", " img", "(x", "x)", "a;b", "", "3", "-4"] {
        assert_eq!(
            f.add_input(bad, TermType::Cipher, (0, 1)),
            Err(TermError::BadLabel(bad.into())),
            "{:?}",
            bad
        );
    }
    for good in ["c", "cx", "c0x", "x_1", "img"] {
        f.add_input(good, TermType::Cipher, (0, 1)).unwrap();
    }
    assert!(!is_input_label("c007"));
}

#[test]
fn pruning_forgets_cse_entries() {
    let (mut f, x, y) = func(opts(true, true, false));
    let a = f.insert_op_term(OpCode::Add, vec![x, y]).unwrap();
    let n = f.insert_op_term(OpCode::Negate, vec![a]).unwrap();
    f.set_output(n, "out").unwrap();
    let entries = f.cse_table.len();
    f.replace_term_with(n, x).unwrap();
    assert!(!f.contains(a) && !f.contains(n));
    assert_eq!(f.cse_table.len(), entries - 2);
    assert!(f.cse_table.values().all(|t| f.contains(*t)));
    // A rebuilt term is a new term.
    let a2 = f.insert_op_term(OpCode::Add, vec![x, y]).unwrap();
    assert_ne!(a, a2);
}

#[test]
fn foreign_operand() {
    let (mut f, x, _) = func(InsertOpts::default());
    let (_, other, _) = func(InsertOpts::default());
    assert_eq!(
        f.insert_op_term(OpCode::Add, vec![x, other]),
        Err(TermError::ForeignTerm(other, "f".into()))
    );
}

#[test]
fn cse_idempotence() {
    let (mut f, x, y) = func(opts(true, false, false));
    let a = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
    let b = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
    assert_eq!(a, b);
    // Order matters without normalization.
    let c = f.insert_op_term(OpCode::Mul, vec![y, x]).unwrap();
    assert_ne!(a, c);

    let (mut f, x, y) = func(opts(true, true, false));
    let a = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
    let c = f.insert_op_term(OpCode::Mul, vec![y, x]).unwrap();
    assert_eq!(a, c);
    // Not commutative
    let s = f.insert_op_term(OpCode::Sub, vec![x, y]).unwrap();
    let t = f.insert_op_term(OpCode::Sub, vec![y, x]).unwrap();
    assert_ne!(s, t);

    let (mut f, x, y) = func(opts(false, true, false));
    let a = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
    let b = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
    assert_ne!(a, b);
}

#[test]
fn const_folding() {
    let (mut f, _, _) = func(opts(false, false, true));
    let a = f.add_const(vec![1, 2, 3, 250]).unwrap();
    let b = f.add_scalar_const(10).unwrap();
    let s = f.insert_op_term(OpCode::Add, vec![a, b]).unwrap();
    assert_eq!(f.data_flow().const_value(s).unwrap(), &[11, 12, 13, 4]);
    let r = f.insert_op_term(OpCode::Rotate(1), vec![a]).unwrap();
    assert_eq!(f.data_flow().const_value(r).unwrap(), &[2, 3, 250, 1]);
    let n = f.insert_op_term(OpCode::Negate, vec![b]).unwrap();
    assert_eq!(f.data_flow().const_value(n).unwrap(), &[246; 4]);
    assert_eq!(f.count_terms(|t| t.is_operation()), 0);
}

#[test]
fn signed_reduction() {
    let mut f = Func::new("f", 2, 4, true, true).unwrap();
    let c = f.add_const(vec![7, 9]).unwrap();
    assert_eq!(f.data_flow().const_value(c).unwrap(), &[7, -7]);
}

#[test]
fn replace_moves_outputs_and_consumers() {
    let (mut f, x, y) = func(opts(true, true, false));
    let m = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
    let r = f.insert_op_term(OpCode::Rotate(1), vec![m]).unwrap();
    f.set_output(m, "m").unwrap();
    f.set_output(r, "r").unwrap();
    let s = f.insert_op_term(OpCode::Square, vec![x]).unwrap();
    f.replace_term_with(m, s).unwrap();
    assert!(!f.contains(m));
    assert_eq!(f.data_flow().output_by_label("m"), Some(s));
    assert_eq!(f.get(r).unwrap().cs(), &[s]);
    assert_eq!(f.consumers(s).collect::<Vec<_>>(), vec![r]);
    // Replacing a term without consumers is fine.
    let lone = f.insert_op_term(OpCode::Negate, vec![y]).unwrap();
    f.replace_term_with(lone, x).unwrap();
    assert!(!f.contains(lone));
}

#[test]
fn replace_rejects_cycles() {
    let (mut f, x, _) = func(InsertOpts::default());
    let n = f.insert_op_term(OpCode::Negate, vec![x]).unwrap();
    let nn = f.insert_op_term(OpCode::Negate, vec![n]).unwrap();
    f.set_output(nn, "out").unwrap();
    assert_eq!(
        f.replace_term_with(n, nn),
        Err(TermError::Cycle { old: n, new: nn })
    );
}

#[test]
fn replace_merges_duplicates() {
    let (mut f, x, y) = func(opts(true, true, false));
    let a = f.insert_op_term(OpCode::Add, vec![x, y]).unwrap();
    let na = f.insert_op_term(OpCode::Negate, vec![a]).unwrap();
    let ny = f.insert_op_term(OpCode::Negate, vec![y]).unwrap();
    f.set_output(na, "a").unwrap();
    f.set_output(ny, "b").unwrap();
    f.replace_term_with(a, y).unwrap();
    assert!(!f.contains(na));
    assert_eq!(f.data_flow().output_by_label("a"), Some(ny));
    assert_eq!(f.data_flow().outputs_info()[&ny].labels.len(), 2);
}

#[test]
fn dead_constants_are_dropped() {
    let (mut f, x, _) = func(opts(true, false, false));
    let c = f.add_scalar_const(5).unwrap();
    let m = f.insert_op_term(OpCode::Mul, vec![x, c]).unwrap();
    f.set_output(m, "out").unwrap();
    f.replace_term_with(m, x).unwrap();
    assert!(!f.contains(c));
    assert!(f.data_flow().constants_info().is_empty());
    assert!(f.contains(x));
    let c2 = f.add_scalar_const(5).unwrap();
    assert_ne!(c, c2);
}

#[test]
fn interpose_routes_consumers() {
    let (mut f, x, y) = func(opts(true, true, false));
    let m = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
    let a = f.insert_op_term(OpCode::Add, vec![m, x]).unwrap();
    f.set_output(a, "a").unwrap();
    f.set_output(m, "m").unwrap();
    let r = f.interpose(m, OpCode::Relin).unwrap();
    assert_eq!(f.get(r).unwrap().cs(), &[m]);
    assert!(f.get(a).unwrap().cs().contains(&r));
    assert_eq!(f.data_flow().output_by_label("m"), Some(r));
    assert_eq!(f.consumers(m).collect::<Vec<_>>(), vec![r]);
}

#[test]
fn top_sort_and_depths() {
    let (mut f, x, y) = func(opts(true, true, false));
    let m = f.insert_op_term(OpCode::Mul, vec![x, y]).unwrap();
    let c = f.add_scalar_const(2).unwrap();
    let pm = f.insert_op_term(OpCode::Mul, vec![m, c]).unwrap();
    let s = f.insert_op_term(OpCode::Square, vec![pm]).unwrap();
    f.set_output(s, "out").unwrap();
    let order = f.get_top_sorted_terms();
    let pos = |t: TermId| order.iter().position(|o| *o == t).unwrap();
    assert!(pos(x) < pos(m) && pos(y) < pos(m));
    assert!(pos(m) < pos(pm) && pos(c) < pos(pm) && pos(pm) < pos(s));
    let d = f.mul_depths();
    assert_eq!((d[&m], d[&pm], d[&s]), (1, 1, 2));
}

#[test]
fn eval_semantics() {
    let (mut f, x, y) = func(opts(true, true, false));
    let r = f.insert_op_term(OpCode::Rotate(1), vec![x]).unwrap();
    let s = f.insert_op_term(OpCode::SumVec(2), vec![y]).unwrap();
    let m = f.insert_op_term(OpCode::Mul, vec![r, s]).unwrap();
    f.set_output(r, "r").unwrap();
    f.set_output(s, "s").unwrap();
    f.set_output(m, "m").unwrap();
    let out = eval_func(
        &f,
        &inputs(&[("x", vec![1, 2, 3, 4]), ("y", vec![10, 20, 30, 40])]),
    )
    .unwrap();
    assert_eq!(out["r"], vec![2, 3, 4, 1]);
    assert_eq!(out["s"], vec![30, 50, 70, 50]);
    assert_eq!(out["m"], vec![60, 150, 280 % 256, 50]);
    assert_eq!(
        eval_func(&f, &inputs(&[("x", vec![1])])),
        Err(eval::EvalError::MissingInput("y".into()))
    );
}

#[quickcheck]
fn printed_outputs_parse_back(ArbitraryFunc(f): ArbitraryFunc) -> bool {
    let mut g = f.clone();
    for t in f.data_flow().output_terms() {
        let e = f.expr_str(t);
        let n = text::parse_expr(&mut g, &e).unwrap();
        let label = f.data_flow().outputs_info()[&t]
            .labels
            .iter()
            .next()
            .unwrap()
            .clone();
        g.set_output(n, &label).unwrap();
    }
    agree_on_random_inputs(&f, &g, 2, 7).unwrap()
}

#[quickcheck]
fn topo_order_is_complete_and_acyclic(ArbitraryFunc(f): ArbitraryFunc) -> bool {
    let order = f.get_top_sorted_terms();
    let mut seen = FxHashSet::default();
    for t in &order {
        if !f.get(*t).unwrap().cs().iter().all(|c| seen.contains(c)) {
            return false;
        }
        seen.insert(*t);
    }
    order.len() == f.term_count()
}
