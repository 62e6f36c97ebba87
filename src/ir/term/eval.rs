//! Cleartext evaluation
//!
//! Values are vectors with one integer per slot, reduced modulo `2^bit_width` (and read as
//! two's-complement when the function is signed).

use super::{Func, OpCode, TermId};

use fxhash::FxHashMap;
use log::trace;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaChaRng;
use thiserror::Error;

use std::collections::BTreeMap;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Evaluation failures
pub enum EvalError {
    #[error("no value for input '{0}'")]
    /// An input was not assigned
    MissingInput(String),
    #[error("input '{label}' has {found} slots, expected 1 or {expected}")]
    /// An input was assigned a vector of the wrong width
    InputWidth {
        /// The input
        label: String,
        /// The slot count
        expected: usize,
        /// The given width
        found: usize,
    },
}

/// Reduce `v` modulo `2^bit_width`; read it as two's-complement when `signed`.
pub fn reduce_value(v: i64, bit_width: u32, signed: bool) -> i64 {
    if bit_width >= 64 {
        return v;
    }
    let mask = (1u64 << bit_width) - 1;
    let m = (v as u64) & mask;
    if signed && m >> (bit_width - 1) == 1 {
        (m as i64) - (1i64 << bit_width)
    } else {
        m as i64
    }
}

/// Reduce every slot of `v`.
pub fn reduce(v: Vec<i64>, bit_width: u32, signed: bool) -> Vec<i64> {
    v.into_iter()
        .map(|x| reduce_value(x, bit_width, signed))
        .collect()
}

fn rotate(v: &[i64], steps: i64) -> Vec<i64> {
    let n = v.len() as i64;
    let steps = steps.rem_euclid(n);
    (0..n).map(|i| v[((i + steps) % n) as usize]).collect()
}

/// Apply `op` slot-wise, with wrapping (unreduced) arithmetic.
pub fn eval_op(op: &OpCode, args: &[&[i64]], slot_count: usize) -> Vec<i64> {
    let zip = |f: fn(i64, i64) -> i64| -> Vec<i64> {
        args[0]
            .iter()
            .zip(args[1].iter())
            .map(|(a, b)| f(*a, *b))
            .collect()
    };
    match op {
        OpCode::Add => zip(i64::wrapping_add),
        OpCode::Sub => zip(i64::wrapping_sub),
        OpCode::Mul => zip(i64::wrapping_mul),
        OpCode::Negate => args[0].iter().map(|a| a.wrapping_neg()).collect(),
        OpCode::Square => args[0].iter().map(|a| a.wrapping_mul(*a)).collect(),
        OpCode::Rotate(s) => rotate(args[0], *s),
        OpCode::SumVec(w) => {
            let mut acc = vec![0i64; slot_count];
            for k in 0..*w {
                for (a, x) in acc.iter_mut().zip(rotate(args[0], k as i64)) {
                    *a = a.wrapping_add(x);
                }
            }
            acc
        }
        OpCode::Relin => args[0].to_vec(),
        OpCode::Nop => panic!("leaves are not evaluated"),
    }
}

/// Evaluate every term of `func` on the input assignment `inputs` (keyed by input label).
pub fn eval_terms(
    func: &Func,
    inputs: &FxHashMap<String, Vec<i64>>,
) -> Result<FxHashMap<TermId, Vec<i64>>, EvalError> {
    let n = func.slot_count();
    let mut vs: FxHashMap<TermId, Vec<i64>> = FxHashMap::default();
    for t in func.get_top_sorted_terms() {
        let term = func.term(t).expect("sorted terms are live");
        let v = if let Some(info) = func.data_flow().inputs_info().get(&t) {
            let given = inputs
                .get(&info.label)
                .ok_or_else(|| EvalError::MissingInput(info.label.clone()))?;
            match given.len() {
                1 => vec![given[0]; n],
                m if m == n => given.clone(),
                m => {
                    return Err(EvalError::InputWidth {
                        label: info.label.clone(),
                        expected: n,
                        found: m,
                    })
                }
            }
        } else if let Some(c) = func.data_flow().const_value(t) {
            c.to_vec()
        } else {
            let args: Vec<&[i64]> = term.cs().iter().map(|c| vs[c].as_slice()).collect();
            eval_op(term.op(), &args, n)
        };
        let v = reduce(v, func.bit_width(), func.signed());
        trace!("{} = {:?}", t, v);
        vs.insert(t, v);
    }
    Ok(vs)
}

/// Evaluate the outputs of `func`, keyed by output label.
pub fn eval_func(
    func: &Func,
    inputs: &FxHashMap<String, Vec<i64>>,
) -> Result<BTreeMap<String, Vec<i64>>, EvalError> {
    let vs = eval_terms(func, inputs)?;
    let mut outputs = BTreeMap::new();
    for (t, info) in func.data_flow().outputs_info() {
        for label in &info.labels {
            outputs.insert(label.clone(), vs[t].clone());
        }
    }
    Ok(outputs)
}

/// Sample an assignment for every input of `func` from its declared range.
pub fn random_inputs<R: Rng>(func: &Func, rng: &mut R) -> FxHashMap<String, Vec<i64>> {
    let mut labels: Vec<_> = func.data_flow().inputs_info().values().collect();
    labels.sort_by(|a, b| a.label.cmp(&b.label));
    labels
        .into_iter()
        .map(|info| {
            let (lo, hi) = info.range;
            let (lo, hi) = (lo.min(hi), lo.max(hi));
            let v = (0..func.slot_count())
                .map(|_| rng.gen_range(lo..=hi))
                .collect();
            (info.label.clone(), v)
        })
        .collect()
}

/// Do `a` and `b` agree on `samples` random input assignments (drawn from `a`'s declarations)?
pub fn agree_on_random_inputs(
    a: &Func,
    b: &Func,
    samples: usize,
    seed: u64,
) -> Result<bool, EvalError> {
    let mut rng = ChaChaRng::seed_from_u64(seed);
    for _ in 0..samples {
        let inputs = random_inputs(a, &mut rng);
        if eval_func(a, &inputs)? != eval_func(b, &inputs)? {
            return Ok(false);
        }
    }
    Ok(true)
}
