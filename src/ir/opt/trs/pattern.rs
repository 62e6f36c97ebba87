//! Term patterns and their matching
//!
//! A pattern is a tree of operation shapes whose leaves are variables. Matching a pattern against
//! a term enumerates every substitution under which the pattern denotes that term. Operands of
//! commutative operations match in either order, and a variable occurring twice must bind the
//! same term (or step) both times.

use crate::ir::term::eval::reduce_value;
use crate::ir::term::{Func, OpCode, TermError, TermId};

/// A rotation step or window: a variable or a literal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Binds (or must equal) the step named so
    Var(&'static str),
    /// Exactly this step
    Lit(i64),
}

/// The shape of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpPat {
    /// `+`
    Add,
    /// Binary `-`
    Sub,
    /// `*`
    Mul,
    /// Unary `-`
    Negate,
    /// `square`
    Square,
    /// `<<`
    Rotate(Step),
    /// `SumVec`
    SumVec(Step),
}

/// A term pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pat {
    /// Any term
    Any(&'static str),
    /// A ciphertext term
    Cipher(&'static str),
    /// A plaintext term
    Plain(&'static str),
    /// A constant
    Const(&'static str),
    /// A constant with this value in every slot
    Lit(i64),
    /// An operation over sub-patterns
    Op(OpPat, Vec<Pat>),
    /// The sub-pattern, also binding the matched term to the name
    Named(&'static str, Box<Pat>),
}

/// Bindings of pattern variables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subst {
    terms: Vec<(&'static str, TermId)>,
    steps: Vec<(&'static str, i64)>,
}

impl Subst {
    /// The term bound to `v`.
    ///
    /// Panics if `v` is unbound: rules only ask for variables their left-hand side binds.
    pub fn get(&self, v: &str) -> TermId {
        self.terms
            .iter()
            .find(|(n, _)| *n == v)
            .map(|(_, t)| *t)
            .unwrap_or_else(|| panic!("unbound variable {}", v))
    }

    /// The step bound to `v`.
    pub fn step(&self, v: &str) -> i64 {
        self.steps
            .iter()
            .find(|(n, _)| *n == v)
            .map(|(_, s)| *s)
            .unwrap_or_else(|| panic!("unbound step {}", v))
    }

    /// Bind `v` to `t`; false if `v` is bound to something else.
    pub fn bind(&mut self, v: &'static str, t: TermId) -> bool {
        match self.terms.iter().find(|(n, _)| *n == v) {
            Some((_, b)) => *b == t,
            None => {
                self.terms.push((v, t));
                true
            }
        }
    }

    /// Bind the step `v` to `s`; false if `v` is bound to another step.
    pub fn bind_step(&mut self, v: &'static str, s: i64) -> bool {
        match self.steps.iter().find(|(n, _)| *n == v) {
            Some((_, b)) => *b == s,
            None => {
                self.steps.push((v, s));
                true
            }
        }
    }
}

fn match_step(step: Step, actual: i64, s: &mut Subst) -> bool {
    match step {
        Step::Lit(l) => l == actual,
        Step::Var(v) => s.bind_step(v, actual),
    }
}

fn match_op(op: OpPat, actual: &OpCode, s: &mut Subst) -> bool {
    match (op, actual) {
        (OpPat::Add, OpCode::Add)
        | (OpPat::Sub, OpCode::Sub)
        | (OpPat::Mul, OpCode::Mul)
        | (OpPat::Negate, OpCode::Negate)
        | (OpPat::Square, OpCode::Square) => true,
        (OpPat::Rotate(st), OpCode::Rotate(a)) => match_step(st, *a, s),
        (OpPat::SumVec(st), OpCode::SumVec(w)) => match_step(st, *w as i64, s),
        _ => false,
    }
}

/// Does constant `t` hold `lit` (as reduced by `f`) in every slot?
pub fn is_lit(f: &Func, t: TermId, lit: i64) -> bool {
    let lit = reduce_value(lit, f.bit_width(), f.signed());
    f.data_flow()
        .constants_info()
        .get(&t)
        .and_then(|c| c.scalar())
        .map_or(false, |v| v == lit)
}

/// Every way `pat` matches `t`, extending `s`.
pub fn match_all(f: &Func, pat: &Pat, t: TermId, s: Subst) -> Vec<Subst> {
    let term = match f.term(t) {
        Some(term) => term,
        None => return Vec::new(),
    };
    let mut s = s;
    let (ok, v) = match pat {
        Pat::Any(v) => (true, *v),
        Pat::Cipher(v) => (term.is_cipher(), *v),
        Pat::Plain(v) => (!term.is_cipher(), *v),
        Pat::Const(v) => (f.data_flow().is_const(t), *v),
        Pat::Lit(l) => return if is_lit(f, t, *l) { vec![s] } else { Vec::new() },
        Pat::Op(op, args) => {
            if !match_op(*op, term.op(), &mut s) || args.len() != term.cs().len() {
                return Vec::new();
            }
            let mut orders = vec![term.cs().to_vec()];
            if term.op().is_commutative() && term.cs()[0] != term.cs()[1] {
                orders.push(vec![term.cs()[1], term.cs()[0]]);
            }
            let mut out = Vec::new();
            for cs in orders {
                let mut partial = vec![s.clone()];
                for (p, c) in args.iter().zip(cs) {
                    partial = partial
                        .into_iter()
                        .flat_map(|s| match_all(f, p, c, s))
                        .collect();
                }
                out.extend(partial);
            }
            return out;
        }
        Pat::Named(v, p) => {
            return match_all(f, p, t, s)
                .into_iter()
                .filter_map(|mut s| if s.bind(v, t) { Some(s) } else { None })
                .collect();
        }
    };
    if ok && s.bind(v, t) {
        vec![s]
    } else {
        Vec::new()
    }
}

fn build_step(step: Step, s: &Subst) -> i64 {
    match step {
        Step::Lit(l) => l,
        Step::Var(v) => s.step(v),
    }
}

/// Instantiate `pat` under `s`, inserting the terms it denotes.
pub fn build(f: &mut Func, pat: &Pat, s: &Subst) -> Result<TermId, TermError> {
    match pat {
        Pat::Any(v) | Pat::Cipher(v) | Pat::Plain(v) | Pat::Const(v) => Ok(s.get(v)),
        Pat::Lit(l) => f.add_scalar_const(*l),
        Pat::Named(_, p) => build(f, p, s),
        Pat::Op(op, args) => {
            let op = match op {
                OpPat::Add => OpCode::Add,
                OpPat::Sub => OpCode::Sub,
                OpPat::Mul => OpCode::Mul,
                OpPat::Negate => OpCode::Negate,
                OpPat::Square => OpCode::Square,
                OpPat::Rotate(st) => OpCode::Rotate(build_step(*st, s)),
                OpPat::SumVec(st) => OpCode::SumVec(build_step(*st, s) as usize),
            };
            let mut cs = Vec::with_capacity(args.len());
            for a in args {
                cs.push(build(f, a, s)?);
            }
            f.insert_op_term(op, cs)
        }
    }
}

/// Shorthands for writing patterns.
pub mod dsl {
    use super::{OpPat, Pat, Step};

    /// Any term
    pub fn v(n: &'static str) -> Pat {
        Pat::Any(n)
    }
    /// A ciphertext
    pub fn ct(n: &'static str) -> Pat {
        Pat::Cipher(n)
    }
    /// A constant
    pub fn k(n: &'static str) -> Pat {
        Pat::Const(n)
    }
    /// `p`, naming the matched term `n`
    pub fn named(n: &'static str, p: Pat) -> Pat {
        Pat::Named(n, Box::new(p))
    }
    /// A literal
    pub fn lit(l: i64) -> Pat {
        Pat::Lit(l)
    }
    /// `a + b`
    pub fn add(a: Pat, b: Pat) -> Pat {
        Pat::Op(OpPat::Add, vec![a, b])
    }
    /// `a - b`
    pub fn sub(a: Pat, b: Pat) -> Pat {
        Pat::Op(OpPat::Sub, vec![a, b])
    }
    /// `a * b`
    pub fn mul(a: Pat, b: Pat) -> Pat {
        Pat::Op(OpPat::Mul, vec![a, b])
    }
    /// `- a`
    pub fn neg(a: Pat) -> Pat {
        Pat::Op(OpPat::Negate, vec![a])
    }
    /// `square a`
    pub fn square(a: Pat) -> Pat {
        Pat::Op(OpPat::Square, vec![a])
    }
    /// `a << s`
    pub fn rot(a: Pat, s: &'static str) -> Pat {
        Pat::Op(OpPat::Rotate(Step::Var(s)), vec![a])
    }
    /// `SumVec a w`
    pub fn sumvec(a: Pat, w: &'static str) -> Pat {
        Pat::Op(OpPat::SumVec(Step::Var(w)), vec![a])
    }
}
