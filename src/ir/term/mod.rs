//! Term graph: the hash-consed DAG of operations of a [Func].
//!
//! Terms live in an arena owned by their [Func] and refer to their operands by [TermId]. The
//! function also keeps, for every term, the set of its consumers, which makes
//! [Func::replace_term_with] proportional to the number of uses it rewrites.

use fxhash::{FxHashMap, FxHashSet};
use log::trace;
use logos::Logos;
use thiserror::Error;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};

pub mod eval;
pub mod printer;
pub mod text;

use text::lex::Token;

#[cfg(test)]
pub mod dist;
#[cfg(test)]
mod test;

/// The identity of a term: its owning function and its index in that function's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TermId {
    owner: u32,
    idx: u32,
}

impl TermId {
    /// The position of this term in its function's arena. Indices grow monotonically.
    pub fn index(&self) -> usize {
        self.idx as usize
    }
}

impl Display for TermId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "t{}", self.idx)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// Whether a term holds a plaintext or a ciphertext.
pub enum TermType {
    /// Never encrypted.
    Plain,
    /// Encrypted; the target of all scheme-aware passes.
    Cipher,
}

impl Display for TermType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TermType::Plain => write!(f, "plain"),
            TermType::Cipher => write!(f, "cipher"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
/// An operation
pub enum OpCode {
    /// Leaves: inputs and constants
    Nop,
    /// Slot-wise addition
    Add,
    /// Slot-wise subtraction
    Sub,
    /// Slot-wise multiplication
    Mul,
    /// Slot-wise negation
    Negate,
    /// Slot-wise square
    Square,
    /// Cyclic left rotation by this many slots
    Rotate(i64),
    /// Sum of this many consecutive slots, starting at each slot
    SumVec(usize),
    /// Relinearization of a ciphertext
    Relin,
}

impl OpCode {
    /// How many operands this operation takes.
    pub fn arity(&self) -> usize {
        match self {
            OpCode::Nop => 0,
            OpCode::Add | OpCode::Sub | OpCode::Mul => 2,
            OpCode::Negate
            | OpCode::Square
            | OpCode::Rotate(_)
            | OpCode::SumVec(_)
            | OpCode::Relin => 1,
        }
    }

    /// Is the order of operands irrelevant?
    pub fn is_commutative(&self) -> bool {
        matches!(self, OpCode::Add | OpCode::Mul)
    }

    /// A name for the kind of operation, ignoring parameters.
    pub fn kind(&self) -> &'static str {
        match self {
            OpCode::Nop => "nop",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Negate => "negate",
            OpCode::Square => "square",
            OpCode::Rotate(_) => "rotate",
            OpCode::SumVec(_) => "SumVec",
            OpCode::Relin => "relin",
        }
    }

    /// The rotation step, for rotations.
    pub fn steps(&self) -> Option<i64> {
        match self {
            OpCode::Rotate(s) => Some(*s),
            _ => None,
        }
    }
}

impl Display for OpCode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            OpCode::Nop => write!(f, "nop"),
            OpCode::Add => write!(f, "+"),
            OpCode::Sub => write!(f, "-"),
            OpCode::Mul => write!(f, "*"),
            OpCode::Negate => write!(f, "-"),
            OpCode::Square => write!(f, "square"),
            OpCode::Rotate(_) => write!(f, "<<"),
            OpCode::SumVec(_) => write!(f, "SumVec"),
            OpCode::Relin => write!(f, "relin"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
/// A node of the term graph.
pub struct Term {
    id: TermId,
    ty: TermType,
    op: OpCode,
    cs: Vec<TermId>,
}

impl Term {
    /// Get this term's identity
    pub fn id(&self) -> TermId {
        self.id
    }
    /// Get this term's type
    pub fn ty(&self) -> TermType {
        self.ty
    }
    /// Get this term's operation
    pub fn op(&self) -> &OpCode {
        &self.op
    }
    /// Get this term's operands
    pub fn cs(&self) -> &[TermId] {
        &self.cs
    }
    /// Is this term a ciphertext?
    pub fn is_cipher(&self) -> bool {
        self.ty == TermType::Cipher
    }
    /// Is this term an operation (as opposed to an input or constant)?
    pub fn is_operation(&self) -> bool {
        self.op != OpCode::Nop
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// A misuse of the term graph
pub enum TermError {
    #[error("slot count {0} is not a power of two")]
    /// The vector width must be a power of two
    BadSlotCount(usize),
    #[error("bit width {0} is not in 1..=64")]
    /// Plaintext values must fit a machine word
    BadBitWidth(u32),
    #[error("term {0} does not exist in function '{1}'")]
    /// Unknown (deleted or foreign) term
    NoSuchTerm(TermId, String),
    #[error("term {0} belongs to another function than '{1}'")]
    /// Operands must belong to the function they are used in
    ForeignTerm(TermId, String),
    #[error("operation '{op}' takes {expected} operands, got {found}")]
    /// Wrong number of operands
    Arity {
        /// The operation
        op: OpCode,
        /// Its arity
        expected: usize,
        /// How many operands were given
        found: usize,
    },
    #[error("operation '{0}' needs a ciphertext operand")]
    /// Relinearizing a plaintext
    NotCipher(OpCode),
    #[error("'{0}' cannot label an input: it must be one symbol and not of the form c<digits>")]
    /// Labels must print as a single leaf that no constant prints as
    BadLabel(String),
    #[error("an input labelled '{0}' already exists")]
    /// Input labels are unique
    DuplicateInput(String),
    #[error("constant has {found} slots, expected 1 or {expected}")]
    /// Constants are scalars or full vectors
    ConstWidth {
        /// The slot count
        expected: usize,
        /// The given width
        found: usize,
    },
    #[error("replacing {old} with {new} would make {new} depend on itself")]
    /// The replacement depends on the term it replaces
    Cycle {
        /// Replaced term
        old: TermId,
        /// Replacement
        new: TermId,
    },
    #[error("rotation step {0} + {1} * {2} does not fit in 64 bits")]
    /// A rotation step computed from an offset, a count and a stride overflows
    StepOutOfRange(i64, i64, i64),
    #[error("no output labelled '{0}'")]
    /// Unknown output label
    NoSuchOutput(String),
}

/// Does `label` lex as a single symbol, distinct from every constant label (`c<digits>`)?
pub fn is_input_label(label: &str) -> bool {
    let mut lexer = Token::lexer(label);
    let single = lexer.next() == Some(Token::Ident)
        && lexer.span() == (0..label.len())
        && lexer.next().is_none();
    let reserved = label
        .strip_prefix('c')
        .map_or(false, |d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()));
    single && !reserved
}

#[derive(Clone, PartialEq, Eq, Debug)]
/// A declared input.
pub struct InputInfo {
    /// Symbolic name
    pub label: String,
    /// Inclusive range of the values the input takes
    pub range: (i64, i64),
}

#[derive(Clone, PartialEq, Eq, Debug)]
/// A literal.
pub struct ConstInfo {
    /// One value per slot
    pub value: Vec<i64>,
}

impl ConstInfo {
    /// The value shared by all slots, if any.
    pub fn scalar(&self) -> Option<i64> {
        let first = *self.value.first()?;
        if self.value.iter().all(|v| *v == first) {
            Some(first)
        } else {
            None
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
/// The names an output term is known by.
pub struct OutputInfo {
    /// Symbolic names
    pub labels: BTreeSet<String>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
/// The labelled terms of a function: inputs, constants, and outputs.
pub struct DataFlow {
    inputs: FxHashMap<TermId, InputInfo>,
    constants: FxHashMap<TermId, ConstInfo>,
    outputs: FxHashMap<TermId, OutputInfo>,
}

impl DataFlow {
    /// Input terms and their declarations.
    pub fn inputs_info(&self) -> &FxHashMap<TermId, InputInfo> {
        &self.inputs
    }
    /// Constant terms and their values.
    pub fn constants_info(&self) -> &FxHashMap<TermId, ConstInfo> {
        &self.constants
    }
    /// Output terms and their names.
    pub fn outputs_info(&self) -> &FxHashMap<TermId, OutputInfo> {
        &self.outputs
    }
    /// Is `t` an input?
    pub fn is_input(&self, t: TermId) -> bool {
        self.inputs.contains_key(&t)
    }
    /// Is `t` a constant?
    pub fn is_const(&self, t: TermId) -> bool {
        self.constants.contains_key(&t)
    }
    /// Is `t` an output?
    pub fn is_output(&self, t: TermId) -> bool {
        self.outputs.contains_key(&t)
    }
    /// The value of constant `t`.
    pub fn const_value(&self, t: TermId) -> Option<&[i64]> {
        self.constants.get(&t).map(|c| c.value.as_slice())
    }
    /// The input labelled `label`.
    pub fn input_by_label(&self, label: &str) -> Option<TermId> {
        self.inputs
            .iter()
            .find(|(_, i)| i.label == label)
            .map(|(t, _)| *t)
    }
    /// The output labelled `label`.
    pub fn output_by_label(&self, label: &str) -> Option<TermId> {
        self.outputs
            .iter()
            .find(|(_, o)| o.labels.contains(label))
            .map(|(t, _)| *t)
    }
    /// Output terms, ordered by their first label.
    pub fn output_terms(&self) -> Vec<TermId> {
        let by_label: BTreeMap<&String, TermId> = self
            .outputs
            .iter()
            .filter_map(|(t, o)| o.labels.iter().next().map(|l| (l, *t)))
            .collect();
        by_label.into_values().collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
/// Toggles consulted when a term is inserted. Changing them is not retroactive.
pub struct InsertOpts {
    /// Return the existing term for an identical operation
    pub cse: bool,
    /// Sort operands of commutative operations
    pub order_operands: bool,
    /// Fold operations whose operands are all constants
    pub const_folding: bool,
}

static NEXT_OWNER: AtomicU32 = AtomicU32::new(0);

type CseKey = (OpCode, Vec<TermId>);

#[derive(Clone, Debug)]
/// A named circuit over vectors of `slot_count` integers.
pub struct Func {
    name: String,
    slot_count: usize,
    bit_width: u32,
    signed: bool,
    need_cyclic_rotation: bool,
    owner: u32,
    terms: Vec<Option<Term>>,
    uses: Vec<BTreeSet<TermId>>,
    cse_table: FxHashMap<CseKey, TermId>,
    const_table: FxHashMap<Vec<i64>, TermId>,
    data_flow: DataFlow,
    opts: InsertOpts,
}

impl Func {
    /// Create an empty function.
    pub fn new(
        name: &str,
        slot_count: usize,
        bit_width: u32,
        signed: bool,
        need_cyclic_rotation: bool,
    ) -> Result<Self, TermError> {
        if !slot_count.is_power_of_two() {
            return Err(TermError::BadSlotCount(slot_count));
        }
        if bit_width == 0 || bit_width > 64 {
            return Err(TermError::BadBitWidth(bit_width));
        }
        Ok(Self {
            name: name.to_owned(),
            slot_count,
            bit_width,
            signed,
            need_cyclic_rotation,
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            terms: Vec::new(),
            uses: Vec::new(),
            cse_table: FxHashMap::default(),
            const_table: FxHashMap::default(),
            data_flow: DataFlow::default(),
            opts: InsertOpts::default(),
        })
    }

    /// The function's name
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The vector width
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }
    /// Bits per plaintext value
    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }
    /// Are plaintext values signed?
    pub fn signed(&self) -> bool {
        self.signed
    }
    /// Do rotations wrap around?
    pub fn need_cyclic_rotation(&self) -> bool {
        self.need_cyclic_rotation
    }
    /// Labelled terms
    pub fn data_flow(&self) -> &DataFlow {
        &self.data_flow
    }
    /// Current insertion toggles
    pub fn insert_opts(&self) -> InsertOpts {
        self.opts
    }
    /// Set the insertion toggles for subsequently inserted terms.
    pub fn set_insert_opts(&mut self, opts: InsertOpts) {
        self.opts = opts;
    }

    /// Get a live term.
    pub fn term(&self, t: TermId) -> Option<&Term> {
        if t.owner != self.owner {
            return None;
        }
        self.terms.get(t.index()).and_then(|o| o.as_ref())
    }

    /// Get a live term, or explain why it is not one.
    pub fn get(&self, t: TermId) -> Result<&Term, TermError> {
        if t.owner != self.owner {
            return Err(TermError::ForeignTerm(t, self.name.clone()));
        }
        self.term(t)
            .ok_or_else(|| TermError::NoSuchTerm(t, self.name.clone()))
    }

    /// Is `t` a live term of this function?
    pub fn contains(&self, t: TermId) -> bool {
        self.term(t).is_some()
    }

    /// The terms that use `t` as an operand.
    pub fn consumers(&self, t: TermId) -> impl Iterator<Item = TermId> + '_ {
        self.uses
            .get(t.index())
            .filter(|_| t.owner == self.owner)
            .into_iter()
            .flat_map(|u| u.iter().copied())
    }

    /// How many distinct terms use `t`.
    pub fn consumer_count(&self, t: TermId) -> usize {
        self.consumers(t).count()
    }

    /// All live terms, in creation order.
    pub fn terms(&self) -> impl Iterator<Item = &Term> + '_ {
        self.terms.iter().filter_map(|t| t.as_ref())
    }

    /// The number of live terms.
    pub fn term_count(&self) -> usize {
        self.terms().count()
    }

    /// The number of live terms satisfying `pred`.
    pub fn count_terms<P: Fn(&Term) -> bool>(&self, pred: P) -> usize {
        self.terms().filter(|t| pred(t)).count()
    }

    /// The number of ciphertext rotations.
    pub fn rotation_count(&self) -> usize {
        self.count_terms(|t| t.is_cipher() && matches!(t.op, OpCode::Rotate(_)))
    }

    /// How many operation terms there are of each kind.
    pub fn op_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for t in self.terms().filter(|t| t.is_operation()) {
            *counts.entry(t.op.kind()).or_insert(0) += 1;
        }
        counts
    }

    fn fresh_id(&self) -> TermId {
        TermId {
            owner: self.owner,
            idx: self.terms.len() as u32,
        }
    }

    fn push_term(&mut self, ty: TermType, op: OpCode, cs: Vec<TermId>) -> TermId {
        let id = self.fresh_id();
        for c in &cs {
            self.uses[c.index()].insert(id);
        }
        if op != OpCode::Nop {
            self.cse_table.insert((op.clone(), cs.clone()), id);
        }
        self.terms.push(Some(Term { id, ty, op, cs }));
        self.uses.push(BTreeSet::new());
        id
    }

    /// Declare an input.
    pub fn add_input(
        &mut self,
        label: &str,
        ty: TermType,
        range: (i64, i64),
    ) -> Result<TermId, TermError> {
        if !is_input_label(label) {
            return Err(TermError::BadLabel(label.to_owned()));
        }
        if self.data_flow.input_by_label(label).is_some() {
            return Err(TermError::DuplicateInput(label.to_owned()));
        }
        let id = self.push_term(ty, OpCode::Nop, Vec::new());
        self.data_flow.inputs.insert(
            id,
            InputInfo {
                label: label.to_owned(),
                range,
            },
        );
        Ok(id)
    }

    /// Insert a constant; `value` holds one value per slot, or a single value for all slots.
    pub fn add_const(&mut self, value: Vec<i64>) -> Result<TermId, TermError> {
        let value = match value.len() {
            1 => vec![value[0]; self.slot_count],
            n if n == self.slot_count => value,
            n => {
                return Err(TermError::ConstWidth {
                    expected: self.slot_count,
                    found: n,
                })
            }
        };
        let value = eval::reduce(value, self.bit_width, self.signed);
        if self.opts.cse {
            if let Some(&t) = self.const_table.get(&value) {
                if self.data_flow.is_const(t) {
                    return Ok(t);
                }
            }
        }
        let id = self.push_term(TermType::Plain, OpCode::Nop, Vec::new());
        self.const_table.insert(value.clone(), id);
        self.data_flow.constants.insert(id, ConstInfo { value });
        Ok(id)
    }

    /// Insert a constant holding `value` in every slot.
    pub fn add_scalar_const(&mut self, value: i64) -> Result<TermId, TermError> {
        self.add_const(vec![value])
    }

    /// Label `t` as an output.
    pub fn set_output(&mut self, t: TermId, label: &str) -> Result<(), TermError> {
        self.get(t)?;
        if let Some(prev) = self.data_flow.output_by_label(label) {
            self.remove_output_label(prev, label);
        }
        self.data_flow
            .outputs
            .entry(t)
            .or_default()
            .labels
            .insert(label.to_owned());
        Ok(())
    }

    fn remove_output_label(&mut self, t: TermId, label: &str) {
        if let Some(o) = self.data_flow.outputs.get_mut(&t) {
            o.labels.remove(label);
            if o.labels.is_empty() {
                self.data_flow.outputs.remove(&t);
                self.prune(t);
            }
        }
    }

    fn normalize_operands(&self, op: &OpCode, cs: &mut [TermId]) {
        if self.opts.order_operands && op.is_commutative() {
            cs.sort();
        }
    }

    fn live_cse_entry(&self, key: &CseKey) -> Option<TermId> {
        let t = *self.cse_table.get(key)?;
        let term = self.term(t)?;
        if term.op == key.0 && term.cs == key.1 {
            Some(t)
        } else {
            None
        }
    }

    /// Insert an operation over `operands`.
    ///
    /// Depending on the insertion toggles, this may return an existing identical term (CSE) or a
    /// constant holding the folded result (constant folding).
    pub fn insert_op_term(
        &mut self,
        op: OpCode,
        mut operands: Vec<TermId>,
    ) -> Result<TermId, TermError> {
        if op.arity() != operands.len() || op == OpCode::Nop {
            return Err(TermError::Arity {
                expected: op.arity(),
                found: operands.len(),
                op,
            });
        }
        let mut ty = TermType::Plain;
        for c in &operands {
            if self.get(*c)?.is_cipher() {
                ty = TermType::Cipher;
            }
        }
        if op == OpCode::Relin && ty != TermType::Cipher {
            return Err(TermError::NotCipher(op));
        }
        if self.opts.const_folding && operands.iter().all(|c| self.data_flow.is_const(*c)) {
            let args: Vec<&[i64]> = operands
                .iter()
                .map(|c| self.data_flow.const_value(*c).expect("constant operand"))
                .collect();
            let folded = eval::eval_op(&op, &args, self.slot_count);
            trace!("fold {} over {:?}", op, operands);
            return self.add_const(folded);
        }
        self.normalize_operands(&op, &mut operands);
        let key = (op, operands);
        if self.opts.cse {
            if let Some(t) = self.live_cse_entry(&key) {
                return Ok(t);
            }
        }
        let (op, operands) = key;
        Ok(self.push_term(ty, op, operands))
    }

    /// The live term computing `op` over `operands`, if one is recorded, without inserting.
    pub fn lookup_op_term(&self, op: &OpCode, operands: &[TermId]) -> Option<TermId> {
        let mut cs = operands.to_vec();
        self.normalize_operands(op, &mut cs);
        self.live_cse_entry(&(op.clone(), cs))
    }

    /// Delete every term that is dead: no consumers, not an output, not an input.
    ///
    /// Returns how many terms were deleted.
    pub fn collect_garbage(&mut self) -> usize {
        let before = self.term_count();
        let dead: Vec<TermId> = self
            .terms()
            .map(|t| t.id)
            .filter(|t| self.uses[t.index()].is_empty())
            .collect();
        for t in dead {
            self.prune(t);
        }
        let collected = before - self.term_count();
        if collected > 0 {
            trace!("collected {} dead terms in '{}'", collected, self.name);
        }
        collected
    }

    /// Does `from` (transitively) use `to`?
    pub fn depends_on(&self, from: TermId, to: TermId) -> bool {
        let mut stack = vec![from];
        let mut visited = FxHashSet::default();
        while let Some(t) = stack.pop() {
            if t == to {
                return true;
            }
            if visited.insert(t) {
                if let Some(term) = self.term(t) {
                    stack.extend(term.cs.iter().copied());
                }
            }
        }
        false
    }

    /// Make every consumer of `old` use `new` instead, and move `old`'s output labels to `new`.
    ///
    /// A no-op when `old == new`. Afterwards `old` is deleted if nothing uses it, and so are its
    /// operands, recursively. With CSE enabled, consumers that become identical to an existing
    /// term are merged into it.
    pub fn replace_term_with(&mut self, old: TermId, new: TermId) -> Result<(), TermError> {
        self.get(old)?;
        self.get(new)?;
        if old == new {
            return Ok(());
        }
        if self.depends_on(new, old) {
            return Err(TermError::Cycle { old, new });
        }
        self.redirect(old, new, None);
        Ok(())
    }

    /// Insert `op(t)` and route all of `t`'s consumers and output labels through it.
    pub fn interpose(&mut self, t: TermId, op: OpCode) -> Result<TermId, TermError> {
        let saved = self.opts;
        self.opts.const_folding = false;
        let inserted = self.insert_op_term(op, vec![t]);
        self.opts = saved;
        let r = inserted?;
        self.redirect(t, r, Some(r));
        Ok(r)
    }

    fn redirect(&mut self, old: TermId, new: TermId, except: Option<TermId>) {
        let mut work = vec![(old, new)];
        while let Some((old, new)) = work.pop() {
            if !self.contains(old) || !self.contains(new) || old == new {
                continue;
            }
            trace!("replace {} with {}", old, new);
            let consumers: Vec<TermId> = self.uses[old.index()]
                .iter()
                .copied()
                .filter(|c| Some(*c) != except)
                .collect();
            for c in consumers {
                self.uses[old.index()].remove(&c);
                self.uses[new.index()].insert(c);
                let opts = self.opts;
                if let Some((op, cs)) = self.term(c).map(|t| (t.op.clone(), t.cs.clone())) {
                    self.forget_cse_entry(&op, &cs, c);
                }
                let term = self.terms[c.index()].as_mut().expect("live consumer");
                for o in term.cs.iter_mut() {
                    if *o == old {
                        *o = new;
                    }
                }
                if opts.order_operands && term.op.is_commutative() {
                    term.cs.sort();
                }
                let key = (term.op.clone(), term.cs.clone());
                self.refresh_type(c);
                match self.live_cse_entry(&key) {
                    Some(e) if e != c && opts.cse => work.push((c, e)),
                    Some(_) => {}
                    None => {
                        self.cse_table.insert(key, c);
                    }
                }
            }
            if let Some(info) = self.data_flow.outputs.remove(&old) {
                self.data_flow
                    .outputs
                    .entry(new)
                    .or_default()
                    .labels
                    .extend(info.labels);
            }
            self.prune(old);
        }
    }

    /// Recompute the type of `t` and its consumers after an operand changed.
    fn refresh_type(&mut self, t: TermId) {
        let mut stack = vec![t];
        while let Some(t) = stack.pop() {
            let term = match self.term(t) {
                Some(term) if term.is_operation() => term,
                _ => continue,
            };
            let ty = if term.cs.iter().any(|c| self.get(*c).map_or(false, |c| c.is_cipher())) {
                TermType::Cipher
            } else {
                TermType::Plain
            };
            if ty != term.ty {
                self.terms[t.index()].as_mut().expect("live").ty = ty;
                stack.extend(self.uses[t.index()].iter().copied());
            }
        }
    }

    /// Delete `t` if it is dead: no consumers, not an output, not an input. Cascades to operands.
    fn prune(&mut self, t: TermId) {
        let mut stack = vec![t];
        while let Some(t) = stack.pop() {
            if !self.contains(t)
                || !self.uses[t.index()].is_empty()
                || self.data_flow.is_output(t)
                || self.data_flow.is_input(t)
            {
                continue;
            }
            let term = self.terms[t.index()].take().expect("live");
            trace!("prune {}", t);
            self.forget_cse_entry(&term.op, &term.cs, t);
            if let Some(c) = self.data_flow.constants.remove(&t) {
                if self.const_table.get(&c.value) == Some(&t) {
                    self.const_table.remove(&c.value);
                }
            }
            for c in term.cs {
                self.uses[c.index()].remove(&t);
                stack.push(c);
            }
        }
    }

    /// Drop the CSE entry for `(op, cs)` if it records `t`.
    fn forget_cse_entry(&mut self, op: &OpCode, cs: &[TermId], t: TermId) {
        let key = (op.clone(), cs.to_vec());
        if self.cse_table.get(&key) == Some(&t) {
            self.cse_table.remove(&key);
        }
    }

    /// All live terms, operands before consumers.
    pub fn get_top_sorted_terms(&self) -> Vec<TermId> {
        let mut order = Vec::with_capacity(self.terms.len());
        let mut visited = FxHashSet::default();
        for root in self.terms().map(|t| t.id) {
            // (children pushed, term)
            let mut stack = vec![(false, root)];
            while let Some((children_pushed, t)) = stack.pop() {
                if children_pushed {
                    order.push(t);
                    continue;
                }
                if !visited.insert(t) {
                    continue;
                }
                stack.push((true, t));
                let term = self.term(t).expect("live operand");
                for c in term.cs.iter().rev() {
                    if !visited.contains(c) {
                        stack.push((false, *c));
                    }
                }
            }
        }
        order
    }

    /// The number of ciphertext-ciphertext multiplications on the longest path to each term.
    pub fn mul_depths(&self) -> FxHashMap<TermId, usize> {
        let mut depths = FxHashMap::default();
        for t in self.get_top_sorted_terms() {
            let term = self.term(t).expect("live");
            let below = term.cs.iter().map(|c| depths[c]).max().unwrap_or(0);
            let d = if self.is_ctxt_ctxt_mul(term) {
                below + 1
            } else {
                below
            };
            depths.insert(t, d);
        }
        depths
    }

    /// Is `term` a multiplication of two ciphertexts (or the square of one)?
    pub fn is_ctxt_ctxt_mul(&self, term: &Term) -> bool {
        let cipher = |c: &TermId| self.term(*c).map_or(false, |c| c.is_cipher());
        match term.op {
            OpCode::Mul => term.cs.iter().all(cipher),
            OpCode::Square => term.cs.iter().all(cipher),
            _ => false,
        }
    }
}
