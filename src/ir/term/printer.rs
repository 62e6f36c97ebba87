//! Prefix-notation printing of terms.
//!
//! The format is the one the equality-saturation bridge exchanges with its optimizer:
//! whitespace-delimited and fully parenthesized, e.g. `( + ( << x 1 ) 3 )`.

use super::{Func, OpCode, TermId};

use fxhash::FxHashMap;
use itertools::Itertools;

/// The symbol a constant prints as: its literal when all slots agree, otherwise `c<index>`.
pub fn const_label(func: &Func, t: TermId) -> Option<String> {
    let info = func.data_flow().constants_info().get(&t)?;
    Some(match info.scalar() {
        Some(v) => v.to_string(),
        None => format!("c{}", t.index()),
    })
}

/// Builds (and memoizes) the prefix expression of terms.
pub struct ExprPrinter<'f> {
    func: &'f Func,
    exprs: FxHashMap<TermId, String>,
}

impl<'f> ExprPrinter<'f> {
    /// A printer for `func`.
    pub fn new(func: &'f Func) -> Self {
        Self {
            func,
            exprs: FxHashMap::default(),
        }
    }

    /// The expression of `t`.
    pub fn expr(&mut self, t: TermId) -> String {
        // (children pushed, term)
        let mut stack = vec![(false, t)];
        while let Some((children_pushed, node)) = stack.pop() {
            if self.exprs.contains_key(&node) {
                continue;
            }
            let term = self.func.term(node).expect("printing a dead term");
            if children_pushed || !term.is_operation() {
                let s = self.render(node);
                self.exprs.insert(node, s);
            } else {
                stack.push((true, node));
                stack.extend(term.cs().iter().map(|c| (false, *c)));
            }
        }
        self.exprs[&t].clone()
    }

    fn render(&self, t: TermId) -> String {
        let df = self.func.data_flow();
        if let Some(info) = df.inputs_info().get(&t) {
            return info.label.clone();
        }
        if let Some(label) = const_label(self.func, t) {
            return label;
        }
        let term = self.func.term(t).expect("live");
        let cs = term.cs().iter().map(|c| &self.exprs[c]).join(" ");
        match term.op() {
            OpCode::Rotate(s) => format!("( << {} {} )", cs, s),
            OpCode::SumVec(w) => format!("( SumVec {} {} )", cs, w),
            op => format!("( {} {} )", op, cs),
        }
    }
}

impl Func {
    /// The prefix expression of `t`.
    pub fn expr_str(&self, t: TermId) -> String {
        ExprPrinter::new(self).expr(t)
    }
}
