//! Equality-saturation bridge
//!
//! Output expressions are printed in prefix form, simplified by an [Oracle], parsed back, and
//! spliced in place of the originals. In windowed mode, only subtrees below a depth bound are
//! sent, one request each, which keeps every request small.
//!
//! An oracle failure is never fatal: the affected expression (or subtree) is kept as it was.
//! A malformed answer is an error, and leaves the function unchanged.

pub mod oracle;

use crate::ir::term::text::{build_term, build_term_with, parse_tok_tree, Symbols, TextError};
use crate::ir::term::{Func, TermError, TermId};

use log::{debug, warn};

pub use oracle::{IdentityOracle, Oracle, OracleError, OracleParams, ProcessOracle};

/// What a call to [equality_saturation] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EqsatStats {
    /// Requests sent to the oracle
    pub requests: usize,
    /// Requests that failed
    pub failures: usize,
    /// Outputs whose term changed
    pub replaced: usize,
}

/// Parse `text` into terms of `f`.
fn parse_answer(f: &mut Func, text: &str) -> Result<TermId, TextError> {
    let tree = parse_tok_tree(text)?;
    let mut symbols = Symbols::of(f)?;
    build_term(f, &mut symbols, &tree)
}

/// One label for each output term, ordered by label.
fn output_labels(f: &Func) -> Vec<String> {
    f.data_flow()
        .output_terms()
        .into_iter()
        .filter_map(|t| {
            f.data_flow().outputs_info()[&t]
                .labels
                .iter()
                .next()
                .cloned()
        })
        .collect()
}

/// Replace the output labelled `label` with `new`. Returns whether the term changed.
fn splice(f: &mut Func, label: &str, new: TermId) -> Result<bool, TermError> {
    let old = f
        .data_flow()
        .output_by_label(label)
        .ok_or_else(|| TermError::NoSuchOutput(label.to_owned()))?;
    f.replace_term_with(old, new)?;
    Ok(old != new)
}

fn batch(
    f: &mut Func,
    oracle: &mut dyn Oracle,
    params: &OracleParams,
    stats: &mut EqsatStats,
) -> Result<(), TextError> {
    let labels = output_labels(f);
    if labels.is_empty() {
        return Ok(());
    }
    let exprs: Vec<String> = labels
        .iter()
        .filter_map(|l| f.data_flow().output_by_label(l))
        .map(|t| f.expr_str(t))
        .collect();
    stats.requests += 1;
    let answers = match oracle.optimize(&exprs, params) {
        Ok(answers) if answers.len() == exprs.len() => answers,
        Ok(answers) => {
            stats.failures += 1;
            let e = OracleError::ResponseMismatch {
                expected: exprs.len(),
                found: answers.len(),
            };
            warn!("Equality saturation failed, keeping '{}': {}", f.name(), e);
            return Ok(());
        }
        Err(e) => {
            stats.failures += 1;
            warn!("Equality saturation failed, keeping '{}': {}", f.name(), e);
            return Ok(());
        }
    };
    for (label, answer) in labels.iter().zip(&answers) {
        let new = parse_answer(f, answer)?;
        if splice(f, label, new)? {
            stats.replaced += 1;
        }
    }
    Ok(())
}

/// Simplify a single expression.
fn ask(
    oracle: &mut dyn Oracle,
    expr: String,
    params: &OracleParams,
) -> Result<String, OracleError> {
    let mut answers = oracle.optimize(&[expr], params)?;
    match answers.len() {
        1 => Ok(answers.remove(0)),
        found => Err(OracleError::ResponseMismatch { expected: 1, found }),
    }
}

fn windowed(
    f: &mut Func,
    oracle: &mut dyn Oracle,
    params: &OracleParams,
    window: usize,
    stats: &mut EqsatStats,
) -> Result<(), TextError> {
    for label in output_labels(f) {
        let t = match f.data_flow().output_by_label(&label) {
            Some(t) => t,
            None => continue,
        };
        let text = f.expr_str(t);
        let tree = parse_tok_tree(&text)?;
        let mut symbols = Symbols::of(f)?;
        let new = build_term_with(f, &mut symbols, &tree, &mut |f, sub, depth| {
            if depth < window {
                return Ok(None);
            }
            stats.requests += 1;
            match ask(oracle, sub.to_string(), params) {
                Ok(answer) => parse_answer(f, &answer).map(Some),
                Err(e) => {
                    stats.failures += 1;
                    warn!(
                        "Equality saturation failed, keeping a subterm of '{}': {}",
                        label, e
                    );
                    Ok(None)
                }
            }
        })?;
        if splice(f, &label, new)? {
            stats.replaced += 1;
        }
    }
    Ok(())
}

/// Simplify the outputs of `f` with `oracle`.
///
/// With `window == 0` all outputs go in one request. Otherwise every subtree at depth `window`
/// of an output goes in its own request, and the levels above it are rebuilt as they were.
/// On error, `f` is restored.
pub fn equality_saturation(
    f: &mut Func,
    oracle: &mut dyn Oracle,
    axiomatic: bool,
    window: usize,
) -> Result<EqsatStats, TextError> {
    let params = OracleParams {
        slot_count: f.slot_count(),
        axiomatic,
    };
    debug!(
        "Equality saturation on '{}' (window {}): {} terms",
        f.name(),
        window,
        f.term_count()
    );
    let snapshot = f.clone();
    let mut stats = EqsatStats::default();
    let result = if window == 0 {
        batch(f, oracle, &params, &mut stats)
    } else {
        windowed(f, oracle, &params, window, &mut stats)
    };
    if let Err(e) = result {
        *f = snapshot;
        return Err(e);
    }
    debug!(
        "Equality saturation on '{}': {:?}, {} terms",
        f.name(),
        stats,
        f.term_count()
    );
    Ok(stats)
}
