//! Term rewriting
//!
//! A [Ruleset] is an ordered list of [Rule]s. [rewrite] sweeps the term graph, replacing each term
//! with the right-hand side of the first rule that matches it, until a sweep changes nothing.

pub mod pattern;
pub mod rulesets;

use crate::ir::term::{Func, TermError, TermId};

use hecirc_opt::RewriteHeuristic;
use log::{debug, trace, warn};

use std::fmt;

use pattern::{build, match_all, Pat, Subst};

/// Matches a term, binding variables.
#[derive(Clone)]
pub enum Lhs {
    /// A pattern, matched up to commutativity
    Pat(Pat),
    /// A matcher for shapes patterns cannot express
    Custom(fn(&Func, TermId) -> Option<Subst>),
}

/// Produces the replacement of a matched term.
#[derive(Clone)]
pub enum Rhs {
    /// A pattern over the matched variables
    Pat(Pat),
    /// A builder
    Gen(fn(&mut Func, &Subst) -> Result<TermId, TermError>),
}

/// Decides whether a match should be rewritten.
pub type Guard = fn(&Func, TermId, &Subst) -> bool;

/// A rewrite rule.
#[derive(Clone)]
pub struct Rule {
    /// Name, for logs
    pub name: &'static str,
    /// What to match
    pub lhs: Lhs,
    /// What to replace it with
    pub rhs: Rhs,
    /// Only rewrite matches it accepts
    pub guard: Option<Guard>,
}

impl Rule {
    /// An unguarded pattern rule.
    pub fn new(name: &'static str, lhs: Pat, rhs: Pat) -> Self {
        Rule {
            name,
            lhs: Lhs::Pat(lhs),
            rhs: Rhs::Pat(rhs),
            guard: None,
        }
    }

    /// A pattern rule with a generated right-hand side.
    pub fn gen(
        name: &'static str,
        lhs: Pat,
        rhs: fn(&mut Func, &Subst) -> Result<TermId, TermError>,
    ) -> Self {
        Rule {
            name,
            lhs: Lhs::Pat(lhs),
            rhs: Rhs::Gen(rhs),
            guard: None,
        }
    }

    /// Only rewrite when `guard` holds.
    pub fn when(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// The first accepted match of this rule on `t`.
    fn find_match(&self, f: &Func, t: TermId) -> Option<Subst> {
        match &self.lhs {
            Lhs::Pat(p) => match_all(f, p, t, Subst::default())
                .into_iter()
                .find(|s| self.guard.map_or(true, |g| g(f, t, s))),
            Lhs::Custom(m) => m(f, t).filter(|s| self.guard.map_or(true, |g| g(f, t, s))),
        }
    }

    fn build(&self, f: &mut Func, s: &Subst) -> Result<TermId, TermError> {
        match &self.rhs {
            Rhs::Pat(p) => build(f, p, s),
            Rhs::Gen(g) => g(f, s),
        }
    }
}

/// A named, ordered list of rules. When several rules match a term, the first one wins.
#[derive(Clone)]
pub struct Ruleset {
    name: &'static str,
    rules: Vec<Rule>,
}

impl Ruleset {
    /// A ruleset.
    pub fn new(name: &'static str, rules: Vec<Rule>) -> Self {
        Ruleset { name, rules }
    }

    /// The ruleset's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The rules, in priority order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up a shipped ruleset: `depth`, `ops_cost`, `joined`, `log2_reduct`, or
    /// `SumVec_reduct`.
    pub fn by_name(name: &str) -> Option<Ruleset> {
        Some(match name {
            "depth" => rulesets::depth(),
            "ops_cost" => rulesets::ops_cost(),
            "joined" => rulesets::joined(),
            "log2_reduct" => rulesets::log2_reduct(),
            "SumVec_reduct" => rulesets::sumvec_reduct(),
            _ => return None,
        })
    }

    /// Rewrite `t` with the first rule that changes it. Returns the replacement.
    fn rewrite_term(&self, f: &mut Func, t: TermId) -> Result<Option<TermId>, TermError> {
        for rule in &self.rules {
            if !f.contains(t) {
                return Ok(None);
            }
            if let Some(s) = rule.find_match(f, t) {
                let new = rule.build(f, &s)?;
                if new != t {
                    trace!("{}: {} -> {}", rule.name, t, new);
                    f.replace_term_with(t, new)?;
                    return Ok(Some(new));
                }
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({} rules)", self.name, self.rules.len())
    }
}

/// What a call to [rewrite] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Rules applied
    pub rewrites: usize,
    /// Sweeps over the graph, including the final one that changed nothing
    pub passes: usize,
    /// Did the last sweep change nothing?
    pub fixpoint: bool,
}

// Rewrites of one term in a single top-down visit.
const GREEDY_LIMIT: usize = 64;

/// Rewrite `f` with `ruleset` until no rule applies, or `max_passes` sweeps have run.
///
/// Bottom-up sweeps visit operands before consumers and rewrite each term at most once per
/// sweep. Top-down sweeps visit consumers first and keep rewriting a term (and its replacements)
/// while some rule applies.
pub fn rewrite(
    f: &mut Func,
    ruleset: &Ruleset,
    heuristic: RewriteHeuristic,
    max_passes: usize,
) -> Result<RewriteStats, TermError> {
    debug!(
        "Rewriting '{}' with {} ({:?}): {} terms",
        f.name(),
        ruleset.name,
        heuristic,
        f.term_count()
    );
    let mut stats = RewriteStats::default();
    while stats.passes < max_passes {
        stats.passes += 1;
        let mut order = f.get_top_sorted_terms();
        if heuristic == RewriteHeuristic::TopDown {
            order.reverse();
        }
        let mut changed = 0;
        for t in order {
            if !f.contains(t) || !f.get(t)?.is_operation() {
                continue;
            }
            let mut cur = t;
            let mut greedy = 0;
            while let Some(new) = ruleset.rewrite_term(f, cur)? {
                changed += 1;
                greedy += 1;
                cur = new;
                if heuristic == RewriteHeuristic::BottomUp || greedy >= GREEDY_LIMIT {
                    break;
                }
            }
        }
        f.collect_garbage();
        stats.rewrites += changed;
        trace!("pass {}: {} rewrites", stats.passes, changed);
        if changed == 0 {
            stats.fixpoint = true;
            break;
        }
    }
    if !stats.fixpoint {
        warn!(
            "{} did not reach a fixpoint on '{}' within {} passes",
            ruleset.name,
            f.name(),
            max_passes
        );
    }
    debug!(
        "Rewrote '{}' with {}: {} rewrites in {} passes, {} terms",
        f.name(),
        ruleset.name,
        stats.rewrites,
        stats.passes,
        f.term_count()
    );
    Ok(stats)
}
