//! Optimizations
pub mod cse;
pub mod eqsat;
pub mod relin;
pub mod rotkeys;
pub mod trs;

use crate::ir::term::{Func, TermError};

use hecirc_opt::RewriteHeuristic;
use log::debug;

use trs::Ruleset;

#[derive(Clone, Debug)]
/// A rewriting pass
pub enum Opt {
    /// Rewrite with a ruleset until a fixpoint, or until the pass limit
    Rewrite {
        /// The rules
        ruleset: Ruleset,
        /// The traversal
        heuristic: RewriteHeuristic,
        /// The pass limit
        max_passes: usize,
    },
    /// Merge terms that agree up to the order of commutative operands
    CseCommut,
    /// Delete terms nothing uses
    CollectGarbage,
}

/// Run optimizations on `f`, in this order.
pub fn opt<I: IntoIterator<Item = Opt>>(f: &mut Func, optimizations: I) -> Result<(), TermError> {
    for i in optimizations {
        debug!("Applying: {:?}", i);
        match &i {
            Opt::Rewrite {
                ruleset,
                heuristic,
                max_passes,
            } => {
                trs::rewrite(f, ruleset, *heuristic, *max_passes)?;
            }
            Opt::CseCommut => {
                cse::cse_commut(f)?;
            }
            Opt::CollectGarbage => {
                f.collect_garbage();
            }
        }
        debug!("After {:?}: {} terms", i, f.term_count());
    }
    Ok(())
}
