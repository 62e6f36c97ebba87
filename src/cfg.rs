//! hecirc configuration
//!
//! A [Cfg] is built from the command-line/environment options [HeOpt] and owned by a
//! [Session](crate::session::Session). There is no process-wide configuration.

use crate::ir::opt::eqsat::ProcessOracle;
use crate::ir::opt::trs::{rulesets, Ruleset};
use crate::ir::term::InsertOpts;

use std::convert::From;
use std::default::Default;
use std::time::Duration;

/// Re-export our clap version
pub use hecirc_opt::clap;
/// Re-export our clap [clap::Args]
pub use hecirc_opt::HeOpt;
use hecirc_opt::RulesetChoice;

/// A hecirc configuration. Contructible [From::from] [HeOpt].
#[derive(Clone, Debug)]
pub struct Cfg {
    opt: HeOpt,
    insert_opts: InsertOpts,
}

impl From<HeOpt> for Cfg {
    fn from(opt: HeOpt) -> Self {
        let insert_opts = InsertOpts {
            cse: opt.ir.cse,
            order_operands: opt.ir.order_operands,
            const_folding: opt.ir.const_folding,
        };
        Self { opt, insert_opts }
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Self::from(HeOpt::default())
    }
}

/// Used to expose all fields of [HeOpt].
impl std::ops::Deref for Cfg {
    type Target = HeOpt;

    fn deref(&self) -> &Self::Target {
        &self.opt
    }
}

/// Additional functionality
impl Cfg {
    /// The toggles new functions insert terms with
    pub fn insert_opts(&self) -> InsertOpts {
        self.insert_opts
    }

    /// Change the toggles for functions created from now on
    pub fn set_insert_opts(&mut self, opts: InsertOpts) {
        self.insert_opts = opts;
    }

    /// The main ruleset
    pub fn ruleset(&self) -> Ruleset {
        match self.opt.trs.ruleset {
            RulesetChoice::Depth => rulesets::depth(),
            RulesetChoice::OpsCost => rulesets::ops_cost(),
            RulesetChoice::Joined => rulesets::joined(),
        }
    }

    /// The configured external optimizer
    pub fn process_oracle(&self) -> ProcessOracle {
        ProcessOracle::new(
            &self.opt.eqsat.command,
            Duration::from_secs(self.opt.eqsat.timeout_secs),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hecirc_opt::IrOpt;

    #[test]
    fn insert_opts_follow_ir_options() {
        assert_eq!(Cfg::default().insert_opts(), InsertOpts::default());
        let cfg = Cfg::from(HeOpt {
            ir: IrOpt {
                cse: true,
                order_operands: false,
                const_folding: true,
            },
            ..HeOpt::default()
        });
        assert!(cfg.insert_opts().cse && cfg.insert_opts().const_folding);
        assert!(!cfg.insert_opts().order_operands);
        assert_eq!(cfg.ruleset().name(), "joined");
        assert_eq!(cfg.rot_keys.threshold, 29);
    }
}
