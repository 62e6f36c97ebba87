//! Options for hecirc.
//!
//! ## Contents
//!
//! * A type for compiler options [HeOpt] containing fields for module options:
//!    * `ir`: [IrOpt]
//!    * `trs`: [TrsOpt]
//!    * `eqsat`: [EqsatOpt]
//!    * `rot_keys`: [RotKeysOpt]
//!    * `relin`: [RelinOpt]
//!    * all options types implement:
//!       * std's [Default]
//!       * clap's [Args]; all options are settable by
//!          * environmental variable (SHOUTY_SNEK_CASE), e.g., `"ROT_KEYS_THRESHOLD"`
//!          * long option (kebab-case), e.g., `"--rot-keys-threshold"`
//!       * these a guaranteed to agree (and we test this)
//!
//! ## Constructing custom options in a compiler driver
//!
//! We recommend that drivers construct custom options using [`clap`][clap].
//! Simply use our (rexported) version of clap in your driver ([crate::clap])
//! and include [HeOpt] in your [clap::Parser].
//!
//! ```rust
//! use hecirc_opt::{HeOpt, clap::Parser};
//!
//! #[derive(Parser, Debug)]
//! struct BinaryOpt {
//!     #[command(flatten)]
//!     pub he: HeOpt,
//! }
//!
//! fn main() {
//!     let opt = BinaryOpt::parse();
//! }
//! ```
//!
//! [clap]: https://crates.io/crates/clap

use clap::{ArgAction, Args, ValueEnum};

use std::default::Default;

/// Re-export our version of clap.
pub use clap;

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
/// Options that configure the compiler
pub struct HeOpt {
    /// Options for term insertion
    #[command(flatten)]
    pub ir: IrOpt,
    /// Options for the term-rewriting system
    #[command(flatten)]
    pub trs: TrsOpt,
    /// Options for the equality-saturation bridge
    #[command(flatten)]
    pub eqsat: EqsatOpt,
    /// Options for rotation-key selection
    #[command(flatten)]
    pub rot_keys: RotKeysOpt,
    /// Options for relinearization placement
    #[command(flatten)]
    pub relin: RelinOpt,
}

/// Options for term insertion. They apply when a term is inserted, never retroactively.
#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct IrOpt {
    /// Return the existing term when an identical operation is inserted
    #[arg(long = "ir-cse", env = "IR_CSE", action = ArgAction::Set, default_value = "false")]
    pub cse: bool,
    /// Sort the operands of commutative operations on insertion
    #[arg(
        long = "ir-order-operands",
        env = "IR_ORDER_OPERANDS",
        action = ArgAction::Set,
        default_value = "false"
    )]
    pub order_operands: bool,
    /// Fold operations over constants into a single constant
    #[arg(
        long = "ir-const-folding",
        env = "IR_CONST_FOLDING",
        action = ArgAction::Set,
        default_value = "false"
    )]
    pub const_folding: bool,
}

/// Options for the term-rewriting system
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TrsOpt {
    /// Which ruleset to run
    #[arg(long = "trs-ruleset", env = "TRS_RULESET", value_enum, default_value = "joined")]
    pub ruleset: RulesetChoice,
    /// How to traverse the term graph
    #[arg(
        long = "trs-heuristic",
        env = "TRS_HEURISTIC",
        value_enum,
        default_value = "bottom-up"
    )]
    pub heuristic: RewriteHeuristic,
    /// Rewrite windowed sums into logarithmic rotate-and-add trees afterwards
    #[arg(
        long = "trs-log2-reduct",
        env = "TRS_LOG2_REDUCT",
        action = ArgAction::Set,
        default_value = "false"
    )]
    pub log2_reduct: bool,
    /// Give up (with a warning) after this many sweeps without reaching a fixpoint
    #[arg(long = "trs-max-passes", env = "TRS_MAX_PASSES", default_value = "1000")]
    pub max_passes: usize,
}

impl Default for TrsOpt {
    fn default() -> Self {
        Self {
            ruleset: RulesetChoice::Joined,
            heuristic: RewriteHeuristic::BottomUp,
            log2_reduct: false,
            max_passes: 1000,
        }
    }
}

#[derive(ValueEnum, Debug, PartialEq, Eq, Clone, Copy)]
/// Which ruleset the main rewriting pass runs
pub enum RulesetChoice {
    /// Minimize multiplicative depth
    Depth,
    /// Minimize the weighted operation count
    OpsCost,
    /// Depth rules first, then operation-count rules
    Joined,
}

impl Default for RulesetChoice {
    fn default() -> Self {
        RulesetChoice::Joined
    }
}

#[derive(ValueEnum, Debug, PartialEq, Eq, Clone, Copy)]
/// Traversal order of the rewriting engine
pub enum RewriteHeuristic {
    /// Operands first
    BottomUp,
    /// Consumers first
    TopDown,
}

impl Default for RewriteHeuristic {
    fn default() -> Self {
        RewriteHeuristic::BottomUp
    }
}

/// Options for the equality-saturation bridge
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct EqsatOpt {
    /// The external optimizer to run. Empty means no optimizer is available.
    #[arg(long = "eqsat-command", env = "EQSAT_COMMAND", default_value = "")]
    pub command: String,
    /// Expression depth after which subtrees are optimized separately (0: whole expressions)
    #[arg(long = "eqsat-window", env = "EQSAT_WINDOW", default_value = "0")]
    pub window: usize,
    /// Let the optimizer use the axiomatic ruleset
    #[arg(
        long = "eqsat-axiomatic",
        env = "EQSAT_AXIOMATIC",
        action = ArgAction::Set,
        default_value = "false"
    )]
    pub axiomatic: bool,
    /// Seconds to wait for the optimizer before keeping the unoptimized expression
    #[arg(long = "eqsat-timeout-secs", env = "EQSAT_TIMEOUT_SECS", default_value = "300")]
    pub timeout_secs: u64,
    /// Check the optimized function against the original on random inputs
    #[arg(
        long = "eqsat-verify",
        env = "EQSAT_VERIFY",
        action = ArgAction::Set,
        default_value = "true"
    )]
    pub verify: bool,
    /// How many random input assignments the check uses
    #[arg(
        long = "eqsat-verify-samples",
        env = "EQSAT_VERIFY_SAMPLES",
        default_value = "4"
    )]
    pub verify_samples: usize,
}

impl Default for EqsatOpt {
    fn default() -> Self {
        Self {
            command: String::new(),
            window: 0,
            axiomatic: false,
            timeout_secs: 300,
            verify: true,
            verify_samples: 4,
        }
    }
}

/// Options for rotation-key selection
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RotKeysOpt {
    /// Maximum number of distinct rotation keys
    #[arg(long = "rot-keys-threshold", env = "ROT_KEYS_THRESHOLD", default_value = "29")]
    pub threshold: usize,
}

impl Default for RotKeysOpt {
    fn default() -> Self {
        Self { threshold: 29 }
    }
}

/// Options for relinearization placement
#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct RelinOpt {
    /// Where relinearizations go
    #[arg(long = "relin-policy", env = "RELIN_POLICY", value_enum, default_value = "lazy")]
    pub policy: RelinPolicy,
}

#[derive(ValueEnum, Debug, PartialEq, Eq, Clone, Copy)]
/// Where relinearizations go
pub enum RelinPolicy {
    /// Only where a higher-degree ciphertext cannot be consumed
    Lazy,
    /// After every ciphertext-ciphertext multiplication
    Eager,
}

impl Default for RelinPolicy {
    fn default() -> Self {
        RelinPolicy::Lazy
    }
}
