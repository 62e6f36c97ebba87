//! Errors reported by compilation sessions

use thiserror::Error;

use crate::ir::opt::rotkeys::RotationKeyError;
use crate::ir::term::eval::EvalError;
use crate::ir::term::text::TextError;
use crate::ir::term::TermError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// An error that aborts the compilation of a function
pub enum Error {
    #[error(transparent)]
    /// Misuse of the term graph
    Term(#[from] TermError),
    #[error(transparent)]
    /// A malformed expression
    Text(#[from] TextError),
    #[error(transparent)]
    /// Evaluation failed
    Eval(#[from] EvalError),
    #[error(transparent)]
    /// The rotation-key budget cannot be met
    RotationKeys(#[from] RotationKeyError),
    #[error("a function named '{0}' already exists")]
    /// Function names are unique within a session
    DuplicateFunc(String),
    #[error("no function named '{0}'")]
    /// Unknown function
    NoSuchFunc(String),
    #[error("no active function")]
    /// No function has been created or selected
    NoActiveFunc,
    #[error("unknown ruleset '{0}'")]
    /// The ruleset selector names no shipped ruleset
    UnknownRuleset(String),
}

/// A result with an [Error]
pub type Result<T> = std::result::Result<T, Error>;
