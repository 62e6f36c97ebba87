//! # hecirc
//!
//! An optimizing compiler for circuits evaluated under homomorphic encryption.
//!
//! Circuits are term graphs over vectors of integers ([ir::term::Func]). They are simplified by
//! rewriting ([ir::opt::trs]) or by an external equality-saturation optimizer
//! ([ir::opt::eqsat]), and then prepared for code generation: rotation keys are selected
//! ([ir::opt::rotkeys]) and relinearizations placed ([ir::opt::relin]).
//! A [session::Session] ties these together.

#![warn(missing_docs)]

pub mod cfg;
pub mod circuits;
pub mod error;
pub mod ir;
pub mod session;
