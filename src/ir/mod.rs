//! The hecirc intermediate representation and its optimizations

pub mod opt;
pub mod term;
