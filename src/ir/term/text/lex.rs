//! Expression lexer

use logos::{self, Logos};

#[derive(Logos, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token {
    #[token("(")]
    Open,
    #[token(")")]
    Close,

    // Literals
    #[regex(r"-?[0-9]+", priority = 2)]
    Int,

    // Operators and symbols
    #[regex(r"[^()0-9; \t\r\n\f][^(); \t\r\n\f]*")]
    Ident,

    #[error]
    // Skip space
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Error,
}
