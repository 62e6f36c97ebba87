//! Parsing of prefix expressions into terms
//!
//! The grammar is the one [crate::ir::term::printer] produces:
//!
//! * an expression is a leaf or a parenthesized list `( op e1 .. en )`
//! * leaves are input labels, constant labels (`c<index>`), and integer literals
//! * operators are `+`, `-` (binary, or unary negation), `*`, `square`, `relin`,
//!   `<<` (followed by an operand and an integer step), and `SumVec` (followed by an operand and
//!   an integer window)
//!
//! Parsing happens in two phases. First the text is lexed and grouped into a [TokTree]. Then the
//! tree is lowered into the terms of a [Func], resolving leaves against a [Symbols] table.

use super::printer::const_label;
use super::{Func, OpCode, TermError, TermId};

use fxhash::FxHashMap;
use logos::Logos;
use thiserror::Error;

use std::fmt::{self, Display, Formatter};

pub mod lex;

use lex::Token;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// A malformed expression
pub enum TextError {
    #[error("unbalanced parenthesis")]
    /// A `)` without a matching `(` or the reverse
    Unbalanced,
    #[error("unknown operator '{0}'")]
    /// The head of a list is not an operator
    UnknownOperator(String),
    #[error("'{0}' names more than one term")]
    /// Two distinct leaves print as the same symbol
    DuplicateSymbol(String),
    #[error("unknown symbol '{0}'")]
    /// A leaf that is neither a label nor a literal
    UnknownSymbol(String),
    #[error("bad parameter '{0}'")]
    /// A rotation step or window that is not a suitable integer
    BadParameter(String),
    #[error("operator '{op}' cannot take {found} arguments")]
    /// An operator applied to the wrong number of arguments
    Arity {
        /// The operator
        op: String,
        /// How many arguments it got
        found: usize,
    },
    #[error("empty list")]
    /// `( )`
    EmptyList,
    #[error("empty input")]
    /// No expression at all
    Empty,
    #[error("trailing text after expression: '{0}'")]
    /// More than one expression
    Trailing(String),
    #[error("cannot lex '{0}'")]
    /// Not a token
    Lex(String),
    #[error(transparent)]
    /// The expression is well-formed but does not fit the function
    Term(#[from] TermError),
}

/// A token with its text.
pub type Lexeme<'src> = (Token, &'src str);

#[derive(Clone, Debug, PartialEq, Eq)]
/// A parenthesized tree of tokens.
pub enum TokTree<'src> {
    /// A single token
    Leaf(Token, &'src str),
    /// A parenthesized list
    List(Vec<TokTree<'src>>),
}

use TokTree::{Leaf, List};

impl<'src> Display for TokTree<'src> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Leaf(_, s) => write!(f, "{}", s),
            List(items) => {
                write!(f, "(")?;
                for i in items {
                    write!(f, " {}", i)?;
                }
                write!(f, " )")
            }
        }
    }
}

impl<'src> TokTree<'src> {
    /// The height of the tree: 0 for leaves.
    pub fn height(&self) -> usize {
        match self {
            Leaf(..) => 0,
            List(items) => 1 + items.iter().map(TokTree::height).max().unwrap_or(0),
        }
    }
}

/// Split `src` into lexemes.
pub fn lex(src: &str) -> Result<Vec<Lexeme<'_>>, TextError> {
    let mut lexer = Token::lexer(src);
    let mut out = Vec::new();
    while let Some(tok) = lexer.next() {
        if tok == Token::Error {
            return Err(TextError::Lex(lexer.slice().to_owned()));
        }
        out.push((tok, lexer.slice()));
    }
    Ok(out)
}

/// Group the first expression of `lexemes` into a tree; also return the lexemes after it.
pub fn tok_tree<'a, 'src>(
    lexemes: &'a [Lexeme<'src>],
) -> Result<(TokTree<'src>, &'a [Lexeme<'src>]), TextError> {
    // Open lists, innermost last.
    let mut stack: Vec<Vec<TokTree<'src>>> = Vec::new();
    let mut rest = lexemes;
    loop {
        let ((tok, text), tail) = match rest.split_first() {
            Some(x) => x,
            None if stack.is_empty() => return Err(TextError::Empty),
            None => return Err(TextError::Unbalanced),
        };
        rest = tail;
        let done = match tok {
            Token::Open => {
                stack.push(Vec::new());
                None
            }
            Token::Close => {
                let items = stack.pop().ok_or(TextError::Unbalanced)?;
                Some(List(items))
            }
            _ => Some(Leaf(*tok, *text)),
        };
        if let Some(tree) = done {
            match stack.last_mut() {
                Some(parent) => parent.push(tree),
                None => return Ok((tree, rest)),
            }
        }
    }
}

/// Parse `src`, which must hold exactly one expression, into a tree.
pub fn parse_tok_tree(src: &str) -> Result<TokTree<'_>, TextError> {
    let lexemes = lex(src)?;
    let (tree, rest) = tok_tree(&lexemes)?;
    if let Some((_, t)) = rest.first() {
        return Err(TextError::Trailing(t.to_string()));
    }
    Ok(tree)
}

/// Decode the operator of a list: the operation and its operand subtrees.
pub fn decode_op<'t, 'src>(
    items: &'t [TokTree<'src>],
) -> Result<(OpCode, Vec<&'t TokTree<'src>>), TextError> {
    Ok(match items {
        [Leaf(Token::Ident, "+"), a, b] => (OpCode::Add, vec![a, b]),
        [Leaf(Token::Ident, "-"), a, b] => (OpCode::Sub, vec![a, b]),
        [Leaf(Token::Ident, "-"), a] => (OpCode::Negate, vec![a]),
        [Leaf(Token::Ident, "*"), a, b] => (OpCode::Mul, vec![a, b]),
        [Leaf(Token::Ident, "square"), a] => (OpCode::Square, vec![a]),
        [Leaf(Token::Ident, "relin"), a] => (OpCode::Relin, vec![a]),
        [Leaf(Token::Ident, "<<"), a, Leaf(Token::Int, s)] => {
            let s = s
                .parse::<i64>()
                .map_err(|_| TextError::BadParameter(s.to_string()))?;
            (OpCode::Rotate(s), vec![a])
        }
        [Leaf(Token::Ident, "SumVec"), a, Leaf(Token::Int, w)] => {
            let w = w
                .parse::<usize>()
                .map_err(|_| TextError::BadParameter(w.to_string()))?;
            (OpCode::SumVec(w), vec![a])
        }
        [Leaf(Token::Ident, "<<" | "SumVec"), _, p] => {
            return Err(TextError::BadParameter(p.to_string()))
        }
        [Leaf(Token::Ident, op @ ("+" | "-" | "*" | "square" | "relin" | "<<" | "SumVec")), ..] => {
            return Err(TextError::Arity {
                op: op.to_string(),
                found: items.len() - 1,
            })
        }
        [head, ..] => return Err(TextError::UnknownOperator(head.to_string())),
        [] => return Err(TextError::EmptyList),
    })
}

/// The leaves an expression may refer to.
pub struct Symbols {
    table: FxHashMap<String, TermId>,
}

impl Symbols {
    /// The input labels and constant labels of `func`.
    ///
    /// Fails when two leaves that are not interchangeable print alike. Equal scalar constants
    /// (which may coexist without CSE) are interchangeable; the oldest is used.
    pub fn of(func: &Func) -> Result<Self, TextError> {
        let mut table: FxHashMap<String, TermId> = FxHashMap::default();
        let df = func.data_flow();
        for (t, info) in df.inputs_info() {
            if table.insert(info.label.clone(), *t).is_some() {
                return Err(TextError::DuplicateSymbol(info.label.clone()));
            }
        }
        for t in df.constants_info().keys() {
            let label = match const_label(func, *t) {
                Some(label) => label,
                None => continue,
            };
            match table.get(&label).copied() {
                None => {
                    table.insert(label, *t);
                }
                Some(e) if df.is_const(e) && df.const_value(e) == df.const_value(*t) => {
                    if *t < e {
                        table.insert(label, *t);
                    }
                }
                Some(_) => return Err(TextError::DuplicateSymbol(label)),
            }
        }
        Ok(Symbols { table })
    }

    /// Resolve a leaf, creating a scalar constant for a new integer literal.
    pub fn resolve(&mut self, func: &mut Func, tok: Token, text: &str) -> Result<TermId, TextError> {
        if let Some(t) = self.table.get(text) {
            if func.contains(*t) {
                return Ok(*t);
            }
        }
        match tok {
            Token::Int => {
                let v = text
                    .parse::<i64>()
                    .map_err(|_| TextError::BadParameter(text.to_owned()))?;
                let t = func.add_scalar_const(v)?;
                // The stored value may differ from the literal after reduction.
                self.table.insert(text.to_owned(), t);
                Ok(t)
            }
            _ => Err(TextError::UnknownSymbol(text.to_owned())),
        }
    }
}

/// Lower `tree` into terms of `func`, returning the root.
pub fn build_term(
    func: &mut Func,
    symbols: &mut Symbols,
    tree: &TokTree<'_>,
) -> Result<TermId, TextError> {
    build_term_with(func, symbols, tree, &mut |_, _, _| Ok(None))
}

/// Lower `tree` into terms of `func`, offering every list to `hook` first.
///
/// `hook` receives the function, the list, and its depth below the root. When it returns a term,
/// that term stands for the list and its children are not visited.
pub fn build_term_with<F>(
    func: &mut Func,
    symbols: &mut Symbols,
    tree: &TokTree<'_>,
    hook: &mut F,
) -> Result<TermId, TextError>
where
    F: FnMut(&mut Func, &TokTree<'_>, usize) -> Result<Option<TermId>, TextError>,
{
    build_at(func, symbols, tree, 0, hook)
}

fn build_at<F>(
    func: &mut Func,
    symbols: &mut Symbols,
    tree: &TokTree<'_>,
    depth: usize,
    hook: &mut F,
) -> Result<TermId, TextError>
where
    F: FnMut(&mut Func, &TokTree<'_>, usize) -> Result<Option<TermId>, TextError>,
{
    match tree {
        Leaf(tok, text) => symbols.resolve(func, *tok, text),
        List(items) => {
            if let Some(t) = hook(func, tree, depth)? {
                return Ok(t);
            }
            let (op, args) = decode_op(items)?;
            let mut operands = Vec::with_capacity(args.len());
            for a in args {
                operands.push(build_at(func, symbols, a, depth + 1, hook)?);
            }
            Ok(func.insert_op_term(op, operands)?)
        }
    }
}

/// Parse `src` into terms of `func`, returning the root.
pub fn parse_expr(func: &mut Func, src: &str) -> Result<TermId, TextError> {
    let tree = parse_tok_tree(src)?;
    let mut symbols = Symbols::of(func)?;
    build_term(func, &mut symbols, &tree)
}
