// Expression Engine Module
// Constrained expression language behind `%eval` and `%{...}`

pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

pub use evaluator::{EvalError, Evaluator, ExpressionEngine};
pub use functions::BuiltinFunctions;
pub use lexer::{has_inline, split_segments, LexError, Lexer, Segment, Token};
pub use parser::{BinaryOp, Expr, ExprParser, ParseExprError, Reference, ReferencePart, UnaryOp};
pub use value::{loose_eq, number, ValueExt};

use crate::document::Document;

/// Pluggable evaluation capability for `%eval` markers and `%{...}` substitutions.
///
/// Expression evaluation is off unless the host installs an implementation.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, document: &Document) -> Result<Document, EvalError>;
}
