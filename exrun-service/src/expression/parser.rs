// Expression Parser
// Parses tokens into an AST; also decodes literal-only argument lists for unit descriptors

use crate::document::Document;
use crate::expression::lexer::{LexError, Lexer, Token};
use crate::expression::value::number;

use serde_json::{Map, Value};
use std::fmt;

/// Abstract Syntax Tree node for expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    String(String),

    /// Document reference: solver.name, limits['timeout'], runs[0]
    Reference(Reference),

    /// Function call: eq(a, b), max(x, 3)
    FunctionCall { name: String, args: Vec<Expr> },

    /// Index access on a computed value: split(s, ',')[1]
    Index { object: Box<Expr>, index: Box<Expr> },

    /// Member access on a computed value
    Member { object: Box<Expr>, property: String },

    Unary { op: UnaryOp, expr: Box<Expr> },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// condition ? then : else
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    Array(Vec<Expr>),

    /// Object literal with keys in source order
    Object(Vec<(String, Expr)>),
}

/// Path into the document, starting at a top-level key
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub parts: Vec<ReferencePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReferencePart {
    Property(String),
    Index(Box<Expr>),
}

impl Reference {
    pub fn new(name: String) -> Self {
        Self {
            parts: vec![ReferencePart::Property(name)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not, // !
    Neg, // - (unary minus)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(symbol)
    }
}

/// Binary operator levels, lowest precedence first
const PRECEDENCE: [&[(Token, BinaryOp)]; 6] = [
    &[(Token::Or, BinaryOp::Or)],
    &[(Token::And, BinaryOp::And)],
    &[(Token::Eq, BinaryOp::Eq), (Token::Ne, BinaryOp::Ne)],
    &[
        (Token::Lt, BinaryOp::Lt),
        (Token::Le, BinaryOp::Le),
        (Token::Gt, BinaryOp::Gt),
        (Token::Ge, BinaryOp::Ge),
    ],
    &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
    &[
        (Token::Star, BinaryOp::Mul),
        (Token::Slash, BinaryOp::Div),
        (Token::Percent, BinaryOp::Mod),
    ],
];

/// Parser error
#[derive(Debug, Clone)]
pub struct ParseExprError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for ParseExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at token {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseExprError {}

impl From<LexError> for ParseExprError {
    fn from(err: LexError) -> Self {
        Self {
            message: err.message,
            position: err.position,
        }
    }
}

/// Recursive descent parser for document expressions
pub struct ExprParser {
    tokens: Vec<Token>,
    position: usize,
}

impl ExprParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse a single expression from a string
    pub fn parse_str(input: &str) -> Result<Expr, ParseExprError> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Self::new(tokens);
        let expr = parser.parse_ternary()?;
        parser.expect_end()?;
        Ok(expr)
    }

    /// Parse a comma separated argument list (without surrounding parentheses)
    pub fn parse_arguments(input: &str) -> Result<Vec<Expr>, ParseExprError> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Self::new(tokens);
        let args = parser.parse_list(&Token::Eof)?;
        parser.expect_end()?;
        Ok(args)
    }

    fn expect_end(&self) -> Result<(), ParseExprError> {
        if self.check(&Token::Eof) {
            Ok(())
        } else {
            Err(self.error(&format!("unexpected token: {}", self.peek())))
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseExprError> {
        let condition = self.parse_binary(0)?;

        if !self.check(&Token::Question) {
            return Ok(condition);
        }

        self.advance();
        let then_expr = self.parse_ternary()?;
        self.expect(&Token::Colon, "expected ':' in ternary expression")?;
        let else_expr = self.parse_ternary()?;

        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    /// Left-associative binary operators at `level` and above
    fn parse_binary(&mut self, level: usize) -> Result<Expr, ParseExprError> {
        let Some(operators) = PRECEDENCE.get(level) else {
            return self.parse_unary();
        };

        let mut left = self.parse_binary(level + 1)?;

        while let Some(op) = operators
            .iter()
            .find(|(token, _)| self.check(token))
            .map(|(_, op)| *op)
        {
            self.advance();
            let right = self.parse_binary(level + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseExprError> {
        let op = match self.peek() {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };

        self.advance();
        let expr = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseExprError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(&Token::Dot) {
                self.advance();
                let property = self.expect_identifier()?;
                expr = match expr {
                    Expr::Reference(mut reference) => {
                        reference.parts.push(ReferencePart::Property(property));
                        Expr::Reference(reference)
                    }
                    other => Expr::Member {
                        object: Box::new(other),
                        property,
                    },
                };
            } else if self.check(&Token::LBracket) {
                self.advance();
                let index = self.parse_ternary()?;
                self.expect(&Token::RBracket, "expected ']'")?;
                expr = match expr {
                    Expr::Reference(mut reference) => {
                        reference.parts.push(ReferencePart::Index(Box::new(index)));
                        Expr::Reference(reference)
                    }
                    other => Expr::Index {
                        object: Box::new(other),
                        index: Box::new(index),
                    },
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseExprError> {
        let token = self.advance().clone();
        match token {
            Token::Null => Ok(Expr::Null),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::String(s) => Ok(Expr::String(s)),
            Token::Identifier(name) if self.check(&Token::LParen) => {
                self.advance();
                let args = self.parse_list(&Token::RParen)?;
                self.expect(&Token::RParen, "expected ')'")?;
                Ok(Expr::FunctionCall { name, args })
            }
            Token::Identifier(name) => Ok(Expr::Reference(Reference::new(name))),
            Token::LParen => {
                let expr = self.parse_ternary()?;
                self.expect(&Token::RParen, "expected ')'")?;
                Ok(expr)
            }
            Token::LBracket => {
                let items = self.parse_list(&Token::RBracket)?;
                self.expect(&Token::RBracket, "expected ']'")?;
                Ok(Expr::Array(items))
            }
            Token::LBrace => {
                let pairs = self.parse_pairs()?;
                self.expect(&Token::RBrace, "expected '}'")?;
                Ok(Expr::Object(pairs))
            }
            other => Err(self.error(&format!("unexpected token: {}", other))),
        }
    }

    /// Comma separated expressions up to (not including) `close`; a trailing comma is allowed
    fn parse_list(&mut self, close: &Token) -> Result<Vec<Expr>, ParseExprError> {
        let mut items = Vec::new();

        while !self.check(close) {
            items.push(self.parse_ternary()?);
            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(items)
    }

    /// `key: value` pairs up to the closing brace
    fn parse_pairs(&mut self) -> Result<Vec<(String, Expr)>, ParseExprError> {
        let mut pairs = Vec::new();

        while !self.check(&Token::RBrace) {
            let key = match self.advance().clone() {
                Token::Identifier(s) | Token::String(s) => s,
                _ => return Err(self.error("expected object key")),
            };
            self.expect(&Token::Colon, "expected ':' after object key")?;
            pairs.push((key, self.parse_ternary()?));

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(pairs)
    }

    fn expect_identifier(&mut self) -> Result<String, ParseExprError> {
        match self.advance().clone() {
            Token::Identifier(name) => Ok(name),
            _ => Err(self.error("expected property name after '.'")),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> &Token {
        let token = self.tokens.get(self.position).unwrap_or(&Token::Eof);
        self.position += 1;
        token
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn expect(&mut self, token: &Token, msg: &str) -> Result<(), ParseExprError> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(msg))
        }
    }

    fn error(&self, message: &str) -> ParseExprError {
        ParseExprError {
            message: message.to_string(),
            position: self.position,
        }
    }
}

impl Expr {
    /// Convert a literal-only tree into a document value.
    ///
    /// Returns `None` as soon as a reference, call or operator (other than a
    /// negated number) is found.
    pub fn literal_value(&self) -> Option<Document> {
        match self {
            Expr::Null => Some(Value::Null),
            Expr::Bool(b) => Some(Value::Bool(*b)),
            Expr::Number(n) => Some(number(*n)),
            Expr::String(s) => Some(Value::String(s.clone())),
            Expr::Unary {
                op: UnaryOp::Neg,
                expr,
            } => match expr.as_ref() {
                Expr::Number(n) => Some(number(-n)),
                _ => None,
            },
            Expr::Array(items) => items.iter().map(Expr::literal_value).collect::<Option<Vec<_>>>().map(Value::Array),
            Expr::Object(pairs) => {
                let mut map = Map::new();
                for (key, value) in pairs {
                    map.insert(key.clone(), value.literal_value()?);
                }
                Some(Value::Object(map))
            }
            _ => None,
        }
    }
}
