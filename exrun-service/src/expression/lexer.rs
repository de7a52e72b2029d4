// Expression Lexer
// Tokenizes document expressions and splits `${pointer}` / `%{expr}` text segments

use std::fmt;

/// Token types for document expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Null,
    True,
    False,
    Number(f64),
    String(String),

    // Identifiers and references
    Identifier(String),

    // Operators
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    Eq,       // ==
    Ne,       // !=
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=
    And,      // &&
    Or,       // ||
    Not,      // !
    Dot,      // .
    Comma,    // ,
    Colon,    // :
    Question, // ?

    // Delimiters
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }

    // End of input
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Null => write!(f, "null"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Eq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Question => write!(f, "?"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// Lexer error
#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lex error at position {}: {}", self.position, self.message)
    }
}

impl std::error::Error for LexError {}

/// Lexer for document expressions
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let Some(&(pos, ch)) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        self.position = pos;

        let single = match ch {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            '?' => Some(Token::Question),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        match ch {
            // Two-character operators
            '=' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Ok(Token::Eq)
                } else {
                    Err(LexError {
                        message: "expected '==' operator".to_string(),
                        position: pos,
                    })
                }
            }
            '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Ok(Token::Ne)
                } else {
                    Ok(Token::Not)
                }
            }
            '<' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Ok(Token::Le)
                } else {
                    Ok(Token::Lt)
                }
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Ok(Token::Ge)
                } else {
                    Ok(Token::Gt)
                }
            }
            '&' => {
                self.advance();
                if self.peek_char() == Some('&') {
                    self.advance();
                    Ok(Token::And)
                } else {
                    Err(LexError {
                        message: "expected '&&' operator".to_string(),
                        position: pos,
                    })
                }
            }
            '|' => {
                self.advance();
                if self.peek_char() == Some('|') {
                    self.advance();
                    Ok(Token::Or)
                } else {
                    Err(LexError {
                        message: "expected '||' operator".to_string(),
                        position: pos,
                    })
                }
            }

            '\'' => self.read_single_quoted(),
            '"' => self.read_double_quoted(),

            '0'..='9' => self.read_number(),

            'a'..='z' | 'A'..='Z' | '_' => self.read_identifier(),

            _ => Err(LexError {
                message: format!("unexpected character: '{}'", ch),
                position: pos,
            }),
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// 'single quoted', a doubled quote ('') escapes itself
    fn read_single_quoted(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        self.advance();

        let mut value = String::new();

        loop {
            match self.advance() {
                Some((_, '\'')) => {
                    if self.peek_char() == Some('\'') {
                        value.push('\'');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some((_, ch)) => value.push(ch),
                None => {
                    return Err(LexError {
                        message: "unterminated string".to_string(),
                        position: start,
                    });
                }
            }
        }

        Ok(Token::String(value))
    }

    /// "double quoted" with backslash escapes
    fn read_double_quoted(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        self.advance();

        let mut value = String::new();

        loop {
            match self.advance() {
                Some((_, '"')) => break,
                Some((pos, '\\')) => match self.advance() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, c @ ('"' | '\\' | '\'' | '/'))) => value.push(c),
                    Some((_, other)) => {
                        return Err(LexError {
                            message: format!("unknown escape sequence '\\{}'", other),
                            position: pos,
                        });
                    }
                    None => break,
                },
                Some((_, ch)) => value.push(ch),
                None => {
                    return Err(LexError {
                        message: "unterminated string".to_string(),
                        position: start,
                    });
                }
            }
        }

        Ok(Token::String(value))
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        let mut num_str = String::new();

        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // A '.' only continues the number when a digit follows it
        if self.peek_char() == Some('.') {
            let mut peek_iter = self.chars.clone();
            peek_iter.next();
            if let Some(&(_, next_ch)) = peek_iter.peek() {
                if next_ch.is_ascii_digit() {
                    num_str.push('.');
                    self.advance();

                    while let Some(&(_, ch)) = self.chars.peek() {
                        if ch.is_ascii_digit() {
                            num_str.push(ch);
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
            }
        }

        // Exponent: 1e6, 2.5E-3
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let mut peek_iter = self.chars.clone();
            peek_iter.next();
            let mut exponent = String::from("e");
            if let Some(&(_, sign @ ('+' | '-'))) = peek_iter.peek() {
                exponent.push(sign);
                peek_iter.next();
            }
            if matches!(peek_iter.peek(), Some(&(_, d)) if d.is_ascii_digit()) {
                for _ in 0..exponent.len() {
                    self.advance();
                }
                num_str.push_str(&exponent);
                while let Some(&(_, ch)) = self.chars.peek() {
                    if ch.is_ascii_digit() {
                        num_str.push(ch);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| LexError {
                message: format!("invalid number: {}", num_str),
                position: start,
            })
    }

    fn read_identifier(&mut self) -> Result<Token, LexError> {
        let mut ident = String::new();

        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Keywords are case-insensitive so `None`/`True` read the same as `null`/`true`
        let token = match ident.to_lowercase().as_str() {
            "null" | "none" => Token::Null,
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Identifier(ident),
        };

        Ok(token)
    }
}

/// Piece of a string scalar split around inline substitutions
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `${/pointer}`: document lookup
    Pointer(String),
    /// `%{expression}`: expression evaluation
    Expression(String),
    /// Plain text
    Text(String),
}

/// Split a string into text and inline substitution segments, left to right
pub fn split_segments(input: &str) -> Vec<Segment> {
    let mut results = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut text = String::new();
    let mut pos = 0;

    while pos < len {
        let opens = pos + 1 < len && chars[pos + 1] == '{';

        // ${/pointer}: no braces allowed inside; `${NAME}` stays text for the shell
        if opens && chars[pos] == '$' {
            if let Some(end) = find_pointer_end(&chars, pos + 2) {
                let pointer: String = chars[pos + 2..end].iter().collect();
                let pointer = pointer.trim();
                if pointer.starts_with('/') {
                    flush_text(&mut text, &mut results);
                    results.push(Segment::Pointer(pointer.to_string()));
                    pos = end + 1;
                    continue;
                }
            }
        }

        // %{expr}: braces nest, quoted strings are skipped
        if opens && chars[pos] == '%' {
            if let Some(end) = find_expression_end(&chars, pos + 2) {
                flush_text(&mut text, &mut results);
                let expr: String = chars[pos + 2..end].iter().collect();
                results.push(Segment::Expression(expr.trim().to_string()));
                pos = end + 1;
                continue;
            }
        }

        text.push(chars[pos]);
        pos += 1;
    }

    flush_text(&mut text, &mut results);
    results
}

/// Whether the string holds at least one inline substitution
pub fn has_inline(input: &str) -> bool {
    split_segments(input)
        .iter()
        .any(|s| !matches!(s, Segment::Text(_)))
}

fn flush_text(text: &mut String, results: &mut Vec<Segment>) {
    if !text.is_empty() {
        results.push(Segment::Text(std::mem::take(text)));
    }
}

fn find_pointer_end(chars: &[char], start: usize) -> Option<usize> {
    for (i, &ch) in chars.iter().enumerate().skip(start) {
        match ch {
            '}' => return Some(i),
            '{' => return None,
            _ => {}
        }
    }
    None
}

fn find_expression_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 1;
    let mut quote: Option<char> = None;

    for (i, &ch) in chars.iter().enumerate().skip(start) {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' => quote = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_simple_tokens() {
        let mut lexer = Lexer::new("+ - * / ( )");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(
            tokens,
            vec![
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::LParen,
                Token::RParen,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_lexer_comparison_and_logic() {
        let mut lexer = Lexer::new("== != <= > && || !");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(
            tokens,
            vec![
                Token::Eq,
                Token::Ne,
                Token::Le,
                Token::Gt,
                Token::And,
                Token::Or,
                Token::Not,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_lexer_strings() {
        let mut lexer = Lexer::new(r#"'it''s' "say \"hi\"\n""#);
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(
            tokens,
            vec![
                Token::String("it's".to_string()),
                Token::String("say \"hi\"\n".to_string()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_lexer_unterminated_string() {
        assert!(Lexer::new("'open").tokenize().is_err());
        assert!(Lexer::new("\"open").tokenize().is_err());
    }

    #[test]
    fn test_lexer_numbers() {
        let mut lexer = Lexer::new("42 3.14 1e3 2.5E-1");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(
            tokens,
            vec![
                Token::Number(42.0),
                Token::Number(3.14),
                Token::Number(1000.0),
                Token::Number(0.25),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_lexer_keywords() {
        let mut lexer = Lexer::new("null None True false");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(
            tokens,
            vec![
                Token::Null,
                Token::Null,
                Token::True,
                Token::False,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_split_segments() {
        let segments = split_segments("run ${/solver/name} with %{threads * 2} cores");

        assert_eq!(
            segments,
            vec![
                Segment::Text("run ".to_string()),
                Segment::Pointer("/solver/name".to_string()),
                Segment::Text(" with ".to_string()),
                Segment::Expression("threads * 2".to_string()),
                Segment::Text(" cores".to_string()),
            ]
        );
    }

    #[test]
    fn test_split_nested_expression_braces() {
        let segments = split_segments("%{length({a: '}', b: 2})}");
        assert_eq!(
            segments,
            vec![Segment::Expression("length({a: '}', b: 2})".to_string())]
        );
    }

    #[test]
    fn test_unclosed_markers_are_text() {
        assert!(!has_inline("cost ${ and 100%{"));
        assert!(!has_inline("plain $HOME"));
        assert!(!has_inline("shell ${HOME}/bin"));
        assert!(has_inline("${/a}"));
    }
}
