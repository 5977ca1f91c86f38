//! Tokenizer for path queries.
//!
//! Follows the XPath 1.0 lexical disambiguation rule: when the preceding
//! token can end an operand, `*` is the multiplication operator and the
//! names `and`, `or`, `div` and `mod` are operators; everywhere else they
//! are name tests.

use std::fmt;

use crate::error::{PathError, PathResult};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Dot,
    DotDot,
    Comma,
    Pipe,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    ColonColon,
    Dollar,
    Multiply,
    And,
    Or,
    Div,
    Mod,
    /// `*` or `prefix:*` used as a name test.
    Star,
    /// A name, possibly prefixed (`p:name`).
    Name(String),
    Literal(String),
    Number(f64),
}

impl Token {
    /// Whether this token leaves the lexer expecting an operand next.
    fn opens_operand(&self) -> bool {
        !matches!(
            self,
            Token::RParen
                | Token::RBracket
                | Token::Dot
                | Token::DotDot
                | Token::Star
                | Token::Name(_)
                | Token::Literal(_)
                | Token::Number(_)
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(n) => write!(f, "name {n:?}"),
            Token::Literal(s) => write!(f, "literal {s:?}"),
            Token::Number(n) => write!(f, "number {n}"),
            other => {
                let s = match other {
                    Token::Slash => "/",
                    Token::DoubleSlash => "//",
                    Token::LBracket => "[",
                    Token::RBracket => "]",
                    Token::LParen => "(",
                    Token::RParen => ")",
                    Token::At => "@",
                    Token::Dot => ".",
                    Token::DotDot => "..",
                    Token::Comma => ",",
                    Token::Pipe => "|",
                    Token::Plus => "+",
                    Token::Minus => "-",
                    Token::Eq => "=",
                    Token::Neq => "!=",
                    Token::Lt => "<",
                    Token::Le => "<=",
                    Token::Gt => ">",
                    Token::Ge => ">=",
                    Token::ColonColon => "::",
                    Token::Dollar => "$",
                    Token::Multiply | Token::Star => "*",
                    Token::And => "and",
                    Token::Or => "or",
                    Token::Div => "div",
                    Token::Mod => "mod",
                    Token::Name(_) | Token::Literal(_) | Token::Number(_) => "",
                };
                write!(f, "'{s}'")
            }
        }
    }
}

/// A token with the byte offset it starts at.
pub(crate) type Spanned = (usize, Token);

pub(crate) fn tokenize(input: &str) -> PathResult<Vec<Spanned>> {
    Lexer { input, pos: 0 }.run()
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn run(mut self) -> PathResult<Vec<Spanned>> {
        let mut tokens: Vec<Spanned> = Vec::new();

        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
                continue;
            }

            let start = self.pos;
            let operator_context = tokens.last().is_some_and(|(_, t)| !t.opens_operand());

            let token = match ch {
                '/' => {
                    self.advance();
                    if self.peek() == Some('/') {
                        self.advance();
                        Token::DoubleSlash
                    } else {
                        Token::Slash
                    }
                }
                '[' => self.single(Token::LBracket),
                ']' => self.single(Token::RBracket),
                '(' => self.single(Token::LParen),
                ')' => self.single(Token::RParen),
                '@' => self.single(Token::At),
                ',' => self.single(Token::Comma),
                '|' => self.single(Token::Pipe),
                '+' => self.single(Token::Plus),
                '-' => self.single(Token::Minus),
                '=' => self.single(Token::Eq),
                '$' => self.single(Token::Dollar),
                '!' => {
                    self.advance();
                    if self.peek() != Some('=') {
                        return Err(PathError::UnexpectedChar { pos: start, ch });
                    }
                    self.advance();
                    Token::Neq
                }
                '<' | '>' => {
                    self.advance();
                    let or_equal = self.peek() == Some('=');
                    if or_equal {
                        self.advance();
                    }
                    match (ch, or_equal) {
                        ('<', false) => Token::Lt,
                        ('<', true) => Token::Le,
                        (_, false) => Token::Gt,
                        (_, true) => Token::Ge,
                    }
                }
                ':' => {
                    self.advance();
                    if self.peek() != Some(':') {
                        return Err(PathError::UnexpectedChar { pos: start, ch });
                    }
                    self.advance();
                    Token::ColonColon
                }
                '*' => {
                    self.advance();
                    if operator_context {
                        Token::Multiply
                    } else {
                        Token::Star
                    }
                }
                '"' | '\'' => self.literal(ch)?,
                '.' => match self.peek_second() {
                    Some(d) if d.is_ascii_digit() => self.number(),
                    Some('.') => {
                        self.pos += 2;
                        Token::DotDot
                    }
                    _ => self.single(Token::Dot),
                },
                c if c.is_ascii_digit() => self.number(),
                c if is_name_start(c) => {
                    let name = self.name();
                    match name.as_str() {
                        "and" if operator_context => Token::And,
                        "or" if operator_context => Token::Or,
                        "div" if operator_context => Token::Div,
                        "mod" if operator_context => Token::Mod,
                        _ => self.qualify(name),
                    }
                }
                other => return Err(PathError::UnexpectedChar { pos: start, ch: other }),
            };

            tokens.push((start, token));
        }

        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn literal(&mut self, quote: char) -> PathResult<Token> {
        let start = self.pos;
        self.advance();
        let body_start = self.pos;
        while let Some(ch) = self.advance() {
            if ch == quote {
                let body = &self.input[body_start..self.pos - ch.len_utf8()];
                return Ok(Token::Literal(body.to_string()));
            }
        }
        Err(PathError::UnterminatedLiteral(start))
    }

    /// Number ::= Digits ('.' Digits?)? | '.' Digits
    fn number(&mut self) -> Token {
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !seen_dot && self.peek_second() != Some('.') {
                seen_dot = true;
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        // Digits with at most one dot always parse.
        Token::Number(text.parse().unwrap_or(f64::NAN))
    }

    fn name(&mut self) -> String {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_name_char(ch) {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    /// Extend `prefix` into `prefix:local` or `prefix:*` when a single colon
    /// follows; `::` is left for the axis separator.
    fn qualify(&mut self, prefix: String) -> Token {
        if self.peek() != Some(':') {
            return Token::Name(prefix);
        }
        match self.peek_second() {
            Some('*') => {
                self.pos += 2;
                Token::Star
            }
            Some(c) if is_name_start(c) => {
                self.advance();
                let local = self.name();
                Token::Name(format!("{prefix}:{local}"))
            }
            _ => Token::Name(prefix),
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}
