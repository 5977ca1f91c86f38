//! Recursive-descent parser producing the query syntax tree.
//!
//! Each production is named after its XPath 1.0 grammar rule. Absolute
//! paths, variables and reverse axes are rejected as unsupported because
//! queries are always evaluated against a detached element.

use crate::error::{PathError, PathResult};
use crate::lexer::{tokenize, Spanned, Token};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Attribute,
    SelfAxis,
    Descendant,
    DescendantOrSelf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum NodeTest {
    /// Local-name test; any prefix is dropped.
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Function {
    True,
    False,
    Not,
    Boolean,
    Count,
    String,
    Number,
    Concat,
    Contains,
    StartsWith,
    NormalizeSpace,
    StringLength,
    LocalName,
    Name,
    NamespaceUri,
    Position,
    Last,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "true" => Self::True,
            "false" => Self::False,
            "not" => Self::Not,
            "boolean" => Self::Boolean,
            "count" => Self::Count,
            "string" => Self::String,
            "number" => Self::Number,
            "concat" => Self::Concat,
            "contains" => Self::Contains,
            "starts-with" => Self::StartsWith,
            "normalize-space" => Self::NormalizeSpace,
            "string-length" => Self::StringLength,
            "local-name" => Self::LocalName,
            "name" => Self::Name,
            "namespace-uri" => Self::NamespaceUri,
            "position" => Self::Position,
            "last" => Self::Last,
            _ => return None,
        })
    }

    fn check_arity(self, name: &str, got: usize) -> PathResult<()> {
        let (ok, expected) = match self {
            Self::True | Self::False | Self::Position | Self::Last => (got == 0, "0"),
            Self::Not | Self::Boolean | Self::Count => (got == 1, "1"),
            Self::Contains | Self::StartsWith => (got == 2, "2"),
            Self::Concat => (got >= 2, "at least 2"),
            Self::String
            | Self::Number
            | Self::NormalizeSpace
            | Self::StringLength
            | Self::LocalName
            | Self::Name
            | Self::NamespaceUri => (got <= 1, "0 or 1"),
        };
        if ok {
            Ok(())
        } else {
            Err(PathError::Arity {
                name: name.to_string(),
                expected,
                got,
            })
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    /// Relative location path from the context node.
    Path(Vec<Step>),
    /// Primary expression with predicates, optionally followed by steps.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Literal(String),
    Number(f64),
    Call(Function, Vec<Expr>),
}

pub(crate) fn parse(input: &str) -> PathResult<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some((pos, token)) => Err(PathError::UnexpectedToken {
            pos: *pos,
            found: token.to_string(),
        }),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(_, t)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone())?;
        self.pos += 1;
        Some(token)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> PathResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> PathError {
        match self.tokens.get(self.pos) {
            Some((pos, token)) => PathError::UnexpectedToken {
                pos: *pos,
                found: token.to_string(),
            },
            None => PathError::UnexpectedEnd,
        }
    }

    /// [21] OrExpr ::= AndExpr ('or' AndExpr)*
    fn parse_or(&mut self) -> PathResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// [22] AndExpr ::= EqualityExpr ('and' EqualityExpr)*
    fn parse_and(&mut self) -> PathResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// [23] EqualityExpr ::= RelationalExpr (('=' | '!=') RelationalExpr)*
    fn parse_equality(&mut self) -> PathResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::Neq) => CompareOp::Neq,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_relational()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// [24] RelationalExpr ::= AdditiveExpr (('<' | '>' | '<=' | '>=') AdditiveExpr)*
    fn parse_relational(&mut self) -> PathResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// [25] AdditiveExpr ::= MultiplicativeExpr (('+' | '-') MultiplicativeExpr)*
    fn parse_additive(&mut self) -> PathResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// [26] MultiplicativeExpr ::= UnaryExpr (('*' | 'div' | 'mod') UnaryExpr)*
    fn parse_multiplicative(&mut self) -> PathResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Multiply) => ArithOp::Mul,
                Some(Token::Div) => ArithOp::Div,
                Some(Token::Mod) => ArithOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// [27] UnaryExpr ::= UnionExpr | '-' UnaryExpr
    fn parse_unary(&mut self) -> PathResult<Expr> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_union()
    }

    /// [18] UnionExpr ::= PathExpr ('|' PathExpr)*
    fn parse_union(&mut self) -> PathResult<Expr> {
        let mut lhs = self.parse_path()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_path()?;
            lhs = Expr::Union(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// [19] PathExpr ::= RelativeLocationPath
    ///                 | FilterExpr (('/' | '//') RelativeLocationPath)?
    fn parse_path(&mut self) -> PathResult<Expr> {
        match self.peek() {
            Some(Token::Slash) | Some(Token::DoubleSlash) => {
                return Err(PathError::Unsupported("absolute location path".into()))
            }
            None => return Err(PathError::UnexpectedEnd),
            _ => {}
        }

        if !self.at_primary() {
            return Ok(Expr::Path(self.parse_relative_path()?));
        }

        let primary = self.parse_primary()?;
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            predicates.push(self.parse_predicate()?);
        }

        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                steps = self.parse_relative_path()?;
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(descendant_or_self());
                steps.extend(self.parse_relative_path()?);
            }
            _ => {}
        }

        if predicates.is_empty() && steps.is_empty() {
            Ok(primary)
        } else {
            Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            })
        }
    }

    /// Whether the next tokens open a FilterExpr rather than a location path.
    fn at_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Literal(_)) | Some(Token::Number(_)) | Some(Token::LParen) => true,
            Some(Token::Dollar) => true,
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen) && !is_node_type(name)
            }
            _ => false,
        }
    }

    /// [15] PrimaryExpr ::= VariableReference | '(' Expr ')' | Literal | Number | FunctionCall
    fn parse_primary(&mut self) -> PathResult<Expr> {
        match self.advance() {
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Dollar) => Err(PathError::Unsupported("variable reference".into())),
            Some(Token::Name(name)) => self.parse_call(name),
            Some(_) => {
                self.pos -= 1;
                Err(self.unexpected())
            }
            None => Err(PathError::UnexpectedEnd),
        }
    }

    /// [16] FunctionCall ::= FunctionName '(' ( Argument ( ',' Argument )* )? ')'
    fn parse_call(&mut self, name: String) -> PathResult<Expr> {
        let function =
            Function::lookup(&name).ok_or_else(|| PathError::UnknownFunction(name.clone()))?;
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }
        function.check_arity(&name, args.len())?;
        Ok(Expr::Call(function, args))
    }

    /// [3] RelativeLocationPath ::= Step (('/' | '//') Step)*
    fn parse_relative_path(&mut self) -> PathResult<Vec<Step>> {
        let mut steps = vec![self.parse_step()?];
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(descendant_or_self());
                }
                _ => return Ok(steps),
            }
            steps.push(self.parse_step()?);
        }
    }

    /// [4] Step ::= AxisSpecifier NodeTest Predicate* | '.' | '..'
    fn parse_step(&mut self) -> PathResult<Step> {
        match self.peek() {
            Some(Token::Dot) => {
                self.pos += 1;
                return Ok(Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            Some(Token::DotDot) => return Err(PathError::Unsupported("parent axis".into())),
            _ => {}
        }

        let axis = self.parse_axis()?;
        let test = self.parse_node_test()?;
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            predicates.push(self.parse_predicate()?);
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    /// [5] AxisSpecifier ::= AxisName '::' | '@'?
    fn parse_axis(&mut self) -> PathResult<Axis> {
        if self.eat(&Token::At) {
            return Ok(Axis::Attribute);
        }
        let named = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Name(name)), Some(Token::ColonColon)) => name.clone(),
            _ => return Ok(Axis::Child),
        };
        self.pos += 2;
        match named.as_str() {
            "child" => Ok(Axis::Child),
            "attribute" => Ok(Axis::Attribute),
            "self" => Ok(Axis::SelfAxis),
            "descendant" => Ok(Axis::Descendant),
            "descendant-or-self" => Ok(Axis::DescendantOrSelf),
            other => Err(PathError::Unsupported(format!("{other} axis"))),
        }
    }

    /// [7] NodeTest ::= NameTest | NodeType '(' ')'
    fn parse_node_test(&mut self) -> PathResult<NodeTest> {
        match self.advance() {
            Some(Token::Star) => Ok(NodeTest::Any),
            Some(Token::Name(name)) if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                self.expect(&Token::RParen)?;
                match name.as_str() {
                    "text" => Ok(NodeTest::Text),
                    "node" => Ok(NodeTest::Node),
                    other => Err(PathError::Unsupported(format!("{other}() node test"))),
                }
            }
            Some(Token::Name(name)) => {
                let local = name.rsplit(':').next().unwrap_or(&name).to_string();
                Ok(NodeTest::Name(local))
            }
            Some(_) => {
                self.pos -= 1;
                Err(self.unexpected())
            }
            None => Err(PathError::UnexpectedEnd),
        }
    }

    /// [8] Predicate ::= '[' Expr ']'
    fn parse_predicate(&mut self) -> PathResult<Expr> {
        self.expect(&Token::LBracket)?;
        let expr = self.parse_or()?;
        self.expect(&Token::RBracket)?;
        Ok(expr)
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "text" | "node" | "comment" | "processing-instruction")
}

/// The step `//` abbreviates.
fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}
