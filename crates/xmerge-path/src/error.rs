//! Error types for path queries.

/// Errors raised while compiling or evaluating a path query.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum PathError {
    #[error("unexpected character {ch:?} at offset {pos}")]
    UnexpectedChar { pos: usize, ch: char },

    #[error("unexpected {found} at offset {pos}")]
    UnexpectedToken { pos: usize, found: String },

    #[error("unexpected end of query")]
    UnexpectedEnd,

    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedLiteral(usize),

    #[error("unknown function {0}()")]
    UnknownFunction(String),

    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },

    /// Valid XPath that this evaluator does not implement.
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// An operand had the wrong type, e.g. `count("x")`.
    #[error("type error: {0}")]
    Type(String),
}

/// Convenience alias for path results.
pub type PathResult<T> = Result<T, PathError>;
