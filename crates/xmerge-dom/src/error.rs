//! Error types for the DOM crate.

/// Errors that can occur while reading XML text into a tree.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomError {
    /// The underlying XML reader rejected the input.
    #[error("malformed XML at byte {position}: {message}")]
    Parse { position: u64, message: String },

    /// A qualified name used a prefix with no namespace binding.
    #[error("unbound namespace prefix in {0:?}")]
    UnknownPrefix(String),

    /// An end tag did not close any open element.
    #[error("unexpected end tag </{0}>")]
    UnbalancedEnd(String),

    /// The input ended with elements still open.
    #[error("unexpected end of input inside <{0}>")]
    UnclosedElement(String),

    /// The input held no root element.
    #[error("document has no root element")]
    NoRoot,

    /// The input held more than one root element.
    #[error("document has more than one root element")]
    MultipleRoots,

    /// Names or text were not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(String),
}

/// Convenience alias for DOM results.
pub type DomResult<T> = Result<T, DomError>;
