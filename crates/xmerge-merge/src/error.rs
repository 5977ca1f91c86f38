use xmerge_dom::DomError;
use xmerge_path::PathError;

/// Errors that abort a merge.
///
/// Comparison failures are not represented here: a criterion that cannot
/// be evaluated only makes that candidate pair a non-match.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A handling's guard could not be evaluated while selecting the rule
    /// for a child element.
    #[error("guard {guard:?} of the handling for <{target}> failed on <{element}>: {source}")]
    GuardEvaluation {
        element: String,
        target: String,
        guard: String,
        #[source]
        source: PathError,
    },

    /// More than one merged child carries the target of a unique handling.
    #[error("found {count} instances of unique element <{tag}>")]
    UniquenessViolation { tag: String, count: usize },

    /// The two roots are in different namespaces.
    #[error("namespace of base ({base:?}) does not match namespace of patch ({patch:?})")]
    NamespaceMismatch { base: String, patch: String },

    /// A scope reference names a label no handling carries.
    #[error("scope reference {label:?} not found in the schema for {namespace:?}")]
    UnresolvedScopeRef { label: String, namespace: String },

    /// The element trees nest deeper than the configured bound.
    #[error("merge exceeded the maximum depth of {0}")]
    DepthExceeded(usize),

    /// An input document could not be read.
    #[error("failed to read document: {0}")]
    Dom(#[from] DomError),

    /// The merge configuration could not be decoded.
    #[error("invalid merge configuration: {0}")]
    Config(String),
}

/// Result alias for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;
