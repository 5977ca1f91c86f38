/// Errors from loading or registering merge schemas.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The TOML document could not be decoded into a schema.
    #[error("invalid TOML schema: {0}")]
    Toml(String),

    /// The JSON document could not be decoded into a schema.
    #[error("invalid JSON schema: {0}")]
    Json(String),

    /// A guard or criterion query does not compile.
    #[error("invalid query {query:?} in handling for <{target}>: {message}")]
    InvalidQuery {
        target: String,
        query: String,
        message: String,
    },

    /// A schema for this namespace is already registered.
    #[error("a schema for namespace {0:?} is already registered")]
    DuplicateNamespace(String),
}

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
