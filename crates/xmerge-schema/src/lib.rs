//! Merge-schema access for xmerge.
//!
//! The merge engine reads schemas exclusively through the
//! [`SchemaProvider`] trait. [`SchemaRegistry`] is the in-memory
//! implementation: schemas are registered up front (decoded from TOML or
//! JSON by the [`loader`] helpers, or built in code) and then shared
//! read-only across any number of concurrent merges.
//!
//! # Resolution rules
//!
//! 1. A namespace resolves to the first schema whose primary or additional
//!    namespaces include it.
//! 2. Otherwise the fallback schema registered under `$DEFAULT$` answers.
//! 3. Otherwise an empty schema is synthesized.

pub mod error;
pub mod loader;
pub mod registry;
pub mod traits;

pub use error::{SchemaError, SchemaResult};
pub use loader::{schema_from_json, schema_from_toml, validate};
pub use registry::SchemaRegistry;
pub use traits::SchemaProvider;
