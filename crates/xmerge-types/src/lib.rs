//! Foundation types for xmerge.
//!
//! This crate holds the immutable configuration that drives a schema-aware
//! XML merge. Every other xmerge crate depends on `xmerge-types`.
//!
//! # Key Types
//!
//! - [`ConflictPolicy`]: Global attach/overwrite and base/patch preference
//! - [`Criterion`]: Path-query based equivalence rule between two elements
//! - [`AttributeRule`]: Per-attribute merge policy
//! - [`Handling`]: Node of a rule tree describing how to merge one element type
//! - [`Schema`]: The rules governing one XML vocabulary (namespace)

pub mod error;
pub mod policy;
pub mod rules;
pub mod schema;

pub use error::TypeError;
pub use policy::ConflictPolicy;
pub use rules::{AttributeRule, Criterion, Handling, ScopeRef, ALWAYS_TRUE};
pub use schema::{Schema, DEFAULT_NAMESPACE};
