//! # xmerge-merge
//!
//! Schema-driven structural merging of two XML element trees.
//!
//! A *base* and a *patch* document are merged into a new tree. Which child
//! elements denote the same thing is decided by the criteria of the
//! handlings a schema declares for them; matched pairs are merged
//! recursively, unmatched patch content is spliced next to its same-named
//! siblings, and conflicting attribute and text values are resolved by the
//! [`ConflictPolicy`] of the merge.
//!
//! ## Components
//!
//! - [`merge_attribute`]: resolves one attribute's two values
//! - [`ElementComparator`]: criterion-driven equivalence of two elements
//! - [`Scope`] / [`resolve_scope`]: the handlings visible at one level
//! - [`ElementMerger`]: the recursive merge of one element pair
//! - [`DocumentMerger`]: root rule selection, namespace checks and foreign
//!   subtree delegation
//!
//! ```
//! use std::sync::Arc;
//! use xmerge_merge::{ConflictPolicy, DocumentMerger};
//! use xmerge_schema::SchemaRegistry;
//! use xmerge_types::{Criterion, Handling, Schema};
//!
//! let registry = SchemaRegistry::new();
//! registry
//!     .register(Schema::new("").with_handling(
//!         Handling::new("beans")
//!             .with_child(Handling::new("bean").with_criterion(Criterion::ordered("@id"))),
//!     ))
//!     .unwrap();
//!
//! let merger = DocumentMerger::new(Arc::new(registry));
//! let merged = merger
//!     .merge_str(
//!         r#"<beans><bean id="a" v="1"/></beans>"#,
//!         r#"<beans><bean id="a" v="2"/><bean id="b"/></beans>"#,
//!         ConflictPolicy::PatchOverwrite,
//!     )
//!     .unwrap();
//! assert_eq!(merged, r#"<beans><bean id="a" v="2"/><bean id="b"/></beans>"#);
//! ```

pub mod attribute;
pub mod comparator;
pub mod config;
pub mod document;
pub mod element;
pub mod error;
pub mod scope;
pub mod traits;

pub use attribute::merge_attribute;
pub use comparator::ElementComparator;
pub use config::{MergeConfig, ScopeRefMode};
pub use document::{DocumentMerger, XSI_NAMESPACE};
pub use element::ElementMerger;
pub use error::{MergeError, MergeResult};
pub use scope::{imported_scope, resolve_scope, Scope};
pub use traits::ForeignMerger;
pub use xmerge_types::ConflictPolicy;
