use std::sync::Arc;

use xmerge_path::{PathResult, Query};
use xmerge_types::{Criterion, Schema};

/// Read access to merge schemas, keyed by namespace URI.
///
/// The merge engine only ever reads through this trait. Implementations
/// must be safe to share across concurrent merges; any lazily populated
/// state has to be idempotent.
pub trait SchemaProvider: Send + Sync {
    /// The schema governing `namespace`.
    ///
    /// Never fails: unknown namespaces get a fallback or empty schema.
    fn resolve_schema(&self, namespace: &str) -> Arc<Schema>;

    /// Matching rule for elements no handling covers.
    fn default_criterion(&self, namespace: &str) -> Criterion;

    /// Criteria for comparing nested elements called `local_name`.
    ///
    /// Found by a depth-first walk of the namespace's handling forest, first
    /// match winning; the default criterion when no handling targets the
    /// name.
    fn deep_criteria(&self, local_name: &str, namespace: &str) -> Vec<Criterion>;

    /// The compiled form of a criterion or guard query.
    ///
    /// The default compiles on every call; providers that hold schemas for
    /// the lifetime of many merges should memoize.
    fn query(&self, source: &str) -> PathResult<Arc<Query>> {
        Query::compile(source).map(Arc::new)
    }
}
