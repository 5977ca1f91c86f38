use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};
use xmerge_path::{PathResult, Query};
use xmerge_types::{Criterion, Schema, DEFAULT_NAMESPACE};

use crate::error::{SchemaError, SchemaResult};
use crate::loader;
use crate::traits::SchemaProvider;

/// Compiled queries by source text, failures included.
type QueryCache = HashMap<String, PathResult<Arc<Query>>>;

/// First-match index from element local name to criteria for one namespace.
type CriteriaIndex = HashMap<String, Vec<Criterion>>;

/// In-memory schema registry.
///
/// Schemas are held behind a `RwLock` and handed out as shared `Arc`s. A
/// schema registered under [`DEFAULT_NAMESPACE`] answers every namespace no
/// other schema covers. Deep-criteria indexes are built lazily per
/// namespace; two threads racing to build the same index produce the same
/// value, so the loser's copy is simply dropped. Compiled criterion and
/// guard queries are memoized the same way.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<Vec<Arc<Schema>>>,
    fallback: RwLock<Option<Arc<Schema>>>,
    deep: RwLock<HashMap<String, Arc<CriteriaIndex>>>,
    queries: RwLock<QueryCache>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its primary namespace.
    ///
    /// Fails if that namespace (or the fallback slot) is already taken.
    pub fn register(&self, schema: Schema) -> SchemaResult<Arc<Schema>> {
        let schema = Arc::new(schema);

        if schema.namespace == DEFAULT_NAMESPACE {
            let mut fallback = self.fallback.write().unwrap_or_else(PoisonError::into_inner);
            if fallback.is_some() {
                return Err(SchemaError::DuplicateNamespace(schema.namespace.clone()));
            }
            *fallback = Some(Arc::clone(&schema));
            debug!("registered fallback merge schema");
        } else {
            let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
            if schemas.iter().any(|s| s.namespace == schema.namespace) {
                return Err(SchemaError::DuplicateNamespace(schema.namespace.clone()));
            }
            schemas.push(Arc::clone(&schema));
            debug!(
                namespace = %schema.namespace,
                handlings = schema.handlings.len(),
                "registered merge schema"
            );
        }

        // Indexes of namespaces that fell through to the fallback are stale.
        self.deep.write().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(schema)
    }

    /// Decode, validate, and register a TOML schema document.
    pub fn load_toml(&self, text: &str) -> SchemaResult<Arc<Schema>> {
        let schema = loader::schema_from_toml(text)?;
        loader::validate(&schema)?;
        self.register(schema)
    }

    /// Decode, validate, and register a JSON schema document.
    pub fn load_json(&self, text: &str) -> SchemaResult<Arc<Schema>> {
        let schema = loader::schema_from_json(text)?;
        loader::validate(&schema)?;
        self.register(schema)
    }

    /// The schema registered for `namespace` (primary or additional), if any.
    ///
    /// Unlike [`SchemaProvider::resolve_schema`] this does not fall back.
    pub fn get(&self, namespace: &str) -> Option<Arc<Schema>> {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        schemas.iter().find(|s| s.covers(namespace)).cloned()
    }

    /// The fallback schema, if one is registered.
    pub fn fallback(&self) -> Option<Arc<Schema>> {
        self.fallback.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Primary namespaces of all registered schemas, in registration order.
    pub fn namespaces(&self) -> Vec<String> {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        schemas.iter().map(|s| s.namespace.clone()).collect()
    }

    /// Number of registered schemas, excluding the fallback.
    pub fn len(&self) -> usize {
        self.schemas.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no schema other than a fallback is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn criteria_index(&self, namespace: &str) -> Arc<CriteriaIndex> {
        if let Some(index) = self
            .deep
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
        {
            return Arc::clone(index);
        }

        let schema = self.resolve_schema(namespace);
        let mut index = CriteriaIndex::new();
        for handling in schema.walk() {
            index
                .entry(handling.target.clone())
                .or_insert_with(|| handling.criteria.clone());
        }
        debug!(namespace, names = index.len(), "built deep criteria index");

        let mut deep = self.deep.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            deep.entry(namespace.to_string())
                .or_insert_with(|| Arc::new(index)),
        )
    }
}

impl SchemaProvider for SchemaRegistry {
    fn resolve_schema(&self, namespace: &str) -> Arc<Schema> {
        if let Some(schema) = self.get(namespace) {
            return schema;
        }
        if let Some(fallback) = self.fallback() {
            debug!(namespace, "using fallback merge schema");
            return fallback;
        }
        warn!(namespace, "no merge schema registered, using an empty one");
        Arc::new(Schema::new(namespace))
    }

    fn default_criterion(&self, namespace: &str) -> Criterion {
        if let Some(criterion) = self.resolve_schema(namespace).default_criterion.clone() {
            return criterion;
        }
        self.fallback()
            .and_then(|f| f.default_criterion.clone())
            .unwrap_or_default()
    }

    fn deep_criteria(&self, local_name: &str, namespace: &str) -> Vec<Criterion> {
        match self.criteria_index(namespace).get(local_name) {
            Some(criteria) => criteria.clone(),
            None => vec![self.default_criterion(namespace)],
        }
    }

    fn query(&self, source: &str) -> PathResult<Arc<Query>> {
        if let Some(compiled) = self
            .queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
        {
            return compiled.clone();
        }

        let compiled = Query::compile(source).map(Arc::new);
        let mut queries = self.queries.write().unwrap_or_else(PoisonError::into_inner);
        queries
            .entry(source.to_string())
            .or_insert(compiled)
            .clone()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("namespaces", &self.namespaces())
            .field("has_fallback", &self.fallback().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmerge_types::Handling;

    fn registry() -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        registry
            .register(
                Schema::new("urn:a")
                    .with_additional_namespace("urn:a2")
                    .with_default_criterion(Criterion::ordered("@name"))
                    .with_handling(
                        Handling::new("B")
                            .with_criterion(Criterion::ordered("@id"))
                            .with_child(
                                Handling::new("C").with_criterion(Criterion::new("text()")),
                            ),
                    )
                    .with_handling(Handling::new("C").with_criterion(Criterion::new("@key"))),
            )
            .unwrap();
        registry
    }

    #[test]
    fn resolves_primary_and_additional_namespace() {
        let r = registry();
        assert_eq!(r.resolve_schema("urn:a").namespace, "urn:a");
        assert_eq!(r.resolve_schema("urn:a2").namespace, "urn:a");
    }

    #[test]
    fn unknown_namespace_gets_empty_schema() {
        let r = registry();
        let s = r.resolve_schema("urn:zzz");
        assert_eq!(s.namespace, "urn:zzz");
        assert!(s.handlings.is_empty());
        assert_eq!(r.default_criterion("urn:zzz"), Criterion::default());
    }

    #[test]
    fn fallback_schema_answers_unknown_namespaces() {
        let r = registry();
        r.register(
            Schema::new(DEFAULT_NAMESPACE)
                .with_default_criterion(Criterion::always())
                .with_handling(Handling::new("X")),
        )
        .unwrap();
        assert_eq!(r.resolve_schema("urn:zzz").namespace, DEFAULT_NAMESPACE);
        assert_eq!(r.default_criterion("urn:zzz"), Criterion::always());
        // The namespace's own default wins over the fallback's.
        assert_eq!(r.default_criterion("urn:a"), Criterion::ordered("@name"));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn duplicate_registration_fails() {
        let r = registry();
        assert_eq!(
            r.register(Schema::new("urn:a")).unwrap_err(),
            SchemaError::DuplicateNamespace("urn:a".into())
        );
    }

    #[test]
    fn deep_criteria_first_match_in_preorder() {
        let r = registry();
        // The nested C under B is visited before the top-level C.
        assert_eq!(r.deep_criteria("C", "urn:a"), vec![Criterion::new("text()")]);
        assert_eq!(r.deep_criteria("B", "urn:a"), vec![Criterion::ordered("@id")]);
        assert_eq!(r.deep_criteria("Q", "urn:a"), vec![Criterion::ordered("@name")]);
    }

    #[test]
    fn deep_criteria_are_cached_and_refreshed_on_register() {
        let r = registry();
        assert_eq!(r.deep_criteria("X", "urn:new"), vec![Criterion::default()]);
        r.register(
            Schema::new("urn:new").with_handling(Handling::new("X").with_criterion(Criterion::always())),
        )
        .unwrap();
        assert_eq!(r.deep_criteria("X", "urn:new"), vec![Criterion::always()]);
    }

    #[test]
    fn compiled_queries_are_shared() {
        let r = registry();
        let first = r.query("@id = '1'").unwrap();
        let second = r.query("@id = '1'").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.source(), "@id = '1'");
        assert!(r.query("@id =").is_err());
        assert!(r.query("@id =").is_err(), "failures are cached too");
    }

    #[test]
    fn concurrent_lookups_agree() {
        let r = Arc::new(registry());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let r = Arc::clone(&r);
                std::thread::spawn(move || r.deep_criteria("B", "urn:a"))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), vec![Criterion::ordered("@id")]);
        }
    }
}
