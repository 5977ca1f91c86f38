//! Rule scopes: which handlings govern the children of an element.

use std::sync::Arc;

use tracing::{debug, warn};
use xmerge_dom::Element;
use xmerge_schema::SchemaProvider;
use xmerge_types::{Handling, ALWAYS_TRUE};

use crate::config::ScopeRefMode;
use crate::error::{MergeError, MergeResult};

/// Ordered list of handlings visible at one tree level.
///
/// Earlier entries take precedence when several apply to the same element.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    entries: Vec<Arc<Handling>>,
}

impl Scope {
    /// An empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// The handlings in precedence order.
    pub fn entries(&self) -> &[Arc<Handling>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The scope for the children of an element governed by `own`.
    ///
    /// Entries overlapped by one of `own`'s children are dropped, then all of
    /// `own`'s children are appended.
    pub fn child_scope(&self, own: &Handling) -> Scope {
        let mut entries: Vec<Arc<Handling>> = self
            .entries
            .iter()
            .filter(|parent| !own.children.iter().any(|child| parent.overlaps(child)))
            .cloned()
            .collect();
        entries.extend(own.children.iter().cloned());
        Scope { entries }
    }

    /// The first handling whose target is the element's local name and whose
    /// guard holds on it. Guards are compiled through `provider`.
    pub fn select(
        &self,
        element: &Element,
        provider: &dyn SchemaProvider,
    ) -> MergeResult<Option<Arc<Handling>>> {
        for handling in &self.entries {
            if handling.target != element.name {
                continue;
            }
            if guard_holds(handling, element, provider)? {
                return Ok(Some(Arc::clone(handling)));
            }
        }
        Ok(None)
    }
}

/// Guards use `boolean()` semantics: an empty node-set is false.
fn guard_holds(
    handling: &Handling,
    element: &Element,
    provider: &dyn SchemaProvider,
) -> MergeResult<bool> {
    if handling.guard == ALWAYS_TRUE {
        return Ok(true);
    }
    provider
        .query(&handling.guard)
        .and_then(|query| query.test(element))
        .map_err(|source| MergeError::GuardEvaluation {
            element: element.qualified_name(),
            target: handling.target.clone(),
            guard: handling.guard.clone(),
            source,
        })
}

/// Build the scope for the children of an element governed by `own`,
/// including any scope `own` imports by reference.
///
/// `namespace` is the namespace of the governed element; a reference without
/// an explicit namespace is resolved against it.
pub fn resolve_scope(
    parent: &Scope,
    own: &Handling,
    namespace: &str,
    provider: &dyn SchemaProvider,
    mode: ScopeRefMode,
) -> MergeResult<Scope> {
    let mut scope = parent.child_scope(own);
    if let Some(reference) = &own.scope_ref {
        let target_ns = reference.namespace.as_deref().unwrap_or(namespace);
        let imported = imported_scope(&reference.label, target_ns, provider, mode)?;
        debug!(
            label = %reference.label,
            namespace = target_ns,
            imported = imported.len(),
            "imported referenced scope"
        );
        scope.entries.extend(imported.entries);
    }
    Ok(scope)
}

/// The scope in effect below the handling labelled `label` in the schema
/// for `namespace`.
///
/// The path from the schema root to the labelled node is replayed from an
/// empty scope, exactly as a merge descending that path would build it.
pub fn imported_scope(
    label: &str,
    namespace: &str,
    provider: &dyn SchemaProvider,
    mode: ScopeRefMode,
) -> MergeResult<Scope> {
    let schema = provider.resolve_schema(namespace);
    let Some(path) = schema.root_handling().path_to_label(label) else {
        return match mode {
            ScopeRefMode::Lenient => {
                warn!(label, namespace, "scope reference not found, importing nothing");
                Ok(Scope::new())
            }
            ScopeRefMode::Strict => Err(MergeError::UnresolvedScopeRef {
                label: label.to_string(),
                namespace: namespace.to_string(),
            }),
        };
    };

    Ok(path
        .iter()
        .fold(Scope::new(), |scope, handling| scope.child_scope(handling)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmerge_schema::SchemaRegistry;
    use xmerge_types::Schema;

    /// Helper: render a scope as `target[guard]` entries.
    fn targets(scope: &Scope) -> Vec<String> {
        scope
            .entries()
            .iter()
            .map(|h| format!("{}[{}]", h.target, h.guard))
            .collect()
    }

    /// Helper: a registry whose `urn:common` schema labels a nested handling
    /// `shared`.
    fn shared_registry() -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        registry
            .register(
                Schema::new("urn:common").with_handling(
                    Handling::new("outer")
                        .with_child(Handling::new("x"))
                        .with_child(
                            Handling::new("inner")
                                .with_label("shared")
                                .with_child(Handling::new("y"))
                                .with_child(Handling::new("x").with_unique(true)),
                        ),
                ),
            )
            .unwrap();
        registry
    }

    // -----------------------------------------------------------------------
    // 1. Child handlings supersede overlapping parent entries
    // -----------------------------------------------------------------------
    #[test]
    fn child_scope_supersedes_overlapping_entries() {
        let parent = Scope::new().child_scope(
            &Handling::new("root")
                .with_child(Handling::new("a").with_unique(true))
                .with_child(Handling::new("b"))
                .with_child(Handling::new("a").with_guard("@x")),
        );
        let own = Handling::new("b").with_child(Handling::new("a"));
        let scope = parent.child_scope(&own);
        assert_eq!(targets(&scope), vec!["b[true()]", "a[@x]", "a[true()]"]);
        assert!(!scope.entries()[2].unique, "the overriding child wins");
    }

    // -----------------------------------------------------------------------
    // 2. Selection is first-fit over guarded entries
    // -----------------------------------------------------------------------
    #[test]
    fn select_honours_order_and_guards() {
        let registry = SchemaRegistry::new();
        let scope = Scope::new().child_scope(
            &Handling::new("root")
                .with_child(Handling::new("a").with_guard("@kind = 'x'").with_unique(true))
                .with_child(Handling::new("a")),
        );
        let x = Element::new("a").with_attribute("kind", "x");
        let y = Element::new("a").with_attribute("kind", "y");
        assert!(scope.select(&x, &registry).unwrap().unwrap().unique);
        assert!(!scope.select(&y, &registry).unwrap().unwrap().unique);
        assert!(scope.select(&Element::new("b"), &registry).unwrap().is_none());
    }

    // -----------------------------------------------------------------------
    // 3. A guard selecting nothing does not hold
    // -----------------------------------------------------------------------
    #[test]
    fn empty_node_set_guard_is_false() {
        let registry = SchemaRegistry::new();
        let scope = Scope::new().child_scope(
            &Handling::new("root")
                .with_child(Handling::new("a").with_guard("@x").with_unique(true))
                .with_child(Handling::new("a")),
        );
        let without = scope.select(&Element::new("a"), &registry).unwrap().unwrap();
        assert_eq!(without.guard, ALWAYS_TRUE);
        let with = scope
            .select(&Element::new("a").with_attribute("x", ""), &registry)
            .unwrap()
            .unwrap();
        assert_eq!(with.guard, "@x", "an existing attribute holds even when empty");
    }

    // -----------------------------------------------------------------------
    // 4. Guard errors abort selection
    // -----------------------------------------------------------------------
    #[test]
    fn broken_guard_is_fatal() {
        let registry = SchemaRegistry::new();
        let scope =
            Scope::new().child_scope(&Handling::new("root").with_child(Handling::new("a").with_guard("@")));
        let err = scope.select(&Element::new("a"), &registry).unwrap_err();
        assert!(matches!(err, MergeError::GuardEvaluation { ref target, .. } if target == "a"));
    }

    // -----------------------------------------------------------------------
    // 5. Scope references replay the path to the label
    // -----------------------------------------------------------------------
    #[test]
    fn reference_imports_replayed_scope() {
        let registry = shared_registry();
        let own = Handling::new("host")
            .with_child(Handling::new("z"))
            .with_scope_ref("shared", Some("urn:common"));
        let scope =
            resolve_scope(&Scope::new(), &own, "urn:app", &registry, ScopeRefMode::Strict).unwrap();
        // root -> outer -> inner: outer's x is superseded by inner's x.
        assert_eq!(
            targets(&scope),
            vec!["z[true()]", "outer[true()]", "inner[true()]", "y[true()]", "x[true()]"]
        );
        assert!(scope.entries()[4].unique);
    }

    #[test]
    fn reference_defaults_to_current_namespace() {
        let registry = shared_registry();
        let own = Handling::new("host").with_scope_ref("shared", None);
        let scope =
            resolve_scope(&Scope::new(), &own, "urn:common", &registry, ScopeRefMode::Strict).unwrap();
        assert_eq!(scope.len(), 4);
    }

    // -----------------------------------------------------------------------
    // 6. Unresolved references: lenient imports nothing, strict fails
    // -----------------------------------------------------------------------
    #[test]
    fn unresolved_reference_modes() {
        let registry = shared_registry();
        let own = Handling::new("host").with_scope_ref("missing", Some("urn:common"));
        let lenient =
            resolve_scope(&Scope::new(), &own, "urn:app", &registry, ScopeRefMode::Lenient).unwrap();
        assert!(lenient.is_empty());
        let strict = resolve_scope(&Scope::new(), &own, "urn:app", &registry, ScopeRefMode::Strict);
        assert!(matches!(strict, Err(MergeError::UnresolvedScopeRef { .. })));
    }
}
