use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::rules::{Criterion, Handling};

/// Reserved namespace identifying the fallback schema.
pub const DEFAULT_NAMESPACE: &str = "$DEFAULT$";

/// The merge rules for one XML vocabulary.
///
/// A schema is itself the root of its rule tree: its forest plays the role
/// of a handling's children and its label can be the target of a
/// [`ScopeRef`](crate::ScopeRef).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Primary namespace URI this schema governs.
    #[serde(default)]
    pub namespace: String,
    /// Further namespace URIs answered by this schema.
    #[serde(default)]
    pub additional_namespaces: Vec<String>,
    /// The schema itself is the handling for any document root.
    #[serde(default)]
    pub is_root: bool,
    /// Fallback criterion for elements no handling covers.
    #[serde(default)]
    pub default_criterion: Option<Criterion>,
    /// Top-level handlings.
    #[serde(default, rename = "handling")]
    pub handlings: Vec<Arc<Handling>>,
    /// Makes the schema root referenceable from a scope reference.
    #[serde(default)]
    pub label: Option<String>,
}

impl Schema {
    /// An empty schema for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Append a top-level handling.
    pub fn with_handling(mut self, handling: Handling) -> Self {
        self.handlings.push(Arc::new(handling));
        self
    }

    /// Set the default criterion.
    pub fn with_default_criterion(mut self, criterion: Criterion) -> Self {
        self.default_criterion = Some(criterion);
        self
    }

    /// Answer for an additional namespace.
    pub fn with_additional_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.additional_namespaces.push(namespace.into());
        self
    }

    /// Mark the schema as the root handling.
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether this schema answers for `namespace`.
    pub fn covers(&self, namespace: &str) -> bool {
        self.namespace == namespace || self.additional_namespaces.iter().any(|ns| ns == namespace)
    }

    /// The schema viewed as the root node of its rule tree.
    ///
    /// The synthetic handling has an empty target, an always-true guard,
    /// the schema's forest as children, and the schema's label.
    pub fn root_handling(&self) -> Arc<Handling> {
        let mut root = Handling::new("");
        root.children = self.handlings.clone();
        root.label = self.label.clone();
        Arc::new(root)
    }

    /// The first top-level handling for `local_name`.
    pub fn top_level_handling(&self, local_name: &str) -> Option<&Arc<Handling>> {
        self.handlings.iter().find(|h| h.target == local_name)
    }

    /// Depth-first walk of the whole forest in pre-order.
    pub fn walk(&self) -> Vec<&Handling> {
        fn visit<'a>(handling: &'a Handling, out: &mut Vec<&'a Handling>) {
            out.push(handling);
            for child in &handling.children {
                visit(child, out);
            }
        }

        let mut out = Vec::new();
        for handling in &self.handlings {
            visit(handling, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new("urn:a")
            .with_additional_namespace("urn:b")
            .with_label("top")
            .with_handling(Handling::new("A").with_child(Handling::new("B")))
            .with_handling(Handling::new("C"))
    }

    #[test]
    fn covers_primary_and_additional() {
        let s = sample();
        assert!(s.covers("urn:a"));
        assert!(s.covers("urn:b"));
        assert!(!s.covers("urn:c"));
    }

    #[test]
    fn root_handling_wraps_forest() {
        let s = sample();
        let root = s.root_handling();
        assert_eq!(root.target, "");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.label.as_deref(), Some("top"));
        assert_eq!(root.path_to_label("top").unwrap().len(), 1);
    }

    #[test]
    fn walk_is_preorder() {
        let s = sample();
        let names: Vec<&str> = s.walk().iter().map(|h| h.target.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn top_level_lookup() {
        let s = sample();
        assert!(s.top_level_handling("A").is_some());
        assert!(s.top_level_handling("B").is_none());
    }
}
