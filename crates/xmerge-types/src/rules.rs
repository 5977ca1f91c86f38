//! Rule-tree value types: criteria, attribute rules, and handlings.
//!
//! These are loaded once and shared read-only for the duration of a merge.
//! Child handlings are held behind [`Arc`] so scopes can be assembled from
//! several rule trees without copying them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Path query that always evaluates to `true`.
pub const ALWAYS_TRUE: &str = "true()";

/// Query used when a namespace declares no default criterion.
const DEFAULT_QUERY: &str = "./*";

fn always_true() -> String {
    ALWAYS_TRUE.to_string()
}

/// A declarative equivalence rule between two candidate elements.
///
/// The query is evaluated against both elements; the two result sequences
/// are compared positionally when `ordered` is set, and as multisets
/// otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Criterion {
    /// Path query evaluated relative to the candidate element.
    #[serde(alias = "xpath")]
    pub query: String,
    /// Positional (`true`) or set-style (`false`) comparison.
    #[serde(default)]
    pub ordered: bool,
}

impl Criterion {
    /// An unordered criterion for the given query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ordered: false,
        }
    }

    /// An ordered criterion for the given query.
    pub fn ordered(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ordered: true,
        }
    }

    /// A criterion every pair of same-named elements satisfies.
    pub fn always() -> Self {
        Self::new(ALWAYS_TRUE)
    }
}

impl Default for Criterion {
    /// Compare the child elements of both candidates, unordered.
    fn default() -> Self {
        Self::new(DEFAULT_QUERY)
    }
}

/// Merge policy for one attribute name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeRule {
    /// Local name of the attribute this rule applies to.
    #[serde(rename = "for")]
    pub name: String,
    /// Whether both values may be concatenated under an attaching policy.
    #[serde(default)]
    pub attachable: bool,
    /// Inserted between the two values when attaching.
    #[serde(default)]
    pub separator: String,
}

impl AttributeRule {
    /// A non-attachable rule for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// An attachable rule for `name` joined with `separator`.
    pub fn attachable(name: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attachable: true,
            separator: separator.into(),
        }
    }
}

/// Import of another rule scope, rooted at a labelled handling.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeRef {
    /// Label of the handling whose scope is imported.
    pub label: String,
    /// Namespace of the schema holding the label; the current one if unset.
    #[serde(default)]
    pub namespace: Option<String>,
}

/// A node in a rule tree: how to merge elements with one local name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handling {
    /// Local name of the elements this handling governs.
    #[serde(rename = "for")]
    pub target: String,
    /// Boolean path predicate selecting which `target` elements apply.
    #[serde(default = "always_true", alias = "where")]
    pub guard: String,
    /// At most one merged child may carry this handling's target name.
    #[serde(default)]
    pub unique: bool,
    /// Text of both sides may be attached under an attaching policy.
    #[serde(default)]
    pub attachable_text: bool,
    /// Equivalence criteria, all of which must hold for a match.
    #[serde(default, rename = "criterion")]
    pub criteria: Vec<Criterion>,
    /// Attribute merge rules.
    #[serde(default, rename = "attribute")]
    pub attributes: Vec<AttributeRule>,
    /// Handlings visible to this element's children.
    #[serde(default, rename = "handling")]
    pub children: Vec<Arc<Handling>>,
    /// Makes this node referenceable from a [`ScopeRef`].
    #[serde(default)]
    pub label: Option<String>,
    /// Scope imported in addition to `children`.
    #[serde(default)]
    pub scope_ref: Option<ScopeRef>,
}

impl Handling {
    /// A handling for `target` with no criteria, rules, or children.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            guard: always_true(),
            unique: false,
            attachable_text: false,
            criteria: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
            label: None,
            scope_ref: None,
        }
    }

    /// Replace the guard predicate.
    pub fn with_guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = guard.into();
        self
    }

    /// Mark the target as unique among its siblings.
    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Allow text attachment.
    pub fn with_attachable_text(mut self, attachable: bool) -> Self {
        self.attachable_text = attachable;
        self
    }

    /// Append a criterion.
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Append an attribute rule.
    pub fn with_attribute(mut self, rule: AttributeRule) -> Self {
        self.attributes.push(rule);
        self
    }

    /// Append a child handling.
    pub fn with_child(mut self, child: Handling) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Import the scope rooted at `label` in `namespace` (current if `None`).
    pub fn with_scope_ref(mut self, label: impl Into<String>, namespace: Option<&str>) -> Self {
        self.scope_ref = Some(ScopeRef {
            label: label.into(),
            namespace: namespace.map(str::to_string),
        });
        self
    }

    /// The attribute rule for `name`, if one is declared.
    pub fn attribute_rule(&self, name: &str) -> Option<&AttributeRule> {
        self.attributes.iter().find(|rule| rule.name == name)
    }

    /// Whether `other` would supersede this handling in a scope.
    ///
    /// Two handlings overlap when they govern the same target under the
    /// same guard.
    pub fn overlaps(&self, other: &Handling) -> bool {
        self.target == other.target && self.guard == other.guard
    }

    /// The namespace named by the scope reference, if any.
    pub fn referenced_namespace(&self) -> Option<&str> {
        self.scope_ref.as_ref().and_then(|r| r.namespace.as_deref())
    }

    /// Depth-first search for the node labelled `label`.
    ///
    /// Returns the path from `self` down to that node, both included, or
    /// `None` when no node in this tree carries the label.
    pub fn path_to_label(self: &Arc<Self>, label: &str) -> Option<Vec<Arc<Handling>>> {
        if self.label.as_deref() == Some(label) {
            return Some(vec![Arc::clone(self)]);
        }
        for child in &self.children {
            if let Some(mut path) = child.path_to_label(label) {
                path.insert(0, Arc::clone(self));
                return Some(path);
            }
        }
        None
    }
}
