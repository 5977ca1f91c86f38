//! Whole-document merging.

use std::sync::Arc;

use tracing::debug;
use xmerge_dom::{parse_str, to_xml_string, Attribute, Element};
use xmerge_schema::SchemaProvider;
use xmerge_types::{ConflictPolicy, Handling};

use crate::config::MergeConfig;
use crate::element::ElementMerger;
use crate::error::{MergeError, MergeResult};
use crate::scope::Scope;
use crate::traits::ForeignMerger;

/// Namespace of the `xsi:schemaLocation` attribute.
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

const SCHEMA_LOCATION: &str = "schemaLocation";

/// Merges whole documents: picks the root rule from the root namespace's
/// schema and runs an [`ElementMerger`] over the pair.
///
/// Also serves as the [`ForeignMerger`] of the element mergers it creates,
/// so subtrees in other namespaces are merged under their own schemas.
pub struct DocumentMerger {
    provider: Arc<dyn SchemaProvider>,
    config: MergeConfig,
}

impl DocumentMerger {
    /// A merger with the default configuration.
    pub fn new(provider: Arc<dyn SchemaProvider>) -> Self {
        Self::with_config(provider, MergeConfig::default())
    }

    pub fn with_config(provider: Arc<dyn SchemaProvider>, config: MergeConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn SchemaProvider> {
        &self.provider
    }

    /// Merge `patch` into `base` under `policy`.
    pub fn merge(
        &self,
        base: &Element,
        patch: &Element,
        policy: ConflictPolicy,
    ) -> MergeResult<Element> {
        self.merge_at(base, patch, policy, 0)
    }

    /// Merge under the configured default policy.
    pub fn merge_default(&self, base: &Element, patch: &Element) -> MergeResult<Element> {
        self.merge(base, patch, self.config.policy)
    }

    /// Read both documents, merge them and serialize the result.
    pub fn merge_str(
        &self,
        base_xml: &str,
        patch_xml: &str,
        policy: ConflictPolicy,
    ) -> MergeResult<String> {
        let base = parse_str(base_xml)?;
        let patch = parse_str(patch_xml)?;
        let merged = self.merge(&base, &patch, policy)?;
        Ok(to_xml_string(&merged))
    }

    /// The handling governing a document root.
    ///
    /// A root schema governs the root itself; otherwise the first top-level
    /// handling for the root's name is used, falling back to a handling
    /// built from the namespace's default criterion.
    pub fn root_handling(&self, root: &Element) -> Arc<Handling> {
        let schema = self.provider.resolve_schema(&root.namespace);
        if schema.is_root {
            let mut handling = Handling::clone(&schema.root_handling());
            handling.target = root.name.clone();
            return Arc::new(handling);
        }
        if let Some(handling) = schema.top_level_handling(&root.name) {
            return Arc::clone(handling);
        }
        debug!(root = %root.name, namespace = %root.namespace, "no root handling, using default");
        let criterion = self.provider.default_criterion(&root.namespace);
        Arc::new(Handling::new(root.name.as_str()).with_criterion(criterion))
    }

    fn merge_at(
        &self,
        base: &Element,
        patch: &Element,
        policy: ConflictPolicy,
        depth: usize,
    ) -> MergeResult<Element> {
        if depth > self.config.max_depth {
            return Err(MergeError::DepthExceeded(self.config.max_depth));
        }
        if base.namespace != patch.namespace {
            return Err(MergeError::NamespaceMismatch {
                base: base.namespace.clone(),
                patch: patch.namespace.clone(),
            });
        }

        let handling = self.root_handling(base);
        debug!(
            root = %base.qualified_name(),
            namespace = %base.namespace,
            %policy,
            depth,
            "merging document"
        );
        let merger = ElementMerger::new(
            handling,
            &Scope::new(),
            &base.namespace,
            self.provider.as_ref(),
            self,
            &self.config,
        )?
        .at_depth(depth);
        let mut merged = merger.merge(base, patch, policy)?;

        if self.config.merge_schema_locations {
            if let Some(value) = merged_schema_location(base, patch, policy) {
                let prefix = base
                    .attribute_ns(SCHEMA_LOCATION, XSI_NAMESPACE)
                    .or_else(|| patch.attribute_ns(SCHEMA_LOCATION, XSI_NAMESPACE))
                    .and_then(|a| a.prefix.clone())
                    .unwrap_or_else(|| "xsi".to_string());
                merged.set_attribute(Attribute::qualified(prefix, XSI_NAMESPACE, SCHEMA_LOCATION, value));
            }
        }
        Ok(merged)
    }
}

impl ForeignMerger for DocumentMerger {
    fn merge_foreign(
        &self,
        base: &Element,
        patch: &Element,
        policy: ConflictPolicy,
        depth: usize,
    ) -> MergeResult<Element> {
        self.merge_at(base, patch, policy, depth)
    }
}

// ---------------------------------------------------------------------------
// xsi:schemaLocation
// ---------------------------------------------------------------------------

fn schema_locations(element: &Element) -> Vec<(String, String)> {
    let Some(attribute) = element.attribute_ns(SCHEMA_LOCATION, XSI_NAMESPACE) else {
        return Vec::new();
    };
    let tokens: Vec<&str> = attribute.value.split_whitespace().collect();
    tokens
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect()
}

/// The reconciled location list, or `None` when neither root has one.
///
/// Namespaces keep base order with patch-only ones appended; for a shared
/// namespace the preferred side's location wins.
fn merged_schema_location(
    base: &Element,
    patch: &Element,
    policy: ConflictPolicy,
) -> Option<String> {
    let mut pairs = schema_locations(base);
    let patch_pairs = schema_locations(patch);
    if pairs.is_empty() && patch_pairs.is_empty() {
        return None;
    }

    for (namespace, location) in patch_pairs {
        match pairs.iter_mut().find(|(ns, _)| *ns == namespace) {
            Some(existing) => {
                if !policy.is_base_preferring() {
                    existing.1 = location;
                }
            }
            None => pairs.push((namespace, location)),
        }
    }

    Some(
        pairs
            .iter()
            .map(|(ns, location)| format!("{ns} {location}"))
            .collect::<Vec<_>>()
            .join(" "),
    )
}
