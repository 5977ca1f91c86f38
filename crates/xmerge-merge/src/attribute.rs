//! Attribute value merging.

use tracing::debug;
use xmerge_dom::{Attribute, Element};
use xmerge_types::{AttributeRule, ConflictPolicy, Handling};

/// Merge one attribute's two values.
///
/// A missing side yields the other value untouched. Otherwise the values
/// are joined base-then-patch with the rule's separator when both the
/// policy and the rule allow attaching, and the preferred side's value is
/// returned when they do not.
pub fn merge_attribute(
    name: &str,
    base: Option<&str>,
    patch: Option<&str>,
    rule: &AttributeRule,
    policy: ConflictPolicy,
) -> String {
    match (base, patch) {
        (None, None) => String::new(),
        (Some(value), None) | (None, Some(value)) => value.to_string(),
        (Some(base), Some(patch)) => {
            if policy.is_attachable() && rule.attachable {
                debug!(attribute = name, "attaching attribute values");
                format!("{base}{}{patch}", rule.separator)
            } else if policy.is_base_preferring() {
                base.to_string()
            } else {
                patch.to_string()
            }
        }
    }
}

/// Merge the attributes of `base` and `patch` into `out`.
///
/// Attributes are identified by local name and namespace. Base attributes
/// keep their order; attributes only the patch carries follow in patch
/// order. Rules are looked up by local name in `handling`; attributes
/// without a rule never attach.
pub(crate) fn merge_attributes(
    handling: &Handling,
    base: &Element,
    patch: &Element,
    policy: ConflictPolicy,
    out: &mut Element,
) {
    let patch_only = patch
        .attributes
        .iter()
        .filter(|p| base.attribute_ns(&p.name, &p.namespace).is_none());

    for attribute in base.attributes.iter().chain(patch_only) {
        let base_value = base
            .attribute_ns(&attribute.name, &attribute.namespace)
            .map(|a| a.value.as_str());
        let patch_value = patch
            .attribute_ns(&attribute.name, &attribute.namespace)
            .map(|a| a.value.as_str());

        let default_rule;
        let rule = match handling.attribute_rule(&attribute.name) {
            Some(rule) => rule,
            None => {
                default_rule = AttributeRule::new(attribute.name.as_str());
                &default_rule
            }
        };

        let value = merge_attribute(&attribute.name, base_value, patch_value, rule, policy);
        out.attributes.push(Attribute {
            value,
            ..attribute.clone()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn attach_rule() -> AttributeRule {
        AttributeRule::attachable("a", ";")
    }

    #[test]
    fn attaches_under_attaching_policy() {
        let merged = merge_attribute(
            "a",
            Some("abc"),
            Some("def"),
            &attach_rule(),
            ConflictPolicy::PatchAttachOrOverwrite,
        );
        assert_eq!(merged, "abc;def");
    }

    #[test]
    fn attaching_is_always_base_then_patch() {
        let merged = merge_attribute(
            "a",
            Some("abc"),
            Some("def"),
            &attach_rule(),
            ConflictPolicy::BaseAttachOrOverwrite,
        );
        assert_eq!(merged, "abc;def");
    }

    #[test]
    fn overwrite_follows_preference() {
        let rule = AttributeRule::new("a");
        assert_eq!(
            merge_attribute("a", Some("abc"), Some("def"), &rule, ConflictPolicy::PatchOverwrite),
            "def"
        );
        assert_eq!(
            merge_attribute("a", Some("abc"), Some("def"), &rule, ConflictPolicy::BaseOverwrite),
            "abc"
        );
    }

    #[test]
    fn non_attachable_rule_overrides_attaching_policy() {
        let rule = AttributeRule::new("a");
        assert_eq!(
            merge_attribute(
                "a",
                Some("abc"),
                Some("def"),
                &rule,
                ConflictPolicy::BaseAttachOrOverwrite
            ),
            "abc"
        );
    }

    #[test]
    fn attribute_union_keeps_base_order() {
        let handling = Handling::new("A").with_attribute(AttributeRule::attachable("class", " "));
        let base = Element::new("A")
            .with_attribute("id", "1")
            .with_attribute("class", "x");
        let patch = Element::new("A")
            .with_attribute("new", "n")
            .with_attribute("class", "y")
            .with_attribute("id", "2");
        let mut out = Element::new("A");
        merge_attributes(
            &handling,
            &base,
            &patch,
            ConflictPolicy::PatchAttachOrOverwrite,
            &mut out,
        );
        let pairs: Vec<(&str, &str)> = out
            .attributes
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("id", "2"), ("class", "x y"), ("new", "n")]);
    }

    #[test]
    fn namespaced_attributes_are_distinct() {
        let handling = Handling::new("A");
        let mut base = Element::new("A").with_attribute("k", "plain");
        base.set_attribute(Attribute::qualified("o", "urn:o", "k", "qualified"));
        let patch = Element::new("A").with_attribute("k", "patched");
        let mut out = Element::new("A");
        merge_attributes(&handling, &base, &patch, ConflictPolicy::PatchOverwrite, &mut out);
        assert_eq!(out.attribute("k").unwrap().value, "patched");
        assert_eq!(out.attribute_ns("k", "urn:o").unwrap().value, "qualified");
    }

    fn any_policy() -> impl Strategy<Value = ConflictPolicy> {
        prop::sample::select(ConflictPolicy::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn missing_side_passes_other_through(
            value in ".*",
            attachable in any::<bool>(),
            separator in ".{0,3}",
            policy in any_policy(),
        ) {
            let rule = AttributeRule { name: "a".into(), attachable, separator };
            prop_assert_eq!(merge_attribute("a", None, Some(value.as_str()), &rule, policy), value.clone());
            prop_assert_eq!(merge_attribute("a", Some(value.as_str()), None, &rule, policy), value);
        }
    }
}
