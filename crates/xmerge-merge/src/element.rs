//! The recursive element merger.
//!
//! One [`ElementMerger`] is bound to a handling and the scope built from it.
//! Merging a base/patch pair produces a fresh output element: the two input
//! content lists are never mutated. Instead a `taken` flag per patch item
//! records which items have been consumed, and the output sequence is
//! assembled from the base items, the merged matches and the leftover patch
//! items.

use std::sync::Arc;

use tracing::debug;
use xmerge_dom::{normalize_whitespace, Content, Element};
use xmerge_schema::SchemaProvider;
use xmerge_types::{ConflictPolicy, Handling};

use crate::attribute::merge_attributes;
use crate::comparator::ElementComparator;
use crate::config::MergeConfig;
use crate::error::{MergeError, MergeResult};
use crate::scope::{resolve_scope, Scope};
use crate::traits::ForeignMerger;

/// How the children of one element pair are aligned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// The base has no child elements; patch content is appended as is.
    EmptyBase,
    /// Patch content ahead of the anchor element leads the output.
    PatchLed { anchor: usize },
    /// The base order leads the output.
    BaseLed,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::EmptyBase => "empty-base",
            Phase::PatchLed { .. } => "patch-led",
            Phase::BaseLed => "base-led",
        }
    }
}

/// Which text children take part in a merge.
#[derive(Clone, Copy, Debug)]
struct TextInclusion {
    base: bool,
    patch: bool,
}

impl TextInclusion {
    fn new(policy: ConflictPolicy, handling: &Handling) -> Self {
        let attach = policy.is_attachable() && handling.attachable_text;
        Self {
            base: policy.is_base_preferring() || attach,
            patch: !policy.is_base_preferring() || attach,
        }
    }
}

/// Merges a base/patch element pair under one handling.
pub struct ElementMerger<'a> {
    handling: Arc<Handling>,
    scope: Scope,
    provider: &'a dyn SchemaProvider,
    foreign: &'a dyn ForeignMerger,
    config: &'a MergeConfig,
    depth: usize,
}

impl<'a> ElementMerger<'a> {
    /// Bind a merger to `handling`, deriving its scope from the parent
    /// scope and any scope reference the handling carries.
    ///
    /// `namespace` is the namespace of the elements the handling governs.
    pub fn new(
        handling: Arc<Handling>,
        parent: &Scope,
        namespace: &str,
        provider: &'a dyn SchemaProvider,
        foreign: &'a dyn ForeignMerger,
        config: &'a MergeConfig,
    ) -> MergeResult<Self> {
        let scope = resolve_scope(parent, &handling, namespace, provider, config.scope_refs)?;
        Ok(Self::with_scope(handling, scope, provider, foreign, config))
    }

    /// Bind a merger to `handling` with a scope built by the caller.
    pub fn with_scope(
        handling: Arc<Handling>,
        scope: Scope,
        provider: &'a dyn SchemaProvider,
        foreign: &'a dyn ForeignMerger,
        config: &'a MergeConfig,
    ) -> Self {
        Self {
            handling,
            scope,
            provider,
            foreign,
            config,
            depth: 0,
        }
    }

    /// Place this merger `depth` levels below the outermost merge.
    pub fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn handling(&self) -> &Arc<Handling> {
        &self.handling
    }

    /// The handlings visible to the children of the bound element.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Merge `patch` into `base`.
    ///
    /// The caller guarantees both elements share a local name. Fails when a
    /// guard cannot be evaluated, when a unique handling ends up with more
    /// than one output child, or when the nesting bound is exceeded.
    pub fn merge(
        &self,
        base: &Element,
        patch: &Element,
        policy: ConflictPolicy,
    ) -> MergeResult<Element> {
        if self.depth > self.config.max_depth {
            return Err(MergeError::DepthExceeded(self.config.max_depth));
        }

        let text = TextInclusion::new(policy, &self.handling);
        let mut out = base.shallow_copy();
        merge_attributes(&self.handling, base, patch, policy, &mut out);

        let base_items = retained(base, text.base);
        let patch_items = retained(patch, text.patch);

        let phase = classify(base, &patch_items);
        debug!(
            element = %base.qualified_name(),
            phase = phase.as_str(),
            depth = self.depth,
            "merging element"
        );

        if phase == Phase::EmptyBase {
            out.content = base_items
                .into_iter()
                .chain(patch_items)
                .cloned()
                .collect();
            return Ok(out);
        }

        let mut taken = vec![false; patch_items.len()];
        let mut consulted: Vec<Arc<Handling>> = Vec::new();
        let mut merged: Vec<Content> = Vec::with_capacity(base_items.len() + patch_items.len());

        for item in &base_items {
            match item {
                Content::Text(value) => match match_text(value, &patch_items, &taken) {
                    Some(j) => {
                        taken[j] = true;
                        merged.push(Content::Text(normalize_whitespace(value)));
                        relocate_following_texts(j, &patch_items, &mut taken, text.patch, &mut merged);
                    }
                    None => merged.push((*item).clone()),
                },
                Content::Element(element) => {
                    let matched = self.match_element(
                        element,
                        &base.namespace,
                        &patch_items,
                        &mut taken,
                        &mut consulted,
                        policy,
                    )?;
                    match matched {
                        Some((j, result)) => {
                            merged.push(Content::Element(result));
                            relocate_following_texts(
                                j,
                                &patch_items,
                                &mut taken,
                                text.patch,
                                &mut merged,
                            );
                        }
                        None => merged.push((*item).clone()),
                    }
                }
            }
        }

        if let Phase::PatchLed { anchor } = phase {
            let mut leading = Vec::new();
            for j in 0..anchor {
                if !taken[j] {
                    taken[j] = true;
                    leading.push(patch_items[j].clone());
                }
            }
            merged.splice(0..0, leading);
        }

        splice_unmatched(&patch_items, &taken, &mut merged);
        check_uniqueness(&consulted, &merged)?;

        out.content = merged;
        Ok(out)
    }

    /// Find and merge the first untaken patch element matching `element`.
    fn match_element(
        &self,
        element: &Element,
        own_namespace: &str,
        patch_items: &[&Content],
        taken: &mut [bool],
        consulted: &mut Vec<Arc<Handling>>,
        policy: ConflictPolicy,
    ) -> MergeResult<Option<(usize, Element)>> {
        let foreign = self.is_foreign(&element.namespace, own_namespace);
        let mut handling: Option<Arc<Handling>> = None;

        for (j, candidate) in patch_items.iter().enumerate() {
            if taken[j] {
                continue;
            }
            let Content::Element(other) = candidate else {
                continue;
            };
            if other.namespace != element.namespace {
                continue;
            }

            if foreign {
                taken[j] = true;
                debug!(
                    element = %element.qualified_name(),
                    namespace = %element.namespace,
                    "delegating foreign element"
                );
                let result = self
                    .foreign
                    .merge_foreign(element, other, policy, self.depth + 1)?;
                return Ok(Some((j, result)));
            }

            let rule = match &handling {
                Some(rule) => Arc::clone(rule),
                None => {
                    let rule = self.resolve_handling(element, consulted)?;
                    handling = Some(Arc::clone(&rule));
                    rule
                }
            };

            let comparator = ElementComparator::new(&rule.criteria, self.provider)
                .with_max_depth(self.config.max_depth);
            if !comparator.matches(element, other) {
                continue;
            }

            taken[j] = true;
            debug!(element = %element.qualified_name(), position = j, "matched patch element");
            let nested = ElementMerger::new(
                Arc::clone(&rule),
                &self.scope,
                &element.namespace,
                self.provider,
                self.foreign,
                self.config,
            )?
            .at_depth(self.depth + 1);
            return Ok(Some((j, nested.merge(element, other, policy)?)));
        }
        Ok(None)
    }

    /// The handling governing `element`, recording unique handlings in
    /// `consulted`.
    fn resolve_handling(
        &self,
        element: &Element,
        consulted: &mut Vec<Arc<Handling>>,
    ) -> MergeResult<Arc<Handling>> {
        let handling = match self.scope.select(element, self.provider)? {
            Some(handling) => handling,
            None => {
                debug!(element = %element.qualified_name(), "no handling in scope, using default");
                let criterion = self.provider.default_criterion(&element.namespace);
                Arc::new(Handling::new(element.name.as_str()).with_criterion(criterion))
            }
        };
        if handling.unique && !consulted.iter().any(|h| Arc::ptr_eq(h, &handling)) {
            consulted.push(Arc::clone(&handling));
        }
        Ok(handling)
    }

    /// Elements outside the merged element's namespace and the handling's
    /// referenced namespace belong to another schema. They pair with the
    /// first untaken patch element of the same namespace, whatever its name.
    fn is_foreign(&self, namespace: &str, own_namespace: &str) -> bool {
        namespace != own_namespace && self.handling.referenced_namespace() != Some(namespace)
    }
}

// ---------------------------------------------------------------------------
// Alignment helpers
// ---------------------------------------------------------------------------

fn retained(element: &Element, keep_text: bool) -> Vec<&Content> {
    element
        .content
        .iter()
        .filter(|c| keep_text || !c.is_text())
        .collect()
}

/// Choose the alignment phase from the base's first child element and its
/// first same-named occurrence in the patch.
fn classify(base: &Element, patch_items: &[&Content]) -> Phase {
    let Some(first) = base.child_elements().next() else {
        return Phase::EmptyBase;
    };
    let occurrence = patch_items.iter().position(|c| {
        matches!(c, Content::Element(e) if e.name == first.name && e.namespace == first.namespace)
    });
    match occurrence {
        Some(anchor) if patch_items[..anchor].iter().any(|c| !c.is_text()) => {
            Phase::PatchLed { anchor }
        }
        _ => Phase::BaseLed,
    }
}

fn match_text(value: &str, patch_items: &[&Content], taken: &[bool]) -> Option<usize> {
    let wanted = normalize_whitespace(value);
    patch_items.iter().enumerate().position(|(j, c)| {
        !taken[j] && matches!(c, Content::Text(t) if normalize_whitespace(t) == wanted)
    })
}

/// Move the untaken texts directly following patch item `j` to the output.
fn relocate_following_texts(
    j: usize,
    patch_items: &[&Content],
    taken: &mut [bool],
    use_patch_text: bool,
    merged: &mut Vec<Content>,
) {
    if !use_patch_text {
        return;
    }
    for k in j + 1..patch_items.len() {
        if taken[k] {
            continue;
        }
        if !patch_items[k].is_text() {
            break;
        }
        taken[k] = true;
        merged.push(patch_items[k].clone());
    }
}

/// Insert every untaken patch element, with the untaken texts following
/// it, after the first run of same-named elements in the output. Whatever
/// finds no run is appended in patch order.
fn splice_unmatched(patch_items: &[&Content], taken: &[bool], merged: &mut Vec<Content>) {
    let mut tail = Vec::new();
    let mut j = 0;
    while j < patch_items.len() {
        if taken[j] {
            j += 1;
            continue;
        }
        let Content::Element(element) = patch_items[j] else {
            tail.push(patch_items[j].clone());
            j += 1;
            continue;
        };

        let mut chunk = vec![patch_items[j].clone()];
        let mut k = j + 1;
        while k < patch_items.len() {
            if !taken[k] {
                if !patch_items[k].is_text() {
                    break;
                }
                chunk.push(patch_items[k].clone());
            }
            k += 1;
        }

        match run_end(merged, &element.name) {
            Some(at) => {
                merged.splice(at..at, chunk);
            }
            None => tail.extend(chunk),
        }
        j = k;
    }
    merged.extend(tail);
}

/// Position just past the first run of elements named `name`, including
/// the texts trailing its last element. Texts between run members do not
/// break the run.
fn run_end(content: &[Content], name: &str) -> Option<usize> {
    let same = |c: &Content| matches!(c, Content::Element(e) if e.name == name);
    let start = content.iter().position(same)?;

    let mut last = start;
    for (i, item) in content.iter().enumerate().skip(start + 1) {
        if same(item) {
            last = i;
        } else if !item.is_text() {
            break;
        }
    }

    let mut at = last + 1;
    while content.get(at).is_some_and(Content::is_text) {
        at += 1;
    }
    Some(at)
}

fn check_uniqueness(consulted: &[Arc<Handling>], merged: &[Content]) -> MergeResult<()> {
    for handling in consulted {
        let count = merged
            .iter()
            .filter_map(Content::as_element)
            .filter(|e| e.name == handling.target)
            .count();
        if count > 1 {
            return Err(MergeError::UniquenessViolation {
                tag: handling.target.clone(),
                count,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use xmerge_dom::{parse_str, to_xml_string};
    use xmerge_schema::SchemaRegistry;
    use xmerge_types::{AttributeRule, Criterion};

    /// Records delegations and answers with the patch side.
    #[derive(Default)]
    struct RecordingForeign {
        calls: Cell<usize>,
    }

    impl ForeignMerger for RecordingForeign {
        fn merge_foreign(
            &self,
            _base: &Element,
            patch: &Element,
            _policy: ConflictPolicy,
            _depth: usize,
        ) -> MergeResult<Element> {
            self.calls.set(self.calls.get() + 1);
            Ok(patch.clone())
        }
    }

    /// Helper: parse a fixture.
    fn el(xml: &str) -> Element {
        parse_str(xml).unwrap()
    }

    /// Helper: merge two documents under `handling` and serialize the result.
    fn run(
        handling: Handling,
        config: &MergeConfig,
        base: &str,
        patch: &str,
        policy: ConflictPolicy,
    ) -> MergeResult<String> {
        let registry = SchemaRegistry::new();
        let foreign = RecordingForeign::default();
        let merger = ElementMerger::new(
            Arc::new(handling),
            &Scope::new(),
            "",
            &registry,
            &foreign,
            config,
        )?;
        merger
            .merge(&el(base), &el(patch), policy)
            .map(|e| to_xml_string(&e))
    }

    /// Helper: merge with a recording foreign merger, returning the merged
    /// element and the number of delegations.
    fn run_foreign(base: &str, patch: &str) -> (Element, usize) {
        let registry = SchemaRegistry::new();
        let foreign = RecordingForeign::default();
        let config = MergeConfig::default();
        let merger = ElementMerger::new(
            Arc::new(Handling::new("A")),
            &Scope::new(),
            "",
            &registry,
            &foreign,
            &config,
        )
        .unwrap();
        let merged = merger
            .merge(&el(base), &el(patch), ConflictPolicy::PatchOverwrite)
            .unwrap();
        (merged, foreign.calls.get())
    }

    /// Helper: `A` with `B` keyed by `@id` and a unique, always-matching `C`.
    fn scenario_handling() -> Handling {
        Handling::new("A")
            .with_child(Handling::new("B").with_criterion(Criterion::ordered("@id")))
            .with_child(
                Handling::new("C")
                    .with_criterion(Criterion::always())
                    .with_unique(true),
            )
    }

    /// Helper: `A` with `B` keyed by `@id`.
    fn keyed_b() -> Handling {
        Handling::new("A").with_child(Handling::new("B").with_criterion(Criterion::ordered("@id")))
    }

    // -----------------------------------------------------------------------
    // 1. Matched, unmatched and overwritten children
    // -----------------------------------------------------------------------
    #[test]
    fn end_to_end_scenario() {
        let merged = run(
            scenario_handling(),
            &MergeConfig::default(),
            r#"<A><B id="1"/><B id="2"/><C>old</C></A>"#,
            r#"<A><B id="2"/><B id="3"/><C>new</C></A>"#,
            ConflictPolicy::PatchOverwrite,
        )
        .unwrap();
        assert_eq!(merged, r#"<A><B id="1"/><B id="2"/><B id="3"/><C>new</C></A>"#);
    }

    #[test]
    fn base_preferring_keeps_base_text() {
        let merged = run(
            scenario_handling(),
            &MergeConfig::default(),
            r#"<A><B id="1"/><C>old</C></A>"#,
            r#"<A><B id="1"/><C>new</C></A>"#,
            ConflictPolicy::BaseOverwrite,
        )
        .unwrap();
        assert_eq!(merged, r#"<A><B id="1"/><C>old</C></A>"#);
    }

    // -----------------------------------------------------------------------
    // 2. Empty base takes the patch content as is
    // -----------------------------------------------------------------------
    #[test]
    fn empty_base_takes_patch_content_in_order() {
        for policy in ConflictPolicy::ALL {
            let merged = run(
                Handling::new("A"),
                &MergeConfig::default(),
                "<A/>",
                "<A><B/><C/></A>",
                policy,
            )
            .unwrap();
            assert_eq!(merged, "<A><B/><C/></A>", "policy {policy}");
        }
    }

    // -----------------------------------------------------------------------
    // 3. Unique handlings
    // -----------------------------------------------------------------------
    #[test]
    fn unmatched_unique_elements_violate_uniqueness() {
        let handling = Handling::new("A").with_child(
            Handling::new("B")
                .with_criterion(Criterion::ordered("@id"))
                .with_unique(true),
        );
        let err = run(
            handling,
            &MergeConfig::default(),
            r#"<A><B id="1"/><B id="2"/></A>"#,
            r#"<A><B id="3"/><B id="4"/></A>"#,
            ConflictPolicy::PatchOverwrite,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MergeError::UniquenessViolation { ref tag, count: 4 } if tag == "B"
        ));
    }

    // -----------------------------------------------------------------------
    // 4. Patch-led alignment
    // -----------------------------------------------------------------------
    #[test]
    fn patch_led_prefix_precedes_base_content() {
        let merged = run(
            keyed_b(),
            &MergeConfig::default(),
            r#"<A><B id="1"/></A>"#,
            r#"<A><X/><B id="1"/><Y/></A>"#,
            ConflictPolicy::PatchOverwrite,
        )
        .unwrap();
        assert_eq!(merged, r#"<A><X/><B id="1"/><Y/></A>"#);
    }

    #[test]
    fn patch_led_prefix_items_can_still_match() {
        let handling =
            Handling::new("A").with_child(Handling::new("X").with_criterion(Criterion::ordered("@k")));
        let merged = run(
            handling,
            &MergeConfig::default(),
            r#"<A><B/><X k="1"/></A>"#,
            r#"<A><X k="1"/><B/></A>"#,
            ConflictPolicy::PatchOverwrite,
        )
        .unwrap();
        // X is matched before the prefix is taken, so it is not duplicated.
        assert_eq!(merged, r#"<A><B/><X k="1"/></A>"#);
    }

    // -----------------------------------------------------------------------
    // 5. Unmatched patch content placement
    // -----------------------------------------------------------------------
    #[test]
    fn unmatched_elements_join_their_run() {
        let merged = run(
            keyed_b(),
            &MergeConfig::default(),
            r#"<A><B id="1"/><C/><B id="2"/></A>"#,
            r#"<A><B id="9"/><D/></A>"#,
            ConflictPolicy::PatchOverwrite,
        )
        .unwrap();
        assert_eq!(merged, r#"<A><B id="1"/><B id="9"/><C/><B id="2"/><D/></A>"#);
    }

    #[test]
    fn texts_following_a_match_are_relocated() {
        let merged = run(
            keyed_b(),
            &MergeConfig::default(),
            r#"<A><B id="1"/><B id="2"/></A>"#,
            r#"<A><B id="1"/>after one<B id="2"/></A>"#,
            ConflictPolicy::PatchOverwrite,
        )
        .unwrap();
        assert_eq!(merged, r#"<A><B id="1"/>after one<B id="2"/></A>"#);
    }

    // -----------------------------------------------------------------------
    // 6. Text and attribute conflicts
    // -----------------------------------------------------------------------
    #[test]
    fn attachable_text_keeps_both_sides() {
        let handling = Handling::new("A").with_attachable_text(true);
        let merged = run(
            handling,
            &MergeConfig::default(),
            "<A>hello<B/></A>",
            "<A>world<B/></A>",
            ConflictPolicy::PatchAttachOrOverwrite,
        )
        .unwrap();
        assert_eq!(merged, "<A>hello<B/>world</A>");
    }

    #[test]
    fn equal_texts_are_matched_and_normalized() {
        let handling = Handling::new("A").with_attachable_text(true);
        let merged = run(
            handling,
            &MergeConfig::default(),
            "<A>  same\n text <B/></A>",
            "<A>same text<B/></A>",
            ConflictPolicy::BaseAttachOrOverwrite,
        )
        .unwrap();
        assert_eq!(merged, "<A>same text<B/></A>");
    }

    #[test]
    fn attributes_follow_handling_rules() {
        let handling = Handling::new("A").with_attribute(AttributeRule::attachable("class", " "));
        let merged = run(
            handling,
            &MergeConfig::default(),
            r#"<A class="x" id="1"/>"#,
            r#"<A class="y" id="2"/>"#,
            ConflictPolicy::PatchAttachOrOverwrite,
        )
        .unwrap();
        assert_eq!(merged, r#"<A class="x y" id="2"/>"#);
    }

    // -----------------------------------------------------------------------
    // 7. Foreign namespaces are delegated
    // -----------------------------------------------------------------------
    #[test]
    fn foreign_elements_are_delegated() {
        let (merged, calls) = run_foreign(
            r#"<A xmlns:o="urn:o"><o:X k="1"/><o:Y/></A>"#,
            r#"<A xmlns:o="urn:o"><o:X k="2"/></A>"#,
        );
        assert_eq!(calls, 1);
        let children: Vec<&Element> = merged.child_elements().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].attribute("k").unwrap().value, "2");
        assert_eq!(children[1].name, "Y");
    }

    #[test]
    fn foreign_elements_pair_regardless_of_name() {
        let (merged, calls) = run_foreign(
            r#"<A xmlns:o="urn:o"><o:X/></A>"#,
            r#"<A xmlns:o="urn:o" xmlns:p="urn:p"><p:X/><o:Y/></A>"#,
        );
        assert_eq!(calls, 1);
        let children: Vec<(&str, &str)> = merged
            .child_elements()
            .map(|e| (e.name.as_str(), e.namespace.as_str()))
            .collect();
        // o:X pairs with o:Y; p:X is in another namespace and stays unmatched.
        assert_eq!(children, vec![("Y", "urn:o"), ("X", "urn:p")]);
    }

    // -----------------------------------------------------------------------
    // 8. Fatal errors
    // -----------------------------------------------------------------------
    #[test]
    fn broken_guard_aborts_merge() {
        let handling = Handling::new("A").with_child(Handling::new("B").with_guard("@id ="));
        let err = run(
            handling,
            &MergeConfig::default(),
            "<A><B/></A>",
            "<A><B/></A>",
            ConflictPolicy::PatchOverwrite,
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::GuardEvaluation { .. }));
    }

    #[test]
    fn nesting_beyond_bound_fails() {
        let config = MergeConfig {
            max_depth: 2,
            ..MergeConfig::default()
        };
        let doc = "<A><A><A><A/></A></A></A>";
        let err = run(Handling::new("A"), &config, doc, doc, ConflictPolicy::PatchOverwrite)
            .unwrap_err();
        assert!(matches!(err, MergeError::DepthExceeded(2)));
    }
}
