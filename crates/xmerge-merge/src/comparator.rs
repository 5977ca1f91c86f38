//! Criterion-driven element equivalence.

use tracing::debug;
use xmerge_dom::Element;
use xmerge_path::{Item, PathError};
use xmerge_schema::SchemaProvider;
use xmerge_types::Criterion;

/// Why a comparison could not be decided; always absorbed as a non-match.
#[derive(Debug, thiserror::Error)]
enum CompareError {
    #[error(transparent)]
    Query(#[from] PathError),
    #[error("nested comparison deeper than {0}")]
    TooDeep(usize),
}

/// Decides whether two elements denote the same thing.
///
/// Elements with different local names never match. Otherwise every
/// criterion must hold: its query is evaluated on both elements and the
/// result sequences must have equal length and pairwise equal items,
/// positionally for ordered criteria and by greedy first-fit claiming
/// otherwise. Two element items are equal when they match under their own
/// deep criteria, resolved through the provider; any other pair is equal
/// when the canonical serializations are.
pub struct ElementComparator<'a> {
    criteria: &'a [Criterion],
    provider: &'a dyn SchemaProvider,
    max_depth: usize,
}

impl<'a> ElementComparator<'a> {
    /// A comparator for `criteria`, with nested lookups through `provider`.
    pub fn new(criteria: &'a [Criterion], provider: &'a dyn SchemaProvider) -> Self {
        Self {
            criteria,
            provider,
            max_depth: 512,
        }
    }

    /// Bound the nesting of deep comparisons.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Whether `a` and `b` match. Evaluation failures count as a mismatch;
    /// a failed nested comparison only falls back to canonical equality.
    pub fn matches(&self, a: &Element, b: &Element) -> bool {
        match self.compare(a, b, 0) {
            Ok(equal) => equal,
            Err(e) => {
                debug!(element = %a.name, error = %e, "comparison failed, treating as mismatch");
                false
            }
        }
    }

    fn compare(&self, a: &Element, b: &Element, depth: usize) -> Result<bool, CompareError> {
        if depth > self.max_depth {
            return Err(CompareError::TooDeep(self.max_depth));
        }
        if a.name != b.name {
            return Ok(false);
        }

        for criterion in self.criteria {
            let query = self.provider.query(&criterion.query)?;
            let left = query.select(a)?;
            let right = query.select(b)?;
            if left.len() != right.len() {
                return Ok(false);
            }

            let holds = if criterion.ordered {
                self.ordered_equal(&left, &right, depth)?
            } else {
                self.unordered_equal(&left, &right, depth)?
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn ordered_equal(
        &self,
        left: &[Item<'_>],
        right: &[Item<'_>],
        depth: usize,
    ) -> Result<bool, CompareError> {
        for (x, y) in left.iter().zip(right) {
            if !self.node_equal(x, y, depth)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn unordered_equal(
        &self,
        left: &[Item<'_>],
        right: &[Item<'_>],
        depth: usize,
    ) -> Result<bool, CompareError> {
        let mut claimed = vec![false; right.len()];
        for x in left {
            for (i, y) in right.iter().enumerate() {
                if !claimed[i] && self.node_equal(x, y, depth)? {
                    claimed[i] = true;
                    break;
                }
            }
        }
        Ok(claimed.iter().all(|c| *c))
    }

    fn node_equal(&self, x: &Item<'_>, y: &Item<'_>, depth: usize) -> Result<bool, CompareError> {
        if let (Some(ex), Some(ey)) = (x.as_element(), y.as_element()) {
            let nested = self.provider.deep_criteria(&ex.name, &ex.namespace);
            let comparator = ElementComparator {
                criteria: &nested,
                provider: self.provider,
                max_depth: self.max_depth,
            };
            let nested_equal = comparator.compare(ex, ey, depth + 1).unwrap_or_else(|e| {
                debug!(element = %ex.name, error = %e, "nested comparison failed");
                false
            });
            if nested_equal {
                return Ok(true);
            }
        }
        Ok(x.canonical() == y.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use xmerge_dom::parse_str;
    use xmerge_schema::SchemaRegistry;
    use xmerge_types::{Handling, Schema};

    /// Helper: deep criteria for `C` (by `@key`) and `S` (by itself).
    fn provider() -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        registry
            .register(
                Schema::new("")
                    .with_handling(Handling::new("C").with_criterion(Criterion::ordered("@key")))
                    .with_handling(Handling::new("S").with_criterion(Criterion::ordered("."))),
            )
            .unwrap();
        registry
    }

    /// Helper: parse a fixture.
    fn el(xml: &str) -> Element {
        parse_str(xml).unwrap()
    }

    // -----------------------------------------------------------------------
    // 1. Criteria over attributes and cardinality
    // -----------------------------------------------------------------------
    #[test]
    fn ordered_attribute_criterion() {
        let p = provider();
        let criteria = [Criterion::ordered("@id")];
        let cmp = ElementComparator::new(&criteria, &p);
        assert!(cmp.matches(&el(r#"<B id="1" x="a"/>"#), &el(r#"<B id="1" x="b"/>"#)));
        assert!(!cmp.matches(&el(r#"<B id="1"/>"#), &el(r#"<B id="2"/>"#)));
    }

    #[test]
    fn cardinality_gate() {
        let p = provider();
        let criteria = [Criterion::new("@id"), Criterion::always()];
        let cmp = ElementComparator::new(&criteria, &p);
        assert!(!cmp.matches(&el(r#"<B id="1"/>"#), &el("<B/>")));
    }

    #[test]
    fn empty_criteria_match_same_name() {
        let p = provider();
        let cmp = ElementComparator::new(&[], &p);
        assert!(cmp.matches(&el(r#"<B id="1"/>"#), &el(r#"<B id="2"/>"#)));
    }

    // -----------------------------------------------------------------------
    // 2. Nested elements compare through their deep criteria
    // -----------------------------------------------------------------------
    #[test]
    fn unordered_children_ignore_order() {
        let p = provider();
        let criteria = [Criterion::new("./*")];
        let cmp = ElementComparator::new(&criteria, &p);
        let a = el(r#"<B><C key="1">x</C><C key="2"/></B>"#);
        let b = el(r#"<B><C key="2"/><C key="1">changed</C></B>"#);
        assert!(cmp.matches(&a, &b), "children match through their deep criteria");

        let ordered = [Criterion::ordered("./*")];
        let cmp = ElementComparator::new(&ordered, &p);
        assert!(!cmp.matches(&a, &b));
    }

    #[test]
    fn nested_elements_without_handling_use_default_criterion() {
        let p = provider();
        let criteria = [Criterion::ordered("./*")];
        let cmp = ElementComparator::new(&criteria, &p);
        // D has no handling: the default "./*" compares its (empty) children.
        assert!(cmp.matches(&el(r#"<B><D a="1"/></B>"#), &el(r#"<B><D a="2"/></B>"#)));
        assert!(!cmp.matches(&el("<B><D/></B>"), &el("<B><E/></B>")));
    }

    #[test]
    fn text_criterion_compares_escaped_text() {
        let p = provider();
        let criteria = [Criterion::ordered("text()")];
        let cmp = ElementComparator::new(&criteria, &p);
        assert!(cmp.matches(&el("<B>a &amp; b</B>"), &el("<B>a &amp; b</B>")));
        assert!(!cmp.matches(&el("<B>a</B>"), &el("<B>b</B>")));
    }

    // -----------------------------------------------------------------------
    // 3. Evaluation failures
    // -----------------------------------------------------------------------
    #[test]
    fn malformed_query_is_a_mismatch() {
        let p = provider();
        let criteria = [Criterion::new("@id = ")];
        let cmp = ElementComparator::new(&criteria, &p);
        assert!(!cmp.matches(&el("<B/>"), &el("<B/>")));
    }

    #[test]
    fn malformed_nested_criterion_falls_back_to_canonical_text() {
        let p = SchemaRegistry::new();
        p.register(Schema::new("").with_handling(Handling::new("C").with_criterion(Criterion::new("@key ="))))
            .unwrap();
        let criteria = [Criterion::ordered("./*")];
        let cmp = ElementComparator::new(&criteria, &p);
        assert!(cmp.matches(&el("<B><C/></B>"), &el("<B><C/></B>")));
        assert!(!cmp.matches(&el(r#"<B><C v="1"/></B>"#), &el(r#"<B><C v="2"/></B>"#)));
    }

    #[test]
    fn self_referential_criterion_terminates() {
        let p = provider();
        let criteria = [Criterion::ordered(".")];
        let cmp = ElementComparator::new(&criteria, &p).with_max_depth(8);
        // The bound cuts the recursion; each level then compares text forms.
        assert!(cmp.matches(&el("<S/>"), &el("<S/>")));
        assert!(!cmp.matches(&el(r#"<S a="1"/>"#), &el(r#"<S a="2"/>"#)));
    }

    proptest! {
        #[test]
        fn different_names_never_match(a in "[a-z]{1,6}", b in "[a-z]{1,6}") {
            prop_assume!(a != b);
            let p = provider();
            let criteria = [Criterion::always()];
            let cmp = ElementComparator::new(&criteria, &p);
            prop_assert!(!cmp.matches(&Element::new(a), &Element::new(b)));
        }
    }
}
