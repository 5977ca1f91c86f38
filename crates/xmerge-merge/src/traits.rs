use xmerge_dom::Element;
use xmerge_types::ConflictPolicy;

use crate::error::MergeResult;

/// Whole-document merge entry point, used when matched children belong to
/// a namespace the current schema does not govern.
///
/// Implementations re-enter schema resolution for the children's namespace
/// and build a fresh rule tree for them.
pub trait ForeignMerger {
    /// Merge two elements of a foreign namespace found `depth` levels below
    /// the outermost merge.
    fn merge_foreign(
        &self,
        base: &Element,
        patch: &Element,
        policy: ConflictPolicy,
        depth: usize,
    ) -> MergeResult<Element>;
}
