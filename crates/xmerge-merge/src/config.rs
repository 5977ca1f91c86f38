use serde::{Deserialize, Serialize};
use xmerge_types::ConflictPolicy;

use crate::error::{MergeError, MergeResult};

/// How an unresolvable scope reference is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeRefMode {
    /// Log a warning and import an empty scope.
    #[default]
    Lenient,
    /// Fail the merge with [`MergeError::UnresolvedScopeRef`].
    Strict,
}

/// Configuration for document merges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Policy used when the caller does not name one.
    pub policy: ConflictPolicy,
    /// Treatment of scope references whose label cannot be found.
    pub scope_refs: ScopeRefMode,
    /// Maximum nesting depth for merging and for nested comparisons.
    pub max_depth: usize,
    /// Reconcile `xsi:schemaLocation` on the merged root.
    pub merge_schema_locations: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            policy: ConflictPolicy::PatchOverwrite,
            scope_refs: ScopeRefMode::Lenient,
            max_depth: 512,
            merge_schema_locations: true,
        }
    }
}

impl MergeConfig {
    /// The default configuration with unresolvable scope references
    /// treated as errors.
    pub fn strict() -> Self {
        Self {
            scope_refs: ScopeRefMode::Strict,
            ..Default::default()
        }
    }

    /// Decode a configuration from TOML; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> MergeResult<Self> {
        toml::from_str(text).map_err(|e| MergeError::Config(e.to_string()))
    }
}
