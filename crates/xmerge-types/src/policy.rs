use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Global conflict-resolution behaviour for one merge invocation.
///
/// A policy combines two independent switches:
///
/// - **attachable**: when both sides carry a value and the rule allows it,
///   concatenate them (base first, then patch) instead of picking one.
/// - **base-preferring**: when values are not attached, the base side wins;
///   otherwise the patch side wins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Patch values replace base values.
    #[default]
    PatchOverwrite,
    /// Attach where allowed, otherwise patch values replace base values.
    PatchAttachOrOverwrite,
    /// Base values are kept.
    BaseOverwrite,
    /// Attach where allowed, otherwise base values are kept.
    BaseAttachOrOverwrite,
}

impl ConflictPolicy {
    /// Every policy, in declaration order.
    pub const ALL: [ConflictPolicy; 4] = [
        Self::PatchOverwrite,
        Self::PatchAttachOrOverwrite,
        Self::BaseOverwrite,
        Self::BaseAttachOrOverwrite,
    ];

    /// Build the policy matching the given switches.
    pub fn from_flags(attachable: bool, base_preferring: bool) -> Self {
        match (attachable, base_preferring) {
            (false, false) => Self::PatchOverwrite,
            (true, false) => Self::PatchAttachOrOverwrite,
            (false, true) => Self::BaseOverwrite,
            (true, true) => Self::BaseAttachOrOverwrite,
        }
    }

    /// Whether values may be concatenated when a rule allows it.
    pub fn is_attachable(&self) -> bool {
        matches!(self, Self::PatchAttachOrOverwrite | Self::BaseAttachOrOverwrite)
    }

    /// Whether the base side wins a non-attaching conflict.
    pub fn is_base_preferring(&self) -> bool {
        matches!(self, Self::BaseOverwrite | Self::BaseAttachOrOverwrite)
    }

    /// Kebab-case name, as used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatchOverwrite => "patch-overwrite",
            Self::PatchAttachOrOverwrite => "patch-attach-or-overwrite",
            Self::BaseOverwrite => "base-overwrite",
            Self::BaseAttachOrOverwrite => "base-attach-or-overwrite",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TypeError::UnknownPolicy(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn flags_match_names() {
        assert!(!ConflictPolicy::PatchOverwrite.is_attachable());
        assert!(!ConflictPolicy::PatchOverwrite.is_base_preferring());
        assert!(ConflictPolicy::PatchAttachOrOverwrite.is_attachable());
        assert!(!ConflictPolicy::PatchAttachOrOverwrite.is_base_preferring());
        assert!(!ConflictPolicy::BaseOverwrite.is_attachable());
        assert!(ConflictPolicy::BaseOverwrite.is_base_preferring());
        assert!(ConflictPolicy::BaseAttachOrOverwrite.is_attachable());
        assert!(ConflictPolicy::BaseAttachOrOverwrite.is_base_preferring());
    }

    #[test]
    fn from_flags_roundtrips_every_policy() {
        for policy in ConflictPolicy::ALL {
            let rebuilt =
                ConflictPolicy::from_flags(policy.is_attachable(), policy.is_base_preferring());
            assert_eq!(rebuilt, policy);
        }
    }

    #[test]
    fn parse_names() {
        assert_eq!(
            "base-attach-or-overwrite".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::BaseAttachOrOverwrite
        );
        assert_eq!(
            " Patch-Overwrite ".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::PatchOverwrite
        );
        assert_eq!(
            "merge-everything".parse::<ConflictPolicy>(),
            Err(TypeError::UnknownPolicy("merge-everything".into()))
        );
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&ConflictPolicy::PatchAttachOrOverwrite).unwrap();
        assert_eq!(json, "\"patch-attach-or-overwrite\"");
        let back: ConflictPolicy = serde_json::from_str("\"base-overwrite\"").unwrap();
        assert_eq!(back, ConflictPolicy::BaseOverwrite);
    }

    #[test]
    fn default_is_patch_overwrite() {
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::PatchOverwrite);
        assert_eq!(ConflictPolicy::default().to_string(), "patch-overwrite");
    }

    proptest! {
        #[test]
        fn unknown_names_are_rejected(name in "[a-z-]{0,30}") {
            prop_assume!(ConflictPolicy::ALL.iter().all(|p| p.as_str() != name));
            prop_assert!(name.parse::<ConflictPolicy>().is_err());
        }
    }
}
