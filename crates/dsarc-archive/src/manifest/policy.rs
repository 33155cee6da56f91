//! Publish policy attached to every manifest entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Governs whether importing an entry creates a new resource or reuses an
/// equivalent one already present under the resolution root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PublishPolicy {
    /// Always materialize a new resource, even when an equivalent exists.
    #[serde(rename = "ALWAYS")]
    Always,
    /// Reference an existing resource with the same name and kind, else materialize.
    #[default]
    #[serde(rename = "IF_MISSING")]
    IfMissing,
    /// Record the entry only. Nothing is materialized or referenced.
    #[serde(rename = "NEVER")]
    Never,
}

impl PublishPolicy {
    pub const ALL: [PublishPolicy; 3] = [Self::Always, Self::IfMissing, Self::Never];

    /// Literal used in the manifest's `publish` attribute.
    pub fn as_xml(self) -> &'static str {
        match self {
            Self::Always => "ALWAYS",
            Self::IfMissing => "IF_MISSING",
            Self::Never => "NEVER",
        }
    }

    /// Strict lookup of a manifest literal.
    pub fn from_xml(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_xml() == value)
    }

    /// Permissive parse: unrecognised or missing input yields the default.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        value
            .map(str::trim)
            .and_then(Self::from_xml)
            .unwrap_or_default()
    }

    /// True when import may create a new resource for this entry.
    pub fn materializes(self) -> bool {
        !matches!(self, Self::Never)
    }
}

impl fmt::Display for PublishPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_xml())
    }
}
