//! Configuration: YAML file, environment and export options.
//!
//! ```yaml
//! roots:
//!   drivers: shared/jdbc
//!   vdbs: deployed/vdbs
//! limits:
//!   max_member_bytes: 10485760
//! export:
//!   artifact: full-zip
//!   pretty: true
//!   indent: 4
//!   exclude_properties: ["secret.*", "*.password"]
//! ```
//!
//! Values from the file win over the `DSARC_*_ROOT` environment variables;
//! anything unset falls back to defaults.

use crate::archive::{ArchiveLimits, ArchiveLimitsOverrides, ArtifactKind};
use crate::codec::WriteOptions;
use crate::resolve::{ResolutionRoots, ResourceKind};
use crate::tree::props;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {message}")]
    Parse { message: String },

    #[error("invalid property pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub roots: BTreeMap<ResourceKind, String>,
    #[serde(default)]
    pub limits: ArchiveLimitsOverrides,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Export section; every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    pub artifact: Option<ArtifactKind>,
    pub pretty: Option<bool>,
    pub indent: Option<usize>,
    #[serde(default)]
    pub exclude_properties: Vec<String>,
}

impl ArchiveConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document is a valid, empty configuration.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Configured roots only, without the environment.
    pub fn explicit_roots(&self) -> ResolutionRoots {
        let mut roots = ResolutionRoots::new();
        for (kind, path) in &self.roots {
            roots.set(*kind, path);
        }
        roots
    }

    /// Environment roots with the configured ones layered on top.
    pub fn resolution_roots(&self) -> ResolutionRoots {
        ResolutionRoots::from_env().overlay(&self.explicit_roots())
    }

    pub fn limits(&self) -> ArchiveLimits {
        ArchiveLimits::default().apply(&self.limits)
    }

    pub fn export_options(&self) -> Result<ExportOptions, ConfigError> {
        let defaults = ExportOptions::default();
        Ok(ExportOptions {
            artifact: self.export.artifact.unwrap_or(defaults.artifact),
            pretty: self.export.pretty.unwrap_or(defaults.pretty),
            indent: self.export.indent.unwrap_or(defaults.indent),
            filter: PropertyFilter::new(&self.export.exclude_properties)?,
        })
    }
}

/// Decides which data service properties are written to an exported manifest.
///
/// Engine bookkeeping properties (`dsarc:*`) are never exported.
#[derive(Debug, Clone, Default)]
pub struct PropertyFilter {
    exclude: Option<GlobSet>,
}

impl PropertyFilter {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ConfigError::InvalidGlob {
            pattern: patterns.join(","),
            message: e.to_string(),
        })?;
        Ok(Self { exclude: Some(set) })
    }

    pub fn allows(&self, name: &str) -> bool {
        if props::is_internal(name) {
            return false;
        }
        match &self.exclude {
            Some(set) => !set.is_match(name),
            None => true,
        }
    }
}

/// Options for one export call.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub artifact: ArtifactKind,
    pub pretty: bool,
    pub indent: usize,
    pub filter: PropertyFilter,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            artifact: ArtifactKind::default(),
            pretty: true,
            indent: 2,
            filter: PropertyFilter::default(),
        }
    }
}

impl ExportOptions {
    pub fn with_artifact(mut self, artifact: ArtifactKind) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            pretty: self.pretty,
            indent: self.indent,
        }
    }
}
