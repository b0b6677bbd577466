//! Build graph and packaging rules consumed by the mapping pipeline

use std::path::PathBuf;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{DistError, Result};

/// How a project or library ends up in the plugin layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackagingMethod {
    /// Contents are folded into the archive of the consuming project
    MergeIntoParent,
    /// Packaged as its own archive under `lib/`
    Standalone,
    Skip,
    /// Own archive(s), placed in `directory` instead of `lib/`
    Custom { directory: String },
}

impl PackagingMethod {
    /// Whether the node owns an archive that merged children fold into
    pub fn owns_archive(&self) -> bool {
        matches!(self, Self::Standalone | Self::Custom { .. })
    }
}

/// One project of the build graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,

    /// Compiler output directories (classes, resources)
    #[serde(default)]
    pub output_dirs: Vec<PathBuf>,

    /// Unset means standalone for the root and merge-into-parent otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<PackagingMethod>,

    /// Names of projects this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Library coordinates this project depends on
    #[serde(default)]
    pub libraries: Vec<String>,
}

/// A library already resolved by the external resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySpec {
    pub coordinate: String,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

/// Projects plus resolved libraries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildGraph {
    pub root: String,
    pub projects: Vec<ProjectSpec>,
    pub libraries: Vec<LibrarySpec>,
}

impl BuildGraph {
    pub fn project(&self, name: &str) -> Result<&ProjectSpec> {
        self.projects
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| DistError::ProjectNotFound {
                name: name.to_string(),
            })
    }
}

/// `group:artifact:version`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryCoordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl LibraryCoordinate {
    pub fn parse(coordinate: &str) -> Result<Self> {
        let parts: Vec<&str> = coordinate.split(':').map(str::trim).collect();
        match parts.as_slice() {
            [group, artifact, version]
                if !group.is_empty() && !artifact.is_empty() && !version.is_empty() =>
            {
                Ok(Self {
                    group: group.to_string(),
                    artifact: artifact.to_string(),
                    version: version.to_string(),
                })
            }
            _ => Err(DistError::InvalidCoordinate {
                coordinate: coordinate.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for LibraryCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

/// Value of [`LibraryMapping::target`] that drops the library
pub const DROP_TARGET: &str = "drop";

/// Override for libraries whose coordinate matches `pattern`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryMapping {
    /// Glob over `group:artifact:version`
    pub pattern: String,
    /// `"drop"` or a directory relative to the plugin root
    pub target: String,
}

impl LibraryMapping {
    pub fn method(&self) -> PackagingMethod {
        if self.target == DROP_TARGET {
            PackagingMethod::Skip
        } else {
            PackagingMethod::Custom {
                directory: self.target.trim_matches('/').to_string(),
            }
        }
    }
}

/// Extra file or directory copied into the plugin layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMapping {
    pub from: PathBuf,
    /// Destination relative to the plugin root
    pub to: String,
}

/// Package relocation, e.g. `com.google.gson` -> `acme.shaded.gson`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadeRule {
    pub from: String,
    pub to: String,
}

impl ShadeRule {
    /// Relocated entry name, or `None` if the entry is outside `from`
    pub fn relocate(&self, entry: &str) -> Option<String> {
        let from = package_dir(&self.from);
        let rest = entry.strip_prefix(&from)?;
        Some(format!("{}{}", package_dir(&self.to), rest))
    }

    pub fn applies_to(&self, entry: &str) -> bool {
        entry.starts_with(&package_dir(&self.from))
    }
}

/// Apply the first matching rule to an entry name
pub fn relocate_entry(rules: &[ShadeRule], entry: &str) -> String {
    rules
        .iter()
        .find_map(|rule| rule.relocate(entry))
        .unwrap_or_else(|| entry.to_string())
}

fn package_dir(package: &str) -> String {
    format!("{}/", package.trim_end_matches('.').replace('.', "/"))
}

/// Per-plugin packaging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingRules {
    pub plugin_name: String,

    /// Unpack every unmapped library into the root archive
    #[serde(default)]
    pub assemble_libraries: bool,

    /// Globs over entry paths pruned before mappings are made
    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default, rename = "library_mapping")]
    pub library_mappings: Vec<LibraryMapping>,

    #[serde(default, rename = "file_mapping")]
    pub file_mappings: Vec<FileMapping>,

    #[serde(default)]
    pub shade: Vec<ShadeRule>,
}

impl PackagingRules {
    /// First override whose pattern matches the coordinate
    pub fn library_override(
        &self,
        coordinate: &LibraryCoordinate,
    ) -> Result<Option<&LibraryMapping>> {
        let text = coordinate.to_string();
        for mapping in &self.library_mappings {
            if compile(&mapping.pattern)?.matches(&text) {
                return Ok(Some(mapping));
            }
        }
        Ok(None)
    }
}

/// Compiled exclusion globs
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<Pattern>,
}

impl PathFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| DistError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}
