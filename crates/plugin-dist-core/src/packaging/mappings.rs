//! Packaging mappings
//!
//! A mapping is one placement instruction: take a file (or an entry of an
//! archive) and put it at a destination relative to the output root, either
//! as a whole file or as an entry of a destination archive. Mappings are
//! order-sensitive: for the same destination the later one wins.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::extractor::{to_slash, DependencyStructure, NodeKind, StructureNode};
use super::model::{PackagingMethod, PackagingRules, PathFilter, ShadeRule};
use crate::archive;
use crate::error::{DistError, Result};

/// Directory for standalone archives and libraries
pub const LIB_DIR: &str = "lib";

/// Entries never unpacked from assembled libraries
const ASSEMBLY_SKIPPED_ENTRIES: &[&str] = &["META-INF/MANIFEST.MF", "META-INF/INDEX.LIST"];
const SIGNATURE_SUFFIXES: &[&str] = &[".SF", ".RSA", ".DSA", ".EC"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingSource {
    File(PathBuf),
    ArchiveEntry { archive: PathBuf, entry: String },
}

impl MappingSource {
    /// The file on disk backing this source
    pub fn file(&self) -> &Path {
        match self {
            Self::File(path) => path,
            Self::ArchiveEntry { archive, .. } => archive,
        }
    }
}

impl std::fmt::Display for MappingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::ArchiveEntry { archive, entry } => write!(f, "{}!/{}", archive.display(), entry),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlacementRule {
    Copy,
    /// Add or overwrite `entry` inside the destination archive
    MergeIntoArchive { entry: String },
    /// The destination must not exist after materialization
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub source: MappingSource,
    /// `/`-separated, relative to the output root
    pub destination: String,
    pub rule: PlacementRule,
    /// Relocations applied when the mapping is materialized
    pub shade: Vec<ShadeRule>,
}

impl Mapping {
    pub fn copy(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: MappingSource::File(source.into()),
            destination: destination.into(),
            rule: PlacementRule::Copy,
            shade: Vec::new(),
        }
    }

    pub fn merge(
        source: MappingSource,
        archive: impl Into<String>,
        entry: impl Into<String>,
    ) -> Self {
        Self {
            source,
            destination: archive.into(),
            rule: PlacementRule::MergeIntoArchive {
                entry: entry.into(),
            },
            shade: Vec::new(),
        }
    }

    pub fn exclude(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: MappingSource::File(source.into()),
            destination: destination.into(),
            rule: PlacementRule::Exclude,
            shade: Vec::new(),
        }
    }

    fn with_shade(mut self, shade: Vec<ShadeRule>) -> Self {
        self.shade = shade;
        self
    }

    fn entry(&self) -> Option<&str> {
        match &self.rule {
            PlacementRule::MergeIntoArchive { entry } => Some(entry),
            PlacementRule::Copy | PlacementRule::Exclude => None,
        }
    }
}

/// Ordered list of mappings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSet {
    mappings: Vec<Mapping>,
}

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mapping: Mapping) {
        self.mappings.push(mapping);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Mappings that survive last-one-wins resolution, in input order.
    ///
    /// Archive entries are keyed by `(destination, entry)`. A whole-file
    /// placement hides everything placed earlier at its destination, while
    /// entries placed after it are merged into that file.
    pub fn resolved(&self) -> Vec<&Mapping> {
        let mut sealed: HashSet<&str> = HashSet::new();
        let mut entries: HashSet<(&str, &str)> = HashSet::new();
        let mut kept = Vec::new();

        for mapping in self.mappings.iter().rev() {
            let destination = mapping.destination.as_str();
            if sealed.contains(destination) {
                continue;
            }
            let keep = match mapping.entry() {
                None => sealed.insert(destination),
                Some(entry) => entries.insert((destination, entry)),
            };
            if keep {
                kept.push(mapping);
            }
        }

        kept.reverse();
        kept
    }
}

impl FromIterator<Mapping> for MappingSet {
    fn from_iter<I: IntoIterator<Item = Mapping>>(iter: I) -> Self {
        Self {
            mappings: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a MappingSet {
    type Item = &'a Mapping;
    type IntoIter = std::slice::Iter<'a, Mapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.mappings.iter()
    }
}

/// Turns a dependency structure into a flat mapping list.
///
/// Order: project contents, then libraries, then explicit file mappings, so
/// explicit mappings override anything derived automatically.
pub struct MappingsBuilder<'a> {
    structure: &'a DependencyStructure,
    rules: &'a PackagingRules,
}

impl<'a> MappingsBuilder<'a> {
    pub fn new(structure: &'a DependencyStructure, rules: &'a PackagingRules) -> Self {
        Self { structure, rules }
    }

    pub fn build(&self) -> Result<MappingSet> {
        let filter = PathFilter::new(&self.rules.exclude)?;
        let mut set = MappingSet::new();

        for node in self.structure.projects() {
            self.add_project(node, &filter, &mut set)?;
        }
        for node in self.structure.libraries() {
            self.add_library(node, &filter, &mut set)?;
        }
        self.add_file_mappings(&mut set);

        Ok(set)
    }

    fn plugin_path(&self, relative: &str) -> String {
        format!("{}/{}", self.structure.plugin_name, relative.trim_start_matches('/'))
    }

    /// Archive that receives a node's contents
    fn archive_of(&self, node: &StructureNode) -> Result<Option<String>> {
        let owner = match &node.method {
            PackagingMethod::Skip => return Ok(None),
            PackagingMethod::MergeIntoParent => {
                let owner_name = node.owner.as_deref().unwrap_or(&self.structure.root);
                self.structure
                    .node(owner_name)
                    .ok_or_else(|| DistError::ProjectNotFound {
                        name: owner_name.to_string(),
                    })?
            }
            PackagingMethod::Standalone | PackagingMethod::Custom { .. } => node,
        };

        let dir = match &owner.method {
            PackagingMethod::Custom { directory } => directory.as_str(),
            _ => LIB_DIR,
        };
        Ok(Some(self.plugin_path(&format!("{}/{}.jar", dir, owner.name))))
    }

    fn shade_for(&self, entry: &str) -> Vec<ShadeRule> {
        self.rules
            .shade
            .iter()
            .filter(|rule| rule.applies_to(entry))
            .cloned()
            .collect()
    }

    fn add_project(
        &self,
        node: &StructureNode,
        filter: &PathFilter,
        set: &mut MappingSet,
    ) -> Result<()> {
        let Some(archive) = self.archive_of(node)? else {
            return Ok(());
        };

        for file in node.files.iter().filter(|f| !filter.is_excluded(&f.relative)) {
            let mapping = Mapping::merge(
                MappingSource::File(file.path.clone()),
                archive.clone(),
                file.relative.clone(),
            );
            set.push(mapping.with_shade(self.shade_for(&file.relative)));
        }
        Ok(())
    }

    fn add_library(
        &self,
        node: &StructureNode,
        filter: &PathFilter,
        set: &mut MappingSet,
    ) -> Result<()> {
        debug_assert_eq!(node.kind, NodeKind::Library);

        match &node.method {
            PackagingMethod::Skip => {
                for file in &node.files {
                    let destination = self.plugin_path(&format!("{}/{}", LIB_DIR, file.relative));
                    set.push(Mapping::exclude(file.path.clone(), destination));
                }
            }
            PackagingMethod::Standalone | PackagingMethod::Custom { .. } => {
                let dir = match &node.method {
                    PackagingMethod::Custom { directory } => directory.as_str(),
                    _ => LIB_DIR,
                };
                for file in node.files.iter().filter(|f| !filter.is_excluded(&f.relative)) {
                    let destination = self.plugin_path(&format!("{}/{}", dir, file.relative));
                    set.push(
                        Mapping::copy(file.path.clone(), destination)
                            .with_shade(self.rules.shade.clone()),
                    );
                }
            }
            PackagingMethod::MergeIntoParent => {
                let Some(archive) = self.archive_of(node)? else {
                    return Ok(());
                };
                for file in &node.files {
                    if !file.path.is_file() {
                        return Err(DistError::SourceMissing {
                            path: file.path.clone(),
                        });
                    }
                    for entry in archive::entry_names(&file.path)? {
                        if is_assembly_skipped(&entry) || filter.is_excluded(&entry) {
                            continue;
                        }
                        let shade = self.shade_for(&entry);
                        let source = MappingSource::ArchiveEntry {
                            archive: file.path.clone(),
                            entry: entry.clone(),
                        };
                        set.push(Mapping::merge(source, archive.clone(), entry).with_shade(shade));
                    }
                }
            }
        }
        Ok(())
    }

    fn add_file_mappings(&self, set: &mut MappingSet) {
        for file_mapping in &self.rules.file_mappings {
            let to = file_mapping.to.trim_matches('/');
            if file_mapping.from.is_dir() {
                for entry in WalkDir::new(&file_mapping.from)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                {
                    if let Ok(relative) = entry.path().strip_prefix(&file_mapping.from) {
                        let destination =
                            self.plugin_path(&format!("{}/{}", to, to_slash(relative)));
                        set.push(Mapping::copy(entry.path(), destination));
                    }
                }
            } else {
                // A missing source surfaces when the mapping is materialized
                set.push(Mapping::copy(file_mapping.from.clone(), self.plugin_path(to)));
            }
        }
    }
}

fn is_assembly_skipped(entry: &str) -> bool {
    ASSEMBLY_SKIPPED_ENTRIES.contains(&entry)
        || (entry.starts_with("META-INF/")
            && !entry["META-INF/".len()..].contains('/')
            && SIGNATURE_SUFFIXES.iter().any(|s| entry.ends_with(s)))
}
