//! Resolved view of a mapping set: one planned output per destination.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::{self, ArchiveBuilder};
use crate::error::{DistError, Result};
use crate::packaging::{relocate_entry, MappingSet, MappingSource, PlacementRule, ShadeRule};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedOutput {
    /// Whole-file copy, rewritten with relocated entries when shade rules apply
    File {
        source: PathBuf,
        shade: Vec<ShadeRule>,
    },
    /// Archive assembled from entries, optionally on top of a copied base
    /// whose entries are relocated by the copy's shade rules
    Archive {
        base: Option<(PathBuf, Vec<ShadeRule>)>,
        entries: BTreeMap<String, MappingSource>,
    },
    /// Must not exist
    Removed,
}

impl PlannedOutput {
    /// Distinct files on disk the output is produced from
    pub fn sources(&self) -> BTreeSet<&Path> {
        match self {
            Self::File { source, .. } => BTreeSet::from([source.as_path()]),
            Self::Archive { base, entries } => base
                .iter()
                .map(|(path, _)| path.as_path())
                .chain(entries.values().map(MappingSource::file))
                .collect(),
            Self::Removed => BTreeSet::new(),
        }
    }

    /// Render the output's bytes
    pub fn render(&self) -> Result<Vec<u8>> {
        match self {
            Self::File { source, shade } => render_file(source, shade),
            Self::Archive { base, entries } => {
                let mut builder = ArchiveBuilder::new();
                if let Some((base, shade)) = base {
                    for (name, content) in read_archive(base)? {
                        builder.insert(relocate_entry(shade, &name), content);
                    }
                }
                for (name, source) in entries {
                    builder.insert(name.clone(), read_source(source)?);
                }
                builder.to_bytes()
            }
            Self::Removed => Ok(Vec::new()),
        }
    }

    /// Entry names the rendered archive will hold, `None` for non-archives
    pub fn entry_names(&self) -> Result<Option<BTreeSet<String>>> {
        match self {
            Self::Archive { base, entries } => {
                let mut names = BTreeSet::new();
                if let Some((base, shade)) = base {
                    names.extend(
                        archive::entry_names(base)?
                            .iter()
                            .map(|name| relocate_entry(shade, name)),
                    );
                }
                names.extend(entries.keys().cloned());
                Ok(Some(names))
            }
            Self::File { .. } | Self::Removed => Ok(None),
        }
    }
}

/// Destination (relative to the target root) to planned output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    outputs: BTreeMap<String, PlannedOutput>,
}

impl Plan {
    pub fn new(mappings: &MappingSet) -> Self {
        let mut outputs: BTreeMap<String, PlannedOutput> = BTreeMap::new();

        for mapping in mappings.resolved() {
            let destination = mapping.destination.clone();
            match &mapping.rule {
                PlacementRule::Copy => {
                    outputs.insert(
                        destination,
                        PlannedOutput::File {
                            source: mapping.source.file().to_path_buf(),
                            shade: mapping.shade.clone(),
                        },
                    );
                }
                PlacementRule::Exclude => {
                    outputs.insert(destination, PlannedOutput::Removed);
                }
                PlacementRule::MergeIntoArchive { entry } => {
                    let output = outputs.entry(destination).or_insert(PlannedOutput::Removed);
                    if !matches!(output, PlannedOutput::Archive { .. }) {
                        let base = match output {
                            PlannedOutput::File { source, shade } => {
                                Some((source.clone(), shade.clone()))
                            }
                            _ => None,
                        };
                        *output = PlannedOutput::Archive {
                            base,
                            entries: BTreeMap::new(),
                        };
                    }
                    if let PlannedOutput::Archive { entries, .. } = output {
                        entries.insert(
                            relocate_entry(&mapping.shade, entry),
                            mapping.source.clone(),
                        );
                    }
                }
            }
        }

        Self { outputs }
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &PlannedOutput)> {
        self.outputs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, destination: &str) -> Option<&PlannedOutput> {
        self.outputs.get(destination)
    }

    /// Whether the destination is produced (not just removed) by the plan
    pub fn produces(&self, destination: &str) -> bool {
        matches!(
            self.outputs.get(destination),
            Some(PlannedOutput::File { .. } | PlannedOutput::Archive { .. })
        )
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(DistError::SourceMissing {
            path: path.to_path_buf(),
        })
    }
}

fn read_source(source: &MappingSource) -> Result<Vec<u8>> {
    match source {
        MappingSource::File(path) => {
            require_file(path)?;
            Ok(fs::read(path)?)
        }
        MappingSource::ArchiveEntry { archive, entry } => archive::require_entry(archive, entry),
    }
}

fn read_archive(path: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    require_file(path)?;
    archive::read_all_entries(path)
}

fn render_file(source: &Path, shade: &[ShadeRule]) -> Result<Vec<u8>> {
    require_file(source)?;
    if shade.is_empty() || !is_archive_path(source) {
        return Ok(fs::read(source)?);
    }

    let entries = archive::read_all_entries(source)?;
    if !entries
        .keys()
        .any(|name| shade.iter().any(|rule| rule.applies_to(name)))
    {
        return Ok(fs::read(source)?);
    }

    let mut builder = ArchiveBuilder::new();
    for (name, content) in entries {
        builder.insert(relocate_entry(shade, &name), content);
    }
    builder.to_bytes()
}

fn is_archive_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jar" | "zip")
    )
}
