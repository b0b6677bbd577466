//! Library artifact lookup
//!
//! Resolution from remote repositories happens elsewhere. These resolvers only
//! map a coordinate to archives that already exist on disk, either as listed
//! by the external resolver or by looking inside pre-resolved product
//! directories (offline builds).

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use super::model::{LibraryCoordinate, LibrarySpec};
use crate::error::{DistError, Result};

pub trait LibraryResolver {
    /// Archives making up the library, in packaging order
    fn resolve(&self, coordinate: &LibraryCoordinate) -> Result<Vec<PathBuf>>;
}

/// Uses the files recorded for each library in the build graph
#[derive(Debug, Default)]
pub struct DeclaredArtifacts {
    files: HashMap<String, Vec<PathBuf>>,
}

impl DeclaredArtifacts {
    pub fn new(libraries: &[LibrarySpec]) -> Result<Self> {
        let mut files = HashMap::new();
        for library in libraries {
            let coordinate = LibraryCoordinate::parse(&library.coordinate)?;
            files.insert(coordinate.to_string(), library.files.clone());
        }
        Ok(Self { files })
    }
}

impl LibraryResolver for DeclaredArtifacts {
    fn resolve(&self, coordinate: &LibraryCoordinate) -> Result<Vec<PathBuf>> {
        match self.files.get(&coordinate.to_string()) {
            Some(files) if !files.is_empty() => Ok(files.clone()),
            _ => Err(DistError::LibraryNotResolved {
                coordinate: coordinate.to_string(),
            }),
        }
    }
}

/// Looks libraries up in pre-resolved product directories.
///
/// Each directory is searched for `<artifact>-<version>.jar` directly and in
/// the `<group>/<artifact>/<version>/` repository layout. Directories are
/// tried in order; the first hit wins.
#[derive(Debug, Default)]
pub struct OfflineProducts {
    dirs: Vec<PathBuf>,
}

impl OfflineProducts {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl LibraryResolver for OfflineProducts {
    fn resolve(&self, coordinate: &LibraryCoordinate) -> Result<Vec<PathBuf>> {
        let file_name = format!("{}-{}.jar", coordinate.artifact, coordinate.version);

        for dir in &self.dirs {
            let candidates = [
                dir.join(&file_name),
                dir.join(&coordinate.group)
                    .join(&coordinate.artifact)
                    .join(&coordinate.version)
                    .join(&file_name),
                dir.join(coordinate.group.replace('.', "/"))
                    .join(&coordinate.artifact)
                    .join(&coordinate.version)
                    .join(&file_name),
            ];

            if let Some(found) = candidates.into_iter().find(|p| p.is_file()) {
                debug!(
                    coordinate = %coordinate,
                    path = %found.display(),
                    "Resolved offline library"
                );
                return Ok(vec![found]);
            }
        }

        Err(DistError::LibraryNotResolved {
            coordinate: coordinate.to_string(),
        })
    }
}
