use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;
use walkdir::WalkDir;

use crate::archive::ArchiveBuilder;
use crate::error::{DistError, Result};
use crate::packaging::extractor::to_slash;

/// Packs a finished output directory into a single distributable archive
pub struct ZipDistBuilder {
    archive_path: PathBuf,
}

impl ZipDistBuilder {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
        }
    }

    /// Replace any existing archive with one holding the whole tree of `output_dir`
    pub fn produce_artifact(&self, output_dir: &Path) -> Result<PathBuf> {
        if !output_dir.is_dir() {
            return Err(DistError::SourceMissing {
                path: output_dir.to_path_buf(),
            });
        }
        if self.archive_path.exists() {
            fs::remove_file(&self.archive_path)?;
        }

        let mut builder = ArchiveBuilder::new();
        for entry in WalkDir::new(output_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path() == self.archive_path {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(output_dir) else {
                continue;
            };
            let name = to_slash(relative);

            if entry.file_type().is_dir() {
                builder.add_directory(name);
            } else if entry.file_type().is_file() {
                builder.insert(name, fs::read(entry.path())?);
            }
        }

        builder.write_to(&self.archive_path)?;
        info!(
            archive = %self.archive_path.display(),
            entries = builder.len(),
            "Distribution archive written"
        );
        Ok(self.archive_path.clone())
    }
}
