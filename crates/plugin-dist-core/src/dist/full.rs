use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::plan::Plan;
use super::{materialize, BuildResult, FileCallback};
use crate::error::Result;
use crate::packaging::MappingSet;

/// Builds the output tree from scratch
pub struct DistBuilder {
    target_root: PathBuf,
}

impl DistBuilder {
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        Self {
            target_root: target_root.into(),
        }
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Remove the target root and materialize every resolved mapping
    pub fn produce_artifact(
        &self,
        mappings: &MappingSet,
        on_file: FileCallback<'_>,
    ) -> Result<BuildResult> {
        if self.target_root.exists() {
            fs::remove_dir_all(&self.target_root)?;
        }
        fs::create_dir_all(&self.target_root)?;

        let plan = Plan::new(mappings);
        let mut result = BuildResult::new(&self.target_root);
        for (destination, output) in plan.outputs() {
            materialize(&self.target_root, destination, output, &mut result, on_file)?;
        }

        info!(
            root = %self.target_root.display(),
            written = result.written,
            "Full build finished"
        );
        Ok(result)
    }
}
