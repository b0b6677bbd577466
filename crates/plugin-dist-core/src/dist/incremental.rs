//! Incremental materialization
//!
//! Only outputs whose sources changed since the last compilation are
//! re-rendered; everything under the target root that the current plan no
//! longer produces is deleted. With no timestamp every output is affected,
//! which makes the result identical to a full build.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::plan::{Plan, PlannedOutput};
use super::{materialize, notify, remove_empty_dirs, BuildResult, FileCallback};
use crate::archive;
use crate::error::Result;
use crate::packaging::extractor::to_slash;
use crate::packaging::MappingSet;

pub struct DynamicDistBuilder {
    target_root: PathBuf,
    since: Option<DateTime<Utc>>,
    changed: HashSet<PathBuf>,
}

impl DynamicDistBuilder {
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        Self {
            target_root: target_root.into(),
            since: None,
            changed: HashSet::new(),
        }
    }

    /// Start of the last compilation; sources modified at or after it are affected
    pub fn since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self
    }

    /// Files the compiler reported as touched
    pub fn changed<I, P>(mut self, changed: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.changed = changed.into_iter().map(Into::into).collect();
        self
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    pub fn produce_artifact(
        &self,
        mappings: &MappingSet,
        on_file: FileCallback<'_>,
    ) -> Result<BuildResult> {
        fs::create_dir_all(&self.target_root)?;

        let plan = Plan::new(mappings);
        let mut result = BuildResult::new(&self.target_root);

        // Stale files may stand where the new layout needs a directory
        self.remove_stale(&plan, &mut result, on_file)?;

        for (destination, output) in plan.outputs() {
            if self.is_affected(destination, output) {
                materialize(&self.target_root, destination, output, &mut result, on_file)?;
            } else if !matches!(output, PlannedOutput::Removed) {
                result.unchanged += 1;
            }
        }

        info!(
            root = %self.target_root.display(),
            written = result.written,
            unchanged = result.unchanged,
            removed = result.removed,
            "Incremental build finished"
        );
        Ok(result)
    }

    fn is_affected(&self, destination: &str, output: &PlannedOutput) -> bool {
        let Some(since) = self.since else {
            return true;
        };

        let path = self.target_root.join(destination);
        match output {
            PlannedOutput::Removed => return path.exists(),
            _ if !path.is_file() => return true,
            _ => {}
        }

        let since = SystemTime::from(since);
        let source_changed = output.sources().into_iter().any(|source| {
            self.changed.contains(source)
                || match fs::metadata(source).and_then(|m| m.modified()) {
                    Ok(modified) => modified >= since,
                    Err(_) => true,
                }
        });
        if source_changed {
            debug!(destination, "Sources changed");
            return true;
        }

        // Entries added or dropped without any source file changing
        match output.entry_names() {
            Ok(Some(planned)) => match archive::entry_names(&path) {
                Ok(existing) => existing.into_iter().collect::<BTreeSet<_>>() != planned,
                Err(_) => true,
            },
            Ok(None) => false,
            Err(_) => true,
        }
    }

    fn remove_stale(
        &self,
        plan: &Plan,
        result: &mut BuildResult,
        on_file: FileCallback<'_>,
    ) -> Result<()> {
        let stale: Vec<(PathBuf, String)> = WalkDir::new(&self.target_root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let relative = to_slash(e.path().strip_prefix(&self.target_root).ok()?);
                (!plan.produces(&relative)).then(|| (e.path().to_path_buf(), relative))
            })
            .collect();

        for (path, relative) in stale {
            debug!(path = %relative, "Removing stale output");
            fs::remove_file(&path)?;
            if let Some(parent) = path.parent() {
                let _ = remove_empty_dirs(parent, &self.target_root);
            }
            notify(on_file, "DEL", &relative);
            result.removed += 1;
        }
        Ok(())
    }
}
