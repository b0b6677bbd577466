//! Materialization of mapping sets onto disk

mod full;
mod incremental;
pub mod plan;
mod zip_dist;

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub use full::DistBuilder;
pub use incremental::DynamicDistBuilder;
pub use plan::{Plan, PlannedOutput};
pub use zip_dist::ZipDistBuilder;

use crate::error::Result;

/// Callback type for file operation progress reporting: `(status, destination)`
pub type FileCallback<'a> = Option<&'a dyn Fn(&str, &str)>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
    pub output_root: PathBuf,
    pub written: usize,
    pub unchanged: usize,
    pub removed: usize,
}

impl BuildResult {
    fn new(output_root: &Path) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            ..Self::default()
        }
    }
}

pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

pub fn compute_file_hash(path: &Path) -> Result<String> {
    let content = fs::read(path)?;
    Ok(compute_hash(&content))
}

fn notify(on_file: FileCallback<'_>, status: &str, destination: &str) {
    if let Some(f) = on_file {
        f(status, destination);
    }
}

/// Render one output and write it unless the file already holds the same bytes
fn materialize(
    target_root: &Path,
    destination: &str,
    output: &PlannedOutput,
    result: &mut BuildResult,
    on_file: FileCallback<'_>,
) -> Result<()> {
    let path = target_root.join(destination);

    if matches!(output, PlannedOutput::Removed) {
        if path.is_file() {
            fs::remove_file(&path)?;
            if let Some(parent) = path.parent() {
                let _ = remove_empty_dirs(parent, target_root);
            }
            notify(on_file, "DEL", destination);
            result.removed += 1;
        }
        return Ok(());
    }

    let content = output.render()?;
    if path.is_file() && compute_file_hash(&path)? == compute_hash(&content) {
        notify(on_file, "SKIP", destination);
        result.unchanged += 1;
        return Ok(());
    }

    clear_way(target_root, &path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, &content)?;
    notify(on_file, "OK", destination);
    result.written += 1;
    Ok(())
}

/// Drop a directory standing at `path` and any file standing where one of
/// its parent directories has to go
fn clear_way(target_root: &Path, path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    }
    for ancestor in path.ancestors().skip(1) {
        if ancestor == target_root || !ancestor.starts_with(target_root) {
            break;
        }
        if ancestor.is_file() {
            fs::remove_file(ancestor)?;
        }
    }
    Ok(())
}

fn remove_empty_dirs(dir: &Path, root: &Path) -> std::io::Result<()> {
    if dir == root || !dir.starts_with(root) {
        return Ok(());
    }

    if dir.is_dir() && fs::read_dir(dir)?.next().is_none() {
        fs::remove_dir(dir)?;
        if let Some(parent) = dir.parent() {
            remove_empty_dirs(parent, root)?;
        }
    }

    Ok(())
}
