//! Directory scans that feed the plugin index
//!
//! Both scans visit entries in file-name order so repeated scans of an
//! unchanged tree produce the same index.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::IndexEntry;
use crate::descriptor::PluginDescriptor;

/// Exploded plugin directories, one descriptor each
pub const PLUGINS_DIR: &str = "plugins";

/// Platform module jars, indexed as opaque dependency-free units
pub const MODULES_DIR: &str = "lib/modules";

/// Scan `<root>/plugins/*`, skipping directories without a readable descriptor
pub fn scan_plugins(root: &Path) -> Vec<(String, IndexEntry)> {
    let dir = root.join(PLUGINS_DIR);
    let children = match sorted_children(&dir) {
        Ok(children) => children,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %dir.display(), error = %e, "Cannot list plugins directory");
            }
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for plugin_dir in children.into_iter().filter(|p| p.is_dir()) {
        match PluginDescriptor::from_plugin_dir(&plugin_dir) {
            Ok(descriptor) => {
                debug!(id = %descriptor.id, path = %plugin_dir.display(), "Indexed plugin");
                found.push((
                    descriptor.id.clone(),
                    IndexEntry {
                        install_root: plugin_dir,
                        descriptor,
                    },
                ));
            }
            Err(e) => {
                warn!(path = %plugin_dir.display(), error = %e, "Skipping plugin directory");
            }
        }
    }
    found
}

/// Scan `<root>/lib/modules/*.jar`; each jar becomes an entry keyed by its
/// file stem with an id-only descriptor
pub fn scan_modules(root: &Path) -> Vec<(String, IndexEntry)> {
    let dir = root.join(MODULES_DIR);
    let children = match sorted_children(&dir) {
        Ok(children) => children,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %dir.display(), error = %e, "Cannot list platform modules");
            }
            return Vec::new();
        }
    };

    children
        .into_iter()
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "jar"))
        .filter_map(|jar| {
            let id = jar.file_stem()?.to_string_lossy().to_string();
            debug!(id = %id, "Indexed platform module");
            Some((
                id.clone(),
                IndexEntry {
                    install_root: jar,
                    descriptor: PluginDescriptor::with_id(id),
                },
            ))
        })
        .collect()
}

fn sorted_children(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut children = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect::<Vec<_>>();
    children.sort();
    Ok(children)
}
