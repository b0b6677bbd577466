//! Plugin Index
//!
//! Persistent lookup from plugin id to install location and descriptor for
//! one platform root. The index is opened in two explicit phases: load the
//! `plugins.idx` file or rebuild it from a directory scan, then serve lookups
//! from memory. `put` writes through to disk immediately.
//!
//! Load problems of any kind (I/O, wrong version, corrupt bytes, entries that
//! no longer resolve) discard the file and rebuild. Save problems are logged
//! and the in-memory index stays authoritative for the process.

pub mod codec;
pub mod scan;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::descriptor::PluginDescriptor;
use crate::error::{DistError, Result};
use codec::RawIndex;

pub use codec::INDEX_FORMAT_VERSION;

/// Index file name at the platform root
pub const INDEX_FILE: &str = "plugins.idx";

/// Which directory scan wins when a plugin directory and a platform module
/// share an id. The winner is the one merged second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanPrecedence {
    #[default]
    ModulesWin,
    PluginsWin,
}

impl ScanPrecedence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModulesWin => "modules-win",
            Self::PluginsWin => "plugins-win",
        }
    }
}

impl std::fmt::Display for ScanPrecedence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ScanPrecedence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "modules-win" => Ok(Self::ModulesWin),
            "plugins-win" => Ok(Self::PluginsWin),
            other => Err(format!("unknown precedence '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    #[serde(default)]
    pub precedence: ScanPrecedence,
}

/// One indexed plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Absolute install location (plugin directory or module jar)
    pub install_root: PathBuf,
    pub descriptor: PluginDescriptor,
}

#[derive(Debug)]
pub struct PluginIndex {
    root: PathBuf,
    options: IndexOptions,
    entries: BTreeMap<String, IndexEntry>,
}

impl PluginIndex {
    /// Open the index for a platform root with default options
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::open_with(root, IndexOptions::default())
    }

    /// Load `<root>/plugins.idx`, or rebuild and persist it from a scan
    pub fn open_with(root: impl Into<PathBuf>, options: IndexOptions) -> Self {
        let mut index = Self {
            root: root.into(),
            options,
            entries: BTreeMap::new(),
        };

        let path = index.index_path();
        if path.exists() {
            match index.load() {
                Ok(entries) => {
                    debug!(path = %path.display(), entries = entries.len(), "Loaded plugin index");
                    index.entries = entries;
                    return index;
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Discarding plugin index, rebuilding"
                    );
                    if let Err(e) = fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %e, "Cannot delete plugin index");
                    }
                }
            }
        }

        index.rebuild();
        index
    }

    /// Rescan the platform root and persist the result
    pub fn rebuild(&mut self) {
        self.entries = self.scan();
        info!(
            root = %self.root.display(),
            entries = self.entries.len(),
            "Built plugin index"
        );
        self.persist();
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn options(&self) -> IndexOptions {
        self.options
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn install_root(&self, id: &str) -> Option<&Path> {
        self.entries.get(id).map(|e| e.install_root.as_path())
    }

    pub fn descriptor(&self, id: &str) -> Option<&PluginDescriptor> {
        self.entries.get(id).map(|e| &e.descriptor)
    }

    /// All descriptors, ordered by id
    pub fn all_descriptors(&self) -> Vec<&PluginDescriptor> {
        self.entries.values().map(|e| &e.descriptor).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.entries.iter().map(|(id, e)| (id.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the entry for `descriptor.id` and rewrite the index file.
    ///
    /// A relative `install_root` is taken relative to the current directory.
    pub fn put(
        &mut self,
        descriptor: PluginDescriptor,
        install_root: impl Into<PathBuf>,
    ) -> Option<IndexEntry> {
        let previous = self.entries.insert(
            descriptor.id.clone(),
            IndexEntry {
                install_root: absolute(install_root.into()),
                descriptor,
            },
        );
        self.persist();
        previous
    }

    fn scan(&self) -> BTreeMap<String, IndexEntry> {
        let plugins = scan::scan_plugins(&self.root);
        let modules = scan::scan_modules(&self.root);
        let (first, second) = match self.options.precedence {
            ScanPrecedence::ModulesWin => (plugins, modules),
            ScanPrecedence::PluginsWin => (modules, plugins),
        };

        let mut entries: BTreeMap<String, IndexEntry> = first.into_iter().collect();
        for (id, entry) in second {
            if let Some(replaced) = entries.get(&id) {
                warn!(
                    id = %id,
                    kept = %entry.install_root.display(),
                    replaced = %replaced.install_root.display(),
                    precedence = %self.options.precedence,
                    "Plugin id found in both plugins and platform modules"
                );
            }
            entries.insert(id, entry);
        }
        entries
    }

    fn load(&self) -> Result<BTreeMap<String, IndexEntry>> {
        let file = File::open(self.index_path())?;
        let raw = codec::read_index(&mut BufReader::new(file))?;

        let mut entries = BTreeMap::new();
        for (relative, xml) in raw.paths.iter().zip(&raw.descriptors) {
            let descriptor = PluginDescriptor::parse(xml)?;
            let install_root = self.root.join(relative);
            if !install_root.exists() {
                return Err(DistError::IndexCorrupt {
                    message: format!("install root {} no longer exists", install_root.display()),
                });
            }

            let id = descriptor.id.clone();
            let entry = IndexEntry {
                install_root,
                descriptor,
            };
            if entries.insert(id.clone(), entry).is_some() {
                return Err(DistError::IndexCorrupt {
                    message: format!("duplicate entry for {id}"),
                });
            }
        }

        Ok(entries)
    }

    fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;

        let mut raw = RawIndex::default();
        for entry in self.entries.values() {
            let relative = relative_path(&entry.install_root, &self.root);
            raw.paths.push(relative.to_string_lossy().to_string());
            raw.descriptors.push(entry.descriptor.to_xml_str());
        }

        // Replace atomically so a failed write never leaves a half-written index
        let path = self.index_path();
        let tmp = path.with_extension("idx.tmp");
        let result = File::create(&tmp)
            .and_then(|file| codec::write_index(&mut BufWriter::new(file), &raw))
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!(
                path = %self.index_path().display(),
                error = %e,
                "Cannot save plugin index, continuing with in-memory entries"
            );
        }
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot resolve relative install root");
            path
        }
    }
}

/// Express `path` relative to `base`, falling back to `path` itself when
/// the two share no root
fn relative_path(path: &Path, base: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix(base) {
        return stripped.to_path_buf();
    }
    if path.is_absolute() != base.is_absolute() {
        return path.to_path_buf();
    }

    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return path.to_path_buf();
    }

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_os_str());
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveBuilder;
    use crate::descriptor::{PluginDependency, PLUGIN_XML_ENTRY};
    use tempfile::TempDir;

    fn descriptor(id: &str) -> PluginDescriptor {
        PluginDescriptor {
            id: id.to_string(),
            name: format!("{id} name"),
            vendor: "Vendor".to_string(),
            version: "1.0".to_string(),
            since_build: "231".to_string(),
            until_build: String::new(),
            dependencies: vec![PluginDependency::required("com.intellij.modules.lang")],
        }
    }

    fn add_exploded_plugin(root: &Path, dir: &str, id: &str) {
        let meta = root.join("plugins").join(dir).join("META-INF");
        fs::create_dir_all(&meta).unwrap();
        fs::write(meta.join("plugin.xml"), descriptor(id).to_xml_str()).unwrap();
    }

    fn add_jar_plugin(root: &Path, dir: &str, id: &str) {
        let jar = root.join("plugins").join(dir).join("lib").join(format!("{dir}.jar"));
        let mut builder = ArchiveBuilder::new();
        builder.insert(PLUGIN_XML_ENTRY, descriptor(id).to_xml_str().into_bytes());
        builder.write_to(&jar).unwrap();
    }

    fn add_module(root: &Path, name: &str) {
        let modules = root.join("lib/modules");
        fs::create_dir_all(&modules).unwrap();
        ArchiveBuilder::new()
            .write_to(&modules.join(format!("{name}.jar")))
            .unwrap();
    }

    fn id_paths(index: &PluginIndex) -> Vec<(String, PathBuf)> {
        index
            .entries()
            .map(|(id, e)| (id.to_string(), e.install_root.clone()))
            .collect()
    }

    fn sample_root() -> TempDir {
        let temp = TempDir::new().unwrap();
        add_exploded_plugin(temp.path(), "alpha", "org.alpha");
        add_jar_plugin(temp.path(), "beta", "org.beta");
        add_module(temp.path(), "intellij.platform.vcs");
        temp
    }

    #[test]
    fn builds_and_persists_from_scan() {
        let temp = sample_root();
        let index = PluginIndex::open(temp.path());

        assert_eq!(index.len(), 3);
        assert!(index.contains("org.alpha"));
        assert!(index.contains("org.beta"));
        assert_eq!(
            index.install_root("org.beta"),
            Some(temp.path().join("plugins/beta").as_path())
        );
        assert_eq!(index.descriptor("org.alpha"), Some(&descriptor("org.alpha")));
        assert!(index.index_path().exists());
    }

    #[test]
    fn reopen_loads_same_entries() {
        let temp = sample_root();
        let first = PluginIndex::open(temp.path());
        let second = PluginIndex::open(temp.path());

        assert_eq!(id_paths(&first), id_paths(&second));
        assert_eq!(first.all_descriptors(), second.all_descriptors());
    }

    #[test]
    fn rebuild_is_idempotent() {
        let temp = sample_root();
        let mut index = PluginIndex::open(temp.path());
        let before = id_paths(&index);

        index.rebuild();
        assert_eq!(id_paths(&index), before);
    }

    #[test]
    fn broken_plugin_dir_is_skipped() {
        let temp = sample_root();
        fs::create_dir_all(temp.path().join("plugins/broken/lib")).unwrap();
        let meta = temp.path().join("plugins/garbage/META-INF");
        fs::create_dir_all(&meta).unwrap();
        fs::write(meta.join("plugin.xml"), "<idea-plugin><id>").unwrap();

        let index = PluginIndex::open(temp.path());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn module_entries_are_dependency_free() {
        let temp = sample_root();
        let index = PluginIndex::open(temp.path());

        let module = index.descriptor("intellij.platform.vcs").unwrap();
        assert!(module.dependencies.is_empty());
        assert!(module.version.is_empty());
        assert_eq!(
            index.install_root("intellij.platform.vcs"),
            Some(temp.path().join("lib/modules/intellij.platform.vcs.jar").as_path())
        );
    }

    #[test]
    fn module_and_plugin_with_different_ids_coexist() {
        let temp = TempDir::new().unwrap();
        add_exploded_plugin(temp.path(), "foo", "org.foo");
        add_module(temp.path(), "foo");

        let index = PluginIndex::open(temp.path());
        assert!(index.contains("foo"));
        assert!(index.contains("org.foo"));
    }

    #[test]
    fn key_collision_follows_precedence() {
        let temp = TempDir::new().unwrap();
        add_exploded_plugin(temp.path(), "foo", "foo");
        add_module(temp.path(), "foo");

        let modules_win = PluginIndex::open(temp.path());
        assert_eq!(
            modules_win.install_root("foo"),
            Some(temp.path().join("lib/modules/foo.jar").as_path())
        );
        assert!(modules_win.descriptor("foo").unwrap().dependencies.is_empty());

        fs::remove_file(temp.path().join(INDEX_FILE)).unwrap();
        let plugins_win = PluginIndex::open_with(
            temp.path(),
            IndexOptions {
                precedence: ScanPrecedence::PluginsWin,
            },
        );
        assert_eq!(
            plugins_win.install_root("foo"),
            Some(temp.path().join("plugins/foo").as_path())
        );
    }

    #[test]
    fn wrong_version_triggers_rebuild() {
        let temp = sample_root();
        let expected = id_paths(&PluginIndex::open(temp.path()));

        let path = temp.path().join(INDEX_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0..4].copy_from_slice(&(INDEX_FORMAT_VERSION + 7).to_be_bytes());
        fs::write(&path, bytes).unwrap();

        let index = PluginIndex::open(temp.path());
        assert_eq!(id_paths(&index), expected);

        let rewritten = fs::read(&path).unwrap();
        assert_eq!(&rewritten[0..4], &INDEX_FORMAT_VERSION.to_be_bytes());
    }

    #[test]
    fn corrupt_file_behaves_like_missing_file() {
        let temp = sample_root();
        let expected = id_paths(&PluginIndex::open(temp.path()));

        let path = temp.path().join(INDEX_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert_eq!(id_paths(&PluginIndex::open(temp.path())), expected);

        fs::write(&path, b"not an index at all").unwrap();
        assert_eq!(id_paths(&PluginIndex::open(temp.path())), expected);
    }

    #[test]
    fn loaded_index_is_used_without_rescan() {
        let temp = sample_root();
        PluginIndex::open(temp.path());

        // New plugin directories are invisible until a rebuild
        add_exploded_plugin(temp.path(), "gamma", "org.gamma");
        let mut index = PluginIndex::open(temp.path());
        assert!(!index.contains("org.gamma"));

        index.rebuild();
        assert!(index.contains("org.gamma"));
    }

    #[test]
    fn moved_entry_invalidates_index() {
        let temp = sample_root();
        PluginIndex::open(temp.path());

        fs::rename(
            temp.path().join("plugins/alpha"),
            temp.path().join("plugins/alpha-moved"),
        )
        .unwrap();

        let index = PluginIndex::open(temp.path());
        assert_eq!(
            index.install_root("org.alpha"),
            Some(temp.path().join("plugins/alpha-moved").as_path())
        );
    }

    #[test]
    fn relocated_root_stays_valid() {
        let temp = TempDir::new().unwrap();
        let first_root = temp.path().join("first_root");
        add_exploded_plugin(&first_root, "alpha", "org.alpha");
        PluginIndex::open(&first_root);

        let relocated = temp.path().join("relocated");
        fs::rename(&first_root, &relocated).unwrap();
        // A rescan could no longer read this descriptor
        fs::write(relocated.join("plugins/alpha/META-INF/plugin.xml"), "broken").unwrap();

        let index = PluginIndex::open(&relocated);
        assert_eq!(
            index.install_root("org.alpha"),
            Some(relocated.join("plugins/alpha").as_path())
        );
    }

    #[test]
    fn put_writes_through() {
        let temp = sample_root();
        let mut index = PluginIndex::open(temp.path());

        let external = temp.path().join("sandbox/org.delta");
        fs::create_dir_all(&external).unwrap();
        assert!(index.put(descriptor("org.delta"), &external).is_none());

        let reopened = PluginIndex::open(temp.path());
        assert_eq!(reopened.install_root("org.delta"), Some(external.as_path()));
        assert_eq!(reopened.descriptor("org.delta"), Some(&descriptor("org.delta")));
    }

    #[test]
    fn put_replaces_existing_entry() {
        let temp = sample_root();
        let mut index = PluginIndex::open(temp.path());

        let mut updated = descriptor("org.alpha");
        updated.version = "2.0".to_string();
        let previous = index.put(updated.clone(), temp.path().join("plugins/alpha"));

        assert_eq!(previous.unwrap().descriptor.version, "1.0");
        assert_eq!(index.len(), 3);
        assert_eq!(
            PluginIndex::open(temp.path()).descriptor("org.alpha"),
            Some(&updated)
        );
    }

    #[test]
    fn put_outside_root_is_stored_relative() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("platform");
        fs::create_dir_all(&root).unwrap();
        let mut index = PluginIndex::open(&root);

        let outside = temp.path().join("elsewhere/plugin");
        fs::create_dir_all(&outside).unwrap();
        index.put(descriptor("org.outside"), &outside);

        let reopened = PluginIndex::open(&root);
        let stored = reopened.install_root("org.outside").unwrap();
        assert_eq!(stored.canonicalize().unwrap(), outside.canonicalize().unwrap());
    }

    #[test]
    fn put_with_relative_path_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("platform");
        fs::create_dir_all(&root).unwrap();
        let outside = temp.path().join("sandbox/org.rel");
        fs::create_dir_all(&outside).unwrap();

        let cwd = std::env::current_dir().unwrap();
        let relative = relative_path(&outside, &cwd);
        assert!(relative.is_relative());

        let mut index = PluginIndex::open(&root);
        index.put(descriptor("org.rel"), relative);
        assert!(index.install_root("org.rel").unwrap().is_absolute());

        let reopened = PluginIndex::open(&root);
        assert!(reopened.contains("org.rel"));
        let stored = reopened.install_root("org.rel").unwrap();
        assert_eq!(stored.canonicalize().unwrap(), outside.canonicalize().unwrap());
    }

    #[test]
    fn relative_path_cases() {
        assert_eq!(
            relative_path(Path::new("/a/b/c"), Path::new("/a")),
            PathBuf::from("b/c")
        );
        assert_eq!(
            relative_path(Path::new("/a/x/y"), Path::new("/a/b")),
            PathBuf::from("../x/y")
        );
        assert_eq!(
            relative_path(Path::new("rel/p"), Path::new("/abs")),
            PathBuf::from("rel/p")
        );
    }
}
