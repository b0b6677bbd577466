//! Zip/jar helpers shared by descriptor extraction, mapping expansion and
//! artifact materialization.
//!
//! Everything written here is deterministic: entries are sorted by name and
//! stamped with the DOS epoch, so equal inputs produce byte-identical archives.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{DistError, Result};

/// Read a single entry from an archive, `None` if the entry does not exist
pub fn read_entry(archive: &Path, entry: &str) -> Result<Option<Vec<u8>>> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;

    let content = match zip.by_name(entry) {
        Ok(mut f) => {
            let mut buf = Vec::with_capacity(f.size() as usize);
            f.read_to_end(&mut buf)?;
            Some(buf)
        }
        Err(ZipError::FileNotFound) => None,
        Err(e) => return Err(e.into()),
    };

    Ok(content)
}

/// Read an entry that must exist
pub fn require_entry(archive: &Path, entry: &str) -> Result<Vec<u8>> {
    if !archive.is_file() {
        return Err(DistError::SourceMissing {
            path: archive.to_path_buf(),
        });
    }
    read_entry(archive, entry)?.ok_or_else(|| DistError::ArchiveEntryMissing {
        archive: archive.to_path_buf(),
        entry: entry.to_string(),
    })
}

/// List file entry names (directories excluded), sorted
pub fn entry_names(archive: &Path) -> Result<Vec<String>> {
    let file = File::open(archive)?;
    let zip = ZipArchive::new(file)?;

    let mut names: Vec<String> = zip
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(String::from)
        .collect();
    names.sort();
    Ok(names)
}

/// Read every file entry of an archive into memory
pub fn read_all_entries(archive: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    let mut entries = BTreeMap::new();

    for i in 0..zip.len() {
        let mut f = zip.by_index(i)?;
        if f.is_dir() {
            continue;
        }
        let mut buf = Vec::with_capacity(f.size() as usize);
        f.read_to_end(&mut buf)?;
        entries.insert(f.name().to_string(), buf);
    }

    Ok(entries)
}

/// In-memory archive that is written out in one deterministic pass
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    directories: BTreeSet<String>,
    entries: BTreeMap<String, Vec<u8>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, name: impl Into<String>, content: Vec<u8>) {
        self.entries.insert(name.into(), content);
    }

    pub fn add_directory(&mut self, name: impl Into<String>) {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        self.directories.insert(name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.directories.is_empty()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.write(File::create(path)?)?;
        Ok(())
    }

    /// Archive bytes, identical to what [`write_to`](Self::write_to) produces
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.write(Cursor::new(Vec::new()))?.into_inner())
    }

    fn write<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644);

        for dir in &self.directories {
            zip.add_directory(dir.as_str(), options.unix_permissions(0o755))?;
        }
        for (name, content) in &self.entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(content)?;
        }

        Ok(zip.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_and_read_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out/test.jar");

        let mut builder = ArchiveBuilder::new();
        builder.insert("b.txt", b"b".to_vec());
        builder.insert("a/a.txt", b"a".to_vec());
        builder.add_directory("a");
        builder.write_to(&path).unwrap();

        assert_eq!(entry_names(&path).unwrap(), vec!["a/a.txt", "b.txt"]);
        assert_eq!(read_entry(&path, "b.txt").unwrap(), Some(b"b".to_vec()));
        assert_eq!(read_entry(&path, "missing").unwrap(), None);
    }

    #[test]
    fn insert_replaces_existing_entry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.jar");

        let mut builder = ArchiveBuilder::new();
        builder.insert("x", b"first".to_vec());
        builder.insert("x", b"second".to_vec());
        builder.write_to(&path).unwrap();

        assert_eq!(builder.len(), 1);
        assert_eq!(require_entry(&path, "x").unwrap(), b"second".to_vec());
    }

    #[test]
    fn output_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first.jar");
        let second = temp.path().join("second.jar");

        let mut a = ArchiveBuilder::new();
        a.insert("z", b"z".to_vec());
        a.insert("a", b"a".to_vec());
        a.write_to(&first).unwrap();

        let mut b = ArchiveBuilder::new();
        b.insert("a", b"a".to_vec());
        b.insert("z", b"z".to_vec());
        b.write_to(&second).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
        assert_eq!(a.to_bytes().unwrap(), fs::read(&first).unwrap());
    }

    #[test]
    fn require_entry_reports_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.jar");
        ArchiveBuilder::new().write_to(&path).unwrap();

        let err = require_entry(&path, "nope").unwrap_err();
        assert!(matches!(err, DistError::ArchiveEntryMissing { .. }));

        let err = require_entry(&temp.path().join("absent.jar"), "x").unwrap_err();
        assert!(matches!(err, DistError::SourceMissing { .. }));
    }
}
