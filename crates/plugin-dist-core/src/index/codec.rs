//! # Plugin Index File Format
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ version (i32)                       │
//! ├─────────────────────────────────────┤
//! │ entry count (i32)                   │
//! ├─────────────────────────────────────┤
//! │ paths length (i32, == entry count)  │
//! │   └─ path[] (length-prefixed UTF-8) │
//! ├─────────────────────────────────────┤
//! │ xml length (i32, == entry count)    │
//! │   └─ xml[] (length-prefixed UTF-8)  │
//! └─────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. Paths are relative to the index root; `xml`
//! is the serialized descriptor of the entry at the same position.

use std::io::{self, Read, Write};

use crate::error::{DistError, Result};

/// Current index format version; any other value forces a rebuild
pub const INDEX_FORMAT_VERSION: i32 = 1;

/// Upper bound for a single string, anything larger is treated as corruption
const MAX_STRING_LEN: usize = 64 * 1024 * 1024;

/// Decoded index file before descriptors are parsed
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RawIndex {
    pub paths: Vec<String>,
    pub descriptors: Vec<String>,
}

pub fn write_index<W: Write>(writer: &mut W, raw: &RawIndex) -> io::Result<()> {
    if raw.paths.len() != raw.descriptors.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path and descriptor arrays differ in length",
        ));
    }

    write_i32(writer, INDEX_FORMAT_VERSION)?;
    write_len(writer, raw.paths.len())?;

    write_len(writer, raw.paths.len())?;
    for path in &raw.paths {
        write_length_prefixed(writer, path.as_bytes())?;
    }

    write_len(writer, raw.descriptors.len())?;
    for xml in &raw.descriptors {
        write_length_prefixed(writer, xml.as_bytes())?;
    }

    writer.flush()
}

pub fn read_index<R: Read>(reader: &mut R) -> Result<RawIndex> {
    let version = read_i32(reader)?;
    if version != INDEX_FORMAT_VERSION {
        return Err(DistError::IndexWrongVersion {
            found: version,
            expected: INDEX_FORMAT_VERSION,
        });
    }

    let count = read_len(reader)?;
    let paths = read_string_array(reader, count, "paths")?;
    let descriptors = read_string_array(reader, count, "descriptors")?;

    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(corrupt("trailing bytes after last entry"));
    }

    Ok(RawIndex { paths, descriptors })
}

fn read_string_array<R: Read>(reader: &mut R, expected: usize, what: &str) -> Result<Vec<String>> {
    let len = read_len(reader)?;
    if len != expected {
        return Err(corrupt(&format!(
            "{what} array has {len} elements, expected {expected}"
        )));
    }

    let mut items = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        let bytes = read_length_prefixed(reader)?;
        let item = String::from_utf8(bytes).map_err(|e| corrupt(&e.to_string()))?;
        items.push(item);
    }
    Ok(items)
}

fn write_i32<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

fn write_len<W: Write>(writer: &mut W, len: usize) -> io::Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds i32"))?;
    write_i32(writer, len)
}

/// Write length-prefixed data
fn write_length_prefixed<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    write_len(writer, data.len())?;
    writer.write_all(data)
}

fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_be_bytes(bytes))
}

fn read_len<R: Read>(reader: &mut R) -> Result<usize> {
    let len = read_i32(reader)?;
    usize::try_from(len).map_err(|_| corrupt(&format!("negative length {len}")))
}

/// Read length-prefixed data
fn read_length_prefixed<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = read_len(reader)?;
    if len > MAX_STRING_LEN {
        return Err(corrupt(&format!("string length {len} out of range")));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    Ok(data)
}

fn corrupt(message: &str) -> DistError {
    DistError::IndexCorrupt {
        message: message.to_string(),
    }
}
