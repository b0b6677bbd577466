//! Plugin descriptor (`META-INF/plugin.xml`) model
//!
//! Only the identity, compatibility and dependency subset of the manifest is
//! read and written. Parsing never resolves DTDs or external entities: a
//! document carrying a `<!DOCTYPE>` is rejected outright.

use std::fmt::Write as _;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node, ParsingOptions};
use serde::Serialize;
use tracing::warn;

use crate::archive;
use crate::error::{DistError, Result};

/// Location of the descriptor inside a plugin jar
pub const PLUGIN_XML_ENTRY: &str = "META-INF/plugin.xml";

/// Legacy inline marker for optional dependencies
const LEGACY_OPTIONAL_PREFIX: &str = "(optional) ";

const ARCHIVE_SEPARATOR: &str = "!/";

/// Identity, version, compatibility and dependency metadata of one plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub version: String,
    /// Empty means unconstrained
    pub since_build: String,
    /// Empty means unconstrained
    pub until_build: String,
    pub dependencies: Vec<PluginDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDependency {
    pub id: String,
    pub optional: bool,
}

impl PluginDependency {
    pub fn required(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            optional: false,
        }
    }

    pub fn optional(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            optional: true,
        }
    }

    /// Normalize a `<depends>` tag.
    ///
    /// Either form marks the dependency optional: `optional="true"` or the
    /// legacy `(optional) ` prefix in the text, which is stripped from the id.
    fn from_node(node: Node<'_, '_>) -> Self {
        let text = node.text().unwrap_or_default().trim();
        let (id, legacy_optional) = match text.strip_prefix(LEGACY_OPTIONAL_PREFIX) {
            Some(rest) => (rest.trim(), true),
            None => (text, false),
        };
        let attribute_optional = node.attribute("optional") == Some("true");

        Self {
            id: id.to_string(),
            optional: legacy_optional || attribute_optional,
        }
    }
}

/// Where to read a descriptor from: a plain file or an entry inside an
/// archive, written `path/to/plugin.jar!/META-INF/plugin.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorLocator {
    File(PathBuf),
    ArchiveEntry { archive: PathBuf, entry: String },
}

impl DescriptorLocator {
    pub fn parse(locator: &str) -> Self {
        match locator.split_once(ARCHIVE_SEPARATOR) {
            Some((archive, entry)) => Self::ArchiveEntry {
                archive: PathBuf::from(archive),
                entry: entry.to_string(),
            },
            None => Self::File(PathBuf::from(locator)),
        }
    }
}

impl std::fmt::Display for DescriptorLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::ArchiveEntry { archive, entry } => {
                write!(f, "{}{}{}", archive.display(), ARCHIVE_SEPARATOR, entry)
            }
        }
    }
}

impl PluginDescriptor {
    /// Minimal descriptor carrying only an identifier
    pub fn with_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    /// Parse descriptor markup
    pub fn parse(xml: &str) -> Result<Self> {
        let options = ParsingOptions {
            allow_dtd: false,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(xml, options).map_err(|e| {
            DistError::DescriptorParse {
                message: e.to_string(),
            }
        })?;
        let root = doc.root_element();

        let mut id = child_text(root, "id");
        let mut name = child_text(root, "name");
        if id.is_empty() {
            id = name.clone();
        }
        if name.is_empty() {
            name = id.clone();
        }
        if id.is_empty() {
            return Err(DistError::DescriptorParse {
                message: "descriptor has neither <id> nor <name>".to_string(),
            });
        }

        let compatibility = root.descendants().find(|n| n.has_tag_name("idea-version"));
        let range_attr = |attr: &str| {
            compatibility
                .and_then(|n| n.attribute(attr))
                .unwrap_or_default()
                .to_string()
        };

        let dependencies = root
            .children()
            .filter(|n| n.has_tag_name("depends"))
            .map(PluginDependency::from_node)
            .filter(|d| !d.id.is_empty())
            .collect();

        Ok(Self {
            id,
            name,
            vendor: child_text(root, "vendor"),
            version: child_text(root, "version"),
            since_build: range_attr("since-build"),
            until_build: range_attr("until-build"),
            dependencies,
        })
    }

    /// Parse descriptor markup from a byte stream
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut xml = String::new();
        reader.read_to_string(&mut xml)?;
        Self::parse(&xml)
    }

    /// Load a descriptor from a file or archive entry
    pub fn load(locator: &DescriptorLocator) -> Result<Self> {
        match locator {
            DescriptorLocator::File(path) => {
                let file = fs::File::open(path)?;
                Self::from_reader(file)
            }
            DescriptorLocator::ArchiveEntry { archive, entry } => {
                let bytes = archive::require_entry(archive, entry)?;
                Self::from_reader(bytes.as_slice())
            }
        }
    }

    /// Find and load the descriptor of an installed (exploded) plugin directory.
    ///
    /// Checks `META-INF/plugin.xml`, `classes/META-INF/plugin.xml`, then each
    /// `lib/*.jar` in name order.
    pub fn from_plugin_dir(dir: &Path) -> Result<Self> {
        for candidate in [
            dir.join(PLUGIN_XML_ENTRY),
            dir.join("classes").join(PLUGIN_XML_ENTRY),
        ] {
            if candidate.is_file() {
                return Self::load(&DescriptorLocator::File(candidate));
            }
        }

        let lib_dir = dir.join("lib");
        if lib_dir.is_dir() {
            let mut jars: Vec<PathBuf> = fs::read_dir(&lib_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "jar"))
                .collect();
            jars.sort();

            for jar in jars {
                match archive::read_entry(&jar, PLUGIN_XML_ENTRY) {
                    Ok(Some(bytes)) => return Self::from_reader(bytes.as_slice()),
                    Ok(None) => {}
                    Err(e) => warn!(jar = %jar.display(), error = %e, "Skipping unreadable jar"),
                }
            }
        }

        Err(DistError::DescriptorNotFound {
            path: dir.to_path_buf(),
        })
    }

    /// Serialize to minimal descriptor markup
    pub fn to_xml_str(&self) -> String {
        let mut xml = String::from("<idea-plugin>\n");

        push_tag(&mut xml, "id", &self.id);
        push_tag(&mut xml, "name", &self.name);
        if !self.vendor.is_empty() {
            push_tag(&mut xml, "vendor", &self.vendor);
        }
        if !self.version.is_empty() {
            push_tag(&mut xml, "version", &self.version);
        }

        if !self.since_build.is_empty() || !self.until_build.is_empty() {
            xml.push_str("  <idea-version");
            if !self.since_build.is_empty() {
                let _ = write!(xml, " since-build=\"{}\"", escape(&self.since_build));
            }
            if !self.until_build.is_empty() {
                let _ = write!(xml, " until-build=\"{}\"", escape(&self.until_build));
            }
            xml.push_str("/>\n");
        }

        for dep in &self.dependencies {
            let _ = writeln!(
                xml,
                "  <depends optional=\"{}\">{}</depends>",
                dep.optional,
                escape(&dep.id)
            );
        }

        xml.push_str("</idea-plugin>\n");
        xml
    }
}

fn child_text(parent: Node<'_, '_>, tag: &str) -> String {
    parent
        .children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

fn push_tag(xml: &mut String, tag: &str, value: &str) {
    let _ = writeln!(xml, "  <{tag}>{}</{tag}>", escape(value));
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
