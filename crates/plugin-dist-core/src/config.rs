use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DistError, Result};
use crate::index::{IndexOptions, ScanPrecedence};
use crate::packaging::{BuildGraph, LibrarySpec, PackagingRules, ProjectSpec};

pub const CONFIG_FILE: &str = "plugin-dist.toml";

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# plugin-dist build description
# Relative paths resolve against the directory holding this file.

# Project whose archive receives merged content
root = "my-plugin"

[packaging]
# Top-level directory of the plugin layout
plugin_name = "MyPlugin"

# Unpack libraries into the root archive instead of copying them to lib/
assemble_libraries = false

# Globs over paths inside the plugin archives
# Example: exclude = ["**/*.kotlin_module", "test-data/**"]
exclude = []

# Per-library overrides; target "drop" leaves the library out
# [[packaging.library_mapping]]
# pattern = "org.jetbrains:annotations:*"
# target = "drop"

# Extra files copied into the layout
# [[packaging.file_mapping]]
# from = "LICENSE"
# to = "LICENSE"

# Package relocation for bundled libraries
# [[packaging.shade]]
# from = "com.google.gson"
# to = "myplugin.shaded.gson"

[[project]]
name = "my-plugin"
output_dirs = ["build/classes", "build/resources"]
dependencies = []
libraries = []
# method = "standalone"   # merge-into-parent | standalone | skip
# method = { custom = { directory = "lib/modules" } }

# Libraries as resolved by the build tool
# [[library]]
# coordinate = "com.google.code.gson:gson:2.10.1"
# files = ["libs/gson-2.10.1.jar"]

[index]
# Which scan wins when a plugin id appears in both plugins/ and lib/modules/
# modules-win | plugins-win
precedence = "modules-win"
"#;

/// Build description: project graph, libraries and packaging rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistConfig {
    #[serde(default)]
    pub root: String,

    #[serde(default)]
    pub packaging: PackagingRules,

    #[serde(default, rename = "project")]
    pub projects: Vec<ProjectSpec>,

    #[serde(default, rename = "library")]
    pub libraries: Vec<LibrarySpec>,

    #[serde(default)]
    pub index: IndexOptions,

    /// Directory relative paths resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl DistConfig {
    /// Load config from a file, defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        if !path.exists() {
            return Ok(Self {
                base_dir,
                ..Self::default()
            });
        }

        let content = fs::read_to_string(path)?;
        let mut config: DistConfig =
            toml::from_str(&content).map_err(|e| DistError::ConfigParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.base_dir = base_dir;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| DistError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        fs::write(path, content)?;
        Ok(())
    }

    /// Initialize config with default template (rich comments)
    pub fn init(path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !path.exists() {
            fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path.to_path_buf())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Build graph with paths resolved against the config directory
    pub fn build_graph(&self) -> BuildGraph {
        BuildGraph {
            root: self.root.clone(),
            projects: self
                .projects
                .iter()
                .map(|p| ProjectSpec {
                    output_dirs: p.output_dirs.iter().map(|d| self.resolve(d)).collect(),
                    ..p.clone()
                })
                .collect(),
            libraries: self
                .libraries
                .iter()
                .map(|l| LibrarySpec {
                    coordinate: l.coordinate.clone(),
                    files: l.files.iter().map(|f| self.resolve(f)).collect(),
                })
                .collect(),
        }
    }

    /// Packaging rules with file mapping sources resolved
    pub fn packaging_rules(&self) -> PackagingRules {
        let mut rules = self.packaging.clone();
        for mapping in &mut rules.file_mappings {
            mapping.from = self.resolve(&mapping.from);
        }
        rules
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "root" => Some(self.root.clone()),
            "packaging.plugin_name" => Some(self.packaging.plugin_name.clone()),
            "packaging.assemble_libraries" => Some(self.packaging.assemble_libraries.to_string()),
            "packaging.exclude" => Some(format!("{:?}", self.packaging.exclude)),
            "index.precedence" => Some(self.index.precedence.to_string()),
            _ => None,
        }
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || DistError::ConfigValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "root" => self.root = value.trim().to_string(),
            "packaging.plugin_name" => self.packaging.plugin_name = value.trim().to_string(),
            "packaging.assemble_libraries" => {
                self.packaging.assemble_libraries = value.trim().parse().map_err(|_| invalid())?
            }
            "packaging.exclude" => self.packaging.exclude = parse_string_list(value),
            "index.precedence" => {
                self.index.precedence =
                    value.trim().parse::<ScanPrecedence>().map_err(|_| invalid())?
            }
            _ => {
                return Err(DistError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        [
            "root",
            "packaging.plugin_name",
            "packaging.assemble_libraries",
            "packaging.exclude",
            "index.precedence",
        ]
        .into_iter()
        .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
        .collect()
    }
}

/// Parse a comma-separated or JSON-like list string
fn parse_string_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    inner
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::PackagingMethod;
    use tempfile::TempDir;

    #[test]
    fn template_parses() {
        let temp = TempDir::new().unwrap();
        let path = DistConfig::init(&temp.path().join(CONFIG_FILE)).unwrap();

        let config = DistConfig::load(&path).unwrap();
        assert_eq!(config.root, "my-plugin");
        assert_eq!(config.packaging.plugin_name, "MyPlugin");
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.index.precedence, ScanPrecedence::ModulesWin);
    }

    #[test]
    fn init_keeps_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "root = \"mine\"\n").unwrap();

        DistConfig::init(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "root = \"mine\"\n");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = DistConfig::load(&temp.path().join(CONFIG_FILE)).unwrap();
        assert!(config.root.is_empty());
        assert_eq!(config.base_dir(), temp.path());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
root = "app"

[packaging]
plugin_name = "App"

[[packaging.file_mapping]]
from = "LICENSE"
to = "LICENSE"

[[project]]
name = "app"
output_dirs = ["out/classes", "/abs/resources"]
libraries = ["g:a:1"]

[[project]]
name = "ui"
method = { custom = { directory = "lib/ui" } }

[[library]]
coordinate = "g:a:1"
files = ["libs/a-1.jar"]
"#,
        )
        .unwrap();

        let config = DistConfig::load(&path).unwrap();
        let graph = config.build_graph();
        assert_eq!(
            graph.projects[0].output_dirs,
            vec![temp.path().join("out/classes"), PathBuf::from("/abs/resources")]
        );
        assert_eq!(
            graph.projects[1].method,
            Some(PackagingMethod::Custom {
                directory: "lib/ui".to_string()
            })
        );
        assert_eq!(graph.libraries[0].files, vec![temp.path().join("libs/a-1.jar")]);
        assert_eq!(
            config.packaging_rules().file_mappings[0].from,
            temp.path().join("LICENSE")
        );
    }

    #[test]
    fn get_set_round_trip_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);

        let mut config = DistConfig::load(&path).unwrap();
        config.set("root", "core").unwrap();
        config.set("packaging.exclude", "**/*.md, test-data/**").unwrap();
        config.set("packaging.assemble_libraries", "true").unwrap();
        config.set("index.precedence", "plugins-win").unwrap();
        config.save(&path).unwrap();

        let loaded = DistConfig::load(&path).unwrap();
        assert_eq!(loaded.get("root").unwrap(), "core");
        assert_eq!(loaded.packaging.exclude, vec!["**/*.md", "test-data/**"]);
        assert!(loaded.packaging.assemble_libraries);
        assert_eq!(loaded.get("index.precedence").unwrap(), "plugins-win");
        assert_eq!(loaded.list().len(), 5);
    }

    #[test]
    fn set_rejects_bad_input() {
        let mut config = DistConfig::default();
        assert!(matches!(
            config.set("packaging.assemble_libraries", "maybe"),
            Err(DistError::ConfigValue { .. })
        ));
        assert!(matches!(
            config.set("index.precedence", "random"),
            Err(DistError::ConfigValue { .. })
        ));
        assert!(matches!(
            config.set("nope", "x"),
            Err(DistError::ConfigKeyNotFound { .. })
        ));
    }

    #[test]
    fn string_list_formats() {
        assert_eq!(parse_string_list(r#"["a", "b"]"#), vec!["a", "b"]);
        assert_eq!(parse_string_list("a,b"), vec!["a", "b"]);
        assert!(parse_string_list("[]").is_empty());
    }
}
