//! Dependency structure extraction
//!
//! Walks the project graph from the root and decides, for every project and
//! library reached, which packaging method applies and which files belong to
//! it. Destinations are left to the mappings builder.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::model::{BuildGraph, LibraryCoordinate, PackagingMethod, PackagingRules, ProjectSpec};
use super::resolver::LibraryResolver;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Project,
    Library,
}

/// A file contributed by a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// `/`-separated path inside the node: relative to its output directory
    /// for projects, the archive file name for libraries
    pub relative: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureNode {
    /// Project name or library coordinate
    pub name: String,
    pub kind: NodeKind,
    /// Effective method, never `MergeIntoParent` without an owner
    pub method: PackagingMethod,
    /// Project whose archive receives this node's contents when merged
    pub owner: Option<String>,
    pub files: Vec<SourceFile>,
}

/// Packaging-relevant view of a build graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStructure {
    pub plugin_name: String,
    pub root: String,
    /// Projects in traversal order followed by libraries in first-use order
    pub nodes: Vec<StructureNode>,
}

impl DependencyStructure {
    pub fn node(&self, name: &str) -> Option<&StructureNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn projects(&self) -> impl Iterator<Item = &StructureNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Project)
    }

    pub fn libraries(&self) -> impl Iterator<Item = &StructureNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Library)
    }
}

pub struct DependencyStructureExtractor<'a> {
    graph: &'a BuildGraph,
    rules: &'a PackagingRules,
    resolver: &'a dyn LibraryResolver,
}

impl<'a> DependencyStructureExtractor<'a> {
    pub fn new(
        graph: &'a BuildGraph,
        rules: &'a PackagingRules,
        resolver: &'a dyn LibraryResolver,
    ) -> Self {
        Self {
            graph,
            rules,
            resolver,
        }
    }

    pub fn extract(&self) -> Result<DependencyStructure> {
        let mut visited = HashSet::new();
        let mut nodes = Vec::new();
        let mut library_order: Vec<String> = Vec::new();

        self.visit(
            &self.graph.root,
            None,
            &mut visited,
            &mut nodes,
            &mut library_order,
        )?;

        let mut seen = HashSet::new();
        for coordinate in library_order {
            let coordinate = LibraryCoordinate::parse(&coordinate)?;
            if !seen.insert(coordinate.clone()) {
                continue;
            }
            nodes.push(self.library_node(&coordinate)?);
        }

        Ok(DependencyStructure {
            plugin_name: self.rules.plugin_name.clone(),
            root: self.graph.root.clone(),
            nodes,
        })
    }

    fn visit(
        &self,
        name: &str,
        inherited_owner: Option<&str>,
        visited: &mut HashSet<String>,
        nodes: &mut Vec<StructureNode>,
        library_order: &mut Vec<String>,
    ) -> Result<()> {
        if !visited.insert(name.to_string()) {
            return Ok(());
        }

        let project = self.graph.project(name)?;
        let method = effective_method(project, inherited_owner);

        // Where this node's own files go, and what its dependencies merge into
        let (owner, child_owner) = match &method {
            PackagingMethod::MergeIntoParent => (inherited_owner, inherited_owner),
            PackagingMethod::Skip => (None, inherited_owner),
            PackagingMethod::Standalone | PackagingMethod::Custom { .. } => {
                (None, Some(project.name.as_str()))
            }
        };

        let files = if method == PackagingMethod::Skip {
            Vec::new()
        } else {
            collect_output_files(&project.output_dirs)
        };
        debug!(project = %name, method = ?method, files = files.len(), "Extracted project");

        nodes.push(StructureNode {
            name: project.name.clone(),
            kind: NodeKind::Project,
            method,
            owner: owner.map(String::from),
            files,
        });
        library_order.extend(project.libraries.iter().cloned());

        for dependency in &project.dependencies {
            self.visit(dependency, child_owner, visited, nodes, library_order)?;
        }

        Ok(())
    }

    fn library_node(&self, coordinate: &LibraryCoordinate) -> Result<StructureNode> {
        let method = match self.rules.library_override(coordinate)? {
            Some(mapping) => mapping.method(),
            None if self.rules.assemble_libraries => PackagingMethod::MergeIntoParent,
            None => PackagingMethod::Standalone,
        };
        let owner = (method == PackagingMethod::MergeIntoParent).then(|| self.graph.root.clone());

        let files = self
            .resolver
            .resolve(coordinate)?
            .into_iter()
            .map(|path| SourceFile {
                relative: file_name(&path),
                path,
            })
            .collect();

        Ok(StructureNode {
            name: coordinate.to_string(),
            kind: NodeKind::Library,
            method,
            owner,
            files,
        })
    }
}

fn effective_method(project: &ProjectSpec, inherited_owner: Option<&str>) -> PackagingMethod {
    match (&project.method, inherited_owner) {
        // Nothing to merge into
        (None, None) | (Some(PackagingMethod::MergeIntoParent), None) => {
            PackagingMethod::Standalone
        }
        (None, Some(_)) => PackagingMethod::MergeIntoParent,
        (Some(method), _) => method.clone(),
    }
}

/// Every file below the output directories, sorted per directory.
/// Missing directories contribute nothing.
fn collect_output_files(output_dirs: &[PathBuf]) -> Vec<SourceFile> {
    let mut files = Vec::new();
    for dir in output_dirs {
        if !dir.is_dir() {
            debug!(path = %dir.display(), "Output directory missing, skipped");
            continue;
        }

        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if let Ok(relative) = entry.path().strip_prefix(dir) {
                files.push(SourceFile {
                    relative: to_slash(relative),
                    path: entry.path().to_path_buf(),
                });
            }
        }
    }
    files
}

/// `/`-joined path components
pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| to_slash(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DistError;
    use crate::packaging::model::{LibraryMapping, LibrarySpec, DROP_TARGET};
    use crate::packaging::resolver::DeclaredArtifacts;
    use std::fs;
    use tempfile::TempDir;

    fn project(name: &str, dir: &Path, deps: &[&str], libs: &[&str]) -> ProjectSpec {
        ProjectSpec {
            name: name.to_string(),
            output_dirs: vec![dir.join(name).join("classes")],
            method: None,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            libraries: libs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn write(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, path.to_string_lossy().as_bytes()).unwrap();
    }

    fn fixture(temp: &TempDir) -> BuildGraph {
        let dir = temp.path();
        write(&dir.join("root/classes/org/root/Main.class"));
        write(&dir.join("root/classes/META-INF/plugin.xml"));
        write(&dir.join("core/classes/org/core/Core.class"));
        write(&dir.join("api/classes/org/api/Api.class"));
        write(&dir.join("libs/a-1.jar"));
        write(&dir.join("libs/b-2.jar"));

        let mut api = project("api", dir, &[], &["g:b:2", "g:a:1"]);
        api.method = Some(PackagingMethod::Standalone);

        BuildGraph {
            root: "root".to_string(),
            projects: vec![
                project("root", dir, &["core", "api"], &["g:a:1"]),
                project("core", dir, &["api"], &[]),
                api,
            ],
            libraries: vec![
                LibrarySpec {
                    coordinate: "g:a:1".to_string(),
                    files: vec![dir.join("libs/a-1.jar")],
                },
                LibrarySpec {
                    coordinate: "g:b:2".to_string(),
                    files: vec![dir.join("libs/b-2.jar")],
                },
            ],
        }
    }

    fn rules() -> PackagingRules {
        PackagingRules {
            plugin_name: "Demo".to_string(),
            ..PackagingRules::default()
        }
    }

    fn extract(graph: &BuildGraph, rules: &PackagingRules) -> Result<DependencyStructure> {
        let resolver = DeclaredArtifacts::new(&graph.libraries)?;
        DependencyStructureExtractor::new(graph, rules, &resolver).extract()
    }

    #[test]
    fn projects_get_effective_methods() {
        let temp = TempDir::new().unwrap();
        let graph = fixture(&temp);
        let structure = extract(&graph, &rules()).unwrap();

        let names: Vec<_> = structure.projects().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["root", "core", "api"]);

        let root = structure.node("root").unwrap();
        assert_eq!(root.method, PackagingMethod::Standalone);
        assert_eq!(root.owner, None);
        assert_eq!(
            root.files.iter().map(|f| f.relative.as_str()).collect::<Vec<_>>(),
            vec!["META-INF/plugin.xml", "org/root/Main.class"]
        );

        let core = structure.node("core").unwrap();
        assert_eq!(core.method, PackagingMethod::MergeIntoParent);
        assert_eq!(core.owner.as_deref(), Some("root"));

        let api = structure.node("api").unwrap();
        assert_eq!(api.method, PackagingMethod::Standalone);
    }

    #[test]
    fn libraries_are_deduplicated_in_first_use_order() {
        let temp = TempDir::new().unwrap();
        let graph = fixture(&temp);
        let structure = extract(&graph, &rules()).unwrap();

        let libs: Vec<_> = structure.libraries().map(|n| n.name.as_str()).collect();
        assert_eq!(libs, vec!["g:a:1", "g:b:2"]);
        assert!(structure
            .libraries()
            .all(|n| n.method == PackagingMethod::Standalone));
        assert_eq!(structure.node("g:a:1").unwrap().files[0].relative, "a-1.jar");
    }

    #[test]
    fn assemble_and_overrides() {
        let temp = TempDir::new().unwrap();
        let graph = fixture(&temp);
        let mut rules = rules();
        rules.assemble_libraries = true;
        rules.library_mappings.push(LibraryMapping {
            pattern: "g:b:*".to_string(),
            target: DROP_TARGET.to_string(),
        });

        let structure = extract(&graph, &rules).unwrap();
        let a = structure.node("g:a:1").unwrap();
        assert_eq!(a.method, PackagingMethod::MergeIntoParent);
        assert_eq!(a.owner.as_deref(), Some("root"));
        assert_eq!(structure.node("g:b:2").unwrap().method, PackagingMethod::Skip);
    }

    #[test]
    fn skipped_project_passes_owner_through() {
        let temp = TempDir::new().unwrap();
        let mut graph = fixture(&temp);
        graph.projects[1].method = Some(PackagingMethod::Skip);
        graph.projects[2].method = None;

        let structure = extract(&graph, &rules()).unwrap();
        let core = structure.node("core").unwrap();
        assert_eq!(core.method, PackagingMethod::Skip);
        assert!(core.files.is_empty());

        let api = structure.node("api").unwrap();
        assert_eq!(api.method, PackagingMethod::MergeIntoParent);
        assert_eq!(api.owner.as_deref(), Some("root"));
    }

    #[test]
    fn merged_root_becomes_standalone() {
        let temp = TempDir::new().unwrap();
        let mut graph = fixture(&temp);
        graph.projects[0].method = Some(PackagingMethod::MergeIntoParent);

        let structure = extract(&graph, &rules()).unwrap();
        assert_eq!(
            structure.node("root").unwrap().method,
            PackagingMethod::Standalone
        );
    }

    #[test]
    fn unknown_dependency_fails() {
        let temp = TempDir::new().unwrap();
        let mut graph = fixture(&temp);
        graph.projects[1].dependencies.push("ghost".to_string());

        assert!(matches!(
            extract(&graph, &rules()),
            Err(DistError::ProjectNotFound { name }) if name == "ghost"
        ));
    }
}
