//! From a build graph to an ordered list of placement instructions
//!
//! ```text
//! BuildGraph + PackagingRules
//!     -> DependencyStructureExtractor   (methods, owners, files)
//!     -> MappingsBuilder                (destinations)
//!     -> MappingSet
//! ```

pub mod extractor;
pub mod mappings;
pub mod model;
pub mod resolver;

pub use extractor::{
    DependencyStructure, DependencyStructureExtractor, NodeKind, SourceFile, StructureNode,
};
pub use mappings::{Mapping, MappingSet, MappingSource, MappingsBuilder, PlacementRule, LIB_DIR};
pub use model::{
    relocate_entry, BuildGraph, FileMapping, LibraryCoordinate, LibraryMapping, LibrarySpec,
    PackagingMethod, PackagingRules, PathFilter, ProjectSpec, ShadeRule, DROP_TARGET,
};
pub use resolver::{DeclaredArtifacts, LibraryResolver, OfflineProducts};

use crate::error::Result;

/// Run the whole pipeline with the given resolver
pub fn build_mappings(
    graph: &BuildGraph,
    rules: &PackagingRules,
    resolver: &dyn LibraryResolver,
) -> Result<MappingSet> {
    let structure = DependencyStructureExtractor::new(graph, rules, resolver).extract()?;
    MappingsBuilder::new(&structure, rules).build()
}
