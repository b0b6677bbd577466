pub mod archive;
pub mod config;
pub mod descriptor;
pub mod dist;
pub mod error;
pub mod index;
pub mod packaging;

pub use config::{DistConfig, CONFIG_FILE};
pub use descriptor::{DescriptorLocator, PluginDependency, PluginDescriptor, PLUGIN_XML_ENTRY};
pub use dist::{
    compute_file_hash, compute_hash, BuildResult, DistBuilder, DynamicDistBuilder, FileCallback,
    Plan, PlannedOutput, ZipDistBuilder,
};
pub use error::{DistError, Result};
pub use index::{
    IndexEntry, IndexOptions, PluginIndex, ScanPrecedence, INDEX_FILE, INDEX_FORMAT_VERSION,
};
pub use packaging::{
    build_mappings, BuildGraph, DeclaredArtifacts, DependencyStructure,
    DependencyStructureExtractor, LibraryResolver, Mapping, MappingSet, MappingSource,
    MappingsBuilder, OfflineProducts, PackagingMethod, PackagingRules, PlacementRule, ShadeRule,
};
