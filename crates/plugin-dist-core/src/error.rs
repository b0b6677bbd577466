use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistError {
    #[error("Project not found in build graph: {name}")]
    ProjectNotFound { name: String },

    #[error("Library {coordinate} could not be resolved to any archive")]
    LibraryNotResolved { coordinate: String },

    #[error("Invalid library coordinate '{coordinate}' - expected group:artifact:version")]
    InvalidCoordinate { coordinate: String },

    #[error("Mapping source does not exist: {path}")]
    SourceMissing { path: PathBuf },

    #[error("Archive entry '{entry}' not found in {archive}")]
    ArchiveEntryMissing { archive: PathBuf, entry: String },

    #[error("No plugin descriptor found under {path}")]
    DescriptorNotFound { path: PathBuf },

    #[error("Invalid plugin descriptor: {message}")]
    DescriptorParse { message: String },

    #[error("Plugin not in index: {id}")]
    PluginNotIndexed { id: String },

    #[error("Index format version {found} does not match expected {expected}")]
    IndexWrongVersion { found: i32, expected: i32 },

    #[error("Corrupt plugin index: {message}")]
    IndexCorrupt { message: String },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("Invalid config value for {key}: {value}")]
    ConfigValue { key: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, DistError>;

impl DistError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ProjectNotFound { .. }
            | Self::LibraryNotResolved { .. }
            | Self::InvalidCoordinate { .. } => 2,
            Self::SourceMissing { .. } | Self::ArchiveEntryMissing { .. } => 3,
            Self::DescriptorNotFound { .. }
            | Self::DescriptorParse { .. }
            | Self::PluginNotIndexed { .. } => 4,
            Self::ConfigParse { .. }
            | Self::ConfigKeyNotFound { .. }
            | Self::ConfigValue { .. } => 5,
            Self::InvalidPattern { .. } => 6,
            _ => 1,
        }
    }
}
