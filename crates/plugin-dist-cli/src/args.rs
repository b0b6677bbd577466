use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "plugin-dist")]
#[command(about = "Packaging and plugin indexing for IDE plugin distributions")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Build description (default: ./plugin-dist.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Precedence {
    ModulesWin,
    PluginsWin,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and maintain the plugin index of a platform root
    Index {
        /// Platform root holding plugins/ and lib/modules/
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Which scan wins on duplicate ids (default: from config)
        #[arg(long, value_enum)]
        precedence: Option<Precedence>,

        #[command(subcommand)]
        action: IndexAction,
    },

    /// Materialize the plugin layout
    Build {
        /// Output directory
        #[arg(short, long, default_value = "build/dist")]
        output: PathBuf,

        /// Incremental: start of the last compilation (RFC 3339)
        #[arg(long)]
        since: Option<String>,

        /// Incremental: files touched by the compiler
        #[arg(long, num_args = 1..)]
        changed: Vec<PathBuf>,

        /// Read libraries from pre-resolved product directories
        #[arg(long)]
        offline: Vec<PathBuf>,
    },

    /// Pack a built layout into a distributable archive
    Zip {
        /// Directory to pack
        dir: PathBuf,

        /// Archive to write
        archive: PathBuf,
    },

    /// Print the computed mapping set
    Mappings {
        /// Read libraries from pre-resolved product directories
        #[arg(long)]
        offline: Vec<PathBuf>,

        /// Show only mappings that survive last-one-wins resolution
        #[arg(long)]
        resolved: bool,
    },

    /// Manage the build description
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum IndexAction {
    /// Rescan the root and rewrite plugins.idx
    Build,

    /// List indexed plugins
    List,

    /// Show one plugin's descriptor
    Show {
        /// Plugin id
        id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add or replace a plugin from its install directory
    Put {
        /// Plugin directory
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., packaging.plugin_name)
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// Value (lists: comma-separated or ["a", "b"])
        value: String,
    },

    /// List all config values
    List,

    /// Show config file path
    Path,

    /// Write a commented template if no config exists
    Init,
}
