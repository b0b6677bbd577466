use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;

use plugin_dist_core::index::{IndexOptions, PluginIndex, ScanPrecedence};
use plugin_dist_core::packaging::{
    build_mappings, DeclaredArtifacts, LibraryResolver, MappingSet, MappingSource,
    OfflineProducts, PlacementRule,
};
use plugin_dist_core::{
    BuildResult, DistBuilder, DistConfig, DistError, DynamicDistBuilder, PluginDescriptor, Result,
    ZipDistBuilder, CONFIG_FILE,
};

mod args;
mod logging;
use args::{Cli, Commands, ConfigAction, IndexAction, Precedence, Shell};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let quiet = cli.quiet;

    let result = match cli.command {
        Some(Commands::Index {
            root,
            precedence,
            action,
        }) => handle_index(&config_path, &root, precedence, action),
        Some(Commands::Build {
            output,
            since,
            changed,
            offline,
        }) => handle_build(&config_path, &output, since.as_deref(), changed, &offline, quiet),
        Some(Commands::Zip { dir, archive }) => handle_zip(&dir, &archive),
        Some(Commands::Mappings { offline, resolved }) => {
            handle_mappings(&config_path, &offline, resolved)
        }
        Some(Commands::Config { action }) => handle_config(action, &config_path),
        Some(Commands::Completions { shell }) => {
            handle_completions(shell);
            Ok(())
        }
        None => {
            Cli::command().print_help().ok();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "plugin-dist", &mut io::stdout());
}

fn handle_index(
    config_path: &Path,
    root: &Path,
    precedence: Option<Precedence>,
    action: IndexAction,
) -> Result<()> {
    let options = match precedence {
        Some(Precedence::ModulesWin) => IndexOptions {
            precedence: ScanPrecedence::ModulesWin,
        },
        Some(Precedence::PluginsWin) => IndexOptions {
            precedence: ScanPrecedence::PluginsWin,
        },
        None => DistConfig::load(config_path)?.index,
    };
    let mut index = PluginIndex::open_with(root, options);

    match action {
        IndexAction::Build => {
            index.rebuild();
            println!(
                "{} {} plugins ({})",
                "Indexed:".green(),
                index.len(),
                index.index_path().display()
            );
        }
        IndexAction::List => {
            println!();
            for (id, entry) in index.entries() {
                println!(
                    "  {} {} {}",
                    id.cyan(),
                    entry.descriptor.version,
                    entry.install_root.display().to_string().dimmed()
                );
            }
            println!();
            println!("Total: {}", index.len());
        }
        IndexAction::Show { id, json } => {
            let descriptor = index
                .descriptor(&id)
                .ok_or_else(|| DistError::PluginNotIndexed { id: id.clone() })?;
            if json {
                let text = serde_json::to_string_pretty(descriptor).map_err(io::Error::from)?;
                println!("{}", text);
            } else {
                print_descriptor(descriptor, index.install_root(&id));
            }
        }
        IndexAction::Put { dir } => {
            let descriptor = PluginDescriptor::from_plugin_dir(&dir)?;
            let id = descriptor.id.clone();
            let previous = index.put(descriptor, dir.clone());
            let label = if previous.is_some() {
                "Replaced:".yellow()
            } else {
                "Added:".green()
            };
            println!("{} {} ({})", label, id, dir.display());
        }
    }

    Ok(())
}

fn print_descriptor(descriptor: &PluginDescriptor, install_root: Option<&Path>) {
    println!();
    println!("Id: {}", descriptor.id.cyan());
    println!("Name: {}", descriptor.name);
    if !descriptor.vendor.is_empty() {
        println!("Vendor: {}", descriptor.vendor);
    }
    if !descriptor.version.is_empty() {
        println!("Version: {}", descriptor.version);
    }
    if !descriptor.since_build.is_empty() || !descriptor.until_build.is_empty() {
        println!(
            "Builds: {} - {}",
            or_any(&descriptor.since_build),
            or_any(&descriptor.until_build)
        );
    }
    if let Some(root) = install_root {
        println!("Location: {}", root.display());
    }
    if !descriptor.dependencies.is_empty() {
        println!("Depends:");
        for dependency in &descriptor.dependencies {
            if dependency.optional {
                println!("  {} {}", dependency.id, "(optional)".dimmed());
            } else {
                println!("  {}", dependency.id);
            }
        }
    }
    println!();
}

fn or_any(bound: &str) -> &str {
    if bound.is_empty() {
        "*"
    } else {
        bound
    }
}

fn compute_mappings(config: &DistConfig, offline: &[PathBuf]) -> Result<MappingSet> {
    let graph = config.build_graph();
    let rules = config.packaging_rules();

    let resolver: Box<dyn LibraryResolver> = if offline.is_empty() {
        Box::new(DeclaredArtifacts::new(&graph.libraries)?)
    } else {
        Box::new(OfflineProducts::new(offline.to_vec()))
    };

    build_mappings(&graph, &rules, resolver.as_ref())
}

fn handle_build(
    config_path: &Path,
    output: &Path,
    since: Option<&str>,
    changed: Vec<PathBuf>,
    offline: &[PathBuf],
    quiet: bool,
) -> Result<()> {
    let since = since.map(parse_timestamp).transpose()?;
    let config = DistConfig::load(config_path)?;
    let mappings = compute_mappings(&config, offline)?;

    let on_file = |status: &str, path: &str| {
        if quiet {
            return;
        }
        let status_str = match status {
            "OK" => format!("[{}]", status).green(),
            "SKIP" => format!("[{}]", status).yellow(),
            "DEL" => format!("[{}]", status).red(),
            _ => format!("[{}]", status).normal(),
        };
        println!("  {} {}", status_str, path);
    };

    let incremental = since.is_some() || !changed.is_empty();
    let result = if incremental {
        DynamicDistBuilder::new(output)
            .since(since)
            .changed(changed)
            .produce_artifact(&mappings, Some(&on_file))?
    } else {
        DistBuilder::new(output).produce_artifact(&mappings, Some(&on_file))?
    };

    if !quiet {
        print_summary(&result, incremental);
    }
    Ok(())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DistError::ConfigValue {
            key: "--since".to_string(),
            value: value.to_string(),
        })
}

fn print_summary(result: &BuildResult, incremental: bool) {
    println!();
    println!("Summary:");
    println!("  Written: {}", result.written);
    if incremental {
        println!("  Unchanged: {}", result.unchanged);
        println!("  Removed: {}", result.removed);
    }
    println!();
    println!(
        "{} {}",
        "Build complete:".green(),
        result.output_root.display()
    );
}

fn handle_zip(dir: &Path, archive: &Path) -> Result<()> {
    let path = ZipDistBuilder::new(archive).produce_artifact(dir)?;
    println!("{} {}", "Archive:".green(), path.display());
    Ok(())
}

fn handle_mappings(config_path: &Path, offline: &[PathBuf], resolved: bool) -> Result<()> {
    let config = DistConfig::load(config_path)?;
    let mappings = compute_mappings(&config, offline)?;

    let shown: Vec<_> = if resolved {
        mappings.resolved()
    } else {
        mappings.iter().collect()
    };

    for mapping in &shown {
        let source = match &mapping.source {
            MappingSource::File(path) => path.display().to_string(),
            other => other.to_string(),
        };
        let (tag, destination) = match &mapping.rule {
            PlacementRule::Copy => ("copy".green(), mapping.destination.clone()),
            PlacementRule::MergeIntoArchive { entry } => (
                "merge".cyan(),
                format!("{}!/{}", mapping.destination, entry),
            ),
            PlacementRule::Exclude => ("exclude".red(), mapping.destination.clone()),
        };
        println!("{:>7} {} -> {}", tag, source, destination);
        if !mapping.shade.is_empty() {
            let rules: Vec<String> = mapping
                .shade
                .iter()
                .map(|r| format!("{} => {}", r.from, r.to))
                .collect();
            println!("        {} {}", "shade".dimmed(), rules.join(", "));
        }
    }
    println!();
    println!("Total: {}", shown.len());
    Ok(())
}

fn handle_config(action: ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = DistConfig::load(config_path)?;
            match config.get(&key) {
                Some(value) => {
                    println!("{}", value);
                }
                None => {
                    return Err(DistError::ConfigKeyNotFound { key });
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = DistConfig::load(config_path)?;
            config.set(&key, &value)?;
            config.save(config_path)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = DistConfig::load(config_path)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init => {
            let path = DistConfig::init(config_path)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn timestamps_parse_as_rfc3339() {
        let t = parse_timestamp("2024-05-01T10:00:00+02:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-05-01T08:00:00+00:00");
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(DistError::ConfigValue { .. })
        ));
    }

    #[test]
    fn incremental_flags_parse() {
        let cli = Cli::try_parse_from([
            "plugin-dist",
            "build",
            "--since",
            "2024-05-01T10:00:00Z",
            "--changed",
            "a.class",
            "b.class",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Build { since, changed, .. }) => {
                assert_eq!(since.as_deref(), Some("2024-05-01T10:00:00Z"));
                assert_eq!(changed, vec![PathBuf::from("a.class"), PathBuf::from("b.class")]);
            }
            _ => panic!("expected build command"),
        }
    }
}
