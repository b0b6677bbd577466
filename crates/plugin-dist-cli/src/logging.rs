//! Log output for the CLI
//!
//! Diagnostics go to stderr through `tracing`; command output stays on stdout.
//! `RUST_LOG` overrides the level picked from `--verbose` / `--quiet`.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn level_for(verbose: bool, quiet: bool) -> Level {
    if quiet {
        Level::ERROR
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    }
}

pub fn init(verbose: bool, quiet: bool) {
    let level = level_for(verbose, quiet);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("plugin_dist_core={level},plugin_dist={level}"))
    });

    // Fails only when a subscriber is already set
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .without_time(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_beats_verbose() {
        assert_eq!(level_for(true, true), Level::ERROR);
        assert_eq!(level_for(true, false), Level::INFO);
        assert_eq!(level_for(false, false), Level::WARN);
    }
}
