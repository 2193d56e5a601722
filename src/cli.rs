use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::{
    actions::{Action, Update},
    config::Config,
    server::DEFAULT_PORT,
};

/// The command line interface for the pad bridge.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Which port to serve on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Also log to a daily rolling file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// The most verbose level to log at
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example JSON request of adding a profile.
    AddProfile,

    /// Show an example JSON request of changing a threshold.
    UpdateThreshold,

    /// Show an example JSON update (from server to user) of new thresholds.
    ThresholdsUpdate,
}

/// Print what the command asks for.
pub fn handle_command(command: Commands) {
    match command {
        Commands::Examples(example) => {
            let text = match example {
                Examples::Config => Config::example().serialize_pretty(),
                Examples::AddProfile => Action::example_add_profile().serialize(),
                Examples::UpdateThreshold => Action::example_update_threshold().serialize(),
                Examples::ThresholdsUpdate => Update::example_thresholds().serialize(),
            };

            println!("{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse() {
        let cli = Cli::try_parse_from([
            "fsr-bridge",
            "pad.ron",
            "--port",
            "8080",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("pad.ron")));
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.log_level, Level::DEBUG);
        assert!(cli.log_dir.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["fsr-bridge"]).unwrap();

        assert_eq!(cli.port, DEFAULT_PORT);
        assert_eq!(cli.log_level, Level::INFO);
    }

    #[test]
    fn examples() {
        let cli = Cli::try_parse_from(["fsr-bridge", "examples", "add-profile"]).unwrap();

        assert!(matches!(
            cli.command,
            Some(Commands::Examples(Examples::AddProfile))
        ));
    }
}
