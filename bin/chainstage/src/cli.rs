use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// The default manifest file name.
const DEFAULT_MANIFEST: &str = "Deploy.toml";

#[derive(Parser)]
#[command(name = "chainstage")]
#[command(
    author,
    version,
    about = "Deploy and verify Solidity contracts, resuming where the last run stopped"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "CHAINSTAGE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a TOML configuration file.
    ///
    /// Environment variables (`RPC_URL`, `PRIVATE_KEY`, ...) override values from the file.
    #[arg(long, alias = "conf", env = "CHAINSTAGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy every contract of the manifest that is not deployed yet, then verify it.
    Deploy {
        /// Path to the deployment manifest.
        #[arg(short, long, env = "CHAINSTAGE_MANIFEST", default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },

    /// Verify every deployed contract of the manifest without deploying anything.
    Verify {
        /// Path to the deployment manifest.
        #[arg(short, long, env = "CHAINSTAGE_MANIFEST", default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },

    /// Show the recorded address of every contract of the manifest.
    Status {
        /// Path to the deployment manifest.
        #[arg(short, long, env = "CHAINSTAGE_MANIFEST", default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,

        /// Check that code exists at each recorded address.
        #[arg(long)]
        check_code: bool,
    },

    /// Forget every recorded deployment of the current environment.
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::try_parse_from(["chainstage", "deploy", "--manifest", "contracts.toml"])
            .unwrap();

        assert_eq!(cli.verbosity, LevelFilter::INFO);
        assert!(matches!(
            cli.command,
            Command::Deploy { manifest } if manifest == PathBuf::from("contracts.toml")
        ));
    }

    #[test]
    fn test_parse_status_with_config() {
        let cli = Cli::try_parse_from([
            "chainstage",
            "--config",
            "Chainstage.toml",
            "-v",
            "debug",
            "status",
            "--check-code",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("Chainstage.toml")));
        assert_eq!(cli.verbosity, LevelFilter::DEBUG);
        assert!(matches!(cli.command, Command::Status { check_code: true, .. }));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["chainstage"]).is_err());
    }
}
