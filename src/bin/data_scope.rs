//! data-scope: operator CLI over the in-memory data engine
//!
//! ## Usage
//! ```text
//! data-scope fixtures <dir>   load *.fixture.json files, print collected queries
//! data-scope managers         print the configured managers
//! ```
//!
//! ## Configuration
//! - --config / DATA_SCOPE_CONFIG: Path to the YAML config file (default: config.yaml)
//! - DATA_SCOPE__*: Overrides for individual config keys
//! - DATA_SCOPE_LOG: Log filter (default: info)
//!
//! An invalid configuration is logged and the process exits with status 1.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use data_scope::config::Config;
use data_scope::fixture::FixtureRunner;
use data_scope::mock::MockDataService;
use data_scope::report::{managers_report, queries_report};
use data_scope::scope::{DataLayer, RequestInfo};
use data_scope::utils::bootstrap::init_tracing;

/// Request-scoped query instrumentation over the in-memory data engine
#[derive(Parser, Debug)]
#[command(name = "data-scope")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load every *.fixture.json file in a directory and print the collected queries
    Fixtures {
        /// Directory holding the fixture files
        dir: PathBuf,
    },

    /// Print the configured managers with their adapter and documents
    Managers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Fixtures { dir } => {
            let service = Arc::new(MockDataService::new(&config.data));
            let layer = DataLayer::boot(config, service)?;

            println!("Preparing to load fixtures...");
            let request = RequestInfo::new("CLI", "fixtures");
            let scoped = layer.for_request(request.clone());
            let loaded = FixtureRunner::new(scoped)
                .run_dir(&dir, |fixture| {
                    println!("loading fixture: {}", fixture.source());
                })
                .await?;
            info!(loaded, dir = %dir.display(), "Fixtures loaded");

            if layer.scope_enabled() {
                let report = queries_report(layer.collector());
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            layer.finish_request(&request);
        }
        Command::Managers => {
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&managers_report(&config))?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fixtures_requires_directory() {
        assert!(Cli::try_parse_from(["data-scope", "fixtures"]).is_err());

        let cli = Cli::try_parse_from(["data-scope", "fixtures", "seed"]).unwrap();
        assert!(matches!(cli.command, Command::Fixtures { dir } if dir == PathBuf::from("seed")));
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::try_parse_from(["data-scope", "managers", "--config", "alt.yaml"]).unwrap();
        assert!(matches!(cli.command, Command::Managers));
        assert_eq!(cli.config.as_deref(), Some("alt.yaml"));
    }
}
