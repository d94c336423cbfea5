//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for arena-relay
#[derive(Parser, Debug)]
#[command(name = "arena-relay")]
#[command(author, version, about = "OpenAI-compatible gateway over a browser automation peer")]
#[command(long_about = r#"
Arena Relay exposes an OpenAI-compatible chat completion API and forwards
every request to a single browser peer connected on /ws. It also runs
long-form authoring jobs that continue a story turn by turn.

Configuration files are loaded from (in priority order):
1. RELAY_* environment variables (nested keys use "__")
2. --config <path>           Explicit config file
3. .relay/captured_ids.toml  Ids captured from the browser
4. ./relay.toml              Project-level config
5. ~/.config/arena-relay/config.toml   Global config

Example:
  arena-relay serve --port 5102
  arena-relay jobs list
  arena-relay jobs show 20261019-0001
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,

    /// Also write daily-rotated logs into this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the gateway (default)
    Serve {
        /// Bind address, overrides server.host
        #[arg(long)]
        host: Option<String>,
        /// Port, overrides server.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect stored jobs without a running server
    Jobs {
        #[command(subcommand)]
        action: JobsCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum JobsCommand {
    /// List jobs, newest first
    List,
    /// Print one job with its event log
    Show { id: String },
}

impl Cli {
    /// The subcommand to run; `serve` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            host: None,
            port: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::try_parse_from(["arena-relay"]).unwrap();
        assert_eq!(cli.command(), Command::Serve { host: None, port: None });
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn serve_overrides_and_verbosity() {
        let cli =
            Cli::try_parse_from(["arena-relay", "-vv", "serve", "--host", "0.0.0.0", "-p", "5102"])
                .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command(),
            Command::Serve {
                host: Some("0.0.0.0".into()),
                port: Some(5102)
            }
        );
    }

    #[test]
    fn jobs_show_takes_an_id() {
        let cli = Cli::try_parse_from(["arena-relay", "jobs", "show", "abc", "--no-config"]).unwrap();
        assert!(cli.no_config);
        assert_eq!(
            cli.command(),
            Command::Jobs {
                action: JobsCommand::Show { id: "abc".into() }
            }
        );
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(Cli::try_parse_from(["arena-relay", "serve", "--port", "99999"]).is_err());
    }
}
