//! Command-line surface

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "tasbih")]
#[command(about = "Shared tasbih counter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (defaults to tasbih.toml in the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Counter server address, host:port
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Log filter directive, used when RUST_LOG is unset
    #[arg(long, global = true)]
    pub log: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the counter server
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// SQLite file for counters
        #[arg(long, conflicts_with = "in_memory")]
        database: Option<PathBuf>,

        /// Keep counters in memory only
        #[arg(long)]
        in_memory: bool,
    },

    /// Set this device's display name
    Name { name: String },

    /// Turn tap and completion vibration on or off
    Haptics {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Show this device's identity
    Whoami,

    /// Create a counter and open it
    Create {
        /// Number of increments to reach
        #[arg(short, long)]
        goal: i64,
    },

    /// Join a counter by id or link and open it
    Join {
        /// Counter id or join link
        code: String,
    },

    /// Open a counter session
    Open {
        /// Counter id or join link
        code: String,
    },

    /// Print one snapshot of a counter
    Status {
        /// Counter id or join link
        code: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

impl Cli {
    /// Fold command-line overrides into `config`
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(server) = &self.server {
            config.client.server = server.clone();
        }
        if let Some(interval) = self.poll_interval_ms {
            config.client.poll_interval_ms = interval;
        }
        if let Some(filter) = &self.log {
            config.log.filter = filter.clone();
        }
        if let Command::Serve {
            bind,
            database,
            in_memory,
        } = &self.command
        {
            if let Some(bind) = bind {
                config.server.bind = *bind;
            }
            if *in_memory {
                config.server.database = None;
            } else if let Some(database) = database {
                config.server.database = Some(database.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from(["tasbih", "create", "--goal", "33"]).unwrap();
        assert_eq!(cli.command, Command::Create { goal: 33 });
    }

    #[test]
    fn test_global_overrides() {
        let cli = Cli::try_parse_from([
            "tasbih",
            "status",
            "abc",
            "--server",
            "10.0.0.2:7340",
            "--poll-interval-ms",
            "500",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.client.server, "10.0.0.2:7340");
        assert_eq!(config.client.poll_interval_ms, 500);
    }

    #[test]
    fn test_serve_overrides() {
        let mut config = AppConfig::default();
        config.server.database = Some(PathBuf::from("/tmp/counters.db"));

        let cli = Cli::try_parse_from(["tasbih", "serve", "--in-memory"]).unwrap();
        cli.apply_overrides(&mut config);
        assert!(config.server.database.is_none());

        let cli = Cli::try_parse_from(["tasbih", "serve", "--bind", "127.0.0.1:9000"]).unwrap();
        cli.apply_overrides(&mut config);
        assert_eq!(config.server.bind.port(), 9000);
    }

    #[test]
    fn test_serve_rejects_conflicting_storage() {
        let result =
            Cli::try_parse_from(["tasbih", "serve", "--in-memory", "--database", "x.db"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_haptics_toggle() {
        let cli = Cli::try_parse_from(["tasbih", "haptics", "off"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Haptics {
                state: Toggle::Off
            }
        );
        assert!(!Toggle::Off.enabled());
    }
}
