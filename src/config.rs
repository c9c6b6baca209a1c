use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Config file picked up from the working directory when none is given.
const CWD_CONFIG_FILE: &str = "shout.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Settings that can be forced from the command line for every subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE", global = true)]
    pub config: Option<String>,

    /// Port the relay listens on
    #[arg(long, env = "PORT", global = true)]
    pub port: Option<u16>,

    /// Relay host (`host:port`) used by `watch` and `run`
    #[arg(long, env = "RELAY_HOST", global = true)]
    pub relay: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the relay server (default)
    Serve,

    /// Follow a stream in the terminal
    Watch {
        /// Identifier printed by `shout run`
        stream_id: String,

        /// Connect with `wss://` instead of `ws://`
        #[arg(long)]
        secure: bool,
    },

    /// Run a command and shout its output
    Run {
        /// Seconds to wait before starting the command
        #[arg(short, long)]
        delay: Option<u64>,

        /// Command line to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub client: ClientConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub static_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    pub reap_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Relay address as `host:port`.
    pub host: String,
    pub secure: bool,
    pub delay_secs: u64,
    pub ping_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub json: bool,
}

impl RelayConfig {
    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

impl ClientConfig {
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl AppConfig {
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::resolve(&cli.overrides)
    }

    /// Build the configuration.
    ///
    /// Priority: CLI flag > CLI env var > `SHOUT_*` env var > config file > defaults.
    pub fn resolve(overrides: &Overrides) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.static_dir", "static")?
            .set_default("relay.reap_interval_secs", 30)?
            .set_default("client.host", "localhost:3000")?
            .set_default("client.secure", false)?
            .set_default("client.delay_secs", 10)?
            .set_default("client.ping_interval_secs", 10)?
            .set_default("log.json", false)?;

        match &overrides.config {
            Some(path) => {
                builder = builder.add_source(File::from(Path::new(path)).required(true));
            }
            None if Path::new(CWD_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::from(Path::new(CWD_CONFIG_FILE)));
            }
            None => {}
        }

        // E.g. SHOUT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("SHOUT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(port) = overrides.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(relay) = &overrides.relay {
            builder = builder.set_override("client.host", relay.as_str())?;
        }
        if overrides.log_json {
            builder = builder.set_override("log.json", true)?;
        }

        builder.build()?.try_deserialize()
    }
}
