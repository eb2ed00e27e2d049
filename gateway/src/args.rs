use std::{fmt, io::IsTerminal, path::PathBuf, str::FromStr, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use logforth::filter::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "LLM Gateway", version, long_about = concat!("LLM Gateway v", env!("CARGO_PKG_VERSION")))]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short, env = "GATEWAY_CONFIG_PATH", default_value = "./gateway.toml")]
    pub config: PathBuf,
    /// Set the logging level of the workspace crates.
    #[arg(long = "log", env = "GATEWAY_LOG", default_value_t = LogLevel::default())]
    pub log_level: LogLevel,
    /// Set the style of log output
    #[arg(long, env = "GATEWAY_LOG_STYLE", default_value_t = LogStyle::default())]
    pub log_style: LogStyle,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Probe every configured provider.
    Check,
    /// List the models of a provider instance with their prices.
    Models {
        /// Provider instance name.
        provider: String,
    },
    /// Send one prompt and print the answer.
    Chat {
        /// Provider instance name.
        provider: String,
        /// Model identifier.
        model: String,
        /// The user prompt.
        prompt: String,
        /// Print the answer as it is generated. Ctrl-C aborts the generation.
        #[arg(long)]
        stream: bool,
        /// Optional system instruction.
        #[arg(long)]
        system: Option<String>,
        /// Upper bound of the whole call, e.g. `30s`.
        #[arg(long, value_parser = |s: &str| duration_str::parse(s))]
        timeout: Option<Duration>,
    },
}

impl Args {
    pub fn config(&self) -> anyhow::Result<Config> {
        let config = if self.config.exists() {
            Config::load(&self.config)?
        } else {
            log::warn!("No configuration found at {}", self.config.display());
            Config::default()
        };

        Ok(config)
    }
}

/// How log lines are rendered on stderr.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogStyle {
    /// Colored levels, the default on a terminal
    Color,
    /// Plain text, the default when stderr is redirected
    Text,
    /// One JSON object per line
    Json,
}

impl Default for LogStyle {
    fn default() -> Self {
        if std::io::stderr().is_terminal() {
            LogStyle::Color
        } else {
            LogStyle::Text
        }
    }
}

impl fmt::Display for LogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.to_possible_value().map(|value| value.get_name().to_string());
        f.write_str(name.as_deref().unwrap_or_default())
    }
}

/// Verbosity of the workspace crates. Dependencies only ever log warnings and errors.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

const WORKSPACE_CRATES: [&str; 6] = ["gateway", "llm", "config", "rate_limit", "circuit_breaker", "telemetry"];

impl LogLevel {
    pub fn env_filter(self) -> anyhow::Result<EnvFilter> {
        let filter = match self {
            LogLevel::Off => "off".to_string(),
            level => WORKSPACE_CRATES
                .iter()
                .fold("warn".to_string(), |filter, krate| format!("{filter},{krate}={level}")),
        };

        EnvFilter::from_str(&filter).map_err(|e| anyhow::anyhow!("invalid log filter '{filter}': {e}"))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        f.write_str(name)
    }
}
