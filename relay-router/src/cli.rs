use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use relay_router::Sensitivity;
use relay_router::logging::LogFormat;

#[derive(Parser)]
#[command(name = "relay-router")]
#[command(about = "Deliver encrypted payloads over prioritized channels with failover")]
#[command(version)]
pub struct Args {
    /// Routing configuration file (YAML, TOML or JSON). Falls back to
    /// ROUTING_CONFIG, then config/routing.yaml.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a payload with failover and print the result as JSON
    Send {
        /// Channel specific destination (chat id, email address, webhook URL)
        #[arg(short, long, default_value = "")]
        to: String,

        /// Subject or caption
        #[arg(short, long)]
        subject: Option<String>,

        /// Payload file; reads stdin when omitted or "-"
        #[arg(short, long)]
        payload: Option<PathBuf>,

        #[command(flatten)]
        metadata: MetadataArgs,

        /// Idempotency key; a random one is generated when omitted
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// Print the channel order a message would be routed over
    Resolve {
        #[command(flatten)]
        metadata: MetadataArgs,

        /// Payload size in bytes
        #[arg(long, default_value_t = 0)]
        size_bytes: u64,
    },

    /// Validate the routing configuration file
    CheckConfig,
}

#[derive(ClapArgs)]
pub struct MetadataArgs {
    #[arg(long, default_value = "")]
    pub tenant: String,

    #[arg(long, default_value = "")]
    pub usecase: String,

    /// low, med or high
    #[arg(long, default_value = "low")]
    pub sensitivity: Sensitivity,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
