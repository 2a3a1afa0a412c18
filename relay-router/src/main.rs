mod cli;

use std::io::{self, Read};
use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use relay_router::audit::TracingAuditSink;
use relay_router::channels::{ChannelSettings, build_channels};
use relay_router::config::{RouterConfig, resolve_config_path};
use relay_router::policy::resolve_priority;
use relay_router::{FailoverRouter, Metadata, SendInput, logging};
use serde_json::json;
use tracing::error;

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    if let Err(e) = logging::init(args.log_format.into()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config_path = resolve_config_path(args.config.as_deref());

    match args.command {
        Commands::Send {
            to,
            subject,
            payload,
            metadata,
            idempotency_key,
        } => {
            let body = read_payload(payload.as_deref())?;
            let config = RouterConfig::load_or_default(&config_path).config;
            let channels = build_channels(&ChannelSettings::from_env())?;
            let router = FailoverRouter::new(config, channels, Arc::new(TracingAuditSink));

            let metadata = Metadata {
                tenant_id: metadata.tenant,
                usecase: metadata.usecase,
                sensitivity: metadata.sensitivity,
                size_bytes: body.len() as u64,
                idempotency_key: idempotency_key
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            };
            let mut input = SendInput::new(to, body, metadata);
            if let Some(subject) = subject {
                input = input.with_subject(subject);
            }

            let result = router.send_with_failover(&input).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.ok {
                process::exit(2);
            }
        }
        Commands::Resolve {
            metadata,
            size_bytes,
        } => {
            let config = RouterConfig::load_or_default(&config_path).config;
            let metadata = Metadata {
                tenant_id: metadata.tenant,
                usecase: metadata.usecase,
                sensitivity: metadata.sensitivity,
                size_bytes,
                idempotency_key: String::new(),
            };
            let resolution = resolve_priority(&config, &metadata);
            let output = json!({
                "priority": resolution.channels,
                "origin": resolution.origin.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::CheckConfig => {
            let loaded = RouterConfig::load_or_default(&config_path);
            let output = json!({
                "path": loaded.path.display().to_string(),
                "used_defaults": loaded.used_defaults(),
                "fallback_reason": loaded.fallback_reason,
                "retry_after_seconds": loaded.config.retry.retry_after_seconds(),
                "config": loaded.config,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            if output["used_defaults"] == true {
                process::exit(1);
            }
        }
    }

    Ok(())
}

fn read_payload(path: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read(path)
            .with_context(|| format!("Failed to read payload {}", path.display())),
        _ => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read payload from stdin")?;
            Ok(buf)
        }
    }
}
