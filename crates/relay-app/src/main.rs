//! Relay application binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Build the in-memory store and link the local identity
//! 3. Wire the command and webhook executors when enabled
//! 4. Feed stdin lines through the gateway and print each reply

mod cli;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use relay_action::{CommandPlugin, PluginRegistry, WebhookPlugin};
use relay_core::{MessageInput, RelayConfig};
use relay_gateway::{GatewayService, InMemoryStore};

use cli::CliArgs;

const CONNECTOR: &str = "cli";

/// Build the gateway for one local user.
fn build_service(
    config: &RelayConfig,
    user: &str,
    role: &str,
) -> Result<GatewayService<InMemoryStore>, Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryStore::new(config.general.workspace_id.clone()));
    store.link_identity(CONNECTOR, user, role)?;

    let service = GatewayService::new(store, config);
    let executor = &config.executor;
    if !executor.command_enabled && !executor.webhook_enabled {
        tracing::info!("Executors disabled; approved actions will be recorded as skipped");
        return Ok(service);
    }

    let mut registry = PluginRegistry::new();
    if executor.command_enabled {
        registry.register(Arc::new(CommandPlugin::new(executor)));
        tracing::info!(allowed = ?executor.allowed_commands, "Command executor enabled");
    }
    if executor.webhook_enabled {
        registry.register(Arc::new(WebhookPlugin::new(executor)));
        tracing::info!(timeout_secs = executor.webhook_timeout_secs, "Webhook executor enabled");
    }
    Ok(service.with_executor(Arc::new(registry)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let config = RelayConfig::load_or_default(&config_file);

    // Logs go to stderr; stdout carries replies.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Relay v{}", env!("CARGO_PKG_VERSION"));

    if args.init_config {
        RelayConfig::default().save(&config_file)?;
        tracing::info!(path = %config_file.display(), "Default configuration written");
        return Ok(());
    }
    tracing::info!(path = %config_file.display(), workspace = %config.general.workspace_id, "Configuration loaded");

    let service = build_service(&config, &args.user, &args.role)?;
    tracing::info!(user = %args.user, role = %args.role, conversation = %args.conversation, "Ready for input");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = MessageInput::new(CONNECTOR, args.conversation.as_str(), args.user.as_str(), line);
        match service.handle_message(&input).await {
            Ok(out) if out.handled => println!("{}", out.reply),
            Ok(_) => println!("(unhandled)"),
            Err(e) => {
                tracing::error!(error = %e, "Message handling failed");
                println!("error: {}", e);
            }
        }
    }

    tracing::info!("Input closed, shutting down");
    Ok(())
}
