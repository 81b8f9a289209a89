//! The `qqbot` binary.
//!
//! ```bash
//! qqbot --config qqbot.toml --profile production --log-level debug
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use qqbot_runtime::QQBotRuntime;
use qqbot_runtime::config::{ConfigLoader, LogLevel};

/// Webhook-driven QQ chat bot.
#[derive(Debug, Parser)]
#[command(name = "qqbot", version, about)]
struct Cli {
    /// Configuration file; searched for in the usual places when omitted.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Configuration profile (development, production, ...).
    #[arg(short, long, value_name = "NAME")]
    profile: Option<String>,

    /// Overrides `logging.level`.
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &cli.profile {
        loader = loader.profile(profile);
    }
    let mut config = loader.load()?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    let runtime = QQBotRuntime::from_config(&config);
    let handlers = runtime.register_plugins(&qqbot::apps::builtin())?;
    info!(handlers, "Built-in apps registered");

    runtime.run().await?;
    Ok(())
}
