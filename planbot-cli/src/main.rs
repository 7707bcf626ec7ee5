//! Planbot console
//!
//! Drives the demo planning dialog one turn per stdin line.
//!
//! Usage:
//!   planbot [--config planbot.toml] [--user <ID>] [--log-level debug]

mod demo;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use planbot::{Activity, Bot, BotConfig, ChannelAccount, DialogTurnStatus, RunOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "planbot")]
#[command(about = "Chat with a rule-driven planning bot on the console")]
struct Args {
    /// Path to bot configuration file (TOML format)
    #[arg(long, env = "PLANBOT_CONFIG")]
    config: Option<String>,

    /// Channel id used in storage keys
    #[arg(long, default_value = "console")]
    channel: String,

    /// User id
    #[arg(long, default_value = "user")]
    user: String,

    /// Conversation id
    #[arg(long, default_value = "console-conversation")]
    conversation: String,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn print_replies(outcome: &RunOutcome) {
    for activity in &outcome.activities {
        if let Some(text) = &activity.text {
            println!("bot> {}", text);
        }
    }
    if outcome.turn.result.status == DialogTurnStatus::Cancelled {
        println!("bot> (conversation reset)");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => {
            info!("Using configuration: {}", path);
            BotConfig::from_file(path)?
        }
        None => BotConfig::default(),
    };

    let root = demo::build_root(&config)?;
    let bot = Bot::from_config(Arc::new(root), &config)?;

    let mut update = Activity::conversation_update(
        &args.channel,
        &args.conversation,
        vec![ChannelAccount::new(&args.user)],
    );
    update.from = Some(ChannelAccount::new(&args.user));
    print_replies(&bot.run(update, None).await?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let activity = Activity::message(&args.channel, &args.conversation, &args.user, text);
        match bot.run(activity, None).await {
            Ok(outcome) => print_replies(&outcome),
            Err(e) => warn!("Turn failed: {}", e),
        }
    }

    info!("stdin closed, exiting");
    Ok(())
}
