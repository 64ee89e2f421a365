//! Entry point for the Tally countdown reminder bot.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use tally_engine::{next_sweep_after, DEFAULT_REMINDER_CRON};
use tally_telegram::{run_telegram_bot, TelegramBotConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tally-bot",
    about = "Telegram countdown bot with daily reminder sweeps",
    version
)]
struct Cli {
    /// Telegram bot token issued by BotFather.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    #[arg(
        long,
        env = "TALLY_API_BASE",
        default_value = "https://api.telegram.org"
    )]
    api_base: String,

    /// JSON file holding the tracked events.
    #[arg(long, env = "TALLY_EVENTS_FILE", default_value = "events.json")]
    events_file: PathBuf,

    /// Six-field cron expression for the daily reminder sweep, evaluated in
    /// local time.
    #[arg(
        long,
        env = "TALLY_REMINDER_CRON",
        default_value = DEFAULT_REMINDER_CRON
    )]
    reminder_cron: String,

    /// Long-poll timeout passed to getUpdates, in seconds.
    #[arg(long, default_value_t = 50)]
    poll_timeout_seconds: u64,

    #[arg(long, default_value_t = 10_000)]
    request_timeout_ms: u64,

    #[arg(long, default_value_t = 3)]
    retry_max_attempts: usize,

    #[arg(long, default_value_t = 500)]
    retry_base_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Reject a bad cron expression at startup rather than at the first sweep.
    next_sweep_after(&cli.reminder_cron, Local::now())
        .context("invalid --reminder-cron expression")?;

    run_telegram_bot(TelegramBotConfig {
        api_base: cli.api_base,
        bot_token: cli.bot_token,
        events_path: cli.events_file,
        poll_timeout_seconds: cli.poll_timeout_seconds,
        reminder_cron: cli.reminder_cron,
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
    })
    .await
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
