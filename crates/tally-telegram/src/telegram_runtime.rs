//! Long-polling Telegram runtime: fetches updates, routes them through the
//! per-chat conversation flows, and fires the cron-scheduled reminder sweep.

mod flow;
mod telegram_api_client;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use tally_engine::{next_sweep_after, run_reminder_sweep, ReminderSender};
use tally_store::EventStore;

use flow::{
    FlowAction, FlowController, FlowInput, KeyboardSpec, CALLBACK_CANCEL, CALLBACK_CUSTOM,
    CALLBACK_SKIP, MENU_ADD, MENU_CANCEL, MENU_DELETE, MENU_LIST,
};
use telegram_api_client::{TelegramApiClient, TelegramUpdate};

#[derive(Debug, Clone)]
pub struct TelegramBotConfig {
    pub api_base: String,
    pub bot_token: String,
    pub events_path: PathBuf,
    pub poll_timeout_seconds: u64,
    pub reminder_cron: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

/// Counters for one poll-and-dispatch cycle, printed as the cycle summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PollCycleReport {
    updates_received: usize,
    messages_handled: usize,
    callbacks_handled: usize,
    actions_sent: usize,
    action_failures: usize,
}

pub async fn run_telegram_bot(config: TelegramBotConfig) -> Result<()> {
    let runtime = TelegramBotRuntime::new(config)?;
    runtime.run().await
}

struct TelegramBotRuntime {
    config: TelegramBotConfig,
    client: TelegramApiClient,
    store: EventStore,
    flow: FlowController,
    next_update_offset: u64,
}

impl TelegramBotRuntime {
    fn new(config: TelegramBotConfig) -> Result<Self> {
        let client = TelegramApiClient::new(
            config.api_base.clone(),
            config.bot_token.clone(),
            config.request_timeout_ms,
            config.retry_max_attempts,
            config.retry_base_delay_ms,
        )?;
        let store = EventStore::load(&config.events_path).with_context(|| {
            format!(
                "failed to load events file {}",
                config.events_path.display()
            )
        })?;
        Ok(Self {
            config,
            client,
            store,
            flow: FlowController::new(),
            next_update_offset: 0,
        })
    }

    async fn run(mut self) -> Result<()> {
        println!(
            "telegram bot started: events={} cron={}",
            self.store.len(),
            self.config.reminder_cron
        );
        let mut next_sweep = next_sweep_after(&self.config.reminder_cron, Local::now())
            .context("invalid reminder cron expression")?;

        loop {
            let now = Local::now();
            if now >= next_sweep {
                self.run_sweep().await;
                next_sweep = next_sweep_after(&self.config.reminder_cron, Local::now())
                    .context("invalid reminder cron expression")?;
                continue;
            }
            let until_sweep = (next_sweep - now)
                .to_std()
                .unwrap_or_else(|_| Duration::from_secs(0));

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("telegram bot shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(until_sweep) => {}
                batch = self.client.get_updates(
                    self.next_update_offset,
                    self.config.poll_timeout_seconds,
                ) => {
                    match batch {
                        Ok(updates) => {
                            if !updates.is_empty() {
                                let report = self.handle_update_batch(updates).await;
                                println!(
                                    "poll cycle: updates={} messages={} callbacks={} sent={} failures={}",
                                    report.updates_received,
                                    report.messages_handled,
                                    report.callbacks_handled,
                                    report.actions_sent,
                                    report.action_failures,
                                );
                            }
                        }
                        Err(error) => {
                            eprintln!("telegram poll failed: {error:#}");
                            tokio::time::sleep(Duration::from_millis(
                                self.config.retry_base_delay_ms,
                            ))
                            .await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_update_batch(&mut self, updates: Vec<TelegramUpdate>) -> PollCycleReport {
        let mut report = PollCycleReport::default();
        for update in updates {
            report.updates_received = report.updates_received.saturating_add(1);
            self.next_update_offset = self
                .next_update_offset
                .max(update.update_id.saturating_add(1));

            let today = tally_core::local_today();
            let (chat_id, input) = if let Some(message) = update.message {
                let Some(text) = message.text else {
                    continue;
                };
                report.messages_handled = report.messages_handled.saturating_add(1);
                (message.chat.id, classify_message_text(&text))
            } else if let Some(callback) = update.callback_query {
                if let Err(error) = self.client.answer_callback_query(&callback.id).await {
                    eprintln!("failed to answer callback query: {error:#}");
                }
                let Some(message) = callback.message else {
                    continue;
                };
                let Some(data) = callback.data else {
                    continue;
                };
                report.callbacks_handled = report.callbacks_handled.saturating_add(1);
                (
                    message.chat.id,
                    FlowInput::Callback {
                        data,
                        message_id: Some(message.message_id),
                    },
                )
            } else {
                continue;
            };

            let actions = self.flow.handle(chat_id, input, &mut self.store, today);
            for action in actions {
                match self.execute_action(chat_id, action).await {
                    Ok(()) => report.actions_sent = report.actions_sent.saturating_add(1),
                    Err(error) => {
                        report.action_failures = report.action_failures.saturating_add(1);
                        eprintln!("failed to deliver reply to chat {chat_id}: {error:#}");
                    }
                }
            }
        }
        report
    }

    async fn execute_action(&self, chat_id: i64, action: FlowAction) -> Result<()> {
        match action {
            FlowAction::Send { text, keyboard } => {
                let reply_markup = keyboard.as_ref().map(render_keyboard);
                self.client.send_message(chat_id, &text, reply_markup).await?;
                Ok(())
            }
            FlowAction::Edit { message_id, text } => {
                self.client.edit_message_text(chat_id, message_id, &text).await
            }
        }
    }

    /// Runs one reminder sweep over a fresh snapshot of the store, so events
    /// added after startup are included without any re-arming step.
    async fn run_sweep(&mut self) {
        if let Err(error) = self.store.reload() {
            eprintln!("reminder sweep: failed to reload events: {error:#}");
        }
        let today = tally_core::local_today();
        let report = run_reminder_sweep(self.store.events(), today, &self.client).await;
        println!(
            "reminder sweep: attempted={} delivered={} failed={} invalid={}",
            report.attempted, report.delivered, report.failed, report.invalid
        );
    }
}

#[async_trait]
impl ReminderSender for TelegramApiClient {
    async fn send_reminder(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text, None).await?;
        Ok(())
    }
}

/// Splits a leading-slash message into a command and its arguments; anything
/// else is plain flow text. The `@botname` suffix Telegram appends in group
/// chats is stripped from the command token.
fn classify_message_text(text: &str) -> FlowInput {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix('/') {
        let (token, args) = match rest.split_once(char::is_whitespace) {
            Some((token, args)) => (token, args.trim()),
            None => (rest, ""),
        };
        let name = token
            .split('@')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        return FlowInput::Command {
            name,
            args: args.to_string(),
        };
    }
    FlowInput::Text(trimmed.to_string())
}

fn render_keyboard(keyboard: &KeyboardSpec) -> Value {
    match keyboard {
        KeyboardSpec::MainMenu => json!({
            "keyboard": [
                [{ "text": MENU_ADD }, { "text": MENU_LIST }],
                [{ "text": MENU_DELETE }, { "text": MENU_CANCEL }],
            ],
            "resize_keyboard": true,
        }),
        KeyboardSpec::StartDateChoice => json!({
            "inline_keyboard": [
                [{ "text": "Skip", "callback_data": CALLBACK_SKIP }],
                [{ "text": "Custom date", "callback_data": CALLBACK_CUSTOM }],
            ],
        }),
        KeyboardSpec::DeleteList(names) => {
            let mut rows = names
                .iter()
                .enumerate()
                .map(|(index, name)| json!([{ "text": name, "callback_data": index.to_string() }]))
                .collect::<Vec<Value>>();
            rows.push(json!([{ "text": "Cancel", "callback_data": CALLBACK_CANCEL }]));
            json!({ "inline_keyboard": rows })
        }
    }
}
