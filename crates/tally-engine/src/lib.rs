//! Countdown computation and the daily reminder sweep.
//!
//! All date math lives here, pure and clock-free: callers pass today's date
//! in. The sweep delivers through the [`ReminderSender`] seam so transports
//! stay out of the computation path.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use cron::Schedule;
use tally_store::Event;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Default sweep schedule: every day at 09:00 local time.
pub const DEFAULT_REMINDER_CRON: &str = "0 0 9 * * *";

pub const EMPTY_LIST_MESSAGE: &str = "No events found.";

/// Days remaining until an event plus, when a start date is known, the share
/// of the start-to-event interval already behind us.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Countdown {
    /// Whole days until the event date; negative once the date has passed.
    pub days_left: i64,
    /// Percentage of the interval elapsed, rounded to two decimals. `None`
    /// when no start date is set, and also when the start date equals the
    /// event date: a zero-day interval has no meaningful percentage.
    pub percent_elapsed: Option<f64>,
}

pub fn parse_event_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .with_context(|| format!("invalid date '{}' (expected YYYY-MM-DD)", raw.trim()))
}

/// Computes the countdown for an event date as of `today`.
///
/// Malformed date strings are an error; they must surface to the user
/// instead of producing silently wrong math.
pub fn compute_countdown(
    event_date: &str,
    start_date: Option<&str>,
    today: NaiveDate,
) -> Result<Countdown> {
    let event = parse_event_date(event_date)?;
    let days_left = (event - today).num_days();

    let percent_elapsed = match start_date {
        Some(raw) => {
            let start = parse_event_date(raw)?;
            let total_days = (event - start).num_days();
            if total_days == 0 {
                None
            } else {
                let raw_percent =
                    (total_days - days_left) as f64 / total_days as f64 * 100.0;
                Some((raw_percent * 100.0).round() / 100.0)
            }
        }
        None => None,
    };

    Ok(Countdown {
        days_left,
        percent_elapsed,
    })
}

pub fn format_percent(percent_elapsed: Option<f64>) -> String {
    match percent_elapsed {
        Some(value) => format!("{value:.2}"),
        None => "N/A".to_string(),
    }
}

/// Renders the daily reminder line for one event.
pub fn compose_reminder_text(event: &Event, countdown: &Countdown) -> String {
    format!(
        "🎉 {} is in {} days! ({}% passed)",
        event.event_name,
        countdown.days_left,
        format_percent(countdown.percent_elapsed)
    )
}

/// Renders the on-demand list for all stored events, one line per event in
/// store order. An empty store gets an explicit message rather than an empty
/// string; a row with an unparsable date is reported in place so the rest of
/// the list still renders.
pub fn compose_list_text(events: &[Event], today: NaiveDate) -> String {
    if events.is_empty() {
        return EMPTY_LIST_MESSAGE.to_string();
    }

    let mut lines = Vec::with_capacity(events.len());
    for event in events {
        match compute_countdown(&event.event_date, event.start_date.as_deref(), today) {
            Ok(countdown) => lines.push(format!(
                "{}: {} days left ({}% passed)",
                event.event_name,
                countdown.days_left,
                format_percent(countdown.percent_elapsed)
            )),
            Err(_) => lines.push(format!(
                "{}: stored date '{}' is invalid",
                event.event_name, event.event_date
            )),
        }
    }
    lines.join("\n")
}

/// Returns the next sweep trigger strictly after `after` for a cron
/// expression evaluated in local time.
pub fn next_sweep_after(cron_expr: &str, after: DateTime<Local>) -> Result<DateTime<Local>> {
    let schedule = Schedule::from_str(cron_expr)
        .with_context(|| format!("invalid cron expression '{cron_expr}'"))?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| anyhow!("cron expression '{cron_expr}' has no future occurrence"))
}

/// Outbound-delivery seam implemented by the chat transport.
#[async_trait]
pub trait ReminderSender: Send + Sync {
    async fn send_reminder(&self, chat_id: i64, text: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub invalid: usize,
}

/// Delivers one reminder per event. Each delivery is independent: a compute
/// or send failure is counted and reported, and the sweep moves on to the
/// remaining events.
pub async fn run_reminder_sweep(
    events: &[Event],
    today: NaiveDate,
    sender: &dyn ReminderSender,
) -> SweepReport {
    let mut report = SweepReport {
        attempted: events.len(),
        ..SweepReport::default()
    };

    for event in events {
        let countdown =
            match compute_countdown(&event.event_date, event.start_date.as_deref(), today) {
                Ok(countdown) => countdown,
                Err(error) => {
                    report.invalid = report.invalid.saturating_add(1);
                    eprintln!(
                        "reminder sweep skipped event: name={} chat_id={} error={error:#}",
                        event.event_name, event.chat_id
                    );
                    continue;
                }
            };
        let text = compose_reminder_text(event, &countdown);
        match sender.send_reminder(event.chat_id, &text).await {
            Ok(()) => report.delivered = report.delivered.saturating_add(1),
            Err(error) => {
                report.failed = report.failed.saturating_add(1);
                eprintln!(
                    "reminder delivery failed: name={} chat_id={} error={error:#}",
                    event.event_name, event.chat_id
                );
            }
        }
    }

    report
}

#[cfg(test)]
mod tests;
