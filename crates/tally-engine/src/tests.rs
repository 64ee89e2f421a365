//! Tests for countdown math, rendering, and sweep delivery independence.

use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, TimeZone, Timelike};
use tally_store::Event;

use super::{
    compose_list_text, compose_reminder_text, compute_countdown, format_percent, next_sweep_after,
    run_reminder_sweep, ReminderSender, SweepReport, DEFAULT_REMINDER_CRON, EMPTY_LIST_MESSAGE,
};

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("test date")
}

fn event(chat_id: i64, name: &str, event_date: &str, start_date: Option<&str>) -> Event {
    Event {
        chat_id,
        event_name: name.to_string(),
        event_date: event_date.to_string(),
        start_date: start_date.map(str::to_string),
    }
}

#[test]
fn unit_days_left_without_start_date() {
    let countdown = compute_countdown("2030-01-11", None, date("2030-01-01")).expect("countdown");
    assert_eq!(countdown.days_left, 10);
    assert_eq!(countdown.percent_elapsed, None);
}

#[test]
fn unit_days_left_is_negative_for_past_dates() {
    let countdown = compute_countdown("2020-01-01", None, date("2020-01-08")).expect("countdown");
    assert_eq!(countdown.days_left, -7);
}

#[test]
fn unit_days_left_is_zero_on_the_event_day() {
    let countdown = compute_countdown("2030-05-05", None, date("2030-05-05")).expect("countdown");
    assert_eq!(countdown.days_left, 0);
}

#[test]
fn functional_percentage_matches_reference_midyear_case() {
    let countdown =
        compute_countdown("2025-12-25", Some("2025-01-01"), date("2025-07-01")).expect("countdown");
    assert_eq!(countdown.days_left, 177);
    assert_eq!(countdown.percent_elapsed, Some(50.56));
}

#[test]
fn unit_percentage_is_rounded_to_two_decimals() {
    // 3 of 7 days elapsed: 42.857142... -> 42.86
    let countdown =
        compute_countdown("2030-01-08", Some("2030-01-01"), date("2030-01-04")).expect("countdown");
    assert_eq!(countdown.percent_elapsed, Some(42.86));
}

#[test]
fn regression_equal_start_and_event_date_has_undefined_percentage() {
    let countdown =
        compute_countdown("2030-01-01", Some("2030-01-01"), date("2029-12-25")).expect("countdown");
    assert_eq!(countdown.percent_elapsed, None);
}

#[test]
fn regression_malformed_event_date_is_an_error() {
    assert!(compute_countdown("not-a-date", None, date("2030-01-01")).is_err());
    assert!(compute_countdown("2030-13-45", None, date("2030-01-01")).is_err());
}

#[test]
fn regression_malformed_start_date_is_an_error() {
    assert!(compute_countdown("2030-01-01", Some("later"), date("2029-01-01")).is_err());
}

#[test]
fn unit_reminder_text_includes_name_days_and_percentage() {
    let event = event(1, "Launch", "2025-12-25", Some("2025-01-01"));
    let countdown = compute_countdown("2025-12-25", Some("2025-01-01"), date("2025-07-01"))
        .expect("countdown");
    assert_eq!(
        compose_reminder_text(&event, &countdown),
        "🎉 Launch is in 177 days! (50.56% passed)"
    );
}

#[test]
fn unit_reminder_text_renders_missing_percentage_as_na() {
    let event = event(1, "Trip", "2030-01-11", None);
    let countdown = compute_countdown("2030-01-11", None, date("2030-01-01")).expect("countdown");
    assert_eq!(
        compose_reminder_text(&event, &countdown),
        "🎉 Trip is in 10 days! (N/A% passed)"
    );
}

#[test]
fn unit_format_percent_renders_two_decimals() {
    assert_eq!(format_percent(Some(50.0)), "50.00");
    assert_eq!(format_percent(Some(50.56)), "50.56");
    assert_eq!(format_percent(None), "N/A");
}

#[test]
fn unit_empty_list_uses_designated_message() {
    assert_eq!(compose_list_text(&[], date("2030-01-01")), EMPTY_LIST_MESSAGE);
}

#[test]
fn functional_list_renders_one_line_per_event_in_store_order() {
    let events = vec![
        event(1, "Trip", "2030-01-11", None),
        event(1, "Launch", "2030-01-06", Some("2030-01-01")),
    ];
    let text = compose_list_text(&events, date("2030-01-01"));
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "Trip: 10 days left (N/A% passed)");
    assert_eq!(lines[1], "Launch: 5 days left (0.00% passed)");
}

#[test]
fn regression_list_reports_invalid_rows_in_place() {
    let events = vec![
        event(1, "Broken", "soon", None),
        event(1, "Trip", "2030-01-11", None),
    ];
    let text = compose_list_text(&events, date("2030-01-01"));
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "Broken: stored date 'soon' is invalid");
    assert_eq!(lines[1], "Trip: 10 days left (N/A% passed)");
}

#[test]
fn unit_next_sweep_lands_on_nine_am_local() {
    let after = Local.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
    let next = next_sweep_after(DEFAULT_REMINDER_CRON, after).expect("next");
    assert_eq!(next.hour(), 9);
    assert_eq!(next.minute(), 0);
    assert!(next > after);
}

#[test]
fn regression_next_sweep_rejects_malformed_expression() {
    let after = Local.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
    assert!(next_sweep_after("every day at nine", after).is_err());
}

struct FlakySender {
    fail_for_chat: i64,
    sent: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl ReminderSender for FlakySender {
    async fn send_reminder(&self, chat_id: i64, text: &str) -> Result<()> {
        if chat_id == self.fail_for_chat {
            bail!("simulated delivery failure");
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push((chat_id, text.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn functional_sweep_continues_past_failed_deliveries() {
    let events = vec![
        event(1, "First", "2030-01-11", None),
        event(2, "Down", "2030-01-11", None),
        event(3, "Last", "2030-01-11", None),
    ];
    let sender = FlakySender {
        fail_for_chat: 2,
        sent: Mutex::new(Vec::new()),
    };

    let report = run_reminder_sweep(&events, date("2030-01-01"), &sender).await;
    assert_eq!(
        report,
        SweepReport {
            attempted: 3,
            delivered: 2,
            failed: 1,
            invalid: 0,
        }
    );

    let sent = sender.sent.lock().expect("sent lock");
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, 1);
    assert_eq!(sent[1].0, 3);
}

#[tokio::test]
async fn regression_sweep_counts_unparsable_dates_without_sending() {
    let events = vec![
        event(1, "Broken", "???", None),
        event(2, "Fine", "2030-01-11", None),
    ];
    let sender = FlakySender {
        fail_for_chat: -1,
        sent: Mutex::new(Vec::new()),
    };

    let report = run_reminder_sweep(&events, date("2030-01-01"), &sender).await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.invalid, 1);
    assert_eq!(report.delivered, 1);
}
