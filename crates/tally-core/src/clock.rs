use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;

/// Milliseconds since the Unix epoch, saturating instead of panicking on a
/// clock set before 1970.
pub fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Today's calendar date in the process-local timezone.
///
/// Countdown math is defined against the local calendar day, so this is the
/// single place the wall clock enters the computation path.
pub fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
