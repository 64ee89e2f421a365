//! Foundational low-level utilities shared across Tally crates.
//!
//! Provides the atomic file-write helper used for durable event storage and
//! the clock helpers used by countdown math and runtime log lines.

pub mod atomic_io;
pub mod clock;

pub use atomic_io::write_text_atomic;
pub use clock::{current_unix_timestamp_ms, local_today};

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn unit_timestamp_ms_is_past_a_known_epoch() {
        // 2024-01-01T00:00:00Z in milliseconds.
        assert!(current_unix_timestamp_ms() > 1_704_067_200_000);
    }

    #[test]
    fn unit_write_text_atomic_writes_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("events.json");
        write_text_atomic(&path, "[]").expect("write");
        assert_eq!(read_to_string(&path).expect("read"), "[]");
    }

    #[test]
    fn functional_write_text_atomic_replaces_existing_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("events.json");
        write_text_atomic(&path, "first").expect("write first");
        write_text_atomic(&path, "second").expect("write second");
        assert_eq!(read_to_string(&path).expect("read"), "second");
    }

    #[test]
    fn regression_write_text_atomic_rejects_directory_target() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        assert!(write_text_atomic(tempdir.path(), "nope").is_err());
    }
}
