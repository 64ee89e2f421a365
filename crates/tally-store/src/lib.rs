//! Durable event storage for Tally.
//!
//! Holds the ordered in-memory event collection and mirrors every mutation to
//! a flat JSON file with full-overwrite semantics. The file is the only
//! durable state the bot keeps; insertion order is preserved across reload.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tally_core::write_text_atomic;

/// A named target date tracked for countdown reporting.
///
/// `event_name` is the human-facing key for deletion-by-name and does not
/// have to be unique; name-based deletion acts on the first match in storage
/// order, which makes duplicate names ambiguous to delete. That is a known
/// limitation, not something the store papers over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub chat_id: i64,
    pub event_name: String,
    pub event_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
}

/// Errors from store operations that callers are expected to recover from.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no event found with name '{name}'")]
    NotFound { name: String },
    #[error("event index {index} is out of range (store holds {len} events)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}

/// Ordered event collection mirrored to a JSON file on every mutation.
pub struct EventStore {
    path: PathBuf,
    events: Vec<Event>,
}

impl EventStore {
    /// Loads the store from `path`. A missing file is a normal startup
    /// condition and yields an empty store; an unreadable or malformed file
    /// is an error.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let events = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<Vec<Event>>(&raw)
                .with_context(|| format!("failed to parse event file {}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self { path, events })
    }

    /// Re-reads the backing file, replacing the in-memory collection. Used
    /// before a reminder sweep so externally edited files are picked up.
    pub fn reload(&mut self) -> anyhow::Result<()> {
        let fresh = Self::load(self.path.clone())?;
        self.events = fresh.events;
        Ok(())
    }

    /// Serializes the full collection to the backing file, overwriting prior
    /// content. Called after every mutation; if this fails the in-memory
    /// mutation stands and the error propagates so callers never report a
    /// silent success.
    pub fn save(&self) -> anyhow::Result<()> {
        let mut payload =
            serde_json::to_string_pretty(&self.events).context("failed to serialize events")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    /// Appends an event, then persists.
    pub fn add(&mut self, event: Event) -> anyhow::Result<()> {
        self.events.push(event);
        self.save()
    }

    /// Removes and returns the event at `index`, then persists. The
    /// collection is left unchanged when the index is out of range.
    pub fn remove_at(&mut self, index: usize) -> Result<Event, StoreError> {
        if index >= self.events.len() {
            return Err(StoreError::IndexOutOfRange {
                index,
                len: self.events.len(),
            });
        }
        let removed = self.events.remove(index);
        self.save()?;
        Ok(removed)
    }

    /// Removes and returns the first event whose name matches `name`
    /// case-insensitively, then persists. The collection is left unchanged
    /// when nothing matches.
    pub fn remove_by_name(&mut self, name: &str) -> Result<Event, StoreError> {
        let needle = name.trim().to_lowercase();
        let position = self
            .events
            .iter()
            .position(|event| event.event_name.to_lowercase() == needle)
            .ok_or_else(|| StoreError::NotFound {
                name: name.trim().to_string(),
            })?;
        let removed = self.events.remove(position);
        self.save()?;
        Ok(removed)
    }

    /// Borrows the collection in insertion order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
