//! Conversation flow controller: one explicit state machine per chat.
//!
//! The controller is pure dispatch: it consumes a classified inbound input
//! plus the event store and today's date, and returns the outbound actions
//! for the transport loop to execute. Session data for in-progress flows
//! lives inside the state variants, so completing or cancelling a flow
//! discards it wholesale.

use std::collections::HashMap;

use chrono::NaiveDate;
use tally_engine::{compose_list_text, parse_event_date};
use tally_store::{Event, EventStore, StoreError};

pub(super) const MENU_ADD: &str = "➕ Add Event";
pub(super) const MENU_LIST: &str = "📋 List Events";
pub(super) const MENU_DELETE: &str = "🗑 Delete Event";
pub(super) const MENU_CANCEL: &str = "❌ Cancel";

pub(super) const CALLBACK_SKIP: &str = "skip";
pub(super) const CALLBACK_CUSTOM: &str = "custom";
pub(super) const CALLBACK_CANCEL: &str = "cancel";

const PROMPT_EVENT_NAME: &str = "Enter the event name:";
const PROMPT_EVENT_DATE: &str = "Enter the event date (YYYY-MM-DD):";
const PROMPT_START_DATE: &str = "Enter the start date (YYYY-MM-DD):";
const PROMPT_START_CHOICE: &str = "Do you want to set a start date?";
const PROMPT_DELETE_NAME: &str = "Enter the name of the event to delete:";
const PROMPT_DELETE_PICK: &str = "Select an event to delete:";

/// Conversational state for one chat. `Idle` chats carry no session entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(super) enum ChatFlowState {
    #[default]
    Idle,
    AwaitingEventName,
    AwaitingEventDate {
        name: String,
    },
    /// Event name and date are collected; the chat was shown the inline
    /// skip/custom choice. Free text in this state is taken as a custom
    /// start date, matching the button-optional entry path.
    AwaitingStartDateChoice {
        name: String,
        event_date: String,
    },
    AwaitingDeleteName,
    AwaitingDeleteButton,
}

/// Inbound input after transport-level classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum FlowInput {
    Text(String),
    Command { name: String, args: String },
    Callback { data: String, message_id: Option<i64> },
}

/// Keyboard attached to an outbound message, named abstractly so the flow
/// stays independent of Telegram markup encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum KeyboardSpec {
    MainMenu,
    StartDateChoice,
    /// One button per stored event name, in store order, plus a cancel row.
    DeleteList(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum FlowAction {
    Send {
        text: String,
        keyboard: Option<KeyboardSpec>,
    },
    Edit {
        message_id: i64,
        text: String,
    },
}

impl FlowAction {
    fn send(text: impl Into<String>) -> Self {
        Self::Send {
            text: text.into(),
            keyboard: None,
        }
    }

    fn send_with(text: impl Into<String>, keyboard: KeyboardSpec) -> Self {
        Self::Send {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    /// Edits the originating message in place when the callback carried a
    /// message id, otherwise falls back to a fresh message.
    fn edit_or_send(message_id: Option<i64>, text: impl Into<String>) -> Self {
        match message_id {
            Some(message_id) => Self::Edit {
                message_id,
                text: text.into(),
            },
            None => Self::send(text),
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct FlowController {
    sessions: HashMap<i64, ChatFlowState>,
}

impl FlowController {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn state(&self, chat_id: i64) -> ChatFlowState {
        self.sessions.get(&chat_id).cloned().unwrap_or_default()
    }

    pub(super) fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Routes one inbound input for `chat_id` against its current state and
    /// returns the outbound actions. Mutations go through `store`, which
    /// persists synchronously; a persistence failure is surfaced to the user
    /// and never reported as success.
    pub(super) fn handle(
        &mut self,
        chat_id: i64,
        input: FlowInput,
        store: &mut EventStore,
        today: NaiveDate,
    ) -> Vec<FlowAction> {
        match input {
            FlowInput::Command { name, args } => {
                self.handle_command(chat_id, &name, &args, store, today)
            }
            FlowInput::Callback { data, message_id } => {
                self.handle_callback(chat_id, &data, message_id, store)
            }
            FlowInput::Text(text) => self.handle_text(chat_id, &text, store, today),
        }
    }

    fn handle_command(
        &mut self,
        chat_id: i64,
        name: &str,
        args: &str,
        store: &mut EventStore,
        today: NaiveDate,
    ) -> Vec<FlowAction> {
        match name {
            // Re-showing the menu abandons any in-progress flow; a stale
            // session behind a fresh menu would misroute the next message.
            "start" => {
                self.sessions.remove(&chat_id);
                vec![FlowAction::send_with(
                    "Welcome! Choose an option:",
                    KeyboardSpec::MainMenu,
                )]
            }
            "listevents" => vec![FlowAction::send(compose_list_text(store.events(), today))],
            "cancel" => self.cancel(chat_id),
            "delete" => {
                let target = args.trim();
                if target.is_empty() {
                    self.sessions
                        .insert(chat_id, ChatFlowState::AwaitingDeleteName);
                    return vec![FlowAction::send(PROMPT_DELETE_NAME)];
                }
                // Command form with a name is terminal either way.
                self.sessions.remove(&chat_id);
                match store.remove_by_name(target) {
                    Ok(removed) => vec![FlowAction::send(format!(
                        "Deleted event: {}",
                        removed.event_name
                    ))],
                    Err(StoreError::NotFound { name }) => vec![FlowAction::send(format!(
                        "No event found with name '{name}'."
                    ))],
                    Err(error) => vec![persist_failure_action(&error)],
                }
            }
            _ => vec![FlowAction::send(
                "Unsupported command. Try /start, /listevents, /delete or /cancel.",
            )],
        }
    }

    fn handle_callback(
        &mut self,
        chat_id: i64,
        data: &str,
        message_id: Option<i64>,
        store: &mut EventStore,
    ) -> Vec<FlowAction> {
        match self.state(chat_id) {
            ChatFlowState::AwaitingStartDateChoice { name, event_date } => match data {
                CALLBACK_SKIP => {
                    self.finalize_add(chat_id, store, name, event_date, None, message_id)
                }
                CALLBACK_CUSTOM => {
                    vec![FlowAction::edit_or_send(message_id, PROMPT_START_DATE)]
                }
                _ => Vec::new(),
            },
            ChatFlowState::AwaitingDeleteButton => {
                if data == CALLBACK_CANCEL {
                    self.sessions.remove(&chat_id);
                    return vec![FlowAction::edit_or_send(message_id, "Operation cancelled.")];
                }
                let Ok(index) = data.parse::<usize>() else {
                    return Vec::new();
                };
                self.sessions.remove(&chat_id);
                match store.remove_at(index) {
                    Ok(removed) => vec![FlowAction::edit_or_send(
                        message_id,
                        format!("Deleted event: {}", removed.event_name),
                    )],
                    Err(StoreError::IndexOutOfRange { .. }) => vec![FlowAction::edit_or_send(
                        message_id,
                        "That selection is no longer valid.",
                    )],
                    Err(error) => vec![persist_failure_action(&error)],
                }
            }
            // Stray callbacks from finished flows are ignored.
            _ => Vec::new(),
        }
    }

    fn handle_text(
        &mut self,
        chat_id: i64,
        text: &str,
        store: &mut EventStore,
        today: NaiveDate,
    ) -> Vec<FlowAction> {
        let trimmed = text.trim();
        if trimmed == MENU_CANCEL {
            return self.cancel(chat_id);
        }

        match self.state(chat_id) {
            ChatFlowState::Idle => self.handle_menu_choice(chat_id, trimmed, store, today),
            ChatFlowState::AwaitingEventName => {
                if trimmed.is_empty() {
                    return vec![FlowAction::send(format!(
                        "Event name cannot be empty. {PROMPT_EVENT_NAME}"
                    ))];
                }
                self.sessions.insert(
                    chat_id,
                    ChatFlowState::AwaitingEventDate {
                        name: trimmed.to_string(),
                    },
                );
                vec![FlowAction::send(PROMPT_EVENT_DATE)]
            }
            ChatFlowState::AwaitingEventDate { name } => {
                if parse_event_date(trimmed).is_err() {
                    return vec![FlowAction::send(format!(
                        "'{trimmed}' is not a valid date. {PROMPT_EVENT_DATE}"
                    ))];
                }
                self.sessions.insert(
                    chat_id,
                    ChatFlowState::AwaitingStartDateChoice {
                        name,
                        event_date: trimmed.to_string(),
                    },
                );
                vec![FlowAction::send_with(
                    PROMPT_START_CHOICE,
                    KeyboardSpec::StartDateChoice,
                )]
            }
            ChatFlowState::AwaitingStartDateChoice { name, event_date } => {
                if parse_event_date(trimmed).is_err() {
                    return vec![FlowAction::send(format!(
                        "'{trimmed}' is not a valid date. {PROMPT_START_DATE}"
                    ))];
                }
                self.finalize_add(
                    chat_id,
                    store,
                    name,
                    event_date,
                    Some(trimmed.to_string()),
                    None,
                )
            }
            ChatFlowState::AwaitingDeleteName => match store.remove_by_name(trimmed) {
                Ok(removed) => {
                    self.sessions.remove(&chat_id);
                    vec![FlowAction::send(format!(
                        "Deleted event: {}",
                        removed.event_name
                    ))]
                }
                Err(StoreError::NotFound { name }) => vec![FlowAction::send(format!(
                    "No event found with name '{name}'. Try again or type /cancel."
                ))],
                Err(error) => {
                    self.sessions.remove(&chat_id);
                    vec![persist_failure_action(&error)]
                }
            },
            ChatFlowState::AwaitingDeleteButton => {
                // The chat has an inline keyboard pending; free text is not
                // part of this flow.
                Vec::new()
            }
        }
    }

    fn handle_menu_choice(
        &mut self,
        chat_id: i64,
        choice: &str,
        store: &mut EventStore,
        today: NaiveDate,
    ) -> Vec<FlowAction> {
        match choice {
            MENU_ADD => {
                self.sessions
                    .insert(chat_id, ChatFlowState::AwaitingEventName);
                vec![FlowAction::send(PROMPT_EVENT_NAME)]
            }
            MENU_LIST => vec![FlowAction::send(compose_list_text(store.events(), today))],
            MENU_DELETE => {
                if store.is_empty() {
                    return vec![FlowAction::send("No events to delete.")];
                }
                self.sessions
                    .insert(chat_id, ChatFlowState::AwaitingDeleteButton);
                let names = store
                    .events()
                    .iter()
                    .map(|event| event.event_name.clone())
                    .collect();
                vec![FlowAction::send_with(
                    PROMPT_DELETE_PICK,
                    KeyboardSpec::DeleteList(names),
                )]
            }
            // Free text outside the menu is not routed anywhere from Idle.
            _ => Vec::new(),
        }
    }

    fn cancel(&mut self, chat_id: i64) -> Vec<FlowAction> {
        self.sessions.remove(&chat_id);
        vec![FlowAction::send("Operation cancelled.")]
    }

    fn finalize_add(
        &mut self,
        chat_id: i64,
        store: &mut EventStore,
        name: String,
        event_date: String,
        start_date: Option<String>,
        message_id: Option<i64>,
    ) -> Vec<FlowAction> {
        self.sessions.remove(&chat_id);
        let event = Event {
            chat_id,
            event_name: name.clone(),
            event_date,
            start_date,
        };
        match store.add(event) {
            Ok(()) => vec![FlowAction::edit_or_send(
                message_id,
                format!("Event '{name}' added successfully!"),
            )],
            Err(error) => vec![persist_failure_action(&StoreError::Persist(error))],
        }
    }
}

fn persist_failure_action(error: &StoreError) -> FlowAction {
    FlowAction::send(format!(
        "Something went wrong while saving your events: {error}. The change may not be stored."
    ))
}
