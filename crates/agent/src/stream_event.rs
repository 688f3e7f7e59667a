//! Protocol events streamed to clients.
//!
//! Every run produces:
//!
//! ```text
//! RUN_STARTED
//!   [TEXT_MESSAGE_START → TEXT_MESSAGE_CONTENT → TEXT_MESSAGE_END]
//!   [TOOL_CALL_START → TOOL_CALL_ARGS → TOOL_CALL_END]*
//!   ...
//! RUN_FINISHED
//! ```
//!
//! Agent delegations never show up as tool-call events.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use switchboard_core::message::ToolCallRequest;

/// Events emitted while a run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted { thread_id: String, run_id: String },

    #[serde(rename_all = "camelCase")]
    TextMessageStart { message_id: String, role: String },

    #[serde(rename_all = "camelCase")]
    TextMessageContent { message_id: String, delta: String },

    #[serde(rename_all = "camelCase")]
    TextMessageEnd { message_id: String },

    #[serde(rename_all = "camelCase")]
    ToolCallStart {
        tool_call_id: String,
        tool_call_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    ToolCallArgs { tool_call_id: String, delta: String },

    #[serde(rename_all = "camelCase")]
    ToolCallEnd { tool_call_id: String },

    /// Always the last event. `error` is set when the run failed.
    #[serde(rename_all = "camelCase")]
    RunFinished {
        thread_id: String,
        run_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ProtocolEvent {
    /// The `type` discriminator, also used as the SSE event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "RUN_STARTED",
            Self::TextMessageStart { .. } => "TEXT_MESSAGE_START",
            Self::TextMessageContent { .. } => "TEXT_MESSAGE_CONTENT",
            Self::TextMessageEnd { .. } => "TEXT_MESSAGE_END",
            Self::ToolCallStart { .. } => "TOOL_CALL_START",
            Self::ToolCallArgs { .. } => "TOOL_CALL_ARGS",
            Self::ToolCallEnd { .. } => "TOOL_CALL_END",
            Self::RunFinished { .. } => "RUN_FINISHED",
        }
    }

    /// START / CONTENT / END for one assistant message.
    pub fn text_message(message_id: &str, text: &str) -> [ProtocolEvent; 3] {
        [
            Self::TextMessageStart {
                message_id: message_id.to_string(),
                role: "assistant".into(),
            },
            Self::TextMessageContent {
                message_id: message_id.to_string(),
                delta: text.to_string(),
            },
            Self::TextMessageEnd {
                message_id: message_id.to_string(),
            },
        ]
    }

    /// START / ARGS / END for one tool call.
    pub fn tool_call(call: &ToolCallRequest, parent_message_id: Option<&str>) -> [ProtocolEvent; 3] {
        [
            Self::ToolCallStart {
                tool_call_id: call.id.clone(),
                tool_call_name: call.name.clone(),
                parent_message_id: parent_message_id.map(str::to_string),
            },
            Self::ToolCallArgs {
                tool_call_id: call.id.clone(),
                delta: call.arguments.clone(),
            },
            Self::ToolCallEnd {
                tool_call_id: call.id.clone(),
            },
        ]
    }
}

/// Where a run's events go. A sink with no receiver drops everything.
///
/// Sending never blocks and never fails: once the consumer disconnects
/// the run keeps going and its events are discarded.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ProtocolEvent>>,
}

impl EventSink {
    /// A connected sink and the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProtocolEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event.
    pub fn discard() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProtocolEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = ProtocolEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Emit the text triplet, unless `text` is empty.
    pub fn text_message(&self, message_id: &str, text: &str) {
        if !text.is_empty() {
            self.emit_all(ProtocolEvent::text_message(message_id, text));
        }
    }
}
