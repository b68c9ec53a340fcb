//! Domain events and their wire envelope.
//!
//! Every event leaves the service as a JSON envelope:
//!
//! ```text
//! { "type": "new_comment", "data": { ... } }
//! { "type": "connection", "message": "Connected to real-time updates" }
//! ```
//!
//! `data` is present for post and comment events, `message` for connection
//! and error events. Absent fields are omitted rather than serialized as
//! `null`. Several envelopes written in one frame are separated by `\n`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Text of the acknowledgement sent to every new session.
pub const CONNECTION_ACK_MESSAGE: &str = "Connected to real-time updates";

/// Separator between envelopes coalesced into one text frame.
pub const BATCH_SEPARATOR: char = '\n';

/// Read-only projection of a blog post as pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

/// Read-only projection of a comment as pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: String,
    pub blog_post_id: String,
    pub author_id: String,
    pub content: String,
    /// Set for replies; top-level comments have no parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An event fanned out by the hub.
///
/// Immutable once published; the hub shares one `Arc<Event>` with every
/// subscriber mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NewPost(PostView),
    NewComment(CommentView),
    Connection(String),
    Error(String),
}

/// Discriminant of an [`Event`], used for the wire tag and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connection,
    NewPost,
    NewComment,
    Error,
}

impl EventKind {
    /// Returns the wire `type` tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connection => "connection",
            EventKind::NewPost => "new_blog_post",
            EventKind::NewComment => "new_comment",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload carried in the `data` field.
#[derive(Serialize)]
#[serde(untagged)]
enum WireData<'a> {
    Post(&'a PostView),
    Comment(&'a CommentView),
}

#[derive(Serialize)]
struct WireEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<WireData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl Event {
    /// The acknowledgement enqueued into a session's own mailbox on connect.
    #[must_use]
    pub fn connection_ack() -> Self {
        Event::Connection(CONNECTION_ACK_MESSAGE.to_string())
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::NewPost(_) => EventKind::NewPost,
            Event::NewComment(_) => EventKind::NewComment,
            Event::Connection(_) => EventKind::Connection,
            Event::Error(_) => EventKind::Error,
        }
    }

    fn envelope(&self) -> WireEnvelope<'_> {
        let (data, message) = match self {
            Event::NewPost(post) => (Some(WireData::Post(post)), None),
            Event::NewComment(comment) => (Some(WireData::Comment(comment)), None),
            Event::Connection(text) | Event::Error(text) => (None, Some(text.as_str())),
        };

        WireEnvelope {
            kind: self.kind().as_str(),
            data,
            message,
        }
    }

    /// Serialize this event as a single JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload cannot be serialized.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.envelope())
    }
}

/// Encode a batch of events into one newline-delimited text frame.
///
/// Events that fail to serialize are logged and skipped; the remaining
/// envelopes keep their order. Returns an empty string only when every
/// event failed.
#[must_use]
pub fn encode_batch(events: &[Arc<Event>]) -> String {
    let mut frame = String::new();

    for event in events {
        match event.to_wire() {
            Ok(line) => {
                if !frame.is_empty() {
                    frame.push(BATCH_SEPARATOR);
                }
                frame.push_str(&line);
            }
            Err(e) => {
                warn!(
                    target: "rt.session",
                    kind = %event.kind(),
                    error = %e,
                    "Skipping event that failed to serialize"
                );
            }
        }
    }

    frame
}

/// Envelope received from a client.
///
/// Clients are not expected to send application messages; inbound frames
/// are parsed only so malformed input can be reported.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl InboundEnvelope {
    /// Parse one client text frame.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for frames that are not a JSON object
    /// with a string `type` field.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
