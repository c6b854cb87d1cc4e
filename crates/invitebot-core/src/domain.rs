//! Read-only records decoded from the streaming and REST APIs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Mastodon account (only the fields the bot looks at).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    /// `username` for local accounts, `username@domain` for remote ones.
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl Account {
    /// Local accounts are hosted on the bot's own instance.
    pub fn is_local(&self) -> bool {
        self.acct == self.username
    }
}

/// A post. `content` is the rendered HTML.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Status {
    pub id: String,
    pub content: String,
    pub account: Account,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Mention,
    Status,
    Reblog,
    Follow,
    FollowRequest,
    Favourite,
    Poll,
    Update,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub created_at: DateTime<Utc>,
    pub account: Account,
    #[serde(default)]
    pub status: Option<Status>,
}

/// Named streaming scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamChannel {
    Public,
    User,
}

impl StreamChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamChannel::Public => "public",
            StreamChannel::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "public" => Some(StreamChannel::Public),
            "user" => Some(StreamChannel::User),
            _ => None,
        }
    }
}

impl fmt::Display for StreamChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outer envelope of every streaming frame.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RawFrame {
    pub event: String,
    /// JSON-encoded string for `notification`/`update`, a bare id for `delete`.
    #[serde(default)]
    pub payload: Option<String>,
}

/// Classified stream event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    NotificationReceived { notification: Box<Notification> },
    StatusUpdated { status: Box<Status> },
    StatusDeleted { status_id: String },
    ConnectionReady { channel: StreamChannel },
}
