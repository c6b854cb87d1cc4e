use async_trait::async_trait;

use crate::{
    domain::{Status, StreamChannel},
    ledger::InviteRecord,
    Result,
};

/// Posts a reply under a status.
#[async_trait]
pub trait ReplyPort: Send + Sync {
    async fn reply(&self, to: &Status, text: &str) -> Result<()>;
}

/// Result of an insert into the invite table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Rows affected (1 on success).
    Inserted(u64),
    /// The store's uniqueness constraint on `code` rejected the row.
    Conflict,
}

/// Durable storage for invite records.
///
/// Implementations must enforce uniqueness of `code` and report a violation as
/// [`InsertOutcome::Conflict`] rather than an error.
#[async_trait]
pub trait InviteStore: Send + Sync {
    /// Is there a record with `code` or `account_id` equal to `account_id` and `attempts > 0`?
    async fn find_claimed(&self, account_id: &str) -> Result<bool>;

    async fn insert_claim(&self, record: &InviteRecord) -> Result<InsertOutcome>;
}

/// One frame read from a streaming connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportFrame {
    Text(String),
    /// The connection ended: close frame, end of stream, or a reset without
    /// closing handshake.
    Closed,
}

/// An open streaming connection.
#[async_trait]
pub trait FrameSource: Send {
    /// `Err` is reserved for failures that are not a plain disconnect.
    async fn next_frame(&mut self) -> Result<TransportFrame>;
}

/// Opens streaming connections for a channel.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn connect(&self, channel: StreamChannel) -> Result<Box<dyn FrameSource>>;
}
