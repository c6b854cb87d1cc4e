//! Mention → invitation → reply.

use std::sync::Arc;

use crate::{
    domain::{Account, Notification, NotificationType, StreamEvent},
    ledger::{InvitationLedger, InvitationResult},
    mention::{self, MentionOutcome, ACCOUNT_SUFFIX, MAX_ACCOUNT_NAME_LEN},
    ports::ReplyPort,
};

/// The reply chosen for a notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    RemoteAccount,
    AlreadyInvited { account_id: String },
    Invited { account_id: String },
    Failed { account_id: String },
    TooLong { name: String },
    Unparseable,
    NoMention,
}

impl Reply {
    pub fn render(&self, to: &Account) -> String {
        let reply_to = format!("@{}", to.username);
        match self {
            Reply::RemoteAccount => {
                format!("@{} Sorry, only NEAR accounts can invite others.", to.acct)
            }
            Reply::AlreadyInvited { account_id } => {
                format!("{reply_to} No worries! {account_id} is already invited")
            }
            Reply::Invited { account_id } => format!("{reply_to} You got it! Invited {account_id}"),
            Reply::Failed { account_id } => {
                format!("{reply_to} Sorry! For some reason failed to invite {account_id}")
            }
            Reply::TooLong { name } => format!(
                "{reply_to} Sorry! The account ID {name}{ACCOUNT_SUFFIX} is too long, it can be at most {} characters long.",
                MAX_ACCOUNT_NAME_LEN + ACCOUNT_SUFFIX.len()
            ),
            Reply::Unparseable => format!(
                "{reply_to} Bummer! I don't understand, please provide valid account ID.\n\
                 Note, there are some limitations: an account ID has to end with \"{ACCOUNT_SUFFIX}\" \
                 and can't include sub-accounts or hyphens."
            ),
            Reply::NoMention => format!(
                "{reply_to} Ser, please only mention me to invite someone to the best social platform."
            ),
        }
    }
}

pub struct InvitationWorkflow {
    bot_handle: String,
    ledger: InvitationLedger,
    replies: Arc<dyn ReplyPort>,
}

impl InvitationWorkflow {
    pub fn new(
        bot_handle: impl Into<String>,
        ledger: InvitationLedger,
        replies: Arc<dyn ReplyPort>,
    ) -> Self {
        Self {
            bot_handle: bot_handle.into(),
            ledger,
            replies,
        }
    }

    /// Route one stream event. Events are expected one at a time, in arrival order.
    pub async fn on_event(&self, event: &StreamEvent) {
        match event {
            StreamEvent::NotificationReceived { notification } => {
                self.handle(notification).await;
            }
            StreamEvent::ConnectionReady { channel } => {
                tracing::info!(%channel, "streaming ready");
            }
            StreamEvent::StatusDeleted { status_id } => {
                tracing::debug!(status_id = %status_id, "status deleted");
            }
            StreamEvent::StatusUpdated { status } => {
                tracing::debug!(status_id = %status.id, account = %status.account.acct, "status posted");
            }
        }
    }

    /// Handle a notification; returns the reply that was sent (or attempted).
    pub async fn handle(&self, notification: &Notification) -> Option<Reply> {
        tracing::info!(
            notification_id = %notification.id,
            kind = ?notification.kind,
            account = %notification.account.acct,
            "notification received"
        );

        if notification.kind != NotificationType::Mention {
            return None;
        }
        let status = notification.status.as_ref()?;
        let author = &status.account;

        let reply = if !author.is_local() {
            Reply::RemoteAccount
        } else {
            self.decide(&status.content).await
        };

        tracing::info!(
            notification_id = %notification.id,
            account = %author.acct,
            outcome = ?reply,
            "replying"
        );
        let text = reply.render(author);
        if let Err(e) = self.replies.reply(status, &text).await {
            tracing::warn!(status_id = %status.id, error = %e, "reply failed");
        }
        Some(reply)
    }

    async fn decide(&self, content: &str) -> Reply {
        let candidate = mention::parse(content, &self.bot_handle);
        match (candidate.outcome, candidate.normalized_account_id) {
            (MentionOutcome::Valid, Some(account_id)) => {
                match self.ledger.attempt_invite(&account_id).await {
                    InvitationResult::AlreadyInvited => Reply::AlreadyInvited { account_id },
                    InvitationResult::Invited => Reply::Invited { account_id },
                    InvitationResult::Failed => Reply::Failed { account_id },
                }
            }
            (MentionOutcome::TooLong, _) => Reply::TooLong {
                name: candidate.raw_fragment,
            },
            (MentionOutcome::NoMention, _) => Reply::NoMention,
            (MentionOutcome::Valid | MentionOutcome::Unparseable, _) => Reply::Unparseable,
        }
    }
}
