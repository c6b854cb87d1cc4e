//! Invitation ledger: at most one successful invitation per account id.

use std::sync::Arc;

use crate::{
    ports::{InsertOutcome, InviteStore},
    Result,
};

/// A row of the `invites` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InviteRecord {
    pub code: String,
    pub attempts: i32,
    pub account_id: Option<String>,
    pub creator: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvitationResult {
    AlreadyInvited,
    Invited,
    Failed,
}

pub struct InvitationLedger {
    store: Arc<dyn InviteStore>,
    creator: String,
}

impl InvitationLedger {
    pub fn new(store: Arc<dyn InviteStore>, creator: impl Into<String>) -> Self {
        Self {
            store,
            creator: creator.into(),
        }
    }

    /// Claim `account_id` as an invitation code.
    ///
    /// Check-then-insert is not atomic; a concurrent claim that slips between the
    /// two steps surfaces as a uniqueness conflict and is reported as
    /// `AlreadyInvited`. Storage failures are logged and reported as `Failed`.
    pub async fn attempt_invite(&self, account_id: &str) -> InvitationResult {
        match self.try_invite(account_id).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(account_id, error = %e, "invite storage failed");
                InvitationResult::Failed
            }
        }
    }

    async fn try_invite(&self, account_id: &str) -> Result<InvitationResult> {
        if self.store.find_claimed(account_id).await? {
            tracing::debug!(account_id, "invite already claimed");
            return Ok(InvitationResult::AlreadyInvited);
        }

        let record = InviteRecord {
            code: account_id.to_string(),
            attempts: 1,
            account_id: Some(account_id.to_string()),
            creator: self.creator.clone(),
        };

        let result = match self.store.insert_claim(&record).await? {
            InsertOutcome::Inserted(rows) if rows > 0 => InvitationResult::Invited,
            InsertOutcome::Inserted(_) => InvitationResult::Failed,
            InsertOutcome::Conflict => {
                tracing::info!(account_id, "lost race for invite code");
                InvitationResult::AlreadyInvited
            }
        };
        Ok(result)
    }
}

/// In-process store with the same uniqueness rule as the `invites` table.
#[cfg(test)]
pub(crate) mod memory {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::InviteRecord;
    use crate::{
        ports::{InsertOutcome, InviteStore},
        Result,
    };

    #[derive(Default)]
    pub(crate) struct MemoryInviteStore {
        records: Mutex<Vec<InviteRecord>>,
    }

    impl MemoryInviteStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_records(records: Vec<InviteRecord>) -> Self {
            Self {
                records: Mutex::new(records),
            }
        }

        pub(crate) async fn records(&self) -> Vec<InviteRecord> {
            self.records.lock().await.clone()
        }
    }

    #[async_trait]
    impl InviteStore for MemoryInviteStore {
        async fn find_claimed(&self, account_id: &str) -> Result<bool> {
            let records = self.records.lock().await;
            Ok(records.iter().any(|r| {
                r.attempts > 0 && (r.code == account_id || r.account_id.as_deref() == Some(account_id))
            }))
        }

        async fn insert_claim(&self, record: &InviteRecord) -> Result<InsertOutcome> {
            let mut records = self.records.lock().await;
            if records.iter().any(|r| r.code == record.code) {
                return Ok(InsertOutcome::Conflict);
            }
            records.push(record.clone());
            Ok(InsertOutcome::Inserted(1))
        }
    }
}
