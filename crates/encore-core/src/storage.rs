use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    audit::AuditEvent,
    models::{BattleMatch, Invitation, InvitationStatus, InviteKind, ProfileLite},
};

/// Predicate for filtered invitation reads. Unset fields match everything;
/// an empty `statuses` list matches every status.
#[derive(Debug, Clone, Default)]
pub struct InvitationQuery {
    pub recipient_uid: Option<String>,
    pub initiator_uid: Option<String>,
    pub kind: Option<InviteKind>,
    pub session_ref: Option<String>,
    pub statuses: Vec<InvitationStatus>,
}

impl InvitationQuery {
    pub fn received_by(uid: &str) -> Self {
        Self {
            recipient_uid: Some(uid.to_string()),
            ..Self::default()
        }
    }

    pub fn sent_by(uid: &str) -> Self {
        Self {
            initiator_uid: Some(uid.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, invitation: &Invitation) -> bool {
        self.recipient_uid
            .as_deref()
            .is_none_or(|uid| invitation.recipient_uid == uid)
            && self
                .initiator_uid
                .as_deref()
                .is_none_or(|uid| invitation.initiator_uid == uid)
            && self.kind.is_none_or(|kind| invitation.kind == kind)
            && self
                .session_ref
                .as_deref()
                .is_none_or(|session_ref| invitation.session_ref() == Some(session_ref))
            && (self.statuses.is_empty() || self.statuses.contains(&invitation.status))
    }
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    /// Inserts unless another `pending` or `accepted` live collab invitation
    /// already holds the same `(session_ref, recipient_uid)` slot. Returns
    /// whether the row was written. Check and write must be atomic.
    async fn insert(&self, invitation: &Invitation) -> anyhow::Result<bool>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Invitation>>;
    /// Newest first.
    async fn list(&self, query: &InvitationQuery) -> anyhow::Result<Vec<Invitation>>;
    /// Sets `status = to` and `responded_at = at` only while the stored status
    /// still equals `from`. Returns whether a row matched. Check and write
    /// must be a single atomic operation.
    async fn transition(
        &self,
        id: Uuid,
        from: InvitationStatus,
        to: InvitationStatus,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait CommitmentStore: Send + Sync {
    /// Fails if a match already exists for `battle_match.invite_id`.
    async fn insert_match(&self, battle_match: &BattleMatch) -> anyhow::Result<()>;
    async fn match_for_invite(&self, invite_id: Uuid) -> anyhow::Result<Option<BattleMatch>>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> anyhow::Result<()>;
    async fn trail(&self, invite_id: Uuid) -> anyhow::Result<Vec<AuditEvent>>;
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn exists(&self, uid: &str) -> anyhow::Result<bool>;
    async fn resolve_many(&self, uids: &[String]) -> anyhow::Result<HashMap<String, ProfileLite>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
