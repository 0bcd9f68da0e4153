#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encore_core::{
    AuditEvent, AuditLog, BattleContext, BattleMatch, CommitmentStore, CreateInvitation,
    Invitation, InvitationConfig, InvitationQuery, InvitationService, InvitationStatus,
    InvitationStore, InviteContext, LiveCollabContext, ProfileDirectory, ProfileLite,
};
use encore_store::{
    InMemoryBackends, InMemoryCommitmentStore, InMemoryInvitationStore, InMemoryProfileDirectory,
};
use uuid::Uuid;

pub const AMARA: &str = "amara";
pub const BONGANI: &str = "bongani";
pub const CHIDI: &str = "chidi";

pub fn directory() -> InMemoryProfileDirectory {
    InMemoryProfileDirectory::with_artists([
        (AMARA, "Amara K"),
        (BONGANI, "DJ Bongani"),
        (CHIDI, "Chidi Waves"),
    ])
}

pub fn harness() -> (InMemoryBackends, Arc<InvitationService>) {
    let stores = InMemoryBackends::new(directory());
    let service = InvitationService::new(stores.backends(), InvitationConfig::default());
    (stores, Arc::new(service))
}

pub fn battle_request(initiator: &str, recipient: &str, title: &str, category: &str) -> CreateInvitation {
    CreateInvitation {
        initiator_uid: initiator.to_string(),
        recipient_uid: recipient.to_string(),
        context: InviteContext::Battle(BattleContext {
            title: title.to_string(),
            category: category.to_string(),
            message: None,
            proposed_start: None,
            duration_minutes: None,
            stake: 0,
        }),
    }
}

pub fn live_request(initiator: &str, recipient: &str, session_ref: &str) -> CreateInvitation {
    CreateInvitation {
        initiator_uid: initiator.to_string(),
        recipient_uid: recipient.to_string(),
        context: InviteContext::LiveCollab(LiveCollabContext {
            session_ref: session_ref.to_string(),
            initiator_display_name: "Amara K".to_string(),
        }),
    }
}

/// Commitment store that can be told to refuse writes.
#[derive(Default)]
pub struct FlakyCommitmentStore {
    pub inner: InMemoryCommitmentStore,
    pub failing: AtomicBool,
}

impl FlakyCommitmentStore {
    pub fn failing() -> Self {
        Self {
            inner: InMemoryCommitmentStore::default(),
            failing: AtomicBool::new(true),
        }
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommitmentStore for FlakyCommitmentStore {
    async fn insert_match(&self, battle_match: &BattleMatch) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("battle_matches unavailable");
        }
        self.inner.insert_match(battle_match).await
    }

    async fn match_for_invite(&self, invite_id: Uuid) -> anyhow::Result<Option<BattleMatch>> {
        self.inner.match_for_invite(invite_id).await
    }
}

/// Commitment store where another caller always stores a match for the
/// invitation just before this insert lands.
#[derive(Default)]
pub struct PreemptedCommitmentStore {
    pub inner: InMemoryCommitmentStore,
}

#[async_trait]
impl CommitmentStore for PreemptedCommitmentStore {
    async fn insert_match(&self, battle_match: &BattleMatch) -> anyhow::Result<()> {
        let earlier = BattleMatch {
            id: Uuid::new_v4(),
            ..battle_match.clone()
        };
        self.inner.insert_match(&earlier).await?;
        self.inner.insert_match(battle_match).await
    }

    async fn match_for_invite(&self, invite_id: Uuid) -> anyhow::Result<Option<BattleMatch>> {
        self.inner.match_for_invite(invite_id).await
    }
}

/// Yields to the scheduler around every read and write, the way a network
/// round trip to the database would.
#[derive(Default)]
pub struct YieldingInvitationStore {
    pub inner: InMemoryInvitationStore,
}

#[async_trait]
impl InvitationStore for YieldingInvitationStore {
    async fn insert(&self, invitation: &Invitation) -> anyhow::Result<bool> {
        tokio::task::yield_now().await;
        self.inner.insert(invitation).await
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Invitation>> {
        self.inner.get(id).await
    }

    async fn list(&self, query: &InvitationQuery) -> anyhow::Result<Vec<Invitation>> {
        let rows = self.inner.list(query).await;
        tokio::task::yield_now().await;
        rows
    }

    async fn transition(
        &self,
        id: Uuid,
        from: InvitationStatus,
        to: InvitationStatus,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        tokio::task::yield_now().await;
        self.inner.transition(id, from, to, at).await
    }
}

pub struct BrokenAuditLog;

#[async_trait]
impl AuditLog for BrokenAuditLog {
    async fn append(&self, _event: &AuditEvent) -> anyhow::Result<()> {
        anyhow::bail!("audit table locked")
    }

    async fn trail(&self, _invite_id: Uuid) -> anyhow::Result<Vec<AuditEvent>> {
        anyhow::bail!("audit table locked")
    }
}

/// Knows every artist exists but cannot resolve display data.
pub struct UnresolvableDirectory;

#[async_trait]
impl ProfileDirectory for UnresolvableDirectory {
    async fn exists(&self, _uid: &str) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn resolve_many(&self, _uids: &[String]) -> anyhow::Result<HashMap<String, ProfileLite>> {
        anyhow::bail!("profile service timed out")
    }
}
