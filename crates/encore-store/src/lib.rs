use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encore_core::{
    AuditEvent, AuditLog, BattleMatch, Clock, CommitmentStore, Invitation, InvitationBackends,
    InvitationQuery, InvitationStatus, InvitationStore, InviteKind, ProfileDirectory, ProfileLite,
    SystemClock,
};
use tokio::sync::RwLock;
use uuid::Uuid;

mod clock;

pub use clock::ManualClock;

#[derive(Default)]
pub struct InMemoryInvitationStore {
    rows: RwLock<HashMap<Uuid, Invitation>>,
}

/// Mirrors the partial unique index on `invitations (session_ref, recipient_uid)`.
fn holds_same_slot(existing: &Invitation, candidate: &Invitation) -> bool {
    candidate.kind == InviteKind::LiveCollab
        && existing.kind == InviteKind::LiveCollab
        && matches!(
            existing.status,
            InvitationStatus::Pending | InvitationStatus::Accepted
        )
        && existing.recipient_uid == candidate.recipient_uid
        && existing.session_ref() == candidate.session_ref()
}

#[async_trait]
impl InvitationStore for InMemoryInvitationStore {
    async fn insert(&self, invitation: &Invitation) -> anyhow::Result<bool> {
        // Held across the slot check and the write.
        let mut rows = self.rows.write().await;
        if rows.contains_key(&invitation.id) {
            anyhow::bail!("invitation {} already exists", invitation.id);
        }
        if rows.values().any(|existing| holds_same_slot(existing, invitation)) {
            return Ok(false);
        }
        rows.insert(invitation.id, invitation.clone());
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Invitation>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&id).cloned())
    }

    async fn list(&self, query: &InvitationQuery) -> anyhow::Result<Vec<Invitation>> {
        let rows = self.rows.read().await;
        let mut matched: Vec<Invitation> = rows
            .values()
            .filter(|invitation| query.matches(invitation))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: InvitationStatus,
        to: InvitationStatus,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        // Held across check and write.
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(invitation) if invitation.status == from => {
                invitation.status = to;
                invitation.responded_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryCommitmentStore {
    matches: RwLock<HashMap<Uuid, BattleMatch>>,
}

impl InMemoryCommitmentStore {
    pub async fn len(&self) -> usize {
        self.matches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.matches.read().await.is_empty()
    }
}

#[async_trait]
impl CommitmentStore for InMemoryCommitmentStore {
    async fn insert_match(&self, battle_match: &BattleMatch) -> anyhow::Result<()> {
        let mut matches = self.matches.write().await;
        if matches.contains_key(&battle_match.invite_id) {
            anyhow::bail!("match already exists for invitation {}", battle_match.invite_id);
        }
        matches.insert(battle_match.invite_id, battle_match.clone());
        Ok(())
    }

    async fn match_for_invite(&self, invite_id: Uuid) -> anyhow::Result<Option<BattleMatch>> {
        let matches = self.matches.read().await;
        Ok(matches.get(&invite_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditLog {
    pub async fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, event: &AuditEvent) -> anyhow::Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn trail(&self, invite_id: Uuid) -> anyhow::Result<Vec<AuditEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| event.invite_id == invite_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryProfileDirectory {
    profiles: RwLock<HashMap<String, ProfileLite>>,
}

impl InMemoryProfileDirectory {
    pub fn with_artists<'a>(artists: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let profiles = artists
            .into_iter()
            .map(|(uid, display_name)| {
                (
                    uid.to_string(),
                    ProfileLite {
                        uid: uid.to_string(),
                        display_name: display_name.to_string(),
                        avatar_url: None,
                    },
                )
            })
            .collect();
        Self {
            profiles: RwLock::new(profiles),
        }
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryProfileDirectory {
    async fn exists(&self, uid: &str) -> anyhow::Result<bool> {
        Ok(self.profiles.read().await.contains_key(uid))
    }

    async fn resolve_many(&self, uids: &[String]) -> anyhow::Result<HashMap<String, ProfileLite>> {
        let profiles = self.profiles.read().await;
        Ok(uids
            .iter()
            .filter_map(|uid| profiles.get(uid).map(|profile| (uid.clone(), profile.clone())))
            .collect())
    }
}

/// Concrete handles to every in-memory collaborator, so tests can inspect
/// the stores behind a service.
#[derive(Clone)]
pub struct InMemoryBackends {
    pub invitations: Arc<InMemoryInvitationStore>,
    pub commitments: Arc<InMemoryCommitmentStore>,
    pub audit: Arc<InMemoryAuditLog>,
    pub profiles: Arc<InMemoryProfileDirectory>,
    pub clock: Arc<dyn Clock>,
}

impl InMemoryBackends {
    pub fn new(profiles: InMemoryProfileDirectory) -> Self {
        Self {
            invitations: Arc::default(),
            commitments: Arc::default(),
            audit: Arc::default(),
            profiles: Arc::new(profiles),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn backends(&self) -> InvitationBackends {
        InvitationBackends {
            invitations: self.invitations.clone(),
            commitments: self.commitments.clone(),
            audit: self.audit.clone(),
            profiles: self.profiles.clone(),
            clock: self.clock.clone(),
        }
    }
}
