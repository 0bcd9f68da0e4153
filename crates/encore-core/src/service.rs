//! Invitation orchestration shared by battle and live collaboration invites.
//!
//! Every status change goes through [`InvitationStore::transition`], a
//! compare-and-set on the `status` column. Whichever caller's transition
//! matches the row decides the invitation; everyone else gets
//! [`InviteError::AlreadyResponded`].

use std::{collections::BTreeSet, sync::Arc};

use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEvent},
    error::InviteError,
    models::{
        BattleMatch, Commitment, CreateInvitation, Invitation, InvitationListing,
        InvitationStatus, InviteKind, RespondAction, ResponseOutcome,
    },
    policy::{BattlePolicy, InvitationConfig, InviteKindPolicy, LiveCollabPolicy},
    storage::{AuditLog, Clock, CommitmentStore, InvitationQuery, InvitationStore, ProfileDirectory},
};

/// Actor recorded on audit events for time-driven expiry.
pub const SYSTEM_ACTOR: &str = "system";

/// External collaborators the service reads from and writes to.
#[derive(Clone)]
pub struct InvitationBackends {
    pub invitations: Arc<dyn InvitationStore>,
    pub commitments: Arc<dyn CommitmentStore>,
    pub audit: Arc<dyn AuditLog>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub clock: Arc<dyn Clock>,
}

pub struct InvitationService {
    backends: InvitationBackends,
    battle: BattlePolicy,
    live_collab: LiveCollabPolicy,
}

impl InvitationService {
    pub fn new(backends: InvitationBackends, config: InvitationConfig) -> Self {
        Self {
            battle: BattlePolicy::new(&config),
            live_collab: LiveCollabPolicy::new(&config),
            backends,
        }
    }

    fn policy(&self, kind: InviteKind) -> &dyn InviteKindPolicy {
        match kind {
            InviteKind::Battle => &self.battle,
            InviteKind::LiveCollab => &self.live_collab,
        }
    }

    /// Validates, deduplicates and persists a new pending invitation.
    /// The new row is written only once every check passes.
    pub async fn create(&self, request: CreateInvitation) -> Result<Uuid, InviteError> {
        let initiator_uid = request.initiator_uid.trim();
        let recipient_uid = request.recipient_uid.trim();
        if initiator_uid.is_empty() {
            return Err(InviteError::invalid("initiator_uid is required"));
        }
        if recipient_uid.is_empty() {
            return Err(InviteError::invalid("recipient_uid is required"));
        }
        if initiator_uid == recipient_uid {
            return Err(InviteError::invalid("artists cannot invite themselves"));
        }

        let kind = request.context.kind();
        let policy = self.policy(kind);
        let context = policy.validate(request.context)?;
        let now = self.backends.clock.now();

        if let Some(session_ref) = policy.dedup_session(&context) {
            let query = InvitationQuery {
                recipient_uid: Some(recipient_uid.to_string()),
                kind: Some(kind),
                session_ref: Some(session_ref.to_string()),
                statuses: vec![InvitationStatus::Pending, InvitationStatus::Accepted],
                ..InvitationQuery::default()
            };
            for existing in self.backends.invitations.list(&query).await? {
                if existing.status == InvitationStatus::Pending && existing.is_expired(now) {
                    // Stale rows give up the slot; the guarded insert below decides.
                    self.expire(&existing).await?;
                } else {
                    return Err(InviteError::Duplicate);
                }
            }
        }

        if policy.requires_known_recipient() && !self.backends.profiles.exists(recipient_uid).await? {
            return Err(InviteError::NotFound("recipient".to_string()));
        }

        let invitation = Invitation {
            id: Uuid::new_v4(),
            kind,
            initiator_uid: initiator_uid.to_string(),
            recipient_uid: recipient_uid.to_string(),
            context,
            status: InvitationStatus::Pending,
            created_at: now,
            responded_at: None,
            expires_at: policy.expires_at(now),
        };
        if !self.backends.invitations.insert(&invitation).await? {
            info!(%recipient_uid, "live invitation slot taken by a concurrent create");
            return Err(InviteError::Duplicate);
        }

        info!(
            invitation_id = %invitation.id,
            kind = %kind,
            "invitation sent from {} to {}",
            invitation.initiator_uid,
            invitation.recipient_uid
        );

        self.record(
            &invitation,
            &invitation.initiator_uid,
            AuditAction::Sent,
            json!({ "recipient_uid": invitation.recipient_uid, "kind": kind }),
        )
        .await;

        Ok(invitation.id)
    }

    /// Applies the recipient's decision. At most one concurrent caller can
    /// move a given invitation out of `pending`.
    pub async fn respond(
        &self,
        actor_uid: &str,
        invitation_id: Uuid,
        action: RespondAction,
    ) -> Result<ResponseOutcome, InviteError> {
        let invitation = self.load(invitation_id).await?;

        if invitation.recipient_uid != actor_uid {
            return Err(InviteError::NotAllowed);
        }
        if invitation.status.is_terminal() {
            return Err(InviteError::invalid(format!(
                "invitation is already {}",
                invitation.status
            )));
        }

        let now = self.backends.clock.now();
        // Nothing is written here; expiry is recorded by `expire_stale` or a later create.
        if invitation.is_expired(now) {
            return Err(InviteError::invalid("invitation has expired"));
        }

        let status = action.target_status();
        let matched = self
            .backends
            .invitations
            .transition(invitation_id, InvitationStatus::Pending, status, now)
            .await?;
        if !matched {
            info!(%invitation_id, "response lost the race, invitation already decided");
            return Err(InviteError::AlreadyResponded);
        }

        let invitation = Invitation {
            status,
            responded_at: Some(now),
            ..invitation
        };

        if action == RespondAction::Decline {
            info!(%invitation_id, "invitation declined by {actor_uid}");
            self.record(
                &invitation,
                actor_uid,
                AuditAction::Declined,
                json!({ "counterpart_uid": invitation.initiator_uid }),
            )
            .await;

            return Ok(ResponseOutcome {
                invitation_id,
                kind: invitation.kind,
                status,
                responded_at: now,
                commitment: None,
            });
        }

        let commitment = match self.policy(invitation.kind).on_accept(&invitation, now)? {
            Commitment::Battle(battle_match) => {
                Commitment::Battle(self.persist_match(battle_match).await?)
            }
            live => live,
        };
        let metadata = match &commitment {
            Commitment::Battle(battle_match) => {
                json!({
                    "counterpart_uid": invitation.initiator_uid,
                    "match_id": battle_match.id,
                })
            }
            Commitment::LiveSession { session_ref } => json!({
                "counterpart_uid": invitation.initiator_uid,
                "session_ref": session_ref,
            }),
        };

        info!(%invitation_id, kind = %invitation.kind, "invitation accepted by {actor_uid}");
        self.record(&invitation, actor_uid, AuditAction::Accepted, metadata)
            .await;

        Ok(ResponseOutcome {
            invitation_id,
            kind: invitation.kind,
            status,
            responded_at: now,
            commitment: Some(commitment),
        })
    }

    /// Withdraws a pending invitation. Only the initiator may cancel.
    pub async fn cancel(&self, actor_uid: &str, invitation_id: Uuid) -> Result<(), InviteError> {
        let invitation = self.load(invitation_id).await?;

        if invitation.initiator_uid != actor_uid {
            return Err(InviteError::NotAllowed);
        }
        if invitation.status.is_terminal() {
            return Err(InviteError::invalid(format!(
                "invitation is already {}",
                invitation.status
            )));
        }

        let now = self.backends.clock.now();
        let matched = self
            .backends
            .invitations
            .transition(
                invitation_id,
                InvitationStatus::Pending,
                InvitationStatus::Cancelled,
                now,
            )
            .await?;
        if !matched {
            return Err(InviteError::AlreadyResponded);
        }

        info!(%invitation_id, "invitation cancelled by {actor_uid}");
        self.record(
            &invitation,
            actor_uid,
            AuditAction::Cancelled,
            json!({ "counterpart_uid": invitation.recipient_uid }),
        )
        .await;

        Ok(())
    }

    /// Returns the invitation to either of its two parties.
    pub async fn get(&self, actor_uid: &str, invitation_id: Uuid) -> Result<Invitation, InviteError> {
        let invitation = self.load(invitation_id).await?;
        if invitation.initiator_uid != actor_uid && invitation.recipient_uid != actor_uid {
            return Err(InviteError::NotAllowed);
        }
        Ok(invitation)
    }

    pub async fn list_for_artist(&self, uid: &str) -> Result<InvitationListing, InviteError> {
        let received = self
            .backends
            .invitations
            .list(&InvitationQuery::received_by(uid))
            .await?;
        let sent = self
            .backends
            .invitations
            .list(&InvitationQuery::sent_by(uid))
            .await?;

        let counterparts: Vec<String> = received
            .iter()
            .chain(sent.iter())
            .map(|invitation| invitation.counterpart_of(uid).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let profiles = if counterparts.is_empty() {
            Default::default()
        } else {
            match self.backends.profiles.resolve_many(&counterparts).await {
                Ok(profiles) => profiles,
                Err(err) => {
                    warn!("profile enrichment failed for {uid}: {err:#}");
                    Default::default()
                }
            }
        };

        Ok(InvitationListing {
            received,
            sent,
            profiles,
        })
    }

    pub async fn audit_trail(&self, invitation_id: Uuid) -> Result<Vec<AuditEvent>, InviteError> {
        Ok(self.backends.audit.trail(invitation_id).await?)
    }

    /// Moves the actor's pending invitations that are past `expires_at` to
    /// `expired`. Returns the ids this call expired.
    pub async fn expire_stale(&self, actor_uid: &str) -> Result<Vec<Uuid>, InviteError> {
        let now = self.backends.clock.now();
        let mut expired = Vec::new();
        for query in [InvitationQuery::received_by(actor_uid), InvitationQuery::sent_by(actor_uid)] {
            let query = InvitationQuery {
                statuses: vec![InvitationStatus::Pending],
                ..query
            };
            for invitation in self.backends.invitations.list(&query).await? {
                if invitation.is_expired(now) && self.expire(&invitation).await? {
                    expired.push(invitation.id);
                }
            }
        }
        Ok(expired)
    }

    /// Accepted battle invitations involving the actor that never got their match row.
    pub async fn list_orphaned_acceptances(
        &self,
        actor_uid: &str,
    ) -> Result<Vec<Invitation>, InviteError> {
        let mut accepted = Vec::new();
        for query in [InvitationQuery::received_by(actor_uid), InvitationQuery::sent_by(actor_uid)] {
            let query = InvitationQuery {
                kind: Some(InviteKind::Battle),
                statuses: vec![InvitationStatus::Accepted],
                ..query
            };
            accepted.extend(self.backends.invitations.list(&query).await?);
        }
        accepted.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let mut orphaned = Vec::new();
        for invitation in accepted {
            if self
                .backends
                .commitments
                .match_for_invite(invitation.id)
                .await?
                .is_none()
            {
                orphaned.push(invitation);
            }
        }
        Ok(orphaned)
    }

    /// Creates the match for an accepted battle invitation if it is missing.
    /// Either party may call it, repeatedly.
    pub async fn reconcile_commitment(
        &self,
        actor_uid: &str,
        invitation_id: Uuid,
    ) -> Result<BattleMatch, InviteError> {
        let invitation = self.get(actor_uid, invitation_id).await?;
        if invitation.kind != InviteKind::Battle {
            return Err(InviteError::invalid("only battle invitations carry a commitment row"));
        }
        if invitation.status != InvitationStatus::Accepted {
            return Err(InviteError::invalid(format!(
                "invitation is {}, not accepted",
                invitation.status
            )));
        }

        if let Some(existing) = self.backends.commitments.match_for_invite(invitation_id).await? {
            return Ok(existing);
        }

        let now = self.backends.clock.now();
        let Commitment::Battle(candidate) = self.battle.on_accept(&invitation, now)? else {
            return Err(InviteError::invalid("battle acceptance produced no match"));
        };
        let candidate_id = candidate.id;

        let battle_match = self.persist_match(candidate).await?;
        if battle_match.id != candidate_id {
            return Ok(battle_match);
        }

        info!(%invitation_id, match_id = %battle_match.id, "reconciled missing battle match");
        self.record(
            &invitation,
            actor_uid,
            AuditAction::Accepted,
            json!({
                "counterpart_uid": invitation.initiator_uid,
                "match_id": battle_match.id,
                "reconciled": true,
            }),
        )
        .await;

        Ok(battle_match)
    }

    async fn load(&self, invitation_id: Uuid) -> Result<Invitation, InviteError> {
        self.backends
            .invitations
            .get(invitation_id)
            .await?
            .ok_or_else(|| InviteError::NotFound("invitation".to_string()))
    }

    /// Guarded `pending -> expired`. Returns false if another caller decided
    /// the invitation first.
    async fn expire(&self, invitation: &Invitation) -> Result<bool, InviteError> {
        let matched = self
            .backends
            .invitations
            .transition(
                invitation.id,
                InvitationStatus::Pending,
                InvitationStatus::Expired,
                self.backends.clock.now(),
            )
            .await?;
        if !matched {
            return Ok(false);
        }

        info!(invitation_id = %invitation.id, "invitation expired before a response");
        self.record(
            invitation,
            SYSTEM_ACTOR,
            AuditAction::Expired,
            json!({ "expires_at": invitation.expires_at }),
        )
        .await;
        Ok(true)
    }

    /// Stores the match, or returns the one a concurrent reconcile already
    /// stored for the same invitation.
    async fn persist_match(&self, battle_match: BattleMatch) -> Result<BattleMatch, InviteError> {
        let invitation_id = battle_match.invite_id;
        let Err(err) = self.backends.commitments.insert_match(&battle_match).await else {
            return Ok(battle_match);
        };

        match self.backends.commitments.match_for_invite(invitation_id).await {
            Ok(Some(existing)) => {
                info!(%invitation_id, match_id = %existing.id, "match already stored for invitation");
                return Ok(existing);
            }
            Ok(None) => {}
            Err(lookup_err) => {
                warn!(%invitation_id, "match lookup after failed insert failed: {lookup_err:#}");
            }
        }

        error!(%invitation_id, "invitation accepted but match creation failed: {err:#}");
        Err(InviteError::CommitmentFailed {
            invitation_id,
            message: format!("{err:#}"),
        })
    }

    async fn record(
        &self,
        invitation: &Invitation,
        actor_uid: &str,
        action: AuditAction,
        metadata: serde_json::Value,
    ) {
        let event = AuditEvent::new(
            invitation.id,
            actor_uid,
            action,
            metadata,
            self.backends.clock.now(),
        );
        if let Err(err) = self.backends.audit.append(&event).await {
            warn!(invitation_id = %invitation.id, %action, "audit append failed: {err:#}");
        }
    }
}
