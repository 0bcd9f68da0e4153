//! Postgres-backed collaborators for the invitation service.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encore_core::{
    AuditEvent, AuditLog, BattleMatch, CommitmentStore, Invitation, InvitationQuery,
    InvitationStatus, InvitationStore, ProfileDirectory, ProfileLite,
};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

const INVITATION_COLUMNS: &str = "id, kind, initiator_uid, recipient_uid, context, status, created_at, responded_at, expires_at";

#[derive(Clone)]
pub struct PgInvitationStore {
    pool: PgPool,
}

impl PgInvitationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn invitation_from_row(row: &PgRow) -> Result<Invitation> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let context: serde_json::Value = row.try_get("context")?;

    Ok(Invitation {
        id: row.try_get("id")?,
        kind: kind.parse()?,
        initiator_uid: row.try_get("initiator_uid")?,
        recipient_uid: row.try_get("recipient_uid")?,
        context: serde_json::from_value(context).context("malformed invitation context")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        responded_at: row.try_get("responded_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

#[async_trait]
impl InvitationStore for PgInvitationStore {
    async fn insert(&self, invitation: &Invitation) -> Result<bool> {
        // The conflict target is the partial unique index invitations_live_slot_idx.
        let inserted = sqlx::query(
            r#"
            INSERT INTO invitations (
                id, kind, initiator_uid, recipient_uid, session_ref, context, status,
                created_at, responded_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (session_ref, recipient_uid)
                WHERE kind = 'live_collab' AND status IN ('pending', 'accepted')
                DO NOTHING
            "#,
        )
        .bind(invitation.id)
        .bind(invitation.kind.as_str())
        .bind(&invitation.initiator_uid)
        .bind(&invitation.recipient_uid)
        .bind(invitation.session_ref())
        .bind(serde_json::to_value(&invitation.context)?)
        .bind(invitation.status.as_str())
        .bind(invitation.created_at)
        .bind(invitation.responded_at)
        .bind(invitation.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Invitation>> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn list(&self, query: &InvitationQuery) -> Result<Vec<Invitation>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE TRUE"
        ));

        if let Some(uid) = &query.recipient_uid {
            builder.push(" AND recipient_uid = ").push_bind(uid.clone());
        }
        if let Some(uid) = &query.initiator_uid {
            builder.push(" AND initiator_uid = ").push_bind(uid.clone());
        }
        if let Some(kind) = query.kind {
            builder.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(session_ref) = &query.session_ref {
            builder
                .push(" AND session_ref = ")
                .push_bind(session_ref.clone());
        }
        if !query.statuses.is_empty() {
            let statuses: Vec<String> = query
                .statuses
                .iter()
                .map(|status| status.as_str().to_string())
                .collect();
            builder.push(" AND status = ANY(").push_bind(statuses).push(")");
        }
        builder.push(" ORDER BY created_at DESC, id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(invitation_from_row).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: InvitationStatus,
        to: InvitationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE invitations SET status = $3, responded_at = $4 WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() == 1)
    }
}

#[derive(Clone)]
pub struct PgCommitmentStore {
    pool: PgPool,
}

impl PgCommitmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommitmentStore for PgCommitmentStore {
    async fn insert_match(&self, battle_match: &BattleMatch) -> Result<()> {
        // invite_id is UNIQUE, so a second match for the same invitation fails here.
        sqlx::query(
            r#"
            INSERT INTO battle_matches (
                id, invite_id, host_uid, guest_uid, title, category, stake,
                proposed_start, duration_minutes, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(battle_match.id)
        .bind(battle_match.invite_id)
        .bind(&battle_match.host_uid)
        .bind(&battle_match.guest_uid)
        .bind(&battle_match.title)
        .bind(&battle_match.category)
        .bind(battle_match.stake)
        .bind(battle_match.proposed_start)
        .bind(battle_match.duration_minutes)
        .bind(battle_match.status.as_str())
        .bind(battle_match.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn match_for_invite(&self, invite_id: Uuid) -> Result<Option<BattleMatch>> {
        let row = sqlx::query(
            r#"
            SELECT id, invite_id, host_uid, guest_uid, title, category, stake,
                   proposed_start, duration_minutes, status, created_at
            FROM battle_matches
            WHERE invite_id = $1
            "#,
        )
        .bind(invite_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        Ok(Some(BattleMatch {
            id: row.try_get("id")?,
            invite_id: row.try_get("invite_id")?,
            host_uid: row.try_get("host_uid")?,
            guest_uid: row.try_get("guest_uid")?,
            title: row.try_get("title")?,
            category: row.try_get("category")?,
            stake: row.try_get("stake")?,
            proposed_start: row.try_get("proposed_start")?,
            duration_minutes: row.try_get("duration_minutes")?,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invitation_audit_events (id, invite_id, actor_uid, action, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(event.invite_id)
        .bind(&event.actor_uid)
        .bind(event.action.as_str())
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn trail(&self, invite_id: Uuid) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, invite_id, actor_uid, action, metadata, created_at
            FROM invitation_audit_events
            WHERE invite_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(invite_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let action: String = row.try_get("action")?;
                Ok::<_, anyhow::Error>(AuditEvent {
                    id: row.try_get("id")?,
                    invite_id: row.try_get("invite_id")?,
                    actor_uid: row.try_get("actor_uid")?,
                    action: action.parse()?,
                    metadata: row.try_get("metadata")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct PgProfileDirectory {
    pool: PgPool,
}

impl PgProfileDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileDirectory for PgProfileDirectory {
    async fn exists(&self, uid: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM artist_profiles WHERE uid = $1)",
        )
        .bind(uid)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn resolve_many(&self, uids: &[String]) -> Result<HashMap<String, ProfileLite>> {
        let rows = sqlx::query(
            "SELECT uid, display_name, avatar_url FROM artist_profiles WHERE uid = ANY($1)",
        )
        .bind(uids)
        .fetch_all(&self.pool)
        .await?;

        let mut profiles = HashMap::with_capacity(rows.len());
        for row in rows {
            let profile = ProfileLite {
                uid: row.try_get("uid")?,
                display_name: row.try_get("display_name")?,
                avatar_url: row.try_get("avatar_url")?,
            };
            profiles.insert(profile.uid.clone(), profile);
        }
        Ok(profiles)
    }
}
