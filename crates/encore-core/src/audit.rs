use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Sent,
    Accepted,
    Declined,
    Cancelled,
    Expired,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Sent => "sent",
            AuditAction::Accepted => "accepted",
            AuditAction::Declined => "declined",
            AuditAction::Cancelled => "cancelled",
            AuditAction::Expired => "expired",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "sent" => Ok(AuditAction::Sent),
            "accepted" => Ok(AuditAction::Accepted),
            "declined" => Ok(AuditAction::Declined),
            "cancelled" => Ok(AuditAction::Cancelled),
            "expired" => Ok(AuditAction::Expired),
            other => anyhow::bail!("unknown audit action {other}"),
        }
    }
}

/// Append-only trace entry. Never consulted for correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub invite_id: Uuid,
    pub actor_uid: String,
    pub action: AuditAction,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        invite_id: Uuid,
        actor_uid: &str,
        action: AuditAction,
        metadata: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            invite_id,
            actor_uid: actor_uid.to_string(),
            action,
            metadata,
            created_at,
        }
    }
}
