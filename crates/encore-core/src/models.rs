use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InviteKind {
    Battle,
    LiveCollab,
}

impl InviteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InviteKind::Battle => "battle",
            InviteKind::LiveCollab => "live_collab",
        }
    }
}

impl fmt::Display for InviteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InviteKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "battle" => Ok(InviteKind::Battle),
            "live_collab" => Ok(InviteKind::LiveCollab),
            other => anyhow::bail!("unknown invitation kind {other}"),
        }
    }
}

/// `Pending` is the only state an invitation can leave.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
            InvitationStatus::Cancelled => "cancelled",
            InvitationStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != InvitationStatus::Pending
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "declined" => Ok(InvitationStatus::Declined),
            "cancelled" => Ok(InvitationStatus::Cancelled),
            "expired" => Ok(InvitationStatus::Expired),
            other => anyhow::bail!("unknown invitation status {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BattleContext {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub proposed_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub stake: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiveCollabContext {
    pub session_ref: String,
    #[serde(default)]
    pub initiator_display_name: String,
}

/// Kind-specific payload. The `kind` tag doubles as the invitation kind on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InviteContext {
    Battle(BattleContext),
    LiveCollab(LiveCollabContext),
}

impl InviteContext {
    pub fn kind(&self) -> InviteKind {
        match self {
            InviteContext::Battle(_) => InviteKind::Battle,
            InviteContext::LiveCollab(_) => InviteKind::LiveCollab,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invitation {
    pub id: Uuid,
    pub kind: InviteKind,
    pub initiator_uid: String,
    pub recipient_uid: String,
    pub context: InviteContext,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn session_ref(&self) -> Option<&str> {
        match &self.context {
            InviteContext::LiveCollab(live) => Some(live.session_ref.as_str()),
            InviteContext::Battle(_) => None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// The other party from `uid`'s point of view.
    pub fn counterpart_of(&self, uid: &str) -> &str {
        if self.initiator_uid == uid {
            &self.recipient_uid
        } else {
            &self.initiator_uid
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
        }
    }
}

impl FromStr for MatchStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "scheduled" => Ok(MatchStatus::Scheduled),
            other => anyhow::bail!("unknown match status {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BattleMatch {
    pub id: Uuid,
    pub invite_id: Uuid,
    pub host_uid: String,
    pub guest_uid: String,
    pub title: String,
    pub category: String,
    pub stake: i64,
    pub proposed_start: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

/// What acceptance produces for the recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Commitment {
    Battle(BattleMatch),
    LiveSession { session_ref: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RespondAction {
    Accept,
    Decline,
}

impl RespondAction {
    pub fn target_status(self) -> InvitationStatus {
        match self {
            RespondAction::Accept => InvitationStatus::Accepted,
            RespondAction::Decline => InvitationStatus::Declined,
        }
    }
}

impl FromStr for RespondAction {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(RespondAction::Accept),
            "decline" => Ok(RespondAction::Decline),
            other => anyhow::bail!("unsupported response action {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseOutcome {
    pub invitation_id: Uuid,
    pub kind: InviteKind,
    pub status: InvitationStatus,
    pub responded_at: DateTime<Utc>,
    pub commitment: Option<Commitment>,
}

impl ResponseOutcome {
    pub fn session_ref(&self) -> Option<&str> {
        match &self.commitment {
            Some(Commitment::LiveSession { session_ref }) => Some(session_ref.as_str()),
            _ => None,
        }
    }

    pub fn battle_match(&self) -> Option<&BattleMatch> {
        match &self.commitment {
            Some(Commitment::Battle(battle_match)) => Some(battle_match),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateInvitation {
    pub initiator_uid: String,
    pub recipient_uid: String,
    pub context: InviteContext,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileLite {
    pub uid: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvitationListing {
    pub received: Vec<Invitation>,
    pub sent: Vec<Invitation>,
    pub profiles: HashMap<String, ProfileLite>,
}
