use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    error::InviteError,
    models::{
        BattleContext, BattleMatch, Commitment, Invitation, InviteContext, LiveCollabContext,
        MatchStatus,
    },
};

pub const BATTLE_CATEGORIES: [&str; 4] = ["amapiano", "dj", "rnb", "others"];
pub const DEFAULT_LIVE_INVITE_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct InvitationConfig {
    pub battle_categories: Vec<String>,
    pub battle_ttl: Option<Duration>,
    pub live_invite_ttl: Option<Duration>,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            battle_categories: BATTLE_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            battle_ttl: None,
            live_invite_ttl: Some(Duration::minutes(DEFAULT_LIVE_INVITE_TTL_MINUTES)),
        }
    }
}

/// Per-kind rules plugged into the shared pending/accepted/declined machine.
pub trait InviteKindPolicy: Send + Sync {
    /// Checks and normalizes the payload. Must not touch any store.
    fn validate(&self, context: InviteContext) -> Result<InviteContext, InviteError>;

    /// Whether the recipient must resolve in the profile directory before send.
    fn requires_known_recipient(&self) -> bool;

    /// Session reference that at most one active invitation per recipient may target.
    fn dedup_session<'a>(&self, context: &'a InviteContext) -> Option<&'a str>;

    fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>>;

    fn on_accept(
        &self,
        invitation: &Invitation,
        now: DateTime<Utc>,
    ) -> Result<Commitment, InviteError>;
}

#[derive(Debug, Clone)]
pub struct BattlePolicy {
    categories: Vec<String>,
    ttl: Option<Duration>,
}

impl BattlePolicy {
    pub fn new(config: &InvitationConfig) -> Self {
        Self {
            categories: config.battle_categories.clone(),
            ttl: config.battle_ttl,
        }
    }

    fn normalize(&self, battle: BattleContext) -> Result<BattleContext, InviteError> {
        let title = battle.title.trim().to_string();
        if title.is_empty() {
            return Err(InviteError::invalid("title is required"));
        }

        let category = battle.category.trim().to_ascii_lowercase();
        if !self.categories.iter().any(|allowed| *allowed == category) {
            return Err(InviteError::invalid(format!(
                "category must be one of {}",
                self.categories.join("|")
            )));
        }

        let message = battle
            .message
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty());

        Ok(BattleContext {
            title,
            category,
            message,
            proposed_start: battle.proposed_start,
            duration_minutes: battle.duration_minutes.filter(|minutes| *minutes > 0),
            stake: battle.stake.max(0),
        })
    }
}

impl InviteKindPolicy for BattlePolicy {
    fn validate(&self, context: InviteContext) -> Result<InviteContext, InviteError> {
        match context {
            InviteContext::Battle(battle) => Ok(InviteContext::Battle(self.normalize(battle)?)),
            InviteContext::LiveCollab(_) => Err(InviteError::invalid(
                "battle policy cannot validate a live_collab payload",
            )),
        }
    }

    fn requires_known_recipient(&self) -> bool {
        true
    }

    fn dedup_session<'a>(&self, _context: &'a InviteContext) -> Option<&'a str> {
        None
    }

    fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ttl.map(|ttl| created_at + ttl)
    }

    fn on_accept(
        &self,
        invitation: &Invitation,
        now: DateTime<Utc>,
    ) -> Result<Commitment, InviteError> {
        let InviteContext::Battle(battle) = &invitation.context else {
            return Err(InviteError::invalid("invitation carries no battle payload"));
        };

        Ok(Commitment::Battle(BattleMatch {
            id: Uuid::new_v4(),
            invite_id: invitation.id,
            host_uid: invitation.initiator_uid.clone(),
            guest_uid: invitation.recipient_uid.clone(),
            title: battle.title.clone(),
            category: battle.category.clone(),
            stake: battle.stake,
            proposed_start: battle.proposed_start,
            duration_minutes: battle.duration_minutes,
            status: MatchStatus::Scheduled,
            created_at: now,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct LiveCollabPolicy {
    ttl: Option<Duration>,
}

impl LiveCollabPolicy {
    pub fn new(config: &InvitationConfig) -> Self {
        Self {
            ttl: config.live_invite_ttl,
        }
    }
}

impl InviteKindPolicy for LiveCollabPolicy {
    fn validate(&self, context: InviteContext) -> Result<InviteContext, InviteError> {
        match context {
            InviteContext::LiveCollab(live) => {
                let session_ref = live.session_ref.trim().to_string();
                if session_ref.is_empty() {
                    return Err(InviteError::invalid("session_ref is required"));
                }
                Ok(InviteContext::LiveCollab(LiveCollabContext {
                    session_ref,
                    initiator_display_name: live.initiator_display_name.trim().to_string(),
                }))
            }
            InviteContext::Battle(_) => Err(InviteError::invalid(
                "live_collab policy cannot validate a battle payload",
            )),
        }
    }

    // Recipients are not looked up before a live invite goes out.
    fn requires_known_recipient(&self) -> bool {
        false
    }

    fn dedup_session<'a>(&self, context: &'a InviteContext) -> Option<&'a str> {
        match context {
            InviteContext::LiveCollab(live) => Some(live.session_ref.as_str()),
            InviteContext::Battle(_) => None,
        }
    }

    fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ttl.map(|ttl| created_at + ttl)
    }

    fn on_accept(
        &self,
        invitation: &Invitation,
        _now: DateTime<Utc>,
    ) -> Result<Commitment, InviteError> {
        let session_ref = invitation
            .session_ref()
            .ok_or_else(|| InviteError::invalid("invitation carries no session reference"))?;

        Ok(Commitment::LiveSession {
            session_ref: session_ref.to_string(),
        })
    }
}
