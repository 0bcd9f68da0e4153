use std::collections::HashMap;

use chrono::{DateTime, Utc};
use encore_core::{
    AuditEvent, Invitation, InvitationListing, InvitationStatus, InviteContext, InviteKind,
    ProfileLite, RespondAction, ResponseOutcome,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvitationRequest {
    pub recipient_uid: String,
    pub context: InviteContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvitationResponse {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondRequest {
    pub action: RespondAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondResponse {
    pub invitation_id: Uuid,
    pub status: InvitationStatus,
    pub session_ref: Option<String>,
    pub match_id: Option<Uuid>,
}

impl From<&ResponseOutcome> for RespondResponse {
    fn from(outcome: &ResponseOutcome) -> Self {
        Self {
            invitation_id: outcome.invitation_id,
            status: outcome.status,
            session_ref: outcome.session_ref().map(str::to_string),
            match_id: outcome.battle_match().map(|battle_match| battle_match.id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationListResponse {
    pub received: Vec<Invitation>,
    pub sent: Vec<Invitation>,
    pub profiles: HashMap<String, ProfileLite>,
}

impl From<InvitationListing> for InvitationListResponse {
    fn from(listing: InvitationListing) -> Self {
        Self {
            received: listing.received,
            sent: listing.sent,
            profiles: listing.profiles,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrailResponse {
    pub events: Vec<AuditEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanedAcceptancesResponse {
    pub items: Vec<Invitation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiredInvitationsResponse {
    pub expired: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationRespondedEvent {
    pub invitation_id: Uuid,
    pub kind: InviteKind,
    pub status: InvitationStatus,
    pub actor_uid: String,
    pub match_id: Option<Uuid>,
    pub responded_at: DateTime<Utc>,
}
