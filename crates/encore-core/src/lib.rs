pub mod audit;
pub mod error;
pub mod models;
pub mod policy;
pub mod service;
pub mod storage;

pub use audit::{AuditAction, AuditEvent};
pub use error::{ErrorKind, InviteError};
pub use models::{
    BattleContext, BattleMatch, Commitment, CreateInvitation, Invitation, InvitationListing,
    InvitationStatus, InviteContext, InviteKind, LiveCollabContext, MatchStatus, ProfileLite,
    RespondAction, ResponseOutcome,
};
pub use policy::{
    BATTLE_CATEGORIES, BattlePolicy, DEFAULT_LIVE_INVITE_TTL_MINUTES, InvitationConfig,
    InviteKindPolicy, LiveCollabPolicy,
};
pub use service::{InvitationBackends, InvitationService, SYSTEM_ACTOR};
pub use storage::{
    AuditLog, Clock, CommitmentStore, InvitationQuery, InvitationStore, ProfileDirectory,
    SystemClock,
};
