pub mod config;
pub mod contracts;
pub mod db;
pub mod redis_bus;
pub mod store;

use std::sync::Arc;

use encore_core::{InvitationBackends, SystemClock};
use sqlx::PgPool;

pub use config::ServiceConfig;
pub use contracts::{
    AuditTrailResponse, CreateInvitationRequest, CreateInvitationResponse,
    ExpiredInvitationsResponse, InvitationListResponse, InvitationRespondedEvent, OrphanedAcceptancesResponse,
    RespondRequest, RespondResponse,
};
pub use db::{connect_database, ensure_schema};
pub use redis_bus::{INVITATIONS_RESPONDED_CHANNEL, RedisBus};
pub use store::{PgAuditLog, PgCommitmentStore, PgInvitationStore, PgProfileDirectory};

/// Wires every collaborator to the same Postgres pool.
pub fn postgres_backends(pool: PgPool) -> InvitationBackends {
    InvitationBackends {
        invitations: Arc::new(PgInvitationStore::new(pool.clone())),
        commitments: Arc::new(PgCommitmentStore::new(pool.clone())),
        audit: Arc::new(PgAuditLog::new(pool.clone())),
        profiles: Arc::new(PgProfileDirectory::new(pool)),
        clock: Arc::new(SystemClock),
    }
}
