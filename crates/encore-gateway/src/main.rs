use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use encore_core::{
    BattleMatch, CreateInvitation, ErrorKind, Invitation, InvitationService, InviteError,
    ResponseOutcome,
};
use encore_platform::{
    AuditTrailResponse, CreateInvitationRequest, CreateInvitationResponse,
    ExpiredInvitationsResponse, InvitationListResponse, InvitationRespondedEvent, OrphanedAcceptancesResponse, RedisBus,
    RespondRequest, RespondResponse, ServiceConfig, connect_database, ensure_schema,
    postgres_backends,
};
use tracing::{error, info};
use uuid::Uuid;

const ACTOR_HEADER: &str = "x-artist-uid";

#[derive(Clone)]
struct AppState {
    invitations: Arc<InvitationService>,
    redis: RedisBus,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "encore_gateway=info,encore_core=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url).await?;
    ensure_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let invitations = InvitationService::new(postgres_backends(pool), config.invitation_config());
    let state = AppState {
        invitations: Arc::new(invitations),
        redis,
    };

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("invitation gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/invitations",
            get(list_invitations).post(create_invitation),
        )
        .route("/invitations/{invitation_id}", get(get_invitation))
        .route(
            "/invitations/{invitation_id}/respond",
            post(respond_to_invitation),
        )
        .route("/invitations/{invitation_id}/cancel", post(cancel_invitation))
        .route("/invitations/{invitation_id}/audit", get(invitation_audit))
        .route(
            "/invitations/{invitation_id}/reconcile",
            post(reconcile_commitment),
        )
        .route("/invitations/expire", post(expire_stale_invitations))
        .route("/commitments/orphaned", get(list_orphaned_acceptances))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_invitation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateInvitationRequest>,
) -> Result<(StatusCode, Json<CreateInvitationResponse>), (StatusCode, String)> {
    let initiator_uid = actor_uid(&headers)?;

    let id = state
        .invitations
        .create(CreateInvitation {
            initiator_uid,
            recipient_uid: payload.recipient_uid,
            context: payload.context,
        })
        .await
        .map_err(invite_error)?;

    Ok((StatusCode::CREATED, Json(CreateInvitationResponse { id })))
}

async fn list_invitations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InvitationListResponse>, (StatusCode, String)> {
    let uid = actor_uid(&headers)?;
    let listing = state
        .invitations
        .list_for_artist(&uid)
        .await
        .map_err(invite_error)?;

    Ok(Json(listing.into()))
}

async fn get_invitation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<Invitation>, (StatusCode, String)> {
    let uid = actor_uid(&headers)?;
    let invitation = state
        .invitations
        .get(&uid, invitation_id)
        .await
        .map_err(invite_error)?;

    Ok(Json(invitation))
}

async fn respond_to_invitation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invitation_id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, (StatusCode, String)> {
    let uid = actor_uid(&headers)?;
    let outcome = state
        .invitations
        .respond(&uid, invitation_id, payload.action)
        .await
        .map_err(invite_error)?;

    dispatch_responded_event(&state, &uid, &outcome).await;

    Ok(Json(RespondResponse::from(&outcome)))
}

async fn cancel_invitation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invitation_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let uid = actor_uid(&headers)?;
    state
        .invitations
        .cancel(&uid, invitation_id)
        .await
        .map_err(invite_error)?;

    Ok(StatusCode::OK)
}

async fn invitation_audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<AuditTrailResponse>, (StatusCode, String)> {
    let uid = actor_uid(&headers)?;
    // Only the two parties may read the trail.
    state
        .invitations
        .get(&uid, invitation_id)
        .await
        .map_err(invite_error)?;

    let events = state
        .invitations
        .audit_trail(invitation_id)
        .await
        .map_err(invite_error)?;

    Ok(Json(AuditTrailResponse { events }))
}

async fn reconcile_commitment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<BattleMatch>, (StatusCode, String)> {
    let uid = actor_uid(&headers)?;
    let battle_match = state
        .invitations
        .reconcile_commitment(&uid, invitation_id)
        .await
        .map_err(invite_error)?;

    Ok(Json(battle_match))
}

async fn list_orphaned_acceptances(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OrphanedAcceptancesResponse>, (StatusCode, String)> {
    let uid = actor_uid(&headers)?;
    let items = state
        .invitations
        .list_orphaned_acceptances(&uid)
        .await
        .map_err(invite_error)?;

    Ok(Json(OrphanedAcceptancesResponse { items }))
}

async fn expire_stale_invitations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ExpiredInvitationsResponse>, (StatusCode, String)> {
    let uid = actor_uid(&headers)?;
    let expired = state
        .invitations
        .expire_stale(&uid)
        .await
        .map_err(invite_error)?;

    Ok(Json(ExpiredInvitationsResponse { expired }))
}

async fn dispatch_responded_event(state: &AppState, actor_uid: &str, outcome: &ResponseOutcome) {
    let event = InvitationRespondedEvent {
        invitation_id: outcome.invitation_id,
        kind: outcome.kind,
        status: outcome.status,
        actor_uid: actor_uid.to_string(),
        match_id: outcome.battle_match().map(|battle_match| battle_match.id),
        responded_at: outcome.responded_at,
    };
    if let Err(err) = state.redis.publish_responded(&event).await {
        error!(
            "failed to publish response event for invitation {}: {err}",
            outcome.invitation_id
        );
    }
}

fn actor_uid(headers: &HeaderMap) -> Result<String, (StatusCode, String)> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                format!("{ACTOR_HEADER} header is required"),
            )
        })
}

fn invite_error(err: InviteError) -> (StatusCode, String) {
    if err.is_lost_race() {
        return (StatusCode::CONFLICT, err.to_string());
    }

    let status = match err.kind() {
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::NotAllowed => StatusCode::FORBIDDEN,
        ErrorKind::Duplicate => StatusCode::CONFLICT,
        ErrorKind::Unknown => {
            error!("invitation request failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}
