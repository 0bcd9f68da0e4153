mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::*;
use encore_core::{
    AuditAction, CommitmentStore, ErrorKind, InvitationBackends, InvitationConfig, InvitationQuery,
    InvitationService, InvitationStatus, InvitationStore, InviteError, RespondAction, SYSTEM_ACTOR,
};
use encore_store::{InMemoryBackends, ManualClock};

#[tokio::test]
async fn battle_acceptance_schedules_match() {
    let (stores, service) = harness();

    let invitation_id = service
        .create(battle_request(AMARA, BONGANI, "X", "rnb"))
        .await
        .expect("battle invite should be created");

    let outcome = service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .expect("recipient should accept");
    assert_eq!(outcome.status, InvitationStatus::Accepted);
    assert_eq!(outcome.session_ref(), None);

    let battle_match = stores
        .commitments
        .match_for_invite(invitation_id)
        .await
        .unwrap()
        .expect("match row should exist");
    assert_eq!(battle_match.host_uid, AMARA);
    assert_eq!(battle_match.guest_uid, BONGANI);
    assert_eq!(battle_match.invite_id, invitation_id);
    assert_eq!(battle_match.category, "rnb");
    assert_eq!(Some(&battle_match), outcome.battle_match());

    let stored = stores.invitations.get(invitation_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Accepted);
    assert!(stored.responded_at.is_some());
}

#[tokio::test]
async fn self_invitation_is_rejected_without_writes() {
    let (stores, service) = harness();

    let err = service
        .create(battle_request(AMARA, AMARA, "Mirror", "dj"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let err = service
        .create(live_request(AMARA, AMARA, "live-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let all = stores.invitations.list(&InvitationQuery::default()).await.unwrap();
    assert!(all.is_empty());
    assert!(stores.audit.snapshot().await.is_empty());
}

#[tokio::test]
async fn invalid_battle_payloads_write_nothing() {
    let (stores, service) = harness();

    for request in [
        battle_request(AMARA, BONGANI, "Clash", "polka"),
        battle_request(AMARA, BONGANI, "", "rnb"),
        battle_request(AMARA, "", "Clash", "rnb"),
    ] {
        let err = service.create(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    let all = stores.invitations.list(&InvitationQuery::default()).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn battle_to_unknown_recipient_is_not_found() {
    let (stores, service) = harness();

    let err = service
        .create(battle_request(AMARA, "ghost", "Clash", "dj"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(stores.audit.snapshot().await.is_empty());
}

#[tokio::test]
async fn live_invite_skips_recipient_lookup() {
    let (_, service) = harness();

    service
        .create(live_request(AMARA, "not-in-directory", "live-1"))
        .await
        .expect("live invites are sent without a directory check");
}

#[tokio::test]
async fn only_the_recipient_may_respond() {
    let (stores, service) = harness();
    let invitation_id = service
        .create(battle_request(AMARA, BONGANI, "Clash", "amapiano"))
        .await
        .unwrap();

    for actor in [AMARA, CHIDI] {
        let err = service
            .respond(actor, invitation_id, RespondAction::Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::NotAllowed));
    }
    assert!(stores.commitments.is_empty().await);

    service
        .respond(BONGANI, invitation_id, RespondAction::Decline)
        .await
        .unwrap();

    // Ownership is checked before status.
    let err = service
        .respond(CHIDI, invitation_id, RespondAction::Accept)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAllowed);
}

#[tokio::test]
async fn decline_is_terminal() {
    let (stores, service) = harness();
    let invitation_id = service
        .create(battle_request(AMARA, BONGANI, "Clash", "dj"))
        .await
        .unwrap();

    let outcome = service
        .respond(BONGANI, invitation_id, RespondAction::Decline)
        .await
        .unwrap();
    assert_eq!(outcome.status, InvitationStatus::Declined);
    assert!(outcome.commitment.is_none());

    let err = service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let stored = stores.invitations.get(invitation_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Declined);
    assert!(stores.commitments.is_empty().await);
}

#[tokio::test]
async fn accepted_invitation_never_changes_again() {
    let (stores, service) = harness();
    let invitation_id = service
        .create(battle_request(AMARA, BONGANI, "Clash", "others"))
        .await
        .unwrap();
    service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .unwrap();
    let before = stores.invitations.get(invitation_id).await.unwrap().unwrap();

    for action in [RespondAction::Accept, RespondAction::Decline] {
        let err = service
            .respond(BONGANI, invitation_id, action)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
    let err = service.cancel(AMARA, invitation_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let after = stores.invitations.get(invitation_id).await.unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(stores.commitments.len().await, 1);
}

#[tokio::test]
async fn responding_to_missing_invitation_is_not_found() {
    let (_, service) = harness();
    let err = service
        .respond(BONGANI, uuid::Uuid::new_v4(), RespondAction::Accept)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!err.is_lost_race());
}

#[tokio::test]
async fn live_invite_dedups_until_declined() {
    let (_, service) = harness();

    let first = service
        .create(live_request(AMARA, BONGANI, "live-42"))
        .await
        .unwrap();
    let err = service
        .create(live_request(CHIDI, BONGANI, "live-42"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);

    // A different session or recipient is a different slot.
    service
        .create(live_request(AMARA, BONGANI, "live-43"))
        .await
        .unwrap();
    service
        .create(live_request(AMARA, CHIDI, "live-42"))
        .await
        .unwrap();

    service
        .respond(BONGANI, first, RespondAction::Decline)
        .await
        .unwrap();
    service
        .create(live_request(AMARA, BONGANI, "live-42"))
        .await
        .expect("declined invitation frees the slot");
}

#[tokio::test]
async fn accepted_live_invite_keeps_blocking_and_returns_session() {
    let (stores, service) = harness();
    let invitation_id = service
        .create(live_request(AMARA, BONGANI, "live-7"))
        .await
        .unwrap();

    let outcome = service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .unwrap();
    assert_eq!(outcome.session_ref(), Some("live-7"));
    assert!(outcome.battle_match().is_none());
    assert!(stores.commitments.is_empty().await);

    let err = service
        .create(live_request(AMARA, BONGANI, "live-7"))
        .await
        .unwrap_err();
    assert!(matches!(err, InviteError::Duplicate));
}

#[tokio::test]
async fn battle_invites_are_not_deduplicated() {
    let (stores, service) = harness();
    for _ in 0..3 {
        service
            .create(battle_request(AMARA, BONGANI, "Rematch", "dj"))
            .await
            .unwrap();
    }
    let received = stores
        .invitations
        .list(&InvitationQuery::received_by(BONGANI))
        .await
        .unwrap();
    assert_eq!(received.len(), 3);
}

#[tokio::test]
async fn expired_live_invite_cannot_be_accepted() {
    let clock = Arc::new(ManualClock::default());
    let stores = InMemoryBackends::new(directory()).with_clock(clock.clone());
    let service = InvitationService::new(stores.backends(), InvitationConfig::default());

    let invitation_id = service
        .create(live_request(AMARA, BONGANI, "live-9"))
        .await
        .unwrap();

    clock.advance(Duration::minutes(61));

    let err = service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    // Responding never writes, so the row is untouched.
    let stored = stores.invitations.get(invitation_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Pending);
    assert_eq!(stored.responded_at, None);
    let trail = service.audit_trail(invitation_id).await.unwrap();
    assert_eq!(trail.len(), 1);

    // The stale pending row gives up the dedup slot to a new invite.
    service
        .create(live_request(CHIDI, BONGANI, "live-9"))
        .await
        .expect("stale pending invite should not block a new one");

    let stored = stores.invitations.get(invitation_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Expired);
    let trail = service.audit_trail(invitation_id).await.unwrap();
    let actions: Vec<AuditAction> = trail.iter().map(|event| event.action).collect();
    assert_eq!(actions, vec![AuditAction::Sent, AuditAction::Expired]);
    assert_eq!(trail[1].actor_uid, SYSTEM_ACTOR);
}

#[tokio::test]
async fn expire_stale_sweeps_only_past_due_pending_invites() {
    let clock = Arc::new(ManualClock::default());
    let stores = InMemoryBackends::new(directory()).with_clock(clock.clone());
    let service = InvitationService::new(stores.backends(), InvitationConfig::default());

    let live = service
        .create(live_request(AMARA, BONGANI, "live-11"))
        .await
        .unwrap();
    let battle = service
        .create(battle_request(AMARA, BONGANI, "Clash", "dj"))
        .await
        .unwrap();

    assert!(service.expire_stale(BONGANI).await.unwrap().is_empty());

    clock.advance(Duration::minutes(61));

    assert!(service.expire_stale(CHIDI).await.unwrap().is_empty());
    assert_eq!(service.expire_stale(AMARA).await.unwrap(), vec![live]);
    assert!(service.expire_stale(BONGANI).await.unwrap().is_empty());

    let stored = stores.invitations.get(live).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Expired);
    let stored = stores.invitations.get(battle).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Pending);

    let err = service
        .respond(BONGANI, live, RespondAction::Accept)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test]
async fn battle_invites_do_not_expire_by_default() {
    let clock = Arc::new(ManualClock::starting_at(Utc::now()));
    let stores = InMemoryBackends::new(directory()).with_clock(clock.clone());
    let service = InvitationService::new(stores.backends(), InvitationConfig::default());

    let invitation_id = service
        .create(battle_request(AMARA, BONGANI, "Slow burn", "rnb"))
        .await
        .unwrap();
    clock.advance(Duration::days(30));

    service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .expect("battle invitations carry no expiry");
}

#[tokio::test]
async fn initiator_can_cancel_pending_invitation() {
    let (stores, service) = harness();
    let invitation_id = service
        .create(battle_request(AMARA, BONGANI, "Clash", "dj"))
        .await
        .unwrap();

    let err = service.cancel(BONGANI, invitation_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAllowed);

    service.cancel(AMARA, invitation_id).await.unwrap();

    let err = service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let stored = stores.invitations.get(invitation_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Cancelled);
}

#[tokio::test]
async fn commitment_failure_leaves_accepted_orphan_until_reconciled() {
    let stores = InMemoryBackends::new(directory());
    let commitments = Arc::new(FlakyCommitmentStore::failing());
    let service = InvitationService::new(
        InvitationBackends {
            commitments: commitments.clone(),
            ..stores.backends()
        },
        InvitationConfig::default(),
    );

    let invitation_id = service
        .create(battle_request(AMARA, BONGANI, "Clash", "dj"))
        .await
        .unwrap();

    let err = service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unknown);
    match err {
        InviteError::CommitmentFailed {
            invitation_id: reported,
            ..
        } => assert_eq!(reported, invitation_id),
        other => panic!("expected commitment failure, got {other:?}"),
    }

    let stored = stores.invitations.get(invitation_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Accepted);

    for party in [AMARA, BONGANI] {
        let orphaned = service.list_orphaned_acceptances(party).await.unwrap();
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].id, invitation_id);
    }
    assert!(service.list_orphaned_acceptances(CHIDI).await.unwrap().is_empty());

    assert!(service.reconcile_commitment(BONGANI, invitation_id).await.is_err());

    commitments.recover();
    let err = service
        .reconcile_commitment(CHIDI, invitation_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAllowed);
    assert!(commitments.inner.is_empty().await);

    let created = service.reconcile_commitment(BONGANI, invitation_id).await.unwrap();
    let again = service.reconcile_commitment(AMARA, invitation_id).await.unwrap();
    assert_eq!(created.id, again.id);
    assert_eq!(created.host_uid, AMARA);

    assert!(service.list_orphaned_acceptances(AMARA).await.unwrap().is_empty());
}

#[tokio::test]
async fn accept_adopts_match_already_stored_by_reconcile() {
    let stores = InMemoryBackends::new(directory());
    let commitments = Arc::new(PreemptedCommitmentStore::default());
    let service = InvitationService::new(
        InvitationBackends {
            commitments: commitments.clone(),
            ..stores.backends()
        },
        InvitationConfig::default(),
    );

    let invitation_id = service
        .create(battle_request(AMARA, BONGANI, "Clash", "amapiano"))
        .await
        .unwrap();
    let outcome = service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .expect("an existing match satisfies the acceptance");

    let stored = commitments
        .match_for_invite(invitation_id)
        .await
        .unwrap()
        .expect("match row should exist");
    assert_eq!(outcome.battle_match(), Some(&stored));
    assert_eq!(commitments.inner.len().await, 1);

    let trail = service.audit_trail(invitation_id).await.unwrap();
    assert_eq!(trail[1].metadata["match_id"], serde_json::json!(stored.id));
}

#[tokio::test]
async fn reconcile_rejects_pending_and_live_invitations() {
    let (_, service) = harness();
    let battle = service
        .create(battle_request(AMARA, BONGANI, "Clash", "dj"))
        .await
        .unwrap();
    let live = service
        .create(live_request(AMARA, BONGANI, "live-1"))
        .await
        .unwrap();
    service
        .respond(BONGANI, live, RespondAction::Accept)
        .await
        .unwrap();

    for invitation_id in [battle, live] {
        let err = service
            .reconcile_commitment(AMARA, invitation_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}

#[tokio::test]
async fn audit_failures_do_not_block_invitations() {
    let stores = InMemoryBackends::new(directory());
    let service = InvitationService::new(
        InvitationBackends {
            audit: Arc::new(BrokenAuditLog),
            ..stores.backends()
        },
        InvitationConfig::default(),
    );

    let invitation_id = service
        .create(battle_request(AMARA, BONGANI, "Clash", "dj"))
        .await
        .unwrap();
    service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .unwrap();
    assert_eq!(stores.commitments.len().await, 1);
}

#[tokio::test]
async fn audit_trail_records_match_id() {
    let (stores, service) = harness();
    let invitation_id = service
        .create(battle_request(AMARA, BONGANI, "Clash", "rnb"))
        .await
        .unwrap();
    service
        .respond(BONGANI, invitation_id, RespondAction::Accept)
        .await
        .unwrap();

    let trail = service.audit_trail(invitation_id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].action, AuditAction::Sent);
    assert_eq!(trail[0].actor_uid, AMARA);
    assert_eq!(trail[1].action, AuditAction::Accepted);
    assert_eq!(trail[1].actor_uid, BONGANI);

    let battle_match = stores
        .commitments
        .match_for_invite(invitation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        trail[1].metadata["match_id"],
        serde_json::json!(battle_match.id)
    );
}

#[tokio::test]
async fn listing_splits_received_and_sent_with_profiles() {
    let (_, service) = harness();
    service
        .create(battle_request(AMARA, BONGANI, "One", "dj"))
        .await
        .unwrap();
    service
        .create(battle_request(CHIDI, AMARA, "Two", "rnb"))
        .await
        .unwrap();
    service
        .create(battle_request(BONGANI, CHIDI, "Three", "rnb"))
        .await
        .unwrap();

    let listing = service.list_for_artist(AMARA).await.unwrap();
    assert_eq!(listing.sent.len(), 1);
    assert_eq!(listing.sent[0].recipient_uid, BONGANI);
    assert_eq!(listing.received.len(), 1);
    assert_eq!(listing.received[0].initiator_uid, CHIDI);

    assert_eq!(listing.profiles.len(), 2);
    assert_eq!(listing.profiles[BONGANI].display_name, "DJ Bongani");
    assert_eq!(listing.profiles[CHIDI].display_name, "Chidi Waves");
}

#[tokio::test]
async fn listing_survives_profile_outage() {
    let stores = InMemoryBackends::new(directory());
    let service = InvitationService::new(
        InvitationBackends {
            profiles: Arc::new(UnresolvableDirectory),
            ..stores.backends()
        },
        InvitationConfig::default(),
    );
    service
        .create(battle_request(AMARA, BONGANI, "One", "dj"))
        .await
        .unwrap();

    let listing = service.list_for_artist(BONGANI).await.unwrap();
    assert_eq!(listing.received.len(), 1);
    assert!(listing.profiles.is_empty());
}

#[tokio::test]
async fn invitation_is_visible_only_to_its_parties() {
    let (_, service) = harness();
    let invitation_id = service
        .create(live_request(AMARA, BONGANI, "live-3"))
        .await
        .unwrap();

    assert_eq!(service.get(AMARA, invitation_id).await.unwrap().id, invitation_id);
    assert_eq!(service.get(BONGANI, invitation_id).await.unwrap().id, invitation_id);
    let err = service.get(CHIDI, invitation_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAllowed);
}
