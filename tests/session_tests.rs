#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for [`RoomSession`] driven through a scripted gateway
//! and an in-memory signal channel.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{notice, seats_changed, signal_pair, snapshot, user, wait_for, MockGateway, Reply};
use multihost_seat_client::gateway::GatewayRequest;
use multihost_seat_client::interaction::Origin;
use multihost_seat_client::protocol::{
    AudienceFilter, AudienceMember, OwnerState, SeatInteraction, SeatUpdate,
};
use multihost_seat_client::{
    InteractionKind, InteractionOutcome, LocalRole, ResponseCode, RoomConfig, RoomEvent,
    RoomSession, SeatError, SeatState, SignalMessage, SupersedeReason,
};
use tokio_test::{assert_err, assert_ok};

const OWNER: &str = "olive";
const ME: &str = "harry";

fn config(local_user_id: &str) -> RoomConfig {
    RoomConfig::new("room-1", local_user_id, format!("{local_user_id}-name"))
        .with_sweep_interval(Duration::from_millis(100))
}

fn is_resolved(event: &RoomEvent) -> bool {
    matches!(event, RoomEvent::InteractionResolved { .. })
}

/// Round-trip a command the session is guaranteed to refuse, so that every
/// input queued before it has been applied and published.
async fn settle(session: &RoomSession) {
    let err = assert_err!(session.close_seat(0).await);
    assert!(matches!(
        err,
        SeatError::InvalidSeat(0) | SeatError::NotPermitted { .. }
    ));
}

// ── Applications ────────────────────────────────────────────────────

#[tokio::test]
async fn accepted_application_makes_the_applicant_a_host() {
    let (gateway, mut log) = MockGateway::new();
    let (signals, push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    assert_ok!(session.apply_for_seat(2).await);
    let appeared = wait_for(&mut events, |e| {
        matches!(e, RoomEvent::InteractionAppeared { .. })
    })
    .await;
    let RoomEvent::InteractionAppeared { interaction } = appeared else {
        unreachable!()
    };
    assert_eq!(interaction.kind, InteractionKind::Application);
    assert_eq!(interaction.origin, Origin::Local);
    assert_eq!(interaction.user_id, ME);

    let sent = log.next_interaction().await;
    assert_eq!(sent.interaction, SeatInteraction::Apply);
    assert_eq!(sent.user_id, OWNER, "applications are addressed to the owner");
    assert_eq!(sent.seat_no, 2);

    push.push(&SignalMessage::ApplicationAccepted(notice(ME, 2)));

    let role = wait_for(&mut events, |e| matches!(e, RoomEvent::RoleChanged { .. })).await;
    assert_eq!(
        role,
        RoomEvent::RoleChanged {
            previous: LocalRole::Audience,
            current: LocalRole::Host,
        }
    );
    let resolved = wait_for(&mut events, is_resolved).await;
    assert!(matches!(
        resolved,
        RoomEvent::InteractionResolved {
            outcome: InteractionOutcome::Accepted,
            ..
        }
    ));

    settle(&session).await;
    assert_eq!(session.role().await, LocalRole::Host);
    assert!(session.pending_interactions().await.is_empty());
    let seats = session.seats().await;
    assert!(seats[1].is_held_by(ME));
}

#[tokio::test]
async fn acknowledged_application_does_not_seat_anyone() {
    let (gateway, mut log) = MockGateway::new();
    let (signals, _push, _closed) = signal_pair();
    let (session, _events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    assert_ok!(session.apply_for_seat(1).await);
    log.next_interaction().await;
    settle(&session).await;

    assert_eq!(session.role().await, LocalRole::Audience);
    assert_eq!(session.seats().await[0].state, SeatState::Open);
    assert_eq!(session.pending_interactions().await.len(), 1);
}

#[tokio::test]
async fn another_occupant_supersedes_a_pending_application() {
    let (gateway, mut log) = MockGateway::new();
    log.script([Reply::Hang]);
    let (signals, push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    assert_ok!(session.apply_for_seat(2).await);
    log.next_interaction().await;

    push.push(&seats_changed(vec![SeatUpdate::taken(2, user("carol"))]));

    let resolved = wait_for(&mut events, is_resolved).await;
    let RoomEvent::InteractionResolved {
        interaction,
        outcome,
    } = resolved
    else {
        unreachable!()
    };
    assert_eq!(interaction.user_id, ME);
    assert_eq!(
        outcome,
        InteractionOutcome::Superseded(SupersedeReason::SeatTaken {
            by: "carol".into()
        })
    );

    settle(&session).await;
    assert_eq!(session.role().await, LocalRole::Audience);
}

#[tokio::test]
async fn closing_a_seat_supersedes_rather_than_rejects() {
    let (gateway, mut log) = MockGateway::new();
    let (signals, push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    assert_ok!(session.apply_for_seat(5).await);
    log.next_interaction().await;

    push.push(&seats_changed(vec![SeatUpdate::vacant(5, SeatState::Closed)]));

    let resolved = wait_for(&mut events, is_resolved).await;
    assert!(matches!(
        resolved,
        RoomEvent::InteractionResolved {
            outcome: InteractionOutcome::Superseded(SupersedeReason::SeatClosed),
            ..
        }
    ));
}

#[tokio::test]
async fn server_rejection_is_distinct_from_remote_rejection() {
    let (gateway, mut log) = MockGateway::new();
    log.script([Reply::Code(ResponseCode::RateLimitExceeded)]);
    let (signals, push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    assert_ok!(session.apply_for_seat(1).await);
    let first = wait_for(&mut events, is_resolved).await;
    assert!(matches!(
        first,
        RoomEvent::InteractionResolved {
            outcome: InteractionOutcome::ServerRejected(ResponseCode::RateLimitExceeded),
            ..
        }
    ));

    // Second attempt reaches the owner, who says no.
    assert_ok!(session.apply_for_seat(1).await);
    log.next_interaction().await;
    log.next_interaction().await;
    push.push(&SignalMessage::ApplicationRejected(notice(ME, 1)));

    let second = wait_for(&mut events, is_resolved).await;
    assert!(matches!(
        second,
        RoomEvent::InteractionResolved {
            outcome: InteractionOutcome::Rejected,
            ..
        }
    ));
}

#[tokio::test]
async fn withdrawn_application_ignores_a_late_accept() {
    let (gateway, mut log) = MockGateway::new();
    let (signals, push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    assert_ok!(session.apply_for_seat(3).await);
    log.next_interaction().await;
    assert_ok!(session.withdraw_application(3).await);

    let resolved = wait_for(&mut events, is_resolved).await;
    assert!(matches!(
        resolved,
        RoomEvent::InteractionResolved {
            outcome: InteractionOutcome::Withdrawn,
            ..
        }
    ));

    push.push(&SignalMessage::ApplicationAccepted(notice(ME, 3)));
    settle(&session).await;
    assert_eq!(session.role().await, LocalRole::Audience);
    assert!(matches!(
        session.withdraw_application(3).await,
        Err(SeatError::NoSuchInteraction { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_application_is_retried_until_it_times_out() {
    let (gateway, mut log) = MockGateway::new();
    log.script([Reply::Fail("connection reset"), Reply::Fail("connection reset")]);
    let (signals, _push, _closed) = signal_pair();
    let config = config(ME)
        .with_pending_timeout(Duration::from_secs(10))
        .with_retry_interval(Duration::from_secs(2));
    let (session, mut events) =
        RoomSession::start(gateway, signals, config, snapshot(OWNER, &[]));

    let started = tokio::time::Instant::now();
    assert_ok!(session.apply_for_seat(4).await);

    let first = log.next_interaction().await;
    let retry = log.next_interaction().await;
    assert_eq!(first, retry, "a retry resends the same request");
    assert!(started.elapsed() >= Duration::from_secs(2));
    log.next_interaction().await;

    let resolved = wait_for(&mut events, is_resolved).await;
    assert!(matches!(
        resolved,
        RoomEvent::InteractionResolved {
            outcome: InteractionOutcome::Superseded(SupersedeReason::Timeout),
            ..
        }
    ));
    assert!(started.elapsed() >= Duration::from_secs(10));
}

// ── Owner side ──────────────────────────────────────────────────────

#[tokio::test]
async fn owner_accepts_a_remote_application() {
    let (gateway, mut log) = MockGateway::new();
    let (signals, push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(OWNER), snapshot(OWNER, &[]));

    push.push(&SignalMessage::SeatApplied(notice("bob", 3)));
    let appeared = wait_for(&mut events, |e| {
        matches!(e, RoomEvent::InteractionAppeared { .. })
    })
    .await;
    let RoomEvent::InteractionAppeared { interaction } = appeared else {
        unreachable!()
    };
    assert_eq!(interaction.origin, Origin::Remote);
    assert_eq!(interaction.user_id, "bob");

    assert_ok!(session.accept_application(3, "bob").await);
    let sent = log.next_interaction().await;
    assert_eq!(sent.interaction, SeatInteraction::OwnerAccept);
    assert_eq!(sent.user_id, "bob");

    let resolved = wait_for(&mut events, is_resolved).await;
    assert!(matches!(
        resolved,
        RoomEvent::InteractionResolved {
            outcome: InteractionOutcome::Accepted,
            ..
        }
    ));
}

#[tokio::test]
async fn owner_is_never_demoted_by_seat_pushes() {
    let (gateway, _log) = MockGateway::new();
    let (signals, push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(OWNER), snapshot(OWNER, &[(1, "bob")]));

    let role = wait_for(&mut events, |e| matches!(e, RoomEvent::RoleChanged { .. })).await;
    assert_eq!(
        role,
        RoomEvent::RoleChanged {
            previous: LocalRole::Audience,
            current: LocalRole::Owner,
        }
    );

    push.push(&seats_changed(vec![
        SeatUpdate::vacant(1, SeatState::Open),
        SeatUpdate::taken(2, user("carol")),
    ]));
    settle(&session).await;

    assert_eq!(session.role().await, LocalRole::Owner);
    assert!(session.seats().await[1].is_held_by("carol"));
}

#[tokio::test]
async fn audience_list_arrives_as_an_event() {
    let (gateway, mut log) = MockGateway::new();
    log.set_members(vec![AudienceMember {
        user_id: "dora".into(),
        user_name: "Dora".into(),
        uid: 9,
    }]);
    let (signals, _push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(OWNER), snapshot(OWNER, &[]));

    session
        .request_audience_list(AudienceFilter::Audience)
        .await
        .unwrap();
    assert!(matches!(
        log.next_request().await,
        GatewayRequest::AudienceList(_)
    ));

    let received = wait_for(&mut events, |e| {
        matches!(e, RoomEvent::AudienceListReceived { .. })
    })
    .await;
    let RoomEvent::AudienceListReceived { members } = received else {
        unreachable!()
    };
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, "dora");
}

#[tokio::test]
async fn audience_cannot_list_the_audience() {
    let (gateway, _log) = MockGateway::new();
    let (signals, _push, _closed) = signal_pair();
    let (session, _events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    let err = session
        .request_audience_list(AudienceFilter::All)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SeatError::NotPermitted {
            role: LocalRole::Audience,
            ..
        }
    ));
}

// ── Media ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn confirmed_mute_outlives_the_pending_timeout() {
    let (gateway, mut log) = MockGateway::new();
    let (signals, _push, _closed) = signal_pair();
    let (session, _events) =
        RoomSession::start(gateway, signals, config(OWNER), snapshot(OWNER, &[]));

    assert_ok!(session.set_local_audio(false).await);
    let GatewayRequest::ModifyUserState(sent) = log.next_request().await else {
        panic!("expected a user-state request");
    };
    assert!(!sent.enable_audio);
    assert!(sent.enable_video, "the untouched flag keeps its value");

    tokio::time::sleep(Duration::from_secs(120)).await;
    settle(&session).await;

    let owner = session.owner().await.unwrap();
    assert!(!owner.media.audio_enabled);
    assert!(owner.media.video_enabled);
}

#[tokio::test]
async fn rejected_host_mute_is_rolled_back() {
    let (gateway, log) = MockGateway::new();
    log.script([Reply::Code(ResponseCode::NotRoomOwner)]);
    let (signals, _push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(OWNER), snapshot(OWNER, &[(2, "bob")]));

    assert_ok!(session.set_host_audio(2, false).await);

    let rejected = wait_for(&mut events, |e| {
        matches!(e, RoomEvent::RequestRejected { .. })
    })
    .await;
    assert!(matches!(
        rejected,
        RoomEvent::RequestRejected {
            request: GatewayRequest::ModifyUserState(_),
            code: ResponseCode::NotRoomOwner,
        }
    ));

    settle(&session).await;
    let seats = session.seats().await;
    let host = seats[1].occupant.as_ref().unwrap();
    assert!(host.media.audio_enabled);
}

#[tokio::test]
async fn owner_state_push_updates_the_owner_slot() {
    let (gateway, _log) = MockGateway::new();
    let (signals, push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    push.push(&SignalMessage::OwnerStateChanged(OwnerState {
        user_id: OWNER.into(),
        user_name: "Olive".into(),
        uid: 1,
        enable_audio: false,
        enable_video: true,
    }));

    let changed = wait_for(&mut events, |e| {
        matches!(e, RoomEvent::OwnerStateChanged { owner } if !owner.media.audio_enabled)
    })
    .await;
    assert!(matches!(changed, RoomEvent::OwnerStateChanged { .. }));
    settle(&session).await;
    assert!(!session.owner().await.unwrap().media.audio_enabled);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn rejoin_rederives_the_role() {
    let (gateway, _log) = MockGateway::new();
    let (signals, _push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    assert_ok!(session.apply_for_seat(1).await);
    assert_ok!(session.rejoin(snapshot(OWNER, &[(3, ME)])).await);

    assert_eq!(session.role().await, LocalRole::Host);
    assert!(session.pending_interactions().await.is_empty());
    let role = wait_for(&mut events, |e| matches!(e, RoomEvent::RoleChanged { .. })).await;
    assert_eq!(
        role,
        RoomEvent::RoleChanged {
            previous: LocalRole::Audience,
            current: LocalRole::Host,
        }
    );
}

#[tokio::test]
async fn malformed_push_is_ignored() {
    let (gateway, _log) = MockGateway::new();
    let (signals, push, _closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    push.raw("{not json");
    push.raw(r#"{"type":"SeatExploded","data":{}}"#);
    push.push(&seats_changed(vec![SeatUpdate::taken(4, user("carol"))]));

    wait_for(&mut events, |e| match e {
        RoomEvent::SeatsUpdated { seats } => seats[3].is_held_by("carol"),
        _ => false,
    })
    .await;
    assert!(session.is_open());
}

#[tokio::test]
async fn signal_close_ends_the_session() {
    let (gateway, _log) = MockGateway::new();
    let (signals, push, closed) = signal_pair();
    let (session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    drop(push);

    let event = wait_for(&mut events, |e| matches!(e, RoomEvent::Closed { .. })).await;
    assert_eq!(event, RoomEvent::Closed { reason: None });
    assert!(events.recv().await.is_none());
    assert!(closed.load(Ordering::Relaxed));
    assert!(!session.is_open());
    assert!(matches!(
        session.apply_for_seat(1).await,
        Err(SeatError::SessionClosed)
    ));
}

#[tokio::test]
async fn signal_error_closes_with_a_reason() {
    let (gateway, _log) = MockGateway::new();
    let (signals, push, _closed) = signal_pair();
    let (_session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    push.fail("socket reset");

    let event = wait_for(&mut events, |e| matches!(e, RoomEvent::Closed { .. })).await;
    let RoomEvent::Closed { reason } = event else {
        unreachable!()
    };
    assert!(reason.unwrap().contains("socket reset"));
}

#[tokio::test]
async fn shutdown_closes_the_signal_channel() {
    let (gateway, _log) = MockGateway::new();
    let (signals, _push, closed) = signal_pair();
    let (mut session, mut events) =
        RoomSession::start(gateway, signals, config(ME), snapshot(OWNER, &[]));

    session.shutdown().await;

    assert!(closed.load(Ordering::Relaxed));
    assert!(!session.is_open());
    let event = wait_for(&mut events, |e| matches!(e, RoomEvent::Closed { .. })).await;
    assert!(matches!(event, RoomEvent::Closed { reason: Some(_) }));
}
