#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the seat client integration tests.
//!
//! Provides a scripted [`MockGateway`], a channel-based [`MockSignalChannel`]
//! and helper functions for building snapshots and push JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use multihost_seat_client::gateway::GatewayRequest;
use multihost_seat_client::protocol::{
    AudienceListRequest, AudienceMember, InteractionNotice, ModifySeatStateRequest,
    ModifyUserStateRequest, OwnerState, RoomSnapshot, SeatInteractionRequest, SeatUpdate,
    SignalMessage, UserState,
};
use multihost_seat_client::{RequestGateway, ResponseCode, RoomEvent, SeatError, SignalChannel};
use tokio::sync::mpsc;

// ── MockGateway ─────────────────────────────────────────────────────

/// Scripted behaviour for one gateway call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Respond with this code.
    Code(ResponseCode),
    /// Fail in transit with [`SeatError::Gateway`].
    Fail(&'static str),
    /// Never respond.
    Hang,
}

/// A gateway that records every request and answers from a script.
///
/// Code-returning calls consume scripted [`Reply`]s in order and answer
/// `Success` once the script is empty. Audience-list calls return the
/// configured member list.
pub struct MockGateway {
    sent: mpsc::UnboundedSender<GatewayRequest>,
    replies: Arc<StdMutex<VecDeque<Reply>>>,
    members: Arc<StdMutex<Vec<AudienceMember>>>,
}

/// Test-side view of a [`MockGateway`].
pub struct GatewayLog {
    /// Every request the session sent, in order.
    pub sent: mpsc::UnboundedReceiver<GatewayRequest>,
    replies: Arc<StdMutex<VecDeque<Reply>>>,
    members: Arc<StdMutex<Vec<AudienceMember>>>,
}

impl MockGateway {
    pub fn new() -> (Self, GatewayLog) {
        let (tx, rx) = mpsc::unbounded_channel();
        let replies = Arc::new(StdMutex::new(VecDeque::new()));
        let members = Arc::new(StdMutex::new(Vec::new()));
        let gateway = Self {
            sent: tx,
            replies: Arc::clone(&replies),
            members: Arc::clone(&members),
        };
        let log = GatewayLog {
            sent: rx,
            replies,
            members,
        };
        (gateway, log)
    }

    async fn answer(&self, request: GatewayRequest) -> Result<ResponseCode, SeatError> {
        let _ = self.sent.send(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(ResponseCode::Success),
            Some(Reply::Code(code)) => Ok(code),
            Some(Reply::Fail(reason)) => Err(SeatError::Gateway(reason.into())),
            Some(Reply::Hang) => std::future::pending().await,
        }
    }
}

impl GatewayLog {
    /// Queue replies for the next code-returning calls.
    pub fn script(&self, replies: impl IntoIterator<Item = Reply>) {
        self.replies.lock().unwrap().extend(replies);
    }

    /// Members returned by the audience-list endpoint.
    pub fn set_members(&self, members: Vec<AudienceMember>) {
        *self.members.lock().unwrap() = members;
    }

    /// Wait for the next request the session sends.
    pub async fn next_request(&mut self) -> GatewayRequest {
        tokio::time::timeout(Duration::from_secs(60), self.sent.recv())
            .await
            .expect("timed out waiting for a gateway request")
            .expect("gateway dropped")
    }

    /// Wait for the next seat-interaction request.
    pub async fn next_interaction(&mut self) -> SeatInteractionRequest {
        match self.next_request().await {
            GatewayRequest::SeatInteraction(request) => request,
            other => panic!("expected a seat-interaction request, got {other:?}"),
        }
    }
}

#[async_trait]
impl RequestGateway for MockGateway {
    async fn seat_interaction(
        &self,
        request: &SeatInteractionRequest,
    ) -> Result<ResponseCode, SeatError> {
        self.answer(request.clone().into()).await
    }

    async fn modify_seat_state(
        &self,
        request: &ModifySeatStateRequest,
    ) -> Result<ResponseCode, SeatError> {
        self.answer(request.clone().into()).await
    }

    async fn modify_user_state(
        &self,
        request: &ModifyUserStateRequest,
    ) -> Result<ResponseCode, SeatError> {
        self.answer(request.clone().into()).await
    }

    async fn audience_list(
        &self,
        request: &AudienceListRequest,
    ) -> Result<Vec<AudienceMember>, SeatError> {
        let _ = self.sent.send(request.clone().into());
        let members = self.members.lock().unwrap().clone();
        Ok(members)
    }
}

// ── MockSignalChannel ───────────────────────────────────────────────

/// A channel-backed signal channel. Dropping the paired sender closes it.
pub struct MockSignalChannel {
    rx: mpsc::UnboundedReceiver<Result<String, SeatError>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

/// Test-side sender of push messages.
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Result<String, SeatError>>,
}

impl SignalSender {
    /// Deliver a push message.
    pub fn push(&self, message: &SignalMessage) {
        self.raw(serde_json::to_string(message).expect("push serialization"));
    }

    /// Deliver raw text, valid JSON or not.
    pub fn raw(&self, text: impl Into<String>) {
        self.tx.send(Ok(text.into())).expect("session dropped the signal channel");
    }

    /// Deliver a receive error.
    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Err(SeatError::SignalReceive(reason.into())));
    }
}

/// Create a connected `(channel, sender, closed flag)` triple.
pub fn signal_pair() -> (MockSignalChannel, SignalSender, Arc<AtomicBool>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let channel = MockSignalChannel {
        rx,
        closed: Arc::clone(&closed),
    };
    (channel, SignalSender { tx }, closed)
}

#[async_trait]
impl SignalChannel for MockSignalChannel {
    async fn recv(&mut self) -> Option<Result<String, SeatError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) -> Result<(), SeatError> {
        self.closed.store(true, Ordering::Relaxed);
        self.rx.close();
        Ok(())
    }
}

// ── Builders ────────────────────────────────────────────────────────

/// Owner state with both media flags enabled.
pub fn owner(user_id: &str) -> OwnerState {
    OwnerState {
        user_id: user_id.into(),
        user_name: format!("{user_id}-name"),
        uid: 1,
        enable_audio: true,
        enable_video: true,
    }
}

/// A member with both media flags enabled.
pub fn user(user_id: &str) -> UserState {
    UserState {
        user_id: user_id.into(),
        user_name: format!("{user_id}-name"),
        uid: 100,
        enable_audio: true,
        enable_video: true,
    }
}

/// A snapshot with `owner_id` as owner and the listed seats taken.
pub fn snapshot(owner_id: &str, taken: &[(u8, &str)]) -> RoomSnapshot {
    RoomSnapshot {
        owner: owner(owner_id),
        seats: taken
            .iter()
            .map(|(no, id)| SeatUpdate::taken(*no, user(id)))
            .collect(),
    }
}

pub fn notice(user_id: &str, seat_no: u8) -> InteractionNotice {
    InteractionNotice {
        user_id: user_id.into(),
        user_name: format!("{user_id}-name"),
        seat_no,
    }
}

pub fn seats_changed(seats: Vec<SeatUpdate>) -> SignalMessage {
    SignalMessage::SeatStateChanged { seats }
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive events until one matches `pred`, returning it.
///
/// Panics if the channel closes or nothing matches within a minute.
pub async fn wait_for<F>(events: &mut mpsc::Receiver<RoomEvent>, mut pred: F) -> RoomEvent
where
    F: FnMut(&RoomEvent) -> bool,
{
    let search = async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return event;
            }
        }
        panic!("event channel closed before a matching event");
    };
    tokio::time::timeout(Duration::from_secs(60), search)
        .await
        .expect("timed out waiting for event")
}
