//! Async room session.
//!
//! [`RoomSession`] is a thin handle over a background task that owns the
//! [`RoomState`]. The task serializes every input through one
//! `tokio::select!` loop:
//!
//! - local commands from the handle (unbounded channel),
//! - push messages from the [`SignalChannel`],
//! - completions of in-flight [`RequestGateway`] calls,
//! - a periodic sweep for timeouts and retries.
//!
//! Gateway calls never block the loop; each one runs in its own task and its
//! result is applied when it completes. Events are emitted on a bounded
//! channel returned from [`RoomSession::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! # use async_trait::async_trait;
//! # use multihost_seat_client::protocol::{
//! #     AudienceListRequest, AudienceMember, ModifySeatStateRequest, ModifyUserStateRequest,
//! #     OwnerState, SeatInteractionRequest,
//! # };
//! # use multihost_seat_client::ResponseCode;
//! use multihost_seat_client::{
//!     RequestGateway, RoomConfig, RoomEvent, RoomSession, RoomSnapshot, SeatError,
//!     SignalChannel,
//! };
//! use tokio::sync::mpsc;
//!
//! /// Pushes arrive as raw JSON frames on an in-process channel.
//! struct ChannelSignals(mpsc::UnboundedReceiver<String>);
//!
//! #[async_trait]
//! impl SignalChannel for ChannelSignals {
//!     async fn recv(&mut self) -> Option<Result<String, SeatError>> {
//!         self.0.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SeatError> {
//!         self.0.close();
//!         Ok(())
//!     }
//! }
//!
//! struct AcceptAll;
//!
//! # #[async_trait]
//! # impl RequestGateway for AcceptAll {
//! #     async fn seat_interaction(
//! #         &self,
//! #         _request: &SeatInteractionRequest,
//! #     ) -> Result<ResponseCode, SeatError> {
//! #         Ok(ResponseCode::Success)
//! #     }
//! #     async fn modify_seat_state(
//! #         &self,
//! #         _request: &ModifySeatStateRequest,
//! #     ) -> Result<ResponseCode, SeatError> {
//! #         Ok(ResponseCode::Success)
//! #     }
//! #     async fn modify_user_state(
//! #         &self,
//! #         _request: &ModifyUserStateRequest,
//! #     ) -> Result<ResponseCode, SeatError> {
//! #         Ok(ResponseCode::Success)
//! #     }
//! #     async fn audience_list(
//! #         &self,
//! #         _request: &AudienceListRequest,
//! #     ) -> Result<Vec<AudienceMember>, SeatError> {
//! #         Ok(Vec::new())
//! #     }
//! # }
//! #
//! #[tokio::main]
//! async fn main() -> Result<(), SeatError> {
//!     let (push_tx, push_rx) = mpsc::unbounded_channel();
//!     let snapshot = RoomSnapshot {
//!         owner: OwnerState {
//!             user_id: "owner-1".into(),
//!             user_name: "Olive".into(),
//!             uid: 1,
//!             enable_audio: true,
//!             enable_video: true,
//!         },
//!         seats: Vec::new(),
//!     };
//!
//!     let config = RoomConfig::new("room-42", "user-7", "Harry");
//!     let (mut session, mut events) =
//!         RoomSession::start(AcceptAll, ChannelSignals(push_rx), config, snapshot);
//!
//!     session.apply_for_seat(2).await?;
//!     push_tx
//!         .send(r#"{"type":"ApplicationRejected","data":{"user_id":"user-7","user_name":"Harry","seat_no":2}}"#.into())
//!         .ok();
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             RoomEvent::RoleChanged { current, .. } => println!("now {current}"),
//!             RoomEvent::InteractionResolved { outcome, .. } => {
//!                 println!("application ended: {outcome:?}");
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::error::{Result, SeatError};
use crate::event::RoomEvent;
use crate::gateway::{GatewayRequest, GatewayResponse, RequestGateway};
use crate::interaction::PendingInteraction;
use crate::protocol::{AudienceFilter, RoomSnapshot, SeatNumber, SignalMessage, UserId};
use crate::role::LocalRole;
use crate::room::{Effects, RoomCommand, RoomConfig, RoomState, MIN_SWEEP_INTERVAL};
use crate::seat_table::{OwnerSlot, Seat};
use crate::signal::SignalChannel;

// ── Shared state ────────────────────────────────────────────────────

/// Snapshot of the room state published by the session loop after every
/// input, readable from the handle.
struct SessionState {
    open: AtomicBool,
    role: Mutex<LocalRole>,
    seats: Mutex<Vec<Seat>>,
    owner: Mutex<Option<OwnerSlot>>,
    pending: Mutex<Vec<PendingInteraction>>,
}

impl SessionState {
    fn new(room: &RoomState) -> Self {
        Self {
            open: AtomicBool::new(true),
            role: Mutex::new(room.role()),
            seats: Mutex::new(room.table().seats().to_vec()),
            owner: Mutex::new(room.table().owner().cloned()),
            pending: Mutex::new(room.interactions().pending().cloned().collect()),
        }
    }

    async fn publish(&self, room: &RoomState) {
        *self.role.lock().await = room.role();
        *self.seats.lock().await = room.table().seats().to_vec();
        *self.owner.lock().await = room.table().owner().cloned();
        *self.pending.lock().await = room.interactions().pending().cloned().collect();
    }
}

/// Inputs from the handle to the session loop.
enum SessionInput {
    Command {
        command: RoomCommand,
        reply: oneshot::Sender<Result<()>>,
    },
    Rejoin {
        snapshot: Box<RoomSnapshot>,
        reply: oneshot::Sender<()>,
    },
}

// ── Session handle ──────────────────────────────────────────────────

/// Handle to a running room session.
///
/// Created via [`RoomSession::start`]. Every action method queues a command
/// to the session loop and waits until the loop has validated it: `Ok(())`
/// means the request was handed to the gateway, not that the room service
/// accepted it. Outcomes arrive as [`RoomEvent`]s.
pub struct RoomSession {
    input_tx: mpsc::UnboundedSender<SessionInput>,
    state: Arc<SessionState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl RoomSession {
    /// Bootstrap from `snapshot`, start the session loop and return a handle
    /// plus event receiver.
    ///
    /// The first events on the receiver describe the bootstrapped state:
    /// `SeatsUpdated`, `OwnerStateChanged` and, unless the local user is
    /// plain audience, `RoleChanged`.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<G, S>(
        gateway: G,
        signals: S,
        config: RoomConfig,
        snapshot: RoomSnapshot,
    ) -> (Self, mpsc::Receiver<RoomEvent>)
    where
        G: RequestGateway,
        S: SignalChannel,
    {
        let (input_tx, input_rx) = mpsc::unbounded_channel::<SessionInput>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<RoomEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let mut room = RoomState::new(&config);
        let initial = room.bootstrap(&snapshot);
        let state = Arc::new(SessionState::new(&room));

        let task = tokio::spawn(session_loop(SessionLoop {
            room,
            gateway: Arc::new(gateway),
            signals,
            input_rx,
            event_tx,
            state: Arc::clone(&state),
            shutdown_rx,
            sweep_interval: config.sweep_interval.max(MIN_SWEEP_INTERVAL),
            initial,
        }));

        let session = Self {
            input_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (session, event_rx)
    }

    // ── Seat actions ────────────────────────────────────────────────

    /// Apply for an open seat (audience only).
    ///
    /// # Errors
    ///
    /// Returns a validation error if the local user is not audience or the
    /// seat is not open, and [`SeatError::SessionClosed`] after shutdown.
    pub async fn apply_for_seat(&self, seat: SeatNumber) -> Result<()> {
        self.command(RoomCommand::ApplyForSeat { seat }).await
    }

    /// Invite an audience member to an open seat (owner only).
    ///
    /// # Errors
    ///
    /// Returns a validation error if the local user is not the owner, the
    /// seat is not open or the invitee already holds a seat.
    pub async fn invite(
        &self,
        user_id: impl Into<UserId>,
        user_name: impl Into<String>,
        seat: SeatNumber,
    ) -> Result<()> {
        self.command(RoomCommand::Invite {
            user_id: user_id.into(),
            user_name: user_name.into(),
            seat,
        })
        .await
    }

    /// Grant a pending application (owner only).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NoSuchInteraction`] if no application from
    /// `user_id` is pending for `seat`.
    pub async fn accept_application(
        &self,
        seat: SeatNumber,
        user_id: impl Into<UserId>,
    ) -> Result<()> {
        self.command(RoomCommand::AcceptApplication {
            seat,
            user_id: user_id.into(),
        })
        .await
    }

    /// Turn a pending application down (owner only).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NoSuchInteraction`] if no application from
    /// `user_id` is pending for `seat`.
    pub async fn reject_application(
        &self,
        seat: SeatNumber,
        user_id: impl Into<UserId>,
    ) -> Result<()> {
        self.command(RoomCommand::RejectApplication {
            seat,
            user_id: user_id.into(),
        })
        .await
    }

    /// Take a pending invitation (audience only).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NoSuchInteraction`] if no invitation is pending
    /// for `seat`.
    pub async fn accept_invitation(&self, seat: SeatNumber) -> Result<()> {
        self.command(RoomCommand::AcceptInvitation { seat }).await
    }

    /// Decline a pending invitation (audience only).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NoSuchInteraction`] if no invitation is pending
    /// for `seat`.
    pub async fn reject_invitation(&self, seat: SeatNumber) -> Result<()> {
        self.command(RoomCommand::RejectInvitation { seat }).await
    }

    /// Take back the local application for `seat`.
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NoSuchInteraction`] if there is none.
    pub async fn withdraw_application(&self, seat: SeatNumber) -> Result<()> {
        self.command(RoomCommand::WithdrawApplication { seat }).await
    }

    /// Take back an invitation sent to `user_id` (owner only).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NoSuchInteraction`] if there is none.
    pub async fn withdraw_invitation(
        &self,
        seat: SeatNumber,
        user_id: impl Into<UserId>,
    ) -> Result<()> {
        self.command(RoomCommand::WithdrawInvitation {
            seat,
            user_id: user_id.into(),
        })
        .await
    }

    /// Give up the local seat (host only).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NotPermitted`] unless the local user is a host.
    pub async fn leave_seat(&self) -> Result<()> {
        self.command(RoomCommand::LeaveSeat).await
    }

    /// Remove the host from `seat` (owner only).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::SeatUnavailable`] if the seat is not taken.
    pub async fn force_leave(&self, seat: SeatNumber) -> Result<()> {
        self.command(RoomCommand::ForceLeave { seat }).await
    }

    /// Reopen a closed seat (owner only).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::SeatUnavailable`] if the seat is not closed.
    pub async fn open_seat(&self, seat: SeatNumber) -> Result<()> {
        self.command(RoomCommand::OpenSeat { seat }).await
    }

    /// Close a seat (owner only).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::SeatUnavailable`] if the seat is already closed.
    pub async fn close_seat(&self, seat: SeatNumber) -> Result<()> {
        self.command(RoomCommand::CloseSeat { seat }).await
    }

    // ── Media actions ───────────────────────────────────────────────

    /// Toggle the local microphone (owner or host).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NotPermitted`] for audience members.
    pub async fn set_local_audio(&self, enabled: bool) -> Result<()> {
        self.command(RoomCommand::SetLocalAudio { enabled }).await
    }

    /// Toggle the local camera (owner or host).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NotPermitted`] for audience members.
    pub async fn set_local_video(&self, enabled: bool) -> Result<()> {
        self.command(RoomCommand::SetLocalVideo { enabled }).await
    }

    /// Mute or unmute the host on `seat` (owner only).
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::SeatUnavailable`] if the seat is not taken.
    pub async fn set_host_audio(&self, seat: SeatNumber, enabled: bool) -> Result<()> {
        self.command(RoomCommand::SetHostAudio { seat, enabled }).await
    }

    /// Fetch invitation candidates (owner only). The list arrives as
    /// [`RoomEvent::AudienceListReceived`].
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NotPermitted`] unless the local user is the owner.
    pub async fn request_audience_list(&self, filter: AudienceFilter) -> Result<()> {
        self.command(RoomCommand::RequestAudienceList { filter }).await
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Re-bootstrap from a fresh room-entry snapshot, e.g. after reconnecting.
    ///
    /// Pending interactions from before are discarded without notifying
    /// anyone; the local role is derived from the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::SessionClosed`] if the session has ended.
    pub async fn rejoin(&self, snapshot: RoomSnapshot) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.send(SessionInput::Rejoin {
            snapshot: Box::new(snapshot),
            reply,
        })?;
        done.await.map_err(|_| SeatError::SessionClosed)
    }

    /// Shut the session down, closing the signal channel and stopping the
    /// background task.
    ///
    /// After this call the event receiver yields `Closed` and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("RoomSession: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.open.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` until the session has ended.
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }

    /// The local actor's current role.
    pub async fn role(&self) -> LocalRole {
        *self.state.role.lock().await
    }

    /// All numbered seats.
    pub async fn seats(&self) -> Vec<Seat> {
        self.state.seats.lock().await.clone()
    }

    /// The owner slot.
    pub async fn owner(&self) -> Option<OwnerSlot> {
        self.state.owner.lock().await.clone()
    }

    /// Applications and invitations waiting for an answer or a push.
    pub async fn pending_interactions(&self) -> Vec<PendingInteraction> {
        self.state.pending.lock().await.clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn command(&self, command: RoomCommand) -> Result<()> {
        let (reply, result) = oneshot::channel();
        self.send(SessionInput::Command { command, reply })?;
        result.await.map_err(|_| SeatError::SessionClosed)?
    }

    fn send(&self, input: SessionInput) -> Result<()> {
        if !self.state.open.load(Ordering::Acquire) {
            return Err(SeatError::SessionClosed);
        }
        self.input_tx
            .send(input)
            .map_err(|_| SeatError::SessionClosed)
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("open", &self.is_open())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        // No executor to drive a graceful close from a synchronous drop.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

struct SessionLoop<G, S> {
    room: RoomState,
    gateway: Arc<G>,
    signals: S,
    input_rx: mpsc::UnboundedReceiver<SessionInput>,
    event_tx: mpsc::Sender<RoomEvent>,
    state: Arc<SessionState>,
    shutdown_rx: oneshot::Receiver<()>,
    sweep_interval: Duration,
    initial: Effects,
}

/// Current time as seen by the state machine. Follows tokio's clock so that
/// paused-time tests drive timeouts.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Background loop that owns the room state.
///
/// Exits when:
/// - shutdown is requested, or the handle is dropped
/// - the signal channel closes or fails
async fn session_loop<G, S>(ctx: SessionLoop<G, S>)
where
    G: RequestGateway,
    S: SignalChannel,
{
    let SessionLoop {
        mut room,
        gateway,
        mut signals,
        mut input_rx,
        event_tx,
        state,
        mut shutdown_rx,
        sweep_interval,
        initial,
    } = ctx;
    let mut in_flight: JoinSet<(GatewayRequest, GatewayResponse)> = JoinSet::new();
    let mut sweep = tokio::time::interval(sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!("session loop started for room {}", room.room_id());
    dispatch(initial, &event_tx, &gateway, &mut in_flight);

    let reason = loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                break Some("session shut down".to_string());
            }

            input = input_rx.recv() => {
                match input {
                    Some(SessionInput::Command { command, reply }) => {
                        let result = room.handle_command(command, now()).map(|effects| {
                            dispatch(effects, &event_tx, &gateway, &mut in_flight);
                        });
                        state.publish(&room).await;
                        let _ = reply.send(result);
                    }
                    Some(SessionInput::Rejoin { snapshot, reply }) => {
                        in_flight.abort_all();
                        let effects = room.bootstrap(&snapshot);
                        dispatch(effects, &event_tx, &gateway, &mut in_flight);
                        state.publish(&room).await;
                        let _ = reply.send(());
                    }
                    // Input channel closed, handle dropped.
                    None => {
                        debug!("input channel closed, shutting down session loop");
                        break Some("session handle dropped".to_string());
                    }
                }
            }

            incoming = signals.recv() => {
                match incoming {
                    Some(Ok(text)) => match decode_push(&text) {
                        Ok(message) => {
                            let effects = room.handle_push(message, now());
                            dispatch(effects, &event_tx, &gateway, &mut in_flight);
                            state.publish(&room).await;
                        }
                        Err(e) => warn!("dropping push: {e}; raw: {text}"),
                    },
                    Some(Err(e)) => {
                        error!("signal channel receive error: {e}");
                        break Some(format!("signal channel receive error: {e}"));
                    }
                    None => {
                        debug!("signal channel closed");
                        break None;
                    }
                }
            }

            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                match joined {
                    Ok((request, response)) => {
                        let effects = room.handle_response(request, response, now());
                        dispatch(effects, &event_tx, &gateway, &mut in_flight);
                        state.publish(&room).await;
                    }
                    Err(join_err) if join_err.is_cancelled() => {}
                    Err(join_err) => error!("gateway call panicked: {join_err}"),
                }
            }

            _ = sweep.tick() => {
                let effects = room.sweep(now());
                if !effects.is_empty() {
                    dispatch(effects, &event_tx, &gateway, &mut in_flight);
                    state.publish(&room).await;
                }
            }
        }
    };

    in_flight.abort_all();
    room.teardown();
    state.publish(&room).await;
    if let Err(e) = signals.close().await {
        debug!("signal channel close failed: {e}");
    }
    emit_closed(&event_tx, &state, reason).await;
    debug!("session loop exited");
}

/// Publish events and start gateway calls for one step.
fn dispatch<G: RequestGateway>(
    effects: Effects,
    event_tx: &mpsc::Sender<RoomEvent>,
    gateway: &Arc<G>,
    in_flight: &mut JoinSet<(GatewayRequest, GatewayResponse)>,
) {
    for event in effects.events {
        emit_event(event_tx, event);
    }
    for request in effects.requests {
        debug!("sending {} request", request.kind());
        let gateway = Arc::clone(gateway);
        in_flight.spawn(async move {
            let response = request.send(gateway.as_ref()).await;
            (request, response)
        });
    }
}

/// Parse one push frame from the signal channel.
fn decode_push(text: &str) -> Result<SignalMessage> {
    Ok(serde_json::from_str(text)?)
}

/// Emit an event. If the channel is full, log a warning and drop the event
/// so the session loop never blocks on a slow consumer.
fn emit_event(event_tx: &mpsc::Sender<RoomEvent>, event: RoomEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {}", dropped.kind());
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit [`Closed`](RoomEvent::Closed) and mark the session as ended.
///
/// Uses `send().await` because `Closed` is always the last event on the
/// channel and must never be dropped.
async fn emit_closed(
    event_tx: &mpsc::Sender<RoomEvent>,
    state: &SessionState,
    reason: Option<String>,
) {
    state.open.store(false, Ordering::Release);
    if event_tx.send(RoomEvent::Closed { reason }).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{
        AudienceListRequest, AudienceMember, ModifySeatStateRequest, ModifyUserStateRequest,
        OwnerState, SeatInteractionRequest,
    };
    use crate::response_codes::ResponseCode;
    use async_trait::async_trait;

    /// Accepts every request.
    struct AcceptAll;

    #[async_trait]
    impl RequestGateway for AcceptAll {
        async fn seat_interaction(
            &self,
            _request: &SeatInteractionRequest,
        ) -> std::result::Result<ResponseCode, SeatError> {
            Ok(ResponseCode::Success)
        }

        async fn modify_seat_state(
            &self,
            _request: &ModifySeatStateRequest,
        ) -> std::result::Result<ResponseCode, SeatError> {
            Ok(ResponseCode::Success)
        }

        async fn modify_user_state(
            &self,
            _request: &ModifyUserStateRequest,
        ) -> std::result::Result<ResponseCode, SeatError> {
            Ok(ResponseCode::Success)
        }

        async fn audience_list(
            &self,
            _request: &AudienceListRequest,
        ) -> std::result::Result<Vec<AudienceMember>, SeatError> {
            Ok(vec![])
        }
    }

    /// Never delivers a push and never closes.
    struct Silent;

    #[async_trait]
    impl SignalChannel for Silent {
        async fn recv(&mut self) -> Option<std::result::Result<String, SeatError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), SeatError> {
            Ok(())
        }
    }

    fn snapshot() -> RoomSnapshot {
        RoomSnapshot {
            owner: OwnerState {
                user_id: "O".into(),
                user_name: "Olive".into(),
                uid: 1,
                enable_audio: true,
                enable_video: true,
            },
            seats: vec![],
        }
    }

    #[tokio::test]
    async fn start_publishes_bootstrapped_state() {
        let config = RoomConfig::new("r", "O", "Olive").with_seat_count(3);
        let (mut session, mut events) = RoomSession::start(AcceptAll, Silent, config, snapshot());

        assert!(matches!(
            events.recv().await.unwrap(),
            RoomEvent::SeatsUpdated { .. }
        ));
        assert_eq!(session.role().await, LocalRole::Owner);
        assert_eq!(session.seats().await.len(), 3);
        assert_eq!(session.owner().await.unwrap().user_id, "O");

        session.shutdown().await;
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn validation_errors_reach_the_caller() {
        let config = RoomConfig::new("r", "A", "Ann");
        let (mut session, _events) = RoomSession::start(AcceptAll, Silent, config, snapshot());
        let err = session.leave_seat().await.unwrap_err();
        assert!(matches!(
            err,
            SeatError::NotPermitted {
                role: LocalRole::Audience,
                ..
            }
        ));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn commands_after_shutdown_fail() {
        let config = RoomConfig::new("r", "A", "Ann");
        let (mut session, mut events) = RoomSession::start(AcceptAll, Silent, config, snapshot());
        session.shutdown().await;

        assert!(matches!(
            session.apply_for_seat(1).await,
            Err(SeatError::SessionClosed)
        ));

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(RoomEvent::Closed {
                reason: Some("session shut down".into())
            })
        );
    }

    #[tokio::test]
    async fn zero_sweep_interval_is_clamped() {
        let mut config = RoomConfig::new("r", "A", "Ann");
        config.sweep_interval = Duration::ZERO;
        let (mut session, mut events) = RoomSession::start(AcceptAll, Silent, config, snapshot());

        assert!(session.leave_seat().await.is_err());
        assert!(session.is_open());
        session.shutdown().await;

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(RoomEvent::Closed { .. })));
    }

    #[test]
    fn undecodable_push_is_a_serialization_error() {
        assert!(matches!(
            decode_push("{\"type\":\"SeatApplied\""),
            Err(SeatError::Serialization(_))
        ));
        assert!(matches!(
            decode_push(r#"{ "type": "SeatExploded", "data": {} }"#),
            Err(SeatError::Serialization(_))
        ));
        let message = decode_push(
            r#"{ "type": "SeatInvited", "data": { "user_id": "A", "user_name": "Ann", "seat_no": 1 } }"#,
        )
        .unwrap();
        assert_eq!(message.kind(), "SeatInvited");
    }

    #[test]
    fn debug_impl_does_not_panic() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = RoomConfig::new("r", "A", "Ann");
            let (session, _events) = RoomSession::start(AcceptAll, Silent, config, snapshot());
            let debug = format!("{session:?}");
            assert!(debug.contains("RoomSession"));
        });
    }
}
