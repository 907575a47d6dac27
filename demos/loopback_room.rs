//! # Loopback Room Example
//!
//! Shows how to implement [`RequestGateway`] and [`SignalChannel`] with an
//! in-process stand-in for the room service. The fake service answers every
//! request with `SUCCESS` and pushes the resulting seat change back through
//! the signal channel, the way a real service would. This is useful for:
//!
//! - **Testing**: exercise presentation logic without a server
//! - **Custom backends**: adapt any HTTP client and any push transport
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_room
//! ```

use async_trait::async_trait;
use multihost_seat_client::protocol::{
    AudienceListRequest, AudienceMember, ModifySeatStateRequest, ModifyUserStateRequest,
    OwnerState, RoomSnapshot, SeatInteraction, SeatInteractionRequest, SeatUpdate, SignalMessage,
    UserState,
};
use multihost_seat_client::{
    RequestGateway, ResponseCode, RoomConfig, RoomEvent, RoomSession, SeatError, SeatState,
    SignalChannel,
};
use tokio::sync::mpsc;

const ROOM: &str = "room-42";
const OWNER: &str = "owner-1";
const ME: &str = "user-7";

// ─────────────────────────────────────────────────────────────────────
// Step 1: A signal channel fed by the fake service
// ─────────────────────────────────────────────────────────────────────

/// Receives pushes the fake service writes into the paired sender.
pub struct LoopbackSignals {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl SignalChannel for LoopbackSignals {
    /// Cancel-safe because `mpsc::UnboundedReceiver::recv` is cancel-safe.
    async fn recv(&mut self) -> Option<Result<String, SeatError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SeatError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A gateway that turns requests into pushes
// ─────────────────────────────────────────────────────────────────────

/// Accepts every request and announces its effect on the signal channel.
///
/// Applications are granted on the spot, as if the owner had clicked
/// "accept" immediately.
pub struct LoopbackService {
    push: mpsc::UnboundedSender<String>,
    applicant: UserState,
}

impl LoopbackService {
    fn push(&self, message: &SignalMessage) -> Result<(), SeatError> {
        let text = serde_json::to_string(message)?;
        self.push
            .send(text)
            .map_err(|e| SeatError::Gateway(e.to_string()))
    }
}

#[async_trait]
impl RequestGateway for LoopbackService {
    async fn seat_interaction(
        &self,
        request: &SeatInteractionRequest,
    ) -> Result<ResponseCode, SeatError> {
        tracing::info!("Service received: {request:?}");
        match request.interaction {
            SeatInteraction::Apply => {
                self.push(&SignalMessage::SeatStateChanged {
                    seats: vec![SeatUpdate::taken(request.seat_no, self.applicant.clone())],
                })?;
            }
            SeatInteraction::HostLeave => {
                self.push(&SignalMessage::SeatStateChanged {
                    seats: vec![SeatUpdate::vacant(request.seat_no, SeatState::Open)],
                })?;
            }
            _ => {}
        }
        Ok(ResponseCode::Success)
    }

    async fn modify_seat_state(
        &self,
        request: &ModifySeatStateRequest,
    ) -> Result<ResponseCode, SeatError> {
        self.push(&SignalMessage::SeatStateChanged {
            seats: vec![SeatUpdate::vacant(request.seat_no, request.state)],
        })?;
        Ok(ResponseCode::Success)
    }

    async fn modify_user_state(
        &self,
        request: &ModifyUserStateRequest,
    ) -> Result<ResponseCode, SeatError> {
        tracing::info!(
            "Service received media change for {}: audio={}",
            request.user_id,
            request.enable_audio
        );
        Ok(ResponseCode::Success)
    }

    async fn audience_list(
        &self,
        _request: &AudienceListRequest,
    ) -> Result<Vec<AudienceMember>, SeatError> {
        Ok(Vec::new())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Wire the session to the fake service
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let signals = LoopbackSignals { rx: push_rx };
    let service = LoopbackService {
        push: push_tx,
        applicant: UserState {
            user_id: ME.into(),
            user_name: "Harry".into(),
            uid: 7,
            enable_audio: true,
            enable_video: true,
        },
    };

    // The snapshot a room-entry call would return.
    let snapshot = RoomSnapshot {
        owner: OwnerState {
            user_id: OWNER.into(),
            user_name: "Olive".into(),
            uid: 1,
            enable_audio: true,
            enable_video: true,
        },
        seats: Vec::new(),
    };

    let config = RoomConfig::new(ROOM, ME, "Harry");
    let (mut session, mut events) = RoomSession::start(service, signals, config, snapshot);

    session.apply_for_seat(2).await?;

    while let Some(event) = events.recv().await {
        match &event {
            RoomEvent::InteractionAppeared { interaction } => {
                tracing::info!(
                    "Event: {} pending on seat {}",
                    interaction.kind,
                    interaction.seat_number
                );
            }
            RoomEvent::RoleChanged { previous, current } => {
                tracing::info!("Event: role {previous} -> {current}");
            }
            RoomEvent::InteractionResolved {
                interaction,
                outcome,
            } => {
                tracing::info!(
                    "Event: {} on seat {} resolved as {outcome:?}",
                    interaction.kind,
                    interaction.seat_number
                );
                break;
            }
            other => tracing::info!("Event: {}", other.kind()),
        }
    }

    session.set_local_audio(false).await?;
    session.leave_seat().await?;

    while let Some(event) = events.recv().await {
        if let RoomEvent::RoleChanged { current, .. } = event {
            tracing::info!("Event: back to {current}");
            break;
        }
    }

    session.shutdown().await;
    tracing::info!("Done. Final role: {}", session.role().await);
    Ok(())
}
