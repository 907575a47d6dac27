//! Observer notifications emitted by a room session.
//!
//! Events are produced only after the seat table, role and pending pairs have
//! been updated, so a handler that reads the session state sees the change
//! the event describes.

use crate::gateway::GatewayRequest;
use crate::interaction::{InteractionOutcome, PendingInteraction};
use crate::protocol::AudienceMember;
use crate::response_codes::ResponseCode;
use crate::role::LocalRole;
use crate::seat_table::{OwnerSlot, Seat};

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// The seat list changed. Carries every seat, not just the changed ones.
    SeatsUpdated { seats: Vec<Seat> },

    /// The local actor's role changed.
    RoleChanged {
        previous: LocalRole,
        current: LocalRole,
    },

    /// The owner's identity or media flags changed.
    OwnerStateChanged { owner: OwnerSlot },

    /// A new application or invitation is waiting for an answer or a push.
    InteractionAppeared { interaction: PendingInteraction },

    /// A pending application or invitation left the pending state.
    InteractionResolved {
        interaction: PendingInteraction,
        outcome: InteractionOutcome,
    },

    /// Result of an audience-list request.
    AudienceListReceived { members: Vec<AudienceMember> },

    /// The room service refused a request that is not tied to a pending pair.
    RequestRejected {
        request: GatewayRequest,
        code: ResponseCode,
    },

    /// A request that is not tied to a pending pair could not be delivered.
    RequestFailed {
        request: GatewayRequest,
        reason: String,
    },

    /// The session ended. Always the last event.
    Closed { reason: Option<String> },
}

impl RoomEvent {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SeatsUpdated { .. } => "SeatsUpdated",
            Self::RoleChanged { .. } => "RoleChanged",
            Self::OwnerStateChanged { .. } => "OwnerStateChanged",
            Self::InteractionAppeared { .. } => "InteractionAppeared",
            Self::InteractionResolved { .. } => "InteractionResolved",
            Self::AudienceListReceived { .. } => "AudienceListReceived",
            Self::RequestRejected { .. } => "RequestRejected",
            Self::RequestFailed { .. } => "RequestFailed",
            Self::Closed { .. } => "Closed",
        }
    }
}
