//! Error types for the seat coordination core.

use thiserror::Error;

use crate::interaction::InteractionKind;
use crate::protocol::{SeatNumber, SeatState, UserId};
use crate::role::LocalRole;

/// Errors returned to callers of local room actions and by collaborators.
#[derive(Debug, Error)]
pub enum SeatError {
    /// A request could not be delivered to the room service.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Failed to receive a push from the signal channel.
    #[error("signal channel receive error: {0}")]
    SignalReceive(String),

    /// Failed to serialize or deserialize a wire message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The room session has shut down.
    #[error("room session is closed")]
    SessionClosed,

    /// A room action was attempted before a snapshot was applied.
    #[error("room state has not been bootstrapped")]
    NotBootstrapped,

    /// The seat number is outside `1..=N`.
    #[error("seat {0} does not exist")]
    InvalidSeat(SeatNumber),

    /// The local role does not allow this action.
    #[error("{action} is not permitted for {role}")]
    NotPermitted {
        action: &'static str,
        role: LocalRole,
    },

    /// The seat is in the wrong state for this action.
    #[error("seat {seat} is {state}")]
    SeatUnavailable { seat: SeatNumber, state: SeatState },

    /// The member already occupies a seat (or is the owner).
    #[error("user {0} already holds a seat")]
    AlreadySeated(UserId),

    /// No member with this id is on a seat or in the owner slot.
    #[error("user {0} is not on a seat")]
    UnknownUser(UserId),

    /// There is nothing to answer or withdraw for this pair.
    #[error("no pending {kind} for user {user_id} on seat {seat}")]
    NoSuchInteraction {
        kind: InteractionKind,
        seat: SeatNumber,
        user_id: UserId,
    },
}

/// Reasons a push entry is dropped instead of applied.
///
/// These are logged and never propagated: the signal transport is not
/// schema-validated upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedPush {
    #[error("seat {seat} is outside 1..={capacity}")]
    SeatOutOfRange { seat: SeatNumber, capacity: u8 },

    #[error("seat {0} is taken but carries no occupant")]
    MissingOccupant(SeatNumber),

    #[error("owner {user_id} cannot occupy numbered seat {seat}")]
    OwnerInSeat { seat: SeatNumber, user_id: UserId },

    #[error("user {user_id} already occupies seat {occupied}, cannot also take seat {seat}")]
    DuplicateOccupant {
        seat: SeatNumber,
        occupied: SeatNumber,
        user_id: UserId,
    },

    #[error("owner state for {got} does not match room owner {expected}")]
    ForeignOwner { expected: UserId, got: UserId },
}

/// A specialized [`Result`] type for seat coordination operations.
pub type Result<T> = std::result::Result<T, SeatError>;
