//! Response codes returned by the room service's request endpoints.
//!
//! Codes serialize using `SCREAMING_SNAKE_CASE` to match the service's JSON
//! responses. Only [`ResponseCode::Success`] means the request was accepted;
//! every other code is a server-side refusal, which the coordinator reports
//! separately from a refusal by another room member.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured result of a request sent through a
/// [`RequestGateway`](crate::gateway::RequestGateway).
///
/// Use [`description()`](ResponseCode::description) for a human-readable explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    Success,

    // Authentication errors
    Unauthorized,
    InvalidToken,

    // Room errors
    RoomNotFound,
    NotInRoom,
    NotRoomOwner,

    // Seat errors
    InvalidSeat,
    SeatClosed,
    SeatTaken,
    SeatAlreadyOpen,
    AlreadySeated,
    NotSeated,
    NoPendingInteraction,
    InteractionExpired,

    // Member errors
    UserNotFound,

    // Rate limiting
    RateLimitExceeded,

    // Server errors
    InternalError,
    ServiceUnavailable,
}

impl ResponseCode {
    /// Returns `true` only for [`ResponseCode::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns a human-readable description of this response code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Success => "The request was accepted.",

            // Authentication errors
            Self::Unauthorized => "Access denied. The session credentials are missing or invalid.",
            Self::InvalidToken => {
                "The access token is invalid or has expired. Sign in again to continue."
            }

            // Room errors
            Self::RoomNotFound => "The room no longer exists.",
            Self::NotInRoom => "You are not a member of this room.",
            Self::NotRoomOwner => "Only the room owner can perform this action.",

            // Seat errors
            Self::InvalidSeat => "The seat number does not exist in this room.",
            Self::SeatClosed => "The seat has been closed by the room owner.",
            Self::SeatTaken => "Someone else is already on this seat.",
            Self::SeatAlreadyOpen => "The seat is already open.",
            Self::AlreadySeated => "This member is already on a seat.",
            Self::NotSeated => "This member is not on a seat.",
            Self::NoPendingInteraction => {
                "There is no pending application or invitation to answer."
            }
            Self::InteractionExpired => "The application or invitation has expired.",

            // Member errors
            Self::UserNotFound => "The member has left the room.",

            // Rate limiting
            Self::RateLimitExceeded => "Too many requests. Please wait a moment and try again.",

            // Server errors
            Self::InternalError => {
                "An internal server error occurred. Please try again or contact support if the issue persists."
            }
            Self::ServiceUnavailable => {
                "The service is temporarily unavailable. Please try again in a few moments."
            }
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
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

    #[test]
    fn only_success_is_success() {
        assert!(ResponseCode::Success.is_success());
        assert!(!ResponseCode::SeatTaken.is_success());
        assert!(!ResponseCode::InternalError.is_success());
    }

    #[test]
    fn serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ResponseCode::NoPendingInteraction).unwrap();
        assert_eq!(json, r#""NO_PENDING_INTERACTION""#);
        let code: ResponseCode = serde_json::from_str(r#""SEAT_CLOSED""#).unwrap();
        assert_eq!(code, ResponseCode::SeatClosed);
    }

    #[test]
    fn display_uses_description() {
        assert_eq!(
            ResponseCode::NotRoomOwner.to_string(),
            ResponseCode::NotRoomOwner.description()
        );
    }
}
