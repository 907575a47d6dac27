//! Wire types shared with the room service.
//!
//! Two kinds of payload cross the boundary of this crate:
//!
//! - **Push messages** ([`SignalMessage`]) arrive as JSON text over a
//!   [`SignalChannel`](crate::signal::SignalChannel). They use the
//!   adjacently-tagged `{"type": "Variant", "data": {…}}` layout.
//! - **Requests** (`*Request` structs) are handed to a
//!   [`RequestGateway`](crate::gateway::RequestGateway), which owns the
//!   actual HTTP/RPC encoding.
//!
//! [`RoomSnapshot`] is the room-entry payload used to bootstrap a session.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// 1-based seat number. Seats are dense `1..=N`.
pub type SeatNumber = u8;

/// Identifier of a room member as issued by the room service.
pub type UserId = String;

/// Numeric identity of a member inside the media engine.
pub type RtcUid = u32;

fn enabled() -> bool {
    true
}

// ── Enums ───────────────────────────────────────────────────────────

/// Occupancy state of a numbered seat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeatState {
    /// Free for an application or invitation.
    #[default]
    Open,
    /// Blocked by the owner. Nobody may take it until it is reopened.
    Closed,
    /// Held by a host.
    Taken,
}

impl fmt::Display for SeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Taken => "taken",
        };
        f.write_str(name)
    }
}

/// Interaction kinds understood by the seat-interaction endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatInteraction {
    /// Audience asks the owner for a seat.
    Apply,
    /// Owner offers a seat to an audience member.
    Invite,
    /// Owner grants an application.
    OwnerAccept,
    /// Owner turns an application down.
    OwnerReject,
    /// Audience takes an invitation.
    AudienceAccept,
    /// Audience declines an invitation.
    AudienceReject,
    /// A host gives up their own seat.
    HostLeave,
    /// The owner removes a host from a seat.
    OwnerForceLeave,
}

/// Which members the audience list should contain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudienceFilter {
    /// Everyone in the room.
    All,
    /// Only members without a seat.
    #[default]
    Audience,
}

// ── Structs ─────────────────────────────────────────────────────────

/// Seat half of a seat update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatInfo {
    pub no: SeatNumber,
    pub state: SeatState,
}

/// Member half of a seat update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserState {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default)]
    pub uid: RtcUid,
    #[serde(default = "enabled")]
    pub enable_audio: bool,
    #[serde(default = "enabled")]
    pub enable_video: bool,
}

/// One entry of a seat list: the seat plus its occupant, if any.
///
/// `user` is only meaningful when `seat.state` is [`SeatState::Taken`]; the
/// service sometimes sends stale user data alongside open or closed seats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatUpdate {
    pub seat: SeatInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserState>,
}

impl SeatUpdate {
    /// An update marking `no` as taken by `user`.
    pub fn taken(no: SeatNumber, user: UserState) -> Self {
        Self {
            seat: SeatInfo {
                no,
                state: SeatState::Taken,
            },
            user: Some(user),
        }
    }

    /// An update marking `no` as open or closed, with no occupant.
    pub fn vacant(no: SeatNumber, state: SeatState) -> Self {
        Self {
            seat: SeatInfo { no, state },
            user: None,
        }
    }
}

/// Identity and media state of the room owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerState {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default)]
    pub uid: RtcUid,
    #[serde(default = "enabled")]
    pub enable_audio: bool,
    #[serde(default = "enabled")]
    pub enable_video: bool,
}

/// Room state returned on room entry.
///
/// Used to bootstrap the seat table and to derive the local role
/// deterministically, including after a rejoin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub owner: OwnerState,
    #[serde(default)]
    pub seats: Vec<SeatUpdate>,
}

/// Subject of an interaction push: the applicant for application events,
/// the invitee for invitation events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InteractionNotice {
    pub user_id: UserId,
    pub user_name: String,
    pub seat_no: SeatNumber,
}

/// A member returned by the audience-list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudienceMember {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default)]
    pub uid: RtcUid,
}

// ── Requests ────────────────────────────────────────────────────────

/// Apply, invite, answer, or vacate a seat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatInteractionRequest {
    pub room_id: String,
    /// The member the interaction is addressed to.
    pub user_id: UserId,
    pub seat_no: SeatNumber,
    pub interaction: SeatInteraction,
}

/// Open or close a seat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModifySeatStateRequest {
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub seat_no: SeatNumber,
    pub state: SeatState,
}

/// Change a member's audio/video/chat permissions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModifyUserStateRequest {
    pub room_id: String,
    pub user_id: UserId,
    pub enable_audio: bool,
    pub enable_video: bool,
    pub enable_chat: bool,
    /// Local write number used to pair the response with its optimistic
    /// update. Never sent.
    #[serde(skip)]
    pub sequence: u64,
}

/// Fetch candidates for an invitation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudienceListRequest {
    pub room_id: String,
    #[serde(default)]
    pub filter: AudienceFilter,
}

// ── Push messages ───────────────────────────────────────────────────

/// Push messages delivered by the signaling channel.
///
/// Pushes are authoritative: they may arrive before, after, or instead of the
/// response to a request this client sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum SignalMessage {
    /// An audience member applied for a seat (delivered to the owner).
    SeatApplied(InteractionNotice),
    /// The owner invited a member to a seat (delivered to the invitee).
    SeatInvited(InteractionNotice),
    /// The owner granted an application.
    ApplicationAccepted(InteractionNotice),
    /// The owner turned an application down.
    ApplicationRejected(InteractionNotice),
    /// The invitee took the seat.
    InvitationAccepted(InteractionNotice),
    /// The invitee declined.
    InvitationRejected(InteractionNotice),
    /// The owner's media state changed.
    OwnerStateChanged(OwnerState),
    /// Authoritative state of one or more seats.
    SeatStateChanged { seats: Vec<SeatUpdate> },
}

impl SignalMessage {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SeatApplied(_) => "SeatApplied",
            Self::SeatInvited(_) => "SeatInvited",
            Self::ApplicationAccepted(_) => "ApplicationAccepted",
            Self::ApplicationRejected(_) => "ApplicationRejected",
            Self::InvitationAccepted(_) => "InvitationAccepted",
            Self::InvitationRejected(_) => "InvitationRejected",
            Self::OwnerStateChanged(_) => "OwnerStateChanged",
            Self::SeatStateChanged { .. } => "SeatStateChanged",
        }
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
    fn user_state_media_flags_default_to_enabled() {
        let user: UserState =
            serde_json::from_str(r#"{"user_id":"u1","user_name":"Ann"}"#).unwrap();
        assert_eq!(user.uid, 0);
        assert!(user.enable_audio);
        assert!(user.enable_video);
    }

    #[test]
    fn vacant_update_omits_user() {
        let json = serde_json::to_string(&SeatUpdate::vacant(2, SeatState::Closed)).unwrap();
        assert_eq!(json, r#"{"seat":{"no":2,"state":"closed"}}"#);
    }

    #[test]
    fn close_request_omits_user_id() {
        let req = ModifySeatStateRequest {
            room_id: "r1".into(),
            user_id: None,
            seat_no: 4,
            state: SeatState::Closed,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("user_id").is_none());
        assert_eq!(value["state"], "closed");
    }

    #[test]
    fn signal_message_kind_matches_tag() {
        let msg = SignalMessage::SeatStateChanged { seats: vec![] };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.kind());
    }
}
