#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire format tests for the seat client.
//!
//! Push fixtures mirror the JSON the room service sends over the signal
//! channel; request tests pin the field names a gateway implementation will
//! forward.

use multihost_seat_client::protocol::{
    AudienceFilter, AudienceListRequest, ModifySeatStateRequest, ModifyUserStateRequest,
    RoomSnapshot, SeatInteraction, SeatInteractionRequest, SeatState, SignalMessage,
};
use multihost_seat_client::ResponseCode;
use serde_json::json;

// ════════════════════════════════════════════════════════════════════
// Push fixtures (simulate real service JSON)
// ════════════════════════════════════════════════════════════════════

#[test]
fn fixture_seat_state_changed_from_server() {
    let json = r#"{
        "type": "SeatStateChanged",
        "data": {
            "seats": [
                {
                    "seat": { "no": 1, "state": "taken" },
                    "user": {
                        "user_id": "u-100",
                        "user_name": "Ann",
                        "uid": 4242,
                        "enable_audio": false,
                        "enable_video": true
                    }
                },
                { "seat": { "no": 2, "state": "closed" } },
                { "seat": { "no": 3, "state": "open" }, "user": null }
            ]
        }
    }"#;
    let msg: SignalMessage = serde_json::from_str(json).expect("deserialize");
    let SignalMessage::SeatStateChanged { seats } = msg else {
        panic!("expected SeatStateChanged");
    };
    assert_eq!(seats.len(), 3);
    assert_eq!(seats[0].seat.state, SeatState::Taken);
    let user = seats[0].user.as_ref().unwrap();
    assert_eq!(user.uid, 4242);
    assert!(!user.enable_audio);
    assert_eq!(seats[1].seat.state, SeatState::Closed);
    assert!(seats[1].user.is_none());
    assert!(seats[2].user.is_none());
}

#[test]
fn fixture_seat_applied_from_server() {
    let json = r#"{
        "type": "SeatApplied",
        "data": { "user_id": "u-7", "user_name": "Harry", "seat_no": 4 }
    }"#;
    let msg: SignalMessage = serde_json::from_str(json).expect("deserialize");
    let SignalMessage::SeatApplied(notice) = msg else {
        panic!("expected SeatApplied");
    };
    assert_eq!(notice.user_id, "u-7");
    assert_eq!(notice.seat_no, 4);
}

#[test]
fn fixture_answers_share_the_notice_payload() {
    for (tag, expect) in [
        ("ApplicationAccepted", "ApplicationAccepted"),
        ("ApplicationRejected", "ApplicationRejected"),
        ("InvitationAccepted", "InvitationAccepted"),
        ("InvitationRejected", "InvitationRejected"),
        ("SeatInvited", "SeatInvited"),
    ] {
        let value = json!({
            "type": tag,
            "data": { "user_id": "u-7", "user_name": "Harry", "seat_no": 2 }
        });
        let msg: SignalMessage = serde_json::from_value(value).expect(tag);
        assert_eq!(msg.kind(), expect);
    }
}

#[test]
fn fixture_owner_state_changed_defaults_media_flags() {
    let json = r#"{
        "type": "OwnerStateChanged",
        "data": { "user_id": "owner-1", "user_name": "Olive", "enable_video": false }
    }"#;
    let msg: SignalMessage = serde_json::from_str(json).expect("deserialize");
    let SignalMessage::OwnerStateChanged(owner) = msg else {
        panic!("expected OwnerStateChanged");
    };
    assert_eq!(owner.uid, 0);
    assert!(owner.enable_audio);
    assert!(!owner.enable_video);
}

#[test]
fn fixture_room_snapshot_without_seats() {
    let json = r#"{
        "owner": { "user_id": "owner-1", "user_name": "Olive", "uid": 1 }
    }"#;
    let snapshot: RoomSnapshot = serde_json::from_str(json).expect("deserialize");
    assert_eq!(snapshot.owner.user_id, "owner-1");
    assert!(snapshot.seats.is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Malformed pushes
// ════════════════════════════════════════════════════════════════════

#[test]
fn unknown_push_type_is_an_error() {
    let json = r#"{ "type": "SeatExploded", "data": {} }"#;
    assert!(serde_json::from_str::<SignalMessage>(json).is_err());
}

#[test]
fn unknown_seat_state_is_an_error() {
    let json = r#"{
        "type": "SeatStateChanged",
        "data": { "seats": [ { "seat": { "no": 1, "state": "reserved" } } ] }
    }"#;
    assert!(serde_json::from_str::<SignalMessage>(json).is_err());
}

#[test]
fn notice_without_seat_is_an_error() {
    let json = r#"{ "type": "SeatApplied", "data": { "user_id": "u", "user_name": "n" } }"#;
    assert!(serde_json::from_str::<SignalMessage>(json).is_err());
}

#[test]
fn seat_number_out_of_u8_range_is_an_error() {
    let json = r#"{ "type": "SeatInvited", "data": { "user_id": "u", "user_name": "n", "seat_no": 300 } }"#;
    assert!(serde_json::from_str::<SignalMessage>(json).is_err());
}

// ════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════

#[test]
fn seat_interaction_request_uses_snake_case_kinds() {
    let request = SeatInteractionRequest {
        room_id: "room-1".into(),
        user_id: "owner-1".into(),
        seat_no: 3,
        interaction: SeatInteraction::OwnerForceLeave,
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(
        value,
        json!({
            "room_id": "room-1",
            "user_id": "owner-1",
            "seat_no": 3,
            "interaction": "owner_force_leave"
        })
    );
}

#[test]
fn open_seat_request_omits_user_id() {
    let request = ModifySeatStateRequest {
        room_id: "room-1".into(),
        user_id: None,
        seat_no: 2,
        state: SeatState::Open,
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value, json!({ "room_id": "room-1", "seat_no": 2, "state": "open" }));
}

#[test]
fn close_taken_seat_request_names_the_occupant() {
    let request = ModifySeatStateRequest {
        room_id: "room-1".into(),
        user_id: Some("u-9".into()),
        seat_no: 5,
        state: SeatState::Closed,
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["user_id"], "u-9");
    assert_eq!(value["state"], "closed");
}

#[test]
fn user_state_request_carries_every_flag() {
    let request = ModifyUserStateRequest {
        room_id: "room-1".into(),
        user_id: "u-9".into(),
        enable_audio: false,
        enable_video: true,
        enable_chat: true,
        sequence: 7,
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["enable_audio"], false);
    assert_eq!(value["enable_video"], true);
    assert_eq!(value["enable_chat"], true);
    assert!(value.get("sequence").is_none());
}

#[test]
fn audience_list_filter_defaults_to_audience() {
    let request: AudienceListRequest =
        serde_json::from_str(r#"{ "room_id": "room-1" }"#).unwrap();
    assert_eq!(request.filter, AudienceFilter::Audience);
    let all = serde_json::to_value(AudienceFilter::All).unwrap();
    assert_eq!(all, "all");
}

// ════════════════════════════════════════════════════════════════════
// ResponseCode serialization (SCREAMING_SNAKE_CASE)
// ════════════════════════════════════════════════════════════════════

#[test]
fn response_code_serialize_screaming_snake_case() {
    let json = serde_json::to_string(&ResponseCode::NoPendingInteraction).expect("serialize");
    assert_eq!(json, "\"NO_PENDING_INTERACTION\"");
}

#[test]
fn response_code_deserialize_screaming_snake_case() {
    let code: ResponseCode = serde_json::from_str("\"SEAT_TAKEN\"").expect("deserialize");
    assert_eq!(code, ResponseCode::SeatTaken);
    assert!(!code.is_success());
}

#[test]
fn only_success_is_success() {
    assert!(ResponseCode::Success.is_success());
    assert!(!ResponseCode::InternalError.is_success());
    assert!(!ResponseCode::SeatAlreadyOpen.description().is_empty());
}
