//! # Multihost Seat Client
//!
//! Seat and role coordination core for multi-host live video rooms.
//!
//! A room has one owner and a fixed number of broadcast seats. Audience
//! members apply for seats, the owner invites members onto seats, and hosts
//! leave or are removed. This crate keeps the local view of that seat table
//! consistent while two independent channels race each other: a
//! request/response [`RequestGateway`] and a push-based [`SignalChannel`].
//!
//! ## Features
//!
//! - **Push is authoritative**: seat occupancy only changes when the signal
//!   channel says so; request acknowledgments never seat anyone
//! - **Pending handshakes**: applications and invitations are tracked per
//!   `(seat, user)` pair and end as accepted, rejected, withdrawn,
//!   superseded or server-rejected
//! - **Role derivation**: owner / host / audience is derived from the room
//!   snapshot and seat pushes; an owner is never demoted by a seat push
//! - **Serialized session**: [`RoomSession`] runs one `tokio::select!` loop
//!   over commands, pushes, gateway completions and a timeout sweep
//! - **Runtime-free core**: [`RoomState`] is synchronous and can be driven
//!   directly
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use multihost_seat_client::{
//!     RequestGateway, RoomConfig, RoomEvent, RoomSession, RoomSnapshot, SeatError,
//!     SignalChannel,
//! };
//!
//! async fn join_stage(
//!     gateway: impl RequestGateway,
//!     signals: impl SignalChannel,
//!     snapshot: RoomSnapshot,
//! ) -> Result<(), SeatError> {
//!     let config = RoomConfig::new("room-42", "user-7", "Harry");
//!     let (mut session, mut events) = RoomSession::start(gateway, signals, config, snapshot);
//!
//!     session.apply_for_seat(1).await?;
//!     while let Some(event) = events.recv().await {
//!         if let RoomEvent::Closed { .. } = event {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod event;
pub mod gateway;
pub mod interaction;
pub mod protocol;
pub mod response_codes;
pub mod role;
pub mod room;
pub mod seat_table;
#[cfg(feature = "tokio-runtime")]
pub mod session;
pub mod signal;

// Re-export primary types for ergonomic imports.
pub use error::{MalformedPush, SeatError};
pub use event::RoomEvent;
pub use gateway::{GatewayRequest, RequestGateway};
pub use interaction::{InteractionKind, InteractionOutcome, PendingInteraction, SupersedeReason};
pub use protocol::{RoomSnapshot, SeatState, SignalMessage};
pub use response_codes::ResponseCode;
pub use role::LocalRole;
pub use room::{RoomCommand, RoomConfig, RoomState};
pub use seat_table::SeatTable;
#[cfg(feature = "tokio-runtime")]
pub use session::RoomSession;
pub use signal::SignalChannel;
