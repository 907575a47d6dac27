//! Push-channel collaborator.
//!
//! A [`SignalChannel`] delivers the room's push messages as JSON text, one
//! [`SignalMessage`](crate::protocol::SignalMessage) per call. Connecting,
//! logging in and subscribing to the room channel happen before the channel
//! is handed to [`RoomSession::start`](crate::session::RoomSession::start).
//!
//! # Implementing a Signal Channel
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use multihost_seat_client::error::SeatError;
//! use multihost_seat_client::signal::SignalChannel;
//! use tokio::sync::mpsc;
//!
//! struct ForwardedChannel {
//!     rx: mpsc::Receiver<String>,
//! }
//!
//! #[async_trait]
//! impl SignalChannel for ForwardedChannel {
//!     async fn recv(&mut self) -> Option<Result<String, SeatError>> {
//!         self.rx.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SeatError> {
//!         self.rx.close();
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SeatError;

/// A receive-only stream of JSON push messages.
///
/// # Cancel Safety
///
/// [`recv`](SignalChannel::recv) **MUST** be cancel-safe: it is polled inside
/// `tokio::select!`, and a cancelled call must not lose a message.
/// Channel-backed implementations are naturally cancel-safe.
#[async_trait]
pub trait SignalChannel: Send + 'static {
    /// Receive the next push message.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: one complete JSON message
    /// - `Some(Err(e))`: the channel failed (e.g. [`SeatError::SignalReceive`])
    /// - `None`: the channel was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, SeatError>>;

    /// Leave the room channel and release resources.
    ///
    /// # Errors
    ///
    /// Returns an error if leaving fails. Implementations should still
    /// release resources.
    async fn close(&mut self) -> Result<(), SeatError>;
}
