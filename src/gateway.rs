//! Request/response collaborator.
//!
//! The [`RequestGateway`] trait is the narrow interface through which the
//! session sends mutation requests to the room service. The HTTP/RPC
//! encoding, authentication and base URL all live in the implementation.
//!
//! A response code is an acknowledgment, not the truth: seat occupancy only
//! changes when a push says so. User media state is the exception, where a
//! success code is treated as final.
//!
//! # Implementing a Gateway
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use multihost_seat_client::error::SeatError;
//! use multihost_seat_client::gateway::RequestGateway;
//! use multihost_seat_client::protocol::{
//!     AudienceListRequest, AudienceMember, ModifySeatStateRequest, ModifyUserStateRequest,
//!     SeatInteractionRequest,
//! };
//! use multihost_seat_client::ResponseCode;
//!
//! struct HttpGateway { /* client, base url, token */ }
//!
//! #[async_trait]
//! impl RequestGateway for HttpGateway {
//!     async fn seat_interaction(
//!         &self,
//!         request: &SeatInteractionRequest,
//!     ) -> Result<ResponseCode, SeatError> {
//!         // POST the request and map the body to a ResponseCode
//!         todo!()
//!     }
//!
//!     async fn modify_seat_state(
//!         &self,
//!         request: &ModifySeatStateRequest,
//!     ) -> Result<ResponseCode, SeatError> {
//!         todo!()
//!     }
//!
//!     async fn modify_user_state(
//!         &self,
//!         request: &ModifyUserStateRequest,
//!     ) -> Result<ResponseCode, SeatError> {
//!         todo!()
//!     }
//!
//!     async fn audience_list(
//!         &self,
//!         request: &AudienceListRequest,
//!     ) -> Result<Vec<AudienceMember>, SeatError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::{self, SeatError};
use crate::protocol::{
    AudienceListRequest, AudienceMember, ModifySeatStateRequest, ModifyUserStateRequest,
    SeatInteractionRequest,
};
use crate::response_codes::ResponseCode;

/// Sends seat and user-state requests to the room service.
///
/// Every method returns `Err` only when the request could not be delivered
/// or its response could not be read (network failure, timeout). A request
/// the service refused is `Ok` with a non-success [`ResponseCode`].
///
/// Calls run concurrently with each other and with push processing; the
/// session holds the gateway behind an `Arc`.
#[async_trait]
pub trait RequestGateway: Send + Sync + 'static {
    /// Apply, invite, answer or vacate a seat.
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::Gateway`] if the request was not delivered.
    async fn seat_interaction(
        &self,
        request: &SeatInteractionRequest,
    ) -> Result<ResponseCode, SeatError>;

    /// Open or close a seat.
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::Gateway`] if the request was not delivered.
    async fn modify_seat_state(
        &self,
        request: &ModifySeatStateRequest,
    ) -> Result<ResponseCode, SeatError>;

    /// Change a member's audio/video/chat permissions.
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::Gateway`] if the request was not delivered.
    async fn modify_user_state(
        &self,
        request: &ModifyUserStateRequest,
    ) -> Result<ResponseCode, SeatError>;

    /// Fetch invitation candidates.
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::Gateway`] if the request was not delivered.
    async fn audience_list(
        &self,
        request: &AudienceListRequest,
    ) -> Result<Vec<AudienceMember>, SeatError>;
}

/// An outbound request, as produced by the room state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayRequest {
    SeatInteraction(SeatInteractionRequest),
    ModifySeatState(ModifySeatStateRequest),
    ModifyUserState(ModifyUserStateRequest),
    AudienceList(AudienceListRequest),
}

impl GatewayRequest {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SeatInteraction(_) => "SeatInteraction",
            Self::ModifySeatState(_) => "ModifySeatState",
            Self::ModifyUserState(_) => "ModifyUserState",
            Self::AudienceList(_) => "AudienceList",
        }
    }

    /// Send this request through `gateway`.
    pub async fn send<G>(&self, gateway: &G) -> GatewayResponse
    where
        G: RequestGateway + ?Sized,
    {
        match self {
            Self::SeatInteraction(request) => {
                GatewayResponse::Code(gateway.seat_interaction(request).await)
            }
            Self::ModifySeatState(request) => {
                GatewayResponse::Code(gateway.modify_seat_state(request).await)
            }
            Self::ModifyUserState(request) => {
                GatewayResponse::Code(gateway.modify_user_state(request).await)
            }
            Self::AudienceList(request) => {
                GatewayResponse::AudienceList(gateway.audience_list(request).await)
            }
        }
    }
}

/// What came back for a [`GatewayRequest`].
#[derive(Debug)]
pub enum GatewayResponse {
    /// Reply to a seat-interaction, seat-state or user-state request.
    Code(error::Result<ResponseCode>),
    /// Reply to an audience-list request.
    AudienceList(error::Result<Vec<AudienceMember>>),
}

impl From<SeatInteractionRequest> for GatewayRequest {
    fn from(request: SeatInteractionRequest) -> Self {
        Self::SeatInteraction(request)
    }
}

impl From<ModifySeatStateRequest> for GatewayRequest {
    fn from(request: ModifySeatStateRequest) -> Self {
        Self::ModifySeatState(request)
    }
}

impl From<ModifyUserStateRequest> for GatewayRequest {
    fn from(request: ModifyUserStateRequest) -> Self {
        Self::ModifyUserState(request)
    }
}

impl From<AudienceListRequest> for GatewayRequest {
    fn from(request: AudienceListRequest) -> Self {
        Self::AudienceList(request)
    }
}
