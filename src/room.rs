//! The room state machine.
//!
//! [`RoomState`] owns the seat table, the role resolver and the pending
//! interactions of one room session. It is synchronous and runtime-free:
//! every input (a local command, a push, a gateway response, a timer sweep)
//! mutates the state in place and returns [`Effects`], the events to publish
//! and the requests to send. The session loop in [`crate::session`] feeds it
//! one input at a time, in arrival order.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Result, SeatError};
use crate::event::RoomEvent;
use crate::gateway::{GatewayRequest, GatewayResponse};
use crate::interaction::{
    ActionContext, InteractionCoordinator, InteractionKind, InteractionOutcome, Resolution,
    ResponseEffect,
};
use crate::protocol::{
    AudienceFilter, AudienceListRequest, InteractionNotice, ModifyUserStateRequest, OwnerState,
    RoomSnapshot, SeatNumber, SeatUpdate, SignalMessage, UserId,
};
use crate::response_codes::ResponseCode;
use crate::role::{LocalRole, RoleChange, RoleResolver};
use crate::seat_table::{MediaFlags, MuteTarget, SeatDelta, SeatTable};

/// Default number of numbered seats.
const DEFAULT_SEAT_COUNT: u8 = 6;

/// Default time a pending interaction may wait for a push or an answer.
const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay before resending a request that failed in transit.
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Default period of the timeout/retry sweep.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Smallest accepted sweep period.
pub(crate) const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for one room session.
///
/// The room id and the local user's identity are required; everything else
/// has a default.
///
/// # Example
///
/// ```
/// use multihost_seat_client::room::RoomConfig;
/// use std::time::Duration;
///
/// let config = RoomConfig::new("room-42", "user-7", "Harry")
///     .with_seat_count(4)
///     .with_pending_timeout(Duration::from_secs(15));
/// assert_eq!(config.seat_count, 4);
/// assert_eq!(config.event_channel_capacity, 256);
/// ```
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Room the session is bound to.
    pub room_id: String,
    /// Identity of the local actor.
    pub local_user_id: UserId,
    /// Display name of the local actor, used for local applications.
    pub local_user_name: String,
    /// Number of numbered seats (N). Defaults to **6**; clamped to at least 1.
    pub seat_count: u8,
    /// How long an application or invitation may stay pending before it is
    /// superseded with a timeout. Requests that failed in transit are retried
    /// within this window. Defaults to **30 seconds**.
    pub pending_timeout: Duration,
    /// Delay before a failed seat-interaction request is resent.
    /// Defaults to **2 seconds**.
    pub retry_interval: Duration,
    /// Period of the timeout/retry sweep. Defaults to **500 ms**.
    pub sweep_interval: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events are dropped with a warning.
    /// The final `Closed` event is always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the session task is given to close the signal channel and emit
    /// `Closed` on shutdown before it is aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl RoomConfig {
    /// Create a configuration with default tunables.
    pub fn new(
        room_id: impl Into<String>,
        local_user_id: impl Into<UserId>,
        local_user_name: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            local_user_id: local_user_id.into(),
            local_user_name: local_user_name.into(),
            seat_count: DEFAULT_SEAT_COUNT,
            pending_timeout: DEFAULT_PENDING_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the number of seats. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_seat_count(mut self, seat_count: u8) -> Self {
        self.seat_count = seat_count.max(1);
        self
    }

    /// Set the pending-interaction timeout.
    #[must_use]
    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    /// Set the retry delay for requests that failed in transit.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the sweep period. Values below 1 ms are clamped to 1 ms.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(MIN_SWEEP_INTERVAL);
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Commands and effects ────────────────────────────────────────────

/// Local actions issued by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCommand {
    /// Audience: ask the owner for an open seat.
    ApplyForSeat { seat: SeatNumber },
    /// Owner: offer an open seat to an audience member.
    Invite {
        user_id: UserId,
        user_name: String,
        seat: SeatNumber,
    },
    /// Owner: grant a pending application.
    AcceptApplication { seat: SeatNumber, user_id: UserId },
    /// Owner: turn a pending application down.
    RejectApplication { seat: SeatNumber, user_id: UserId },
    /// Audience: take a pending invitation.
    AcceptInvitation { seat: SeatNumber },
    /// Audience: decline a pending invitation.
    RejectInvitation { seat: SeatNumber },
    /// Audience: take back the local application.
    WithdrawApplication { seat: SeatNumber },
    /// Owner: take back an invitation.
    WithdrawInvitation { seat: SeatNumber, user_id: UserId },
    /// Host: give up the local seat.
    LeaveSeat,
    /// Owner: remove the host from a seat.
    ForceLeave { seat: SeatNumber },
    /// Owner: reopen a closed seat.
    OpenSeat { seat: SeatNumber },
    /// Owner: close a seat.
    CloseSeat { seat: SeatNumber },
    /// Owner or host: toggle the local microphone.
    SetLocalAudio { enabled: bool },
    /// Owner or host: toggle the local camera.
    SetLocalVideo { enabled: bool },
    /// Owner: mute or unmute the host on a seat.
    SetHostAudio { seat: SeatNumber, enabled: bool },
    /// Owner: fetch invitation candidates.
    RequestAudienceList { filter: AudienceFilter },
}

impl RoomCommand {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApplyForSeat { .. } => "ApplyForSeat",
            Self::Invite { .. } => "Invite",
            Self::AcceptApplication { .. } => "AcceptApplication",
            Self::RejectApplication { .. } => "RejectApplication",
            Self::AcceptInvitation { .. } => "AcceptInvitation",
            Self::RejectInvitation { .. } => "RejectInvitation",
            Self::WithdrawApplication { .. } => "WithdrawApplication",
            Self::WithdrawInvitation { .. } => "WithdrawInvitation",
            Self::LeaveSeat => "LeaveSeat",
            Self::ForceLeave { .. } => "ForceLeave",
            Self::OpenSeat { .. } => "OpenSeat",
            Self::CloseSeat { .. } => "CloseSeat",
            Self::SetLocalAudio { .. } => "SetLocalAudio",
            Self::SetLocalVideo { .. } => "SetLocalVideo",
            Self::SetHostAudio { .. } => "SetHostAudio",
            Self::RequestAudienceList { .. } => "RequestAudienceList",
        }
    }
}

/// Output of one state-machine step.
#[derive(Debug, Default)]
pub struct Effects {
    /// Notifications, in the order they should be published.
    pub events: Vec<RoomEvent>,
    /// Requests to hand to the gateway.
    pub requests: Vec<GatewayRequest>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.requests.is_empty()
    }

    fn request(request: impl Into<GatewayRequest>) -> Self {
        Self {
            events: Vec::new(),
            requests: vec![request.into()],
        }
    }
}

/// An optimistic media write waiting for its user-state response.
#[derive(Debug, Clone)]
struct MuteRecord {
    sequence: u64,
    user_id: UserId,
    previous: MediaFlags,
    requested: MediaFlags,
}

impl MuteRecord {
    fn answers(&self, request: &ModifyUserStateRequest) -> bool {
        self.sequence == request.sequence && self.user_id == request.user_id
    }
}

// ── Room state ──────────────────────────────────────────────────────

/// All mutable state of one room session.
#[derive(Debug, Clone)]
pub struct RoomState {
    room_id: String,
    local_user_id: UserId,
    local_user_name: String,
    table: SeatTable,
    roles: RoleResolver,
    interactions: InteractionCoordinator,
    mutes: Vec<MuteRecord>,
    mute_sequence: u64,
    bootstrapped: bool,
}

impl RoomState {
    pub fn new(config: &RoomConfig) -> Self {
        Self {
            room_id: config.room_id.clone(),
            local_user_id: config.local_user_id.clone(),
            local_user_name: config.local_user_name.clone(),
            table: SeatTable::new(config.seat_count),
            roles: RoleResolver::new(config.local_user_id.clone()),
            interactions: InteractionCoordinator::new(
                config.pending_timeout,
                config.retry_interval,
            ),
            mutes: Vec::new(),
            mute_sequence: 0,
            bootstrapped: false,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    pub fn role(&self) -> LocalRole {
        self.roles.role()
    }

    pub fn table(&self) -> &SeatTable {
        &self.table
    }

    pub fn interactions(&self) -> &InteractionCoordinator {
        &self.interactions
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Load a room-entry snapshot, on first entry or on rejoin.
    ///
    /// Pending interactions and optimistic media writes from a previous entry
    /// are discarded without notifying anyone.
    pub fn bootstrap(&mut self, snapshot: &RoomSnapshot) -> Effects {
        let dropped = self.interactions.clear();
        self.mutes.clear();
        if dropped > 0 {
            debug!("bootstrap discarded {dropped} pending interaction(s)");
        }

        self.table.bootstrap(snapshot);
        self.bootstrapped = true;

        let mut effects = Effects::default();
        effects.events.push(self.seats_event());
        if let Some(owner) = self.table.owner() {
            effects.events.push(RoomEvent::OwnerStateChanged {
                owner: owner.clone(),
            });
        }
        if let Some(change) = self.roles.bootstrap(&self.table) {
            effects.events.push(role_event(change));
        }
        debug!(
            "room {} bootstrapped as {} for {}",
            self.room_id,
            self.roles.role(),
            self.local_user_id
        );
        effects
    }

    /// Drop all pending state when the session ends.
    pub fn teardown(&mut self) {
        let dropped = self.interactions.clear();
        self.mutes.clear();
        debug!(
            "room {} torn down, {dropped} pending interaction(s) discarded",
            self.room_id
        );
    }

    // ── Local commands ──────────────────────────────────────────────

    /// Validate a local action and produce its request.
    ///
    /// # Errors
    ///
    /// Returns [`SeatError::NotBootstrapped`] before the first snapshot, and a
    /// validation error if the role or the seat state does not allow the
    /// action. Nothing is mutated on error.
    pub fn handle_command(&mut self, command: RoomCommand, now: Instant) -> Result<Effects> {
        if !self.bootstrapped {
            return Err(SeatError::NotBootstrapped);
        }
        debug!("command {} as {}", command.kind(), self.roles.role());

        let ctx = ActionContext {
            room_id: &self.room_id,
            local_user_id: &self.local_user_id,
            local_user_name: &self.local_user_name,
            role: self.roles.role(),
            table: &self.table,
        };

        let effects = match command {
            RoomCommand::ApplyForSeat { seat } => {
                let request = self.interactions.apply(&ctx, seat, now)?;
                self.appeared(seat, &self.local_user_id, request)
            }
            RoomCommand::Invite {
                user_id,
                user_name,
                seat,
            } => {
                let request = self
                    .interactions
                    .invite(&ctx, &user_id, &user_name, seat, now)?;
                self.appeared(seat, &user_id, request)
            }
            RoomCommand::AcceptApplication { seat, user_id } => Effects::request(
                self.interactions
                    .answer_application(&ctx, seat, &user_id, true)?,
            ),
            RoomCommand::RejectApplication { seat, user_id } => Effects::request(
                self.interactions
                    .answer_application(&ctx, seat, &user_id, false)?,
            ),
            RoomCommand::AcceptInvitation { seat } => {
                Effects::request(self.interactions.answer_invitation(&ctx, seat, true)?)
            }
            RoomCommand::RejectInvitation { seat } => {
                Effects::request(self.interactions.answer_invitation(&ctx, seat, false)?)
            }
            RoomCommand::WithdrawApplication { seat } => {
                let resolution = self.interactions.withdraw(
                    InteractionKind::Application,
                    seat,
                    &self.local_user_id,
                )?;
                resolved(resolution)
            }
            RoomCommand::WithdrawInvitation { seat, user_id } => {
                ctx.require(LocalRole::Owner, "withdrawing an invitation")?;
                let resolution =
                    self.interactions
                        .withdraw(InteractionKind::Invitation, seat, &user_id)?;
                resolved(resolution)
            }
            RoomCommand::LeaveSeat => Effects::request(self.interactions.leave_seat(&ctx)?),
            RoomCommand::ForceLeave { seat } => {
                Effects::request(self.interactions.force_leave(&ctx, seat)?)
            }
            RoomCommand::OpenSeat { seat } => {
                Effects::request(self.interactions.open_seat(&ctx, seat)?)
            }
            RoomCommand::CloseSeat { seat } => {
                Effects::request(self.interactions.close_seat(&ctx, seat)?)
            }
            RoomCommand::SetLocalAudio { enabled } => self.set_local_media(Some(enabled), None)?,
            RoomCommand::SetLocalVideo { enabled } => self.set_local_media(None, Some(enabled))?,
            RoomCommand::SetHostAudio { seat, enabled } => self.set_host_audio(seat, enabled)?,
            RoomCommand::RequestAudienceList { filter } => {
                ctx.require(LocalRole::Owner, "listing the audience")?;
                Effects::request(AudienceListRequest {
                    room_id: self.room_id.clone(),
                    filter,
                })
            }
        };
        Ok(self.with_displaced(effects))
    }

    fn appeared(
        &self,
        seat: SeatNumber,
        user_id: &str,
        request: impl Into<GatewayRequest>,
    ) -> Effects {
        let mut effects = Effects::request(request);
        if let Some(interaction) = self.interactions.get(seat, user_id) {
            effects.events.push(RoomEvent::InteractionAppeared {
                interaction: interaction.clone(),
            });
        }
        effects
    }

    fn set_local_media(&mut self, audio: Option<bool>, video: Option<bool>) -> Result<Effects> {
        let role = self.roles.role();
        if !role.is_broadcaster() {
            return Err(SeatError::NotPermitted {
                action: "changing local media",
                role,
            });
        }
        let user_id = self.local_user_id.clone();
        self.optimistic_mute(user_id, audio, video)
    }

    fn set_host_audio(&mut self, seat: SeatNumber, enabled: bool) -> Result<Effects> {
        let role = self.roles.role();
        if role != LocalRole::Owner {
            return Err(SeatError::NotPermitted {
                action: "muting a host",
                role,
            });
        }
        let target = self.table.seat(seat).ok_or(SeatError::InvalidSeat(seat))?;
        let occupant = target
            .occupant
            .as_ref()
            .ok_or(SeatError::SeatUnavailable {
                seat,
                state: target.state,
            })?;
        let user_id = occupant.user_id.clone();
        self.optimistic_mute(user_id, Some(enabled), None)
    }

    /// Write the requested flags locally and build the user-state request.
    ///
    /// The request always carries both flags; the untouched one keeps its
    /// current value. Only the newest write per user can be rolled back.
    fn optimistic_mute(
        &mut self,
        user_id: UserId,
        audio: Option<bool>,
        video: Option<bool>,
    ) -> Result<Effects> {
        let previous = self
            .table
            .set_mute(MuteTarget::User(&user_id), audio, video)
            .ok_or_else(|| SeatError::UnknownUser(user_id.clone()))?;
        let requested = MediaFlags {
            audio_enabled: audio.unwrap_or(previous.audio_enabled),
            video_enabled: video.unwrap_or(previous.video_enabled),
        };
        debug!(
            "optimistic media for {user_id}: audio={} video={}",
            requested.audio_enabled, requested.video_enabled
        );

        self.mute_sequence = self.mute_sequence.wrapping_add(1);
        let sequence = self.mute_sequence;
        let request = ModifyUserStateRequest {
            room_id: self.room_id.clone(),
            user_id: user_id.clone(),
            enable_audio: requested.audio_enabled,
            enable_video: requested.video_enabled,
            enable_chat: true,
            sequence,
        };
        let mut effects = Effects::request(request);
        effects.events.push(self.media_event(&user_id));
        self.mutes.retain(|record| record.user_id != user_id);
        self.mutes.push(MuteRecord {
            sequence,
            user_id,
            previous,
            requested,
        });
        Ok(effects)
    }

    // ── Pushes ──────────────────────────────────────────────────────

    /// Apply one authoritative push.
    ///
    /// Malformed or stale pushes are logged and produce no effects.
    pub fn handle_push(&mut self, message: SignalMessage, now: Instant) -> Effects {
        if !self.bootstrapped {
            warn!("dropping {} push received before bootstrap", message.kind());
            return Effects::default();
        }
        debug!("push {}", message.kind());

        match message {
            SignalMessage::SeatStateChanged { seats } => {
                let deltas = self.table.apply_batch(&seats);
                self.after_seat_change(&deltas)
            }
            SignalMessage::SeatApplied(notice) => {
                self.remote_offer(InteractionKind::Application, &notice, now)
            }
            SignalMessage::SeatInvited(notice) => {
                self.remote_offer(InteractionKind::Invitation, &notice, now)
            }
            SignalMessage::ApplicationAccepted(notice) => {
                self.remote_answer(InteractionKind::Application, &notice, true)
            }
            SignalMessage::ApplicationRejected(notice) => {
                self.remote_answer(InteractionKind::Application, &notice, false)
            }
            SignalMessage::InvitationAccepted(notice) => {
                self.remote_answer(InteractionKind::Invitation, &notice, true)
            }
            SignalMessage::InvitationRejected(notice) => {
                self.remote_answer(InteractionKind::Invitation, &notice, false)
            }
            SignalMessage::OwnerStateChanged(state) => self.owner_changed(&state),
        }
    }

    fn remote_offer(
        &mut self,
        kind: InteractionKind,
        notice: &InteractionNotice,
        now: Instant,
    ) -> Effects {
        let ctx = ActionContext {
            room_id: &self.room_id,
            local_user_id: &self.local_user_id,
            local_user_name: &self.local_user_name,
            role: self.roles.role(),
            table: &self.table,
        };
        let mut effects = Effects::default();
        if let Some(interaction) = self.interactions.on_remote_offer(&ctx, kind, notice, now) {
            effects
                .events
                .push(RoomEvent::InteractionAppeared { interaction });
        }
        self.with_displaced(effects)
    }

    /// Publish pairs replaced by this step ahead of its own events.
    fn with_displaced(&mut self, mut effects: Effects) -> Effects {
        let displaced = self.interactions.take_displaced();
        if !displaced.is_empty() {
            let mut events: Vec<RoomEvent> = displaced.into_iter().map(resolved_event).collect();
            events.append(&mut effects.events);
            effects.events = events;
        }
        effects
    }

    /// An accept for a tracked pair seats its subject, unless a seat push
    /// already has.
    fn remote_answer(
        &mut self,
        kind: InteractionKind,
        notice: &InteractionNotice,
        accepted: bool,
    ) -> Effects {
        let Some(resolution) = self.interactions.on_remote_answer(kind, notice, accepted) else {
            return Effects::default();
        };

        let mut effects = Effects::default();
        if let Some(update) = resolution.occupancy() {
            let already_seated = self
                .table
                .seat(update.seat.no)
                .is_some_and(|seat| seat.is_held_by(&resolution.interaction.user_id));
            if !already_seated {
                if let Some(delta) = self.table.apply_push(&update) {
                    effects = self.after_seat_change(std::slice::from_ref(&delta));
                }
            }
        }
        effects.events.push(resolved_event(resolution));
        effects
    }

    fn owner_changed(&mut self, state: &OwnerState) -> Effects {
        let mut effects = Effects::default();
        match self.table.set_owner_state(state) {
            Ok(owner) => {
                let owner = owner.clone();
                self.mutes.retain(|record| record.user_id != owner.user_id);
                effects.events.push(RoomEvent::OwnerStateChanged { owner });
            }
            Err(e) => warn!("dropping owner state push: {e}"),
        }
        effects
    }

    /// Reconcile roles, pending pairs and optimistic writes with applied
    /// seat deltas.
    fn after_seat_change(&mut self, deltas: &[SeatDelta]) -> Effects {
        let mut effects = Effects::default();
        if deltas.is_empty() {
            return effects;
        }

        self.mutes
            .retain(|record| !deltas.iter().any(|delta| delta.involves(&record.user_id)));

        if deltas.iter().any(SeatDelta::changed) {
            effects.events.push(self.seats_event());
        }
        if let Some(change) = self.roles.reconcile(&self.table) {
            effects.events.push(role_event(change));
        }
        for delta in deltas {
            let Some(seat) = self.table.seat(delta.number) else {
                continue;
            };
            for resolution in self.interactions.reconcile_seat(seat) {
                effects.events.push(resolved_event(resolution));
            }
        }
        effects
    }

    // ── Responses ───────────────────────────────────────────────────

    /// Apply the response to a request this session sent.
    pub fn handle_response(
        &mut self,
        request: GatewayRequest,
        response: GatewayResponse,
        now: Instant,
    ) -> Effects {
        match (request, response) {
            (GatewayRequest::SeatInteraction(sent), GatewayResponse::Code(result)) => {
                let effect = self
                    .interactions
                    .on_response(&self.local_user_id, &sent, &result, now);
                match effect {
                    ResponseEffect::Resolved(resolution) => {
                        if let InteractionOutcome::ServerRejected(code) = resolution.outcome {
                            warn!(
                                "{:?} on seat {} rejected by server: {code}",
                                sent.interaction, sent.seat_no
                            );
                        }
                        resolved(resolution)
                    }
                    ResponseEffect::Acknowledged | ResponseEffect::RetryScheduled => {
                        Effects::default()
                    }
                    ResponseEffect::Untracked => {
                        unconfirmed(GatewayRequest::SeatInteraction(sent), result)
                    }
                }
            }
            (GatewayRequest::ModifySeatState(sent), GatewayResponse::Code(result)) => {
                unconfirmed(GatewayRequest::ModifySeatState(sent), result)
            }
            (GatewayRequest::ModifyUserState(sent), GatewayResponse::Code(result)) => {
                self.user_state_response(sent, result)
            }
            (GatewayRequest::AudienceList(sent), GatewayResponse::AudienceList(result)) => {
                match result {
                    Ok(members) => {
                        debug!("audience list: {} member(s)", members.len());
                        Effects {
                            events: vec![RoomEvent::AudienceListReceived { members }],
                            requests: Vec::new(),
                        }
                    }
                    Err(e) => failed(GatewayRequest::AudienceList(sent), &e),
                }
            }
            (request, response) => {
                warn!(
                    "ignoring mismatched response for {}: {response:?}",
                    request.kind()
                );
                Effects::default()
            }
        }
    }

    /// A success code confirms a user-state change; anything else rolls the
    /// optimistic write back, unless a push touched that user meanwhile.
    fn user_state_response(
        &mut self,
        sent: ModifyUserStateRequest,
        result: Result<ResponseCode>,
    ) -> Effects {
        let record = self
            .mutes
            .iter()
            .position(|record| record.answers(&sent))
            .map(|index| self.mutes.remove(index));

        if matches!(result, Ok(code) if code.is_success()) {
            debug!("media state for {} confirmed", sent.user_id);
            return Effects::default();
        }

        let mut effects = match result {
            Ok(code) => {
                warn!("media change for {} rejected by server: {code}", sent.user_id);
                rejected(GatewayRequest::ModifyUserState(sent), code)
            }
            Err(e) => failed(GatewayRequest::ModifyUserState(sent), &e),
        };
        if let Some(record) = record {
            if self.rollback(&record) {
                effects.events.insert(0, self.media_event(&record.user_id));
            }
        }
        effects
    }

    fn rollback(&mut self, record: &MuteRecord) -> bool {
        let target = MuteTarget::User(&record.user_id);
        if self.table.media_of(target) != Some(record.requested) {
            return false;
        }
        self.table.set_mute(
            target,
            Some(record.previous.audio_enabled),
            Some(record.previous.video_enabled),
        );
        debug!("rolled back media state for {}", record.user_id);
        true
    }

    // ── Timers ──────────────────────────────────────────────────────

    /// Expire stale pending pairs and resend due retries.
    pub fn sweep(&mut self, now: Instant) -> Effects {
        let mut effects = Effects::default();
        for resolution in self.interactions.expire(now) {
            debug!(
                "{} for {} on seat {} timed out",
                resolution.interaction.kind,
                resolution.interaction.user_id,
                resolution.interaction.seat_number
            );
            effects.events.push(resolved_event(resolution));
        }
        effects.requests.extend(
            self.interactions
                .due_retries(now)
                .into_iter()
                .map(GatewayRequest::from),
        );
        effects
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn seats_event(&self) -> RoomEvent {
        RoomEvent::SeatsUpdated {
            seats: self.table.seats().to_vec(),
        }
    }

    fn media_event(&self, user_id: &str) -> RoomEvent {
        match self.table.owner() {
            Some(owner) if owner.user_id == user_id => RoomEvent::OwnerStateChanged {
                owner: owner.clone(),
            },
            _ => self.seats_event(),
        }
    }
}

fn role_event(change: RoleChange) -> RoomEvent {
    RoomEvent::RoleChanged {
        previous: change.previous,
        current: change.current,
    }
}

fn resolved_event(resolution: Resolution) -> RoomEvent {
    RoomEvent::InteractionResolved {
        interaction: resolution.interaction,
        outcome: resolution.outcome,
    }
}

fn resolved(resolution: Resolution) -> Effects {
    Effects {
        events: vec![resolved_event(resolution)],
        requests: Vec::new(),
    }
}

fn rejected(request: GatewayRequest, code: ResponseCode) -> Effects {
    Effects {
        events: vec![RoomEvent::RequestRejected { request, code }],
        requests: Vec::new(),
    }
}

fn failed(request: GatewayRequest, error: &SeatError) -> Effects {
    warn!("{} request failed: {error}", request.kind());
    Effects {
        events: vec![RoomEvent::RequestFailed {
            request,
            reason: error.to_string(),
        }],
        requests: Vec::new(),
    }
}

/// Response to a request whose effect only a push can confirm.
fn unconfirmed(request: GatewayRequest, result: Result<ResponseCode>) -> Effects {
    match result {
        Ok(code) if code.is_success() => {
            debug!("{} acknowledged, waiting for push", request.kind());
            Effects::default()
        }
        Ok(code) => {
            warn!("{} rejected by server: {code}", request.kind());
            rejected(request, code)
        }
        Err(e) => failed(request, &e),
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
    use crate::interaction::SupersedeReason;
    use crate::protocol::{SeatInteraction, SeatState, UserState};

    fn owner_state(id: &str) -> OwnerState {
        OwnerState {
            user_id: id.into(),
            user_name: "Olive".into(),
            uid: 1,
            enable_audio: true,
            enable_video: true,
        }
    }

    fn user(id: &str, name: &str) -> UserState {
        UserState {
            user_id: id.into(),
            user_name: name.into(),
            uid: 42,
            enable_audio: true,
            enable_video: true,
        }
    }

    fn notice(user_id: &str, user_name: &str, seat_no: u8) -> InteractionNotice {
        InteractionNotice {
            user_id: user_id.into(),
            user_name: user_name.into(),
            seat_no,
        }
    }

    fn joined(me: &str, seats: u8, taken: &[(u8, &str)]) -> RoomState {
        let config = RoomConfig::new("room-1", me, "Harry").with_seat_count(seats);
        let mut room = RoomState::new(&config);
        room.bootstrap(&RoomSnapshot {
            owner: owner_state("O"),
            seats: taken
                .iter()
                .map(|(no, id)| SeatUpdate::taken(*no, user(id, id)))
                .collect(),
        });
        room
    }

    fn only_request(effects: &Effects) -> &GatewayRequest {
        assert_eq!(effects.requests.len(), 1);
        &effects.requests[0]
    }

    fn outcomes(effects: &Effects) -> Vec<InteractionOutcome> {
        effects
            .events
            .iter()
            .filter_map(|event| match event {
                RoomEvent::InteractionResolved { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn config_defaults_and_clamping() {
        let config = RoomConfig::new("r", "u", "n")
            .with_seat_count(0)
            .with_event_channel_capacity(0)
            .with_sweep_interval(Duration::ZERO);
        assert_eq!(config.seat_count, 1);
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.sweep_interval, MIN_SWEEP_INTERVAL);
        assert_eq!(RoomConfig::new("r", "u", "n").pending_timeout, DEFAULT_PENDING_TIMEOUT);
    }

    #[test]
    fn commands_before_bootstrap_fail() {
        let mut room = RoomState::new(&RoomConfig::new("r", "u", "n"));
        let err = room
            .handle_command(RoomCommand::ApplyForSeat { seat: 1 }, Instant::now())
            .unwrap_err();
        assert!(matches!(err, SeatError::NotBootstrapped));
    }

    #[test]
    fn bootstrap_emits_seats_owner_and_role() {
        let config = RoomConfig::new("r", "H", "Harry").with_seat_count(2);
        let mut room = RoomState::new(&config);
        let effects = room.bootstrap(&RoomSnapshot {
            owner: owner_state("O"),
            seats: vec![SeatUpdate::taken(2, user("H", "Harry"))],
        });
        assert!(matches!(effects.events[0], RoomEvent::SeatsUpdated { .. }));
        assert!(matches!(effects.events[1], RoomEvent::OwnerStateChanged { .. }));
        assert_eq!(
            effects.events[2],
            RoomEvent::RoleChanged {
                previous: LocalRole::Audience,
                current: LocalRole::Host
            }
        );
    }

    #[test]
    fn accepted_application_makes_local_user_host() {
        let mut room = joined("H", 2, &[]);
        let now = Instant::now();
        let effects = room
            .handle_command(RoomCommand::ApplyForSeat { seat: 1 }, now)
            .unwrap();
        assert!(matches!(
            only_request(&effects),
            GatewayRequest::SeatInteraction(r)
                if r.interaction == SeatInteraction::Apply && r.user_id == "O"
        ));
        assert!(matches!(
            effects.events[0],
            RoomEvent::InteractionAppeared { .. }
        ));

        let effects = room.handle_push(
            SignalMessage::ApplicationAccepted(notice("H", "Harry", 1)),
            now,
        );
        assert_eq!(room.role(), LocalRole::Host);
        assert!(room.table().seat(1).unwrap().is_held_by("H"));
        assert!(room.interactions().is_empty());
        assert_eq!(outcomes(&effects), vec![InteractionOutcome::Accepted]);
        assert!(effects.events.contains(&RoomEvent::RoleChanged {
            previous: LocalRole::Audience,
            current: LocalRole::Host
        }));
    }

    #[test]
    fn seat_taken_by_other_supersedes_application() {
        let mut room = joined("H", 2, &[]);
        let now = Instant::now();
        room.handle_command(RoomCommand::ApplyForSeat { seat: 2 }, now)
            .unwrap();

        let effects = room.handle_push(
            SignalMessage::SeatStateChanged {
                seats: vec![SeatUpdate::taken(2, user("U2", "Una"))],
            },
            now,
        );
        assert_eq!(
            outcomes(&effects),
            vec![InteractionOutcome::Superseded(SupersedeReason::SeatTaken {
                by: "U2".into()
            })]
        );
        assert_eq!(room.role(), LocalRole::Audience);
        assert!(room.interactions().is_empty());
    }

    #[test]
    fn closed_seat_supersedes_instead_of_rejecting() {
        let mut room = joined("U", 3, &[]);
        let now = Instant::now();
        room.handle_command(RoomCommand::ApplyForSeat { seat: 3 }, now)
            .unwrap();
        let effects = room.handle_push(
            SignalMessage::SeatStateChanged {
                seats: vec![SeatUpdate::vacant(3, SeatState::Closed)],
            },
            now,
        );
        assert_eq!(
            outcomes(&effects),
            vec![InteractionOutcome::Superseded(SupersedeReason::SeatClosed)]
        );
    }

    #[test]
    fn stale_answer_is_ignored() {
        let mut room = joined("H", 2, &[]);
        let effects = room.handle_push(
            SignalMessage::ApplicationRejected(notice("H", "Harry", 1)),
            Instant::now(),
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn owner_stays_owner_through_seat_pushes() {
        let mut room = joined("O", 2, &[]);
        assert_eq!(room.role(), LocalRole::Owner);
        let effects = room.handle_push(
            SignalMessage::SeatStateChanged {
                seats: vec![
                    SeatUpdate::taken(1, user("A", "Ann")),
                    SeatUpdate::vacant(2, SeatState::Closed),
                ],
            },
            Instant::now(),
        );
        assert_eq!(room.role(), LocalRole::Owner);
        assert!(!effects
            .events
            .iter()
            .any(|e| matches!(e, RoomEvent::RoleChanged { .. })));
    }

    #[test]
    fn mute_success_is_final_without_push() {
        let mut room = joined("H", 2, &[(1, "H")]);
        let now = Instant::now();
        let effects = room
            .handle_command(RoomCommand::SetLocalAudio { enabled: false }, now)
            .unwrap();
        let request = only_request(&effects).clone();
        match &request {
            GatewayRequest::ModifyUserState(r) => {
                assert!(!r.enable_audio);
                assert!(r.enable_video);
                assert!(r.enable_chat);
            }
            other => panic!("unexpected request {other:?}"),
        }

        room.handle_response(
            request,
            GatewayResponse::Code(Ok(ResponseCode::Success)),
            now,
        );
        room.sweep(now + Duration::from_secs(120));
        let media = room.table().media_of(MuteTarget::User("H")).unwrap();
        assert!(!media.audio_enabled);
    }

    #[test]
    fn failed_mute_rolls_back() {
        let mut room = joined("H", 2, &[(1, "H")]);
        let now = Instant::now();
        let effects = room
            .handle_command(RoomCommand::SetLocalVideo { enabled: false }, now)
            .unwrap();
        let request = only_request(&effects).clone();
        let effects = room.handle_response(
            request,
            GatewayResponse::Code(Err(SeatError::Gateway("timeout".into()))),
            now,
        );
        assert!(room
            .table()
            .media_of(MuteTarget::User("H"))
            .unwrap()
            .video_enabled);
        assert!(matches!(effects.events[0], RoomEvent::SeatsUpdated { .. }));
        assert!(matches!(effects.events[1], RoomEvent::RequestFailed { .. }));
    }

    #[test]
    fn push_between_mute_and_failure_prevents_rollback() {
        let mut room = joined("H", 2, &[(1, "H")]);
        let now = Instant::now();
        let effects = room
            .handle_command(RoomCommand::SetLocalAudio { enabled: false }, now)
            .unwrap();
        let request = only_request(&effects).clone();

        let mut muted = user("H", "H");
        muted.enable_audio = false;
        room.handle_push(
            SignalMessage::SeatStateChanged {
                seats: vec![SeatUpdate::taken(1, muted)],
            },
            now,
        );
        room.handle_response(
            request,
            GatewayResponse::Code(Ok(ResponseCode::InternalError)),
            now,
        );
        assert!(!room
            .table()
            .media_of(MuteTarget::User("H"))
            .unwrap()
            .audio_enabled);
    }

    #[test]
    fn owner_mutes_host_keeping_video() {
        let mut room = joined("O", 2, &[(2, "A")]);
        let effects = room
            .handle_command(
                RoomCommand::SetHostAudio {
                    seat: 2,
                    enabled: false,
                },
                Instant::now(),
            )
            .unwrap();
        match only_request(&effects) {
            GatewayRequest::ModifyUserState(r) => {
                assert_eq!(r.user_id, "A");
                assert!(!r.enable_audio);
                assert!(r.enable_video);
            }
            other => panic!("unexpected request {other:?}"),
        }
        assert!(room
            .handle_command(
                RoomCommand::SetHostAudio {
                    seat: 1,
                    enabled: false
                },
                Instant::now()
            )
            .is_err());
    }

    #[test]
    fn audience_cannot_toggle_media() {
        let mut room = joined("X", 2, &[]);
        assert!(matches!(
            room.handle_command(RoomCommand::SetLocalAudio { enabled: false }, Instant::now()),
            Err(SeatError::NotPermitted { .. })
        ));
    }

    #[test]
    fn owner_media_toggle_reports_owner_state() {
        let mut room = joined("O", 2, &[]);
        let effects = room
            .handle_command(RoomCommand::SetLocalVideo { enabled: false }, Instant::now())
            .unwrap();
        match &effects.events[0] {
            RoomEvent::OwnerStateChanged { owner } => assert!(!owner.media.video_enabled),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn server_rejection_differs_from_remote_rejection() {
        let mut room = joined("H", 2, &[]);
        let now = Instant::now();
        let effects = room
            .handle_command(RoomCommand::ApplyForSeat { seat: 1 }, now)
            .unwrap();
        let request = only_request(&effects).clone();
        let effects = room.handle_response(
            request,
            GatewayResponse::Code(Ok(ResponseCode::SeatClosed)),
            now,
        );
        assert_eq!(
            outcomes(&effects),
            vec![InteractionOutcome::ServerRejected(ResponseCode::SeatClosed)]
        );

        room.handle_command(RoomCommand::ApplyForSeat { seat: 2 }, now)
            .unwrap();
        let effects = room.handle_push(
            SignalMessage::ApplicationRejected(notice("H", "Harry", 2)),
            now,
        );
        assert_eq!(outcomes(&effects), vec![InteractionOutcome::Rejected]);
    }

    #[test]
    fn failed_application_is_retried_then_times_out() {
        let config = RoomConfig::new("r", "H", "Harry")
            .with_seat_count(2)
            .with_pending_timeout(Duration::from_secs(10))
            .with_retry_interval(Duration::from_secs(3));
        let mut room = RoomState::new(&config);
        room.bootstrap(&RoomSnapshot {
            owner: owner_state("O"),
            seats: vec![],
        });
        let start = Instant::now();
        let effects = room
            .handle_command(RoomCommand::ApplyForSeat { seat: 1 }, start)
            .unwrap();
        let request = only_request(&effects).clone();

        let effects = room.handle_response(
            request.clone(),
            GatewayResponse::Code(Err(SeatError::Gateway("offline".into()))),
            start,
        );
        assert!(effects.is_empty());
        assert_eq!(room.sweep(start + Duration::from_secs(3)).requests, vec![request]);

        let effects = room.sweep(start + Duration::from_secs(10));
        assert_eq!(
            outcomes(&effects),
            vec![InteractionOutcome::Superseded(SupersedeReason::Timeout)]
        );
    }

    #[test]
    fn owner_receives_and_accepts_application() {
        let mut room = joined("O", 2, &[]);
        let now = Instant::now();
        let effects = room.handle_push(SignalMessage::SeatApplied(notice("A", "Ann", 1)), now);
        assert!(matches!(
            effects.events[0],
            RoomEvent::InteractionAppeared { .. }
        ));

        let effects = room
            .handle_command(
                RoomCommand::AcceptApplication {
                    seat: 1,
                    user_id: "A".into(),
                },
                now,
            )
            .unwrap();
        let request = only_request(&effects).clone();
        let effects = room.handle_response(
            request,
            GatewayResponse::Code(Ok(ResponseCode::Success)),
            now,
        );
        assert_eq!(outcomes(&effects), vec![InteractionOutcome::Accepted]);
        assert!(room.table().seat_of("A").is_none());
    }

    #[test]
    fn invitation_accept_push_seats_invitee() {
        let mut room = joined("O", 2, &[]);
        let now = Instant::now();
        room.handle_command(
            RoomCommand::Invite {
                user_id: "A".into(),
                user_name: "Ann".into(),
                seat: 2,
            },
            now,
        )
        .unwrap();
        room.handle_push(SignalMessage::InvitationAccepted(notice("A", "Ann", 2)), now);
        let occupant = room.table().seat(2).unwrap().occupant.clone().unwrap();
        assert_eq!(occupant.user_id, "A");
        assert_eq!(occupant.rtc_uid, 0);

        room.handle_push(
            SignalMessage::SeatStateChanged {
                seats: vec![SeatUpdate::taken(2, user("A", "Ann"))],
            },
            now,
        );
        assert_eq!(room.table().seat(2).unwrap().occupant.as_ref().unwrap().rtc_uid, 42);
    }

    #[test]
    fn seat_state_rejection_is_reported() {
        let mut room = joined("O", 2, &[]);
        let effects = room
            .handle_command(RoomCommand::CloseSeat { seat: 1 }, Instant::now())
            .unwrap();
        let request = only_request(&effects).clone();
        let effects = room.handle_response(
            request,
            GatewayResponse::Code(Ok(ResponseCode::NotRoomOwner)),
            Instant::now(),
        );
        assert!(matches!(
            effects.events[0],
            RoomEvent::RequestRejected {
                code: ResponseCode::NotRoomOwner,
                ..
            }
        ));
        assert_eq!(room.table().seat(1).unwrap().state, SeatState::Open);
    }

    #[test]
    fn rejoin_discards_pending_and_rederives_role() {
        let mut room = joined("H", 2, &[]);
        room.handle_command(RoomCommand::ApplyForSeat { seat: 1 }, Instant::now())
            .unwrap();
        let effects = room.bootstrap(&RoomSnapshot {
            owner: owner_state("O"),
            seats: vec![SeatUpdate::taken(2, user("H", "Harry"))],
        });
        assert!(room.interactions().is_empty());
        assert_eq!(room.role(), LocalRole::Host);
        assert!(outcomes(&effects).is_empty());
    }

    #[test]
    fn audience_list_is_owner_only() {
        let mut room = joined("O", 2, &[]);
        let effects = room
            .handle_command(
                RoomCommand::RequestAudienceList {
                    filter: AudienceFilter::Audience,
                },
                Instant::now(),
            )
            .unwrap();
        let request = only_request(&effects).clone();
        let effects = room.handle_response(
            request,
            GatewayResponse::AudienceList(Ok(vec![])),
            Instant::now(),
        );
        assert_eq!(
            effects.events,
            vec![RoomEvent::AudienceListReceived { members: vec![] }]
        );

        let mut audience = joined("X", 2, &[]);
        assert!(audience
            .handle_command(
                RoomCommand::RequestAudienceList {
                    filter: AudienceFilter::All
                },
                Instant::now()
            )
            .is_err());
    }

    #[test]
    fn application_push_replaces_outstanding_invitation() {
        let mut room = joined("O", 2, &[]);
        let now = Instant::now();
        room.handle_command(
            RoomCommand::Invite {
                user_id: "U".into(),
                user_name: "Uma".into(),
                seat: 1,
            },
            now,
        )
        .unwrap();

        let effects = room.handle_push(SignalMessage::SeatApplied(notice("U", "Uma", 1)), now);
        assert_eq!(effects.events.len(), 2);
        match &effects.events[0] {
            RoomEvent::InteractionResolved {
                interaction,
                outcome,
            } => {
                assert_eq!(interaction.kind, InteractionKind::Invitation);
                assert_eq!(
                    outcome,
                    &InteractionOutcome::Superseded(SupersedeReason::Replaced {
                        by: InteractionKind::Application
                    })
                );
            }
            other => panic!("expected resolution first, got {other:?}"),
        }
        match &effects.events[1] {
            RoomEvent::InteractionAppeared { interaction } => {
                assert_eq!(interaction.kind, InteractionKind::Application);
            }
            other => panic!("expected appearance second, got {other:?}"),
        }
        assert_eq!(room.interactions().len(), 1);
    }

    #[test]
    fn stale_failure_of_repeated_mute_does_not_roll_back() {
        let mut room = joined("H", 2, &[(1, "H")]);
        let now = Instant::now();
        let first = room
            .handle_command(RoomCommand::SetLocalAudio { enabled: false }, now)
            .unwrap();
        let first = only_request(&first).clone();
        let second = room
            .handle_command(RoomCommand::SetLocalAudio { enabled: false }, now)
            .unwrap();
        let second = only_request(&second).clone();

        let effects = room.handle_response(
            first,
            GatewayResponse::Code(Err(SeatError::Gateway("reset".into()))),
            now,
        );
        assert!(!effects
            .events
            .iter()
            .any(|e| matches!(e, RoomEvent::SeatsUpdated { .. })));
        room.handle_response(
            second,
            GatewayResponse::Code(Ok(ResponseCode::Success)),
            now,
        );
        assert!(!room
            .table()
            .media_of(MuteTarget::User("H"))
            .unwrap()
            .audio_enabled);
    }

    #[test]
    fn newest_failed_toggle_restores_the_value_before_it() {
        let mut room = joined("H", 2, &[(1, "H")]);
        let now = Instant::now();
        let mut sent = Vec::new();
        for enabled in [false, true, false] {
            let effects = room
                .handle_command(RoomCommand::SetLocalAudio { enabled }, now)
                .unwrap();
            sent.push(only_request(&effects).clone());
        }

        let newest = sent.pop().unwrap();
        let effects = room.handle_response(
            newest,
            GatewayResponse::Code(Ok(ResponseCode::InternalError)),
            now,
        );
        assert!(matches!(effects.events[0], RoomEvent::SeatsUpdated { .. }));
        for request in sent {
            room.handle_response(
                request,
                GatewayResponse::Code(Ok(ResponseCode::Success)),
                now,
            );
        }
        assert!(room
            .table()
            .media_of(MuteTarget::User("H"))
            .unwrap()
            .audio_enabled);
    }
}
