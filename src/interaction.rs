//! The invite/apply handshake.
//!
//! Every `(seat, user)` pair is in one of two states: untracked, or
//! `Pending(Invitation | Application)`. A pending pair ends as Accepted,
//! Rejected, Withdrawn, Superseded, or ServerRejected, and is untracked again
//! immediately. The user of a pair is always the *subject*: the applicant for
//! applications, the invitee for invitations.
//!
//! The coordinator validates local actions against the seat table and the
//! local role, builds the outgoing requests, and matches pushes and
//! responses against tracked pairs. It never changes seat occupancy itself;
//! an accepted pair yields an occupancy intent via [`Resolution::occupancy`].

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Result, SeatError};
use crate::protocol::{
    InteractionNotice, ModifySeatStateRequest, SeatInteraction, SeatInteractionRequest,
    SeatNumber, SeatState, SeatUpdate, UserId, UserState,
};
use crate::response_codes::ResponseCode;
use crate::role::LocalRole;
use crate::seat_table::{OwnerSlot, Seat, SeatTable};

/// Which side started the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// Owner-initiated offer of a seat.
    Invitation,
    /// Audience-initiated request for a seat.
    Application,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invitation => "invitation",
            Self::Application => "application",
        };
        f.write_str(name)
    }
}

/// Where a pending pair was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The local actor sent it and waits for the other side.
    Local,
    /// Another member sent it and waits for the local actor's answer.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInteraction {
    pub seat_number: SeatNumber,
    pub user_id: UserId,
    pub user_name: String,
    pub kind: InteractionKind,
    pub origin: Origin,
    pub created_at: Instant,
}

impl PendingInteraction {
    fn is_pair(&self, seat: SeatNumber, user_id: &str) -> bool {
        self.seat_number == seat && self.user_id == user_id
    }
}

/// Why an opportunity vanished without an explicit answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupersedeReason {
    /// The owner closed the seat.
    SeatClosed,
    /// Someone else took the seat.
    SeatTaken { by: UserId },
    /// The subject took a different seat.
    SubjectSeated { seat: SeatNumber },
    /// Nothing confirmed or denied the pair within the pending timeout.
    Timeout,
    /// A newer application or invitation for the same seat and user took
    /// its place.
    Replaced { by: InteractionKind },
}

/// How a pending pair ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionOutcome {
    Accepted,
    /// The other member said no.
    Rejected,
    /// The local actor took it back.
    Withdrawn,
    Superseded(SupersedeReason),
    /// The room service refused the request.
    ServerRejected(ResponseCode),
}

/// A pair that left the pending state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub interaction: PendingInteraction,
    pub outcome: InteractionOutcome,
}

impl Resolution {
    /// Seat occupancy implied by an accepted pair.
    ///
    /// The media uid is unknown until the next seat push, which replaces
    /// this provisional occupant wholesale.
    pub fn occupancy(&self) -> Option<SeatUpdate> {
        if self.outcome != InteractionOutcome::Accepted {
            return None;
        }
        Some(SeatUpdate::taken(
            self.interaction.seat_number,
            UserState {
                user_id: self.interaction.user_id.clone(),
                user_name: self.interaction.user_name.clone(),
                uid: 0,
                enable_audio: true,
                enable_video: true,
            },
        ))
    }
}

/// What a seat-interaction response did to the pending pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEffect {
    /// The request was accepted; the pair keeps waiting for a push.
    Acknowledged,
    /// The response ended a pair.
    Resolved(Resolution),
    /// The request failed in transit; it will be resent.
    RetryScheduled,
    /// The request is not tied to a tracked pair.
    Untracked,
}

/// Everything a local action needs to be validated.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub room_id: &'a str,
    pub local_user_id: &'a str,
    pub local_user_name: &'a str,
    pub role: LocalRole,
    pub table: &'a SeatTable,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn require(&self, role: LocalRole, action: &'static str) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(SeatError::NotPermitted {
                action,
                role: self.role,
            })
        }
    }

    fn owner(&self) -> Result<&'a OwnerSlot> {
        self.table.owner().ok_or(SeatError::NotBootstrapped)
    }

    fn seat(&self, number: SeatNumber) -> Result<&'a Seat> {
        self.table
            .seat(number)
            .ok_or(SeatError::InvalidSeat(number))
    }

    fn open_seat(&self, number: SeatNumber) -> Result<&'a Seat> {
        let seat = self.seat(number)?;
        if seat.state == SeatState::Open {
            Ok(seat)
        } else {
            Err(SeatError::SeatUnavailable {
                seat: number,
                state: seat.state,
            })
        }
    }

    fn interaction(
        &self,
        user_id: &str,
        seat_no: SeatNumber,
        interaction: SeatInteraction,
    ) -> SeatInteractionRequest {
        SeatInteractionRequest {
            room_id: self.room_id.to_string(),
            user_id: user_id.to_string(),
            seat_no,
            interaction,
        }
    }
}

#[derive(Debug, Clone)]
struct RetrySlot {
    request: SeatInteractionRequest,
    due: Instant,
}

#[derive(Debug, Clone)]
struct Entry {
    interaction: PendingInteraction,
    retry: Option<RetrySlot>,
}

/// Tracks pending invitations and applications for one room session.
#[derive(Debug, Clone)]
pub struct InteractionCoordinator {
    entries: Vec<Entry>,
    displaced: Vec<Resolution>,
    pending_timeout: Duration,
    retry_interval: Duration,
}

impl InteractionCoordinator {
    pub fn new(pending_timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            entries: Vec::new(),
            displaced: Vec::new(),
            pending_timeout,
            retry_interval,
        }
    }

    pub fn get(&self, seat: SeatNumber, user_id: &str) -> Option<&PendingInteraction> {
        self.entries
            .iter()
            .map(|entry| &entry.interaction)
            .find(|interaction| interaction.is_pair(seat, user_id))
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingInteraction> {
        self.entries.iter().map(|entry| &entry.interaction)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every pending pair without resolving it.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.displaced.clear();
        dropped
    }

    /// Pairs replaced by a newer interaction since the last call.
    pub fn take_displaced(&mut self) -> Vec<Resolution> {
        std::mem::take(&mut self.displaced)
    }

    // ── Local actions ───────────────────────────────────────────────

    /// Audience applies for an open seat.
    pub fn apply(
        &mut self,
        ctx: &ActionContext<'_>,
        seat: SeatNumber,
        now: Instant,
    ) -> Result<SeatInteractionRequest> {
        ctx.require(LocalRole::Audience, "applying for a seat")?;
        let owner = ctx.owner()?;
        ctx.open_seat(seat)?;
        self.track(PendingInteraction {
            seat_number: seat,
            user_id: ctx.local_user_id.to_string(),
            user_name: ctx.local_user_name.to_string(),
            kind: InteractionKind::Application,
            origin: Origin::Local,
            created_at: now,
        });
        Ok(ctx.interaction(&owner.user_id, seat, SeatInteraction::Apply))
    }

    /// Owner invites an audience member to an open seat.
    pub fn invite(
        &mut self,
        ctx: &ActionContext<'_>,
        user_id: &str,
        user_name: &str,
        seat: SeatNumber,
        now: Instant,
    ) -> Result<SeatInteractionRequest> {
        ctx.require(LocalRole::Owner, "inviting to a seat")?;
        ctx.open_seat(seat)?;
        if ctx.table.is_owner(user_id) || ctx.table.seat_of(user_id).is_some() {
            return Err(SeatError::AlreadySeated(user_id.to_string()));
        }
        self.track(PendingInteraction {
            seat_number: seat,
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            kind: InteractionKind::Invitation,
            origin: Origin::Local,
            created_at: now,
        });
        Ok(ctx.interaction(user_id, seat, SeatInteraction::Invite))
    }

    /// Owner answers an application. The pair stays pending until the
    /// response or a push settles it.
    pub fn answer_application(
        &self,
        ctx: &ActionContext<'_>,
        seat: SeatNumber,
        user_id: &str,
        accept: bool,
    ) -> Result<SeatInteractionRequest> {
        ctx.require(LocalRole::Owner, "answering an application")?;
        self.remote_entry(InteractionKind::Application, seat, user_id)?;
        if accept {
            ctx.open_seat(seat)?;
        }
        let interaction = if accept {
            SeatInteraction::OwnerAccept
        } else {
            SeatInteraction::OwnerReject
        };
        Ok(ctx.interaction(user_id, seat, interaction))
    }

    /// Audience answers an invitation addressed to them.
    pub fn answer_invitation(
        &self,
        ctx: &ActionContext<'_>,
        seat: SeatNumber,
        accept: bool,
    ) -> Result<SeatInteractionRequest> {
        ctx.require(LocalRole::Audience, "answering an invitation")?;
        self.remote_entry(InteractionKind::Invitation, seat, ctx.local_user_id)?;
        if accept {
            ctx.open_seat(seat)?;
        }
        let owner = ctx.owner()?;
        let interaction = if accept {
            SeatInteraction::AudienceAccept
        } else {
            SeatInteraction::AudienceReject
        };
        Ok(ctx.interaction(&owner.user_id, seat, interaction))
    }

    /// Take back a locally created application or invitation.
    ///
    /// Nothing is sent; the other side learns through its own timeout.
    pub fn withdraw(
        &mut self,
        kind: InteractionKind,
        seat: SeatNumber,
        user_id: &str,
    ) -> Result<Resolution> {
        let index = self
            .entries
            .iter()
            .position(|entry| {
                let interaction = &entry.interaction;
                interaction.is_pair(seat, user_id)
                    && interaction.kind == kind
                    && interaction.origin == Origin::Local
            })
            .ok_or_else(|| SeatError::NoSuchInteraction {
                kind,
                seat,
                user_id: user_id.to_string(),
            })?;
        let entry = self.entries.remove(index);
        Ok(Resolution {
            interaction: entry.interaction,
            outcome: InteractionOutcome::Withdrawn,
        })
    }

    /// A host gives up their seat. Confirmed only by a push.
    pub fn leave_seat(&self, ctx: &ActionContext<'_>) -> Result<SeatInteractionRequest> {
        ctx.require(LocalRole::Host, "leaving a seat")?;
        let seat = ctx
            .table
            .seat_of(ctx.local_user_id)
            .ok_or_else(|| SeatError::UnknownUser(ctx.local_user_id.to_string()))?;
        Ok(ctx.interaction(ctx.local_user_id, seat.number, SeatInteraction::HostLeave))
    }

    /// Owner removes the host from `seat`. Confirmed only by a push.
    pub fn force_leave(
        &self,
        ctx: &ActionContext<'_>,
        seat: SeatNumber,
    ) -> Result<SeatInteractionRequest> {
        ctx.require(LocalRole::Owner, "removing a host")?;
        let target = ctx.seat(seat)?;
        let occupant = target
            .occupant
            .as_ref()
            .ok_or(SeatError::SeatUnavailable {
                seat,
                state: target.state,
            })?;
        Ok(ctx.interaction(&occupant.user_id, seat, SeatInteraction::OwnerForceLeave))
    }

    /// Owner reopens a closed seat.
    pub fn open_seat(
        &self,
        ctx: &ActionContext<'_>,
        seat: SeatNumber,
    ) -> Result<ModifySeatStateRequest> {
        ctx.require(LocalRole::Owner, "opening a seat")?;
        let target = ctx.seat(seat)?;
        if target.state != SeatState::Closed {
            return Err(SeatError::SeatUnavailable {
                seat,
                state: target.state,
            });
        }
        Ok(ModifySeatStateRequest {
            room_id: ctx.room_id.to_string(),
            user_id: None,
            seat_no: seat,
            state: SeatState::Open,
        })
    }

    /// Owner closes a seat, removing its host if it is taken.
    pub fn close_seat(
        &self,
        ctx: &ActionContext<'_>,
        seat: SeatNumber,
    ) -> Result<ModifySeatStateRequest> {
        ctx.require(LocalRole::Owner, "closing a seat")?;
        let target = ctx.seat(seat)?;
        if target.state == SeatState::Closed {
            return Err(SeatError::SeatUnavailable {
                seat,
                state: target.state,
            });
        }
        Ok(ModifySeatStateRequest {
            room_id: ctx.room_id.to_string(),
            user_id: target
                .occupant
                .as_ref()
                .map(|occupant| occupant.user_id.clone()),
            seat_no: seat,
            state: SeatState::Closed,
        })
    }

    // ── Pushes ──────────────────────────────────────────────────────

    /// An application or invitation arrived from another member.
    ///
    /// Returns the new pending pair, or `None` if the push is not addressed
    /// to the local actor or no longer applicable.
    pub fn on_remote_offer(
        &mut self,
        ctx: &ActionContext<'_>,
        kind: InteractionKind,
        notice: &InteractionNotice,
        now: Instant,
    ) -> Option<PendingInteraction> {
        let addressed = match kind {
            InteractionKind::Application => ctx.role == LocalRole::Owner,
            InteractionKind::Invitation => {
                ctx.role == LocalRole::Audience && notice.user_id == ctx.local_user_id
            }
        };
        if !addressed {
            debug!(
                "ignoring {kind} for {} on seat {}: not addressed to {} ({})",
                notice.user_id, notice.seat_no, ctx.local_user_id, ctx.role
            );
            return None;
        }
        if ctx.open_seat(notice.seat_no).is_err()
            || ctx.table.is_owner(&notice.user_id)
            || ctx.table.seat_of(&notice.user_id).is_some()
        {
            debug!(
                "ignoring stale {kind} for {} on seat {}",
                notice.user_id, notice.seat_no
            );
            return None;
        }
        let interaction = PendingInteraction {
            seat_number: notice.seat_no,
            user_id: notice.user_id.clone(),
            user_name: notice.user_name.clone(),
            kind,
            origin: Origin::Remote,
            created_at: now,
        };
        self.track(interaction.clone());
        Some(interaction)
    }

    /// An accept or reject push for a pair.
    ///
    /// Untracked pairs are stale or belong to another session and are ignored.
    pub fn on_remote_answer(
        &mut self,
        kind: InteractionKind,
        notice: &InteractionNotice,
        accepted: bool,
    ) -> Option<Resolution> {
        let outcome = if accepted {
            InteractionOutcome::Accepted
        } else {
            InteractionOutcome::Rejected
        };
        let resolution = self.resolve(notice.seat_no, &notice.user_id, Some(kind), outcome);
        if resolution.is_none() {
            debug!(
                "ignoring stale {kind} answer for {} on seat {}",
                notice.user_id, notice.seat_no
            );
        }
        resolution
    }

    /// Settle pairs contradicted or confirmed by the authoritative state of
    /// `seat`.
    pub fn reconcile_seat(&mut self, seat: &Seat) -> Vec<Resolution> {
        self.take_where(|interaction| {
            if interaction.seat_number == seat.number {
                match (&seat.state, &seat.occupant) {
                    (SeatState::Closed, _) => {
                        Some(InteractionOutcome::Superseded(SupersedeReason::SeatClosed))
                    }
                    (SeatState::Taken, Some(occupant))
                        if occupant.user_id == interaction.user_id =>
                    {
                        Some(InteractionOutcome::Accepted)
                    }
                    (SeatState::Taken, Some(occupant)) => Some(InteractionOutcome::Superseded(
                        SupersedeReason::SeatTaken {
                            by: occupant.user_id.clone(),
                        },
                    )),
                    _ => None,
                }
            } else if seat.is_held_by(&interaction.user_id) {
                Some(InteractionOutcome::Superseded(
                    SupersedeReason::SubjectSeated { seat: seat.number },
                ))
            } else {
                None
            }
        })
    }

    // ── Responses ───────────────────────────────────────────────────

    /// Match a seat-interaction response against the pending pairs.
    ///
    /// Only explicit answers (accept/reject) are settled by a success code;
    /// applications and invitations keep waiting for the push.
    pub fn on_response(
        &mut self,
        local_user_id: &str,
        request: &SeatInteractionRequest,
        result: &Result<ResponseCode>,
        now: Instant,
    ) -> ResponseEffect {
        let (kind, subject) = match request.interaction {
            SeatInteraction::Apply => (InteractionKind::Application, local_user_id),
            SeatInteraction::AudienceAccept | SeatInteraction::AudienceReject => {
                (InteractionKind::Invitation, local_user_id)
            }
            SeatInteraction::Invite => (InteractionKind::Invitation, request.user_id.as_str()),
            SeatInteraction::OwnerAccept | SeatInteraction::OwnerReject => {
                (InteractionKind::Application, request.user_id.as_str())
            }
            SeatInteraction::HostLeave | SeatInteraction::OwnerForceLeave => {
                return ResponseEffect::Untracked;
            }
        };
        let seat = request.seat_no;

        let Some(entry) = self.entries.iter_mut().find(|entry| {
            entry.interaction.is_pair(seat, subject) && entry.interaction.kind == kind
        }) else {
            return ResponseEffect::Untracked;
        };

        let outcome = match result {
            Err(e) => {
                let Some(due) = now.checked_add(self.retry_interval) else {
                    warn!(
                        "{:?} for {subject} on seat {seat} failed in transit, \
                         retry out of range; waiting for timeout: {e}",
                        request.interaction
                    );
                    entry.retry = None;
                    return ResponseEffect::Acknowledged;
                };
                debug!(
                    "{:?} for {subject} on seat {seat} failed in transit, retrying: {e}",
                    request.interaction
                );
                entry.retry = Some(RetrySlot {
                    request: request.clone(),
                    due,
                });
                return ResponseEffect::RetryScheduled;
            }
            Ok(code) if !code.is_success() => InteractionOutcome::ServerRejected(*code),
            Ok(_) => match request.interaction {
                SeatInteraction::OwnerAccept | SeatInteraction::AudienceAccept => {
                    InteractionOutcome::Accepted
                }
                SeatInteraction::OwnerReject | SeatInteraction::AudienceReject => {
                    InteractionOutcome::Rejected
                }
                _ => {
                    entry.retry = None;
                    return ResponseEffect::Acknowledged;
                }
            },
        };
        match self.resolve(seat, subject, Some(kind), outcome) {
            Some(resolution) => ResponseEffect::Resolved(resolution),
            None => ResponseEffect::Untracked,
        }
    }

    // ── Timers ──────────────────────────────────────────────────────

    /// Supersede every pair older than the pending timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<Resolution> {
        let timeout = self.pending_timeout;
        self.take_where(|interaction| {
            (now.saturating_duration_since(interaction.created_at) >= timeout)
                .then_some(InteractionOutcome::Superseded(SupersedeReason::Timeout))
        })
    }

    /// Requests whose retry is due.
    pub fn due_retries(&mut self, now: Instant) -> Vec<SeatInteractionRequest> {
        self.entries
            .iter_mut()
            .filter(|entry| entry.retry.as_ref().is_some_and(|slot| slot.due <= now))
            .filter_map(|entry| entry.retry.take())
            .map(|slot| slot.request)
            .collect()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Start tracking a pair. An entry already held for it is superseded
    /// and queued for [`take_displaced`](Self::take_displaced).
    fn track(&mut self, interaction: PendingInteraction) {
        if let Some(index) = self.entries.iter().position(|entry| {
            entry
                .interaction
                .is_pair(interaction.seat_number, &interaction.user_id)
        }) {
            let dropped = self.entries.remove(index);
            debug!(
                "{} for {} on seat {} replaced by {}",
                dropped.interaction.kind,
                dropped.interaction.user_id,
                dropped.interaction.seat_number,
                interaction.kind
            );
            self.displaced.push(Resolution {
                interaction: dropped.interaction,
                outcome: InteractionOutcome::Superseded(SupersedeReason::Replaced {
                    by: interaction.kind,
                }),
            });
        }
        debug!(
            "tracking {:?} {} for {} on seat {}",
            interaction.origin, interaction.kind, interaction.user_id, interaction.seat_number
        );
        self.entries.push(Entry {
            interaction,
            retry: None,
        });
    }

    fn remote_entry(
        &self,
        kind: InteractionKind,
        seat: SeatNumber,
        user_id: &str,
    ) -> Result<&PendingInteraction> {
        self.pending()
            .find(|interaction| {
                interaction.is_pair(seat, user_id)
                    && interaction.kind == kind
                    && interaction.origin == Origin::Remote
            })
            .ok_or_else(|| SeatError::NoSuchInteraction {
                kind,
                seat,
                user_id: user_id.to_string(),
            })
    }

    fn resolve(
        &mut self,
        seat: SeatNumber,
        user_id: &str,
        kind: Option<InteractionKind>,
        outcome: InteractionOutcome,
    ) -> Option<Resolution> {
        let index = self.entries.iter().position(|entry| {
            entry.interaction.is_pair(seat, user_id)
                && kind.is_none_or(|kind| entry.interaction.kind == kind)
        })?;
        let entry = self.entries.remove(index);
        Some(Resolution {
            interaction: entry.interaction,
            outcome,
        })
    }

    fn take_where(
        &mut self,
        mut decide: impl FnMut(&PendingInteraction) -> Option<InteractionOutcome>,
    ) -> Vec<Resolution> {
        let mut resolved = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            match decide(&entry.interaction) {
                Some(outcome) => resolved.push(Resolution {
                    interaction: entry.interaction,
                    outcome,
                }),
                None => kept.push(entry),
            }
        }
        self.entries = kept;
        resolved
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
    use crate::protocol::{OwnerState, RoomSnapshot};

    const TIMEOUT: Duration = Duration::from_secs(30);
    const RETRY: Duration = Duration::from_secs(2);

    fn user(id: &str) -> UserState {
        UserState {
            user_id: id.into(),
            user_name: id.to_uppercase(),
            uid: 5,
            enable_audio: true,
            enable_video: true,
        }
    }

    fn table(seated: &[(u8, &str)]) -> SeatTable {
        let mut table = SeatTable::new(4);
        table.bootstrap(&RoomSnapshot {
            owner: OwnerState {
                user_id: "o".into(),
                user_name: "Owner".into(),
                uid: 1,
                enable_audio: true,
                enable_video: true,
            },
            seats: seated
                .iter()
                .map(|(no, id)| SeatUpdate::taken(*no, user(id)))
                .collect(),
        });
        table
    }

    fn ctx<'a>(table: &'a SeatTable, me: &'a str, role: LocalRole) -> ActionContext<'a> {
        ActionContext {
            room_id: "room-1",
            local_user_id: me,
            local_user_name: "Harry",
            role,
            table,
        }
    }

    fn notice(user_id: &str, seat_no: u8) -> InteractionNotice {
        InteractionNotice {
            user_id: user_id.into(),
            user_name: user_id.to_uppercase(),
            seat_no,
        }
    }

    fn coordinator() -> InteractionCoordinator {
        InteractionCoordinator::new(TIMEOUT, RETRY)
    }

    #[test]
    fn audience_application_targets_owner() {
        let t = table(&[]);
        let mut c = coordinator();
        let req = c
            .apply(&ctx(&t, "h", LocalRole::Audience), 1, Instant::now())
            .unwrap();
        assert_eq!(req.user_id, "o");
        assert_eq!(req.seat_no, 1);
        assert_eq!(req.interaction, SeatInteraction::Apply);

        let pending = c.get(1, "h").unwrap();
        assert_eq!(pending.kind, InteractionKind::Application);
        assert_eq!(pending.origin, Origin::Local);
        assert_eq!(pending.user_name, "Harry");
    }

    #[test]
    fn hosts_and_owner_cannot_apply() {
        let t = table(&[(2, "h")]);
        let mut c = coordinator();
        let err = c
            .apply(&ctx(&t, "h", LocalRole::Host), 1, Instant::now())
            .unwrap_err();
        assert!(matches!(
            err,
            SeatError::NotPermitted {
                role: LocalRole::Host,
                ..
            }
        ));
        assert!(c
            .apply(&ctx(&t, "o", LocalRole::Owner), 1, Instant::now())
            .is_err());
        assert!(c.is_empty());
    }

    #[test]
    fn applying_for_taken_or_missing_seat_fails() {
        let t = table(&[(2, "x")]);
        let mut c = coordinator();
        let audience = ctx(&t, "h", LocalRole::Audience);
        assert!(matches!(
            c.apply(&audience, 2, Instant::now()),
            Err(SeatError::SeatUnavailable {
                seat: 2,
                state: SeatState::Taken
            })
        ));
        assert!(matches!(
            c.apply(&audience, 9, Instant::now()),
            Err(SeatError::InvalidSeat(9))
        ));
    }

    #[test]
    fn reapplying_replaces_instead_of_duplicating() {
        let t = table(&[]);
        let mut c = coordinator();
        let audience = ctx(&t, "h", LocalRole::Audience);
        let first = Instant::now();
        c.apply(&audience, 1, first).unwrap();
        c.apply(&audience, 1, first + Duration::from_secs(5)).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c.get(1, "h").unwrap().created_at, first + Duration::from_secs(5));

        let displaced = c.take_displaced();
        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].interaction.created_at, first);
        assert_eq!(
            displaced[0].outcome,
            InteractionOutcome::Superseded(SupersedeReason::Replaced {
                by: InteractionKind::Application
            })
        );
        assert!(c.take_displaced().is_empty());
    }

    #[test]
    fn remote_application_displaces_a_local_invitation() {
        let t = table(&[]);
        let mut c = coordinator();
        let owner = ctx(&t, "o", LocalRole::Owner);
        let now = Instant::now();
        c.invite(&owner, "u", "U", 1, now).unwrap();
        assert!(c.take_displaced().is_empty());

        let appeared = c
            .on_remote_offer(&owner, InteractionKind::Application, &notice("u", 1), now)
            .unwrap();
        assert_eq!(appeared.origin, Origin::Remote);

        let displaced = c.take_displaced();
        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].interaction.kind, InteractionKind::Invitation);
        assert_eq!(
            displaced[0].outcome,
            InteractionOutcome::Superseded(SupersedeReason::Replaced {
                by: InteractionKind::Application
            })
        );
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn owner_invites_only_unseated_members() {
        let t = table(&[(2, "h")]);
        let mut c = coordinator();
        let owner = ctx(&t, "o", LocalRole::Owner);
        let req = c.invite(&owner, "a", "Ann", 1, Instant::now()).unwrap();
        assert_eq!(req.user_id, "a");
        assert_eq!(req.interaction, SeatInteraction::Invite);
        assert!(matches!(
            c.invite(&owner, "h", "Hal", 3, Instant::now()),
            Err(SeatError::AlreadySeated(_))
        ));
        assert!(c
            .invite(&ctx(&t, "a", LocalRole::Audience), "b", "Bo", 1, Instant::now())
            .is_err());
    }

    #[test]
    fn accept_push_for_tracked_pair_yields_occupancy() {
        let t = table(&[]);
        let mut c = coordinator();
        c.apply(&ctx(&t, "h", LocalRole::Audience), 1, Instant::now())
            .unwrap();

        let resolution = c
            .on_remote_answer(InteractionKind::Application, &notice("h", 1), true)
            .unwrap();
        assert_eq!(resolution.outcome, InteractionOutcome::Accepted);
        let update = resolution.occupancy().unwrap();
        assert_eq!(update.seat.state, SeatState::Taken);
        assert_eq!(update.user.unwrap().user_id, "h");
        assert!(c.is_empty());
    }

    #[test]
    fn answers_for_untracked_pairs_are_ignored() {
        let mut c = coordinator();
        assert!(c
            .on_remote_answer(InteractionKind::Application, &notice("h", 1), true)
            .is_none());

        let t = table(&[]);
        c.apply(&ctx(&t, "h", LocalRole::Audience), 1, Instant::now())
            .unwrap();
        assert!(c
            .on_remote_answer(InteractionKind::Invitation, &notice("h", 1), false)
            .is_none());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn closing_the_seat_supersedes_rather_than_rejects() {
        let mut t = table(&[]);
        let mut c = coordinator();
        c.apply(&ctx(&t, "u", LocalRole::Audience), 3, Instant::now())
            .unwrap();

        t.apply_push(&SeatUpdate::vacant(3, SeatState::Closed));
        let resolved = c.reconcile_seat(t.seat(3).unwrap());
        assert_eq!(resolved.len(), 1);
        assert_eq!(
            resolved[0].outcome,
            InteractionOutcome::Superseded(SupersedeReason::SeatClosed)
        );
        assert!(resolved[0].occupancy().is_none());
    }

    #[test]
    fn seat_taken_by_subject_or_other() {
        let mut t = table(&[]);
        let mut c = coordinator();
        let owner = ctx(&t, "o", LocalRole::Owner);
        c.invite(&owner, "a", "Ann", 1, Instant::now()).unwrap();
        c.invite(&owner, "b", "Bo", 2, Instant::now()).unwrap();

        t.apply_push(&SeatUpdate::taken(1, user("a")));
        t.apply_push(&SeatUpdate::taken(2, user("z")));

        let first = c.reconcile_seat(t.seat(1).unwrap());
        assert_eq!(first[0].outcome, InteractionOutcome::Accepted);
        let second = c.reconcile_seat(t.seat(2).unwrap());
        assert_eq!(
            second[0].outcome,
            InteractionOutcome::Superseded(SupersedeReason::SeatTaken { by: "z".into() })
        );
    }

    #[test]
    fn subject_seated_elsewhere_supersedes_other_pairs() {
        let mut t = table(&[]);
        let mut c = coordinator();
        let audience = ctx(&t, "h", LocalRole::Audience);
        c.apply(&audience, 1, Instant::now()).unwrap();
        c.apply(&audience, 2, Instant::now()).unwrap();

        t.apply_push(&SeatUpdate::taken(2, user("h")));
        let resolved = c.reconcile_seat(t.seat(2).unwrap());
        assert_eq!(resolved.len(), 2);
        assert!(resolved.iter().any(|r| r.interaction.seat_number == 1
            && r.outcome
                == InteractionOutcome::Superseded(SupersedeReason::SubjectSeated { seat: 2 })));
        assert!(resolved
            .iter()
            .any(|r| r.interaction.seat_number == 2 && r.outcome == InteractionOutcome::Accepted));
    }

    #[test]
    fn remote_application_only_reaches_owner() {
        let t = table(&[]);
        let mut c = coordinator();
        assert!(c
            .on_remote_offer(
                &ctx(&t, "a", LocalRole::Audience),
                InteractionKind::Application,
                &notice("u", 1),
                Instant::now()
            )
            .is_none());
        let pending = c
            .on_remote_offer(
                &ctx(&t, "o", LocalRole::Owner),
                InteractionKind::Application,
                &notice("u", 1),
                Instant::now(),
            )
            .unwrap();
        assert_eq!(pending.origin, Origin::Remote);
    }

    #[test]
    fn invitation_for_someone_else_is_ignored() {
        let t = table(&[]);
        let mut c = coordinator();
        let me = ctx(&t, "me", LocalRole::Audience);
        assert!(c
            .on_remote_offer(&me, InteractionKind::Invitation, &notice("you", 1), Instant::now())
            .is_none());
        assert!(c
            .on_remote_offer(&me, InteractionKind::Invitation, &notice("me", 1), Instant::now())
            .is_some());
    }

    #[test]
    fn owner_answer_requires_tracked_application() {
        let t = table(&[]);
        let mut c = coordinator();
        let owner = ctx(&t, "o", LocalRole::Owner);
        assert!(matches!(
            c.answer_application(&owner, 1, "u", true),
            Err(SeatError::NoSuchInteraction { .. })
        ));
        c.on_remote_offer(&owner, InteractionKind::Application, &notice("u", 1), Instant::now());
        let req = c.answer_application(&owner, 1, "u", true).unwrap();
        assert_eq!(req.interaction, SeatInteraction::OwnerAccept);
        assert_eq!(req.user_id, "u");
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn audience_answer_targets_owner_and_settles_on_success() {
        let t = table(&[]);
        let mut c = coordinator();
        let me = ctx(&t, "me", LocalRole::Audience);
        c.on_remote_offer(&me, InteractionKind::Invitation, &notice("me", 2), Instant::now());
        let req = c.answer_invitation(&me, 2, false).unwrap();
        assert_eq!(req.user_id, "o");
        assert_eq!(req.interaction, SeatInteraction::AudienceReject);

        let effect = c.on_response("me", &req, &Ok(ResponseCode::Success), Instant::now());
        match effect {
            ResponseEffect::Resolved(resolution) => {
                assert_eq!(resolution.outcome, InteractionOutcome::Rejected)
            }
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn success_for_application_waits_for_push() {
        let t = table(&[]);
        let mut c = coordinator();
        let req = c
            .apply(&ctx(&t, "h", LocalRole::Audience), 1, Instant::now())
            .unwrap();
        let effect = c.on_response("h", &req, &Ok(ResponseCode::Success), Instant::now());
        assert_eq!(effect, ResponseEffect::Acknowledged);
        assert!(c.get(1, "h").is_some());
    }

    #[test]
    fn server_refusal_clears_pair_immediately() {
        let t = table(&[]);
        let mut c = coordinator();
        let req = c
            .apply(&ctx(&t, "h", LocalRole::Audience), 1, Instant::now())
            .unwrap();
        let effect = c.on_response("h", &req, &Ok(ResponseCode::SeatTaken), Instant::now());
        match effect {
            ResponseEffect::Resolved(resolution) => assert_eq!(
                resolution.outcome,
                InteractionOutcome::ServerRejected(ResponseCode::SeatTaken)
            ),
            other => panic!("expected resolution, got {other:?}"),
        }
        assert!(c.is_empty());
    }

    #[test]
    fn transport_failure_retries_until_timeout() {
        let t = table(&[]);
        let mut c = coordinator();
        let start = Instant::now();
        let req = c
            .apply(&ctx(&t, "h", LocalRole::Audience), 1, start)
            .unwrap();

        let failed: Result<ResponseCode> = Err(SeatError::Gateway("offline".into()));
        assert_eq!(
            c.on_response("h", &req, &failed, start),
            ResponseEffect::RetryScheduled
        );
        assert!(c.due_retries(start + Duration::from_secs(1)).is_empty());
        let due = c.due_retries(start + RETRY);
        assert_eq!(due, vec![req.clone()]);
        assert!(c.due_retries(start + RETRY).is_empty());

        assert!(c.expire(start + Duration::from_secs(29)).is_empty());
        let expired = c.expire(start + TIMEOUT);
        assert_eq!(
            expired[0].outcome,
            InteractionOutcome::Superseded(SupersedeReason::Timeout)
        );
        assert!(c.is_empty());
    }

    #[test]
    fn unbounded_retry_interval_leaves_pair_to_timeout() {
        let t = table(&[]);
        let mut c = InteractionCoordinator::new(TIMEOUT, Duration::MAX);
        let start = Instant::now();
        let req = c
            .apply(&ctx(&t, "h", LocalRole::Audience), 1, start)
            .unwrap();

        let failed: Result<ResponseCode> = Err(SeatError::Gateway("offline".into()));
        assert_eq!(
            c.on_response("h", &req, &failed, start),
            ResponseEffect::Acknowledged
        );
        assert!(c.due_retries(start + TIMEOUT).is_empty());
        let expired = c.expire(start + TIMEOUT);
        assert_eq!(
            expired[0].outcome,
            InteractionOutcome::Superseded(SupersedeReason::Timeout)
        );
    }

    #[test]
    fn vacating_requests_bypass_pending_pairs() {
        let t = table(&[(1, "h")]);
        let mut c = coordinator();
        let leave = c.leave_seat(&ctx(&t, "h", LocalRole::Host)).unwrap();
        assert_eq!(leave.interaction, SeatInteraction::HostLeave);
        assert_eq!(leave.seat_no, 1);

        let kick = c.force_leave(&ctx(&t, "o", LocalRole::Owner), 1).unwrap();
        assert_eq!(kick.user_id, "h");
        assert_eq!(kick.interaction, SeatInteraction::OwnerForceLeave);
        assert!(c.force_leave(&ctx(&t, "o", LocalRole::Owner), 2).is_err());

        assert_eq!(
            c.on_response("o", &kick, &Ok(ResponseCode::Success), Instant::now()),
            ResponseEffect::Untracked
        );
    }

    #[test]
    fn seat_state_changes_are_owner_only() {
        let mut t = table(&[(1, "h")]);
        let c = coordinator();
        let owner = ctx(&t, "o", LocalRole::Owner);
        let close = c.close_seat(&owner, 1).unwrap();
        assert_eq!(close.user_id.as_deref(), Some("h"));
        assert!(c.open_seat(&owner, 2).is_err());
        assert!(c.close_seat(&ctx(&t, "h", LocalRole::Host), 2).is_err());

        t.apply_push(&SeatUpdate::vacant(2, SeatState::Closed));
        let owner = ctx(&t, "o", LocalRole::Owner);
        assert!(c.close_seat(&owner, 2).is_err());
        assert_eq!(c.open_seat(&owner, 2).unwrap().state, SeatState::Open);
    }

    #[test]
    fn withdraw_only_local_pairs() {
        let t = table(&[]);
        let mut c = coordinator();
        let owner = ctx(&t, "o", LocalRole::Owner);
        c.on_remote_offer(&owner, InteractionKind::Application, &notice("u", 1), Instant::now());
        assert!(c.withdraw(InteractionKind::Application, 1, "u").is_err());

        c.invite(&owner, "a", "Ann", 2, Instant::now()).unwrap();
        let resolution = c.withdraw(InteractionKind::Invitation, 2, "a").unwrap();
        assert_eq!(resolution.outcome, InteractionOutcome::Withdrawn);
        assert_eq!(c.len(), 1);
    }
}
