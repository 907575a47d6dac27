//! Local model of the room's numbered seats and the owner slot.
//!
//! The table is mutated through exactly three entry points:
//! [`bootstrap`](SeatTable::bootstrap), [`apply_push`](SeatTable::apply_push)
//! (and its batch form), and [`set_mute`](SeatTable::set_mute). Pushes are
//! authoritative; `set_mute` is an optimistic local write that the next push
//! for the same seat overwrites.
//!
//! Invariants held after every call:
//!
//! - seat numbers are dense `1..=N`;
//! - a seat has an occupant iff its state is [`SeatState::Taken`];
//! - no user id appears on two seats, and the owner never appears on one.

use tracing::{debug, warn};

use crate::error::MalformedPush;
use crate::protocol::{
    OwnerState, RoomSnapshot, RtcUid, SeatNumber, SeatState, SeatUpdate, UserId, UserState,
};

/// Audio/video enablement of a broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFlags {
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

impl Default for MediaFlags {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
        }
    }
}

/// The member currently holding a seat.
///
/// Replaced wholesale when occupancy changes; only `media` is ever mutated
/// in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatOccupant {
    pub user_id: UserId,
    pub display_name: String,
    pub rtc_uid: RtcUid,
    pub media: MediaFlags,
}

impl From<&UserState> for SeatOccupant {
    fn from(user: &UserState) -> Self {
        Self {
            user_id: user.user_id.clone(),
            display_name: user.user_name.clone(),
            rtc_uid: user.uid,
            media: MediaFlags {
                audio_enabled: user.enable_audio,
                video_enabled: user.enable_video,
            },
        }
    }
}

/// One numbered seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub number: SeatNumber,
    pub state: SeatState,
    pub occupant: Option<SeatOccupant>,
}

impl Seat {
    fn open(number: SeatNumber) -> Self {
        Self {
            number,
            state: SeatState::Open,
            occupant: None,
        }
    }

    /// Returns `true` if `user_id` occupies this seat.
    pub fn is_held_by(&self, user_id: &str) -> bool {
        self.occupant
            .as_ref()
            .is_some_and(|occupant| occupant.user_id == user_id)
    }
}

/// The room owner. Lives outside the numbered seats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerSlot {
    pub user_id: UserId,
    pub display_name: String,
    pub rtc_uid: RtcUid,
    pub media: MediaFlags,
}

impl From<&OwnerState> for OwnerSlot {
    fn from(owner: &OwnerState) -> Self {
        Self {
            user_id: owner.user_id.clone(),
            display_name: owner.user_name.clone(),
            rtc_uid: owner.uid,
            media: MediaFlags {
                audio_enabled: owner.enable_audio,
                video_enabled: owner.enable_video,
            },
        }
    }
}

/// Before/after view of one applied seat push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatDelta {
    pub number: SeatNumber,
    pub previous_state: SeatState,
    pub previous: Option<SeatOccupant>,
    pub state: SeatState,
    pub current: Option<SeatOccupant>,
}

impl SeatDelta {
    /// Returns `true` if the push changed anything visible.
    pub fn changed(&self) -> bool {
        self.previous_state != self.state || self.previous != self.current
    }

    /// The member who lost this seat, if the occupant changed.
    pub fn vacated(&self) -> Option<&SeatOccupant> {
        let previous = self.previous.as_ref()?;
        match &self.current {
            Some(current) if current.user_id == previous.user_id => None,
            _ => Some(previous),
        }
    }

    /// Returns `true` if `user_id` held the seat before or after the push.
    pub fn involves(&self, user_id: &str) -> bool {
        let held = |occupant: &Option<SeatOccupant>| {
            occupant
                .as_ref()
                .is_some_and(|occupant| occupant.user_id == user_id)
        };
        held(&self.previous) || held(&self.current)
    }
}

/// Selects whose media flags [`SeatTable::set_mute`] updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteTarget<'a> {
    /// The occupant of a numbered seat.
    Seat(SeatNumber),
    /// A member by id; matches the owner slot as well as seat occupants.
    User(&'a str),
}

/// N fixed seats plus the owner slot.
#[derive(Debug, Clone)]
pub struct SeatTable {
    seats: Vec<Seat>,
    owner: Option<OwnerSlot>,
}

impl SeatTable {
    /// Create a table of `capacity` open seats and no owner.
    ///
    /// A capacity of zero is clamped to one.
    pub fn new(capacity: u8) -> Self {
        let capacity = capacity.max(1);
        Self {
            seats: (1..=capacity).map(Seat::open).collect(),
            owner: None,
        }
    }

    /// Number of seats (N).
    pub fn capacity(&self) -> u8 {
        u8::try_from(self.seats.len()).unwrap_or(u8::MAX)
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn seat(&self, number: SeatNumber) -> Option<&Seat> {
        self.index_of(number).and_then(|index| self.seats.get(index))
    }

    pub fn owner(&self) -> Option<&OwnerSlot> {
        self.owner.as_ref()
    }

    /// Returns `true` if `user_id` is the room owner.
    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|owner| owner.user_id == user_id)
    }

    /// Seat held by `user_id`, if any. Linear scan; N is small.
    pub fn seat_of(&self, user_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.is_held_by(user_id))
    }

    /// Current media flags of a seat occupant or the owner.
    pub fn media_of(&self, target: MuteTarget<'_>) -> Option<MediaFlags> {
        match target {
            MuteTarget::Seat(number) => self
                .seat(number)
                .and_then(|seat| seat.occupant.as_ref())
                .map(|occupant| occupant.media),
            MuteTarget::User(user_id) => {
                if let Some(owner) = self.owner.as_ref().filter(|o| o.user_id == user_id) {
                    return Some(owner.media);
                }
                self.seat_of(user_id)
                    .and_then(|seat| seat.occupant.as_ref())
                    .map(|occupant| occupant.media)
            }
        }
    }

    /// Reset every seat and load `snapshot`.
    ///
    /// Idempotent: applying the same snapshot twice yields the same table.
    /// Malformed snapshot entries are logged and skipped.
    pub fn bootstrap(&mut self, snapshot: &RoomSnapshot) {
        for seat in &mut self.seats {
            seat.state = SeatState::Open;
            seat.occupant = None;
        }
        self.owner = Some(OwnerSlot::from(&snapshot.owner));
        let applied = self.apply_batch(&snapshot.seats);
        debug!(
            "seat table bootstrapped: owner={} entries={}/{}",
            snapshot.owner.user_id,
            applied.len(),
            snapshot.seats.len()
        );
    }

    /// Apply one authoritative seat push.
    ///
    /// Returns the delta, or `None` if the entry was malformed and dropped.
    /// Open and closed states clear the occupant regardless of any user data
    /// carried alongside.
    pub fn apply_push(&mut self, update: &SeatUpdate) -> Option<SeatDelta> {
        match self.try_apply(update) {
            Ok(delta) => Some(delta),
            Err(e) => {
                warn!("dropping malformed seat push: {e}");
                None
            }
        }
    }

    /// Apply a seat list received in one push.
    ///
    /// Entries are applied in order. An entry refused only because its user
    /// still holds another seat is retried once after the rest of the list,
    /// so a host moving between seats within one list is accepted.
    pub fn apply_batch(&mut self, updates: &[SeatUpdate]) -> Vec<SeatDelta> {
        let mut deltas = Vec::with_capacity(updates.len());
        let mut deferred = Vec::new();
        for update in updates {
            match self.try_apply(update) {
                Ok(delta) => deltas.push(delta),
                Err(MalformedPush::DuplicateOccupant { .. }) => deferred.push(update),
                Err(e) => warn!("dropping malformed seat push: {e}"),
            }
        }
        for update in deferred {
            if let Some(delta) = self.apply_push(update) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Validate and apply one seat update.
    pub fn try_apply(&mut self, update: &SeatUpdate) -> Result<SeatDelta, MalformedPush> {
        let number = update.seat.no;
        let out_of_range = MalformedPush::SeatOutOfRange {
            seat: number,
            capacity: self.capacity(),
        };
        let Some(index) = self.index_of(number) else {
            return Err(out_of_range);
        };

        let occupant = match update.seat.state {
            SeatState::Taken => {
                let user = update
                    .user
                    .as_ref()
                    .ok_or(MalformedPush::MissingOccupant(number))?;
                if self.is_owner(&user.user_id) {
                    return Err(MalformedPush::OwnerInSeat {
                        seat: number,
                        user_id: user.user_id.clone(),
                    });
                }
                if let Some(other) = self
                    .seats
                    .iter()
                    .find(|seat| seat.number != number && seat.is_held_by(&user.user_id))
                {
                    return Err(MalformedPush::DuplicateOccupant {
                        seat: number,
                        occupied: other.number,
                        user_id: user.user_id.clone(),
                    });
                }
                Some(SeatOccupant::from(user))
            }
            SeatState::Open | SeatState::Closed => None,
        };

        let Some(seat) = self.seats.get_mut(index) else {
            return Err(out_of_range);
        };
        let previous_state = std::mem::replace(&mut seat.state, update.seat.state);
        let previous = std::mem::replace(&mut seat.occupant, occupant);
        Ok(SeatDelta {
            number,
            previous_state,
            previous,
            state: seat.state,
            current: seat.occupant.clone(),
        })
    }

    /// Replace the owner's identity and media state from a push.
    ///
    /// Ownership itself only changes on bootstrap: a push naming a different
    /// owner is refused.
    pub fn set_owner_state(&mut self, state: &OwnerState) -> Result<&OwnerSlot, MalformedPush> {
        if let Some(owner) = &self.owner {
            if owner.user_id != state.user_id {
                return Err(MalformedPush::ForeignOwner {
                    expected: owner.user_id.clone(),
                    got: state.user_id.clone(),
                });
            }
        }
        Ok(&*self.owner.insert(OwnerSlot::from(state)))
    }

    /// Optimistically update media flags. `None` leaves a flag unchanged.
    ///
    /// Returns the flags as they were before the write, or `None` if the
    /// target holds no seat.
    pub fn set_mute(
        &mut self,
        target: MuteTarget<'_>,
        audio_enabled: Option<bool>,
        video_enabled: Option<bool>,
    ) -> Option<MediaFlags> {
        let media = self.media_mut(target)?;
        let previous = *media;
        if let Some(audio) = audio_enabled {
            media.audio_enabled = audio;
        }
        if let Some(video) = video_enabled {
            media.video_enabled = video;
        }
        Some(previous)
    }

    fn media_mut(&mut self, target: MuteTarget<'_>) -> Option<&mut MediaFlags> {
        match target {
            MuteTarget::Seat(number) => {
                let index = self.index_of(number)?;
                self.seats
                    .get_mut(index)
                    .and_then(|seat| seat.occupant.as_mut())
                    .map(|occupant| &mut occupant.media)
            }
            MuteTarget::User(user_id) => {
                if let Some(owner) = self.owner.as_mut() {
                    if owner.user_id == user_id {
                        return Some(&mut owner.media);
                    }
                }
                self.seats
                    .iter_mut()
                    .filter_map(|seat| seat.occupant.as_mut())
                    .find(|occupant| occupant.user_id == user_id)
                    .map(|occupant| &mut occupant.media)
            }
        }
    }

    fn index_of(&self, number: SeatNumber) -> Option<usize> {
        let index = usize::from(number).checked_sub(1)?;
        (index < self.seats.len()).then_some(index)
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
    use std::collections::HashSet;

    fn user(id: &str) -> UserState {
        UserState {
            user_id: id.into(),
            user_name: format!("name-{id}"),
            uid: 7,
            enable_audio: true,
            enable_video: true,
        }
    }

    fn owner(id: &str) -> OwnerState {
        OwnerState {
            user_id: id.into(),
            user_name: "Olive".into(),
            uid: 1,
            enable_audio: true,
            enable_video: false,
        }
    }

    fn table_with_owner(capacity: u8) -> SeatTable {
        let mut table = SeatTable::new(capacity);
        table.bootstrap(&RoomSnapshot {
            owner: owner("o"),
            seats: vec![],
        });
        table
    }

    #[test]
    fn new_table_is_dense_and_open() {
        let table = SeatTable::new(4);
        let numbers: Vec<_> = table.seats().iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(table.seats().iter().all(|s| s.state == SeatState::Open));
        assert!(table.owner().is_none());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(SeatTable::new(0).capacity(), 1);
    }

    #[test]
    fn taken_push_sets_occupant_and_reports_delta() {
        let mut table = table_with_owner(3);
        let delta = table.apply_push(&SeatUpdate::taken(2, user("a"))).unwrap();
        assert!(delta.changed());
        assert_eq!(delta.previous_state, SeatState::Open);
        assert!(delta.previous.is_none());
        assert_eq!(delta.current.as_ref().unwrap().user_id, "a");
        assert_eq!(table.seat_of("a").unwrap().number, 2);
    }

    #[test]
    fn vacant_push_clears_occupant_even_with_user_data() {
        let mut table = table_with_owner(3);
        table.apply_push(&SeatUpdate::taken(1, user("a")));
        let update = SeatUpdate {
            seat: crate::protocol::SeatInfo {
                no: 1,
                state: SeatState::Closed,
            },
            user: Some(user("a")),
        };
        let delta = table.apply_push(&update).unwrap();
        assert_eq!(delta.vacated().unwrap().user_id, "a");
        assert_eq!(table.seat(1).unwrap().state, SeatState::Closed);
        assert!(table.seat(1).unwrap().occupant.is_none());
    }

    #[test]
    fn out_of_range_push_is_dropped() {
        let mut table = table_with_owner(2);
        assert!(table.apply_push(&SeatUpdate::taken(0, user("a"))).is_none());
        assert!(table.apply_push(&SeatUpdate::taken(3, user("a"))).is_none());
        assert!(table.seat_of("a").is_none());
    }

    #[test]
    fn taken_without_user_is_malformed() {
        let mut table = table_with_owner(2);
        let update = SeatUpdate::vacant(1, SeatState::Taken);
        assert_eq!(
            table.try_apply(&update),
            Err(MalformedPush::MissingOccupant(1))
        );
        assert_eq!(table.seat(1).unwrap().state, SeatState::Open);
    }

    #[test]
    fn owner_cannot_take_numbered_seat() {
        let mut table = table_with_owner(2);
        let err = table.try_apply(&SeatUpdate::taken(1, user("o"))).unwrap_err();
        assert!(matches!(err, MalformedPush::OwnerInSeat { seat: 1, .. }));
    }

    #[test]
    fn same_user_on_two_seats_is_refused() {
        let mut table = table_with_owner(3);
        table.apply_push(&SeatUpdate::taken(1, user("a")));
        assert!(table.apply_push(&SeatUpdate::taken(2, user("a"))).is_none());
        assert_eq!(table.seat_of("a").unwrap().number, 1);
        assert_eq!(table.seat(2).unwrap().state, SeatState::Open);
    }

    #[test]
    fn batch_allows_moving_between_seats() {
        let mut table = table_with_owner(3);
        table.apply_push(&SeatUpdate::taken(1, user("a")));
        let deltas = table.apply_batch(&[
            SeatUpdate::taken(3, user("a")),
            SeatUpdate::vacant(1, SeatState::Open),
        ]);
        assert_eq!(deltas.len(), 2);
        assert_eq!(table.seat_of("a").unwrap().number, 3);
        assert_eq!(table.seat(1).unwrap().state, SeatState::Open);
    }

    #[test]
    fn later_push_for_same_seat_wins() {
        let mut table = table_with_owner(2);
        table.apply_push(&SeatUpdate::taken(1, user("a")));
        let delta = table.apply_push(&SeatUpdate::taken(1, user("b"))).unwrap();
        assert_eq!(delta.vacated().unwrap().user_id, "a");
        assert!(table.seat_of("a").is_none());
        assert_eq!(table.seat_of("b").unwrap().number, 1);
    }

    #[test]
    fn bootstrap_resets_previous_state() {
        let mut table = table_with_owner(3);
        table.apply_push(&SeatUpdate::taken(1, user("a")));
        table.apply_push(&SeatUpdate::vacant(2, SeatState::Closed));

        let snapshot = RoomSnapshot {
            owner: owner("o"),
            seats: vec![SeatUpdate::taken(3, user("b"))],
        };
        table.bootstrap(&snapshot);
        table.bootstrap(&snapshot);

        assert!(table.seat_of("a").is_none());
        assert_eq!(table.seat(2).unwrap().state, SeatState::Open);
        assert_eq!(table.seat_of("b").unwrap().number, 3);
        assert!(!table.owner().unwrap().media.video_enabled);
    }

    #[test]
    fn set_mute_by_seat_user_and_owner() {
        let mut table = table_with_owner(2);
        table.apply_push(&SeatUpdate::taken(1, user("a")));

        let before = table.set_mute(MuteTarget::Seat(1), Some(false), None).unwrap();
        assert!(before.audio_enabled);
        let after = table.media_of(MuteTarget::User("a")).unwrap();
        assert!(!after.audio_enabled);
        assert!(after.video_enabled);

        table.set_mute(MuteTarget::User("o"), None, Some(true));
        assert!(table.owner().unwrap().media.video_enabled);

        assert!(table.set_mute(MuteTarget::Seat(2), Some(false), None).is_none());
        assert!(table.set_mute(MuteTarget::User("ghost"), Some(false), None).is_none());
    }

    #[test]
    fn push_overwrites_optimistic_mute() {
        let mut table = table_with_owner(2);
        table.apply_push(&SeatUpdate::taken(1, user("a")));
        table.set_mute(MuteTarget::User("a"), Some(false), Some(false));
        table.apply_push(&SeatUpdate::taken(1, user("a")));
        assert_eq!(
            table.media_of(MuteTarget::Seat(1)),
            Some(MediaFlags::default())
        );
    }

    #[test]
    fn owner_state_for_other_user_is_refused() {
        let mut table = table_with_owner(2);
        assert!(table.set_owner_state(&owner("intruder")).is_err());
        let mut update = owner("o");
        update.enable_audio = false;
        let slot = table.set_owner_state(&update).unwrap();
        assert!(!slot.media.audio_enabled);
    }

    #[test]
    fn arbitrary_push_sequences_keep_occupants_unique() {
        let mut table = table_with_owner(4);
        let users = ["a", "b", "c", "o"];
        let mut rng: u32 = 0x2545_F491;
        for _ in 0..2_000 {
            rng ^= rng << 13;
            rng ^= rng >> 17;
            rng ^= rng << 5;
            let seat = (rng % 6) as u8;
            let update = match (rng >> 8) % 3 {
                0 => SeatUpdate::vacant(seat, SeatState::Open),
                1 => SeatUpdate::vacant(seat, SeatState::Closed),
                _ => SeatUpdate::taken(seat, user(users[((rng >> 16) % 4) as usize])),
            };
            table.apply_push(&update);

            let mut seen = HashSet::new();
            for seat in table.seats() {
                assert_eq!(seat.occupant.is_some(), seat.state == SeatState::Taken);
                if let Some(occupant) = &seat.occupant {
                    assert!(seen.insert(occupant.user_id.clone()));
                    assert_ne!(occupant.user_id, "o");
                }
            }
        }
    }
}
