//! Derivation of the local actor's role.
//!
//! - Owner: the local user is the snapshot's owner.
//! - Host: the local user holds a numbered seat.
//! - Audience: everyone else.
//!
//! Owner is only granted or withdrawn by [`RoleResolver::bootstrap`]; seat
//! changes never promote to, or demote from, Owner.

use std::fmt;

use tracing::debug;

use crate::protocol::UserId;
use crate::seat_table::SeatTable;

/// The local actor's role in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalRole {
    Owner,
    Host,
    #[default]
    Audience,
}

impl LocalRole {
    /// Owners and hosts publish audio/video.
    pub fn is_broadcaster(self) -> bool {
        matches!(self, Self::Owner | Self::Host)
    }
}

impl fmt::Display for LocalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Owner => "owner",
            Self::Host => "host",
            Self::Audience => "audience",
        };
        f.write_str(name)
    }
}

/// A role transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleChange {
    pub previous: LocalRole,
    pub current: LocalRole,
}

/// Pure role derivation from a seat table.
pub fn resolve(table: &SeatTable, local_user_id: &str) -> LocalRole {
    if table.is_owner(local_user_id) {
        LocalRole::Owner
    } else if table.seat_of(local_user_id).is_some() {
        LocalRole::Host
    } else {
        LocalRole::Audience
    }
}

/// Tracks the local role across bootstrap and seat changes.
#[derive(Debug, Clone)]
pub struct RoleResolver {
    local_user_id: UserId,
    role: LocalRole,
}

impl RoleResolver {
    pub fn new(local_user_id: impl Into<UserId>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            role: LocalRole::Audience,
        }
    }

    pub fn role(&self) -> LocalRole {
        self.role
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// Re-derive the role from a freshly bootstrapped table.
    ///
    /// This is the only path that can grant or withdraw Owner.
    pub fn bootstrap(&mut self, table: &SeatTable) -> Option<RoleChange> {
        let next = resolve(table, &self.local_user_id);
        self.transition(next)
    }

    /// Re-derive the role after seat pushes.
    ///
    /// An Owner stays Owner; otherwise Host iff the local user holds a seat.
    pub fn reconcile(&mut self, table: &SeatTable) -> Option<RoleChange> {
        if self.role == LocalRole::Owner {
            return None;
        }
        let next = if table.seat_of(&self.local_user_id).is_some() {
            LocalRole::Host
        } else {
            LocalRole::Audience
        };
        self.transition(next)
    }

    fn transition(&mut self, next: LocalRole) -> Option<RoleChange> {
        if next == self.role {
            return None;
        }
        let change = RoleChange {
            previous: self.role,
            current: next,
        };
        debug!("local role {} -> {}", change.previous, change.current);
        self.role = next;
        Some(change)
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
    use crate::protocol::{OwnerState, RoomSnapshot, SeatState, SeatUpdate, UserState};

    fn snapshot(owner: &str, seated: &[(u8, &str)]) -> RoomSnapshot {
        RoomSnapshot {
            owner: OwnerState {
                user_id: owner.into(),
                user_name: owner.into(),
                uid: 1,
                enable_audio: true,
                enable_video: true,
            },
            seats: seated
                .iter()
                .map(|(no, id)| {
                    SeatUpdate::taken(
                        *no,
                        UserState {
                            user_id: (*id).into(),
                            user_name: (*id).into(),
                            uid: 2,
                            enable_audio: true,
                            enable_video: true,
                        },
                    )
                })
                .collect(),
        }
    }

    fn table(snapshot: &RoomSnapshot) -> SeatTable {
        let mut table = SeatTable::new(3);
        table.bootstrap(snapshot);
        table
    }

    #[test]
    fn bootstrap_resolves_each_role() {
        let t = table(&snapshot("o", &[(2, "h")]));
        assert_eq!(resolve(&t, "o"), LocalRole::Owner);
        assert_eq!(resolve(&t, "h"), LocalRole::Host);
        assert_eq!(resolve(&t, "a"), LocalRole::Audience);
    }

    #[test]
    fn rejoining_host_is_restored_from_snapshot() {
        let t = table(&snapshot("o", &[(3, "me")]));
        let mut resolver = RoleResolver::new("me");
        let change = resolver.bootstrap(&t).unwrap();
        assert_eq!(change.previous, LocalRole::Audience);
        assert_eq!(change.current, LocalRole::Host);
        assert!(resolver.bootstrap(&t).is_none());
    }

    #[test]
    fn seat_changes_move_between_host_and_audience() {
        let mut t = table(&snapshot("o", &[]));
        let mut resolver = RoleResolver::new("me");
        resolver.bootstrap(&t);

        t.apply_push(&SeatUpdate::taken(
            1,
            UserState {
                user_id: "me".into(),
                user_name: "Me".into(),
                uid: 9,
                enable_audio: true,
                enable_video: true,
            },
        ));
        assert_eq!(
            resolver.reconcile(&t).map(|c| c.current),
            Some(LocalRole::Host)
        );

        t.apply_push(&SeatUpdate::vacant(1, SeatState::Closed));
        assert_eq!(
            resolver.reconcile(&t).map(|c| c.current),
            Some(LocalRole::Audience)
        );
    }

    #[test]
    fn owner_is_never_demoted_by_seat_changes() {
        let mut t = table(&snapshot("me", &[]));
        let mut resolver = RoleResolver::new("me");
        resolver.bootstrap(&t);
        assert_eq!(resolver.role(), LocalRole::Owner);

        t.apply_push(&SeatUpdate::vacant(1, SeatState::Closed));
        assert!(resolver.reconcile(&t).is_none());
        assert_eq!(resolver.role(), LocalRole::Owner);
    }

    #[test]
    fn only_bootstrap_withdraws_ownership() {
        let mut resolver = RoleResolver::new("me");
        resolver.bootstrap(&table(&snapshot("me", &[])));
        let change = resolver.bootstrap(&table(&snapshot("other", &[]))).unwrap();
        assert_eq!(change.previous, LocalRole::Owner);
        assert_eq!(change.current, LocalRole::Audience);
    }
}
