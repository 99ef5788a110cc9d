//! Chat-administration capability bits.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A set of chat-administration capabilities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rights(u8);

impl Rights {
    pub const NONE: Self = Self(0);
    pub const CHANGE_INFO: Self = Self(1 << 0);
    pub const DELETE_MESSAGES: Self = Self(1 << 1);
    pub const RESTRICT_MEMBERS: Self = Self(1 << 2);
    pub const INVITE_USERS: Self = Self(1 << 3);
    pub const PIN_MESSAGES: Self = Self(1 << 4);
    pub const PROMOTE_MEMBERS: Self = Self(1 << 5);

    /// Bits a staff member satisfies on the user side without holding them.
    pub const STAFF_OVERRIDABLE: Self = Self(Self::RESTRICT_MEMBERS.0 | Self::PROMOTE_MEMBERS.0);

    const NAMED: [(Self, &'static str); 6] = [
        (Self::CHANGE_INFO, "can_change_info"),
        (Self::DELETE_MESSAGES, "can_delete_messages"),
        (Self::RESTRICT_MEMBERS, "can_restrict_members"),
        (Self::INVITE_USERS, "can_invite_users"),
        (Self::PIN_MESSAGES, "can_pin_messages"),
        (Self::PROMOTE_MEMBERS, "can_promote_members"),
    ];

    pub const fn all() -> Self {
        Self(0b11_1111)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Build from the individual flags the protocol reports.
    pub fn from_flags(
        change_info: bool,
        delete_messages: bool,
        restrict_members: bool,
        invite_users: bool,
        pin_messages: bool,
        promote_members: bool,
    ) -> Self {
        [
            (change_info, Self::CHANGE_INFO),
            (delete_messages, Self::DELETE_MESSAGES),
            (restrict_members, Self::RESTRICT_MEMBERS),
            (invite_users, Self::INVITE_USERS),
            (pin_messages, Self::PIN_MESSAGES),
            (promote_members, Self::PROMOTE_MEMBERS),
        ]
        .into_iter()
        .filter(|(held, _)| *held)
        .fold(Self::NONE, |acc, (_, bit)| acc | bit)
    }

    /// Names of the individual bits, in declaration order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for Rights {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Rights {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join(", "))
    }
}
