//! Effective channel permissions of a guild member.
//!
//! Follows the resolution order of the Discord permission system: guild owner, base permissions from the
//! `@everyone` role and the member's roles, `ADMINISTRATOR` short-circuit, then the channel overwrites for
//! `@everyone`, the member's roles and the member itself.

use crate::{
    GuildId,
    RoleId,
    Snowflake,
    UserId,
};
use serde::{
    Deserialize,
    Deserializer,
};
use std::{
    collections::HashMap,
    ops::{
        BitAnd,
        BitOr,
        BitOrAssign,
        Not,
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Permissions(u64);

impl Permissions {
    pub const NONE: Self = Self(0);
    pub const ADMINISTRATOR: Self = Self(1 << 3);
    pub const VIEW_CHANNEL: Self = Self(1 << 10);
    pub const READ_MESSAGE_HISTORY: Self = Self(1 << 16);
    pub const ALL: Self = Self(u64::MAX);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn can_read_history(self) -> bool {
        self.contains(Self(Self::VIEW_CHANNEL.0 | Self::READ_MESSAGE_HISTORY.0))
    }

    fn apply(self, allow: Self, deny: Self) -> Self {
        (self & !deny) | allow
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Permissions {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for Permissions {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Bit sets are serialized as decimal strings since they exceed the float precision of JSON numbers.
        let bits = String::deserialize(deserializer)?;
        bits.parse().map(Self).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    Role(RoleId),
    Member(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

impl PermissionOverwrite {
    /// Build from the raw `type` field of the API, `0` for roles and `1` for members.
    pub fn from_discord(id: Snowflake, kind: u8, allow: Permissions, deny: Permissions) -> Option<Self> {
        let target = match kind {
            0 => OverwriteTarget::Role(id),
            1 => OverwriteTarget::Member(id),
            _ => return None,
        };
        Some(Self { target, allow, deny })
    }
}

/// Everything about the member and the guild needed to resolve channel permissions.
#[derive(Debug, Clone)]
pub struct MemberPermissions<'a> {
    pub guild_id: GuildId,
    pub owner_id: UserId,
    pub role_permissions: &'a HashMap<RoleId, Permissions>,
    pub user_id: UserId,
    pub roles: &'a [RoleId],
}

impl MemberPermissions<'_> {
    /// Guild-wide permissions, before channel overwrites.
    pub fn base(&self) -> Permissions {
        if self.user_id == self.owner_id {
            return Permissions::ALL;
        }

        // The @everyone role shares its ID with the guild.
        let mut permissions = self
            .role_permissions
            .get(&self.guild_id)
            .copied()
            .unwrap_or_default();
        for role in self.roles {
            permissions |= self.role_permissions.get(role).copied().unwrap_or_default();
        }

        if permissions.contains(Permissions::ADMINISTRATOR) {
            return Permissions::ALL;
        }
        permissions
    }

    pub fn in_channel(&self, overwrites: &[PermissionOverwrite]) -> Permissions {
        let base = self.base();
        if base.contains(Permissions::ADMINISTRATOR) {
            return Permissions::ALL;
        }

        let mut permissions = base;
        if let Some(everyone) = overwrites
            .iter()
            .find(|ow| ow.target == OverwriteTarget::Role(self.guild_id))
        {
            permissions = permissions.apply(everyone.allow, everyone.deny);
        }

        let (mut allow, mut deny) = (Permissions::NONE, Permissions::NONE);
        for overwrite in overwrites {
            if let OverwriteTarget::Role(role) = overwrite.target {
                if role != self.guild_id && self.roles.contains(&role) {
                    allow |= overwrite.allow;
                    deny |= overwrite.deny;
                }
            }
        }
        permissions = permissions.apply(allow, deny);

        if let Some(member) = overwrites
            .iter()
            .find(|ow| ow.target == OverwriteTarget::Member(self.user_id))
        {
            permissions = permissions.apply(member.allow, member.deny);
        }

        permissions
    }
}
