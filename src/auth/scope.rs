//! Permission scope bitmask.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use thiserror::Error;

/// Permissions requested during authorization, sent as a decimal bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Scope(u64);

impl Scope {
    /// No permissions.
    pub const NONE: Self = Self(0);
    /// Notifications about the app.
    pub const NOTIFY: Self = Self(1 << 0);
    /// Friends.
    pub const FRIENDS: Self = Self(1 << 1);
    /// Photos.
    pub const PHOTOS: Self = Self(1 << 2);
    /// Audio.
    pub const AUDIO: Self = Self(1 << 3);
    /// Video.
    pub const VIDEO: Self = Self(1 << 4);
    /// Wiki pages.
    pub const PAGES: Self = Self(1 << 7);
    /// Status.
    pub const STATUS: Self = Self(1 << 10);
    /// Notes.
    pub const NOTES: Self = Self(1 << 11);
    /// Messages.
    pub const MESSAGES: Self = Self(1 << 12);
    /// Wall.
    pub const WALL: Self = Self(1 << 13);
    /// Ads.
    pub const ADS: Self = Self(1 << 15);
    /// Non-expiring token.
    pub const OFFLINE: Self = Self(1 << 16);
    /// Documents.
    pub const DOCS: Self = Self(1 << 17);
    /// Communities.
    pub const GROUPS: Self = Self(1 << 18);
    /// Notifications feed.
    pub const NOTIFICATIONS: Self = Self(1 << 19);
    /// Statistics.
    pub const STATS: Self = Self(1 << 20);
    /// Email address.
    pub const EMAIL: Self = Self(1 << 22);
    /// Market.
    pub const MARKET: Self = Self(1 << 27);

    const NAMES: [(&'static str, Self); 18] = [
        ("notify", Self::NOTIFY),
        ("friends", Self::FRIENDS),
        ("photos", Self::PHOTOS),
        ("audio", Self::AUDIO),
        ("video", Self::VIDEO),
        ("pages", Self::PAGES),
        ("status", Self::STATUS),
        ("notes", Self::NOTES),
        ("messages", Self::MESSAGES),
        ("wall", Self::WALL),
        ("ads", Self::ADS),
        ("offline", Self::OFFLINE),
        ("docs", Self::DOCS),
        ("groups", Self::GROUPS),
        ("notifications", Self::NOTIFICATIONS),
        ("stats", Self::STATS),
        ("email", Self::EMAIL),
        ("market", Self::MARKET),
    ];

    /// Wraps a raw bitmask.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Scope {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Scope {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unknown permission name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scope: {0}")]
pub struct ParseScopeError(String);

impl FromStr for Scope {
    type Err = ParseScopeError;

    /// Parses `friends,photos,offline` or a decimal bitmask.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(bits) = s.trim().parse::<u64>() {
            return Ok(Self(bits));
        }
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(Self::NONE, |scope, name| {
                Self::NAMES
                    .iter()
                    .find(|(known, _)| known.eq_ignore_ascii_case(name))
                    .map(|(_, bit)| scope | *bit)
                    .ok_or_else(|| ParseScopeError(name.to_string()))
            })
    }
}
