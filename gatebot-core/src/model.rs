//! Persisted document types.
//!
//! Two documents make up the whole persistent state of the bot: the user
//! document (user records plus the admin set) and the configuration document
//! (channels and folders gating the main menu). Their JSON shape matches the
//! files the bot historically wrote, so old data loads unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Chat-platform user identifier.
///
/// Persisted as a decimal string (the documents use it as a JSON object key
/// and inside arrays), but accepts bare integers on load as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(UserId)
    }
}

impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct UserIdVisitor;

        impl Visitor<'_> for UserIdVisitor {
            type Value = UserId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a user id as a decimal string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<UserId, E> {
                v.parse()
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<UserId, E> {
                Ok(UserId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<UserId, E> {
                i64::try_from(v)
                    .map(UserId)
                    .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }
        }

        deserializer.deserialize_any(UserIdVisitor)
    }
}

/// One user's referral record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// Reserved. Nothing increments or reads it; kept so documents round-trip.
    #[serde(default)]
    pub points: i64,
    /// Referees in recruitment order. Each id appears at most once.
    #[serde(default)]
    pub referrals: Vec<UserId>,
    #[serde(default)]
    pub has_withdrawn: bool,
    #[serde(default)]
    pub referred_by: Option<UserId>,
}

impl UserRecord {
    /// A fresh record. Users without a public handle get `user_<id>`.
    pub fn new(id: UserId, display_name: Option<&str>) -> Self {
        let username = match display_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("user_{}", id),
        };
        Self {
            username,
            points: 0,
            referrals: Vec::new(),
            has_withdrawn: false,
            referred_by: None,
        }
    }
}

/// The user document: every known user plus the delegated admin set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDocument {
    #[serde(default)]
    pub users: BTreeMap<UserId, UserRecord>,
    #[serde(default)]
    pub admins: BTreeSet<UserId>,
}

impl UserDocument {
    pub fn user(&self, id: UserId) -> Option<&UserRecord> {
        self.users.get(&id)
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.users.contains_key(&id)
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.users.keys().copied().collect()
    }
}

/// A channel users must join before reaching the main menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub link: String,
    /// Chat id the membership oracle is queried with (e.g. `-1001234567890`).
    #[serde(rename = "id")]
    pub external_chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    pub link: String,
}

/// The configuration document: the join gate.
///
/// Folders are shown alongside channels in the join prompt but are not
/// membership-checked; a folder link is a shortcut for joining several chats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub channels: Vec<ChannelDescriptor>,
    #[serde(default)]
    pub folders: BTreeMap<String, FolderDescriptor>,
}
