// ── Entity identity ──
//
// Server-assigned numeric ids and the synthetic ids given to optimistic
// placeholders. Placeholder ids are wall-clock milliseconds, bumped so
// they stay unique within the process.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const TEMPORARY_PREFIX: &str = "tmp-";

static LAST_TEMPORARY: AtomicU64 = AtomicU64::new(0);

/// Identifier of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    /// Assigned by the backend.
    Server(u64),
    /// Placeholder id of an entity that only exists locally.
    Temporary(u64),
}

impl EntityId {
    /// A fresh placeholder id, strictly greater than any handed out before.
    pub fn temporary() -> Self {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let mut last = LAST_TEMPORARY.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_TEMPORARY.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Self::Temporary(next),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    pub fn as_server(&self) -> Option<u64> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Temporary(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Temporary(id) => write!(f, "{TEMPORARY_PREFIX}{id}"),
        }
    }
}

/// Error for strings that are neither `123` nor `tmp-123`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entity id: {0:?}")]
pub struct ParseEntityIdError(String);

impl FromStr for EntityId {
    type Err = ParseEntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix(TEMPORARY_PREFIX) {
            return rest
                .parse()
                .map(Self::Temporary)
                .map_err(|_| ParseEntityIdError(s.to_owned()));
        }
        s.parse()
            .map(Self::Server)
            .map_err(|_| ParseEntityIdError(s.to_owned()))
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self::Server(id)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Server(id) => serializer.serialize_u64(*id),
            Self::Temporary(_) => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = EntityId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a numeric id or a `tmp-` placeholder id")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(EntityId::Server(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(EntityId::Server)
                    .map_err(|_| E::custom(format!("negative id {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}
