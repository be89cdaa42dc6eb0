//! The two id kinds (§9 "Two id kinds").
//!
//! `VersionId` identifies exactly one row. `EntityId` identifies the logical
//! object or relationship across all of its versions. They are both backed by
//! a `Uuid` but are distinct types so the compiler rejects accidentally
//! passing one where the other is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$name> for Uuid {
            fn from(v: $name) -> Self {
                v.0
            }
        }
    };
}

uuid_newtype!(VersionId);
uuid_newtype!(EntityId);
uuid_newtype!(ProjectId);
uuid_newtype!(BranchId);

/// An id of unknown kind, as accepted by lookups that match `version_id OR
/// entity_id` (§4.1 `get_by_id`, §4.4 root resolution, §4.3 similar-objects
/// exclusion). Resolution to a concrete `VersionId`/`EntityId` happens inside
/// the storage gateway, which is the only place that knows which rows exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnyId(pub Uuid);

impl AnyId {
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<VersionId> for AnyId {
    fn from(v: VersionId) -> Self {
        AnyId(v.0)
    }
}

impl From<EntityId> for AnyId {
    fn from(e: EntityId) -> Self {
        AnyId(e.0)
    }
}

impl fmt::Display for AnyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
