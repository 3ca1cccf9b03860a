//! Site model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{EntityKind, Syncable};

/// A unique identifier for a site, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(Uuid);

impl SiteId {
    /// Create a new unique site ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SiteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SiteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A small web-site project owning a set of files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    /// Unique identifier, assigned once on the client
    pub id: SiteId,
    /// Display name
    pub name: String,
    /// Address-like identifier (e.g. `my-blog`)
    pub local_name: String,
    /// Last write timestamp
    #[serde(deserialize_with = "super::timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
    /// Tombstone flag for sync
    #[serde(default)]
    pub deleted: bool,
}

impl Site {
    /// Create a new site stamped with `now`
    #[must_use]
    pub fn new(name: impl Into<String>, local_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: SiteId::new(),
            name: name.into(),
            local_name: local_name.into(),
            updated_at: now,
            deleted: false,
        }
    }
}

impl Syncable for Site {
    type Id = SiteId;

    const KIND: EntityKind = EntityKind::Site;

    fn id(&self) -> &SiteId {
        &self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }
}
