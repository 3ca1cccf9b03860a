//! File model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{EntityKind, SiteId, Syncable};

/// A unique identifier for a file, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    /// Create a new unique file ID using UUID v7
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

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A file belonging to a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Unique identifier, assigned once on the client
    pub id: FileId,
    /// Owning site
    pub site_id: SiteId,
    /// File name within the site (e.g. `index.html`)
    pub name: String,
    /// Raw file content
    #[serde(default)]
    pub content: String,
    /// Last write timestamp
    #[serde(deserialize_with = "super::timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
    /// Tombstone flag for sync
    #[serde(default)]
    pub deleted: bool,
}

impl File {
    /// Create a new file in `site_id` stamped with `now`
    #[must_use]
    pub fn new(
        site_id: SiteId,
        name: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FileId::new(),
            site_id,
            name: name.into(),
            content: content.into(),
            updated_at: now,
            deleted: false,
        }
    }

    /// Byte length of the content
    #[must_use]
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

impl Syncable for File {
    type Id = FileId;

    const KIND: EntityKind = EntityKind::File;

    fn id(&self) -> &FileId {
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
