//! Shape shared by every record that takes part in reconciliation.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The entity kinds the engine reconciles, in parent-before-child order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Site,
    File,
}

impl EntityKind {
    /// Plural collection name used for storage prefixes and HTTP paths.
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Site => "sites",
            Self::File => "files",
        }
    }

    /// Key prefix for records of this kind in the persistence medium.
    pub const fn key_prefix(self) -> &'static str {
        match self {
            Self::Site => "site:",
            Self::File => "file:",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Site => f.write_str("site"),
            Self::File => f.write_str("file"),
        }
    }
}

/// A record with a stable client-generated id, a last-write timestamp and a
/// tombstone flag.
pub trait Syncable:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Id: Clone + fmt::Debug + fmt::Display + FromStr + Ord + Hash + Send + Sync + 'static;

    const KIND: EntityKind;

    fn id(&self) -> &Self::Id;

    fn updated_at(&self) -> DateTime<Utc>;

    fn set_updated_at(&mut self, at: DateTime<Utc>);

    fn is_deleted(&self) -> bool;

    fn set_deleted(&mut self, deleted: bool);
}
