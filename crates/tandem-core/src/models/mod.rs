//! Data models for tandem

mod file;
mod site;
mod syncable;
pub mod timestamp;

pub use file::{File, FileId};
pub use site::{Site, SiteId};
pub use syncable::{EntityKind, Syncable};
