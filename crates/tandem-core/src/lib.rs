//! tandem-core - Core library for tandem
//!
//! This crate contains the models, the keyed local store, the remote overlay
//! store and the reconciliation engine that keeps the two eventually
//! consistent. Interfaces (the CLI, editors) only ever write to the local
//! store and let the sync engine do the rest.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod local;
pub mod models;
pub mod planner;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod util;

pub use auth::AuthState;
pub use config::TandemConfig;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use events::{ChangeFeed, Origin, Side, StoreChange};
pub use local::LocalStore;
pub use models::{EntityKind, File, FileId, Site, SiteId, Syncable};
pub use planner::{ItemKey, QueuedAction, SyncAction};
pub use remote::{HttpRemoteApi, RemoteApi, RemoteError, RemoteStore};
pub use storage::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use sync::{
    EngineOptions, PassOutcome, PassReport, Preview, SkipReason, SyncEngine, SyncHandle,
    SyncPhase, SyncState,
};
