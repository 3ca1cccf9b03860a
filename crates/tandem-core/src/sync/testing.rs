//! In-memory server double for engine and driver tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::auth::AuthState;
use crate::models::Syncable;
use crate::remote::{RemoteApi, RemoteError, RemoteResult};

/// Parks each write call until released.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

pub struct FakeApi<T: Syncable> {
    records: Mutex<BTreeMap<T::Id, T>>,
    rejected: Mutex<BTreeSet<T::Id>>,
    fetch_error: Mutex<Option<RemoteError>>,
    gate: Option<Arc<Gate>>,
    fetches: AtomicUsize,
    writes: AtomicUsize,
}

impl<T: Syncable> FakeApi<T> {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<T>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|record| (record.id().clone(), record))
                    .collect(),
            ),
            rejected: Mutex::new(BTreeSet::new()),
            fetch_error: Mutex::new(None),
            gate: None,
            fetches: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Make every write for `id` fail with a validation error.
    pub fn reject(&self, id: T::Id) {
        self.rejected.lock().insert(id);
    }

    pub fn accept(&self, id: T::Id) {
        self.rejected.lock().remove(&id);
    }

    pub fn fail_fetch(&self, error: RemoteError) {
        *self.fetch_error.lock() = Some(error);
    }

    pub fn stored(&self, id: &T::Id) -> Option<T> {
        self.records.lock().get(id).cloned()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn begin_write(&self, item: &T) -> RemoteResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.rejected.lock().contains(item.id()) {
            return Err(RemoteError::Validation(format!("{} rejected", item.id())));
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Syncable> RemoteApi<T> for FakeApi<T> {
    async fn fetch(&self, _owner: &str, _auth: &AuthState) -> RemoteResult<Vec<T>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fetch_error.lock().clone() {
            return Err(error);
        }
        Ok(self.records.lock().values().cloned().collect())
    }

    async fn create(&self, item: &T, _auth: &AuthState) -> RemoteResult<T> {
        self.begin_write(item).await?;
        self.records.lock().insert(item.id().clone(), item.clone());
        Ok(item.clone())
    }

    async fn update(&self, item: &T, _auth: &AuthState) -> RemoteResult<T> {
        self.begin_write(item).await?;
        let mut records = self.records.lock();
        if !records.contains_key(item.id()) {
            return Err(RemoteError::NotFound(item.id().to_string()));
        }
        records.insert(item.id().clone(), item.clone());
        Ok(item.clone())
    }

    async fn delete(&self, item: &T, _auth: &AuthState) -> RemoteResult<()> {
        self.begin_write(item).await?;
        self.records.lock().remove(item.id());
        Ok(())
    }
}
