//! Change notification feed shared by the local and remote stores.
//!
//! Stores publish a [`StoreChange`] after every mutation; the sync driver
//! listens to debounce passes and UIs listen to re-render from fresh
//! snapshots.

use tokio::sync::broadcast;

use crate::models::EntityKind;

const CHANGE_FEED_CAPACITY: usize = 256;

/// Which copy of the data changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Local,
    Remote,
}

/// Who made a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// An editor, another process sharing the medium, or a credential swap.
    Edit,
    /// A sync pass applying its own plan.
    Sync,
}

/// A single change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub kind: EntityKind,
    pub side: Side,
    pub origin: Origin,
}

/// Cloneable sender half of the change feed.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { tx }
    }

    /// Publish a change. Having no subscribers is fine.
    pub fn notify(&self, kind: EntityKind, side: Side, origin: Origin) {
        let _ = self.tx.send(StoreChange { kind, side, origin });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_without_subscribers_is_silent() {
        let feed = ChangeFeed::new();
        feed.notify(EntityKind::Site, Side::Local, Origin::Edit);
    }

    #[tokio::test]
    async fn subscribers_receive_changes() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        feed.notify(EntityKind::File, Side::Remote, Origin::Sync);
        let change = rx.recv().await.unwrap();
        assert_eq!(
            change,
            StoreChange {
                kind: EntityKind::File,
                side: Side::Remote,
                origin: Origin::Sync,
            }
        );
    }
}
