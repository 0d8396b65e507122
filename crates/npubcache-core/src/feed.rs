//! Snapshot feed with last-value replay
//!
//! Holds the latest snapshot plus one unbounded channel per subscriber. A new
//! subscriber receives the current snapshot before anything else; every
//! `publish` fans the new snapshot out to all live subscribers. Dropping a
//! [`Subscription`] unsubscribes; the closed channel is pruned on the next
//! publish.

use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::types::Account;

/// Feed of full account-list snapshots
pub type AccountFeed = SnapshotFeed<Vec<Account>>;

/// Subscription to the account-list feed
pub type AccountSubscription = Subscription<Vec<Account>>;

struct FeedState<T> {
    latest: T,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

/// Subject-like holder of the latest snapshot
pub struct SnapshotFeed<T: Clone> {
    state: Mutex<FeedState<T>>,
}

impl<T: Clone> SnapshotFeed<T> {
    pub fn new(initial: T) -> Self {
        Self {
            state: Mutex::new(FeedState {
                latest: initial,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Subscribe; the current snapshot is queued immediately
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        // Cannot fail: the receiver is still in scope.
        let _ = tx.send(state.latest.clone());
        state.subscribers.push(tx);
        Subscription { rx }
    }

    /// Replace the latest snapshot and deliver it to every subscriber
    pub fn publish(&self, snapshot: T) {
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
        state.latest = snapshot;
    }

    /// The most recently published snapshot
    pub fn latest(&self) -> T {
        self.state.lock().latest.clone()
    }

    /// Number of subscribers that have not been pruned yet
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

/// Receiving end of a [`SnapshotFeed`]
///
/// The feed never completes while the owning store is alive.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot
    ///
    /// Returns `None` only once the feed itself has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next queued snapshot without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued and keep only the newest snapshot
    pub fn latest(&mut self) -> Option<T> {
        let mut newest = None;
        while let Ok(snapshot) = self.rx.try_recv() {
            newest = Some(snapshot);
        }
        newest
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}
