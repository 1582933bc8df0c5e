//! In-memory many-to-many pub/sub registry (C4).
//!
//! Ported from `examples/original_source/pubsub.go`'s `pubsub` struct. The
//! map-of-channel pattern and the single `RwLock` guarding both maps follow
//! the original directly; the consumer-task spawn on first subscribe and
//! refcounted teardown on last unsubscribe follow the same shape as the
//! teacher's `Publication::new`/`Drop` in
//! `roslibrust/src/ros1/publisher.rs`, adapted from "one TCP listener per
//! topic" to "one consumer task per destination".

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use log::debug;
use tokio::sync::{mpsc, RwLock};

use crate::model::{Flags, Update};

/// Feed capacity per destination. Small on purpose: this is the
/// intentional backpressure point between the poller and slow
/// destinations (spec §5).
const FEED_CAPACITY: usize = 4;

struct SourceEntry {
    watermark: i64,
    subs: HashMap<i64, Flags>,
}

struct DestEntry {
    feed: mpsc::Sender<Update>,
    refcount: u32,
    handle: tokio::task::JoinHandle<()>,
}

struct Inner {
    pub_to_subs: HashMap<i64, SourceEntry>,
    subscribers: HashMap<i64, DestEntry>,
}

/// The pub/sub registry: `source_id -> (watermark, dest -> flags)` and
/// `dest_id -> (feed, refcount)`.
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                pub_to_subs: HashMap::new(),
                subscribers: HashMap::new(),
            }),
        }
    }

    /// Subscribes `dest` to `source`. If `dest` has no existing
    /// subscriptions, spawns a consumer task bound to a fresh feed via
    /// `make_consumer`, which receives the feed's `Receiver` and returns the
    /// future to run as that destination's delivery worker.
    pub async fn subscribe<F, Fut>(&self, dest: i64, source: i64, flags: Flags, make_consumer: F)
    where
        F: FnOnce(mpsc::Receiver<Update>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.write().await;
        if !inner.subscribers.contains_key(&dest) {
            let (tx, rx) = mpsc::channel(FEED_CAPACITY);
            let handle = tokio::spawn(make_consumer(rx));
            inner.subscribers.insert(
                dest,
                DestEntry {
                    feed: tx,
                    refcount: 0,
                    handle,
                },
            );
            debug!("spawned delivery worker for destination {dest}");
        }
        let entry = inner.subscribers.get_mut(&dest).expect("just inserted");
        entry.refcount += 1;

        let now = now_unix();
        inner
            .pub_to_subs
            .entry(source)
            .or_insert_with(|| SourceEntry {
                watermark: now,
                subs: HashMap::new(),
            })
            .subs
            .insert(dest, flags);
    }

    /// Removes the `(source, dest)` edge. Garbage-collects `source` if it
    /// has no remaining subscribers. Decrements `dest`'s refcount and tears
    /// its feed down (closing the channel, removing the entry) once it
    /// reaches zero.
    pub async fn unsubscribe(&self, dest: i64, source: i64) {
        let mut inner = self.inner.write().await;
        if let Some(src) = inner.pub_to_subs.get_mut(&source) {
            src.subs.remove(&dest);
            if src.subs.is_empty() {
                inner.pub_to_subs.remove(&source);
            }
        }
        if let Some(entry) = inner.subscribers.get_mut(&dest) {
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount == 0 {
                inner.subscribers.remove(&dest);
                debug!("destination {dest} refcount reached zero, feed closed");
            }
        }
    }

    /// Publishes `posts` to every destination currently subscribed to
    /// `source`. Holds the write lock across the channel sends, which is
    /// the deliberate backpressure discipline: a full feed blocks
    /// `publish`, and transitively the poller, rather than dropping posts
    /// or racing a concurrent unsubscribe. See spec §5 / §9 (open
    /// question: write-lock-across-send was chosen over a read-lock
    /// downgrade for unambiguous backpressure).
    pub async fn publish(&self, source: i64, posts: Vec<crate::model::PreparedPost>) {
        if posts.is_empty() {
            return;
        }
        let inner = self.inner.write().await;
        let Some(src) = inner.pub_to_subs.get(&source) else {
            return;
        };
        for (&dest, &flags) in &src.subs {
            if let Some(entry) = inner.subscribers.get(&dest) {
                let update = Update {
                    posts: posts.clone(),
                    flags,
                };
                if entry.feed.send(update).await.is_err() {
                    debug!("destination {dest} feed closed while publishing, dropping update");
                }
            }
        }
    }

    /// Advances the in-memory watermark for `source`. Idempotent; callers
    /// are expected to never pass a value smaller than the previous one.
    pub async fn advance_watermark(&self, source: i64, new_ts: i64) {
        let mut inner = self.inner.write().await;
        if let Some(src) = inner.pub_to_subs.get_mut(&source) {
            src.watermark = src.watermark.max(new_ts);
        }
    }

    /// Snapshots `(source_id, watermark)` for every known source. Used by
    /// the poller to build a batch without holding the lock during I/O.
    pub async fn snapshot_sources(&self) -> Vec<(i64, i64)> {
        let inner = self.inner.read().await;
        inner
            .pub_to_subs
            .iter()
            .map(|(&id, src)| (id, src.watermark))
            .collect()
    }

    /// Number of live delivery workers (distinct destinations with at least
    /// one subscription). Used by tests asserting the worker-uniqueness
    /// invariant.
    pub async fn worker_count(&self) -> usize {
        self.inner.read().await.subscribers.len()
    }

    /// Closes every destination's feed and joins every consumer task, so
    /// shutdown only returns once all workers have drained and exited.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = {
            let mut inner = self.inner.write().await;
            inner.subscribers.drain().map(|(_, e)| e.handle).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Seeds a publisher with a known watermark during startup reload, with
    /// no subscribers yet attached. No locking: only valid before any other
    /// task is running.
    pub fn add_publisher_unlocked(&mut self, source: i64, watermark: i64) {
        let inner = self.inner.get_mut();
        inner
            .pub_to_subs
            .entry(source)
            .or_insert_with(|| SourceEntry {
                watermark,
                subs: HashMap::new(),
            });
    }

    /// Seeds a subscriber and spawns its consumer task during startup
    /// reload. No locking: only valid before any other task is running.
    pub fn add_subscriber_unlocked<F, Fut>(&mut self, dest: i64, make_consumer: F)
    where
        F: FnOnce(mpsc::Receiver<Update>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let inner = self.inner.get_mut();
        if !inner.subscribers.contains_key(&dest) {
            let (tx, rx) = mpsc::channel(FEED_CAPACITY);
            let handle = tokio::spawn(make_consumer(rx));
            inner.subscribers.insert(
                dest,
                DestEntry {
                    feed: tx,
                    refcount: 0,
                    handle,
                },
            );
        }
    }

    /// Re-establishes a fan-out edge during startup reload without
    /// spawning anything or touching refcounts beyond the simple
    /// increment. No locking: only valid before any other task is running.
    pub fn subscribe_unlocked(&mut self, dest: i64, source: i64, flags: Flags) {
        let inner = self.inner.get_mut();
        if let Some(entry) = inner.subscribers.get_mut(&dest) {
            entry.refcount += 1;
        }
        if let Some(src) = inner.pub_to_subs.get_mut(&source) {
            src.subs.insert(dest, flags);
        }
    }
}

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::PreparedPost;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_post(id: i64) -> PreparedPost {
        PreparedPost {
            owner_id: -7,
            post_id: id,
            text: "hi".to_string(),
            attachments: Default::default(),
            copy_history: Vec::new(),
            link: Default::default(),
        }
    }

    #[tokio::test]
    async fn subscribe_spawns_one_worker_per_destination() {
        let reg = Registry::new();
        let received = Arc::new(AtomicUsize::new(0));
        let r1 = received.clone();
        reg.subscribe(100, -7, 0, move |mut rx| async move {
            while rx.recv().await.is_some() {
                r1.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        assert_eq!(reg.worker_count().await, 1);

        // Second subscription to the same destination must not spawn a
        // second worker.
        reg.subscribe(100, -8, 0, move |_rx| async move {}).await;
        assert_eq!(reg.worker_count().await, 1);

        reg.publish(-7, vec![sample_post(1)]).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_last_link_closes_feed_and_worker_exits() {
        let reg = Registry::new();
        let exited = Arc::new(AtomicUsize::new(0));
        let e1 = exited.clone();
        reg.subscribe(100, -7, 0, move |mut rx| async move {
            while rx.recv().await.is_some() {}
            e1.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        reg.unsubscribe(100, -7).await;
        assert_eq!(reg.worker_count().await, 0);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(exited.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_only_reaches_subscribed_destinations() {
        let reg = Registry::new();
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let ca = count_a.clone();
        let cb = count_b.clone();
        reg.subscribe(1, -1, 0, move |mut rx| async move {
            while rx.recv().await.is_some() {
                ca.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        reg.subscribe(2, -2, 0, move |mut rx| async move {
            while rx.recv().await.is_some() {
                cb.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        reg.publish(-1, vec![sample_post(1)]).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 0);
    }
}
