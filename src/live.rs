//! Live collections: fetch, then refetch on every change notification
//!
//! A [`LiveCollection`] owns one background task. The task performs the
//! initial fetch, holds the table subscription, and replaces the published
//! snapshot with a fresh full read after every notification. There is no
//! delta patching: each snapshot is exactly what one fetch returned, deduped
//! by key.
//!
//! Once a subscription is acknowledged the task reads once more, so a write
//! that landed between the first read and the ack is not missed. When no
//! subscription can be established (or the change stream ends) the task
//! degrades to interval refetches. A failed fetch keeps the previous
//! items and records the error. Dropping the collection aborts the task,
//! which drops the subscription and releases it on the backend.

use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, ZestyError};
use crate::metrics::{MetricsCollector, RefetchTrigger};
use crate::models::Table;
use crate::realtime::{ChangeFeed, Subscription};

/// Source of the full collection
#[async_trait]
pub trait Fetch<T>: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Vec<T>>;
}

#[async_trait]
impl<T, F, Fut> Fetch<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>>> + Send,
{
    async fn fetch(&self) -> Result<Vec<T>> {
        (self)().await
    }
}

/// How the collection learns about changes
pub enum SyncSource {
    /// Subscribe to the table; poll at the interval if subscribing fails
    Push {
        feed: Arc<dyn ChangeFeed>,
        table: Table,
        fallback_poll: Option<Duration>,
    },
    /// Refetch on a fixed period
    Poll(Duration),
}

/// Knobs shared by every live collection
#[derive(Debug, Clone)]
pub struct LiveOptions {
    /// Upper bound for one fetch
    pub fetch_timeout: Duration,
    pub metrics: MetricsCollector,
}

impl LiveOptions {
    #[must_use]
    pub fn new(fetch_timeout: Duration) -> Self {
        Self { fetch_timeout, metrics: MetricsCollector::default() }
    }
}

/// How the snapshot is currently being kept fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Initial fetch and subscription still pending
    Connecting,
    /// Push notifications are flowing
    Live,
    /// Interval refetch
    Polling,
    /// No further updates will arrive
    Stale,
}

/// What a view renders
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    /// True until the first fetch has completed, successfully or not
    pub loading: bool,
    /// Error from the most recent fetch, cleared by the next success
    pub last_error: Option<String>,
    /// Number of successful fetches so far
    pub revision: u64,
    pub sync: SyncState,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: true,
            last_error: None,
            revision: 0,
            sync: SyncState::Connecting,
        }
    }
}

type KeyFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// A locally rendered list kept consistent with a backend table
pub struct LiveCollection<T> {
    name: &'static str,
    snapshot: watch::Receiver<Snapshot<T>>,
    refresh: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl<T> LiveCollection<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Start the fetch/subscribe task. `key` identifies rows for dedupe.
    pub fn spawn<F, K>(name: &'static str, fetch: F, source: SyncSource, key: K, options: LiveOptions) -> Self
    where
        F: Fetch<T>,
        K: Fn(&T) -> String + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(Snapshot::default());
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let fallback_poll = match &source {
            SyncSource::Push { fallback_poll, .. } => *fallback_poll,
            SyncSource::Poll(period) => Some(*period),
        };
        let worker = Worker {
            name,
            fetch: Arc::new(fetch),
            key: Arc::new(key),
            options,
            fallback_poll,
            snapshot: tx,
        };
        let task = tokio::spawn(worker.run(source, refresh_rx));
        Self { name, snapshot: rx, refresh: refresh_tx, task }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.snapshot.borrow().items.clone()
    }

    /// Wait until the snapshot changes
    pub async fn changed(&mut self) -> Result<Snapshot<T>> {
        self.snapshot
            .changed()
            .await
            .map_err(|_| ZestyError::Other(format!("{} stopped", self.name)))?;
        Ok(self.snapshot.borrow_and_update().clone())
    }

    /// Wait until `predicate` holds for the snapshot, up to `timeout`
    pub async fn wait_for<P>(&mut self, timeout: Duration, mut predicate: P) -> Result<Snapshot<T>>
    where
        P: FnMut(&Snapshot<T>) -> bool,
    {
        let name = self.name;
        let found = tokio::time::timeout(timeout, self.snapshot.wait_for(|s| predicate(s)))
            .await
            .map_err(|_| ZestyError::Timeout(timeout))?
            .map_err(|_| ZestyError::Other(format!("{name} stopped")))?;
        Ok(found.clone())
    }

    /// Request an immediate refetch; coalesces with one already queued
    pub fn refresh(&self) {
        let _ = self.refresh.try_send(());
    }

    /// A receiver for views that render from their own task
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.clone()
    }
}

impl<T> Drop for LiveCollection<T> {
    fn drop(&mut self) {
        debug!(collection = self.name, "Stopping live collection");
        self.task.abort();
    }
}

struct Worker<T> {
    name: &'static str,
    fetch: Arc<dyn Fetch<T>>,
    key: KeyFn<T>,
    options: LiveOptions,
    fallback_poll: Option<Duration>,
    snapshot: watch::Sender<Snapshot<T>>,
}

enum Trigger {
    Push {
        subscription: Subscription,
        table: &'static str,
        metrics: MetricsCollector,
    },
    Poll(tokio::time::Interval),
    Idle,
}

impl<T> Worker<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    async fn run(self, source: SyncSource, mut refresh: mpsc::Receiver<()>) {
        let ((), mut trigger) = tokio::join!(self.refetch(RefetchTrigger::Initial), self.connect(source));
        if let Trigger::Push { .. } = trigger {
            // writes between the first read and the subscription ack raise no notification
            self.refetch(RefetchTrigger::Initial).await;
        }
        self.set_sync(trigger.state());

        loop {
            let event = match &mut trigger {
                Trigger::Push { subscription, .. } => tokio::select! {
                    change = subscription.next() => match change {
                        Some(change) => {
                            debug!(collection = self.name, kind = ?change.kind, "Change notification");
                            Some(RefetchTrigger::Notification)
                        },
                        None => None,
                    },
                    Some(()) = refresh.recv() => Some(RefetchTrigger::Manual),
                },
                Trigger::Poll(interval) => tokio::select! {
                    _ = interval.tick() => Some(RefetchTrigger::Poll),
                    Some(()) = refresh.recv() => Some(RefetchTrigger::Manual),
                },
                Trigger::Idle => match refresh.recv().await {
                    Some(()) => Some(RefetchTrigger::Manual),
                    None => return,
                },
            };

            match event {
                Some(reason) => {
                    self.refetch(reason).await;
                },
                None => {
                    let Trigger::Push { table, .. } = &trigger else { continue };
                    warn!(collection = self.name, table, "Change stream closed");
                    trigger = self.degrade();
                    self.set_sync(trigger.state());
                },
            }
        }
    }

    async fn connect(&self, source: SyncSource) -> Trigger {
        match source {
            SyncSource::Poll(period) => Trigger::poll(period),
            SyncSource::Push { feed, table, .. } => match feed.subscribe(table).await {
                Ok(subscription) => {
                    info!(collection = self.name, %table, "Subscribed to changes");
                    self.options.metrics.subscription_opened(table.name());
                    Trigger::Push {
                        subscription,
                        table: table.name(),
                        metrics: self.options.metrics.clone(),
                    }
                },
                Err(e) => {
                    warn!(collection = self.name, %table, error = %e, "Subscription failed, falling back");
                    self.degrade()
                },
            },
        }
    }

    fn degrade(&self) -> Trigger {
        self.fallback_poll.map_or(Trigger::Idle, Trigger::poll)
    }

    async fn refetch(&self, reason: RefetchTrigger) {
        let result = match tokio::time::timeout(self.options.fetch_timeout, self.fetch.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(ZestyError::Timeout(self.options.fetch_timeout)),
        };
        self.options.metrics.record_refetch(self.name, reason, result.is_ok());

        match result {
            Ok(items) => {
                let items = dedupe(items, self.key.as_ref());
                debug!(collection = self.name, trigger = reason.as_str(), count = items.len(), "Refetched");
                self.snapshot.send_modify(|s| {
                    s.items = items;
                    s.loading = false;
                    s.last_error = None;
                    s.revision += 1;
                });
            },
            Err(e) => {
                warn!(collection = self.name, trigger = reason.as_str(), error = %e, "Refetch failed, keeping previous items");
                self.snapshot.send_modify(|s| {
                    s.loading = false;
                    s.last_error = Some(e.user_message());
                });
            },
        }
    }

    fn set_sync(&self, sync: SyncState) {
        self.snapshot.send_if_modified(|s| {
            let changed = s.sync != sync;
            s.sync = sync;
            changed
        });
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        debug!(collection = self.name, "Live collection task ended");
    }
}

impl Trigger {
    fn poll(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self::Poll(interval)
    }

    const fn state(&self) -> SyncState {
        match self {
            Self::Push { .. } => SyncState::Live,
            Self::Poll(_) => SyncState::Polling,
            Self::Idle => SyncState::Stale,
        }
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        if let Self::Push { table, metrics, .. } = self {
            metrics.subscription_closed(*table);
        }
    }
}

/// Keep the first occurrence of every key, preserving order
pub fn dedupe<T>(items: Vec<T>, key: &(dyn Fn(&T) -> String + Send + Sync)) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}
