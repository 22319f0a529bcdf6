//! Table-level change notifications
//!
//! A [`Subscription`] is the only handle to a live subscription. Dropping it
//! releases the backend side, whichever path the owner exits through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::Table;

/// Buffered notifications per subscription; overflow is dropped, which is
/// harmless because every notification triggers the same full refetch.
pub const SUBSCRIPTION_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change on a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// Primary key of the changed row, when the backend reports it
    pub record_id: Option<String>,
}

type Release = Box<dyn FnOnce() + Send>;

/// Receiving end of a table subscription
pub struct Subscription {
    table: Table,
    events: mpsc::Receiver<ChangeEvent>,
    release: Option<Release>,
}

impl Subscription {
    /// Wrap a receiver; `release` runs exactly once, when the handle is dropped
    pub fn new(table: Table, events: mpsc::Receiver<ChangeEvent>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            table,
            events,
            release: Some(Box::new(release)),
        }
    }

    #[must_use]
    pub const fn table(&self) -> Table {
        self.table
    }

    /// Next change, or `None` once the backend side has closed
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("table", &self.table).finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::debug!(table = %self.table, "Releasing change subscription");
            release();
        }
    }
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to insert/update/delete events on one table
    async fn subscribe(&self, table: Table) -> Result<Subscription>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn release_runs_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let counter = released.clone();
        let mut sub = Subscription::new(Table::Incidents, rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(ChangeEvent { table: Table::Incidents, kind: ChangeKind::Insert, record_id: None })
            .await
            .unwrap();
        assert_eq!(sub.next().await.map(|e| e.kind), Some(ChangeKind::Insert));

        drop(sub);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn change_kind_parses_wire_names() {
        let kind: ChangeKind = serde_json::from_str("\"UPDATE\"").unwrap();
        assert_eq!(kind, ChangeKind::Update);
    }
}
