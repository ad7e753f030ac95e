use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rusqlite::hooks::Action;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::StoreError;
use crate::schema::{APP_IDEAS_TABLE, CATEGORIES_TABLE};

/// Base table a live query re-evaluates against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Categories,
    AppIdeas,
}

impl Table {
    /// Map a SQLite table name to the live table it feeds.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            CATEGORIES_TABLE => Some(Self::Categories),
            APP_IDEAS_TABLE => Some(Self::AppIdeas),
            _ => None,
        }
    }
}

/// Tables changed on one connection since the last [`ChangeTracker::take`].
///
/// Fed by SQLite's update hook, so rows rewritten by raw statements, triggers
/// and foreign-key actions are all seen.
#[derive(Clone, Default)]
pub(crate) struct ChangeTracker {
    touched: Arc<Mutex<BTreeSet<Table>>>,
}

impl ChangeTracker {
    /// Install the update hook on `conn`. A connection has one hook; a second
    /// install replaces the first tracker.
    pub(crate) fn install(conn: &Connection) -> Self {
        let tracker = Self::default();
        let sink = Arc::clone(&tracker.touched);
        conn.update_hook(Some(move |_action: Action, _db: &str, table: &str, _rowid: i64| {
            if let Some(table) = Table::from_name(table) {
                sink.lock().insert(table);
            }
        }));
        tracker
    }

    pub(crate) fn clear(&self) {
        self.touched.lock().clear();
    }

    pub(crate) fn take(&self) -> BTreeSet<Table> {
        std::mem::take(&mut *self.touched.lock())
    }
}

trait LiveEntry: Send {
    fn observes(&self, table: Table) -> bool;
    fn refresh(&self, conn: &Connection) -> Result<(), StoreError>;
    fn is_closed(&self) -> bool;
}

struct WatchEntry<T, F> {
    table: Table,
    fetch: F,
    sender: watch::Sender<T>,
}

impl<T, F> LiveEntry for WatchEntry<T, F>
where
    T: Send + Sync,
    F: Fn(&Connection) -> Result<T, StoreError> + Send,
{
    fn observes(&self, table: Table) -> bool {
        self.table == table
    }

    fn refresh(&self, conn: &Connection) -> Result<(), StoreError> {
        let value = (self.fetch)(conn)?;
        self.sender.send_replace(value);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    entries: BTreeMap<u64, Box<dyn LiveEntry>>,
}

/// Registry of live queries, republished after every committed write.
#[derive(Clone, Default)]
pub struct LiveQueryHub {
    state: Arc<Mutex<HubState>>,
}

impl LiveQueryHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `fetch` once for the initial result and keep it registered
    /// against `table`.
    ///
    /// # Errors
    /// Returns the error of the initial evaluation; nothing is registered then.
    pub fn register<T, F>(
        &self,
        conn: &Connection,
        table: Table,
        fetch: F,
    ) -> Result<Subscription<T>, StoreError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let initial = fetch(conn)?;
        let (sender, receiver) = watch::channel(initial);

        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let entry = WatchEntry {
            table,
            fetch,
            sender,
        };
        state.entries.insert(id, Box::new(entry));
        tracing::debug!(subscription = id, ?table, "live query registered");

        Ok(Subscription {
            id,
            receiver,
            hub: Arc::downgrade(&self.state),
        })
    }

    /// Re-run every live query observing one of `tables`. Call only after the
    /// write that touched them has committed.
    pub fn publish(&self, conn: &Connection, tables: &[Table]) {
        let mut state = self.state.lock();
        state.entries.retain(|_, entry| !entry.is_closed());

        for (id, entry) in &state.entries {
            if !tables.iter().any(|table| entry.observes(*table)) {
                continue;
            }
            if let Err(err) = entry.refresh(conn) {
                tracing::warn!(
                    subscription = id,
                    error = %err,
                    "live query refresh failed; keeping last result"
                );
            }
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().entries.len()
    }
}

/// Handle to a live query: the latest result plus a change signal.
///
/// Writes that land before the holder looks are coalesced; only the newest
/// result is kept. Dropping the handle unsubscribes.
pub struct Subscription<T> {
    id: u64,
    receiver: watch::Receiver<T>,
    hub: Weak<Mutex<HubState>>,
}

impl<T: Clone> Subscription<T> {
    #[must_use]
    pub fn current(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// Whether a newer result arrived since the last `try_next`/`changed`.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Take the newest result if one arrived since the last look.
    pub fn try_next(&mut self) -> Option<T> {
        if !self.has_changed() {
            return None;
        }
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait for the next result. `None` once the store has shut down.
    pub async fn changed(&mut self) -> Option<T> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Stop delivery. No refresh reaches this subscription after it returns.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(state) = self.hub.upgrade() {
            state.lock().entries.remove(&self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
