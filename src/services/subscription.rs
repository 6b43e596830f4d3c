// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live query slot: at most one open subscription, keyed.
//!
//! A [`LiveCollection`] owns a single live query at a time, identified by a
//! key (a user ID, a ticket ID). Opening a different key closes the previous
//! query first. Snapshots arrive over a channel and are processed in order by
//! a receive task that publishes an immutable [`LiveView`] on a watch
//! channel; readers never see a list mutated in place.
//!
//! Every open bumps a generation counter under the slot lock, and the receive
//! task applies events under that same lock only if its generation is still
//! current. Once `close` returns, no event from the closed query can change
//! the published view.

use crate::db::{CollectionQuery, Document, DocumentStore, ListenerRegistration, SnapshotEvent};
use crate::error::{AppError, SubscriptionError};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Published state of a live query.
#[derive(Debug)]
pub struct LiveView<T> {
    /// Items from the last snapshot, in server order
    pub items: Arc<Vec<T>>,
    /// True until the first snapshot for the current key arrives
    pub loading: bool,
    /// Last subscription error; cleared by the next good snapshot
    pub error: Option<String>,
    /// Key of the query that produced this view
    pub key: Option<String>,
}

impl<T> Clone for LiveView<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            loading: self.loading,
            error: self.error.clone(),
            key: self.key.clone(),
        }
    }
}

impl<T> Default for LiveView<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            loading: true,
            error: None,
            key: None,
        }
    }
}

struct Active {
    key: String,
    query: CollectionQuery,
    registration: ListenerRegistration,
    task: JoinHandle<()>,
}

impl Active {
    fn shutdown(self) {
        self.task.abort();
        self.registration.unsubscribe();
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    active: Option<Active>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Invalidate the current generation and release the active query.
fn close_slot(slot: &Mutex<Slot>, label: &'static str) {
    let previous = {
        let mut slot = lock(slot);
        slot.generation += 1;
        slot.active.take()
    };
    if let Some(previous) = previous {
        tracing::debug!(collection = label, key = %previous.key, "Live query closed");
        previous.shutdown();
    }
}

/// One keyed live query and its published view.
pub struct LiveCollection<S, T> {
    store: S,
    label: &'static str,
    slot: Arc<Mutex<Slot>>,
    view: Arc<watch::Sender<LiveView<T>>>,
}

impl<S, T> LiveCollection<S, T>
where
    S: DocumentStore,
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(store: S, label: &'static str) -> Self {
        let (view, _) = watch::channel(LiveView::default());
        Self {
            store,
            label,
            slot: Arc::new(Mutex::new(Slot::default())),
            view: Arc::new(view),
        }
    }

    /// Current published view.
    pub fn view(&self) -> LiveView<T> {
        self.view.borrow().clone()
    }

    /// Receiver notified on every published view.
    pub fn watch(&self) -> watch::Receiver<LiveView<T>> {
        self.view.subscribe()
    }

    /// Key of the open query, if any.
    pub fn current_key(&self) -> Option<String> {
        lock(&self.slot).active.as_ref().map(|a| a.key.clone())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Open the query for `key`. A no-op if `key` is already open; otherwise
    /// the previous query is closed and the view cleared before subscribing.
    pub fn open(&self, key: &str, query: CollectionQuery) -> Result<(), AppError> {
        let mut slot = lock(&self.slot);
        if slot.active.as_ref().is_some_and(|a| a.key == key) {
            return Ok(());
        }
        self.install(&mut slot, key.to_string(), query, false)
    }

    /// Close and re-open the current query, keeping the visible items while
    /// the fresh snapshot loads. Returns false when nothing is open.
    pub fn reopen(&self) -> Result<bool, AppError> {
        let mut slot = lock(&self.slot);
        let Some(active) = slot.active.as_ref() else {
            return Ok(false);
        };
        let key = active.key.clone();
        let query = active.query.clone();
        self.install(&mut slot, key, query, true)?;
        Ok(true)
    }

    /// Tear down the open query. The published view is left as it was.
    pub fn close(&self) {
        close_slot(&self.slot, self.label);
    }

    /// Tear down and publish an empty, idle view.
    pub fn reset(&self) {
        self.close();
        self.view.send_replace(LiveView {
            loading: false,
            ..LiveView::default()
        });
    }

    /// Wait until the current key has produced a snapshot or an error.
    pub async fn wait_loaded(&self) -> LiveView<T> {
        let mut rx = self.view.subscribe();
        let result = rx.wait_for(|view| !view.loading).await.map(|v| v.clone());
        match result {
            Ok(view) => view,
            Err(_) => self.view(),
        }
    }

    fn install(
        &self,
        slot: &mut Slot,
        key: String,
        query: CollectionQuery,
        keep_items: bool,
    ) -> Result<(), AppError> {
        slot.generation += 1;
        let generation = slot.generation;

        // Old query goes away before the new one is attached
        if let Some(previous) = slot.active.take() {
            tracing::debug!(collection = self.label, key = %previous.key, "Live query replaced");
            previous.shutdown();
        }

        self.view.send_modify(|view| {
            if !keep_items {
                view.items = Arc::new(Vec::new());
            }
            view.loading = true;
            view.error = None;
            view.key = Some(key.clone());
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let registration = match self.store.subscribe(query.clone(), tx) {
            Ok(registration) => registration,
            Err(e) => {
                tracing::warn!(collection = self.label, key = %key, error = %e, "Subscribe failed");
                self.view.send_modify(|view| {
                    view.loading = false;
                    view.error = Some(e.to_string());
                });
                return Err(e);
            }
        };

        let task = tokio::spawn(receive_loop(
            rx,
            self.slot.clone(),
            self.view.clone(),
            generation,
            self.label,
        ));

        tracing::info!(collection = self.label, key = %key, generation, "Live query opened");
        slot.active = Some(Active {
            key,
            query,
            registration,
            task,
        });
        Ok(())
    }
}

impl<S, T> Drop for LiveCollection<S, T> {
    fn drop(&mut self) {
        close_slot(&self.slot, self.label);
    }
}

/// Process events for one generation, in arrival order.
async fn receive_loop<T: DeserializeOwned>(
    mut rx: mpsc::UnboundedReceiver<SnapshotEvent>,
    slot: Arc<Mutex<Slot>>,
    view: Arc<watch::Sender<LiveView<T>>>,
    generation: u64,
    label: &'static str,
) {
    while let Some(event) = rx.recv().await {
        let update = match event {
            SnapshotEvent::Snapshot(docs) => Ok(decode_all(&docs, label)),
            SnapshotEvent::Error(err) => Err(err),
        };
        if !apply(&slot, &view, generation, label, update) {
            return;
        }
    }
}

/// Apply one event if `generation` is still current. Returns false once the
/// query has been closed.
fn apply<T>(
    slot: &Mutex<Slot>,
    view: &watch::Sender<LiveView<T>>,
    generation: u64,
    label: &'static str,
    update: Result<Vec<T>, SubscriptionError>,
) -> bool {
    let current = lock(slot);
    if current.generation != generation {
        tracing::debug!(collection = label, generation, "Discarding event for closed live query");
        return false;
    }

    match update {
        Ok(items) => {
            let count = items.len();
            view.send_modify(|v| {
                v.items = Arc::new(items);
                v.loading = false;
                v.error = None;
            });
            tracing::debug!(collection = label, count, "Snapshot applied");
        }
        Err(err) => {
            // Items from the last good snapshot stay visible
            tracing::warn!(collection = label, error = %err, "Live query error");
            view.send_modify(|v| {
                v.loading = false;
                v.error = Some(err.message.clone());
            });
        }
    }
    true
}

fn decode_all<T: DeserializeOwned>(docs: &[Document], label: &'static str) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(
                    collection = label,
                    id = %doc.id,
                    error = %e,
                    "Skipping malformed document"
                );
                None
            }
        })
        .collect()
}
