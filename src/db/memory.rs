// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store.
//!
//! Behaves like the remote backend from the client's point of view: live
//! queries receive a fresh ordered snapshot after every write that touches
//! their collection, and server timestamps come from a store-owned clock.
//! Used for offline mode and tests.
//!
//! Commits are serialized: a write, its timestamp and the snapshots it fans
//! out happen under one lock, so listeners see snapshots in commit order.

use crate::db::{
    CollectionQuery, Direction, Document, DocumentStore, ListenerRegistration, SnapshotEvent,
    WriteFields,
};
use crate::error::{AppError, SubscriptionError};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

type Collection = BTreeMap<String, Map<String, Value>>;

struct Listener {
    query: CollectionQuery,
    sink: mpsc::UnboundedSender<SnapshotEvent>,
}

#[derive(Default)]
struct Inner {
    collections: DashMap<String, Collection>,
    listeners: DashMap<u64, Listener>,
    next_listener: AtomicU64,
    next_doc: AtomicU64,
    writes: AtomicUsize,
    clock: Mutex<Option<DateTime<Utc>>>,
    write_failure: Mutex<Option<String>>,
    commits: Mutex<()>,
}

/// In-memory [`DocumentStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document directly, bypassing write accounting.
    pub fn insert(&self, collection: &str, id: &str, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let _commit = self.lock_commits();
        self.inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        self.notify(collection);
    }

    /// Current fields of a document.
    pub fn document(&self, collection: &str, id: &str) -> Option<Map<String, Value>> {
        self.inner
            .collections
            .get(collection)
            .and_then(|c| c.get(id).cloned())
    }

    /// Number of `write`/`update` calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(AtomicOrdering::SeqCst)
    }

    /// Number of open live queries.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Make every following write fail with `message`, or succeed again with `None`.
    pub fn fail_writes(&self, message: Option<&str>) {
        *self
            .inner
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = message.map(str::to_string);
    }

    /// Push an error to every live query on `collection`.
    pub fn fail_listeners(&self, collection: &str, error: SubscriptionError) {
        for listener in self.inner.listeners.iter() {
            if listener.query.collection == collection {
                let _ = listener.sink.send(SnapshotEvent::Error(error.clone()));
            }
        }
    }

    /// Pin the server clock. Each stamp advances it by one millisecond.
    pub fn set_clock(&self, now: DateTime<Utc>) {
        *self
            .inner
            .clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.inner
            .commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the server clock. Strictly increasing so creation order is total.
    fn server_now(&self) -> String {
        let mut clock = self
            .inner
            .clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let next = match *clock {
            Some(last) => std::cmp::max(last + Duration::milliseconds(1), Utc::now()),
            None => Utc::now(),
        };
        *clock = Some(next);
        format_utc_rfc3339(next)
    }

    fn check_write(&self) -> Result<(), AppError> {
        self.inner.writes.fetch_add(1, AtomicOrdering::SeqCst);
        let failure = self
            .inner
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match failure {
            Some(message) => Err(AppError::Write(message)),
            None => Ok(()),
        }
    }

    /// Evaluate a query against the current contents.
    fn run_query(&self, query: &CollectionQuery) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .inner
            .collections
            .get(&query.collection)
            .map(|collection| {
                collection
                    .iter()
                    .filter(|(_, fields)| query.matches(fields))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            docs.sort_by(|a, b| {
                let ordering = compare_values(a.fields.get(field), b.fields.get(field));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
        docs
    }

    /// Push a fresh snapshot to every live query on `collection`.
    fn notify(&self, collection: &str) {
        let targets: Vec<(CollectionQuery, mpsc::UnboundedSender<SnapshotEvent>)> = self
            .inner
            .listeners
            .iter()
            .filter(|l| l.query.collection == collection)
            .map(|l| (l.query.clone(), l.sink.clone()))
            .collect();

        for (query, sink) in targets {
            let snapshot = self.run_query(&query);
            let _ = sink.send(SnapshotEvent::Snapshot(snapshot));
        }
    }
}

/// Order JSON values: strings and numbers by value, missing values first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (None, Some(_)) | (Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), None) | (Some(_), Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn remove_listener(inner: &Weak<Inner>, id: u64) {
    if let Some(inner) = inner.upgrade() {
        inner.listeners.remove(&id);
    }
}

impl DocumentStore for MemoryStore {
    fn subscribe(
        &self,
        query: CollectionQuery,
        sink: mpsc::UnboundedSender<SnapshotEvent>,
    ) -> Result<ListenerRegistration, AppError> {
        let id = self.inner.next_listener.fetch_add(1, AtomicOrdering::SeqCst);

        // Initial snapshot, like the backend does on attach
        {
            let _commit = self.lock_commits();
            let _ = sink.send(SnapshotEvent::Snapshot(self.run_query(&query)));
            self.inner.listeners.insert(id, Listener { query, sink });
        }

        let inner = Arc::downgrade(&self.inner);
        Ok(ListenerRegistration::new(move || remove_listener(&inner, id)))
    }

    async fn get_once(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        Ok(self
            .document(collection, id)
            .map(|fields| Document::new(id, fields)))
    }

    async fn write(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: WriteFields,
    ) -> Result<String, AppError> {
        self.check_write()?;

        let id = match id {
            Some(id) => id.to_string(),
            None => format!(
                "doc{:06}",
                self.inner.next_doc.fetch_add(1, AtomicOrdering::SeqCst) + 1
            ),
        };

        let _commit = self.lock_commits();
        let fields = fields.stamped(&self.server_now());
        self.inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        self.notify(collection);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: WriteFields,
    ) -> Result<(), AppError> {
        self.check_write()?;

        let _commit = self.lock_commits();
        let fields = fields.stamped(&self.server_now());
        {
            let mut docs = self
                .inner
                .collections
                .get_mut(collection)
                .ok_or_else(|| AppError::NotFound(format!("{}/{}", collection, id)))?;
            let doc = docs
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("{}/{}", collection, id)))?;
            doc.extend(fields);
        }

        self.notify(collection);
        Ok(())
    }
}
