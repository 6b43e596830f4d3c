// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use helpdesk_sync::db::{
    CollectionQuery, Document, DocumentStore, FirestoreDb, ListenerRegistration, SnapshotEvent,
    WriteFields,
};
use helpdesk_sync::error::AppError;
use helpdesk_sync::services::LiveView;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, OwnedRwLockWriteGuard, RwLock};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ═══════════════════════════════════════════════════════════════════════════
// MANUAL STORE
// ═══════════════════════════════════════════════════════════════════════════

/// One subscription opened against a [`ManualStore`].
#[allow(dead_code)]
pub struct Subscription {
    pub query: CollectionQuery,
    pub sink: mpsc::UnboundedSender<SnapshotEvent>,
    pub closed: Arc<AtomicBool>,
}

#[derive(Default)]
struct ManualInner {
    subscriptions: Mutex<Vec<Subscription>>,
    documents: Mutex<HashMap<(String, String), Map<String, Value>>>,
    writes: Mutex<Vec<(String, Map<String, Value>)>>,
    fail_reads: AtomicBool,
    read_gate: Arc<RwLock<()>>,
    reads: AtomicUsize,
    next_id: AtomicUsize,
}

/// Store driven by hand: tests decide what every subscription receives
/// and when, including events sent after the subscription was closed.
#[derive(Clone, Default)]
pub struct ManualStore {
    inner: Arc<ManualInner>,
}

#[allow(dead_code)]
impl ManualStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscriptions ever opened.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().unwrap().len()
    }

    /// Number of subscriptions not yet unsubscribed.
    pub fn open_count(&self) -> usize {
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| !s.closed.load(Ordering::SeqCst))
            .count()
    }

    pub fn is_closed(&self, index: usize) -> bool {
        self.inner.subscriptions.lock().unwrap()[index]
            .closed
            .load(Ordering::SeqCst)
    }

    pub fn query(&self, index: usize) -> CollectionQuery {
        self.inner.subscriptions.lock().unwrap()[index].query.clone()
    }

    /// Send an event on subscription `index`, open or not. Returns whether
    /// the receiving side still existed.
    pub fn push(&self, index: usize, event: SnapshotEvent) -> bool {
        self.inner.subscriptions.lock().unwrap()[index]
            .sink
            .send(event)
            .is_ok()
    }

    pub fn push_snapshot(&self, index: usize, docs: Vec<Document>) -> bool {
        self.push(index, SnapshotEvent::Snapshot(docs))
    }

    /// Seed a document for `get_once`.
    pub fn put(&self, collection: &str, id: &str, fields: Value) {
        let fields = fields.as_object().cloned().unwrap_or_default();
        self.inner
            .documents
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()), fields);
    }

    /// Make `get_once` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Block every `get_once` until the returned guard is dropped.
    pub fn hold_reads(&self) -> OwnedRwLockWriteGuard<()> {
        self.inner
            .read_gate
            .clone()
            .try_write_owned()
            .expect("reads already held")
    }

    /// Wait until `count` reads have started, held or not.
    pub async fn wait_reads(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while self.inner.reads.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timed out waiting for reads");
    }

    /// Writes and updates seen so far, with server timestamps stamped.
    pub fn writes(&self) -> Vec<(String, Map<String, Value>)> {
        self.inner.writes.lock().unwrap().clone()
    }
}

impl DocumentStore for ManualStore {
    fn subscribe(
        &self,
        query: CollectionQuery,
        sink: mpsc::UnboundedSender<SnapshotEvent>,
    ) -> Result<ListenerRegistration, AppError> {
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();
        self.inner.subscriptions.lock().unwrap().push(Subscription {
            query,
            sink,
            closed,
        });
        Ok(ListenerRegistration::new(move || {
            flag.store(true, Ordering::SeqCst);
        }))
    }

    async fn get_once(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        let _gate = self.inner.read_gate.read().await;
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Database("read failed".to_string()));
        }
        Ok(self
            .inner
            .documents
            .lock()
            .unwrap()
            .get(&(collection.to_string(), id.to_string()))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn write(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: WriteFields,
    ) -> Result<String, AppError> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| format!("m{}", self.inner.next_id.fetch_add(1, Ordering::SeqCst)));
        let fields = fields.stamped("2024-01-15T10:00:00.000Z");
        self.inner
            .documents
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.clone()), fields.clone());
        self.inner
            .writes
            .lock()
            .unwrap()
            .push((collection.to_string(), fields));
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        _id: &str,
        fields: WriteFields,
    ) -> Result<(), AppError> {
        self.inner
            .writes
            .lock()
            .unwrap()
            .push((collection.to_string(), fields.stamped("2024-01-15T10:00:00.000Z")));
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DOCUMENT BUILDERS
// ═══════════════════════════════════════════════════════════════════════════

#[allow(dead_code)]
pub fn ticket_doc(id: &str, uid: &str, title: &str, priority: &str, created_at: &str) -> Document {
    let fields = json!({
        "title": title,
        "description": "Ne fonctionne plus depuis ce matin",
        "priority": priority,
        "category": "network",
        "status": "new",
        "assignedTo": uid,
        "createdBy": uid,
        "createdAt": created_at,
        "deviceInfo": { "os": "android" },
    });
    Document::new(id, fields.as_object().cloned().unwrap())
}

#[allow(dead_code)]
pub fn comment_doc(id: &str, ticket_id: &str, content: &str, created_at: &str) -> Document {
    let fields = json!({
        "ticketId": ticket_id,
        "userId": "u1",
        "content": content,
        "createdAt": created_at,
    });
    Document::new(id, fields.as_object().cloned().unwrap())
}

// ═══════════════════════════════════════════════════════════════════════════
// WAITING
// ═══════════════════════════════════════════════════════════════════════════

/// Wait until the published view satisfies `pred`, failing after a second.
#[allow(dead_code)]
pub async fn wait_view<T>(
    rx: &mut watch::Receiver<LiveView<T>>,
    pred: impl FnMut(&LiveView<T>) -> bool,
) -> LiveView<T> {
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(pred))
        .await
        .expect("Timed out waiting for view")
        .expect("View channel closed")
        .clone()
}

/// Give spawned tasks a moment to run.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
