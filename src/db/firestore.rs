// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed [`DocumentStore`].
//!
//! Live queries use a Firestore listener as a change signal only: after each
//! burst of change events the query is re-run and the full ordered result
//! is pushed as one snapshot, so consumers never patch incrementally.
//!
//! Server timestamps are field transforms set to the request time, so
//! `createdAt` and `updatedAt` are native Timestamp values from the server
//! clock.

use crate::db::{
    CollectionQuery, Direction, Document, DocumentStore, ListenerRegistration, SnapshotEvent,
    WriteFields,
};
use crate::error::{AppError, SubscriptionError, SubscriptionErrorKind};
use firestore::errors::FirestoreError;
use firestore::{
    FirestoreFieldTransform, FirestoreListenEvent, FirestoreListenerTarget,
    FirestoreMemListenStateStorage, FirestoreQueryDirection, FirestoreTransformServerValue,
    FirestoreWritePrecondition,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};

/// Metadata keys the firestore deserializer adds to every document.
const METADATA_PREFIX: &str = "_firestore_";

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    next_target: Arc<AtomicU32>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self::with_client(Some(client)))
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self::with_client(Some(client)))
    }

    /// Create a disconnected client. Every operation returns an error.
    pub fn new_mock() -> Self {
        Self::with_client(None)
    }

    fn with_client(client: Option<firestore::FirestoreDb>) -> Self {
        Self {
            client,
            next_target: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Underlying firestore client.
    pub fn client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.get_client()
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

/// Run a query once and convert the results.
async fn run_query(
    client: &firestore::FirestoreDb,
    query: &CollectionQuery,
) -> Result<Vec<Document>, FirestoreError> {
    let filters = query.filters.clone();
    let select = client
        .fluent()
        .select()
        .from(query.collection.as_str())
        .filter(move |q| {
            q.for_all(
                filters
                    .iter()
                    .map(|f| q.field(f.field.as_str()).eq(f.value.as_str())),
            )
        });

    let select = match &query.order_by {
        Some((field, direction)) => select.order_by([(field.as_str(), to_direction(*direction))]),
        None => select,
    };

    let docs = select.query().await?;
    docs.iter().map(convert_document).collect()
}

fn to_direction(direction: Direction) -> FirestoreQueryDirection {
    match direction {
        Direction::Ascending => FirestoreQueryDirection::Ascending,
        Direction::Descending => FirestoreQueryDirection::Descending,
    }
}

/// Convert a raw document into our ID + JSON field map form.
fn convert_document(doc: &firestore::FirestoreDocument) -> Result<Document, FirestoreError> {
    let id = doc.name.rsplit('/').next().unwrap_or_default().to_string();
    let value: Value = firestore::FirestoreDb::deserialize_doc_to(doc)?;
    let fields = match value {
        Value::Object(map) => map
            .into_iter()
            .filter(|(key, _)| !key.starts_with(METADATA_PREFIX))
            .collect(),
        _ => Map::new(),
    };
    Ok(Document::new(id, fields))
}

fn subscription_error(err: &FirestoreError) -> SubscriptionError {
    let message = err.to_string();
    let kind = if message.contains("PermissionDenied") || message.contains("PERMISSION_DENIED") {
        SubscriptionErrorKind::PermissionDenied
    } else if matches!(err, FirestoreError::NetworkError(_)) {
        SubscriptionErrorKind::NetworkLost
    } else {
        SubscriptionErrorKind::Other
    };
    SubscriptionError::new(kind, message)
}

/// Drive one live query until `stop` fires or the sink closes.
async fn run_listener(
    client: firestore::FirestoreDb,
    target: FirestoreListenerTarget,
    query: CollectionQuery,
    sink: mpsc::UnboundedSender<SnapshotEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut listener = match client
        .create_listener(FirestoreMemListenStateStorage::new())
        .await
    {
        Ok(listener) => listener,
        Err(e) => {
            let _ = sink.send(SnapshotEvent::Error(subscription_error(&e)));
            return;
        }
    };

    let filters = query.filters.clone();
    let added = client
        .fluent()
        .select()
        .from(query.collection.as_str())
        .filter(move |q| {
            q.for_all(
                filters
                    .iter()
                    .map(|f| q.field(f.field.as_str()).eq(f.value.as_str())),
            )
        })
        .listen()
        .add_target(target, &mut listener);
    if let Err(e) = added {
        let _ = sink.send(SnapshotEvent::Error(subscription_error(&e)));
        return;
    }

    // Change events only mark the result dirty; Notify coalesces bursts.
    let changed = Arc::new(Notify::new());
    let signal = changed.clone();
    let started = listener
        .start(move |_event: FirestoreListenEvent| {
            let signal = signal.clone();
            async move {
                signal.notify_one();
                Ok(())
            }
        })
        .await;
    if let Err(e) = started {
        let _ = sink.send(SnapshotEvent::Error(subscription_error(&e)));
        return;
    }

    tracing::debug!(collection = %query.collection, "Firestore listener started");
    changed.notify_one();

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = sink.closed() => break,
            _ = changed.notified() => {
                let event = match run_query(&client, &query).await {
                    Ok(docs) => SnapshotEvent::Snapshot(docs),
                    Err(e) => {
                        tracing::warn!(
                            collection = %query.collection,
                            error = %e,
                            "Live query failed"
                        );
                        SnapshotEvent::Error(subscription_error(&e))
                    }
                };
                if sink.send(event).is_err() {
                    break;
                }
            }
        }
    }

    if let Err(e) = listener.shutdown().await {
        tracing::warn!(collection = %query.collection, error = %e, "Listener shutdown failed");
    }
    tracing::debug!(collection = %query.collection, "Firestore listener stopped");
}

/// Fresh document ID for a create.
fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl DocumentStore for FirestoreDb {
    fn subscribe(
        &self,
        query: CollectionQuery,
        sink: mpsc::UnboundedSender<SnapshotEvent>,
    ) -> Result<ListenerRegistration, AppError> {
        let client = self.get_client()?.clone();
        let target = FirestoreListenerTarget::new(self.next_target.fetch_add(1, Ordering::Relaxed));
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(run_listener(client, target, query, sink, stop_rx));

        Ok(ListenerRegistration::new(move || {
            let _ = stop_tx.send(());
        }))
    }

    async fn get_once(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        let doc = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        doc.as_ref()
            .map(convert_document)
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn write(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: WriteFields,
    ) -> Result<String, AppError> {
        let client = self.get_client()?;
        let (fields, stamped) = fields.into_parts();
        let body = Value::Object(fields);

        // Creates must not clobber an existing document
        let (id, precondition) = match id {
            Some(id) => (id.to_string(), None),
            None => (
                new_document_id(),
                Some(FirestoreWritePrecondition::Exists(false)),
            ),
        };

        let update = client.fluent().update().in_col(collection);
        let update = match precondition {
            Some(precondition) => update.precondition(precondition),
            None => update,
        };
        let _: () = update
            .document_id(&id)
            .object(&body)
            .transforms(|t| {
                // Set each stamped field to the server's request time
                let transforms: Vec<Option<FirestoreFieldTransform>> = stamped
                    .iter()
                    .map(|name| t.field(name.as_str()).server_value(FirestoreTransformServerValue::RequestTime))
                    .collect();
                t.fields(transforms)
            })
            .execute()
            .await
            .map_err(|e| AppError::Write(e.to_string()))?;

        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: WriteFields,
    ) -> Result<(), AppError> {
        let (fields, stamped) = fields.into_parts();
        let names: Vec<String> = fields.keys().cloned().collect();
        let body = Value::Object(fields);

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(names)
            .in_col(collection)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&body)
            .transforms(|t| {
                // Set each stamped field to the server's request time
                let transforms: Vec<Option<FirestoreFieldTransform>> = stamped
                    .iter()
                    .map(|name| t.field(name.as_str()).server_value(FirestoreTransformServerValue::RequestTime))
                    .collect();
                t.fields(transforms)
            })
            .execute()
            .await
            .map_err(|e| AppError::Write(e.to_string()))?;
        Ok(())
    }
}
