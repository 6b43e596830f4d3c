// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Document store layer.
//!
//! The backend is reached through [`DocumentStore`]: live queries deliver
//! whole ordered snapshots over a channel, and point writes go through
//! `write`/`update`. [`FirestoreDb`] talks to Firestore; [`MemoryStore`]
//! keeps everything in process.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::{AppError, SubscriptionError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use tokio::sync::mpsc;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TICKETS: &str = "tickets";
    pub const COMMENTS: &str = "comments";
}

/// A document read from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Deserialize into a model, exposing the document ID as field `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filter on a string field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

/// A filtered, ordered query over one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<(String, Direction)>,
}

impl CollectionQuery {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: &str) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    /// Whether a document's fields satisfy every filter.
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        self.filters.iter().all(|filter| {
            fields
                .get(&filter.field)
                .and_then(Value::as_str)
                .is_some_and(|v| v == filter.value)
        })
    }
}

/// Message pushed on a live query.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    /// Complete ordered result set; replaces any earlier one.
    Snapshot(Vec<Document>),
    Error(SubscriptionError),
}

/// Fields of a point write plus the fields the backend stamps with its clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteFields {
    pub fields: Map<String, Value>,
    pub server_timestamps: Vec<String>,
}

impl WriteFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a serializable body. The body must serialize to a map.
    pub fn from_object<T: Serialize>(body: &T) -> Result<Self, AppError> {
        match serde_json::to_value(body) {
            Ok(Value::Object(fields)) => Ok(Self {
                fields,
                server_timestamps: Vec::new(),
            }),
            Ok(other) => Err(AppError::Internal(anyhow::anyhow!(
                "write body must be an object, got {}",
                other
            ))),
            Err(e) => Err(AppError::Internal(e.into())),
        }
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.server_timestamps.push(field.to_string());
        self
    }

    /// Split into the literal fields and the names the server stamps.
    /// Stamped names never appear among the literal fields.
    pub fn into_parts(self) -> (Map<String, Value>, Vec<String>) {
        let mut fields = self.fields;
        for field in &self.server_timestamps {
            fields.remove(field);
        }
        (fields, self.server_timestamps)
    }

    /// Resolve server timestamps with the given clock reading.
    pub fn stamped(self, now: &str) -> Map<String, Value> {
        let mut fields = self.fields;
        for field in self.server_timestamps {
            fields.insert(field, Value::String(now.to_string()));
        }
        fields
    }
}

/// Handle to a live query. Dropping it unsubscribes.
pub struct ListenerRegistration {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Remote document database with live queries.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Start a live query. Snapshots and errors go to `sink` until the
    /// returned registration is dropped.
    fn subscribe(
        &self,
        query: CollectionQuery,
        sink: mpsc::UnboundedSender<SnapshotEvent>,
    ) -> Result<ListenerRegistration, AppError>;

    /// Read one document without subscribing.
    fn get_once(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, AppError>> + Send;

    /// Create a document (server-assigned ID when `id` is `None`) or
    /// overwrite the document with the given ID. Returns the document ID.
    fn write(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: WriteFields,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Update the listed fields of an existing document.
    fn update(
        &self,
        collection: &str,
        id: &str,
        fields: WriteFields,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
