// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Run with FIRESTORE_EMULATOR_HOST pointing at the emulator.
//!
//! The emulator provides a clean state for each test run.

use gcloud_sdk::google::firestore::v1::value::ValueType;
use helpdesk_sync::db::{DocumentStore, FirestoreDb};
use helpdesk_sync::models::{CurrentUser, Identity, Priority, TicketForm, TicketStatus};
use helpdesk_sync::services::session::SessionState;
use helpdesk_sync::services::{CommentStore, TicketMutator, TicketStore};
use std::time::Duration;
use tokio::sync::watch;

mod common;
use common::test_db;

/// Generate a unique user ID for test isolation.
fn unique_uid() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("it-{}", nanos)
}

fn mutator_for(
    db: &FirestoreDb,
    uid: &str,
) -> (watch::Sender<SessionState>, TicketMutator<FirestoreDb>) {
    let (tx, rx) = watch::channel(SessionState {
        user: Some(CurrentUser::merge(
            Identity {
                uid: uid.to_string(),
                email: format!("{}@example.com", uid),
                photo_url: None,
            },
            None,
        )),
        loading: false,
        identity_lost: false,
    });
    (tx, TicketMutator::new(db.clone(), rx))
}

fn form(title: &str) -> TicketForm {
    TicketForm {
        title: title.to_string(),
        description: "Test d'intégration Firestore".to_string(),
        priority: Priority::Medium,
        ..TicketForm::default()
    }
}

#[tokio::test]
async fn test_live_ticket_list() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid();
    let (_session, mutator) = mutator_for(&db, &uid);

    let tickets = TicketStore::new(db.clone());
    let mut rx = tickets.watch();
    tickets.set_identity(Some(&uid)).unwrap();

    let first = mutator.create_ticket(form("Premier ticket")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = mutator.create_ticket(form("Second ticket")).await.unwrap();

    let view = tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|v| v.items.len() == 2),
    )
    .await
    .expect("Timed out waiting for snapshot")
    .unwrap()
    .clone();
    let ids: Vec<&str> = view.items.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);

    mutator
        .update_status(&first, TicketStatus::Resolved)
        .await
        .unwrap();
    let view = tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|v| v.items.iter().any(|t| t.status == TicketStatus::Resolved)),
    )
    .await
    .expect("Timed out waiting for update")
    .unwrap()
    .clone();
    assert_eq!(view.items.len(), 2);

    tickets.close();
}

#[tokio::test]
async fn test_comment_thread() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid();
    let (_session, mutator) = mutator_for(&db, &uid);
    let ticket_id = mutator.create_ticket(form("Avec commentaires")).await.unwrap();

    let comments = CommentStore::new(db.clone());
    let mut rx = comments.watch();
    comments.view_ticket(&ticket_id).unwrap();
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|v| !v.loading))
        .await
        .expect("Timed out waiting for first snapshot")
        .unwrap();

    mutator.add_comment(&ticket_id, "Bonjour").await.unwrap();

    let view = tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|v| v.items.len() == 1),
    )
    .await
    .expect("Timed out waiting for comment")
    .unwrap()
    .clone();
    assert_eq!(view.items[0].content, "Bonjour");
    assert_eq!(view.items[0].user_id, uid);

    comments.close();
}

#[tokio::test]
async fn test_timestamps_come_from_server_clock() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid();
    let (_session, mutator) = mutator_for(&db, &uid);
    let id = mutator.create_ticket(form("Horodatage serveur")).await.unwrap();
    mutator
        .update_status(&id, TicketStatus::InProgress)
        .await
        .unwrap();

    let raw = db
        .client()
        .unwrap()
        .fluent()
        .select()
        .by_id_in("tickets")
        .one(id.as_str())
        .await
        .unwrap()
        .expect("ticket stored");
    for field in ["createdAt", "updatedAt"] {
        let value = raw.fields.get(field).and_then(|v| v.value_type.as_ref());
        assert!(
            matches!(value, Some(ValueType::TimestampValue(_))),
            "{} should be a server timestamp, got {:?}",
            field,
            value
        );
    }

    let ticket = mutator.fetch_ticket(&id).await.unwrap();
    assert!(ticket.updated_at.is_some_and(|t| t >= ticket.created_at));
}

#[tokio::test]
async fn test_update_missing_ticket_fails() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid();
    let (_session, mutator) = mutator_for(&db, &uid);

    let result = mutator
        .update_status(&format!("missing-{}", uid), TicketStatus::Closed)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_get_once_missing_document() {
    require_emulator!();

    let db = test_db().await;
    let doc = db.get_once("users", &unique_uid()).await.unwrap();
    assert!(doc.is_none());
}
