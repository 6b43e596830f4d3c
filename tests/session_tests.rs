// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session tests against the in-memory identity backend.

use helpdesk_sync::db::MemoryStore;
use helpdesk_sync::error::{AppError, AuthError};
use helpdesk_sync::models::{Identity, LoginForm, RegistrationForm, Role};
use helpdesk_sync::services::session::SessionState;
use helpdesk_sync::services::{
    AuthSession, FilterPreferences, IdentityProvider, LocalIdentityProvider,
};
use helpdesk_sync::App;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

mod common;
use common::{settle, wait_view, ManualStore};

const EMAIL: &str = "alice@example.com";
const PASSWORD: &str = "secret123";

fn login(password: &str) -> LoginForm {
    LoginForm {
        email: EMAIL.to_string(),
        password: password.to_string(),
    }
}

fn registration(email: &str) -> RegistrationForm {
    RegistrationForm {
        email: email.to_string(),
        full_name: "Alice Martin".to_string(),
        department: "Comptabilité".to_string(),
        role: Role::Employee,
        avatar_url: None,
        password: PASSWORD.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOADING
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_loading_until_first_resolution() {
    let provider = Arc::new(LocalIdentityProvider::new());
    let session = AuthSession::start(provider, MemoryStore::new());

    assert!(session.is_loading());
    assert!(session.current_user().is_none());

    let state = session.wait_resolved().await.unwrap();
    assert!(!state.loading);
    assert!(state.user.is_none());
}

#[tokio::test]
async fn test_loading_never_returns_after_resolution() {
    let provider = Arc::new(LocalIdentityProvider::new());
    provider.add_account(EMAIL, PASSWORD);
    let session = AuthSession::start(provider.clone(), MemoryStore::new());
    session.wait_resolved().await.unwrap();

    let mut rx = session.subscribe();
    session.sign_in(&login(PASSWORD)).await.unwrap();
    assert!(!rx.borrow_and_update().loading);

    session.sign_out().await.unwrap();
    assert!(!session.is_loading());

    let identity = provider.add_account("bob@example.com", PASSWORD);
    provider.push_identity(Some(identity.clone()));
    let state = tokio::time::timeout(
        Duration::from_secs(1),
        rx.wait_for(|s| s.user.is_some()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(state.uid(), Some(identity.uid.as_str()));
    assert!(!state.loading);
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE MERGE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_sign_in_merges_profile() {
    let provider = Arc::new(LocalIdentityProvider::new());
    let identity = provider.add_account(EMAIL, PASSWORD);
    let store = MemoryStore::new();
    store.insert(
        "users",
        &identity.uid,
        json!({
            "fullName": "Alice Martin",
            "department": "Comptabilité",
            "role": "support",
            "avatarUrl": "https://example.com/alice.png",
        }),
    );
    let session = AuthSession::start(provider, store);

    let user = session.sign_in(&login(PASSWORD)).await.unwrap();

    assert_eq!(user.uid, identity.uid);
    assert_eq!(user.email, EMAIL);
    assert_eq!(user.full_name.as_deref(), Some("Alice Martin"));
    assert_eq!(user.role, Some(Role::Support));
    assert_eq!(user.display_avatar(), Some("https://example.com/alice.png"));
    assert_eq!(session.current_user(), Some(user));
}

#[tokio::test]
async fn test_missing_profile_falls_back_to_identity() {
    let provider = Arc::new(LocalIdentityProvider::new());
    let identity = provider.add_account(EMAIL, PASSWORD);
    let session = AuthSession::start(provider, MemoryStore::new());

    let user = session.sign_in(&login(PASSWORD)).await.unwrap();

    assert_eq!(user.uid, identity.uid);
    assert_eq!(user.email, EMAIL);
    assert!(user.full_name.is_none());
    assert!(user.role.is_none());
}

#[tokio::test]
async fn test_profile_read_failure_falls_back_to_identity() {
    let provider = Arc::new(LocalIdentityProvider::new());
    let identity = provider.add_account(EMAIL, PASSWORD);
    let store = ManualStore::new();
    store.fail_reads(true);
    let session = AuthSession::start(provider, store);

    let user = session.sign_in(&login(PASSWORD)).await.unwrap();

    assert_eq!(user.uid, identity.uid);
    assert!(user.full_name.is_none());
    assert!(!session.is_loading());
}

// ═══════════════════════════════════════════════════════════════════════════
// RESOLUTION ORDERING
// ═══════════════════════════════════════════════════════════════════════════

fn profile(full_name: &str) -> serde_json::Value {
    json!({"fullName": full_name, "department": "Support"})
}

/// Record every signed-in UID the session publishes.
fn record_uids(
    mut rx: watch::Receiver<SessionState>,
) -> (Arc<Mutex<Vec<String>>>, JoinHandle<()>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let task = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            if let Some(uid) = rx.borrow_and_update().uid() {
                sink.lock().unwrap().push(uid.to_string());
            }
        }
    });
    (seen, task)
}

#[tokio::test]
async fn test_identity_change_during_profile_read_publishes_latest() {
    let provider = Arc::new(LocalIdentityProvider::new());
    let alice = provider.add_account(EMAIL, PASSWORD);
    let bob = provider.add_account("bob@example.com", PASSWORD);
    let store = ManualStore::new();
    store.put("users", &alice.uid, profile("Alice Martin"));
    store.put("users", &bob.uid, profile("Bob Durand"));
    let session = AuthSession::start(provider.clone(), store.clone());
    session.wait_resolved().await.unwrap();
    let (seen, recorder) = record_uids(session.subscribe());

    let gate = store.hold_reads();
    provider.push_identity(Some(alice.clone()));
    store.wait_reads(1).await;
    provider.push_identity(Some(bob.clone()));
    drop(gate);

    let mut rx = session.subscribe();
    let state = tokio::time::timeout(
        Duration::from_secs(1),
        rx.wait_for(|s| s.uid() == Some(bob.uid.as_str())),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(
        state.user.and_then(|u| u.full_name),
        Some("Bob Durand".to_string())
    );

    settle().await;
    assert_eq!(session.state().uid(), Some(bob.uid.as_str()));
    assert!(!seen.lock().unwrap().contains(&alice.uid));
    recorder.abort();
}

#[tokio::test]
async fn test_sign_out_during_profile_read_stays_signed_out() {
    let provider = Arc::new(LocalIdentityProvider::new());
    let alice = provider.add_account(EMAIL, PASSWORD);
    let store = ManualStore::new();
    store.put("users", &alice.uid, profile("Alice Martin"));
    let session = AuthSession::start(provider.clone(), store.clone());
    session.wait_resolved().await.unwrap();
    let (seen, recorder) = record_uids(session.subscribe());

    let gate = store.hold_reads();
    provider.push_identity(Some(alice.clone()));
    store.wait_reads(1).await;
    session.sign_out().await.unwrap();
    assert!(session.current_user().is_none());
    drop(gate);

    settle().await;
    assert!(session.current_user().is_none());
    assert!(!session.is_loading());
    assert!(seen.lock().unwrap().is_empty());
    recorder.abort();
}

/// Identity backend whose change stream has already ended.
struct EndedStream;

impl IdentityProvider for EndedStream {
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        watch::channel(None).1
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Identity, AuthError> {
        Err(AuthError::InvalidCredentials)
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Identity, AuthError> {
        Err(AuthError::InvalidCredentials)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_closed_identity_stream_is_reported() {
    let session = AuthSession::start(Arc::new(EndedStream), MemoryStore::new());
    let mut rx = session.subscribe();

    let state = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.identity_lost))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert!(state.user.is_none());
    assert!(!state.loading);

    let err = session.wait_resolved().await.unwrap_err();
    assert!(matches!(err, AppError::IdentityStreamClosed));
    assert!(!err.is_recoverable());
}

// ═══════════════════════════════════════════════════════════════════════════
// SIGN IN / OUT
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let provider = Arc::new(LocalIdentityProvider::new());
    provider.add_account(EMAIL, PASSWORD);
    let session = AuthSession::start(provider, MemoryStore::new());

    let err = session.sign_in(&login("wrong-password")).await.unwrap_err();

    assert!(matches!(err, AppError::Auth(AuthError::InvalidCredentials)));
    assert_eq!(err.user_message(), "Email ou mot de passe incorrect.");
    assert!(session.current_user().is_none());
}

#[tokio::test]
async fn test_short_password_fails_validation() {
    let provider = Arc::new(LocalIdentityProvider::new());
    provider.add_account(EMAIL, PASSWORD);
    let session = AuthSession::start(provider, MemoryStore::new());

    let err = session.sign_in(&login("123")).await.unwrap_err();

    match err {
        AppError::Validation(errors) => assert!(errors.contains("password")),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sign_out_clears_user_immediately() {
    let provider = Arc::new(LocalIdentityProvider::new());
    provider.add_account(EMAIL, PASSWORD);
    let session = AuthSession::start(provider, MemoryStore::new());
    session.sign_in(&login(PASSWORD)).await.unwrap();

    session.sign_out().await.unwrap();

    assert!(session.current_user().is_none());
    assert!(session.state().uid().is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// REGISTRATION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_register_writes_profile_and_signs_in() {
    let provider = Arc::new(LocalIdentityProvider::new());
    let store = MemoryStore::new();
    let session = AuthSession::start(provider, store.clone());

    let user = session.register(&registration(EMAIL)).await.unwrap();

    assert_eq!(user.full_name.as_deref(), Some("Alice Martin"));
    assert_eq!(user.role, Some(Role::Employee));
    assert!(user.created_at.is_some());

    let profile = store.document("users", &user.uid).expect("profile written");
    assert_eq!(profile["fullName"], "Alice Martin");
    assert_eq!(profile["department"], "Comptabilité");
    assert!(profile["createdAt"].is_string());
    assert!(profile["lastLogin"].is_string());

    // A later identity event must not replace the merged profile
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        session.current_user().and_then(|u| u.full_name),
        Some("Alice Martin".to_string())
    );
}

#[tokio::test]
async fn test_register_existing_email_fails_without_profile_write() {
    let provider = Arc::new(LocalIdentityProvider::new());
    provider.add_account(EMAIL, PASSWORD);
    let store = MemoryStore::new();
    let session = AuthSession::start(provider, store.clone());

    let err = session.register(&registration(EMAIL)).await.unwrap_err();

    assert!(matches!(err, AppError::Auth(AuthError::EmailInUse)));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_register_requires_department() {
    let provider = Arc::new(LocalIdentityProvider::new());
    let store = MemoryStore::new();
    let session = AuthSession::start(provider, store.clone());
    let mut form = registration(EMAIL);
    form.department.clear();

    let err = session.register(&form).await.unwrap_err();

    match err {
        AppError::Validation(errors) => {
            assert_eq!(errors.messages("department"), ["Département requis"]);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(store.write_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// APP WIRING
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_app_follows_signed_in_user() {
    let provider = Arc::new(LocalIdentityProvider::new());
    let identity = provider.add_account(EMAIL, PASSWORD);
    let store = MemoryStore::new();
    let app = App::start(provider, store.clone(), FilterPreferences::in_memory());
    let mut tickets = app.tickets.watch();

    app.session.sign_in(&login(PASSWORD)).await.unwrap();
    wait_view(&mut tickets, |v| {
        v.key.as_deref() == Some(identity.uid.as_str()) && !v.loading
    })
    .await;
    assert_eq!(store.listener_count(), 1);

    app.session.sign_out().await.unwrap();
    wait_view(&mut tickets, |v| v.key.is_none()).await;
    assert_eq!(store.listener_count(), 0);
}
