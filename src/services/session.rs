// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authenticated session.
//!
//! Listens to the identity provider's change stream and, for each identity,
//! reads the `users/{uid}` profile once and publishes the merged
//! [`CurrentUser`]. Dependent stores read the UID from the published
//! [`SessionState`]; only this module writes it.

use crate::db::{collections, DocumentStore, WriteFields};
use crate::error::{AppError, Result};
use crate::models::user::NewProfile;
use crate::models::{CurrentUser, Identity, LoginForm, RegistrationForm, UserProfile};
use crate::services::identity::IdentityProvider;
use crate::validation;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Published session state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub user: Option<CurrentUser>,
    /// True until the first identity event has been resolved. Never set
    /// back to true afterwards.
    pub loading: bool,
    /// The identity change stream ended; the user stays signed out.
    pub identity_lost: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
            identity_lost: false,
        }
    }
}

impl SessionState {
    pub fn uid(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.uid.as_str())
    }

    /// Error out if the session can no longer follow identity changes.
    pub fn check(&self) -> Result<()> {
        if self.identity_lost {
            return Err(AppError::IdentityStreamClosed);
        }
        Ok(())
    }
}

/// Session publisher. Resolutions are numbered when they start so a slow,
/// older profile read never overwrites a newer result.
struct Publisher {
    state: watch::Sender<SessionState>,
    started: AtomicU64,
    published: AtomicU64,
}

impl Publisher {
    fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            state,
            started: AtomicU64::new(0),
            published: AtomicU64::new(0),
        }
    }

    fn begin(&self) -> u64 {
        self.started.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publish `user` for resolution `seq`, unless a later resolution was
    /// already published or the identity changed meanwhile.
    fn publish(
        &self,
        seq: u64,
        changes: &watch::Receiver<Option<Identity>>,
        user: Option<CurrentUser>,
    ) -> bool {
        let live_uid = changes.borrow().as_ref().map(|i| i.uid.clone());
        if live_uid.as_deref() != user.as_ref().map(|u| u.uid.as_str()) {
            tracing::debug!("Dropping stale identity resolution");
            return false;
        }
        self.state.send_if_modified(|s| {
            if s.identity_lost {
                return false;
            }
            if self.published.load(Ordering::SeqCst) > seq {
                tracing::debug!(seq, "Dropping superseded identity resolution");
                return false;
            }
            self.published.store(seq, Ordering::SeqCst);
            s.user = user;
            s.loading = false;
            true
        })
    }

    /// Publish the signed-out state ahead of any resolution in flight.
    fn clear(&self) {
        let seq = self.begin();
        self.state.send_modify(|s| {
            self.published.store(seq, Ordering::SeqCst);
            s.user = None;
            s.loading = false;
        });
    }

    /// Signed out for good: no further identity events will arrive.
    fn lose_identity(&self) {
        let seq = self.begin();
        self.state.send_modify(|s| {
            self.published.store(seq, Ordering::SeqCst);
            s.user = None;
            s.loading = false;
            s.identity_lost = true;
        });
    }
}

/// Session wrapper around an identity provider and the profile collection.
pub struct AuthSession<P: IdentityProvider, S: DocumentStore> {
    provider: Arc<P>,
    store: S,
    publisher: Arc<Publisher>,
    listener: JoinHandle<()>,
}

impl<P: IdentityProvider, S: DocumentStore> AuthSession<P, S> {
    /// Register for identity changes. Must be called inside a Tokio runtime.
    pub fn start(provider: Arc<P>, store: S) -> Self {
        let publisher = Arc::new(Publisher::new());
        let listener = tokio::spawn(listen_identity(
            provider.clone(),
            store.clone(),
            publisher.clone(),
        ));

        Self {
            provider,
            store,
            publisher,
            listener,
        }
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.publisher.state.borrow().user.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.publisher.state.borrow().loading
    }

    pub fn state(&self) -> SessionState {
        self.publisher.state.borrow().clone()
    }

    /// Receiver for session changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.publisher.state.subscribe()
    }

    /// Wait until the first identity event has been resolved. Fails once
    /// the identity stream has ended.
    pub async fn wait_resolved(&self) -> Result<SessionState> {
        let mut rx = self.publisher.state.subscribe();
        let state = rx
            .wait_for(|s| !s.loading)
            .await
            .map(|s| s.clone())
            .unwrap_or_else(|_| self.state());
        state.check()?;
        Ok(state)
    }

    /// Sign in with email and password.
    pub async fn sign_in(&self, form: &LoginForm) -> Result<CurrentUser> {
        validation::check(form)?;

        self.provider
            .sign_in(&form.email, &form.password)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Sign-in failed");
                AppError::Auth(e)
            })?;

        self.refresh().await?.ok_or(AppError::Unauthorized)
    }

    /// Create the identity and its profile document.
    pub async fn register(&self, form: &RegistrationForm) -> Result<CurrentUser> {
        validation::check(form)?;

        let identity = self
            .provider
            .sign_up(&form.email, &form.password)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Registration failed");
                AppError::Auth(e)
            })?;

        let profile = WriteFields::from_object(&NewProfile::from_form(form, &identity.uid))?
            .server_timestamp("createdAt")
            .server_timestamp("lastLogin");

        self.store
            .write(collections::USERS, Some(&identity.uid), profile)
            .await
            .map_err(|e| {
                tracing::error!(uid = %identity.uid, error = %e, "Failed to write user profile");
                e
            })?;

        tracing::info!(uid = %identity.uid, "User registered");

        // The identity event may have resolved before the profile existed
        self.refresh().await?.ok_or(AppError::Unauthorized)
    }

    /// Re-read the profile of the current identity and publish the merge.
    pub async fn refresh(&self) -> Result<Option<CurrentUser>> {
        let mut changes = self.provider.identity_changes();
        let identity = changes.borrow_and_update().clone();
        let Some(identity) = identity else {
            return Ok(None);
        };

        let seq = self.publisher.begin();
        let user = resolve_user(&self.store, identity).await;
        self.publisher.publish(seq, &changes, Some(user.clone()));
        Ok(Some(user))
    }

    /// Sign out. The local user is cleared without waiting for the
    /// provider's change event.
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.provider.sign_out().await;
        self.publisher.clear();
        tracing::info!("Signed out");
        result.map_err(AppError::Auth)
    }
}

impl<P: IdentityProvider, S: DocumentStore> Drop for AuthSession<P, S> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Fetch the profile once and merge it. Failures fall back to the bare
/// identity.
async fn resolve_user<S: DocumentStore>(store: &S, identity: Identity) -> CurrentUser {
    match store.get_once(collections::USERS, &identity.uid).await {
        Ok(Some(doc)) => match doc.decode::<UserProfile>() {
            Ok(profile) => CurrentUser::merge(identity, Some(profile)),
            Err(e) => {
                tracing::error!(uid = %identity.uid, error = %e, "Malformed user profile");
                CurrentUser::merge(identity, None)
            }
        },
        Ok(None) => {
            tracing::debug!(uid = %identity.uid, "No profile document yet");
            CurrentUser::merge(identity, None)
        }
        Err(e) => {
            tracing::error!(uid = %identity.uid, error = %e, "Failed to load user profile");
            CurrentUser::merge(identity, None)
        }
    }
}

async fn listen_identity<P: IdentityProvider, S: DocumentStore>(
    provider: Arc<P>,
    store: S,
    publisher: Arc<Publisher>,
) {
    let mut changes = provider.identity_changes();
    loop {
        let identity = changes.borrow_and_update().clone();
        tracing::debug!(
            uid = identity.as_ref().map(|i| i.uid.as_str()).unwrap_or("-"),
            "Identity changed"
        );

        let seq = publisher.begin();
        let user = match identity {
            Some(identity) => Some(resolve_user(&store, identity).await),
            None => None,
        };
        publisher.publish(seq, &changes, user);

        if changes.changed().await.is_err() {
            tracing::error!("Identity stream closed, degrading to signed-out state");
            publisher.lose_identity();
            break;
        }
    }
}
