// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity backends.
//!
//! An [`IdentityProvider`] signs users in and out and publishes the current
//! identity on a watch channel, which is the push-based change stream the
//! session listens to.
//!
//! - [`FirebaseAuthClient`] calls the identity toolkit REST API.
//! - [`LocalIdentityProvider`] keeps accounts in memory (offline mode, tests).

use crate::error::AuthError;
use crate::models::Identity;
use dashmap::DashMap;
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Backend that issues identities.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Receiver for identity changes; the current value is the live identity.
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>>;

    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Identity, AuthError>> + Send;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Identity, AuthError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;
}

// ─── Identity Toolkit ────────────────────────────────────────────

/// Successful sign-in/sign-up response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default, alias = "profilePicture")]
    photo_url: Option<String>,
    #[serde(default)]
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Identity toolkit client (email/password accounts).
pub struct FirebaseAuthClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    current: watch::Sender<Option<Identity>>,
    id_token: std::sync::Mutex<Option<String>>,
}

impl FirebaseAuthClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            current,
            id_token: std::sync::Mutex::new(None),
        }
    }

    /// ID token of the signed-in user, for authenticated backend calls.
    pub fn id_token(&self) -> Option<String> {
        self.id_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    async fn password_call(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let code = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status));

            if status.as_u16() == 429 {
                tracing::warn!("Identity backend rate limit hit (429)");
                return Err(AuthError::RateLimited);
            }
            return Err(AuthError::from_code(&code));
        }

        let parsed: AuthResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unknown(format!("Invalid auth response: {}", e)))?;

        *self
            .id_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(parsed.id_token);

        let identity = Identity {
            uid: parsed.local_id,
            email: if parsed.email.is_empty() {
                email.to_string()
            } else {
                parsed.email
            },
            photo_url: parsed.photo_url.filter(|p| !p.is_empty()),
        };
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }
}

impl IdentityProvider for FirebaseAuthClient {
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.password_call("signInWithPassword", email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.password_call("signUp", email, password).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        // Forget the bearer token
        *self
            .id_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        self.current.send_replace(None);
        Ok(())
    }
}

// ─── Local Accounts ──────────────────────────────────────────────

/// Consecutive failures before an account is rate limited.
const MAX_FAILED_ATTEMPTS: u32 = 5;

struct LocalAccount {
    password: String,
    identity: Identity,
    failed_attempts: u32,
}

/// In-memory identity backend.
#[derive(Clone)]
pub struct LocalIdentityProvider {
    accounts: Arc<DashMap<String, LocalAccount>>,
    current: Arc<watch::Sender<Option<Identity>>>,
    next_uid: Arc<AtomicU64>,
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: Arc::new(DashMap::new()),
            current: Arc::new(current),
            next_uid: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account without signing in.
    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        let identity = Identity {
            uid: format!("local-{}", self.next_uid.fetch_add(1, Ordering::SeqCst)),
            email: email.to_string(),
            photo_url: None,
        };
        self.accounts.insert(
            email.to_lowercase(),
            LocalAccount {
                password: password.to_string(),
                identity: identity.clone(),
                failed_attempts: 0,
            },
        );
        identity
    }

    /// Publish an identity change as if the backend pushed it.
    pub fn push_identity(&self, identity: Option<Identity>) {
        self.current.send_replace(identity);
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let identity = {
            let mut account = self
                .accounts
                .get_mut(&email.to_lowercase())
                .ok_or(AuthError::InvalidCredentials)?;

            if account.failed_attempts >= MAX_FAILED_ATTEMPTS {
                return Err(AuthError::RateLimited);
            }
            if account.password != password {
                account.failed_attempts += 1;
                return Err(AuthError::InvalidCredentials);
            }
            account.failed_attempts = 0;
            account.identity.clone()
        };

        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        if self.accounts.contains_key(&email.to_lowercase()) {
            return Err(AuthError::EmailInUse);
        }
        if password.chars().count() < 6 {
            return Err(AuthError::WeakPassword);
        }
        let identity = self.add_account(email, password);
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.current.send_replace(None);
        Ok(())
    }
}
