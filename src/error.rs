// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent user-facing messages.

use crate::validation::FieldErrors;

/// Application error type surfaced to the presentation layer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Write rejected: {0}")]
    Write(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Identity stream closed")]
    IdentityStreamClosed,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Localized message shown to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Auth(err) => err.user_message().to_string(),
            AppError::Unauthorized => "Veuillez vous connecter.".to_string(),
            AppError::Validation(errors) => errors
                .first_message()
                .unwrap_or("Formulaire invalide.")
                .to_string(),
            AppError::Subscription(_) => "Erreur lors du chargement des tickets".to_string(),
            AppError::Write(_) => "Impossible d'enregistrer les modifications.".to_string(),
            AppError::NotFound(_) => "Ticket introuvable".to_string(),
            AppError::IdentityStreamClosed => "Session expirée, reconnectez-vous.".to_string(),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                "Une erreur s'est produite. Réessaie.".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                "Une erreur s'est produite. Réessaie.".to_string()
            }
        }
    }

    /// Whether the user can recover by retrying. Only losing the identity
    /// stream degrades the client to a logged-out state.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::IdentityStreamClosed)
    }
}

/// Failures reported by the identity backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("too many attempts")]
    RateLimited,

    #[error("email already in use")]
    EmailInUse,

    #[error("password too weak")]
    WeakPassword,

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Unknown(String),
}

impl AuthError {
    /// Map an identity toolkit error code (e.g. `INVALID_PASSWORD`) to an error.
    ///
    /// The backend may append a human description after the code
    /// (`TOO_MANY_ATTEMPTS_TRY_LATER : Access to this account...`).
    pub fn from_code(raw: &str) -> Self {
        let code = raw.split(':').next().unwrap_or(raw).trim();
        match code {
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS"
            | "INVALID_EMAIL" | "USER_DISABLED" => AuthError::InvalidCredentials,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::RateLimited,
            "EMAIL_EXISTS" => AuthError::EmailInUse,
            "WEAK_PASSWORD" => AuthError::WeakPassword,
            other => AuthError::Unknown(other.to_string()),
        }
    }

    /// Localized message for the login and registration screens.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "Email ou mot de passe incorrect.",
            AuthError::RateLimited => "Trop de tentatives. Réessaie plus tard.",
            AuthError::EmailInUse => "Cet email est déjà utilisé.",
            AuthError::WeakPassword => "Minimum 6 caractères",
            AuthError::Network(_) | AuthError::Unknown(_) => {
                "Une erreur s'est produite. Réessaie."
            }
        }
    }
}

/// Why a live query stopped delivering snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionErrorKind {
    PermissionDenied,
    NetworkLost,
    Other,
}

/// Error pushed on a live query instead of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct SubscriptionError {
    pub kind: SubscriptionErrorKind,
    pub message: String,
}

impl SubscriptionError {
    pub fn new(kind: SubscriptionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(SubscriptionErrorKind::PermissionDenied, message)
    }

    pub fn network_lost(message: impl Into<String>) -> Self {
        Self::new(SubscriptionErrorKind::NetworkLost, message)
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, AppError>;
