// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User identity, profile and the auth forms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Access level stored on the profile. Only admins may change it; the
/// backend's rules enforce that, not this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Employee,
    Support,
    Admin,
}

/// Authentication record issued by the identity backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub photo_url: Option<String>,
}

/// Profile document stored in `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    pub full_name: String,
    pub department: String,
    #[serde(default)]
    pub role: Role,
    /// Canonical avatar shown by the client
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

/// Identity merged with its profile document.
///
/// Profile fields win over identity fields with the same meaning. When no
/// profile exists the profile-only fields stay empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub uid: String,
    pub email: String,
    pub photo_url: Option<String>,
    pub avatar_url: Option<String>,
    pub full_name: Option<String>,
    pub department: Option<String>,
    pub role: Option<Role>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

impl CurrentUser {
    pub fn merge(identity: Identity, profile: Option<UserProfile>) -> Self {
        let Some(profile) = profile else {
            return Self {
                uid: identity.uid,
                email: identity.email,
                photo_url: identity.photo_url,
                avatar_url: None,
                full_name: None,
                department: None,
                role: None,
                created_at: None,
                last_login: None,
            };
        };

        Self {
            uid: identity.uid,
            email: profile
                .email
                .filter(|e| !e.is_empty())
                .unwrap_or(identity.email),
            photo_url: identity.photo_url,
            avatar_url: profile.avatar_url.filter(|a| !a.is_empty()),
            full_name: Some(profile.full_name),
            department: Some(profile.department),
            role: Some(profile.role),
            created_at: profile.created_at,
            last_login: profile.last_login,
        }
    }

    /// Avatar to display: the profile's, else the identity photo.
    pub fn display_avatar(&self) -> Option<&str> {
        self.avatar_url.as_deref().or(self.photo_url.as_deref())
    }
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct LoginForm {
    #[validate(email(message = "Email invalide"))]
    pub email: String,
    #[validate(length(min = 6, message = "Minimum 6 caractères"))]
    pub password: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    #[validate(email(message = "Email invalide"))]
    pub email: String,
    #[validate(length(min = 1, message = "Nom requis"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "Département requis"))]
    pub department: String,
    pub role: Role,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[validate(length(min = 6, message = "Minimum 6 caractères"))]
    pub password: String,
}

/// Profile body written at registration; timestamps are server-stamped.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub uid: String,
    pub email: String,
    pub full_name: String,
    pub department: String,
    pub role: Role,
    pub avatar_url: String,
}

impl NewProfile {
    pub fn from_form(form: &RegistrationForm, uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            email: form.email.clone(),
            full_name: form.full_name.clone(),
            department: form.department.clone(),
            role: form.role,
            avatar_url: form.avatar_url.clone().unwrap_or_default(),
        }
    }
}
