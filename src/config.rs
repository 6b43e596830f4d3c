// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Firebase / GCP project ID
    pub project_id: String,
    /// Web API key for the identity toolkit
    pub api_key: String,
    /// Identity toolkit base URL
    pub auth_url: String,
    /// Firestore emulator host, if running against the emulator
    pub firestore_emulator_host: Option<String>,
    /// Run entirely in process, with no remote backend
    pub offline: bool,
    /// JSON file for persisted filter values
    pub prefs_path: Option<PathBuf>,

    // --- Runner sign-in ---
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let offline = env::var("HELPDESK_OFFLINE")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let api_key = match env::var("FIREBASE_API_KEY") {
            Ok(key) => key.trim().to_string(),
            Err(_) if offline => String::new(),
            Err(_) => return Err(ConfigError::Missing("FIREBASE_API_KEY")),
        };

        let auth_url = match env::var("FIREBASE_AUTH_EMULATOR_HOST") {
            Ok(host) => emulator_auth_url(&host),
            Err(_) => {
                env::var("FIREBASE_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string())
            }
        };

        Ok(Self {
            project_id: env::var("FIREBASE_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            api_key,
            auth_url,
            firestore_emulator_host: non_empty_var("FIRESTORE_EMULATOR_HOST"),
            offline,
            prefs_path: non_empty_var("HELPDESK_PREFS_PATH").map(PathBuf::from),
            email: non_empty_var("HELPDESK_EMAIL"),
            password: non_empty_var("HELPDESK_PASSWORD"),
        })
    }

    /// Offline config for tests.
    pub fn test_default() -> Self {
        Self {
            project_id: "test-project".to_string(),
            api_key: "test_api_key".to_string(),
            auth_url: "http://localhost:9099/identitytoolkit.googleapis.com/v1".to_string(),
            firestore_emulator_host: None,
            offline: true,
            prefs_path: None,
            email: None,
            password: None,
        }
    }

    /// Credentials for the runner, when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.email.as_deref()?, self.password.as_deref()?))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn emulator_auth_url(host: &str) -> String {
    format!("http://{}/identitytoolkit.googleapis.com/v1", host.trim())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
