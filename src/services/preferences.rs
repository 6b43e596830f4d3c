// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user persisted filter values.
//!
//! Values are stored under `"{key}:{uid}"` so each user on a shared device
//! keeps their own filters. Without a signed-in user nothing is read or
//! written.

use crate::error::{AppError, Result};
use crate::services::projection::TicketFilter;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key under which the ticket list filter is stored.
pub const TICKET_FILTER_KEY: &str = "ticketFilter";

#[derive(Clone, Default)]
pub struct FilterPreferences {
    values: Arc<DashMap<String, String>>,
    path: Option<PathBuf>,
}

impl FilterPreferences {
    /// Preferences that live only as long as the process.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load preferences from a JSON file; a missing file starts empty.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut values = DashMap::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let stored: BTreeMap<String, String> =
                    serde_json::from_str(&text).map_err(|e| {
                        AppError::Internal(anyhow::anyhow!("Invalid preferences file: {}", e))
                    })?;
                values.extend(stored);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No preferences file yet");
            }
            Err(e) => return Err(AppError::Internal(e.into())),
        }

        Ok(Self {
            values: Arc::new(values),
            path: Some(path),
        })
    }

    pub fn storage_key(key: &str, uid: Option<&str>) -> Option<String> {
        uid.map(|uid| format!("{}:{}", key, uid))
    }

    /// Stored value for the user, or `default`.
    pub fn get(&self, key: &str, uid: Option<&str>, default: &str) -> String {
        Self::storage_key(key, uid)
            .and_then(|k| self.values.get(&k).map(|v| v.clone()))
            .unwrap_or_else(|| default.to_string())
    }

    /// Store a value for the user. A no-op when signed out.
    pub async fn set(&self, key: &str, uid: Option<&str>, value: &str) -> Result<()> {
        let Some(storage_key) = Self::storage_key(key, uid) else {
            return Ok(());
        };
        self.values.insert(storage_key, value.to_string());
        self.persist().await
    }

    pub fn ticket_filter(&self, uid: Option<&str>) -> TicketFilter {
        let raw = self.get(TICKET_FILTER_KEY, uid, "");
        if raw.is_empty() {
            return TicketFilter::default();
        }
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring unreadable stored filter");
            TicketFilter::default()
        })
    }

    pub async fn set_ticket_filter(&self, uid: Option<&str>, filter: &TicketFilter) -> Result<()> {
        let raw = serde_json::to_string(filter).map_err(|e| AppError::Internal(e.into()))?;
        self.set(TICKET_FILTER_KEY, uid, &raw).await
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot: BTreeMap<String, String> = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let text =
            serde_json::to_string_pretty(&snapshot).map_err(|e| AppError::Internal(e.into()))?;
        tokio::fs::write(path, text)
            .await
            .map_err(|e| AppError::Internal(e.into()))
    }
}
