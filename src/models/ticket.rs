// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Support ticket model and the ticket creation form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Ticket lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "app/types/generated/")
)]
pub enum TicketStatus {
    New,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        TicketStatus::New,
        TicketStatus::Assigned,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::Assigned => "assigned",
            TicketStatus::InProgress => "in-progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }
}

/// Ticket urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "app/types/generated/")
)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "app/types/generated/")
)]
pub enum Category {
    Hardware,
    Software,
    Network,
    Access,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Hardware => "hardware",
            Category::Software => "software",
            Category::Network => "network",
            Category::Access => "access",
            Category::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "app/types/generated/")
)]
pub enum OperatingSystem {
    Android,
    Ios,
    Windows,
    Macos,
    Linux,
}

impl OperatingSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingSystem::Android => "android",
            OperatingSystem::Ios => "ios",
            OperatingSystem::Windows => "windows",
            OperatingSystem::Macos => "macos",
            OperatingSystem::Linux => "linux",
        }
    }
}

/// Parse error for the enumerated ticket fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! impl_str_enum {
    ($ty:ty, $kind:literal, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_str_enum!(
    TicketStatus,
    "status",
    [
        TicketStatus::New,
        TicketStatus::Assigned,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Closed,
    ]
);
impl_str_enum!(
    Priority,
    "priority",
    [Priority::Low, Priority::Medium, Priority::High, Priority::Critical]
);
impl_str_enum!(
    Category,
    "category",
    [
        Category::Hardware,
        Category::Software,
        Category::Network,
        Category::Access,
        Category::Other,
    ]
);
impl_str_enum!(
    OperatingSystem,
    "os",
    [
        OperatingSystem::Android,
        OperatingSystem::Ios,
        OperatingSystem::Windows,
        OperatingSystem::Macos,
        OperatingSystem::Linux,
    ]
);

/// Device the ticket is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "app/types/generated/")
)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub os: OperatingSystem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Ticket document as stored in the `tickets` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "app/types/generated/")
)]
pub struct Ticket {
    /// Server-assigned document ID
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// UID of the assignee (the creator until support picks it up)
    #[serde(default)]
    pub assigned_to: String,
    /// UID of the creator; never changes
    pub created_by: String,
    /// Server clock at creation
    pub created_at: DateTime<Utc>,
    /// Server clock at the last status/priority change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub device_info: DeviceInfo,
}

/// Ticket creation form.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketForm {
    #[validate(length(min = 3, message = "Titre requis"))]
    pub title: String,
    #[validate(length(min = 10, message = "Description trop courte"))]
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub os: OperatingSystem,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl Default for TicketForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            priority: Priority::Medium,
            category: Category::Software,
            location: None,
            model: None,
            os: OperatingSystem::Android,
            version: None,
            due_date: None,
        }
    }
}

/// Body written when a ticket is created. `createdAt` is left to the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub assigned_to: String,
    pub created_by: String,
    pub status: TicketStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub device_info: DeviceInfo,
}

impl NewTicket {
    /// Build the document for `uid`. Status is always `new` and the ticket
    /// starts assigned to its creator.
    pub fn from_form(form: TicketForm, uid: &str) -> Self {
        Self {
            title: form.title,
            description: form.description,
            priority: form.priority,
            category: form.category,
            location: non_empty(form.location),
            assigned_to: uid.to_string(),
            created_by: uid.to_string(),
            status: TicketStatus::New,
            due_date: form.due_date,
            device_info: DeviceInfo {
                model: non_empty(form.model),
                os: form.os,
                version: non_empty(form.version),
            },
        }
    }
}

/// Optional text inputs arrive as empty strings when left blank.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
