// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Filtered and sorted views over the live ticket list.
//!
//! Pure functions of (list, filter). Screens call [`project`] on every
//! render; [`MemoizedProjection`] skips the work when neither input changed.

use crate::models::{Priority, Ticket, TicketStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    /// Newest first
    #[default]
    Desc,
}

/// Ephemeral filter state of the ticket list screen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketFilter {
    /// Case-insensitive substring of the title; ignored when blank
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub sort: SortDirection,
}

impl TicketFilter {
    pub fn search(mut self, text: &str) -> Self {
        self.search = text.to_string();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn sort(mut self, sort: SortDirection) -> Self {
        self.sort = sort;
        self
    }

    fn accepts(&self, ticket: &Ticket, needle: Option<&str>) -> bool {
        if let Some(needle) = needle {
            if !ticket.title.to_lowercase().contains(needle) {
                return false;
            }
        }
        if self.priority.is_some_and(|p| p != ticket.priority) {
            return false;
        }
        if self.status.is_some_and(|s| s != ticket.status) {
            return false;
        }
        true
    }
}

/// Filter by title search, priority and status, then sort by creation time.
///
/// The sort is stable, so tickets with equal timestamps keep server order.
pub fn project(tickets: &[Ticket], filter: &TicketFilter) -> Vec<Ticket> {
    let needle = filter.search.trim().to_lowercase();
    let needle = (!needle.is_empty()).then_some(needle.as_str());

    let mut out: Vec<Ticket> = tickets
        .iter()
        .filter(|t| filter.accepts(t, needle))
        .cloned()
        .collect();

    match filter.sort {
        SortDirection::Asc => out.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortDirection::Desc => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
    out
}

/// Caches the last projection, keyed on list identity and filter.
#[derive(Default)]
pub struct MemoizedProjection {
    last: Option<(Arc<Vec<Ticket>>, TicketFilter, Arc<Vec<Ticket>>)>,
}

impl MemoizedProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, tickets: &Arc<Vec<Ticket>>, filter: &TicketFilter) -> Arc<Vec<Ticket>> {
        if let Some((list, last_filter, result)) = &self.last {
            if Arc::ptr_eq(list, tickets) && last_filter == filter {
                return result.clone();
            }
        }
        let result = Arc::new(project(tickets, filter));
        self.last = Some((tickets.clone(), filter.clone(), result.clone()));
        result
    }
}
