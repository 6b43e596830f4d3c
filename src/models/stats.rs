// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ticket statistics for the dashboard.
//!
//! Computed from the live ticket list on every render; nothing here is
//! stored remotely.

use crate::models::{Priority, Ticket, TicketStatus};
use std::collections::HashMap;

/// Aggregates over a ticket list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketStats {
    /// Total tickets counted
    pub total: usize,
    /// Count per status
    pub by_status: HashMap<TicketStatus, usize>,
    /// Count per priority
    pub by_priority: HashMap<Priority, usize>,
}

impl TicketStats {
    pub fn from_tickets(tickets: &[Ticket]) -> Self {
        let mut stats = Self::default();
        for ticket in tickets {
            stats.total += 1;
            *stats.by_status.entry(ticket.status).or_insert(0) += 1;
            *stats.by_priority.entry(ticket.priority).or_insert(0) += 1;
        }
        stats
    }

    pub fn count(&self, status: TicketStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn count_priority(&self, priority: Priority) -> usize {
        self.by_priority.get(&priority).copied().unwrap_or(0)
    }

    /// Share of resolved tickets in `[0, 1]`; zero for an empty list.
    pub fn resolved_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(TicketStatus::Resolved) as f64 / self.total as f64
    }

    /// Resolved share as a rounded percentage.
    pub fn resolved_percent(&self) -> u32 {
        (self.resolved_ratio() * 100.0).round() as u32
    }
}
