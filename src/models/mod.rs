// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod comment;
pub mod stats;
pub mod ticket;
pub mod user;

pub use comment::{Comment, NewComment};
pub use stats::TicketStats;
pub use ticket::{
    Category, DeviceInfo, NewTicket, OperatingSystem, Priority, Ticket, TicketForm, TicketStatus,
};
pub use user::{CurrentUser, Identity, LoginForm, RegistrationForm, Role, UserProfile};
