// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - session, live stores and mutations.

pub mod comments;
pub mod identity;
pub mod mutator;
pub mod preferences;
pub mod projection;
pub mod session;
pub mod subscription;
pub mod tickets;

pub use comments::CommentStore;
pub use identity::{FirebaseAuthClient, IdentityProvider, LocalIdentityProvider};
pub use mutator::TicketMutator;
pub use preferences::FilterPreferences;
pub use projection::{project, MemoizedProjection, SortDirection, TicketFilter};
pub use session::{AuthSession, SessionState};
pub use subscription::{LiveCollection, LiveView};
pub use tickets::TicketStore;
