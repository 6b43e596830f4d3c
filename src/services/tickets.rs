// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live ticket list for the signed-in user.

use crate::db::{collections, CollectionQuery, Direction, DocumentStore};
use crate::error::Result;
use crate::models::Ticket;
use crate::services::session::SessionState;
use crate::services::subscription::{LiveCollection, LiveView};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Tickets created by one user, newest first, kept in sync with the backend.
pub struct TicketStore<S: DocumentStore> {
    live: LiveCollection<S, Ticket>,
}

/// Query for the tickets created by `uid`.
pub fn tickets_query(uid: &str) -> CollectionQuery {
    CollectionQuery::new(collections::TICKETS)
        .where_eq("createdBy", uid)
        .order_by("createdAt", Direction::Descending)
}

impl<S: DocumentStore> TicketStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            live: LiveCollection::new(store, collections::TICKETS),
        }
    }

    /// Point the store at a user, or clear it when signed out.
    ///
    /// Changing user closes the previous subscription before the new one
    /// opens. Setting the same user again is a no-op.
    pub fn set_identity(&self, uid: Option<&str>) -> Result<()> {
        match uid {
            Some(uid) => self.live.open(uid, tickets_query(uid)),
            None => {
                self.live.reset();
                Ok(())
            }
        }
    }

    /// Follow the session: re-key on every identity change until the
    /// session's channel closes. While the session is still resolving the
    /// view stays in its loading state.
    pub fn follow_session(
        self: &Arc<Self>,
        mut session: watch::Receiver<SessionState>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let (resolving, uid) = {
                    let state = session.borrow_and_update();
                    (state.loading, state.uid().map(str::to_string))
                };
                if !resolving {
                    if let Err(e) = store.set_identity(uid.as_deref()) {
                        tracing::warn!(error = %e, "Failed to follow identity change");
                    }
                }
                if session.changed().await.is_err() {
                    tracing::info!("Session closed, clearing tickets");
                    store.set_identity(None).ok();
                    break;
                }
            }
        })
    }

    /// Tickets from the last snapshot.
    pub fn tickets(&self) -> Arc<Vec<Ticket>> {
        self.live.view().items
    }

    pub fn loading(&self) -> bool {
        self.live.view().loading
    }

    pub fn error(&self) -> Option<String> {
        self.live.view().error
    }

    /// User the open subscription belongs to.
    pub fn current_uid(&self) -> Option<String> {
        self.live.current_key()
    }

    /// Ticket by ID from the live list.
    pub fn find(&self, id: &str) -> Option<Ticket> {
        self.tickets().iter().find(|t| t.id == id).cloned()
    }

    pub fn view(&self) -> LiveView<Ticket> {
        self.live.view()
    }

    pub fn watch(&self) -> watch::Receiver<LiveView<Ticket>> {
        self.live.watch()
    }

    /// Wait for the first snapshot (or error) of the current user.
    pub async fn wait_loaded(&self) -> LiveView<Ticket> {
        self.live.wait_loaded().await
    }

    /// Re-subscribe and wait for a fresh snapshot. The subscription normally
    /// keeps itself current; this is a manual nudge after a mutation.
    pub async fn refetch(&self) -> Result<()> {
        if self.live.reopen()? {
            self.live.wait_loaded().await;
        }
        Ok(())
    }

    /// Tear down the subscription, keeping the last list visible.
    pub fn close(&self) {
        self.live.close();
    }
}
