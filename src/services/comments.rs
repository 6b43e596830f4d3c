// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live comment thread for the ticket being viewed.

use crate::db::{collections, CollectionQuery, Direction, DocumentStore};
use crate::error::Result;
use crate::models::Comment;
use crate::services::subscription::{LiveCollection, LiveView};
use std::sync::Arc;
use tokio::sync::watch;

/// Comments of one ticket, oldest first.
pub struct CommentStore<S: DocumentStore> {
    live: LiveCollection<S, Comment>,
}

pub fn comments_query(ticket_id: &str) -> CollectionQuery {
    CollectionQuery::new(collections::COMMENTS)
        .where_eq("ticketId", ticket_id)
        .order_by("createdAt", Direction::Ascending)
}

impl<S: DocumentStore> CommentStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            live: LiveCollection::new(store, collections::COMMENTS),
        }
    }

    /// Subscribe to `ticket_id`'s thread, closing the previous ticket's first.
    pub fn view_ticket(&self, ticket_id: &str) -> Result<()> {
        self.live.open(ticket_id, comments_query(ticket_id))
    }

    /// Comments of the open thread.
    pub fn comments(&self) -> Arc<Vec<Comment>> {
        self.live.view().items
    }

    /// Comments for `ticket_id`, if that is the thread currently open.
    pub fn comments_for(&self, ticket_id: &str) -> Option<Arc<Vec<Comment>>> {
        let view = self.live.view();
        (view.key.as_deref() == Some(ticket_id)).then_some(view.items)
    }

    pub fn loading(&self) -> bool {
        self.live.view().loading
    }

    pub fn current_ticket(&self) -> Option<String> {
        self.live.current_key()
    }

    pub fn watch(&self) -> watch::Receiver<LiveView<Comment>> {
        self.live.watch()
    }

    pub async fn wait_loaded(&self) -> LiveView<Comment> {
        self.live.wait_loaded().await
    }

    /// Leave the ticket screen.
    pub fn close(&self) {
        self.live.reset();
    }
}
