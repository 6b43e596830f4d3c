// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Helpdesk-Sync: client-side real-time sync for a support-ticket app
//!
//! This crate keeps a signed-in user's tickets and comment threads in sync
//! with a document database, and issues the validated writes that create
//! and update them.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;
pub mod validation;

use db::DocumentStore;
use services::{
    AuthSession, CommentStore, FilterPreferences, IdentityProvider, TicketMutator, TicketStore,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Shared application state: the session plus the stores that follow it.
pub struct App<P: IdentityProvider, S: DocumentStore> {
    pub session: AuthSession<P, S>,
    pub tickets: Arc<TicketStore<S>>,
    pub comments: CommentStore<S>,
    pub mutator: TicketMutator<S>,
    pub preferences: FilterPreferences,
    follower: JoinHandle<()>,
}

impl<P: IdentityProvider, S: DocumentStore> App<P, S> {
    /// Start the session and point the ticket store at it. Must be called
    /// inside a Tokio runtime.
    pub fn start(provider: Arc<P>, store: S, preferences: FilterPreferences) -> Self {
        let session = AuthSession::start(provider, store.clone());
        let tickets = Arc::new(TicketStore::new(store.clone()));
        let follower = tickets.follow_session(session.subscribe());

        Self {
            mutator: TicketMutator::new(store.clone(), session.subscribe()),
            comments: CommentStore::new(store),
            session,
            tickets,
            preferences,
            follower,
        }
    }
}

impl<P: IdentityProvider, S: DocumentStore> Drop for App<P, S> {
    fn drop(&mut self) {
        self.follower.abort();
        self.tickets.close();
    }
}
