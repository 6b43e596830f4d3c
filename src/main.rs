// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Helpdesk-Sync runner
//!
//! Signs in, follows the user's live ticket list and logs every published
//! snapshot until interrupted.

use helpdesk_sync::{
    config::Config,
    db::{DocumentStore, FirestoreDb, MemoryStore},
    models::{LoginForm, TicketStats},
    services::{
        project, FilterPreferences, FirebaseAuthClient, IdentityProvider, LocalIdentityProvider,
    },
    App,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(
        project = %config.project_id,
        offline = config.offline,
        "Starting Helpdesk-Sync"
    );

    let preferences = match &config.prefs_path {
        Some(path) => FilterPreferences::load(path).await?,
        None => FilterPreferences::in_memory(),
    };

    if config.offline {
        let provider = Arc::new(LocalIdentityProvider::new());
        if let Some((email, password)) = config.credentials() {
            provider.add_account(email, password);
        }
        tracing::info!("Using in-memory backend");
        run(provider, MemoryStore::new(), preferences, &config).await
    } else {
        if let Some(host) = &config.firestore_emulator_host {
            tracing::info!(host = %host, "Firestore emulator configured");
        }
        let db = FirestoreDb::new(&config.project_id).await?;
        let provider = Arc::new(FirebaseAuthClient::new(
            config.auth_url.clone(),
            config.api_key.clone(),
        ));
        run(provider, db, preferences, &config).await
    }
}

async fn run<P: IdentityProvider, S: DocumentStore>(
    provider: Arc<P>,
    store: S,
    preferences: FilterPreferences,
    config: &Config,
) -> anyhow::Result<()> {
    let app = App::start(provider, store, preferences);

    let state = app.session.wait_resolved().await?;
    if state.user.is_none() {
        match config.credentials() {
            Some((email, password)) => {
                let form = LoginForm {
                    email: email.to_string(),
                    password: password.to_string(),
                };
                match app.session.sign_in(&form).await {
                    Ok(user) => tracing::info!(uid = %user.uid, "Signed in"),
                    Err(e) => {
                        tracing::warn!(error = %e, message = %e.user_message(), "Sign-in failed")
                    }
                }
            }
            None => tracing::info!("No credentials configured, waiting for a sign-in"),
        }
    }

    let mut views = app.tickets.watch();
    let mut session = app.session.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = session.borrow_and_update().clone();
                state.check()?;
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if view.loading {
                    continue;
                }
                if let Some(error) = &view.error {
                    tracing::warn!(error = %error, "Ticket list out of date");
                }

                let uid = app.session.state().uid().map(str::to_string);
                let filter = app.preferences.ticket_filter(uid.as_deref());
                let visible = project(&view.items, &filter);
                let stats = TicketStats::from_tickets(&view.items);
                tracing::info!(
                    uid = uid.as_deref().unwrap_or("-"),
                    total = stats.total,
                    visible = visible.len(),
                    resolved_percent = stats.resolved_percent(),
                    "Ticket snapshot"
                );
            }
        }
    }

    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("helpdesk_sync=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
