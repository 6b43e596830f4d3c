// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Point writes for tickets and comments.
//!
//! Nothing here touches the live stores. A successful write only means the
//! backend accepted it; the change shows up in the UI when the next snapshot
//! arrives.

use crate::db::{collections, DocumentStore, WriteFields};
use crate::error::{AppError, Result};
use crate::models::{NewComment, NewTicket, Priority, Ticket, TicketForm, TicketStatus};
use crate::services::session::SessionState;
use crate::validation;
use tokio::sync::watch;

/// Issues ticket and comment writes as the signed-in user.
#[derive(Clone)]
pub struct TicketMutator<S: DocumentStore> {
    store: S,
    session: watch::Receiver<SessionState>,
}

impl<S: DocumentStore> TicketMutator<S> {
    pub fn new(store: S, session: watch::Receiver<SessionState>) -> Self {
        Self { store, session }
    }

    fn current_uid(&self) -> Result<String> {
        self.session
            .borrow()
            .uid()
            .map(str::to_string)
            .ok_or(AppError::Unauthorized)
    }

    /// Validate and create a ticket. Returns the new ticket's ID.
    pub async fn create_ticket(&self, form: TicketForm) -> Result<String> {
        validation::check(&form)?;
        let uid = self.current_uid()?;

        let body = WriteFields::from_object(&NewTicket::from_form(form, &uid))?
            .server_timestamp("createdAt");

        let id = self
            .store
            .write(collections::TICKETS, None, body)
            .await
            .map_err(|e| {
                tracing::error!(uid = %uid, error = %e, "Failed to create ticket");
                into_write_error(e)
            })?;

        tracing::info!(uid = %uid, ticket_id = %id, "Ticket created");
        Ok(id)
    }

    pub async fn update_status(&self, ticket_id: &str, status: TicketStatus) -> Result<()> {
        self.update_field(ticket_id, "status", status.as_str()).await?;
        tracing::info!(ticket_id, status = %status, "Ticket status updated");
        Ok(())
    }

    pub async fn update_priority(&self, ticket_id: &str, priority: Priority) -> Result<()> {
        self.update_field(ticket_id, "priority", priority.as_str()).await?;
        tracing::info!(ticket_id, priority = %priority, "Ticket priority updated");
        Ok(())
    }

    async fn update_field(&self, ticket_id: &str, field: &str, value: &str) -> Result<()> {
        self.current_uid()?;

        let body = WriteFields::new()
            .set(field, value)
            .server_timestamp("updatedAt");

        self.store
            .update(collections::TICKETS, ticket_id, body)
            .await
            .map_err(|e| {
                tracing::error!(ticket_id, field, error = %e, "Ticket update failed");
                into_write_error(e)
            })
    }

    /// Append a comment. Blank content is rejected before any write.
    pub async fn add_comment(&self, ticket_id: &str, content: &str) -> Result<String> {
        self.write_comment(ticket_id, content, None).await
    }

    pub async fn add_comment_with_attachment(
        &self,
        ticket_id: &str,
        content: &str,
        attachment_url: &str,
    ) -> Result<String> {
        self.write_comment(ticket_id, content, Some(attachment_url.to_string()))
            .await
    }

    async fn write_comment(
        &self,
        ticket_id: &str,
        content: &str,
        attachment_url: Option<String>,
    ) -> Result<String> {
        let comment = NewComment {
            ticket_id: ticket_id.to_string(),
            user_id: self.current_uid().unwrap_or_default(),
            content: content.to_string(),
            attachment_url,
        };
        validation::check(&comment)?;
        if comment.user_id.is_empty() {
            return Err(AppError::Unauthorized);
        }

        let body = WriteFields::from_object(&comment)?.server_timestamp("createdAt");
        let id = self
            .store
            .write(collections::COMMENTS, None, body)
            .await
            .map_err(|e| {
                tracing::error!(ticket_id, error = %e, "Failed to add comment");
                into_write_error(e)
            })?;

        tracing::info!(ticket_id, comment_id = %id, "Comment added");
        Ok(id)
    }

    /// One-shot read of a ticket, for detail screens opened by link.
    pub async fn fetch_ticket(&self, ticket_id: &str) -> Result<Ticket> {
        let doc = self
            .store
            .get_once(collections::TICKETS, ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", ticket_id)))?;

        doc.decode()
            .map_err(|e| AppError::Database(format!("Malformed ticket {}: {}", ticket_id, e)))
    }
}

/// Backend rejections surface as one-shot write errors.
fn into_write_error(err: AppError) -> AppError {
    match err {
        AppError::Database(msg) => AppError::Write(msg),
        other => other,
    }
}
