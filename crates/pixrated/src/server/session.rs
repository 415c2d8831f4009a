//! Per-connection session handling.
//!
//! Each accepted connection gets a `SessionHandler` that:
//! - Registers the connection and announces the image list
//! - Reads inbound frames one at a time, in order
//! - Echoes text and unknown JSON back to the sender
//! - Persists ratings and fans the updated feed out to everyone else
//! - Deregisters exactly once when the transport ends
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Transport errors end the session; everything else is a reply

use std::sync::Arc;

use chrono::Local;
use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use pixrate_core::SessionId;
use pixrate_protocol::{format_text_echo, InboundMessage, RawRatingRequest, ServerMessage};

use super::connection::{Connection, ConnectionError};
use crate::broadcast::Broadcaster;
use crate::catalog::ImageCatalog;
use crate::registry::RegistryHandle;
use crate::store::RatingStore;

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, not yet registered
    Connecting,
    /// Registered and processing messages
    Active,
    /// Transport ended, registration released
    Closed,
}

/// Shared services every session needs.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: RegistryHandle,
    pub broadcaster: Broadcaster,
    pub store: Arc<dyn RatingStore>,
    pub catalog: Arc<ImageCatalog>,

    /// Inbound text frames longer than this get an error reply
    pub max_message_size: usize,
}

/// Drives one client session from registration to close.
pub struct SessionHandler {
    connection: Arc<Connection>,
    ctx: SessionContext,
    state: SessionState,
}

impl SessionHandler {
    pub fn new(connection: Arc<Connection>, ctx: SessionContext) -> Self {
        Self {
            connection,
            ctx,
            state: SessionState::Connecting,
        }
    }

    /// Current lifecycle state. `Closed` once `run` has returned.
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            connection = %self.connection.id(),
            from = ?self.state,
            to = ?next,
            "Session state change"
        );
        self.state = next;
    }

    /// Runs the session until `inbound` ends or fails.
    ///
    /// Returns the session identifier that was assigned, or `None` if the
    /// connection could not be registered.
    pub async fn run<S>(&mut self, mut inbound: S) -> Option<SessionId>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let client = self.connection.addr();

        let registration = match self
            .ctx
            .registry
            .register_scoped(Arc::clone(&self.connection))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(client = %client, error = %e, "Failed to register connection");
                self.transition(SessionState::Closed);
                self.connection.close();
                return None;
            }
        };
        let session_id = registration.session_id().clone();
        self.transition(SessionState::Active);

        info!(session_id = %session_id, client = %client, "Client connected");

        let files = self.ctx.catalog.list_files().await;
        let file_count = files.len();
        match self
            .connection
            .send(&ServerMessage::file_list(files, session_id.clone()))
            .await
        {
            Ok(()) => debug!(session_id = %session_id, files = file_count, "Sent file list"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to send file list"),
        }

        if let Err(e) = self.process_messages(&mut inbound, &session_id).await {
            debug!(session_id = %session_id, error = %e, "Session ended with error");
        }

        self.transition(SessionState::Closed);
        if let Err(e) = registration.release().await {
            warn!(session_id = %session_id, error = %e, "Failed to deregister connection");
        }
        self.connection.close();

        info!(session_id = %session_id, client = %client, "Client disconnected");
        Some(session_id)
    }

    /// Main message loop.
    async fn process_messages<S>(
        &mut self,
        inbound: &mut S,
        session_id: &SessionId,
    ) -> Result<(), ConnectionError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        while let Some(frame) = inbound.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    self.handle_text(text.as_str(), session_id).await?;
                }
                Ok(Message::Close(_)) => {
                    debug!(session_id = %session_id, "Close frame received");
                    return Ok(());
                }
                Ok(Message::Binary(data)) => {
                    debug!(session_id = %session_id, bytes = data.len(), "Ignoring binary frame");
                }
                Ok(_) => {}
                Err(e) => return Err(ConnectionError::Transport(e.to_string())),
            }
        }
        Ok(())
    }

    /// Handles one inbound text frame.
    async fn handle_text(&self, text: &str, session_id: &SessionId) -> Result<(), ConnectionError> {
        if text.len() > self.ctx.max_message_size {
            warn!(
                session_id = %session_id,
                size = text.len(),
                max = self.ctx.max_message_size,
                "Message too large"
            );
            return self
                .connection
                .send(&ServerMessage::error(&format!(
                    "Message too large ({} bytes, max {})",
                    text.len(),
                    self.ctx.max_message_size
                )))
                .await;
        }

        let client = self.connection.addr().to_string();

        match InboundMessage::parse(text) {
            InboundMessage::Text(text) => {
                debug!(session_id = %session_id, "Plain text message");
                let reply = format_text_echo(&text, &client, Local::now().time());
                self.connection.send_text(reply).await
            }
            InboundMessage::Structured(value) => {
                debug!(session_id = %session_id, "Structured message");
                self.connection
                    .send(&ServerMessage::echo(value, &client, session_id.clone()))
                    .await
            }
            InboundMessage::ImageRating(request) => self.handle_rating(request, session_id).await,
        }
    }

    /// Validates, persists and fans out one rating.
    async fn handle_rating(
        &self,
        request: RawRatingRequest,
        session_id: &SessionId,
    ) -> Result<(), ConnectionError> {
        let submission = match request.into_submission() {
            Ok(s) => s,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "Rejected rating submission");
                return self
                    .connection
                    .send(&ServerMessage::error(&format!("Invalid rating submission: {e}")))
                    .await;
            }
        };

        match self.ctx.store.save_rating(session_id, &submission).await {
            Ok(aggregate) => {
                info!(
                    session_id = %session_id,
                    image = %submission.image_filename,
                    rating = submission.rating,
                    total = aggregate.total_ratings(),
                    "Rating saved"
                );
                self.ctx
                    .broadcaster
                    .broadcast(
                        &ServerMessage::rating_feed_update(&aggregate),
                        Some(self.connection.id()),
                    )
                    .await;
                self.connection
                    .send(&ServerMessage::rating_saved(&submission, true))
                    .await
            }
            Err(e) => {
                error!(
                    session_id = %session_id,
                    image = %submission.image_filename,
                    error = %e,
                    "Failed to save rating"
                );
                self.connection
                    .send(&ServerMessage::rating_saved(&submission, false))
                    .await
            }
        }
    }
}
