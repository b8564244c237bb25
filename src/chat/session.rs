//! Per-connection messaging session.
//!
//! ```text
//! Unauthenticated --handshake ok--> Authenticated --disconnect--> Disconnected
//!        \--handshake failed-------------------------------------^
//! ```
//!
//! Every inbound event on an authenticated session produces exactly one reply
//! on the same connection.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    auth::{authenticate, AuthError, SecretResolver, TokenKind},
    companies,
    db::unix_now,
    users::{self, Identity},
};

use super::{
    expiry::{DeletionScheduler, ScheduledDeletion},
    protocol::{ClientEvent, ServerEvent, START_CHAT_DENIED},
    registry::{ConnectionHandle, EventSender, Registry},
    store::{Conversation, ConversationStore, Message},
    ChatError,
};

/// Chat operations shared by every session.
#[derive(Debug, Clone)]
pub struct ChatService {
    db_pool: SqlitePool,
    store: ConversationStore,
    registry: Registry,
    scheduler: DeletionScheduler,
}

impl ChatService {
    pub fn new(db_pool: SqlitePool, registry: Registry, deletion_delay: std::time::Duration) -> Self {
        Self {
            store: ConversationStore::new(db_pool.clone()),
            scheduler: DeletionScheduler::new(db_pool.clone(), registry.clone(), deletion_delay),
            registry,
            db_pool,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> &DeletionScheduler {
        &self.scheduler
    }

    /// Persists a message from `sender` and forwards it to the receiver if connected.
    ///
    /// Only HR members or company owners may open a new conversation; once it
    /// exists either participant may append.
    pub async fn send_message(&self, sender: Uuid, receiver: Uuid, body: &str) -> Result<Conversation, ChatError> {
        if body.trim().is_empty() {
            return Err(ChatError::InvalidMessage("message body is empty"));
        }
        if sender == receiver {
            return Err(ChatError::InvalidMessage("cannot message yourself"));
        }
        if users::find_identity(&self.db_pool, receiver).await?.is_none() {
            return Err(ChatError::ReceiverNotFound);
        }

        let message = Message { body: body.to_owned(), sender_id: sender, sent_at: unix_now() };
        if !self.store.exists(sender, receiver).await? {
            self.open_conversation(sender, receiver).await?;
        }
        match self.store.append_message(sender, receiver, &message).await {
            Err(ChatError::ConversationNotFound) => {
                // removed between the lookup and the append
                self.open_conversation(sender, receiver).await?;
                self.store.append_message(sender, receiver, &message).await?;
            }
            other => other?,
        }

        let chat = self
            .store
            .find(sender, receiver)
            .await?
            .ok_or(ChatError::ConversationNotFound)?;

        if let Some(handle) = self.registry.resolve(receiver) {
            handle.send(ServerEvent::MessageReceived { body: message.body, sender_id: sender });
        }
        Ok(chat)
    }

    async fn open_conversation(&self, sender: Uuid, receiver: Uuid) -> Result<(), ChatError> {
        if !companies::is_hr_or_owner(&self.db_pool, sender).await? {
            tracing::debug!(user_id = %sender, "conversation start denied");
            return Err(ChatError::Unauthorized);
        }
        self.store.create(sender, receiver).await?;
        Ok(())
    }

    /// Arms deletion of an existing conversation. There is nothing to schedule
    /// for a pair that never talked.
    pub async fn schedule_deletion(&self, requester: Uuid, counterpart: Uuid) -> Result<ScheduledDeletion, ChatError> {
        if !self.store.exists(requester, counterpart).await? {
            return Err(ChatError::ConversationNotFound);
        }
        Ok(self.scheduler.schedule(requester, counterpart, unix_now()).await?)
    }

    pub async fn cancel_deletion(&self, requester: Uuid, counterpart: Uuid) -> Result<bool, ChatError> {
        let cancelled = self.scheduler.cancel(requester, counterpart).await?;
        if cancelled {
            tracing::info!(user_id = %requester, "scheduled chat deletion cancelled");
        }
        Ok(cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(Uuid),
    Disconnected,
}

pub struct Session {
    service: ChatService,
    handle: ConnectionHandle,
    state: SessionState,
}

impl Session {
    pub fn new(service: ChatService, sender: EventSender) -> Self {
        Self { service, handle: ConnectionHandle::new(sender), state: SessionState::Unauthenticated }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection_id(&self) -> Uuid {
        self.handle.connection_id()
    }

    /// Authenticates once and binds this connection to the identity.
    /// A failed handshake leaves the session disconnected.
    pub async fn handshake(&mut self, resolver: &dyn SecretResolver, token: Option<&str>) -> Result<Identity, AuthError> {
        if self.state != SessionState::Unauthenticated {
            return Err(AuthError::InvalidToken);
        }

        let result = match token {
            Some(token) => authenticate(&self.service.db_pool, resolver, token, TokenKind::Access).await,
            None => Err(AuthError::InvalidToken),
        };

        match result {
            Ok(auth) => {
                self.service.registry.register(auth.identity.id, self.handle.clone());
                self.state = SessionState::Authenticated(auth.identity.id);
                Ok(auth.identity)
            }
            Err(err) => {
                tracing::debug!(error = %err, "chat handshake rejected");
                self.state = SessionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Handles one inbound event. Returns false if the session cannot accept events.
    pub async fn dispatch(&mut self, event: ClientEvent) -> bool {
        let SessionState::Authenticated(me) = self.state else {
            return false;
        };

        let reply = match event {
            ClientEvent::SendMessage { body, receiver_id } => {
                match self.service.send_message(me, receiver_id, &body).await {
                    Ok(chat) => ServerEvent::MessageSent { body, chat },
                    Err(err) => error_event(err),
                }
            }
            ClientEvent::ScheduleDeletion { body, receiver_id } => {
                tracing::trace!(?body, "schedule_deletion body ignored");
                match self.service.schedule_deletion(me, receiver_id).await {
                    Ok(job) => ServerEvent::DeletionScheduled { receiver_id, due_at: job.due_at },
                    Err(err) => error_event(err),
                }
            }
            ClientEvent::CancelDeletion { receiver_id } => {
                match self.service.cancel_deletion(me, receiver_id).await {
                    Ok(cancelled) => ServerEvent::DeletionCancelled { receiver_id, cancelled },
                    Err(err) => error_event(err),
                }
            }
        };

        self.reply(reply);
        true
    }

    pub fn reply(&self, event: ServerEvent) {
        if !self.handle.send(event) {
            tracing::debug!(connection_id = %self.handle.connection_id(), "reply dropped, connection closed");
        }
    }

    pub fn disconnect(&mut self) {
        if let SessionState::Authenticated(id) = self.state {
            self.service.registry.release(id, self.handle.connection_id());
            tracing::info!(user_id = %id, "chat disconnected");
        }
        self.state = SessionState::Disconnected;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn error_event(err: ChatError) -> ServerEvent {
    match err {
        ChatError::Unauthorized => ServerEvent::AuthError { message: START_CHAT_DENIED.to_owned() },
        ChatError::Storage(err) => {
            tracing::error!(error = %err, "chat operation failed");
            ServerEvent::Error { message: "request failed, please retry".to_owned() }
        }
        other => ServerEvent::Error { message: other.to_string() },
    }
}
