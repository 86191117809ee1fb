//! The chat session controller.
//!
//! [`ChatSession`] owns the resolver, the message list, and the compose state,
//! and drives loads and writes through the remote collaborators. All state
//! lives behind one mutex that is never held across an `.await`: each
//! operation reads what it needs, releases the lock for the remote call, then
//! re-locks to apply the result as a single [`reduce`] step.
//!
//! Remote failures never surface as `Err` from message operations. They are
//! logged and reported through [`LoadOutcome`], [`SendOutcome`], and
//! [`WriteOutcome`]; `Err` means a local precondition was not met.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ContactDirectory, EditRequest, MessageStore, SendRequest};
use crate::clock::{TempIdGenerator, now_display_time, parse_timestamp};
use crate::identity::Identity;
use crate::model::{ChatId, Contact, ContactId, Delivery, Message, MessageBody, MessageId, ReplyRef};
use crate::target::{ChatResolver, Target, TargetIntent};
use crate::thread::{self, ListAction, reduce};

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 256;

/// Local precondition failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in: no local user id")]
    IdentityMissing,

    #[error("no chat selected")]
    NoTarget,

    #[error("message {0} is not in the current chat")]
    UnknownMessage(MessageId),

    #[error("message {0} has not been confirmed by the server")]
    NotConfirmed(MessageId),

    #[error("message {0} cannot be edited")]
    NotEditable(MessageId),

    #[error("contact {0} is not in the contact list")]
    UnknownContact(ContactId),

    #[error("remote call failed: {0}")]
    Remote(#[from] ApiError),
}

/// Something observers of the session may want to re-render for.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TargetChanged {
        generation: u64,
        target: Option<Target>,
    },
    MessagesReplaced {
        count: usize,
    },
    MessageAppended {
        id: MessageId,
    },
    MessageConfirmed {
        temp_id: MessageId,
        id: MessageId,
    },
    MessageRolledBack {
        temp_id: MessageId,
    },
    MessageEdited {
        id: MessageId,
    },
    MessageDeleted {
        id: MessageId,
    },
    ChatAdopted {
        chat_id: ChatId,
    },
    ReactionAdded {
        id: MessageId,
        emoji: String,
    },
    ContactsUpdated {
        count: usize,
    },
    /// A user-visible notice.
    Notice(String),
}

/// Result of [`ChatSession::load_messages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No identity; the list was emptied without a remote call.
    Skipped,
    /// The page replaced the list.
    Applied { count: usize },
    /// The fetch failed; the list was emptied.
    Failed,
    /// The target changed while the fetch was in flight; the response was dropped.
    Discarded,
}

/// Result of a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send.
    Ignored,
    /// The server accepted the message; `temp_id` was replaced by `id`.
    Confirmed { temp_id: MessageId, id: MessageId },
    /// The write failed; the optimistic message was removed.
    RolledBack { temp_id: MessageId },
    /// The target changed while the write was in flight; the list was left alone.
    Discarded { temp_id: MessageId },
}

/// Result of an edit or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The server accepted the change and the list reflects it.
    Applied,
    /// The write failed; the list is unchanged.
    Failed,
    /// Nothing to write.
    Ignored,
}

/// Result of [`ChatSession::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Sent(SendOutcome),
    Edited(WriteOutcome),
}

/// The compose box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeState {
    pub draft: String,
    /// Snapshot of the message being replied to.
    pub reply_to: Option<ReplyRef>,
    /// The confirmed message being edited, if any.
    pub editing: Option<MessageId>,
}

/// An owned copy of the session state, for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub target: Option<Target>,
    pub generation: u64,
    pub messages: Vec<Message>,
    pub compose: ComposeState,
    pub contacts: Vec<Contact>,
}

/// A send that has been appended locally but not yet written.
///
/// Produced by [`ChatSession::stage_send`] and completed by
/// [`ChatSession::dispatch_send`].
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub temp_id: MessageId,
    pub request: SendRequest,
    generation: u64,
    user_id: String,
}

#[derive(Debug, Default)]
struct SessionState {
    identity: Option<Identity>,
    resolver: ChatResolver,
    messages: Vec<Message>,
    compose: ComposeState,
    contacts: Vec<Contact>,
    temp_ids: TempIdGenerator,
}

impl SessionState {
    fn apply(&mut self, action: ListAction) {
        self.messages = reduce(&self.messages, action);
    }

    fn user_id(&self) -> Option<String> {
        self.identity
            .as_ref()
            .filter(|identity| identity.is_usable())
            .map(|identity| identity.user_id.clone())
    }

    fn counterpart(&self) -> String {
        self.resolver
            .current()
            .map(|target| target.meta().name.clone())
            .unwrap_or_default()
    }

    fn message(&self, id: &MessageId) -> Result<&Message, SessionError> {
        thread::find(&self.messages, id).ok_or_else(|| SessionError::UnknownMessage(id.clone()))
    }

    /// A confirmed, own, text message.
    fn editable(&self, id: &MessageId) -> Result<&Message, SessionError> {
        let msg = self.message(id)?;
        if !msg.is_confirmed() {
            return Err(SessionError::NotConfirmed(id.clone()));
        }
        if !msg.is_own || !msg.body.is_text() {
            return Err(SessionError::NotEditable(id.clone()));
        }
        Ok(msg)
    }
}

/// A single user's view of one conversation at a time.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChatSession {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn ContactDirectory>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    pub fn new(store: Arc<dyn MessageStore>, directory: Arc<dyn ContactDirectory>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            store,
            directory,
            events,
        }
    }

    /// A session whose store and directory are the same backend.
    pub fn with_backend<B>(backend: Arc<B>) -> Self
    where
        B: MessageStore + ContactDirectory + 'static,
    {
        Self::new(backend.clone(), backend)
    }

    pub fn with_identity(self, identity: Identity) -> Self {
        self.set_identity(Some(identity));
        self
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Sign in or out. A blank user id counts as signed out.
    pub fn set_identity(&self, identity: Option<Identity>) {
        let identity = identity.filter(Identity::is_usable);
        if let Some(ref identity) = identity {
            info!(user_id = %identity.user_id, "Session identity set");
        }
        self.with_state(|state| state.identity = identity);
    }

    pub fn identity(&self) -> Option<Identity> {
        self.with_state(|state| state.identity.clone())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.with_state(|state| SessionSnapshot {
            identity: state.identity.clone(),
            target: state.resolver.current().cloned(),
            generation: state.resolver.generation(),
            messages: state.messages.clone(),
            compose: state.compose.clone(),
            contacts: state.contacts.clone(),
        })
    }

    pub fn messages(&self) -> Vec<Message> {
        self.with_state(|state| state.messages.clone())
    }

    pub fn target(&self) -> Option<Target> {
        self.with_state(|state| state.resolver.current().cloned())
    }

    // ── Target selection ──────────────────────────────────────────────

    /// Switch to a new conversation.
    ///
    /// Clears the list and the reply and edit state. Work still in flight
    /// for the previous target is ignored when it completes.
    pub fn select(&self, intent: TargetIntent) -> u64 {
        let (generation, target) = self.with_state(|state| {
            let generation = state.resolver.select(intent);
            state.apply(ListAction::Replace(Vec::new()));
            state.compose = ComposeState::default();
            (generation, state.resolver.current().cloned())
        });
        self.emit(SessionEvent::TargetChanged { generation, target });
        generation
    }

    /// Open a chat with a contact from the loaded contact list.
    pub fn open_contact(&self, contact_id: &ContactId) -> Result<u64, SessionError> {
        let contact = self.with_state(|state| {
            state
                .contacts
                .iter()
                .find(|contact| &contact.id == contact_id)
                .cloned()
        });
        let contact = contact.ok_or_else(|| SessionError::UnknownContact(contact_id.clone()))?;
        Ok(self.select(TargetIntent::from(&contact)))
    }

    /// Leave the current conversation.
    pub fn close(&self) {
        let generation = self.with_state(|state| {
            state.apply(ListAction::Replace(Vec::new()));
            state.compose = ComposeState::default();
            state.resolver.clear()
        });
        self.emit(SessionEvent::TargetChanged {
            generation,
            target: None,
        });
    }

    // ── Synchronization ───────────────────────────────────────────────

    /// Load the current target's history, replacing the local list.
    pub async fn load_messages(&self) -> Result<LoadOutcome, SessionError> {
        let prepared = self.with_state(|state| {
            let target = state.resolver.current().ok_or(SessionError::NoTarget)?;
            let address = target.address();
            let counterpart = target.meta().name.clone();
            match state.user_id() {
                Some(user_id) => Ok::<_, SessionError>(Some((
                    state.resolver.generation(),
                    address,
                    counterpart,
                    user_id,
                ))),
                None => {
                    state.apply(ListAction::Replace(Vec::new()));
                    Ok(None)
                }
            }
        })?;

        let Some((generation, address, counterpart, user_id)) = prepared else {
            debug!("No identity, skipping message load");
            self.emit(SessionEvent::MessagesReplaced { count: 0 });
            return Ok(LoadOutcome::Skipped);
        };

        let result = self.store.fetch_messages(user_id, address).await;

        let mut events = Vec::new();
        let outcome = self.with_state(|state| {
            if !state.resolver.is_current(generation) {
                debug!(generation, "Discarding messages for a previous target");
                return LoadOutcome::Discarded;
            }
            match result {
                Ok(page) => {
                    if let Some(chat_id) = page.chat_id
                        && state.resolver.adopt_chat_id(generation, chat_id.clone())
                    {
                        events.push(SessionEvent::ChatAdopted { chat_id });
                    }
                    let messages = thread::from_records(page.messages, &counterpart);
                    let count = messages.len();
                    state.apply(ListAction::Replace(messages));
                    events.push(SessionEvent::MessagesReplaced { count });
                    debug!(count, "Messages loaded");
                    LoadOutcome::Applied { count }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load messages");
                    state.apply(ListAction::Replace(Vec::new()));
                    events.push(SessionEvent::MessagesReplaced { count: 0 });
                    LoadOutcome::Failed
                }
            }
        });
        for event in events {
            self.emit(event);
        }
        Ok(outcome)
    }

    // ── Optimistic send ───────────────────────────────────────────────

    /// Append an optimistic message and build its write, without sending it.
    ///
    /// Returns `Ok(None)` for blank input. Consumes the reply snapshot and
    /// clears the draft.
    pub fn stage_send(&self, body: MessageBody) -> Result<Option<PendingSend>, SessionError> {
        if body.is_blank() {
            return Ok(None);
        }
        let body = match body {
            MessageBody::Text(text) => MessageBody::Text(text.trim().to_string()),
            other => other,
        };

        let staged = self.with_state(|state| {
            let user_id = state.user_id().ok_or(SessionError::IdentityMissing)?;
            let target = state.resolver.current().ok_or(SessionError::NoTarget)?;
            let address = target.address();

            let reply_to = state.compose.reply_to.take();
            let request = SendRequest::new(
                &address,
                &body,
                reply_to.as_ref().map(|reply| reply.id.clone()),
            );

            let temp_id = state.temp_ids.next_id();
            let mut msg = Message::new(temp_id.clone(), body, now_display_time());
            msg.created_at = Some(Utc::now());
            msg.is_own = true;
            msg.reply_to = reply_to;
            msg.delivery = Delivery::Pending;
            state.apply(ListAction::Append(msg));
            state.compose.draft.clear();

            Ok::<_, SessionError>(PendingSend {
                temp_id,
                request,
                generation: state.resolver.generation(),
                user_id,
            })
        });

        match staged {
            Ok(pending) => {
                debug!(temp_id = %pending.temp_id, "Optimistic message appended");
                self.emit(SessionEvent::MessageAppended {
                    id: pending.temp_id.clone(),
                });
                Ok(Some(pending))
            }
            Err(SessionError::IdentityMissing) => {
                self.emit(SessionEvent::Notice(
                    "Sign in to send messages".to_string(),
                ));
                Err(SessionError::IdentityMissing)
            }
            Err(e) => Err(e),
        }
    }

    /// Write a staged message and reconcile the list with the result.
    pub async fn dispatch_send(&self, pending: PendingSend) -> SendOutcome {
        let PendingSend {
            temp_id,
            request,
            generation,
            user_id,
        } = pending;

        let result = self.store.send_message(user_id, request).await;

        let mut events = Vec::new();
        let outcome = self.with_state(|state| match result {
            _ if !state.resolver.is_current(generation) => {
                debug!(
                    temp_id = %temp_id,
                    generation,
                    "Discarding send result for a previous target"
                );
                SendOutcome::Discarded { temp_id }
            }
            Ok(receipt) => {
                state.apply(ListAction::Confirm {
                    temp_id: temp_id.clone(),
                    id: receipt.id.clone(),
                    created_at: receipt.created_at.as_deref().and_then(parse_timestamp),
                });
                if let Some(chat_id) = receipt.chat_id
                    && state.resolver.adopt_chat_id(generation, chat_id.clone())
                {
                    events.push(SessionEvent::ChatAdopted { chat_id });
                }
                info!(temp_id = %temp_id, id = %receipt.id, "Message confirmed");
                events.push(SessionEvent::MessageConfirmed {
                    temp_id: temp_id.clone(),
                    id: receipt.id.clone(),
                });
                SendOutcome::Confirmed {
                    temp_id,
                    id: receipt.id,
                }
            }
            Err(e) => {
                warn!(temp_id = %temp_id, error = %e, "Send failed, rolling back");
                state.apply(ListAction::Rollback {
                    temp_id: temp_id.clone(),
                });
                events.push(SessionEvent::MessageRolledBack {
                    temp_id: temp_id.clone(),
                });
                SendOutcome::RolledBack { temp_id }
            }
        });
        for event in events {
            self.emit(event);
        }
        outcome
    }

    async fn send_body(&self, body: MessageBody) -> Result<SendOutcome, SessionError> {
        match self.stage_send(body)? {
            Some(pending) => Ok(self.dispatch_send(pending).await),
            None => Ok(SendOutcome::Ignored),
        }
    }

    /// Send a text message. Blank text is ignored.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, SessionError> {
        self.send_body(MessageBody::Text(text.to_string())).await
    }

    /// Send a voice note of the given display duration.
    pub async fn send_voice(&self, duration: Option<&str>) -> Result<SendOutcome, SessionError> {
        self.send_body(MessageBody::Voice {
            duration: duration.map(str::to_string),
        })
        .await
    }

    /// Send a file attachment.
    pub async fn send_file(
        &self,
        name: &str,
        size: Option<u64>,
    ) -> Result<SendOutcome, SessionError> {
        self.send_body(MessageBody::File {
            name: name.trim().to_string(),
            size,
        })
        .await
    }

    // ── Edit / delete ─────────────────────────────────────────────────

    /// Replace the text of one of the user's confirmed messages.
    ///
    /// The list changes only after the server accepts the edit.
    pub async fn edit_message(
        &self,
        id: &MessageId,
        text: &str,
    ) -> Result<WriteOutcome, SessionError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Ok(WriteOutcome::Ignored);
        }
        let (generation, user_id) = self.with_state(|state| {
            state.editable(id)?;
            let user_id = state.user_id().ok_or(SessionError::IdentityMissing)?;
            Ok::<_, SessionError>((state.resolver.generation(), user_id))
        })?;

        let request = EditRequest {
            message_id: id.clone(),
            text: text.clone(),
        };
        match self.store.edit_message(user_id, request).await {
            Ok(()) => {
                let applied = self.with_state(|state| {
                    let current = state.resolver.is_current(generation);
                    if current {
                        state.apply(ListAction::Edit {
                            id: id.clone(),
                            text,
                        });
                    }
                    current
                });
                if applied {
                    debug!(id = %id, "Message edited");
                    self.emit(SessionEvent::MessageEdited { id: id.clone() });
                }
                Ok(WriteOutcome::Applied)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Edit failed");
                Ok(WriteOutcome::Failed)
            }
        }
    }

    /// Delete a confirmed message. It stays in the list until the server
    /// confirms the delete.
    pub async fn delete_message(&self, id: &MessageId) -> Result<WriteOutcome, SessionError> {
        let (generation, user_id) = self.with_state(|state| {
            let msg = state.message(id)?;
            if !msg.is_confirmed() {
                return Err(SessionError::NotConfirmed(id.clone()));
            }
            let user_id = state.user_id().ok_or(SessionError::IdentityMissing)?;
            Ok::<_, SessionError>((state.resolver.generation(), user_id))
        })?;

        match self.store.delete_message(user_id, id.clone()).await {
            Ok(()) => {
                let applied = self.with_state(|state| {
                    let current = state.resolver.is_current(generation);
                    if current {
                        state.apply(ListAction::Remove { id: id.clone() });
                        if state.compose.editing.as_ref() == Some(id) {
                            state.compose.editing = None;
                            state.compose.draft.clear();
                        }
                        if state.compose.reply_to.as_ref().is_some_and(|r| &r.id == id) {
                            state.compose.reply_to = None;
                        }
                    }
                    current
                });
                if applied {
                    debug!(id = %id, "Message deleted");
                    self.emit(SessionEvent::MessageDeleted { id: id.clone() });
                }
                Ok(WriteOutcome::Applied)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Delete failed");
                Ok(WriteOutcome::Failed)
            }
        }
    }

    // ── Session-local actions ─────────────────────────────────────────

    /// Add an emoji reaction. Not sent to the server.
    pub fn react(&self, id: &MessageId, emoji: &str) -> Result<(), SessionError> {
        self.with_state(|state| {
            state.message(id)?;
            state.apply(ListAction::React {
                id: id.clone(),
                emoji: emoji.to_string(),
            });
            Ok::<_, SessionError>(())
        })?;
        self.emit(SessionEvent::ReactionAdded {
            id: id.clone(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    /// Append a local copy of a message, flagged as forwarded.
    ///
    /// The copy is never written to the server and disappears on reload.
    pub fn forward_message(&self, id: &MessageId) -> Result<MessageId, SessionError> {
        let copy_id = self.with_state(|state| {
            let counterpart = state.counterpart();
            let source = state.message(id)?;
            let body = source.body.clone();
            let forwarded_from = source.sender_label(&counterpart);

            let mut copy = Message::new(state.temp_ids.next_id(), body, now_display_time());
            copy.is_forwarded = true;
            copy.forwarded_from = Some(forwarded_from);
            copy.created_at = Some(Utc::now());
            copy.is_own = true;
            copy.delivery = Delivery::LocalOnly;
            let copy_id = copy.id.clone();
            state.apply(ListAction::Append(copy));
            Ok::<_, SessionError>(copy_id)
        })?;
        self.emit(SessionEvent::MessageAppended {
            id: copy_id.clone(),
        });
        Ok(copy_id)
    }

    // ── Compose ───────────────────────────────────────────────────────

    pub fn set_draft(&self, text: &str) {
        self.with_state(|state| state.compose.draft = text.to_string());
    }

    pub fn compose(&self) -> ComposeState {
        self.with_state(|state| state.compose.clone())
    }

    /// Reply to a confirmed message with the next send.
    pub fn reply_to(&self, id: &MessageId) -> Result<(), SessionError> {
        self.with_state(|state| {
            let counterpart = state.counterpart();
            let msg = state.message(id)?;
            if !msg.is_confirmed() {
                return Err(SessionError::NotConfirmed(id.clone()));
            }
            state.compose.reply_to = Some(msg.reply_ref(&counterpart));
            Ok::<_, SessionError>(())
        })
    }

    pub fn clear_reply(&self) {
        self.with_state(|state| state.compose.reply_to = None);
    }

    /// Start editing a message: its text becomes the draft.
    pub fn begin_edit(&self, id: &MessageId) -> Result<(), SessionError> {
        self.with_state(|state| {
            let text = state.editable(id)?.text().to_string();
            state.compose = ComposeState {
                draft: text,
                reply_to: None,
                editing: Some(id.clone()),
            };
            Ok::<_, SessionError>(())
        })
    }

    pub fn cancel_edit(&self) {
        self.with_state(|state| {
            if state.compose.editing.take().is_some() {
                state.compose.draft.clear();
            }
        });
    }

    /// Submit the compose box: edits when an edit is in progress, else sends.
    pub async fn submit(&self) -> Result<Submitted, SessionError> {
        let (draft, editing) =
            self.with_state(|state| (state.compose.draft.clone(), state.compose.editing.clone()));

        match editing {
            Some(id) => {
                let outcome = self.edit_message(&id, &draft).await?;
                if outcome == WriteOutcome::Applied {
                    self.with_state(|state| {
                        if state.compose.editing.as_ref() == Some(&id) {
                            state.compose = ComposeState::default();
                        }
                    });
                }
                Ok(Submitted::Edited(outcome))
            }
            None => Ok(Submitted::Sent(self.send_message(&draft).await?)),
        }
    }

    // ── Contacts ──────────────────────────────────────────────────────

    /// Reload the contact list.
    pub async fn refresh_contacts(&self) -> Result<Vec<Contact>, SessionError> {
        let user_id = self
            .with_state(|state| state.user_id())
            .ok_or(SessionError::IdentityMissing)?;
        let contacts = self.directory.list_contacts(user_id).await?;
        let count = contacts.len();
        self.with_state(|state| state.contacts = contacts.clone());
        debug!(count, "Contacts refreshed");
        self.emit(SessionEvent::ContactsUpdated { count });
        Ok(contacts)
    }

    /// Add a user to the contact list, then reload it.
    pub async fn add_contact(&self, contact_id: &ContactId) -> Result<Vec<Contact>, SessionError> {
        let user_id = self
            .with_state(|state| state.user_id())
            .ok_or(SessionError::IdentityMissing)?;
        self.directory
            .add_contact(user_id, contact_id.clone())
            .await?;
        info!(contact_id = %contact_id, "Contact added");
        self.refresh_contacts().await
    }

    /// Search users by name or phone. Blank queries return nothing.
    pub async fn search_users(&self, query: &str) -> Result<Vec<Contact>, SessionError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let user_id = self.with_state(|state| state.user_id());
        Ok(self
            .directory
            .search_users(user_id, query.to_string())
            .await?)
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.with_state(|state| state.contacts.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::BoxFuture;
    use crate::api::{MessagePage, SendReceipt};
    use crate::target::{Address, DisplayMeta};

    /// Counts calls and fails every one of them.
    #[derive(Default)]
    struct Offline {
        calls: AtomicUsize,
    }

    impl Offline {
        fn fail<T: Send + 'static>(&self) -> BoxFuture<'_, Result<T, ApiError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(ApiError::Network("offline".to_string())) })
        }
    }

    impl MessageStore for Offline {
        fn fetch_messages(&self, _: String, _: Address) -> BoxFuture<'_, Result<MessagePage, ApiError>> {
            self.fail()
        }
        fn send_message(&self, _: String, _: SendRequest) -> BoxFuture<'_, Result<SendReceipt, ApiError>> {
            self.fail()
        }
        fn edit_message(&self, _: String, _: EditRequest) -> BoxFuture<'_, Result<(), ApiError>> {
            self.fail()
        }
        fn delete_message(&self, _: String, _: MessageId) -> BoxFuture<'_, Result<(), ApiError>> {
            self.fail()
        }
    }

    impl ContactDirectory for Offline {
        fn list_contacts(&self, _: String) -> BoxFuture<'_, Result<Vec<Contact>, ApiError>> {
            self.fail()
        }
        fn add_contact(&self, _: String, _: ContactId) -> BoxFuture<'_, Result<(), ApiError>> {
            self.fail()
        }
        fn search_users(&self, _: Option<String>, _: String) -> BoxFuture<'_, Result<Vec<Contact>, ApiError>> {
            self.fail()
        }
    }

    fn session() -> (ChatSession, Arc<Offline>) {
        let backend = Arc::new(Offline::default());
        (ChatSession::with_backend(backend.clone()), backend)
    }

    fn chat(id: &str) -> TargetIntent {
        TargetIntent::Chat {
            chat_id: ChatId::from(id),
            meta: DisplayMeta::new("Anna"),
        }
    }

    #[tokio::test]
    async fn test_load_without_target() {
        let (session, backend) = session();
        session.set_identity(Some(Identity::new("1")));
        assert_eq!(session.load_messages().await, Err(SessionError::NoTarget));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_without_identity_emits_notice() {
        let (session, backend) = session();
        let mut events = session.subscribe();
        session.select(chat("10"));

        let result = session.send_message("hi").await;
        assert_eq!(result, Err(SessionError::IdentityMissing));
        assert!(session.messages().is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::TargetChanged { .. }
        ));
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Notice(_)));
    }

    #[tokio::test]
    async fn test_send_without_identity_or_target_emits_notice() {
        let (session, backend) = session();
        let mut events = session.subscribe();

        let result = session.send_message("hi").await;
        assert_eq!(result, Err(SessionError::IdentityMissing));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Notice(_)));
    }

    #[tokio::test]
    async fn test_blank_identity_is_signed_out() {
        let (session, _) = session();
        session.set_identity(Some(Identity::new("   ")));
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn test_failed_load_empties_list() {
        let (session, _) = session();
        let session = session.with_identity(Identity::new("1"));
        session.select(chat("10"));
        assert_eq!(session.load_messages().await, Ok(LoadOutcome::Failed));
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_rolls_back() {
        let (session, _) = session();
        let session = session.with_identity(Identity::new("1"));
        session.select(chat("10"));

        let outcome = session.send_message("hello").await.unwrap();
        assert!(matches!(outcome, SendOutcome::RolledBack { .. }));
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_stage_send_appends_before_dispatch() {
        let (session, _) = session();
        let session = session.with_identity(Identity::new("1"));
        session.select(chat("10"));
        session.set_draft("  hello  ");

        let pending = session.stage_send(MessageBody::Text("  hello  ".to_string()))
            .unwrap()
            .unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].id, pending.temp_id);
        assert_eq!(snapshot.messages[0].text(), "hello");
        assert!(snapshot.messages[0].is_pending());
        assert!(snapshot.messages[0].is_own);
        assert_eq!(snapshot.compose.draft, "");
        assert_eq!(pending.request.chat_id, Some(ChatId::from("10")));
    }

    #[tokio::test]
    async fn test_open_unknown_contact() {
        let (session, _) = session();
        let id = ContactId::from("5");
        assert_eq!(
            session.open_contact(&id),
            Err(SessionError::UnknownContact(id))
        );
    }

    #[tokio::test]
    async fn test_directory_failure_is_remote_error() {
        let (session, _) = session();
        let session = session.with_identity(Identity::new("1"));
        let err = session.refresh_contacts().await.unwrap_err();
        assert!(matches!(err, SessionError::Remote(ApiError::Network(_))));
    }

    #[tokio::test]
    async fn test_blank_search_makes_no_call() {
        let (session, backend) = session();
        assert_eq!(session.search_users("  ").await, Ok(Vec::new()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forward_and_react_are_local() {
        let (session, backend) = session();
        session.select(chat("10"));
        session.with_state(|state| {
            let mut msg = Message::new("3", MessageBody::Text("hey".to_string()), "9:00");
            msg.sender_name = Some("Anna".to_string());
            state.apply(ListAction::Append(msg));
        });

        let copy = session.forward_message(&MessageId::from("3")).unwrap();
        session.react(&MessageId::from("3"), "👍").unwrap();

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, copy);
        assert!(messages[1].is_forwarded);
        assert_eq!(messages[1].forwarded_from.as_deref(), Some("Anna"));
        assert_eq!(messages[1].delivery, Delivery::LocalOnly);
        assert_eq!(messages[0].reactions[0].emoji, "👍");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::NotEditable(MessageId::from("5"));
        assert_eq!(err.to_string(), "message 5 cannot be edited");
    }
}
