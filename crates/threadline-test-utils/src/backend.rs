//! An in-memory backend for session tests.
//!
//! [`ScriptedBackend`] implements [`MessageStore`] and [`ContactDirectory`]
//! the way the real server behaves (chats created on first use by contact,
//! own-message checks on edit and delete) and adds knobs for tests:
//!
//! - every request is recorded, in arrival order;
//! - [`fail`](ScriptedBackend::fail) makes an operation return an error;
//! - [`gate`](ScriptedBackend::gate) holds an operation's requests open
//!   until the test releases them, so in-flight state can be observed.
//!
//! Failures are decided when a request completes, so a test may gate a
//! request, flip it to failing, and then release it.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use threadline_core::BoxFuture;
use threadline_core::api::{
    ApiError, ContactDirectory, EditRequest, MessagePage, MessageStore, RawMessage, SendReceipt,
    SendRequest,
};
use threadline_core::{Address, ChatId, Contact, ContactId, MessageId};
use tokio::sync::{oneshot, watch};
use tracing::debug;

/// A remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Fetch,
    Send,
    Edit,
    Delete,
    ListContacts,
    AddContact,
    SearchUsers,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Fetch {
        user_id: String,
        address: Address,
    },
    Send {
        user_id: String,
        request: SendRequest,
    },
    Edit {
        user_id: String,
        request: EditRequest,
    },
    Delete {
        user_id: String,
        message_id: MessageId,
    },
    ListContacts {
        user_id: String,
    },
    AddContact {
        user_id: String,
        contact_id: ContactId,
    },
    SearchUsers {
        user_id: Option<String>,
        query: String,
    },
}

impl Request {
    pub fn op(&self) -> Op {
        match self {
            Request::Fetch { .. } => Op::Fetch,
            Request::Send { .. } => Op::Send,
            Request::Edit { .. } => Op::Edit,
            Request::Delete { .. } => Op::Delete,
            Request::ListContacts { .. } => Op::ListContacts,
            Request::AddContact { .. } => Op::AddContact,
            Request::SearchUsers { .. } => Op::SearchUsers,
        }
    }
}

#[derive(Default)]
struct Inner {
    requests: Vec<Request>,
    chats: HashMap<ChatId, Vec<RawMessage>>,
    chat_by_contact: HashMap<ContactId, ChatId>,
    contacts: Vec<Contact>,
    users: Vec<Contact>,
    failing: HashSet<Op>,
    gated: HashSet<Op>,
    gates: Vec<(Request, oneshot::Sender<()>)>,
    next_message_id: i64,
    next_chat_id: i64,
}

impl Inner {
    fn chat_for_contact(&mut self, contact_id: &ContactId) -> ChatId {
        if let Some(chat_id) = self.chat_by_contact.get(contact_id) {
            return chat_id.clone();
        }
        self.next_chat_id += 1;
        let chat_id = ChatId::from(self.next_chat_id);
        debug!(chat_id = %chat_id, contact_id = %contact_id, "Scripted backend created chat");
        self.chat_by_contact
            .insert(contact_id.clone(), chat_id.clone());
        self.chats.entry(chat_id.clone()).or_default();
        chat_id
    }

    fn find_message(&self, id: &MessageId) -> Option<(ChatId, usize)> {
        self.chats.iter().find_map(|(chat_id, messages)| {
            messages
                .iter()
                .position(|m| &m.id == id)
                .map(|index| (chat_id.clone(), index))
        })
    }
}

fn is_own(raw: &RawMessage, user_id: &str) -> bool {
    raw.is_own || raw.sender_id.as_ref().is_some_and(|s| s.as_str() == user_id)
}

fn status(status: u16, message: &str) -> ApiError {
    ApiError::Server {
        status,
        message: message.to_string(),
    }
}

/// In-memory [`MessageStore`] + [`ContactDirectory`] with scripted failures
/// and gates.
pub struct ScriptedBackend {
    inner: Mutex<Inner>,
    recorded: watch::Sender<usize>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        let (recorded, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner {
                next_message_id: 1000,
                next_chat_id: 100,
                ..Default::default()
            }),
            recorded,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding ───────────────────────────────────────────────────────

    /// Seed a chat with messages. With a contact id, the chat is also
    /// reachable by contact.
    pub fn with_chat(
        self,
        chat_id: impl Into<ChatId>,
        contact_id: Option<ContactId>,
        messages: Vec<RawMessage>,
    ) -> Self {
        {
            let mut inner = self.lock();
            let chat_id = chat_id.into();
            if let Some(contact_id) = contact_id {
                inner.chat_by_contact.insert(contact_id, chat_id.clone());
            }
            inner.chats.insert(chat_id, messages);
        }
        self
    }

    pub fn with_contacts(self, contacts: Vec<Contact>) -> Self {
        self.lock().contacts = contacts;
        self
    }

    /// Users discoverable through search and addable as contacts.
    pub fn with_users(self, users: Vec<Contact>) -> Self {
        self.lock().users = users;
        self
    }

    // ── Scripting ─────────────────────────────────────────────────────

    /// Make `op` fail with a 500 until [`succeed`](Self::succeed) is called.
    pub fn fail(&self, op: Op) {
        self.lock().failing.insert(op);
    }

    pub fn succeed(&self, op: Op) {
        self.lock().failing.remove(&op);
    }

    /// Hold every later `op` request open until released.
    pub fn gate(&self, op: Op) {
        self.lock().gated.insert(op);
    }

    /// Stop holding `op` requests. Requests already held stay held.
    pub fn ungate(&self, op: Op) {
        self.lock().gated.remove(&op);
    }

    /// Release held requests matching `predicate`, oldest first. Returns how
    /// many were released.
    pub fn release_where(&self, predicate: impl Fn(&Request) -> bool) -> usize {
        let released: Vec<_> = {
            let mut inner = self.lock();
            let (matched, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.gates)
                .into_iter()
                .partition(|(request, _)| predicate(request));
            inner.gates = kept;
            matched
        };
        let count = released.len();
        for (_, tx) in released {
            let _ = tx.send(());
        }
        count
    }

    pub fn release_all(&self) -> usize {
        self.release_where(|_| true)
    }

    /// Requests currently held on a gate.
    pub fn held(&self) -> Vec<Request> {
        self.lock()
            .gates
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    // ── Inspection ────────────────────────────────────────────────────

    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Bodies of every send request, in arrival order.
    pub fn sends(&self) -> Vec<SendRequest> {
        self.lock()
            .requests
            .iter()
            .filter_map(|request| match request {
                Request::Send { request, .. } => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `n` requests have been recorded.
    pub async fn wait_for_requests(&self, n: usize) {
        let mut rx = self.recorded.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// The server-side contents of a chat.
    pub fn stored_messages(&self, chat_id: &ChatId) -> Vec<RawMessage> {
        self.lock().chats.get(chat_id).cloned().unwrap_or_default()
    }

    pub fn stored_contacts(&self) -> Vec<Contact> {
        self.lock().contacts.clone()
    }

    // ── Dispatch ──────────────────────────────────────────────────────

    /// Record `request`, wait on its gate if gated, then run `respond`
    /// unless the operation is scripted to fail.
    fn handle<T>(
        &self,
        request: Request,
        respond: impl FnOnce(&mut Inner) -> Result<T, ApiError> + Send + 'static,
    ) -> BoxFuture<'_, Result<T, ApiError>>
    where
        T: Send + 'static,
    {
        let op = request.op();
        let gate = {
            let mut inner = self.lock();
            inner.requests.push(request.clone());
            let count = inner.requests.len();
            self.recorded.send_replace(count);
            if inner.gated.contains(&op) {
                let (tx, rx) = oneshot::channel();
                inner.gates.push((request, tx));
                Some(rx)
            } else {
                None
            }
        };

        Box::pin(async move {
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            let mut inner = self.lock();
            if inner.failing.contains(&op) {
                return Err(status(500, "scripted failure"));
            }
            respond(&mut *inner)
        })
    }
}

impl MessageStore for ScriptedBackend {
    fn fetch_messages(
        &self,
        user_id: String,
        address: Address,
    ) -> BoxFuture<'_, Result<MessagePage, ApiError>> {
        let request = Request::Fetch {
            user_id: user_id.clone(),
            address: address.clone(),
        };
        self.handle(request, move |inner| {
            let chat_id = match address {
                Address::Chat(chat_id) => chat_id,
                Address::Contact(contact_id) => inner.chat_for_contact(&contact_id),
            };
            let messages = inner
                .chats
                .get(&chat_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|mut raw| {
                    raw.is_own = is_own(&raw, &user_id);
                    raw
                })
                .collect();
            Ok(MessagePage {
                chat_id: Some(chat_id),
                messages,
            })
        })
    }

    fn send_message(
        &self,
        user_id: String,
        request: SendRequest,
    ) -> BoxFuture<'_, Result<SendReceipt, ApiError>> {
        let recorded = Request::Send {
            user_id: user_id.clone(),
            request: request.clone(),
        };
        self.handle(recorded, move |inner| {
            let text = request.text.trim().to_string();
            if text.is_empty() && !request.is_voice && !request.is_file {
                return Err(status(400, "Message text required"));
            }
            let chat_id = match request.address() {
                Some(Address::Chat(chat_id)) => chat_id,
                Some(Address::Contact(contact_id)) => inner.chat_for_contact(&contact_id),
                None => return Err(status(400, "chatId or contactId required")),
            };

            inner.next_message_id += 1;
            let id = MessageId::from(inner.next_message_id);
            let created_at = Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
            let raw = RawMessage {
                id: id.clone(),
                sender_id: Some(ContactId::from(user_id.as_str())),
                text: Some(text),
                created_at: Some(created_at.clone()),
                is_voice: request.is_voice,
                voice_duration: request.voice_duration,
                is_file: request.is_file,
                file_name: request.file_name,
                file_size: request.file_size,
                reply_to_id: request.reply_to_id,
                ..Default::default()
            };
            inner.chats.entry(chat_id.clone()).or_default().push(raw);

            Ok(SendReceipt {
                id,
                chat_id: Some(chat_id),
                created_at: Some(created_at),
            })
        })
    }

    fn edit_message(
        &self,
        user_id: String,
        request: EditRequest,
    ) -> BoxFuture<'_, Result<(), ApiError>> {
        let recorded = Request::Edit {
            user_id: user_id.clone(),
            request: request.clone(),
        };
        self.handle(recorded, move |inner| {
            let (chat_id, index) = inner
                .find_message(&request.message_id)
                .ok_or_else(|| status(404, "Message not found"))?;
            let Some(raw) = inner
                .chats
                .get_mut(&chat_id)
                .and_then(|messages| messages.get_mut(index))
            else {
                return Err(status(404, "Message not found"));
            };
            if !is_own(raw, &user_id) {
                return Err(status(403, "Forbidden"));
            }
            raw.text = Some(request.text);
            raw.is_edited = true;
            Ok(())
        })
    }

    fn delete_message(
        &self,
        user_id: String,
        message_id: MessageId,
    ) -> BoxFuture<'_, Result<(), ApiError>> {
        let recorded = Request::Delete {
            user_id: user_id.clone(),
            message_id: message_id.clone(),
        };
        self.handle(recorded, move |inner| {
            let (chat_id, index) = inner
                .find_message(&message_id)
                .ok_or_else(|| status(404, "Message not found"))?;
            let Some(messages) = inner.chats.get_mut(&chat_id) else {
                return Err(status(404, "Message not found"));
            };
            if !is_own(&messages[index], &user_id) {
                return Err(status(403, "Forbidden"));
            }
            messages.remove(index);
            Ok(())
        })
    }
}

impl ContactDirectory for ScriptedBackend {
    fn list_contacts(&self, user_id: String) -> BoxFuture<'_, Result<Vec<Contact>, ApiError>> {
        self.handle(Request::ListContacts { user_id }, |inner| {
            Ok(inner.contacts.clone())
        })
    }

    fn add_contact(
        &self,
        user_id: String,
        contact_id: ContactId,
    ) -> BoxFuture<'_, Result<(), ApiError>> {
        let recorded = Request::AddContact {
            user_id,
            contact_id: contact_id.clone(),
        };
        self.handle(recorded, move |inner| {
            if inner.contacts.iter().any(|c| c.id == contact_id) {
                return Ok(());
            }
            let user = inner
                .users
                .iter()
                .find(|u| u.id == contact_id)
                .cloned()
                .ok_or_else(|| status(404, "User not found"))?;
            inner.contacts.push(user);
            Ok(())
        })
    }

    fn search_users(
        &self,
        user_id: Option<String>,
        query: String,
    ) -> BoxFuture<'_, Result<Vec<Contact>, ApiError>> {
        let recorded = Request::SearchUsers {
            user_id: user_id.clone(),
            query: query.clone(),
        };
        self.handle(recorded, move |inner| {
            let needle = query.to_lowercase();
            Ok(inner
                .users
                .iter()
                .filter(|u| user_id.as_deref() != Some(u.id.as_str()))
                .filter(|u| u.name.to_lowercase().contains(&needle) || u.phone.contains(&needle))
                .cloned()
                .collect())
        })
    }
}
