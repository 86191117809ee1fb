//! Chat target resolution.
//!
//! A UI intent names either an existing chat or a contact. The resolver turns
//! it into a [`Target`] and keeps a generation counter so that responses
//! issued for a previous target can be recognized and dropped.

use tracing::{debug, info};

use crate::model::{ChatId, Contact, ContactId};

/// Who the user is talking to, for headers and reply labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayMeta {
    pub name: String,
    pub phone: Option<String>,
}

impl DisplayMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// A request to open a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetIntent {
    /// An existing chat, picked from the chat list.
    Chat { chat_id: ChatId, meta: DisplayMeta },
    /// A known contact whose chat id may or may not exist yet.
    Contact {
        contact_id: ContactId,
        meta: DisplayMeta,
    },
    /// A freshly-picked contact with no chat yet.
    NewContact {
        contact_id: ContactId,
        name: String,
        phone: String,
    },
}

impl From<&Contact> for TargetIntent {
    fn from(contact: &Contact) -> Self {
        TargetIntent::NewContact {
            contact_id: contact.id.clone(),
            name: contact.name.clone(),
            phone: contact.phone.clone(),
        }
    }
}

/// How a request to the message store is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Chat(ChatId),
    Contact(ContactId),
}

impl Address {
    /// The query parameter this address is sent as.
    pub fn query_pair(&self) -> (&'static str, &str) {
        match self {
            Address::Chat(id) => ("chatId", id.as_str()),
            Address::Contact(id) => ("contactId", id.as_str()),
        }
    }
}

/// The active conversation.
///
/// A target always resolves to a chat id or a contact id; there is no state
/// with neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A chat whose server id is known.
    SelectedChat {
        chat_id: ChatId,
        contact_id: Option<ContactId>,
        meta: DisplayMeta,
    },
    /// A contact with no chat yet. The chat is created on first send.
    NewChatContact {
        contact_id: ContactId,
        meta: DisplayMeta,
    },
}

impl Target {
    pub fn from_intent(intent: TargetIntent) -> Self {
        match intent {
            TargetIntent::Chat { chat_id, meta } => Target::SelectedChat {
                chat_id,
                contact_id: None,
                meta,
            },
            TargetIntent::Contact { contact_id, meta } => {
                Target::NewChatContact { contact_id, meta }
            }
            TargetIntent::NewContact {
                contact_id,
                name,
                phone,
            } => Target::NewChatContact {
                contact_id,
                meta: DisplayMeta::new(name).with_phone(phone),
            },
        }
    }

    /// Addressing for remote calls. A known chat id wins over the contact id.
    pub fn address(&self) -> Address {
        match self {
            Target::SelectedChat { chat_id, .. } => Address::Chat(chat_id.clone()),
            Target::NewChatContact { contact_id, .. } => Address::Contact(contact_id.clone()),
        }
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            Target::SelectedChat { chat_id, .. } => Some(chat_id),
            Target::NewChatContact { .. } => None,
        }
    }

    pub fn contact_id(&self) -> Option<&ContactId> {
        match self {
            Target::SelectedChat { contact_id, .. } => contact_id.as_ref(),
            Target::NewChatContact { contact_id, .. } => Some(contact_id),
        }
    }

    pub fn meta(&self) -> &DisplayMeta {
        match self {
            Target::SelectedChat { meta, .. } | Target::NewChatContact { meta, .. } => meta,
        }
    }

    /// True until the server has assigned a chat id.
    pub fn is_pending(&self) -> bool {
        matches!(self, Target::NewChatContact { .. })
    }

    /// Record a server-assigned chat id. Returns `true` if the target changed.
    ///
    /// A known chat id is never overwritten, and a blank id is ignored.
    pub fn adopt_chat_id(&mut self, chat_id: ChatId) -> bool {
        if chat_id.is_empty() {
            return false;
        }
        match self {
            Target::SelectedChat { .. } => false,
            Target::NewChatContact { contact_id, meta } => {
                *self = Target::SelectedChat {
                    chat_id,
                    contact_id: Some(contact_id.clone()),
                    meta: meta.clone(),
                };
                true
            }
        }
    }
}

/// Holds the current target and its generation.
///
/// Every [`select`](Self::select) or [`clear`](Self::clear) bumps the
/// generation. Async work captures the generation when it starts and checks
/// [`is_current`](Self::is_current) before applying its result.
#[derive(Debug, Default)]
pub struct ChatResolver {
    current: Option<Target>,
    generation: u64,
}

impl ChatResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `intent` the active target and return the new generation.
    pub fn select(&mut self, intent: TargetIntent) -> u64 {
        let target = Target::from_intent(intent);
        self.generation += 1;
        info!(
            generation = self.generation,
            name = %target.meta().name,
            pending = target.is_pending(),
            "Chat target selected"
        );
        self.current = Some(target);
        self.generation
    }

    /// Drop the active target.
    pub fn clear(&mut self) -> u64 {
        self.generation += 1;
        self.current = None;
        self.generation
    }

    pub fn current(&self) -> Option<&Target> {
        self.current.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.current.is_some()
    }

    /// Adopt a chat id learned by work issued under `generation`.
    ///
    /// Ignored when the target has changed since, or already has a chat id.
    pub fn adopt_chat_id(&mut self, generation: u64, chat_id: ChatId) -> bool {
        if !self.is_current(generation) {
            debug!(generation, chat_id = %chat_id, "Ignoring chat id for stale target");
            return false;
        }
        let adopted = self
            .current
            .as_mut()
            .is_some_and(|target| target.adopt_chat_id(chat_id.clone()));
        if adopted {
            info!(chat_id = %chat_id, "Adopted server chat id");
        }
        adopted
    }
}
