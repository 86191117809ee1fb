//! Conversation data model: identifiers, messages, contacts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ids arrive from the server as JSON numbers or strings. They are held as
/// strings and written back as numbers when they look like one.
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// The id as a JSON number, when its decimal form is canonical.
            /// `"007"` and `"+12"` stay strings.
            fn as_number(&self) -> Option<i64> {
                self.0
                    .parse::<i64>()
                    .ok()
                    .filter(|n| n.to_string() == self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id.to_string())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self.as_number() {
                    Some(n) => serializer.serialize_i64(n),
                    None => serializer.serialize_str(&self.0),
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Ok(Self(RawId::deserialize(deserializer)?.into_string()))
            }
        }
    };
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Int(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

id_type!(
    /// A message identifier: temporary while a send is pending, server-assigned after.
    MessageId
);
id_type!(
    /// A durable, server-assigned conversation identifier.
    ChatId
);
id_type!(
    /// A user identity usable to address a chat before one exists.
    ContactId
);

/// The content of a message. Exactly one mode is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plain text.
    Text(String),
    /// A voice note with its display duration (e.g. `"0:45"`).
    Voice { duration: Option<String> },
    /// A file attachment.
    File { name: String, size: Option<u64> },
}

impl MessageBody {
    /// The text of a text message, or `""` for attachments.
    pub fn text(&self) -> &str {
        match self {
            MessageBody::Text(text) => text,
            MessageBody::Voice { .. } | MessageBody::File { .. } => "",
        }
    }

    /// A one-line summary, used for reply snapshots.
    pub fn preview(&self) -> String {
        match self {
            MessageBody::Text(text) => text.clone(),
            MessageBody::Voice { duration: Some(d) } => format!("Voice message ({d})"),
            MessageBody::Voice { duration: None } => "Voice message".to_string(),
            MessageBody::File { name, .. } => name.clone(),
        }
    }

    /// Whether there is nothing worth sending.
    pub fn is_blank(&self) -> bool {
        match self {
            MessageBody::Text(text) => text.trim().is_empty(),
            MessageBody::Voice { .. } => false,
            MessageBody::File { name, .. } => name.trim().is_empty(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, MessageBody::Text(_))
    }
}

/// Where a message stands relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Appended optimistically; the write has not resolved.
    Pending,
    /// Carries a server-assigned id.
    Confirmed,
    /// Exists only in this session (forwarded copies).
    LocalOnly,
}

/// A snapshot of the message being replied to, taken at compose time.
///
/// Holds copies, not a handle: the original may later be edited, deleted, or
/// scrolled out of the loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRef {
    pub id: MessageId,
    pub text: Option<String>,
    pub sender: Option<String>,
}

/// One emoji and how many times it was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
}

/// A single message in the local view of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub body: MessageBody,
    /// Local display time, `H:MM`.
    pub time: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Authored by the local user.
    pub is_own: bool,
    pub sender_name: Option<String>,
    pub is_edited: bool,
    pub is_forwarded: bool,
    pub forwarded_from: Option<String>,
    pub reply_to: Option<ReplyRef>,
    /// Session-local; in first-applied order.
    pub reactions: Vec<Reaction>,
    pub delivery: Delivery,
}

impl Message {
    /// A confirmed message with defaults for every optional attribute.
    pub fn new(id: impl Into<MessageId>, body: MessageBody, time: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body,
            time: time.into(),
            created_at: None,
            is_own: false,
            sender_name: None,
            is_edited: false,
            is_forwarded: false,
            forwarded_from: None,
            reply_to: None,
            reactions: Vec::new(),
            delivery: Delivery::Confirmed,
        }
    }

    pub fn text(&self) -> &str {
        self.body.text()
    }

    pub fn is_pending(&self) -> bool {
        self.delivery == Delivery::Pending
    }

    pub fn is_confirmed(&self) -> bool {
        self.delivery == Delivery::Confirmed
    }

    /// Who wrote this message, as shown next to replies and forwards.
    ///
    /// `counterpart` is the display name of the other side of the chat, used
    /// when the server did not name the sender.
    pub fn sender_label(&self, counterpart: &str) -> String {
        if self.is_own {
            "You".to_string()
        } else {
            self.sender_name
                .clone()
                .unwrap_or_else(|| counterpart.to_string())
        }
    }

    /// Build a reply snapshot pointing at this message.
    pub fn reply_ref(&self, counterpart: &str) -> ReplyRef {
        ReplyRef {
            id: self.id.clone(),
            text: Some(self.body.preview()),
            sender: Some(self.sender_label(counterpart)),
        }
    }

    /// Count one more use of `emoji`.
    pub fn add_reaction(&mut self, emoji: &str) {
        match self.reactions.iter_mut().find(|r| r.emoji == emoji) {
            Some(reaction) => reaction.count += 1,
            None => self.reactions.push(Reaction {
                emoji: emoji.to_string(),
                count: 1,
            }),
        }
    }
}

/// Someone the local user can chat with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub phone: String,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub is_online: bool,
}

impl Contact {
    pub fn new(id: impl Into<ContactId>, name: &str, phone: &str) -> Self {
        Self {
            id: id.into(),
            phone: phone.to_string(),
            name: name.to_string(),
            avatar: None,
            bio: None,
            is_online: false,
        }
    }
}
