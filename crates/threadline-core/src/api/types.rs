//! Wire types for the backend's JSON API.
//!
//! The backend is loose about types: ids may be numbers or strings, flags may
//! be `null`, durations and sizes may arrive as numbers or strings. The
//! deserializers here accept all of those.

use serde::{Deserialize, Deserializer, Serialize};

use crate::identity::Identity;
use crate::model::{ChatId, Contact, ContactId, MessageBody, MessageId};
use crate::target::Address;

/// `GET messages` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Present when the server resolved (or created) the chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

/// A message record as stored on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Blank when the record's id is missing or unusable; such records are
    /// dropped during normalization.
    #[serde(default, deserialize_with = "lenient_message_id")]
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<ContactId>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_own: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_voice: bool,
    #[serde(
        default,
        deserialize_with = "lenient_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub voice_duration: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_size: Option<u64>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_edited: bool,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_forwarded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
}

impl RawMessage {
    /// A text record with no other attributes.
    pub fn text(id: impl Into<MessageId>, text: &str) -> Self {
        Self {
            id: id.into(),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn own(mut self) -> Self {
        self.is_own = true;
        self
    }

    pub fn at(mut self, created_at: &str) -> Self {
        self.created_at = Some(created_at.to_string());
        self
    }

    pub fn from_sender(mut self, name: &str) -> Self {
        self.sender_name = Some(name.to_string());
        self
    }

    pub fn replying_to(mut self, id: impl Into<MessageId>) -> Self {
        self.reply_to_id = Some(id.into());
        self
    }

    /// The content mode. Voice wins over file, file over text.
    pub fn body(&self) -> MessageBody {
        if self.is_voice {
            MessageBody::Voice {
                duration: self.voice_duration.clone(),
            }
        } else if self.is_file {
            MessageBody::File {
                name: self.file_name.clone().unwrap_or_default(),
                size: self.file_size,
            }
        } else {
            MessageBody::Text(self.text.clone().unwrap_or_default())
        }
    }
}

/// `POST messages` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<ContactId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_voice: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_duration: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl SendRequest {
    /// Build the write for `body`, addressed by exactly one of chat id or contact id.
    pub fn new(address: &Address, body: &MessageBody, reply_to_id: Option<MessageId>) -> Self {
        let mut request = Self {
            reply_to_id,
            ..Default::default()
        };
        match address {
            Address::Chat(id) => request.chat_id = Some(id.clone()),
            Address::Contact(id) => request.contact_id = Some(id.clone()),
        }
        match body {
            MessageBody::Text(text) => request.text = text.trim().to_string(),
            MessageBody::Voice { duration } => {
                request.is_voice = true;
                request.voice_duration = duration.clone();
            }
            MessageBody::File { name, size } => {
                request.is_file = true;
                request.file_name = Some(name.clone());
                request.file_size = *size;
            }
        }
        request
    }

    /// How this request is addressed; chat id first.
    pub fn address(&self) -> Option<Address> {
        match (&self.chat_id, &self.contact_id) {
            (Some(chat_id), _) => Some(Address::Chat(chat_id.clone())),
            (None, Some(contact_id)) => Some(Address::Contact(contact_id.clone())),
            (None, None) => None,
        }
    }
}

/// `POST messages` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// `PUT messages` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub message_id: MessageId,
    pub text: String,
}

/// A user record from the contacts or users endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub id: ContactId,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, alias = "is_online", deserialize_with = "null_as_false")]
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<String>,
}

impl From<ContactRecord> for Contact {
    fn from(record: ContactRecord) -> Self {
        Contact {
            id: record.id,
            phone: record.phone.unwrap_or_default(),
            name: record.name.unwrap_or_default(),
            avatar: record.avatar,
            bio: record.bio,
            is_online: record.is_online,
        }
    }
}

impl From<&Contact> for ContactRecord {
    fn from(contact: &Contact) -> Self {
        ContactRecord {
            id: contact.id.clone(),
            phone: Some(contact.phone.clone()),
            name: Some(contact.name.clone()),
            avatar: contact.avatar.clone(),
            bio: contact.bio.clone(),
            is_online: contact.is_online,
            added_at: None,
        }
    }
}

/// `GET contacts` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactList {
    #[serde(default)]
    pub contacts: Vec<ContactRecord>,
}

/// `GET users?query=` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserList {
    #[serde(default)]
    pub users: Vec<ContactRecord>,
}

/// `POST contacts` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContactRequest {
    pub contact_id: ContactId,
}

/// `POST auth` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub name: String,
}

/// `POST auth` response: the signed-in user.
pub type LoginResponse = ContactRecord;

impl From<LoginResponse> for Identity {
    fn from(user: LoginResponse) -> Self {
        Identity {
            user_id: user.id.to_string(),
            phone: user.phone,
            name: user.name,
        }
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// Voice durations are display strings (`"0:45"`); bare seconds are formatted.
fn lenient_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(
        match Option::<NumberOrText>::deserialize(deserializer)? {
            Some(NumberOrText::Text(text)) => Some(text),
            Some(NumberOrText::Number(secs)) if secs >= 0.0 => {
                let secs = secs.round() as u64;
                Some(format!("{}:{:02}", secs / 60, secs % 60))
            }
            Some(NumberOrText::Number(_)) | None => None,
        },
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientId {
    Int(i64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

/// Numbers and strings are ids; `null`, floats and anything else read as blank.
fn lenient_message_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MessageId, D::Error> {
    Ok(match Option::<LenientId>::deserialize(deserializer)? {
        Some(LenientId::Int(n)) => MessageId::from(n),
        Some(LenientId::Text(text)) => MessageId::from(text),
        Some(LenientId::Other(_)) | None => MessageId::default(),
    })
}

fn lenient_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(
        match Option::<NumberOrText>::deserialize(deserializer)? {
            Some(NumberOrText::Number(n)) if n >= 0.0 => Some(n as u64),
            Some(NumberOrText::Text(text)) => text.trim().parse().ok(),
            Some(NumberOrText::Number(_)) | None => None,
        },
    )
}
