//! Remote collaborators: the message store, the contact directory, and auth.
//!
//! The session talks to the backend only through [`MessageStore`] and
//! [`ContactDirectory`]. [`ApiClient`] implements both over HTTP; tests swap
//! in an in-memory backend.

pub mod http;
pub mod types;

pub use http::ApiClient;
pub use types::*;

use crate::BoxFuture;
use crate::model::{Contact, ContactId, MessageId};
use crate::target::Address;

/// Errors from remote calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("unauthorized (missing or unknown user id)")]
    Unauthorized,

    #[error("server error: {status} {message}")]
    Server { status: u16, message: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Reads and writes messages. Every call is made on behalf of `user_id`.
pub trait MessageStore: Send + Sync {
    /// Load a conversation page, addressed by chat id or contact id.
    fn fetch_messages(
        &self,
        user_id: String,
        address: Address,
    ) -> BoxFuture<'_, Result<MessagePage, ApiError>>;

    /// Create a message. The receipt carries the durable id.
    fn send_message(
        &self,
        user_id: String,
        request: SendRequest,
    ) -> BoxFuture<'_, Result<SendReceipt, ApiError>>;

    /// Replace the text of an existing message.
    fn edit_message(
        &self,
        user_id: String,
        request: EditRequest,
    ) -> BoxFuture<'_, Result<(), ApiError>>;

    fn delete_message(
        &self,
        user_id: String,
        message_id: MessageId,
    ) -> BoxFuture<'_, Result<(), ApiError>>;
}

/// The user's contact list and user search.
pub trait ContactDirectory: Send + Sync {
    fn list_contacts(&self, user_id: String) -> BoxFuture<'_, Result<Vec<Contact>, ApiError>>;

    fn add_contact(
        &self,
        user_id: String,
        contact_id: ContactId,
    ) -> BoxFuture<'_, Result<(), ApiError>>;

    /// Find users by name or phone. `user_id` is sent when known so the
    /// caller is left out of the results.
    fn search_users(
        &self,
        user_id: Option<String>,
        query: String,
    ) -> BoxFuture<'_, Result<Vec<Contact>, ApiError>>;
}
