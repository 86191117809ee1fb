#![deny(unsafe_code)]

//! Threadline chat session engine.
//!
//! Resolves chat targets, keeps a local view of a conversation in sync with
//! the remote message store, and sends messages optimistically: a message
//! shows up in the list as soon as it is sent, then either takes its
//! server-assigned id or is removed if the write fails.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future, the return type for async trait
/// methods that need dynamic dispatch (`Arc<dyn MessageStore>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote collaborators and their HTTP client.
pub mod api;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Display times and temporary ids.
pub mod clock;
/// The local user.
pub mod identity;
/// Messages, ids, contacts.
pub mod model;
/// The session controller.
pub mod session;
/// Chat target resolution.
pub mod target;
/// The message list reducer.
pub mod thread;

pub use api::{ApiClient, ApiError, ContactDirectory, MessageStore};
pub use identity::Identity;
pub use model::{ChatId, Contact, ContactId, Delivery, Message, MessageBody, MessageId};
pub use session::{
    ChatSession, LoadOutcome, SendOutcome, SessionError, SessionEvent, SessionSnapshot, Submitted,
    WriteOutcome,
};
pub use target::{Address, ChatResolver, DisplayMeta, Target, TargetIntent};
