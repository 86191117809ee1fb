//! The local message list and its reducer.
//!
//! Every change to the list is a [`ListAction`] applied by [`reduce`], a pure
//! function of the previous list. The session applies it under one lock so
//! completions that land close together never overwrite each other.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::api::RawMessage;
use crate::clock::{local_display_time, parse_timestamp};
use crate::model::{Delivery, Message, MessageBody, MessageId, ReplyRef};

/// A single change to the message list.
#[derive(Debug, Clone, PartialEq)]
pub enum ListAction {
    /// Drop everything and show this page instead.
    Replace(Vec<Message>),
    /// Add a message at the end.
    Append(Message),
    /// Swap a pending message's temporary id for its durable one, in place.
    Confirm {
        temp_id: MessageId,
        id: MessageId,
        created_at: Option<DateTime<Utc>>,
    },
    /// Remove a pending message whose send failed.
    Rollback { temp_id: MessageId },
    /// Replace the text of a confirmed message and mark it edited.
    Edit { id: MessageId, text: String },
    /// Remove a message the server has deleted.
    Remove { id: MessageId },
    /// Count one more use of an emoji on a message.
    React { id: MessageId, emoji: String },
}

/// Apply `action` to `list`, returning the next list.
///
/// Actions that name a message not in the list (or not in the required
/// delivery state) leave the list unchanged.
pub fn reduce(list: &[Message], action: ListAction) -> Vec<Message> {
    match action {
        ListAction::Replace(messages) => messages,
        ListAction::Append(message) => {
            let mut next = list.to_vec();
            next.push(message);
            next
        }
        ListAction::Confirm {
            temp_id,
            id,
            created_at,
        } => list
            .iter()
            .cloned()
            .map(|mut msg| {
                if msg.id == temp_id && msg.is_pending() {
                    msg.id = id.clone();
                    msg.delivery = Delivery::Confirmed;
                    if created_at.is_some() {
                        msg.created_at = created_at;
                    }
                }
                msg
            })
            .collect(),
        ListAction::Rollback { temp_id } => list
            .iter()
            .filter(|msg| !(msg.id == temp_id && msg.is_pending()))
            .cloned()
            .collect(),
        ListAction::Edit { id, text } => list
            .iter()
            .cloned()
            .map(|mut msg| {
                if msg.id == id && msg.is_confirmed() && msg.body.is_text() {
                    msg.body = MessageBody::Text(text.clone());
                    msg.is_edited = true;
                }
                msg
            })
            .collect(),
        ListAction::Remove { id } => list
            .iter()
            .filter(|msg| !(msg.id == id && msg.is_confirmed()))
            .cloned()
            .collect(),
        ListAction::React { id, emoji } => list
            .iter()
            .cloned()
            .map(|mut msg| {
                if msg.id == id {
                    msg.add_reaction(&emoji);
                }
                msg
            })
            .collect(),
    }
}

/// Find a message by id.
pub fn find<'a>(list: &'a [Message], id: &MessageId) -> Option<&'a Message> {
    list.iter().find(|msg| &msg.id == id)
}

/// Normalize a server page into local messages.
///
/// Server order is kept. Records without an id, and repeats of an id already
/// seen, are dropped. `replyToId` is resolved against earlier records of the
/// same page; a reply to something outside the page keeps only the id.
/// `counterpart` labels messages whose sender the server did not name.
pub fn from_records(records: Vec<RawMessage>, counterpart: &str) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut messages: Vec<Message> = Vec::with_capacity(records.len());

    for raw in records {
        if raw.id.is_empty() || !seen.insert(raw.id.clone()) {
            debug!(id = %raw.id, "Dropping record without a unique id");
            continue;
        }

        let reply_to = raw.reply_to_id.as_ref().map(|reply_id| {
            find(&messages, reply_id)
                .map(|target| target.reply_ref(counterpart))
                .unwrap_or_else(|| ReplyRef {
                    id: reply_id.clone(),
                    text: None,
                    sender: None,
                })
        });

        let created_at = raw.created_at.as_deref().and_then(parse_timestamp);
        let mut msg = Message::new(
            raw.id.clone(),
            raw.body(),
            created_at.map(local_display_time).unwrap_or_default(),
        );
        msg.created_at = created_at;
        msg.is_own = raw.is_own;
        msg.sender_name = raw.sender_name;
        msg.is_edited = raw.is_edited;
        msg.is_forwarded = raw.is_forwarded;
        msg.forwarded_from = raw.forwarded_from;
        msg.reply_to = reply_to;
        messages.push(msg);
    }

    messages
}
