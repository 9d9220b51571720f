use uuid::Uuid;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{Message, NewMessage};
use crate::pair::PairKey;
use crate::store::DiscoveryStore;

fn clean_text(text: &str, max_len: usize) -> DiscoveryResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DiscoveryError::Validation("message text must not be empty".into()));
    }
    if trimmed.chars().count() > max_len {
        return Err(DiscoveryError::Validation(format!(
            "message text must be at most {max_len} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn ensure_matched<S: DiscoveryStore>(store: &S, user_id: Uuid, partner_id: Uuid) -> DiscoveryResult<()> {
    if user_id == partner_id || store.find_match(PairKey::new(user_id, partner_id))?.is_none() {
        return Err(DiscoveryError::NotMatched);
    }
    Ok(())
}

/// A message the caller sent and has not deleted.
fn own_message<S: DiscoveryStore>(store: &S, user_id: Uuid, message_id: Uuid) -> DiscoveryResult<Message> {
    match store.find_message(message_id)? {
        Some(message) if message.sender_id == user_id && !message.deleted => Ok(message),
        _ => Err(DiscoveryError::MessageNotFound),
    }
}

pub fn send_message<S: DiscoveryStore>(
    store: &S,
    sender_id: Uuid,
    recipient_id: Uuid,
    text: &str,
    max_len: usize,
) -> DiscoveryResult<Message> {
    let text = clean_text(text, max_len)?;
    ensure_matched(store, sender_id, recipient_id)?;

    let message = store.insert_message(&NewMessage { sender_id, recipient_id, text })?;
    tracing::debug!(message_id = %message.id, sender_id = %sender_id, "message sent");
    Ok(message)
}

/// Conversation between the caller and `partner_id`, oldest first.
pub fn list_messages<S: DiscoveryStore>(store: &S, user_id: Uuid, partner_id: Uuid) -> DiscoveryResult<Vec<Message>> {
    ensure_matched(store, user_id, partner_id)?;
    Ok(store.messages_between(user_id, partner_id)?)
}

pub fn edit_message<S: DiscoveryStore>(
    store: &S,
    user_id: Uuid,
    message_id: Uuid,
    text: &str,
    max_len: usize,
) -> DiscoveryResult<Message> {
    let text = clean_text(text, max_len)?;
    own_message(store, user_id, message_id)?;

    store
        .edit_message(message_id, &text)?
        .ok_or(DiscoveryError::MessageNotFound)
}

/// Soft delete. Deleting an already-deleted message of your own succeeds.
pub fn delete_message<S: DiscoveryStore>(store: &S, user_id: Uuid, message_id: Uuid) -> DiscoveryResult<()> {
    match store.find_message(message_id)? {
        Some(message) if message.sender_id == user_id => {
            if store.soft_delete_message(message_id)? {
                tracing::debug!(message_id = %message_id, "message deleted");
            }
            Ok(())
        }
        _ => Err(DiscoveryError::MessageNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;
    use crate::services::discovery::{like, unmatch};
    use crate::store::MemoryStore;

    const MAX: usize = 20;

    fn matched_pair() -> (MemoryStore, Uuid, Uuid) {
        let store = MemoryStore::new();
        let a = store.seed_user("a", Some(30), GeoPoint::new(0.0, 0.0)).id;
        let b = store.seed_user("b", Some(30), GeoPoint::new(0.0, 0.0)).id;
        like(&store, a, b).unwrap();
        like(&store, b, a).unwrap();
        (store, a, b)
    }

    #[test]
    fn send_trims_and_lists_both_directions() {
        let (store, a, b) = matched_pair();

        let first = send_message(&store, a, b, "  hello  ", MAX).unwrap();
        assert_eq!(first.text, "hello");
        send_message(&store, b, a, "hi back", MAX).unwrap();

        let thread: Vec<String> = list_messages(&store, b, a).unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(thread, vec!["hello", "hi back"]);
    }

    #[test]
    fn send_validates_text() {
        let (store, a, b) = matched_pair();
        assert!(matches!(send_message(&store, a, b, "   ", MAX), Err(DiscoveryError::Validation(_))));
        let long = "x".repeat(MAX + 1);
        assert!(matches!(send_message(&store, a, b, &long, MAX), Err(DiscoveryError::Validation(_))));
        assert!(send_message(&store, a, b, &"é".repeat(MAX), MAX).is_ok());
    }

    #[test]
    fn messaging_requires_a_live_match() {
        let (store, a, b) = matched_pair();
        unmatch(&store, a, b).unwrap();

        assert!(matches!(send_message(&store, a, b, "still there?", MAX), Err(DiscoveryError::NotMatched)));
        assert!(matches!(list_messages(&store, a, b), Err(DiscoveryError::NotMatched)));
        assert!(matches!(send_message(&store, a, a, "me", MAX), Err(DiscoveryError::NotMatched)));
    }

    #[test]
    fn only_the_sender_can_edit() {
        let (store, a, b) = matched_pair();
        let sent = send_message(&store, a, b, "helo", MAX).unwrap();

        assert!(matches!(edit_message(&store, b, sent.id, "hijack", MAX), Err(DiscoveryError::MessageNotFound)));

        let edited = edit_message(&store, a, sent.id, "hello", MAX).unwrap();
        assert_eq!(edited.text, "hello");
        assert!(edited.edited_at.is_some());
    }

    #[test]
    fn delete_is_soft_and_idempotent() {
        let (store, a, b) = matched_pair();
        let sent = send_message(&store, a, b, "oops", MAX).unwrap();

        assert!(matches!(delete_message(&store, b, sent.id), Err(DiscoveryError::MessageNotFound)));
        delete_message(&store, a, sent.id).unwrap();
        delete_message(&store, a, sent.id).unwrap();

        assert!(list_messages(&store, a, b).unwrap().is_empty());
        assert!(store.find_message(sent.id).unwrap().is_some_and(|m| m.deleted));
        assert!(matches!(edit_message(&store, a, sent.id, "undo", MAX), Err(DiscoveryError::MessageNotFound)));
    }
}
