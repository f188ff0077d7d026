//! Presence, chat-state, and read-receipt sending.

use std::time::{SystemTime, UNIX_EPOCH};

use wavelet_codec::{Jid, Node};

use crate::client::Client;
use crate::error::Result;

/// Our own availability as shown to other users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Available,
    Unavailable,
}

/// Typing indicator state for a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Composing,
    Paused,
}

impl Client {
    /// Broadcast our availability. The push name travels with the first
    /// available presence so other devices can render it.
    pub async fn send_presence(&self, presence: Presence) -> Result<()> {
        let push_name = self.inner.device.read().await.push_name.clone();
        self.send_node(presence_stanza(presence, &push_name)).await
    }

    /// Send a typing indicator to a chat.
    pub async fn send_chat_state(&self, to: Jid, state: ChatState) -> Result<()> {
        self.send_node(chat_state_stanza(to, state)).await
    }

    /// Mark messages in a chat as read. `message_ids` must be non-empty;
    /// the first id rides the receipt attributes, the rest go in the list.
    pub async fn mark_read(&self, chat: Jid, message_ids: &[String]) -> Result<()> {
        let Some(node) = read_receipt_stanza(chat, message_ids, unix_now()) else {
            return Ok(());
        };
        self.send_node(node).await
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) fn presence_stanza(presence: Presence, push_name: &str) -> Node {
    let mut node = Node::new("presence");
    match presence {
        Presence::Available => {
            node = node.attr("type", "available");
            if !push_name.is_empty() {
                node = node.attr("name", push_name);
            }
        }
        Presence::Unavailable => {
            node = node.attr("type", "unavailable");
        }
    }
    node
}

pub(crate) fn chat_state_stanza(to: Jid, state: ChatState) -> Node {
    let child = match state {
        ChatState::Composing => "composing",
        ChatState::Paused => "paused",
    };
    Node::new("chatstate")
        .attr("to", to)
        .children(vec![Node::new(child)])
}

/// `None` when there is nothing to acknowledge.
pub(crate) fn read_receipt_stanza(chat: Jid, message_ids: &[String], now: u64) -> Option<Node> {
    let (first, rest) = message_ids.split_first()?;
    let mut receipt = Node::new("receipt")
        .attr("to", chat)
        .attr("type", "read")
        .attr("id", first.clone())
        .attr("t", now as i64);
    if !rest.is_empty() {
        let items = rest
            .iter()
            .map(|id| Node::new("item").attr("id", id.clone()))
            .collect();
        receipt = receipt.children(vec![Node::new("list").children(items)]);
    }
    Some(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_presence_carries_push_name() {
        let node = presence_stanza(Presence::Available, "Ada");
        assert_eq!(node.attr_string("type").as_deref(), Some("available"));
        assert_eq!(node.attr_string("name").as_deref(), Some("Ada"));

        let anonymous = presence_stanza(Presence::Available, "");
        assert!(anonymous.get_attr("name").is_none());

        let gone = presence_stanza(Presence::Unavailable, "Ada");
        assert_eq!(gone.attr_string("type").as_deref(), Some("unavailable"));
        assert!(gone.get_attr("name").is_none());
    }

    #[test]
    fn chat_state_wraps_the_indicator_child() {
        let chat = Jid::new("15551234567", "s.whatsapp.net");
        let node = chat_state_stanza(chat.clone(), ChatState::Composing);
        assert_eq!(node.attr_jid("to"), Some(chat));
        assert!(node.child("composing").is_some());

        let paused = chat_state_stanza(Jid::server_jid(), ChatState::Paused);
        assert!(paused.child("paused").is_some());
    }

    #[test]
    fn read_receipt_splits_first_id_from_the_list() {
        let chat = Jid::new("g1", "g.us");
        let ids = vec!["A1".to_owned(), "A2".to_owned(), "A3".to_owned()];
        let node = read_receipt_stanza(chat, &ids, 1_700_000_000).unwrap();

        assert_eq!(node.attr_string("id").as_deref(), Some("A1"));
        assert_eq!(node.attr_string("type").as_deref(), Some("read"));
        assert_eq!(node.attr_u64("t"), Some(1_700_000_000));
        let list = node.child("list").unwrap();
        let item_ids: Vec<_> = list
            .children_by_tag("item")
            .filter_map(|i| i.attr_string("id"))
            .collect();
        assert_eq!(item_ids, vec!["A2", "A3"]);

        // A single id needs no list at all.
        let single = read_receipt_stanza(Jid::server_jid(), &ids[..1], 0).unwrap();
        assert!(single.content.is_none());

        assert!(read_receipt_stanza(Jid::server_jid(), &[], 0).is_none());
    }
}
