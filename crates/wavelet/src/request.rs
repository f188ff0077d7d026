//! Request/response correlation: outbound IQ ids, pending-response slots,
//! and the stanza shapes for results and error replies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{oneshot, Mutex};

use wavelet_codec::{Jid, Node, NodeContent};

use crate::error::{ClientError, IqError, Result};

/// Correlates outbound request ids with their response slots. One instance
/// per client; the id suffix is re-randomized per connection.
pub(crate) struct Router {
    counter: AtomicU64,
    suffix: Mutex<String>,
    pending: Mutex<HashMap<String, oneshot::Sender<Node>>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
            suffix: Mutex::new(random_suffix()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// A fresh request id: monotonic counter plus the connection's random
    /// suffix. Unique over any finite run.
    pub async fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{n}-{}", self.suffix.lock().await)
    }

    /// Re-randomize the id suffix (called per connection).
    pub async fn reset_suffix(&self) {
        *self.suffix.lock().await = random_suffix();
    }

    /// Insert a response slot for `id`.
    pub async fn register(&self, id: String) -> oneshot::Receiver<Node> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        rx
    }

    /// Complete the slot for `id` with the response node. Returns false
    /// when no slot exists (unsolicited or duplicate response).
    pub async fn complete(&self, id: &str, node: Node) -> bool {
        let Some(slot) = self.pending.lock().await.remove(id) else {
            return false;
        };
        // A dropped receiver means the caller was canceled; nothing to do.
        let _ = slot.send(node);
        true
    }

    /// Remove the slot for `id` without completing it (cancellation path).
    pub async fn remove(&self, id: &str) {
        self.pending.lock().await.remove(id);
    }

    /// Drop every pending slot; their awaiters observe `Disconnected`.
    pub async fn fail_all(&self) {
        let drained = std::mem::take(&mut *self.pending.lock().await);
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Failing pending requests on disconnect");
        }
    }

    #[cfg(test)]
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..4)
        .map(|_| {
            let alphabet = b"abcdefghijklmnopqrstuvwxyz0123456789";
            alphabet[rng.random_range(0..alphabet.len())] as char
        })
        .collect()
}

// ─── IQ stanza shapes ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqType {
    Get,
    Set,
}

impl IqType {
    fn as_str(self) -> &'static str {
        match self {
            IqType::Get => "get",
            IqType::Set => "set",
        }
    }
}

/// An outbound request before id assignment.
#[derive(Debug)]
pub struct InfoQuery {
    pub namespace: &'static str,
    pub query_type: IqType,
    pub to: Jid,
    pub content: Option<NodeContent>,
    /// Override for the default request deadline.
    pub timeout: Option<Duration>,
}

impl InfoQuery {
    pub(crate) fn into_node(self, id: String) -> Node {
        let mut node = Node::new("iq")
            .attr("id", id)
            .attr("xmlns", self.namespace)
            .attr("type", self.query_type.as_str())
            .attr("to", self.to);
        node.content = self.content;
        node
    }
}

/// Empty `<iq type="result"/>` acknowledging a server-initiated stanza.
pub(crate) fn iq_result_ack(request: &Node) -> Node {
    let to = request
        .attr_jid("from")
        .unwrap_or_else(Jid::server_jid);
    let id = request.attr_string("id").unwrap_or_default();
    Node::new("iq").attr("to", to).attr("id", id).attr("type", "result")
}

/// `<iq type="error"><error code text/></iq>` rejecting a server-initiated
/// stanza.
pub(crate) fn iq_error_reply(request: &Node, code: u16, text: &str) -> Node {
    let id = request.attr_string("id").unwrap_or_default();
    Node::new("iq")
        .attr("to", Jid::server_jid())
        .attr("id", id)
        .attr("type", "error")
        .children(vec![Node::new("error")
            .attr("code", i64::from(code))
            .attr("text", text)])
}

/// Map a completed IQ response to the caller's result: the node itself on
/// `type="result"`, an [`IqError`] on `type="error"`.
pub(crate) fn parse_iq_response(node: Node) -> Result<Node> {
    match node.attr_string("type").as_deref() {
        Some("error") => {
            let error = node.child("error");
            let code = error
                .and_then(|e| e.attr_u64("code"))
                .unwrap_or(500) as u16;
            let text = error
                .and_then(|e| e.attr_string("text"))
                .unwrap_or_default();
            Err(ClientError::Iq(IqError { code, text }))
        }
        _ => Ok(node),
    }
}
