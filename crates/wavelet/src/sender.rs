//! Handle for queueing outbound stanzas to the connection's writer task.
//!
//! Handlers hold this instead of the client itself, which breaks the
//! handler ↔ session reference cycle: when the supervisor shuts the writer
//! task down the channel closes and every held handle starts failing with
//! `Disconnected`.

use tokio::sync::mpsc;

use wavelet_codec::Node;

use crate::error::{ClientError, Result};

/// Outbound queue depth; sends backpressure writers instead of buffering
/// without bound.
const SEND_QUEUE_DEPTH: usize = 32;

#[derive(Clone, Debug)]
pub(crate) struct StanzaSender {
    tx: mpsc::Sender<Node>,
}

impl StanzaSender {
    pub fn channel() -> (Self, mpsc::Receiver<Node>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        (Self { tx }, rx)
    }

    /// Queue one stanza for encryption and framing.
    pub async fn send_node(&self, node: Node) -> Result<()> {
        tracing::trace!(tag = %node.tag, "queue outbound stanza");
        self.tx
            .send(node)
            .await
            .map_err(|_| ClientError::Disconnected)
    }
}
