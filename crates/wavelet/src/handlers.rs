//! Routing of inbound stanzas: IQ-response completion, the pairing
//! stanzas, authentication results, and fan-out of unsolicited stanzas as
//! typed events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use wavelet_codec::{Jid, Node};

use crate::events::Event;
use crate::pair::{self, PairingContext};
use crate::request::{iq_result_ack, Router};

/// Per-connection dispatch state. The reader task feeds decoded nodes in
/// receive order; pairing work runs inline so no other stanza interleaves
/// with the commit sequence.
pub(crate) struct HandlerContext {
    pub pairing: PairingContext,
    pub router: Arc<Router>,
    /// Set once `<success>` arrives; cleared per connection.
    pub authenticated: Arc<AtomicBool>,
    /// Set on authentication-fatal failures; halts the reconnect loop.
    pub auth_fatal: Arc<AtomicBool>,
}

impl HandlerContext {
    pub async fn dispatch(&self, node: Node) {
        match node.tag.as_str() {
            "iq" => self.handle_iq(node).await,
            "success" => self.handle_success().await,
            "failure" => self.handle_failure(&node),
            "stream:error" => self.handle_stream_error(&node).await,
            "message" => self.handle_message(node).await,
            "receipt" => self.handle_receipt(node).await,
            "presence" => self.handle_presence(&node),
            "chatstate" => self.handle_chatstate(&node),
            "notification" => self.handle_notification(node).await,
            "ack" => tracing::trace!(id = ?node.attr_string("id"), "ack"),
            "call" => self.handle_call(node).await,
            "ib" => self.handle_ib(&node),
            other => {
                tracing::debug!(tag = other, "Unhandled stanza");
            }
        }
    }

    async fn handle_iq(&self, node: Node) {
        if node.child("pair-device").is_some() {
            pair::handle_pair_device(&self.pairing, &node).await;
            return;
        }
        if node.child("pair-success").is_some() {
            pair::handle_pair_success(&self.pairing, &node).await;
            return;
        }
        // Server-side keepalive probe.
        if node.child("ping").is_some() {
            if let Err(e) = self.pairing.sender.send_node(iq_result_ack(&node)).await {
                tracing::debug!(error = %e, "Failed to answer server ping");
            }
            return;
        }

        let Some(id) = node.attr_string("id") else {
            tracing::debug!("iq without id");
            return;
        };
        if !self.router.complete(&id, node).await {
            tracing::debug!(id = %id, "Dropping duplicate or unsolicited iq response");
        }
    }

    async fn handle_success(&self) {
        self.authenticated.store(true, Ordering::SeqCst);
        tracing::info!("Authentication succeeded, session is live");
        // Flip the connection active so the server starts pushing offline
        // stanzas; failure here surfaces soon enough through the socket.
        let active = Node::new("iq")
            .attr("to", Jid::server_jid())
            .attr("id", self.router.next_id().await)
            .attr("xmlns", "passive")
            .attr("type", "set")
            .children(vec![Node::new("active")]);
        if let Err(e) = self.pairing.sender.send_node(active).await {
            tracing::warn!(error = %e, "Failed to send post-connect active flag");
        }
        self.pairing.events.emit(Event::Connected);
    }

    fn handle_failure(&self, node: &Node) {
        let reason = node.attr_u64("reason").unwrap_or(0);
        match reason {
            401 | 403 => {
                tracing::error!(reason, "Server rejected credentials at login");
                self.auth_fatal.store(true, Ordering::SeqCst);
                self.pairing.events.emit(Event::LoggedOut { on_connect: true });
            }
            405 => {
                tracing::error!("Client version rejected by the server");
                self.auth_fatal.store(true, Ordering::SeqCst);
                self.pairing.events.emit(Event::ClientOutdated);
            }
            other => {
                tracing::error!(reason = other, "Connect failure");
            }
        }
        self.pairing.connection.cancel();
    }

    async fn handle_stream_error(&self, node: &Node) {
        let code = node.attr_string("code").unwrap_or_default();
        match code.as_str() {
            // Restart required — normal after pairing; reconnect silently.
            "515" => {
                tracing::debug!("Stream restart requested");
                self.pairing.expect_disconnect.store(true, Ordering::SeqCst);
            }
            // Logged out from the primary device: the credentials are gone.
            "401" => {
                let removed = node
                    .child("conflict")
                    .and_then(|c| c.attr_string("type"))
                    .is_some_and(|t| t == "device_removed");
                tracing::error!(removed, "Stream error 401, logged out");
                self.auth_fatal.store(true, Ordering::SeqCst);
                if removed {
                    if let Err(e) = self.pairing.store.delete_store().await {
                        tracing::error!(error = %e, "Failed to wipe store after device removal");
                    }
                }
                self.pairing.events.emit(Event::LoggedOut { on_connect: false });
            }
            other => {
                tracing::error!(code = other, "Unknown stream error");
                self.pairing
                    .events
                    .emit(Event::StreamError { code: other.to_owned() });
            }
        }
        self.pairing.connection.cancel();
    }

    async fn handle_message(&self, node: Node) {
        let Some(from) = node.attr_jid("from") else {
            tracing::debug!("message without sender");
            return;
        };
        let id = node.attr_string("id").unwrap_or_default();
        let timestamp = node.attr_u64("t").unwrap_or(0);

        // Delivery receipt first so the server stops redelivering even if a
        // subscriber stalls.
        let receipt = Node::new("receipt")
            .attr("to", from.clone())
            .attr("id", id.clone());
        if let Err(e) = self.pairing.sender.send_node(receipt).await {
            tracing::debug!(error = %e, "Failed to send delivery receipt");
        }

        self.pairing.events.emit(Event::Message { from, id, timestamp, stanza: node });
    }

    async fn handle_receipt(&self, node: Node) {
        let Some(from) = node.attr_jid("from") else { return };
        let mut ids: Vec<String> = node.attr_string("id").into_iter().collect();
        if let Some(list) = node.child("list") {
            ids.extend(list.children_by_tag("item").filter_map(|i| i.attr_string("id")));
        }
        let receipt_type = node
            .attr_string("type")
            .unwrap_or_else(|| "delivery".to_owned());

        self.send_ack(&node).await;
        self.pairing
            .events
            .emit(Event::Receipt { from, ids, receipt_type });
    }

    fn handle_presence(&self, node: &Node) {
        let Some(from) = node.attr_jid("from") else { return };
        let unavailable = node.attr_string("type").as_deref() == Some("unavailable");
        self.pairing.events.emit(Event::Presence { from, unavailable });
    }

    fn handle_chatstate(&self, node: &Node) {
        let Some(from) = node.attr_jid("from") else { return };
        let composing = node.child("composing").is_some();
        self.pairing.events.emit(Event::ChatState { from, composing });
    }

    async fn handle_notification(&self, node: Node) {
        self.send_ack(&node).await;
        self.pairing.events.emit(Event::Notification(node));
    }

    async fn handle_call(&self, node: Node) {
        let Some(from) = node.attr_jid("from") else { return };
        if let Some(offer) = node.child("offer") {
            let call_id = offer.attr_string("call-id").unwrap_or_default();
            self.send_ack(&node).await;
            self.pairing.events.emit(Event::CallOffer { from, call_id });
        }
    }

    fn handle_ib(&self, node: &Node) {
        for child in node.child_nodes() {
            match child.tag.as_str() {
                "dirty" => tracing::debug!(
                    kind = ?child.attr_string("type"),
                    "Server marked state dirty"
                ),
                "offline" => tracing::debug!(
                    count = ?child.attr_u64("count"),
                    "Offline stanza preview"
                ),
                other => tracing::trace!(tag = other, "ib child"),
            }
        }
    }

    /// `<ack class=… id=… to=…/>` confirming a delivered stanza.
    async fn send_ack(&self, node: &Node) {
        let Some(id) = node.attr_string("id") else { return };
        let Some(from) = node.attr_jid("from") else { return };
        let mut ack = Node::new("ack")
            .attr("class", node.tag.clone())
            .attr("id", id)
            .attr("to", from);
        if let Some(participant) = node.attr_jid("participant") {
            ack = ack.attr("participant", participant);
        }
        if let Err(e) = self.pairing.sender.send_node(ack).await {
            tracing::debug!(error = %e, "Failed to ack stanza");
        }
    }
}
