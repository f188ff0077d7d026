//! One-time pre-key upload and server-side count maintenance.
//!
//! The server hands a pre-key bundle to each peer that opens a session with
//! us; the client's job is to keep the server stocked. Key material lives
//! in the store's pre-key ring; this module only shapes the stanzas.

use wavelet_codec::{Jid, Node, NodeContent};
use wavelet_store::keys::DJB_KEY_TYPE;
use wavelet_store::repository::prekeys::{self, PreKey, WANTED_PREKEY_COUNT};
use wavelet_store::DeviceData;

use crate::client::Client;
use crate::error::Result;
use crate::request::{InfoQuery, IqType};

impl Client {
    /// Ask the server how many of our one-time pre-keys it still holds.
    pub async fn server_prekey_count(&self) -> Result<usize> {
        let response = self
            .send_iq(InfoQuery {
                namespace: "encrypt",
                query_type: IqType::Get,
                to: Jid::server_jid(),
                content: Some(NodeContent::Nodes(vec![Node::new("count")])),
                timeout: None,
            })
            .await?;
        Ok(response
            .child("count")
            .and_then(|c| c.attr_u64("value"))
            .unwrap_or(0) as usize)
    }

    /// Top the server up when its stock runs low: mint fresh pre-keys,
    /// upload them with the identity and signed pre-key, and mark them
    /// uploaded once the server acknowledges.
    pub async fn upload_prekeys(&self) -> Result<usize> {
        let on_server = self.server_prekey_count().await?;
        if on_server >= WANTED_PREKEY_COUNT / 2 {
            tracing::debug!(on_server, "Pre-key stock sufficient");
            return Ok(0);
        }

        let pool = self.inner.store.pool();
        let mut batch = prekeys::get_unuploaded_prekeys(pool, WANTED_PREKEY_COUNT).await?;
        let missing = WANTED_PREKEY_COUNT.saturating_sub(batch.len());
        if missing > 0 {
            batch.extend(prekeys::generate_prekeys(pool, missing).await?);
        }
        let highest_id = batch.last().map_or(0, |k| k.id);

        let content = {
            let device = self.inner.device.read().await;
            upload_content(&device, &batch)
        };
        self.send_iq(InfoQuery {
            namespace: "encrypt",
            query_type: IqType::Set,
            to: Jid::server_jid(),
            content: Some(content),
            timeout: None,
        })
        .await?;

        prekeys::mark_prekeys_uploaded(pool, highest_id).await?;
        tracing::info!(count = batch.len(), "Uploaded one-time pre-keys");
        Ok(batch.len())
    }
}

/// The `<iq xmlns="encrypt" type="set">` body: registration id, key type,
/// identity key, the one-time key list, and the signed pre-key.
pub(crate) fn upload_content(device: &DeviceData, batch: &[PreKey]) -> NodeContent {
    let keys = batch.iter().map(prekey_node).collect();
    NodeContent::Nodes(vec![
        Node::new("registration").bytes(device.registration_id.to_be_bytes().to_vec()),
        Node::new("type").bytes(vec![DJB_KEY_TYPE]),
        Node::new("identity").bytes(device.identity_key.public_bytes().to_vec()),
        Node::new("list").children(keys),
        signed_prekey_node(device),
    ])
}

/// `<key><id>…</id><value>…</value></key>` with a 3-byte big-endian id.
fn prekey_node(key: &PreKey) -> Node {
    Node::new("key").children(vec![
        Node::new("id").bytes(key.id.to_be_bytes()[1..].to_vec()),
        Node::new("value").bytes(key.key_pair.public_bytes().to_vec()),
    ])
}

fn signed_prekey_node(device: &DeviceData) -> Node {
    let spk = &device.signed_pre_key;
    Node::new("skey").children(vec![
        Node::new("id").bytes(spk.id.to_be_bytes()[1..].to_vec()),
        Node::new("value").bytes(spk.key_pair.public_bytes().to_vec()),
        Node::new("signature").bytes(spk.signature.to_vec()),
    ])
}
