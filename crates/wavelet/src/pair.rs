//! QR device pairing and identity signing.
//!
//! Two server-initiated stanzas drive enrollment: `pair-device` advertises
//! rotating QR refs, and `pair-success` delivers the HMAC-authenticated,
//! account-signed device identity that this client must verify,
//! counter-sign, commit to the store, and echo back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use prost::Message;
use sha2::Sha256;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use wavelet_codec::{Jid, Node};
use wavelet_proto::{AdvDeviceIdentity, AdvSignedDeviceIdentity, AdvSignedDeviceIdentityHmac};
use wavelet_store::keys::{verify_signature, IdentityKeyPair};
use wavelet_store::{DeviceData, Store};

use crate::error::PairError;
use crate::events::{Event, EventBus};
use crate::request::{iq_error_reply, iq_result_ack};
use crate::sender::StanzaSender;

type HmacSha256 = Hmac<Sha256>;

/// Synchronous veto hook consulted before a pairing is committed.
pub type PrePairCallback = Box<dyn Fn(&Jid, &str, &str) -> bool + Send + Sync>;

// Signature domain prefixes over the ADV identity blobs.
const ACCOUNT_SIG_PREFIX: [u8; 2] = [0x06, 0x00];
const DEVICE_SIG_PREFIX: [u8; 2] = [0x06, 0x01];
const HOSTED_ACCOUNT_SIG_PREFIX: [u8; 2] = [0x06, 0x05];
const HOSTED_DEVICE_SIG_PREFIX: [u8; 2] = [0x06, 0x06];

/// Everything the pairing handlers need, cloneable so deadline watchers can
/// be spawned.
#[derive(Clone)]
pub(crate) struct PairingContext {
    pub store: Store,
    pub device: Arc<RwLock<DeviceData>>,
    pub sender: StanzaSender,
    pub events: EventBus,
    pub expect_disconnect: Arc<AtomicBool>,
    pub callback: Arc<RwLock<Option<PrePairCallback>>>,
    /// Cancelling this token tears the connection down.
    pub connection: CancellationToken,
    pub pair_timeout: Duration,
}

// ─── pair-device (QR advertisement) ─────────────────────────────────────────

/// Emit one QR payload per advertised ref and acknowledge the stanza.
/// Ack failures are logged and do not abort the flow.
pub(crate) async fn handle_pair_device(ctx: &PairingContext, request: &Node) {
    let Some(container) = request.child("pair-device") else {
        tracing::warn!("pair-device stanza without container child");
        return;
    };

    let codes: Vec<String> = {
        let device = ctx.device.read().await;
        container
            .children_by_tag("ref")
            .filter_map(|r| r.content_bytes())
            .filter_map(|bytes| std::str::from_utf8(bytes).ok())
            .map(|reference| qr_payload(reference, &device))
            .collect()
    };
    if codes.is_empty() {
        tracing::warn!("pair-device stanza carried no refs");
        return;
    }

    if let Err(e) = ctx.sender.send_node(iq_result_ack(request)).await {
        tracing::warn!(error = %e, "Failed to acknowledge pair-device stanza");
    }

    tracing::info!(count = codes.len(), "Pairing QR refs received");
    ctx.events.emit(Event::Qr { codes });
    spawn_pair_deadline(ctx.clone());
}

/// `ref,base64(noisePub),base64(identityPub),base64(advSecret)` — standard
/// base64 with padding, four comma-separated fields.
fn qr_payload(reference: &str, device: &DeviceData) -> String {
    format!(
        "{reference},{},{},{}",
        B64.encode(device.noise_key.public_bytes()),
        B64.encode(device.identity_key.public_bytes()),
        B64.encode(device.adv_secret_key),
    )
}

/// Tear the connection down if no pairing lands within the deadline; the
/// server rotates refs for a while but gives up silently after that.
fn spawn_pair_deadline(ctx: PairingContext) {
    tokio::spawn(async move {
        tokio::select! {
            () = ctx.connection.cancelled() => {}
            () = tokio::time::sleep(ctx.pair_timeout) => {
                if !ctx.device.read().await.is_paired() {
                    tracing::warn!("Pairing deadline elapsed without pair-success");
                    ctx.connection.cancel();
                }
            }
        }
    });
}

// ─── pair-success ───────────────────────────────────────────────────────────

/// Outcome data for the [`Event::PairSuccess`] dispatch.
struct PairedIdentity {
    id: Jid,
    lid: Jid,
    business_name: String,
    platform: String,
}

/// Drive the full pair-success sequence. Every failure sends the mapped
/// `iq error`, dispatches [`Event::PairError`], and tears the connection
/// down; success dispatches [`Event::PairSuccess`] and expects the
/// server-initiated reconnect.
pub(crate) async fn handle_pair_success(ctx: &PairingContext, request: &Node) {
    match pair_success_inner(ctx, request).await {
        Ok(paired) => {
            tracing::info!(jid = %paired.id, platform = %paired.platform, "Successfully paired");
            ctx.events.emit(Event::PairSuccess {
                id: paired.id,
                lid: paired.lid,
                business_name: paired.business_name,
                platform: paired.platform,
            });
        }
        Err(error) => {
            if let Some((code, text)) = error_reply_for(&error) {
                if let Err(e) = ctx.sender.send_node(iq_error_reply(request, code, text)).await {
                    tracing::warn!(error = %e, "Failed to send pair-success error reply");
                }
            }
            tracing::error!(error = %error, "Pairing failed");
            ctx.events.emit(Event::PairError { error });
            ctx.connection.cancel();
        }
    }
}

fn error_reply_for(error: &PairError) -> Option<(u16, &'static str)> {
    match error {
        PairError::ProtoError => Some((500, "internal-error")),
        PairError::InvalidDeviceIdentityHmac => Some((401, "hmac-mismatch")),
        PairError::InvalidDeviceSignature => Some((401, "signature-mismatch")),
        PairError::RejectedLocally => Some((500, "internal-error")),
        PairError::Database(_) => Some((500, "internal-error")),
        // The connection is already broken; no point replying.
        PairError::SendFailed(_) => None,
    }
}

async fn pair_success_inner(
    ctx: &PairingContext,
    request: &Node,
) -> std::result::Result<PairedIdentity, PairError> {
    let success = request.child("pair-success").ok_or(PairError::ProtoError)?;

    let device_node = success.child("device").ok_or(PairError::ProtoError)?;
    let jid = device_node.attr_jid("jid").ok_or(PairError::ProtoError)?;
    let lid = device_node.attr_jid("lid").ok_or(PairError::ProtoError)?;
    let platform = success
        .child("platform")
        .and_then(|n| n.attr_string("name"))
        .unwrap_or_default();
    let business_name = success
        .child("biz")
        .and_then(|n| n.attr_string("name"))
        .unwrap_or_default();
    let identity_bytes = success
        .child("device-identity")
        .and_then(Node::content_bytes)
        .ok_or(PairError::ProtoError)?;

    let mut device = ctx.device.write().await;

    // 1. Decode the HMAC container.
    let container = AdvSignedDeviceIdentityHmac::decode(identity_bytes)
        .map_err(|_| PairError::ProtoError)?;

    // 2–3. Authenticate it against the adv secret shared at registration.
    let hosted = container.is_hosted();
    if !verify_adv_hmac(&device.adv_secret_key, &container.details, &container.hmac, hosted) {
        return Err(PairError::InvalidDeviceIdentityHmac);
    }

    // 4. Decode the signed identity.
    let mut identity = AdvSignedDeviceIdentity::decode(container.details.as_slice())
        .map_err(|_| PairError::ProtoError)?;

    // 5. The account must have signed our identity key.
    if !verify_account_signature(&identity, &device.identity_key.public_bytes(), hosted) {
        return Err(PairError::InvalidDeviceSignature);
    }

    // 6. Counter-sign with our identity key.
    identity.device_signature =
        generate_device_signature(&device.identity_key, &identity, hosted).to_vec();

    // 7. Recover our key index from the inner details.
    let inner = AdvDeviceIdentity::decode(identity.details.as_slice())
        .map_err(|_| PairError::ProtoError)?;
    let key_index = inner.key_index;

    // 8. Local veto hook; invoked exactly once per pair-success.
    {
        let callback = ctx.callback.read().await;
        if let Some(callback) = callback.as_ref() {
            if !callback(&jid, &platform, &business_name) {
                return Err(PairError::RejectedLocally);
            }
        }
    }

    // 9. Commit phase one: the device row. The stored account keeps the
    // account signature key; only the wire copy below is blanked.
    device.account = Some(identity.clone());
    device.id = Some(jid.clone());
    device.lid = Some(lid.clone());
    device.business_name = business_name.clone();
    device.platform = platform.clone();
    if let Err(e) = ctx.store.save_device(&device).await {
        return Err(PairError::Database(e.to_string()));
    }

    // 10. Commit phase two: LID↔PN mapping and the primary device's
    // identity under the device-0-of-LID signal address. A failure here
    // rolls the whole store back.
    let phase_two = async {
        wavelet_store::repository::lid_map::put_mapping(
            ctx.store.pool(),
            &lid.to_non_ad().to_string(),
            &jid.to_non_ad().to_string(),
        )
        .await?;
        // The account signature key is the primary device's identity key;
        // signature verification above pinned it to 32 bytes.
        let main_device_address = format!("{}:0", lid.user);
        wavelet_store::repository::identities::put_identity(
            ctx.store.pool(),
            &main_device_address,
            &identity.account_signature_key,
        )
        .await
    };
    if let Err(e) = phase_two.await {
        rollback(ctx, &mut device).await;
        return Err(PairError::Database(e.to_string()));
    }

    // 11. The server closes the stream after a successful pair; that close
    // is expected, not a fault.
    ctx.expect_disconnect.store(true, Ordering::SeqCst);

    // 12. Echo the self-signed identity with the account signature key
    // blanked; the server restores it from its own state.
    let mut wire_identity = identity.clone();
    wire_identity.account_signature_key.clear();
    let reply = self_signed_reply(request, key_index, &wire_identity.encode_to_vec());

    // 13. A send failure after commit leaves a half-paired device; wipe.
    if let Err(e) = ctx.sender.send_node(reply).await {
        rollback(ctx, &mut device).await;
        return Err(PairError::SendFailed(e.to_string()));
    }

    Ok(PairedIdentity { id: jid, lid, business_name, platform })
}

/// Wipe the store and swap in a fresh unpaired identity so the in-memory
/// image never outlives the rows it was committed with.
async fn rollback(ctx: &PairingContext, device: &mut DeviceData) {
    if let Err(e) = ctx.store.delete_store().await {
        tracing::error!(error = %e, "Pairing rollback failed; store may be inconsistent");
        return;
    }
    match ctx.store.load_or_init_device().await {
        Ok(fresh) => *device = fresh,
        Err(e) => {
            tracing::error!(error = %e, "Failed to regenerate device identity after rollback");
        }
    }
}

fn self_signed_reply(request: &Node, key_index: u32, identity_bytes: &[u8]) -> Node {
    let mut ack = iq_result_ack(request);
    ack.content = Some(wavelet_codec::NodeContent::Nodes(vec![Node::new(
        "pair-device-sign",
    )
    .children(vec![Node::new("device-identity")
        .attr("key-index", i64::from(key_index))
        .bytes(identity_bytes.to_vec())])]));
    ack
}

// ─── Signature and HMAC composition ─────────────────────────────────────────

/// Constant-time check of the container HMAC. Hosted accounts prepend the
/// hosted account prefix to the input; others prepend nothing.
pub fn verify_adv_hmac(adv_secret: &[u8; 32], details: &[u8], hmac: &[u8], hosted: bool) -> bool {
    let mut mac = HmacSha256::new_from_slice(adv_secret).expect("any key length works");
    if hosted {
        mac.update(&HOSTED_ACCOUNT_SIG_PREFIX);
    }
    mac.update(details);
    mac.verify_slice(hmac).is_ok()
}

/// Reference HMAC computation, used by pairing tests and the primary-side
/// tooling.
pub fn compute_adv_hmac(adv_secret: &[u8; 32], details: &[u8], hosted: bool) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(adv_secret).expect("any key length works");
    if hosted {
        mac.update(&HOSTED_ACCOUNT_SIG_PREFIX);
    }
    mac.update(details);
    mac.finalize().into_bytes().into()
}

/// Verify `account_signature` under `account_signature_key` over
/// `prefix ‖ details ‖ identity_pub`.
pub fn verify_account_signature(
    identity: &AdvSignedDeviceIdentity,
    identity_pub: &[u8; 32],
    hosted: bool,
) -> bool {
    let prefix = if hosted { HOSTED_ACCOUNT_SIG_PREFIX } else { ACCOUNT_SIG_PREFIX };
    let message = [&prefix[..], &identity.details, identity_pub].concat();
    verify_signature(&identity.account_signature_key, &identity.account_signature, &message)
}

/// Sign `prefix ‖ details ‖ identity_pub ‖ account_signature_key` with the
/// device identity key.
pub fn generate_device_signature(
    identity_key: &IdentityKeyPair,
    identity: &AdvSignedDeviceIdentity,
    hosted: bool,
) -> [u8; 64] {
    let prefix = if hosted { HOSTED_DEVICE_SIG_PREFIX } else { DEVICE_SIG_PREFIX };
    let message = [
        &prefix[..],
        &identity.details,
        &identity_key.public_bytes(),
        &identity.account_signature_key,
    ]
    .concat();
    identity_key.sign(&message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adv_hmac_matches_reference_composition() {
        let secret = [3u8; 32];
        let details = b"serialized-identity";

        // Non-hosted: plain HMAC over the details.
        let mut mac = HmacSha256::new_from_slice(&secret).unwrap();
        mac.update(details);
        let reference: [u8; 32] = mac.finalize().into_bytes().into();
        assert_eq!(compute_adv_hmac(&secret, details, false), reference);
        assert!(verify_adv_hmac(&secret, details, &reference, false));

        // Hosted: the hosted account prefix goes first.
        let mut mac = HmacSha256::new_from_slice(&secret).unwrap();
        mac.update(&[0x06, 0x05]);
        mac.update(details);
        let hosted_reference: [u8; 32] = mac.finalize().into_bytes().into();
        assert_eq!(compute_adv_hmac(&secret, details, true), hosted_reference);
        assert_ne!(reference, hosted_reference);

        // Wrong variant never cross-verifies.
        assert!(!verify_adv_hmac(&secret, details, &reference, true));
        assert!(!verify_adv_hmac(&secret, details, &hosted_reference, false));
    }

    #[test]
    fn account_signature_verifies_and_rejects_bit_flips() {
        let account_key = IdentityKeyPair::generate();
        let device_key = IdentityKeyPair::generate();
        let details = b"inner-details".to_vec();

        for hosted in [false, true] {
            let prefix = if hosted { [0x06, 0x05] } else { [0x06, 0x00] };
            let message =
                [&prefix[..], &details, &device_key.public_bytes()].concat();
            let identity = AdvSignedDeviceIdentity {
                details: details.clone(),
                account_signature_key: account_key.public_bytes().to_vec(),
                account_signature: account_key.sign(&message).to_vec(),
                device_signature: vec![],
            };
            assert!(verify_account_signature(&identity, &device_key.public_bytes(), hosted));
            // The hosted and non-hosted domains never cross-verify.
            assert!(!verify_account_signature(&identity, &device_key.public_bytes(), !hosted));

            let mut tampered = identity.clone();
            tampered.details[0] ^= 1;
            assert!(!verify_account_signature(&tampered, &device_key.public_bytes(), hosted));

            let mut tampered = identity.clone();
            tampered.account_signature_key[0] ^= 1;
            assert!(!verify_account_signature(&tampered, &device_key.public_bytes(), hosted));

            let mut tampered = identity;
            tampered.account_signature[0] ^= 1;
            assert!(!verify_account_signature(&tampered, &device_key.public_bytes(), hosted));
        }
    }

    #[test]
    fn device_signature_round_trips_under_identity_key() {
        let device_key = IdentityKeyPair::generate();
        let identity = AdvSignedDeviceIdentity {
            details: b"details".to_vec(),
            account_signature_key: vec![0xAB; 32],
            account_signature: vec![],
            device_signature: vec![],
        };

        for hosted in [false, true] {
            let signature = generate_device_signature(&device_key, &identity, hosted);
            let prefix = if hosted { [0x06, 0x06] } else { [0x06, 0x01] };
            let message = [
                &prefix[..],
                &identity.details,
                &device_key.public_bytes(),
                &identity.account_signature_key,
            ]
            .concat();
            assert!(verify_signature(&device_key.public_bytes(), &signature, &message));
        }
    }
}
