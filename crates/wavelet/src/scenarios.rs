//! End-to-end pairing scenarios driven against an in-memory store and an
//! inspectable outbound queue — no network involved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use wavelet_codec::{Jid, Node};
use wavelet_proto::{
    AdvDeviceIdentity, AdvEncryptionType, AdvSignedDeviceIdentity, AdvSignedDeviceIdentityHmac,
};
use wavelet_store::keys::IdentityKeyPair;
use wavelet_store::Store;

use crate::error::PairError;
use crate::events::{Event, EventBus, EventStream};
use crate::pair::{self, compute_adv_hmac, generate_device_signature, PairingContext};
use crate::sender::StanzaSender;

struct Harness {
    ctx: PairingContext,
    outbound: mpsc::Receiver<Node>,
    events: EventStream,
    store: Store,
}

async fn harness() -> Harness {
    let store = Store::open_in_memory().await.unwrap();
    let device = store.load_or_init_device().await.unwrap();
    let (sender, outbound) = StanzaSender::channel();
    let bus = EventBus::new();
    let events = bus.subscribe();
    let ctx = PairingContext {
        store: store.clone(),
        device: Arc::new(RwLock::new(device)),
        sender,
        events: bus,
        expect_disconnect: Arc::new(AtomicBool::new(false)),
        callback: Arc::new(RwLock::new(None)),
        connection: CancellationToken::new(),
        pair_timeout: Duration::from_secs(180),
    };
    Harness { ctx, outbound, events, store }
}

/// Signed identity as the primary device would produce it.
struct SyntheticIdentity {
    container_bytes: Vec<u8>,
    identity: AdvSignedDeviceIdentity,
    key_index: u32,
}

async fn synthetic_identity(ctx: &PairingContext, hosted: bool) -> SyntheticIdentity {
    let device = ctx.device.read().await;
    let account_key = IdentityKeyPair::generate();

    let inner = AdvDeviceIdentity {
        raw_id: 42,
        timestamp: 1_700_000_000,
        key_index: 7,
        account_type: hosted.then_some(AdvEncryptionType::Hosted as i32),
    };
    let details = inner.encode_to_vec();

    let prefix: [u8; 2] = if hosted { [0x06, 0x05] } else { [0x06, 0x00] };
    let message = [&prefix[..], &details, &device.identity_key.public_bytes()].concat();
    let identity = AdvSignedDeviceIdentity {
        details,
        account_signature_key: account_key.public_bytes().to_vec(),
        account_signature: account_key.sign(&message).to_vec(),
        device_signature: vec![],
    };

    let identity_bytes = identity.encode_to_vec();
    let container = AdvSignedDeviceIdentityHmac {
        hmac: compute_adv_hmac(&device.adv_secret_key, &identity_bytes, hosted).to_vec(),
        details: identity_bytes,
        account_type: hosted.then_some(AdvEncryptionType::Hosted as i32),
    };

    SyntheticIdentity {
        container_bytes: container.encode_to_vec(),
        identity,
        key_index: inner.key_index,
    }
}

fn pair_success_request(identity_bytes: Vec<u8>) -> Node {
    Node::new("iq")
        .attr("id", "pair-1")
        .attr("from", Jid::server_jid())
        .attr("type", "set")
        .children(vec![Node::new("pair-success").children(vec![
            Node::new("device")
                .attr("jid", Jid::new_ad("15551234567", 0, 4))
                .attr("lid", Jid::new_ad("99887766", 1, 4)),
            Node::new("platform").attr("name", "smba"),
            Node::new("biz").attr("name", "Acme Corp"),
            Node::new("device-identity").bytes(identity_bytes),
        ])])
}

fn expect_error_reply(reply: &Node, code: u64, text: &str) {
    assert_eq!(reply.tag, "iq");
    assert_eq!(reply.attr_string("type").as_deref(), Some("error"));
    assert_eq!(reply.attr_string("id").as_deref(), Some("pair-1"));
    let error = reply.child("error").expect("error child");
    assert_eq!(error.attr_u64("code"), Some(code));
    assert_eq!(error.attr_string("text").as_deref(), Some(text));
}

// ─── S1: QR emission ─────────────────────────────────────────────────────────

#[tokio::test]
async fn qr_codes_emitted_per_ref_with_acknowledgement() {
    let mut h = harness().await;

    let request = Node::new("iq")
        .attr("id", "42")
        .attr("from", Jid::server_jid())
        .attr("type", "set")
        .children(vec![Node::new("pair-device").children(vec![
            Node::new("ref").bytes(b"R1".to_vec()),
            Node::new("ref").bytes(b"R2".to_vec()),
        ])]);

    pair::handle_pair_device(&h.ctx, &request).await;

    // Empty result ack referencing the original id.
    let ack = h.outbound.try_recv().expect("ack sent");
    assert_eq!(ack.tag, "iq");
    assert_eq!(ack.attr_string("id").as_deref(), Some("42"));
    assert_eq!(ack.attr_string("type").as_deref(), Some("result"));
    assert_eq!(ack.attr_jid("to"), Some(Jid::server_jid()));
    assert!(ack.content.is_none());

    let Some(Event::Qr { codes }) = h.events.recv().await else {
        panic!("expected QR event");
    };
    assert_eq!(codes.len(), 2);

    // ref,noise,identity,advsecret — four padded-base64 fields after the
    // ref, identical across rotations.
    let device = h.ctx.device.read().await;
    use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
    let suffix = format!(
        "{},{},{}",
        B64.encode(device.noise_key.public_bytes()),
        B64.encode(device.identity_key.public_bytes()),
        B64.encode(device.adv_secret_key),
    );
    assert_eq!(codes[0], format!("R1,{suffix}"));
    assert_eq!(codes[1], format!("R2,{suffix}"));
}

// ─── S2: pair-success happy path ─────────────────────────────────────────────

#[tokio::test]
async fn pair_success_commits_identity_and_replies_self_signed() {
    let mut h = harness().await;
    let synthetic = synthetic_identity(&h.ctx, false).await;
    let request = pair_success_request(synthetic.container_bytes);

    pair::handle_pair_success(&h.ctx, &request).await;

    // Store committed: account, id, lid, names.
    let device = h.ctx.device.read().await;
    assert!(device.is_paired());
    assert_eq!(device.id, Some(Jid::new_ad("15551234567", 0, 4)));
    assert_eq!(device.lid, Some(Jid::new_ad("99887766", 1, 4)));
    assert_eq!(device.platform, "smba");
    assert_eq!(device.business_name, "Acme Corp");
    let account = device.account.as_ref().expect("account stored");
    // Stored copy keeps the account signature key and carries our fresh
    // device signature.
    assert_eq!(account.account_signature_key, synthetic.identity.account_signature_key);
    let expected_signature =
        generate_device_signature(&device.identity_key, &synthetic.identity, false);
    assert_eq!(account.device_signature, expected_signature.to_vec());

    // The persisted row agrees with the in-memory image.
    let reloaded = h.store.load_or_init_device().await.unwrap();
    assert_eq!(reloaded.id, device.id);
    assert_eq!(reloaded.account.as_ref(), Some(account));

    // LID mapping and primary-device identity installed.
    assert_eq!(
        wavelet_store::repository::lid_map::pn_for_lid(h.store.pool(), "99887766@lid")
            .await
            .unwrap()
            .as_deref(),
        Some("15551234567@s.whatsapp.net")
    );
    assert_eq!(
        wavelet_store::repository::identities::get_identity(h.store.pool(), "99887766:0")
            .await
            .unwrap(),
        Some(synthetic.identity.account_signature_key.clone())
    );

    // Wire reply: result ack wrapping pair-device-sign → device-identity
    // with the key index and the blanked self-signed identity.
    let reply = h.outbound.try_recv().expect("reply sent");
    assert_eq!(reply.attr_string("type").as_deref(), Some("result"));
    assert_eq!(reply.attr_string("id").as_deref(), Some("pair-1"));
    let sign = reply.child("pair-device-sign").expect("pair-device-sign");
    let wire_identity_node = sign.child("device-identity").expect("device-identity");
    assert_eq!(wire_identity_node.attr_u64("key-index"), Some(u64::from(synthetic.key_index)));
    let wire_identity =
        AdvSignedDeviceIdentity::decode(wire_identity_node.content_bytes().unwrap()).unwrap();
    assert!(wire_identity.account_signature_key.is_empty());
    assert_eq!(wire_identity.device_signature, account.device_signature);

    // The server-initiated close that follows is expected.
    assert!(h.ctx.expect_disconnect.load(Ordering::SeqCst));
    assert!(!h.ctx.connection.is_cancelled());

    let Some(Event::PairSuccess { id, lid, business_name, platform }) = h.events.recv().await
    else {
        panic!("expected PairSuccess event");
    };
    assert_eq!(id, Jid::new_ad("15551234567", 0, 4));
    assert_eq!(lid, Jid::new_ad("99887766", 1, 4));
    assert_eq!(business_name, "Acme Corp");
    assert_eq!(platform, "smba");
}

// ─── S3: HMAC mismatch ───────────────────────────────────────────────────────

#[tokio::test]
async fn flipped_hmac_byte_rejects_with_401_and_no_store_mutation() {
    let mut h = harness().await;
    let synthetic = synthetic_identity(&h.ctx, false).await;

    let mut container =
        AdvSignedDeviceIdentityHmac::decode(synthetic.container_bytes.as_slice()).unwrap();
    container.hmac[3] ^= 0x40;
    let request = pair_success_request(container.encode_to_vec());

    pair::handle_pair_success(&h.ctx, &request).await;

    let reply = h.outbound.try_recv().expect("error reply sent");
    expect_error_reply(&reply, 401, "hmac-mismatch");

    let Some(Event::PairError { error }) = h.events.recv().await else {
        panic!("expected PairError event");
    };
    assert_eq!(error, PairError::InvalidDeviceIdentityHmac);

    // No store mutation, and the connection is being torn down.
    assert!(!h.ctx.device.read().await.is_paired());
    assert!(!h.store.load_or_init_device().await.unwrap().is_paired());
    assert!(h.ctx.connection.is_cancelled());
    assert!(!h.ctx.expect_disconnect.load(Ordering::SeqCst));
}

// ─── S4: hosted account ──────────────────────────────────────────────────────

#[tokio::test]
async fn hosted_account_pairs_under_hosted_prefixes() {
    let mut h = harness().await;
    let synthetic = synthetic_identity(&h.ctx, true).await;
    let request = pair_success_request(synthetic.container_bytes);

    pair::handle_pair_success(&h.ctx, &request).await;

    let device = h.ctx.device.read().await;
    assert!(device.is_paired());
    let account = device.account.as_ref().unwrap();
    let expected_signature =
        generate_device_signature(&device.identity_key, &synthetic.identity, true);
    assert_eq!(account.device_signature, expected_signature.to_vec());

    let reply = h.outbound.try_recv().expect("reply sent");
    assert_eq!(reply.attr_string("type").as_deref(), Some("result"));
    assert!(matches!(h.events.recv().await, Some(Event::PairSuccess { .. })));
}

// ─── S5: pre-pair rejection ──────────────────────────────────────────────────

#[tokio::test]
async fn pre_pair_callback_veto_rejects_with_500() {
    let mut h = harness().await;
    *h.ctx.callback.write().await = Some(Box::new(|jid: &Jid, platform: &str, biz: &str| {
        assert_eq!(jid, &Jid::new_ad("15551234567", 0, 4));
        assert_eq!(platform, "smba");
        assert_eq!(biz, "Acme Corp");
        false
    }));

    let synthetic = synthetic_identity(&h.ctx, false).await;
    pair::handle_pair_success(&h.ctx, &pair_success_request(synthetic.container_bytes)).await;

    let reply = h.outbound.try_recv().expect("error reply sent");
    expect_error_reply(&reply, 500, "internal-error");

    let Some(Event::PairError { error }) = h.events.recv().await else {
        panic!("expected PairError event");
    };
    assert_eq!(error, PairError::RejectedLocally);
    assert!(!h.store.load_or_init_device().await.unwrap().is_paired());
    assert!(h.ctx.connection.is_cancelled());
}

// ─── Commit/rollback edges ───────────────────────────────────────────────────

#[tokio::test]
async fn send_failure_after_commit_wipes_the_store() {
    let mut h = harness().await;
    let synthetic = synthetic_identity(&h.ctx, false).await;
    let request = pair_success_request(synthetic.container_bytes);

    // Kill the outbound channel: the commit will land but the confirmation
    // cannot be sent.
    h.outbound.close();

    pair::handle_pair_success(&h.ctx, &request).await;

    let Some(Event::PairError { error }) = h.events.recv().await else {
        panic!("expected PairError event");
    };
    assert!(matches!(error, PairError::SendFailed(_)));

    // Two-phase rollback: nothing paired survives in the store.
    let fresh = h.store.load_or_init_device().await.unwrap();
    assert!(!fresh.is_paired());
    assert_eq!(
        wavelet_store::repository::lid_map::pn_for_lid(h.store.pool(), "99887766@lid")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn signature_mismatch_rejects_with_401() {
    let mut h = harness().await;
    let synthetic = synthetic_identity(&h.ctx, false).await;

    let mut container =
        AdvSignedDeviceIdentityHmac::decode(synthetic.container_bytes.as_slice()).unwrap();
    let mut identity = AdvSignedDeviceIdentity::decode(container.details.as_slice()).unwrap();
    identity.account_signature[10] ^= 1;
    container.details = identity.encode_to_vec();
    // Keep the HMAC consistent so the failure lands on the signature step.
    container.hmac = {
        let device = h.ctx.device.read().await;
        compute_adv_hmac(&device.adv_secret_key, &container.details, false).to_vec()
    };

    pair::handle_pair_success(&h.ctx, &pair_success_request(container.encode_to_vec())).await;

    let reply = h.outbound.try_recv().expect("error reply sent");
    expect_error_reply(&reply, 401, "signature-mismatch");
    let Some(Event::PairError { error }) = h.events.recv().await else {
        panic!("expected PairError event");
    };
    assert_eq!(error, PairError::InvalidDeviceSignature);
}

#[tokio::test]
async fn garbage_device_identity_rejects_with_500() {
    let mut h = harness().await;
    pair::handle_pair_success(&h.ctx, &pair_success_request(vec![0xFF, 0x00, 0x13])).await;

    let reply = h.outbound.try_recv().expect("error reply sent");
    expect_error_reply(&reply, 500, "internal-error");
    let Some(Event::PairError { error }) = h.events.recv().await else {
        panic!("expected PairError event");
    };
    assert_eq!(error, PairError::ProtoError);
}

// ─── Pairing deadline ────────────────────────────────────────────────────────

#[tokio::test]
async fn unscanned_qr_cuts_the_connection_at_the_deadline() {
    let mut h = harness().await;
    tokio::time::pause();
    h.ctx.pair_timeout = Duration::from_secs(180);

    let request = Node::new("iq")
        .attr("id", "42")
        .attr("from", Jid::server_jid())
        .attr("type", "set")
        .children(vec![Node::new("pair-device")
            .children(vec![Node::new("ref").bytes(b"R1".to_vec())])]);
    pair::handle_pair_device(&h.ctx, &request).await;
    assert!(matches!(h.events.recv().await, Some(Event::Qr { .. })));
    assert!(!h.ctx.connection.is_cancelled());

    tokio::time::sleep(Duration::from_secs(181)).await;
    tokio::task::yield_now().await;
    assert!(h.ctx.connection.is_cancelled());
}
