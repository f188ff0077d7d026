//! Session supervisor: owns the connect → handshake → authenticate → run →
//! disconnect lifecycle, the reader and writer tasks, keepalive, and the
//! reconnect backoff policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use rand::Rng;
use sha2::{Digest, Sha256};
use x25519_dalek::StaticSecret;

use wavelet_proto::{client_payload, ClientPayload, DeviceProps};
use wavelet_store::DeviceData;
use wavelet_transport::{client_handshake, FrameSocket, NoiseTransport};

use crate::client::ClientInner;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::Event;
use crate::handlers::HandlerContext;
use crate::pair::PairingContext;
use crate::request::{InfoQuery, IqType};
use crate::sender::StanzaSender;

/// Reported version triple for the handshake payload.
const CLIENT_VERSION: (u32, u32, u32) = (2, 3000, 0);

/// Consecutive keepalive misses tolerated before the connection is cut.
const MAX_KEEPALIVE_MISSES: u32 = 3;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Handshaking,
    Authenticating,
    Connected,
    Closing,
    Faulted,
}

enum Ended {
    /// `expect_disconnect` was armed — reconnect without surfacing an event.
    Expected,
    /// Unexpected loss; backoff applies.
    Unexpected,
    /// The client is shutting down.
    Shutdown,
}

/// The supervisor loop: one iteration per connection attempt.
pub(crate) async fn run(inner: Arc<ClientInner>) {
    let mut attempts = 0u32;
    loop {
        let shutdown = inner.shutdown_token().await;
        if shutdown.is_cancelled() {
            break;
        }
        match run_connection(&inner).await {
            Ok(Ended::Shutdown) => break,
            Ok(Ended::Expected) => {
                attempts = 0;
            }
            Ok(Ended::Unexpected) | Err(_) => {
                if inner.auth_fatal.load(Ordering::SeqCst) {
                    tracing::error!("Authentication-fatal error; not reconnecting");
                    inner.set_state(SessionState::Faulted).await;
                    break;
                }
                if !inner.config.auto_reconnect {
                    break;
                }
                attempts += 1;
                let delay = backoff_delay(&inner.config, attempts);
                tracing::warn!(attempt = attempts, ?delay, "Reconnecting after backoff");
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    inner.set_state(SessionState::Idle).await;
}

/// Exponential backoff with full jitter: `base · 2^(n-1)` capped, minus a
/// random slice of `jitter`.
fn backoff_delay(config: &ClientConfig, attempt: u32) -> Duration {
    let exp = config
        .backoff_base
        .saturating_mul(1u32 << (attempt - 1).min(16));
    let capped = exp.min(config.backoff_cap);
    let jitter = capped.mul_f64(config.backoff_jitter * rand::rng().random::<f64>());
    capped - jitter
}

async fn run_connection(inner: &Arc<ClientInner>) -> Result<Ended, ClientError> {
    inner.set_state(SessionState::Connecting).await;
    inner.router.reset_suffix().await;

    let socket = FrameSocket::connect(&inner.config.ws_url, &inner.config.origin).await?;

    let (payload, static_secret) = {
        let device = inner.device.read().await;
        (
            build_client_payload(&device, &inner.config).encode_to_vec(),
            StaticSecret::from(device.noise_key.secret_bytes()),
        )
    };

    inner.set_state(SessionState::Handshaking).await;
    let NoiseTransport { mut writer, mut reader } =
        client_handshake(socket, &static_secret, &payload).await?;

    inner.set_state(SessionState::Authenticating).await;
    let shutdown = inner.shutdown_token().await;
    let connection = shutdown.child_token();
    let (sender, mut outbox) = StanzaSender::channel();
    *inner.sender_slot.write().await = Some(sender.clone());

    // Writer task: sole owner of the send cipher, so the nonce counter
    // advances in queue order no matter how many callers send.
    let writer_cancel = connection.clone();
    let writer_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = writer_cancel.cancelled() => break,
                maybe = outbox.recv() => {
                    let Some(node) = maybe else { break };
                    let bytes = match wavelet_codec::marshal(&node) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            // Encode errors return to the caller's side; the
                            // stanza is dropped without touching the wire.
                            tracing::error!(error = %e, tag = %node.tag, "Unencodable stanza");
                            continue;
                        }
                    };
                    if let Err(e) = writer.send_payload(&bytes).await {
                        tracing::debug!(error = %e, "Writer stopping");
                        writer_cancel.cancel();
                        break;
                    }
                }
            }
        }
        writer.close().await;
    });

    let authenticated = Arc::new(AtomicBool::new(false));
    let ctx = HandlerContext {
        pairing: PairingContext {
            store: inner.store.clone(),
            device: Arc::clone(&inner.device),
            sender: sender.clone(),
            events: inner.events.clone(),
            expect_disconnect: Arc::clone(&inner.expect_disconnect),
            callback: Arc::clone(&inner.callback),
            connection: connection.clone(),
            pair_timeout: inner.config.pair_timeout,
        },
        router: Arc::clone(&inner.router),
        authenticated: Arc::clone(&authenticated),
        auth_fatal: Arc::clone(&inner.auth_fatal),
    };

    let keepalive_task = tokio::spawn(keepalive(
        Arc::clone(inner),
        connection.clone(),
        Arc::clone(&authenticated),
    ));

    // Reader loop: the sole consumer of inbound frames, dispatching in
    // receive order. Pairing runs inline here, which makes the commit
    // sequence mutually exclusive with all other routing.
    let mut protocol_fault = false;
    let mut marked_connected = false;
    loop {
        tokio::select! {
            () = connection.cancelled() => break,
            result = reader.next_payload() => {
                let payload = match result {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::debug!(error = %e, "Transport closed");
                        break;
                    }
                };
                match wavelet_codec::unmarshal(&payload) {
                    Ok(node) => {
                        if !marked_connected && authenticated.load(Ordering::SeqCst) {
                            inner.set_state(SessionState::Connected).await;
                            marked_connected = true;
                        }
                        ctx.dispatch(node).await;
                    }
                    Err(e) => {
                        // A peer sending malformed stanzas is unrecoverable.
                        tracing::error!(error = %e, "Malformed inbound stanza");
                        protocol_fault = true;
                        break;
                    }
                }
            }
        }
    }

    // Teardown: release the sender slot first so new sends fail fast, then
    // the correlation slots so awaiting callers wake up.
    inner.set_state(SessionState::Closing).await;
    connection.cancel();
    *inner.sender_slot.write().await = None;
    inner.router.fail_all().await;
    keepalive_task.abort();
    let _ = writer_task.await;

    if shutdown.is_cancelled() {
        return Ok(Ended::Shutdown);
    }
    let expected = inner.expect_disconnect.swap(false, Ordering::SeqCst);
    if expected {
        tracing::debug!("Expected disconnect; reconnecting");
        return Ok(Ended::Expected);
    }
    inner.events.emit(Event::Disconnected);
    if protocol_fault {
        inner.set_state(SessionState::Faulted).await;
    }
    Ok(Ended::Unexpected)
}

/// Protocol-level keepalive, distinct from WebSocket control frames.
async fn keepalive(
    inner: Arc<ClientInner>,
    connection: tokio_util::sync::CancellationToken,
    authenticated: Arc<AtomicBool>,
) {
    let mut misses = 0u32;
    loop {
        tokio::select! {
            () = connection.cancelled() => break,
            () = tokio::time::sleep(inner.config.keepalive_interval) => {}
        }
        if !authenticated.load(Ordering::SeqCst) {
            continue;
        }
        let ping = InfoQuery {
            namespace: "w:p",
            query_type: IqType::Get,
            to: wavelet_codec::Jid::server_jid(),
            content: Some(wavelet_codec::NodeContent::Nodes(vec![
                wavelet_codec::Node::new("ping"),
            ])),
            timeout: Some(inner.config.keepalive_interval),
        };
        match inner.send_iq(ping).await {
            Ok(_) => misses = 0,
            Err(e) => {
                misses += 1;
                tracing::warn!(error = %e, misses, "Keepalive ping failed");
                if misses >= MAX_KEEPALIVE_MISSES {
                    tracing::error!("Keepalive exhausted; cutting the connection");
                    connection.cancel();
                    break;
                }
            }
        }
    }
}

/// Handshake hello payload: login data once paired, registration data
/// before.
fn build_client_payload(device: &DeviceData, config: &ClientConfig) -> ClientPayload {
    let user_agent = client_payload::UserAgent {
        platform: Some(client_payload::user_agent::Platform::Web as i32),
        app_version: Some(client_payload::user_agent::AppVersion {
            primary: Some(CLIENT_VERSION.0),
            secondary: Some(CLIENT_VERSION.1),
            tertiary: Some(CLIENT_VERSION.2),
        }),
        os_version: None,
        manufacturer: None,
        device: Some(config.os_name.clone()),
        locale_language_iso_639_1: Some("en".to_owned()),
        locale_country_iso_3166_1_alpha_2: Some("US".to_owned()),
    };

    let mut payload = ClientPayload {
        user_agent: Some(user_agent),
        connect_type: Some(client_payload::ConnectType::WifiUnknown as i32),
        connect_reason: Some(client_payload::ConnectReason::UserActivated as i32),
        push_name: (!device.push_name.is_empty()).then(|| device.push_name.clone()),
        ..Default::default()
    };

    if let Some(jid) = &device.id {
        payload.username = jid.user.parse().ok();
        payload.device = Some(u32::from(jid.device));
        payload.passive = Some(true);
        payload.pull = Some(true);
    } else {
        payload.passive = Some(false);
        payload.device_pairing_data = Some(registration_data(device, config));
    }
    payload
}

fn registration_data(
    device: &DeviceData,
    config: &ClientConfig,
) -> client_payload::DevicePairingRegistrationData {
    let device_props = DeviceProps {
        os: Some(config.os_name.clone()),
        version: Some(client_payload::user_agent::AppVersion {
            primary: Some(CLIENT_VERSION.0),
            secondary: Some(CLIENT_VERSION.1),
            tertiary: Some(CLIENT_VERSION.2),
        }),
        platform_type: Some(wavelet_proto::handshake::device_props::PlatformType::Chrome as i32),
        require_full_sync: Some(false),
    };

    let version_string = format!(
        "{}.{}.{}",
        CLIENT_VERSION.0, CLIENT_VERSION.1, CLIENT_VERSION.2
    );
    let build_hash = Sha256::digest(version_string.as_bytes());

    client_payload::DevicePairingRegistrationData {
        e_regid: device.registration_id.to_be_bytes().to_vec(),
        e_keytype: vec![wavelet_store::keys::DJB_KEY_TYPE],
        e_ident: device.identity_key.public_bytes().to_vec(),
        e_skey_id: device.signed_pre_key.id.to_be_bytes()[1..].to_vec(),
        e_skey_val: device.signed_pre_key.key_pair.public_bytes().to_vec(),
        e_skey_sig: device.signed_pre_key.signature.to_vec(),
        build_hash: build_hash[..16].to_vec(),
        device_props: device_props.encode_to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let config = ClientConfig::default();
        let first = backoff_delay(&config, 1);
        assert!(first <= config.backoff_base);
        assert!(first >= config.backoff_base.mul_f64(1.0 - config.backoff_jitter));

        let late = backoff_delay(&config, 10);
        assert!(late <= config.backoff_cap);
        assert!(late >= config.backoff_cap.mul_f64(1.0 - config.backoff_jitter));
    }

    #[test]
    fn unpaired_payload_carries_registration_data() {
        let device = DeviceData::generate();
        let config = ClientConfig::default();
        let payload = build_client_payload(&device, &config);

        assert_eq!(payload.passive, Some(false));
        assert!(payload.username.is_none());
        let reg = payload.device_pairing_data.expect("registration data");
        assert_eq!(reg.e_regid.len(), 4);
        assert_eq!(reg.e_keytype, vec![0x05]);
        assert_eq!(reg.e_ident, device.identity_key.public_bytes().to_vec());
        assert_eq!(reg.e_skey_id, vec![0, 0, 1]);
        assert_eq!(reg.build_hash.len(), 16);
    }

    #[test]
    fn paired_payload_logs_in_with_device_index() {
        let mut device = DeviceData::generate();
        device.id = Some(wavelet_codec::Jid::new_ad("15551234567", 0, 7));
        let payload = build_client_payload(&device, &ClientConfig::default());

        assert_eq!(payload.username, Some(15551234567));
        assert_eq!(payload.device, Some(7));
        assert_eq!(payload.passive, Some(true));
        assert!(payload.device_pairing_data.is_none());
    }
}
