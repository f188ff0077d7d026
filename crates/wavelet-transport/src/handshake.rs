//! Noise XX handshake driver (initiator side) and the post-split duplex
//! halves.
//!
//! Flights: `e` → `e, ee, s, es` → `s, se` + encrypted client payload.
//! The payload is opaque here — the session layer builds it from store
//! state (registration data while unpaired, login data once paired).

use std::time::Duration;

use prost::Message;
use rand_core::OsRng;
use tokio::time::timeout;
use x25519_dalek::{PublicKey, StaticSecret};

use wavelet_proto::{handshake_message, HandshakeMessage};

use crate::error::{Result, TransportError};
use crate::frame::{FrameReceiver, FrameSender, FrameSocket};
use crate::noise::{CipherState, HandshakeState, WIRE_HEADER};

/// The server must complete the pattern within this window.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// An established encrypted duplex channel.
#[derive(Debug)]
pub struct NoiseTransport {
    pub writer: NoiseWriter,
    pub reader: NoiseReader,
}

/// Run the XX pattern over a fresh [`FrameSocket`] and split into transport
/// halves. `client_payload` is the already-encoded hello blob sent
/// encrypted in the finish flight.
pub async fn client_handshake(
    socket: FrameSocket,
    static_secret: &StaticSecret,
    client_payload: &[u8],
) -> Result<NoiseTransport> {
    timeout(HANDSHAKE_TIMEOUT, run_handshake(socket, static_secret, client_payload))
        .await
        .map_err(|_| TransportError::HandshakeTimeout)?
}

async fn run_handshake(
    mut socket: FrameSocket,
    static_secret: &StaticSecret,
    client_payload: &[u8],
) -> Result<NoiseTransport> {
    let mut state = HandshakeState::new(&WIRE_HEADER);

    // -> e
    let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);
    state.mix_hash(ephemeral_public.as_bytes());

    let hello = HandshakeMessage {
        client_hello: Some(handshake_message::ClientHello {
            ephemeral: ephemeral_public.as_bytes().to_vec(),
            r#static: Vec::new(),
            payload: Vec::new(),
        }),
        server_hello: None,
        client_finish: None,
    };
    socket.send_frame(&hello.encode_to_vec()).await?;

    // <- e, ee, s, es
    let frame = socket.next_frame().await?;
    let envelope = HandshakeMessage::decode(frame.as_slice())?;
    let server_hello = envelope
        .server_hello
        .ok_or_else(|| TransportError::Handshake("missing server_hello".into()))?;

    let server_ephemeral = fixed_key(&server_hello.ephemeral, "server ephemeral")?;
    state.mix_hash(&server_ephemeral);
    state.mix_key(
        ephemeral_secret
            .diffie_hellman(&PublicKey::from(server_ephemeral))
            .as_bytes(),
    );

    let server_static_plain = state.decrypt_and_hash(&server_hello.r#static)?;
    let server_static = fixed_key(&server_static_plain, "server static")?;
    state.mix_key(
        ephemeral_secret
            .diffie_hellman(&PublicKey::from(server_static))
            .as_bytes(),
    );

    // Certificate chain binding the static key to the service; decrypting it
    // is part of the pattern even though this client does not pin it.
    let _certificate = state.decrypt_and_hash(&server_hello.payload)?;

    // -> s, se, payload
    let static_public = PublicKey::from(static_secret);
    let encrypted_static = state.encrypt_and_hash(static_public.as_bytes())?;
    state.mix_key(
        static_secret
            .diffie_hellman(&PublicKey::from(server_ephemeral))
            .as_bytes(),
    );
    let encrypted_payload = state.encrypt_and_hash(client_payload)?;

    let finish = HandshakeMessage {
        client_hello: None,
        server_hello: None,
        client_finish: Some(handshake_message::ClientFinish {
            r#static: encrypted_static,
            payload: encrypted_payload,
        }),
    };
    socket.send_frame(&finish.encode_to_vec()).await?;

    let (send, recv) = state.split();
    let (frame_sender, frame_receiver) = socket.split();
    tracing::debug!("Noise handshake complete");
    Ok(NoiseTransport {
        writer: NoiseWriter { frames: frame_sender, cipher: send },
        reader: NoiseReader { frames: frame_receiver, cipher: recv },
    })
}

fn fixed_key(bytes: &[u8], what: &str) -> Result<[u8; 32]> {
    <[u8; 32]>::try_from(bytes)
        .map_err(|_| TransportError::Handshake(format!("{what} is {} bytes", bytes.len())))
}

// ─── Post-split halves ───────────────────────────────────────────────────────

/// Encrypting send half. Callers must serialize access (one writer or an
/// external lock) so the counter nonce stays monotonic on the wire.
#[derive(Debug)]
pub struct NoiseWriter {
    frames: FrameSender,
    cipher: CipherState,
}

impl NoiseWriter {
    /// Encrypt and frame one payload.
    pub async fn send_payload(&mut self, plaintext: &[u8]) -> Result<()> {
        let ciphertext = self.cipher.encrypt(&[], plaintext)?;
        self.frames.send_frame(&ciphertext).await
    }

    pub async fn close(&mut self) {
        self.frames.close().await;
    }
}

/// Decrypting receive half, owned by the single reader task.
#[derive(Debug)]
pub struct NoiseReader {
    frames: FrameReceiver,
    cipher: CipherState,
}

impl NoiseReader {
    /// The next decrypted payload, in receive order. Any AEAD failure is
    /// fatal for the connection.
    pub async fn next_payload(&mut self) -> Result<Vec<u8>> {
        let frame = self.frames.next_frame().await?;
        self.cipher.decrypt(&[], &frame)
    }
}
