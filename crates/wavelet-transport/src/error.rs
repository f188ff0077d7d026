//! Transport error taxonomy. Everything here terminates the connection;
//! the session supervisor decides whether to reconnect.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    // ── Framing ─────────────────────────────────────────────────────────────

    #[error("Frame payload of {0} bytes exceeds the 3-byte length prefix")]
    FrameTooLarge(usize),

    #[error("Connection closed")]
    Disconnected,

    // ── Noise ───────────────────────────────────────────────────────────────

    #[error("Handshake did not complete within the deadline")]
    HandshakeTimeout,

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("AEAD failure on the transport cipher")]
    Decrypt,

    #[error("Transport nonce counter exhausted")]
    NonceExhausted,

    // ── Plumbing ────────────────────────────────────────────────────────────

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed handshake envelope: {0}")]
    Envelope(#[from] prost::DecodeError),
}
