//! # wavelet-transport
//!
//! The encrypted byte channel under the stanza codec: 3-byte length-prefixed
//! frames over a WebSocket, with a Noise XX handshake installing per-
//! direction ChaCha20-Poly1305 cipher states.

pub mod error;
pub mod frame;
pub mod handshake;
pub mod noise;

pub use error::{Result, TransportError};
pub use frame::{FrameDecoder, FrameReceiver, FrameSender, FrameSocket, MAX_FRAME_PAYLOAD};
pub use handshake::{client_handshake, NoiseReader, NoiseTransport, NoiseWriter, HANDSHAKE_TIMEOUT};
pub use noise::{CipherState, HandshakeState, WIRE_HEADER};
