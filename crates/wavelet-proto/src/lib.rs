//! # wavelet-proto
//!
//! Protocol-buffer messages that travel as opaque byte blobs inside the
//! binary stanza protocol: the signed device-identity family exchanged
//! during pairing, the Noise handshake envelope, and the client payload
//! sent in the handshake finish.
//!
//! The message definitions are written as `prost` derives directly; the
//! field numbers are wire-compatible and must not be renumbered.

pub mod adv;
pub mod handshake;

pub use adv::{
    AdvDeviceIdentity, AdvEncryptionType, AdvSignedDeviceIdentity, AdvSignedDeviceIdentityHmac,
};
pub use handshake::{
    client_payload, handshake_message, ClientPayload, DeviceProps, HandshakeMessage,
};
