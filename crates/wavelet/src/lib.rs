//! # wavelet
//!
//! A linked-device client for the WhatsApp multi-device protocol. The
//! crate drives the full session lifecycle: WebSocket + Noise transport,
//! QR device pairing with identity counter-signing, request/response
//! correlation, and typed event fan-out, over a persistent SQLite device
//! store.
//!
//! Companion crates: [`wavelet_codec`] (binary stanzas), [`wavelet_proto`]
//! (pairing/handshake blobs), [`wavelet_store`] (persistence),
//! [`wavelet_transport`] (frames + Noise).
//!
//! See [`Client`] for the entry point.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod pair;
pub mod prekeys;
pub mod presence;
pub mod request;

mod handlers;
mod sender;
mod supervisor;

#[cfg(test)]
mod scenarios;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, IqError, PairError, Result};
pub use events::{Event, EventBus, EventStream};
pub use pair::PrePairCallback;
pub use presence::{ChatState, Presence};
pub use request::{InfoQuery, IqType};
pub use supervisor::SessionState;

pub use wavelet_codec::{Jid, Node, NodeContent};
pub use wavelet_store::Store;
