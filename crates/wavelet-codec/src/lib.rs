//! # wavelet-codec
//!
//! Encoder/decoder for the binary stanza format of the multi-device wire
//! protocol: a tree of tagged nodes with typed attributes, serialized
//! through a pinned token dictionary with packed string forms and optional
//! zlib compression.
//!
//! The decoded representation is [`Node`]; [`marshal`]/[`unmarshal`] are the
//! transport-facing pair (flag byte included), [`encode`]/[`decode`] the raw
//! pair.

pub mod decode;
pub mod encode;
pub mod error;
pub mod jid;
pub mod node;
pub mod token;

pub use decode::{decode, unmarshal, unpack};
pub use encode::{encode, marshal};
pub use error::CodecError;
pub use jid::Jid;
pub use node::{AttrValue, Node, NodeContent};
