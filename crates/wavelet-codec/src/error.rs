//! Codec-specific error types.

use thiserror::Error;

/// Errors produced while encoding or decoding binary stanzas.
#[derive(Debug, Error)]
pub enum CodecError {
    // ── Decode ──────────────────────────────────────────────────────────────

    #[error("Input ended before the value was complete (needed {needed} more bytes)")]
    Truncated { needed: usize },

    #[error("Unknown token 0x{0:02x}")]
    UnknownToken(u8),

    #[error("Unknown secondary dictionary entry {dictionary}/{index}")]
    UnknownDictionaryEntry { dictionary: u8, index: u8 },

    #[error("Invalid list length {0}")]
    InvalidListLength(usize),

    #[error("{remaining} trailing bytes after the decoded node")]
    TrailingBytes { remaining: usize },

    #[error("Invalid JID: {0}")]
    InvalidJid(String),

    #[error("Tag position held a non-string value")]
    NonStringTag,

    #[error("Unsupported payload version {0}")]
    ProtocolVersion(u8),

    #[error("Failed to inflate compressed payload: {0}")]
    Inflate(#[from] std::io::Error),

    // ── Encode ──────────────────────────────────────────────────────────────

    #[error("Node carries {0} attributes; at most 255 are encodable")]
    AttrCountOverflow(usize),

    #[error("String of {0} bytes exceeds the maximum encodable length")]
    StringTooLong(usize),

    #[error("Value cannot be serialized: {0}")]
    UnserializableValue(String),
}
