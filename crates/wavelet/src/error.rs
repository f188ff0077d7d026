//! Client error taxonomy.

use thiserror::Error;

use wavelet_codec::CodecError;
use wavelet_store::StoreError;
use wavelet_transport::TransportError;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced to library callers.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed")]
    Disconnected,

    #[error("Request canceled")]
    Canceled,

    #[error("Request timed out")]
    Timeout,

    /// Server answered an IQ with `<error code=… text=…/>`.
    #[error("{0}")]
    Iq(#[from] IqError),

    #[error("Pairing failed: {0}")]
    Pair(#[from] PairError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A server-reported IQ error: numeric code plus short text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("server returned error {code}: {text}")]
pub struct IqError {
    pub code: u16,
    pub text: String,
}

/// Failures of the pair-success flow. Each maps to an outbound `iq error`
/// and a [`crate::events::Event::PairError`] dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairError {
    #[error("Malformed device identity payload")]
    ProtoError,

    #[error("Device identity HMAC does not match the adv secret")]
    InvalidDeviceIdentityHmac,

    #[error("Account signature over the device identity is invalid")]
    InvalidDeviceSignature,

    #[error("Pairing refused by the pre-pair callback")]
    RejectedLocally,

    #[error("Failed to persist the paired identity: {0}")]
    Database(String),

    #[error("Failed to send the pairing confirmation: {0}")]
    SendFailed(String),
}
