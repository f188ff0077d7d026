//! The ADV ("account device verification") identity blobs carried by the
//! `pair-success` stanza and persisted as the device's account record.

/// Outer container: HMAC-authenticated, serialized [`AdvSignedDeviceIdentity`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AdvSignedDeviceIdentityHmac {
    /// Serialized [`AdvSignedDeviceIdentity`].
    #[prost(bytes = "vec", tag = "1")]
    pub details: ::prost::alloc::vec::Vec<u8>,
    /// HMAC-SHA256 over (optional hosted prefix ‖ details) keyed with the
    /// adv secret shared at primary-device registration.
    #[prost(bytes = "vec", tag = "2")]
    pub hmac: ::prost::alloc::vec::Vec<u8>,
    #[prost(enumeration = "AdvEncryptionType", optional, tag = "3")]
    pub account_type: ::core::option::Option<i32>,
}

/// The doubly-signed device identity: account signature from the primary
/// device, device signature added by this client during pairing.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AdvSignedDeviceIdentity {
    /// Serialized [`AdvDeviceIdentity`].
    #[prost(bytes = "vec", tag = "1")]
    pub details: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub account_signature_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub account_signature: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub device_signature: ::prost::alloc::vec::Vec<u8>,
}

/// Innermost detail record naming this device's slot in the account.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AdvDeviceIdentity {
    #[prost(uint32, tag = "1")]
    pub raw_id: u32,
    #[prost(uint64, tag = "2")]
    pub timestamp: u64,
    #[prost(uint32, tag = "3")]
    pub key_index: u32,
    #[prost(enumeration = "AdvEncryptionType", optional, tag = "4")]
    pub account_type: ::core::option::Option<i32>,
}

/// Account credential model; hosted accounts sign under alternate prefixes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AdvEncryptionType {
    E2ee = 0,
    Hosted = 1,
}

impl AdvSignedDeviceIdentityHmac {
    /// Whether the container advertises a hosted account.
    pub fn is_hosted(&self) -> bool {
        self.account_type == Some(AdvEncryptionType::Hosted as i32)
    }
}
