//! Noise handshake envelope and the client payload carried encrypted in the
//! handshake finish.

/// Envelope for the three Noise XX flights.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HandshakeMessage {
    #[prost(message, optional, tag = "2")]
    pub client_hello: ::core::option::Option<handshake_message::ClientHello>,
    #[prost(message, optional, tag = "3")]
    pub server_hello: ::core::option::Option<handshake_message::ServerHello>,
    #[prost(message, optional, tag = "4")]
    pub client_finish: ::core::option::Option<handshake_message::ClientFinish>,
}

pub mod handshake_message {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ClientHello {
        #[prost(bytes = "vec", tag = "1")]
        pub ephemeral: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub r#static: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "3")]
        pub payload: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ServerHello {
        #[prost(bytes = "vec", tag = "1")]
        pub ephemeral: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub r#static: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "3")]
        pub payload: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ClientFinish {
        #[prost(bytes = "vec", tag = "1")]
        pub r#static: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub payload: ::prost::alloc::vec::Vec<u8>,
    }
}

/// Client payload delivered encrypted in the handshake finish. Exactly one
/// of the login fields (`username`/`device`) or `device_pairing_data` is
/// populated, depending on whether the device is already paired.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientPayload {
    #[prost(uint64, optional, tag = "1")]
    pub username: ::core::option::Option<u64>,
    #[prost(bool, optional, tag = "3")]
    pub passive: ::core::option::Option<bool>,
    #[prost(message, optional, tag = "5")]
    pub user_agent: ::core::option::Option<client_payload::UserAgent>,
    #[prost(string, optional, tag = "7")]
    pub push_name: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(enumeration = "client_payload::ConnectType", optional, tag = "12")]
    pub connect_type: ::core::option::Option<i32>,
    #[prost(enumeration = "client_payload::ConnectReason", optional, tag = "13")]
    pub connect_reason: ::core::option::Option<i32>,
    #[prost(uint32, optional, tag = "18")]
    pub device: ::core::option::Option<u32>,
    #[prost(message, optional, tag = "19")]
    pub device_pairing_data: ::core::option::Option<client_payload::DevicePairingRegistrationData>,
    #[prost(bool, optional, tag = "24")]
    pub pull: ::core::option::Option<bool>,
}

pub mod client_payload {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct UserAgent {
        #[prost(enumeration = "user_agent::Platform", optional, tag = "1")]
        pub platform: ::core::option::Option<i32>,
        #[prost(message, optional, tag = "2")]
        pub app_version: ::core::option::Option<user_agent::AppVersion>,
        #[prost(string, optional, tag = "5")]
        pub os_version: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(string, optional, tag = "6")]
        pub manufacturer: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(string, optional, tag = "7")]
        pub device: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(string, optional, tag = "9")]
        pub locale_language_iso_639_1: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(string, optional, tag = "10")]
        pub locale_country_iso_3166_1_alpha_2: ::core::option::Option<::prost::alloc::string::String>,
    }

    pub mod user_agent {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct AppVersion {
            #[prost(uint32, optional, tag = "1")]
            pub primary: ::core::option::Option<u32>,
            #[prost(uint32, optional, tag = "2")]
            pub secondary: ::core::option::Option<u32>,
            #[prost(uint32, optional, tag = "3")]
            pub tertiary: ::core::option::Option<u32>,
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum Platform {
            Web = 0,
            Ios = 1,
            Android = 2,
            Desktop = 3,
        }
    }

    /// Linked-device registration data, sent only while unpaired.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DevicePairingRegistrationData {
        /// Registration id, 4 bytes big-endian.
        #[prost(bytes = "vec", tag = "1")]
        pub e_regid: ::prost::alloc::vec::Vec<u8>,
        /// Key type marker (0x05 — curve25519).
        #[prost(bytes = "vec", tag = "2")]
        pub e_keytype: ::prost::alloc::vec::Vec<u8>,
        /// Identity public key.
        #[prost(bytes = "vec", tag = "3")]
        pub e_ident: ::prost::alloc::vec::Vec<u8>,
        /// Signed pre-key id, 3 bytes big-endian.
        #[prost(bytes = "vec", tag = "4")]
        pub e_skey_id: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "5")]
        pub e_skey_val: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "6")]
        pub e_skey_sig: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "7")]
        pub build_hash: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "8")]
        pub device_props: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ConnectType {
        CellularUnknown = 0,
        WifiUnknown = 1,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ConnectReason {
        Push = 0,
        UserActivated = 1,
        Scheduled = 2,
    }
}

/// Device metadata blob nested inside the registration data.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceProps {
    #[prost(string, optional, tag = "1")]
    pub os: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(message, optional, tag = "2")]
    pub version: ::core::option::Option<client_payload::user_agent::AppVersion>,
    #[prost(enumeration = "device_props::PlatformType", optional, tag = "3")]
    pub platform_type: ::core::option::Option<i32>,
    #[prost(bool, optional, tag = "4")]
    pub require_full_sync: ::core::option::Option<bool>,
}

pub mod device_props {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum PlatformType {
        Unknown = 0,
        Chrome = 1,
        Firefox = 2,
        Desktop = 3,
    }
}
