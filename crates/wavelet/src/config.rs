//! Client configuration with builder-style setters.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_WS_URL: &str = "wss://web.whatsapp.com/ws/chat";
const DEFAULT_ORIGIN: &str = "https://web.whatsapp.com";

/// Tunables for one [`crate::Client`]. `Default` matches the production
/// service endpoints and the protocol's documented timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint.
    pub ws_url: String,
    /// Origin header presented at the WebSocket upgrade.
    pub origin: String,
    /// Default deadline for [`crate::Client::send_iq`].
    pub iq_timeout: Duration,
    /// Whole-pairing deadline, measured from QR emission.
    pub pair_timeout: Duration,
    /// Interval between protocol-level pings while connected.
    pub keepalive_interval: Duration,
    /// Reconnect backoff base delay.
    pub backoff_base: Duration,
    /// Reconnect backoff ceiling.
    pub backoff_cap: Duration,
    /// Fraction of the delay randomized away (0.0..1.0).
    pub backoff_jitter: f64,
    /// Whether the supervisor reconnects after unexpected disconnects.
    pub auto_reconnect: bool,
    /// Platform name reported in the handshake client payload.
    pub platform: String,
    /// OS name reported in the device props blob.
    pub os_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_owned(),
            origin: DEFAULT_ORIGIN.to_owned(),
            iq_timeout: Duration::from_secs(75),
            pair_timeout: Duration::from_secs(180),
            keepalive_interval: Duration::from_secs(30),
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(30),
            backoff_jitter: 0.2,
            auto_reconnect: true,
            platform: "web".to_owned(),
            os_name: "Wavelet".to_owned(),
        }
    }
}

impl ClientConfig {
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_iq_timeout(mut self, timeout: Duration) -> Self {
        self.iq_timeout = timeout;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_os_name(mut self, name: impl Into<String>) -> Self {
        self.os_name = name.into();
        self
    }
}
