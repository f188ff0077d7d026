//! JID addressing — `user@server` with optional agent and device index.
//!
//! Two forms travel on the wire: the plain user/server pair, and the
//! "AD" (agent-device) form that pins a stanza to one linked device.
//! The canonical text rendering is `user@server`, `user:device@server`,
//! or `user.agent:device@server` when an agent is present.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Server part of ordinary user JIDs.
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
/// Server part of pseudonymous (LID) JIDs.
pub const LID_SERVER: &str = "lid";
/// Server part of hosted-account JIDs.
pub const HOSTED_SERVER: &str = "hosted";
/// Server part of group JIDs.
pub const GROUP_SERVER: &str = "g.us";
/// Server part of broadcast-list JIDs.
pub const BROADCAST_SERVER: &str = "broadcast";
/// Server part of newsletter JIDs.
pub const NEWSLETTER_SERVER: &str = "newsletter";

/// A protocol address.
///
/// `agent`, `device`, and `integrator` are zero for plain JIDs. A non-zero
/// `device` (or `agent`) makes this an AD-JID, serialized with an explicit
/// device index so the server can route to a single linked device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub agent: u8,
    pub device: u16,
    pub integrator: u16,
}

impl Jid {
    /// Plain `user@server` JID.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self { user: user.into(), server: server.into(), ..Default::default() }
    }

    /// AD-JID with explicit agent and device index. The agent byte selects
    /// the namespace: 0 is the default user server, 1 the LID namespace,
    /// 2 the hosted namespace.
    pub fn new_ad(user: impl Into<String>, agent: u8, device: u16) -> Self {
        let server = match agent {
            1 => LID_SERVER,
            2 => HOSTED_SERVER,
            _ => DEFAULT_USER_SERVER,
        };
        Self {
            user: user.into(),
            server: server.to_owned(),
            agent,
            device,
            integrator: 0,
        }
    }

    /// Server-only JID (`s.whatsapp.net` itself, used as the `to` of IQs).
    pub fn server_jid() -> Self {
        Self::new("", DEFAULT_USER_SERVER)
    }

    /// Whether this is an AD-JID (carries a device index or agent).
    pub fn is_ad(&self) -> bool {
        self.agent != 0 || self.device != 0
    }

    /// The agent byte used on the wire for the AD-JID form, derived from
    /// the server namespace. `None` when the namespace has no AD form.
    pub fn wire_agent(&self) -> Option<u8> {
        match self.server.as_str() {
            DEFAULT_USER_SERVER => Some(0),
            LID_SERVER => Some(1),
            HOSTED_SERVER => Some(2),
            _ => None,
        }
    }

    /// Whether this JID lives in the pseudonymous LID namespace.
    pub fn is_lid(&self) -> bool {
        self.server == LID_SERVER
    }

    /// The same address with agent and device stripped (chat-level identity).
    pub fn to_non_ad(&self) -> Jid {
        Jid::new(self.user.clone(), self.server.clone())
    }

    /// Signal-protocol address string for this device: `user:device`.
    pub fn signal_address(&self) -> String {
        format!("{}:{}", self.user, self.device)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.user.is_empty() {
            return f.write_str(&self.server);
        }
        if self.agent != 0 {
            write!(f, "{}.{}:{}@{}", self.user, self.agent, self.device, self.server)
        } else if self.device != 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}

impl FromStr for Jid {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((user_part, server)) = s.split_once('@') else {
            // A bare server name is a valid JID with an empty user.
            return Ok(Jid::new("", s));
        };
        if server.is_empty() {
            return Err(CodecError::InvalidJid(s.to_owned()));
        }

        let (user_agent, device) = match user_part.split_once(':') {
            Some((ua, d)) => {
                let device = d
                    .parse::<u16>()
                    .map_err(|_| CodecError::InvalidJid(s.to_owned()))?;
                (ua, device)
            }
            None => (user_part, 0),
        };
        let (user, agent) = match user_agent.split_once('.') {
            Some((u, a)) => {
                let agent = a
                    .parse::<u8>()
                    .map_err(|_| CodecError::InvalidJid(s.to_owned()))?;
                (u, agent)
            }
            None => (user_agent, 0),
        };

        Ok(Jid {
            user: user.to_owned(),
            server: server.to_owned(),
            agent,
            device,
            integrator: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_jid_round_trips_through_text() {
        let jid = Jid::new("15551234567", DEFAULT_USER_SERVER);
        assert_eq!(jid.to_string(), "15551234567@s.whatsapp.net");
        assert_eq!("15551234567@s.whatsapp.net".parse::<Jid>().unwrap(), jid);
    }

    #[test]
    fn ad_jid_renders_device_and_agent() {
        let jid = Jid::new_ad("15551234567", 0, 4);
        assert_eq!(jid.to_string(), "15551234567:4@s.whatsapp.net");

        let hosted = Jid { agent: 1, ..jid.clone() };
        assert_eq!(hosted.to_string(), "15551234567.1:4@s.whatsapp.net");
        assert_eq!(hosted.to_string().parse::<Jid>().unwrap(), hosted);
    }

    #[test]
    fn bare_server_parses_to_empty_user() {
        let jid = "s.whatsapp.net".parse::<Jid>().unwrap();
        assert!(jid.user.is_empty());
        assert_eq!(jid.server, DEFAULT_USER_SERVER);
        assert_eq!(jid, Jid::server_jid());
    }

    #[test]
    fn garbage_device_index_is_rejected() {
        assert!("user:notanumber@s.whatsapp.net".parse::<Jid>().is_err());
    }
}
