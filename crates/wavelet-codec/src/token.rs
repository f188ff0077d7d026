//! Token dictionary for the binary stanza format.
//!
//! Strings that appear in these tables are emitted as one byte (primary
//! dictionary) or two bytes (secondary dictionaries). The table contents are
//! pinned per protocol release; [`DICT_VERSION`] travels in the payload flag
//! byte and a peer speaking a different table version is rejected.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Version of the token tables below.
pub const DICT_VERSION: u8 = 3;

// Structural marker tokens. Values 3..=235 are primary-dictionary indices.
pub const LIST_EMPTY: u8 = 0;
pub const DICTIONARY_0: u8 = 236;
pub const DICTIONARY_1: u8 = 237;
pub const DICTIONARY_2: u8 = 238;
pub const DICTIONARY_3: u8 = 239;
pub const AD_JID: u8 = 247;
pub const LIST_8: u8 = 248;
pub const LIST_16: u8 = 249;
pub const JID_PAIR: u8 = 250;
pub const HEX_8: u8 = 251;
pub const BINARY_8: u8 = 252;
pub const BINARY_20: u8 = 253;
pub const BINARY_32: u8 = 254;
pub const NIBBLE_8: u8 = 255;

/// Flag bit marking a zlib-deflated payload.
pub const FLAG_COMPRESSED: u8 = 0x02;

/// Primary dictionary. Indices 0..=2 are reserved for the structural
/// tokens above and the legacy stream markers; real entries start at 3.
pub static SINGLE_BYTE_TOKENS: &[&str] = &[
    "",
    "xmlstreamstart",
    "xmlstreamend",
    "s.whatsapp.net",
    "type",
    "participant",
    "from",
    "receipt",
    "id",
    "notification",
    "disappearing_mode",
    "status",
    "jid",
    "broadcast",
    "user",
    "devices",
    "device_hash",
    "to",
    "offline",
    "message",
    "result",
    "class",
    "xmlns",
    "duration",
    "notify",
    "iq",
    "t",
    "ack",
    "g.us",
    "enc",
    "urn:xmpp:whatsapp:push",
    "presence",
    "config_value",
    "picture",
    "verified_name",
    "config_code",
    "key-index-list",
    "contacts",
    "available",
    "chatstate",
    "error",
    "ib",
    "get",
    "set",
    "unavailable",
    "composing",
    "recording",
    "paused",
    "device-list",
    "encrypt",
    "registration",
    "count",
    "w:profile:picture",
    "business",
    "verified_level",
    "usync",
    "sidelist",
    "lid",
    "call",
    "creation",
    "pair-device",
    "pair-success",
    "pair-device-sign",
    "device-identity",
    "device",
    "platform",
    "biz",
    "ref",
    "key-index",
    "success",
    "failure",
    "stream:error",
    "mode",
    "version",
    "props",
    "prop",
    "name",
    "value",
    "config",
    "w:p",
    "ping",
    "category",
    "add",
    "remove",
    "update",
    "query",
    "identity",
    "key",
    "skey",
    "list",
    "item",
    "index",
    "retry",
    "code",
    "text",
    "true",
    "false",
    "pkmsg",
    "msg",
    "media",
    "image",
    "video",
    "audio",
    "document",
    "sticker",
    "location",
    "vcard",
    "read",
    "played",
    "delivery",
    "sender",
    "recipient",
    "inactive",
    "active",
    "passive",
    "groups",
    "group",
    "subject",
    "body",
    "description",
    "invite",
    "member",
    "admin",
    "superadmin",
    "promote",
    "demote",
    "leave",
    "create",
    "delete",
    "announcement",
    "locked",
    "unlocked",
    "w:g2",
    "w:gp2",
    "encrypted",
    "web",
    "native_flags",
    "fallback_ip",
    "fallback_hostname",
    "expected_ts",
    "edge_routing",
    "routing_info",
    "offline_preview",
    "privacy",
    "background",
    "last",
    "before",
    "after",
    "seen",
    "server",
    "server_sync",
    "collection",
    "patch",
    "state",
    "snapshot",
    "mutation",
    "record",
    "hash",
    "prekeys",
    "signed_prekey",
    "prekey",
    "one_time",
    "timestamp",
    "reason",
    "appdata",
    "urn:xmpp:ping",
    "md-app-state",
    "md-msg-hist",
    "critical_block",
    "critical_unblock_low",
    "regular_high",
    "regular_low",
    "regular",
    "reaction",
    "poll",
    "edit",
    "revoke",
    "history",
    "peer",
    "peer_msg",
    "multicast",
    "stream",
    "features",
    "w:stats",
    "w:m",
    "w:biz",
    "account",
    "signature",
    "details",
    "verification",
    "newsletter",
    "interop",
];

/// Secondary dictionaries, addressed as `(DICTIONARY_n, index)`.
pub static DOUBLE_BYTE_TOKENS: &[&[&str]] = &[
    &[
        "media_conn",
        "host",
        "auth",
        "auth_ttl",
        "ttl",
        "max_buckets",
        "upload",
        "download",
        "download_buckets",
        "hostname",
        "fb_ip",
        "send_recv",
        "mms",
        "mms_vcard",
        "mms_image",
        "mms_video",
        "mms_document",
        "status_update",
        "sticker_pack",
        "w:b",
        "w:comms:chat",
        "sync",
        "dirty",
        "clean",
        "groups_v4_invite",
        "tctoken",
        "token_id",
        "refresh",
    ],
    &[
        "blocklist",
        "block",
        "unblock",
        "privacy_token",
        "tokens",
        "disable",
        "enable",
        "settings",
        "setting",
        "readreceipts",
        "profile",
        "about",
        "groupadd",
        "online",
        "match_last_seen",
        "contact_blacklist",
        "contact_whitelist",
        "default",
        "all",
        "none",
    ],
    &[
        "w:biz:catalog",
        "product",
        "catalog",
        "commerce",
        "order",
        "cart",
        "collection_limit",
        "item_limit",
        "width",
        "height",
    ],
    &[
        "newsletter_admin_count",
        "newsletter_create",
        "newsletter_delete",
        "newsletter_update",
        "mute",
        "unmute",
        "follow",
        "unfollow",
    ],
];

/// Reverse index for the primary dictionary. Index 0 maps the empty string;
/// the legacy stream markers at 1 and 2 are never emitted.
static SINGLE_TOKEN_INDEX: LazyLock<HashMap<&'static str, u8>> = LazyLock::new(|| {
    SINGLE_BYTE_TOKENS
        .iter()
        .enumerate()
        .skip(3)
        .map(|(i, s)| (*s, i as u8))
        .collect()
});

/// Reverse index for the secondary dictionaries.
static DOUBLE_TOKEN_INDEX: LazyLock<HashMap<&'static str, (u8, u8)>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for (dict, tokens) in DOUBLE_BYTE_TOKENS.iter().enumerate() {
        for (i, s) in tokens.iter().enumerate() {
            map.entry(*s).or_insert((dict as u8, i as u8));
        }
    }
    map
});

/// Primary-dictionary index of `s`, if present.
pub fn index_of_single(s: &str) -> Option<u8> {
    SINGLE_TOKEN_INDEX.get(s).copied()
}

/// Secondary-dictionary coordinates of `s`, if present.
pub fn index_of_double(s: &str) -> Option<(u8, u8)> {
    DOUBLE_TOKEN_INDEX.get(s).copied()
}

/// Entry `index` of the primary dictionary. Indices 0..=2 are not
/// addressable as strings.
pub fn single_token(index: u8) -> Option<&'static str> {
    if index < 3 {
        return None;
    }
    SINGLE_BYTE_TOKENS.get(index as usize).copied()
}

/// Entry `(dictionary, index)` of the secondary tables.
pub fn double_token(dictionary: u8, index: u8) -> Option<&'static str> {
    DOUBLE_BYTE_TOKENS
        .get(dictionary as usize)?
        .get(index as usize)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_dictionary_fits_token_space() {
        assert!(SINGLE_BYTE_TOKENS.len() <= DICTIONARY_0 as usize);
    }

    #[test]
    fn no_duplicate_primary_tokens() {
        // Every entry from index 3 on must resolve back to its own index.
        for (i, s) in SINGLE_BYTE_TOKENS.iter().enumerate().skip(3) {
            assert_eq!(index_of_single(s), Some(i as u8), "token {s:?}");
        }
    }

    #[test]
    fn double_tokens_resolve_both_ways() {
        for (dict, tokens) in DOUBLE_BYTE_TOKENS.iter().enumerate() {
            assert!(tokens.len() <= 256);
            for (i, s) in tokens.iter().enumerate() {
                assert_eq!(double_token(dict as u8, i as u8), Some(*s));
            }
        }
    }
}
