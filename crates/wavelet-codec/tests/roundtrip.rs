//! Randomized round-trip coverage: decode is a left inverse of encode over
//! the codec's value domain, and arbitrary byte soup never panics.

use rand::prelude::*;

use wavelet_codec::{decode, encode, AttrValue, Jid, Node, NodeContent};

const TAGS: &[&str] = &["iq", "message", "receipt", "presence", "enc", "custom-tag"];
const KEYS: &[&str] = &["id", "type", "from", "to", "participant", "t", "extended_key"];

fn random_string(rng: &mut impl Rng) -> String {
    match rng.random_range(0..5) {
        // Dictionary hits.
        0 => ["result", "error", "available", "w:p"][rng.random_range(0..4)].to_owned(),
        // Nibble-packable.
        1 => format!("{}", rng.random_range(0u64..u64::MAX)),
        // Hex-packable.
        2 => format!("{:X}", rng.random_range(0u64..u64::MAX)),
        // Raw short.
        3 => (0..rng.random_range(1..20))
            .map(|_| rng.random_range(b'a'..=b'z') as char)
            .collect(),
        // Raw long (forces the length-prefixed form past one byte).
        _ => "x".repeat(rng.random_range(256..600)),
    }
}

fn random_jid(rng: &mut impl Rng) -> Jid {
    let user = format!("{}", rng.random_range(1_000_000u64..999_999_999_999));
    if rng.random_bool(0.5) {
        Jid::new_ad(user, if rng.random_bool(0.2) { 1 } else { 0 }, rng.random_range(0..100))
    } else {
        Jid::new(user, ["s.whatsapp.net", "g.us", "lid"][rng.random_range(0..3)])
    }
}

fn random_node(rng: &mut impl Rng, depth: u8) -> Node {
    let mut node = Node::new(TAGS[rng.random_range(0..TAGS.len())]);
    for key in KEYS.iter().take(rng.random_range(0..KEYS.len())) {
        let value = if rng.random_bool(0.3) {
            AttrValue::Jid(random_jid(rng))
        } else {
            AttrValue::String(random_string(rng))
        };
        node.attrs.insert((*key).to_owned(), value);
    }
    node.content = match rng.random_range(0..4) {
        0 => None,
        1 => {
            let len = rng.random_range(0..512);
            let mut bytes = vec![0u8; len];
            rng.fill_bytes(&mut bytes);
            Some(NodeContent::Bytes(bytes))
        }
        _ if depth < 3 => {
            let children = (0..rng.random_range(0..4))
                .map(|_| random_node(rng, depth + 1))
                .collect();
            Some(NodeContent::Nodes(children))
        }
        _ => None,
    };
    node
}

#[test]
fn decode_inverts_encode() {
    let mut rng = StdRng::seed_from_u64(0x77617665);
    for i in 0..1000 {
        let node = random_node(&mut rng, 0);
        let encoded = encode(&node).expect("encodable");
        let decoded = decode(&encoded).unwrap_or_else(|e| panic!("iteration {i}: {e}"));
        assert_eq!(decoded, node, "iteration {i}");
    }
}

#[test]
fn random_bytes_never_panic() {
    let mut rng = StdRng::seed_from_u64(0x6465636f);
    for _ in 0..2000 {
        let len = rng.random_range(0..256);
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        // Typed error or a valid node; panics fail the test by themselves.
        let _ = decode(&bytes);
    }
}

#[test]
fn mutated_encodings_fail_with_typed_errors() {
    let mut rng = StdRng::seed_from_u64(0xb17f11b);
    let node = Node::new("message")
        .attr("id", "3EB0D1A5")
        .attr("to", Jid::new("15551234567", "s.whatsapp.net"))
        .children(vec![Node::new("enc")
            .attr("v", "2")
            .attr("type", "pkmsg")
            .bytes(vec![0xDE, 0xAD, 0xBE, 0xEF])]);
    let encoded = encode(&node).unwrap();

    for _ in 0..500 {
        let mut mutated = encoded.clone();
        let at = rng.random_range(0..mutated.len());
        mutated[at] ^= 1 << rng.random_range(0..8);
        // Either it still decodes (the flipped bit landed in free bytes) or
        // it fails with a typed error; both are fine, panics are not.
        let _ = decode(&mutated);
    }
}

#[test]
fn message_stanza_round_trips_field_for_field() {
    let node = Node::new("message")
        .attr("to", Jid::new("u", "s.whatsapp.net"))
        .attr("id", "x")
        .children(vec![Node::new("enc")
            .attr("v", "2")
            .attr("type", "pkmsg")
            .bytes(vec![0xDE, 0xAD, 0xBE, 0xEF])]);

    let decoded = decode(&encode(&node).unwrap()).unwrap();
    assert_eq!(decoded.tag, "message");
    assert_eq!(decoded.attr_jid("to"), Some(Jid::new("u", "s.whatsapp.net")));
    assert_eq!(decoded.attr_string("id").as_deref(), Some("x"));
    let enc = decoded.child("enc").expect("enc child");
    assert_eq!(enc.attr_string("v").as_deref(), Some("2"));
    assert_eq!(enc.attr_string("type").as_deref(), Some("pkmsg"));
    assert_eq!(enc.content_bytes(), Some(&[0xDE, 0xAD, 0xBE, 0xEF][..]));
    assert_eq!(decoded, node);
}
