//! Node → bytes serialization.

use crate::error::CodecError;
use crate::jid::Jid;
use crate::node::{AttrValue, Node, NodeContent};
use crate::token;

/// Longest string the length-prefixed form can carry.
const MAX_STRING_LEN: usize = i32::MAX as usize;
/// Longest run the packed (nibble / hex) forms can carry.
const MAX_PACKED_LEN: usize = 127;

/// Serialize a node, prefixed with the payload flag byte carrying the
/// dictionary version. This is the form that travels inside a transport
/// frame.
pub fn marshal(node: &Node) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![token::DICT_VERSION << 4];
    Writer { out: &mut out }.write_node(node)?;
    Ok(out)
}

/// Serialize a node without the flag byte.
pub fn encode(node: &Node) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(64);
    Writer { out: &mut out }.write_node(node)?;
    Ok(out)
}

struct Writer<'a> {
    out: &'a mut Vec<u8>,
}

impl Writer<'_> {
    fn write_node(&mut self, node: &Node) -> Result<(), CodecError> {
        if node.tag.is_empty() {
            return Err(CodecError::UnserializableValue("empty tag".into()));
        }
        if node.attrs.len() > 255 {
            return Err(CodecError::AttrCountOverflow(node.attrs.len()));
        }

        let size = 1 + 2 * node.attrs.len() + usize::from(node.content.is_some());
        self.write_list_size(size)?;
        self.write_string(&node.tag)?;

        for (key, value) in &node.attrs {
            self.write_string(key)?;
            self.write_attr_value(value)?;
        }

        match &node.content {
            None => {}
            Some(NodeContent::Bytes(bytes)) => self.write_bytes(bytes)?,
            Some(NodeContent::Nodes(children)) => {
                self.write_list_size(children.len())?;
                for child in children {
                    self.write_node(child)?;
                }
            }
        }
        Ok(())
    }

    fn write_attr_value(&mut self, value: &AttrValue) -> Result<(), CodecError> {
        match value {
            AttrValue::Jid(jid) => self.write_jid(jid),
            AttrValue::Bytes(bytes) => self.write_bytes(bytes),
            other => {
                let s = other
                    .as_wire_string()
                    .ok_or_else(|| CodecError::UnserializableValue(format!("{other:?}")))?;
                self.write_string(&s)
            }
        }
    }

    fn write_list_size(&mut self, size: usize) -> Result<(), CodecError> {
        match size {
            0 => self.out.push(token::LIST_EMPTY),
            1..=255 => {
                self.out.push(token::LIST_8);
                self.out.push(size as u8);
            }
            256..=65535 => {
                self.out.push(token::LIST_16);
                self.out.extend_from_slice(&(size as u16).to_be_bytes());
            }
            _ => return Err(CodecError::InvalidListLength(size)),
        }
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<(), CodecError> {
        if let Some(index) = token::index_of_single(s) {
            self.out.push(index);
            return Ok(());
        }
        if let Some((dictionary, index)) = token::index_of_double(s) {
            self.out.push(token::DICTIONARY_0 + dictionary);
            self.out.push(index);
            return Ok(());
        }
        if (1..=MAX_PACKED_LEN).contains(&s.len()) {
            if s.bytes().all(is_nibble_char) {
                return self.write_packed(token::NIBBLE_8, s, pack_nibble);
            }
            if s.bytes().all(is_hex_char) {
                return self.write_packed(token::HEX_8, s, pack_hex);
            }
        }
        self.write_bytes(s.as_bytes())
    }

    fn write_packed(
        &mut self,
        marker: u8,
        s: &str,
        pack: fn(u8) -> u8,
    ) -> Result<(), CodecError> {
        self.out.push(marker);
        let odd = s.len() % 2 == 1;
        let start = ((odd as u8) << 7) | (s.len().div_ceil(2) as u8);
        self.out.push(start);

        let bytes = s.as_bytes();
        for pair in bytes.chunks(2) {
            let hi = pack(pair[0]);
            let lo = if pair.len() == 2 { pack(pair[1]) } else { 0x0F };
            self.out.push((hi << 4) | lo);
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        match bytes.len() {
            0..=255 => {
                self.out.push(token::BINARY_8);
                self.out.push(bytes.len() as u8);
            }
            256..=0xF_FFFF => {
                self.out.push(token::BINARY_20);
                let len = bytes.len();
                self.out.push(((len >> 16) & 0x0F) as u8);
                self.out.push((len >> 8) as u8);
                self.out.push(len as u8);
            }
            len if len <= MAX_STRING_LEN => {
                self.out.push(token::BINARY_32);
                self.out.extend_from_slice(&(len as u32).to_be_bytes());
            }
            len => return Err(CodecError::StringTooLong(len)),
        }
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    fn write_jid(&mut self, jid: &Jid) -> Result<(), CodecError> {
        if jid.is_ad() {
            if jid.device > 255 {
                return Err(CodecError::UnserializableValue(format!(
                    "device index {} exceeds the AD-JID range",
                    jid.device
                )));
            }
            let agent = jid.wire_agent().ok_or_else(|| {
                CodecError::UnserializableValue(format!(
                    "server {:?} has no AD-JID form",
                    jid.server
                ))
            })?;
            self.out.push(token::AD_JID);
            self.out.push(agent);
            self.out.push(jid.device as u8);
            self.write_string(&jid.user)
        } else {
            self.out.push(token::JID_PAIR);
            if jid.user.is_empty() {
                self.out.push(token::LIST_EMPTY);
            } else {
                self.write_string(&jid.user)?;
            }
            self.write_string(&jid.server)
        }
    }
}

fn is_nibble_char(b: u8) -> bool {
    b.is_ascii_digit() || b == b'-' || b == b'.'
}

fn is_hex_char(b: u8) -> bool {
    b.is_ascii_digit() || (b'A'..=b'F').contains(&b)
}

fn pack_nibble(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'-' => 10,
        b'.' => 11,
        _ => unreachable!("caller checked the nibble charset"),
    }
}

fn pack_hex(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'A'..=b'F' => b - b'A' + 10,
        _ => unreachable!("caller checked the hex charset"),
    }
}
