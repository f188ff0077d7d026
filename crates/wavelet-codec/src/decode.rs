//! Bytes → node deserialization. Strict: every malformed input maps to a
//! typed [`CodecError`], never a panic.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::CodecError;
use crate::jid::Jid;
use crate::node::{AttrValue, Node, NodeContent};
use crate::token;

/// Strip the payload flag byte, inflating when the compression bit is set,
/// and decode the node. Counterpart of [`crate::encode::marshal`].
pub fn unmarshal(payload: &[u8]) -> Result<Node, CodecError> {
    let unpacked = unpack(payload)?;
    decode(&unpacked)
}

/// Validate the flag byte and return the raw encoded node.
pub fn unpack(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let [flags, rest @ ..] = payload else {
        return Err(CodecError::Truncated { needed: 1 });
    };
    let version = flags >> 4;
    if version != token::DICT_VERSION {
        return Err(CodecError::ProtocolVersion(version));
    }
    if flags & token::FLAG_COMPRESSED != 0 {
        let mut inflated = Vec::with_capacity(rest.len() * 4);
        ZlibDecoder::new(rest).read_to_end(&mut inflated)?;
        Ok(inflated)
    } else {
        Ok(rest.to_vec())
    }
}

/// Decode one node from raw encoded bytes (no flag byte). Trailing bytes
/// after the node are an error.
pub fn decode(data: &[u8]) -> Result<Node, CodecError> {
    let mut reader = Reader { data, pos: 0 };
    let node = reader.read_node()?;
    let remaining = data.len() - reader.pos;
    if remaining != 0 {
        return Err(CodecError::TrailingBytes { remaining });
    }
    Ok(node)
}

/// An intermediate decoded scalar.
enum Value {
    Str(String),
    Jid(Jid),
    Bytes(Vec<u8>),
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn read_node(&mut self) -> Result<Node, CodecError> {
        let size_token = self.read_byte()?;
        let size = self.read_list_size(size_token)?;
        if size == 0 {
            return Err(CodecError::InvalidListLength(0));
        }

        let tag = match self.read_value()? {
            Value::Str(s) if !s.is_empty() => s,
            Value::Bytes(b) => {
                String::from_utf8(b).map_err(|_| CodecError::NonStringTag)?
            }
            _ => return Err(CodecError::NonStringTag),
        };

        let attr_count = (size - 1) / 2;
        let mut node = Node::new(tag);
        for _ in 0..attr_count {
            let key = match self.read_value()? {
                Value::Str(s) if !s.is_empty() => s,
                _ => return Err(CodecError::NonStringTag),
            };
            let value = match self.read_value()? {
                Value::Str(s) => AttrValue::String(s),
                Value::Jid(jid) => AttrValue::Jid(jid),
                Value::Bytes(b) => match String::from_utf8(b) {
                    Ok(s) => AttrValue::String(s),
                    Err(err) => AttrValue::Bytes(err.into_bytes()),
                },
            };
            node.attrs.insert(key, value);
        }

        // Odd remainder after tag + attrs means the node carries content.
        if (size - 1) % 2 == 1 {
            node.content = Some(self.read_content()?);
        }
        Ok(node)
    }

    fn read_content(&mut self) -> Result<NodeContent, CodecError> {
        let marker = self.peek_byte()?;
        if matches!(marker, token::LIST_EMPTY | token::LIST_8 | token::LIST_16) {
            let size_token = self.read_byte()?;
            let count = self.read_list_size(size_token)?;
            let mut children = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                children.push(self.read_node()?);
            }
            return Ok(NodeContent::Nodes(children));
        }
        match self.read_value()? {
            Value::Bytes(b) => Ok(NodeContent::Bytes(b)),
            Value::Str(s) => Ok(NodeContent::Bytes(s.into_bytes())),
            Value::Jid(jid) => Ok(NodeContent::Bytes(jid.to_string().into_bytes())),
        }
    }

    fn read_value(&mut self) -> Result<Value, CodecError> {
        let tok = self.read_byte()?;
        match tok {
            token::LIST_EMPTY => Ok(Value::Str(String::new())),
            3..=235 => token::single_token(tok)
                .map(|s| Value::Str(s.to_owned()))
                .ok_or(CodecError::UnknownToken(tok)),
            token::DICTIONARY_0..=token::DICTIONARY_3 => {
                let dictionary = tok - token::DICTIONARY_0;
                let index = self.read_byte()?;
                token::double_token(dictionary, index)
                    .map(|s| Value::Str(s.to_owned()))
                    .ok_or(CodecError::UnknownDictionaryEntry { dictionary, index })
            }
            token::BINARY_8 => {
                let len = self.read_byte()? as usize;
                Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
            }
            token::BINARY_20 => {
                let header = self.read_bytes(3)?;
                let len = ((header[0] as usize & 0x0F) << 16)
                    | ((header[1] as usize) << 8)
                    | header[2] as usize;
                Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
            }
            token::BINARY_32 => {
                let header = self.read_bytes(4)?;
                let len = u32::from_be_bytes(header.try_into().expect("4 bytes")) as usize;
                Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
            }
            token::NIBBLE_8 => self.read_packed(unpack_nibble).map(Value::Str),
            token::HEX_8 => self.read_packed(unpack_hex).map(Value::Str),
            token::JID_PAIR => {
                let user = match self.read_value()? {
                    Value::Str(s) => s,
                    Value::Bytes(b) => String::from_utf8(b)
                        .map_err(|_| CodecError::InvalidJid("non-utf8 user".into()))?,
                    Value::Jid(_) => {
                        return Err(CodecError::InvalidJid("nested JID".into()));
                    }
                };
                let server = match self.read_value()? {
                    Value::Str(s) if !s.is_empty() => s,
                    _ => return Err(CodecError::InvalidJid("missing server".into())),
                };
                Ok(Value::Jid(Jid::new(user, server)))
            }
            token::AD_JID => {
                let agent = self.read_byte()?;
                let device = self.read_byte()? as u16;
                let user = match self.read_value()? {
                    Value::Str(s) => s,
                    Value::Bytes(b) => String::from_utf8(b)
                        .map_err(|_| CodecError::InvalidJid("non-utf8 user".into()))?,
                    Value::Jid(_) => {
                        return Err(CodecError::InvalidJid("nested JID".into()));
                    }
                };
                let server = match agent {
                    0 => crate::jid::DEFAULT_USER_SERVER,
                    1 => crate::jid::LID_SERVER,
                    2 => crate::jid::HOSTED_SERVER,
                    other => {
                        return Err(CodecError::InvalidJid(format!(
                            "unknown AD-JID agent {other}"
                        )));
                    }
                };
                Ok(Value::Jid(Jid {
                    user,
                    server: server.to_owned(),
                    agent,
                    device,
                    integrator: 0,
                }))
            }
            other => Err(CodecError::UnknownToken(other)),
        }
    }

    fn read_packed(&mut self, unpack_one: fn(u8) -> Result<u8, CodecError>) -> Result<String, CodecError> {
        let start = self.read_byte()?;
        let odd = start & 0x80 != 0;
        let byte_count = (start & 0x7F) as usize;
        let packed = self.read_bytes(byte_count)?.to_vec();

        let mut out = Vec::with_capacity(byte_count * 2);
        for (i, byte) in packed.iter().enumerate() {
            out.push(unpack_one(byte >> 4)?);
            let lo = byte & 0x0F;
            let last = i == byte_count - 1;
            if last && odd {
                // Low nibble of the final byte is padding.
                continue;
            }
            out.push(unpack_one(lo)?);
        }
        String::from_utf8(out).map_err(|_| CodecError::UnknownToken(token::NIBBLE_8))
    }

    fn read_list_size(&mut self, tok: u8) -> Result<usize, CodecError> {
        match tok {
            token::LIST_EMPTY => Ok(0),
            token::LIST_8 => Ok(self.read_byte()? as usize),
            token::LIST_16 => {
                let bytes = self.read_bytes(2)?;
                Ok(u16::from_be_bytes(bytes.try_into().expect("2 bytes")) as usize)
            }
            other => Err(CodecError::UnknownToken(other)),
        }
    }

    fn peek_byte(&self) -> Result<u8, CodecError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(CodecError::Truncated { needed: 1 })
    }

    fn read_byte(&mut self) -> Result<u8, CodecError> {
        let byte = self.peek_byte()?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&[u8], CodecError> {
        let available = self.data.len() - self.pos;
        if len > available {
            return Err(CodecError::Truncated { needed: len - available });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

fn unpack_nibble(v: u8) -> Result<u8, CodecError> {
    match v {
        0..=9 => Ok(b'0' + v),
        10 => Ok(b'-'),
        11 => Ok(b'.'),
        other => Err(CodecError::UnknownToken(other)),
    }
}

fn unpack_hex(v: u8) -> Result<u8, CodecError> {
    match v {
        0..=9 => Ok(b'0' + v),
        10..=15 => Ok(b'A' + v - 10),
        _ => unreachable!("nibbles are 4 bits"),
    }
}
