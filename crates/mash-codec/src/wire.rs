// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Self-describing tagged-value encoding (§4.2: "CBOR-style: integer-keyed
//! maps, typed scalars, explicit null, variable-length arrays").
//!
//! This is a purpose-built tag scheme, not literal CBOR: one byte tag
//! followed by a fixed or length-prefixed payload per variant. Decoding is
//! forward-compatible — an unrecognized key inside a decoded map is simply
//! left in the map for the caller to ignore, and an unrecognized *value*
//! tag is the only hard decode error, since there is no way to skip a
//! value of unknown shape.

use std::collections::BTreeMap;

use mash_core::Value;

use crate::error::{CodecError, Result};

/// Wire-size ceiling for any single length-prefixed field (string, bytes,
/// array count, map count). Generous enough for any real MASH payload;
/// guards a malicious/corrupt peer from claiming a multi-gigabyte
/// allocation from a 4-byte length field.
const MAX_WIRE_LEN: u32 = 16 * 1024 * 1024;

mod tag {
    pub const NULL: u8 = 0x00;
    pub const FALSE: u8 = 0x01;
    pub const TRUE: u8 = 0x02;
    pub const U8: u8 = 0x03;
    pub const U16: u8 = 0x04;
    pub const U32: u8 = 0x05;
    pub const U64: u8 = 0x06;
    pub const I64: u8 = 0x07;
    pub const STRING: u8 = 0x08;
    pub const BYTES: u8 = 0x09;
    pub const ARRAY: u8 = 0x0a;
    pub const MAP: u8 = 0x0b;
}

pub fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(tag::NULL),
        Value::Bool(false) => out.push(tag::FALSE),
        Value::Bool(true) => out.push(tag::TRUE),
        Value::U8(v) => {
            out.push(tag::U8);
            out.push(*v);
        }
        Value::U16(v) => {
            out.push(tag::U16);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::U32(v) => {
            out.push(tag::U32);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::U64(v) => {
            out.push(tag::U64);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::I64(v) => {
            out.push(tag::I64);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::String(s) => {
            out.push(tag::STRING);
            out.extend_from_slice(&(s.len() as u32).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(tag::BYTES);
            out.extend_from_slice(&(b.len() as u32).to_be_bytes());
            out.extend_from_slice(b);
        }
        Value::Array(items) => {
            out.push(tag::ARRAY);
            out.extend_from_slice(&(items.len() as u32).to_be_bytes());
            for item in items {
                encode_value(item, out);
            }
        }
        Value::Map(entries) => {
            out.push(tag::MAP);
            out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
            for (k, v) in entries {
                encode_value(&Value::String(k.clone()), out);
                encode_value(v, out);
            }
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn byte(&mut self, ctx: &'static str) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or(CodecError::Truncated(ctx))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize, ctx: &'static str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Truncated(ctx))?;
        let slice = self.buf.get(self.pos..end).ok_or(CodecError::Truncated(ctx))?;
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self, ctx: &'static str) -> Result<u32> {
        let bytes = self.take(4, ctx)?;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn len_prefix(&mut self, ctx: &'static str) -> Result<u32> {
        let n = self.u32(ctx)?;
        if n > MAX_WIRE_LEN {
            return Err(CodecError::LengthLimitExceeded(n));
        }
        Ok(n)
    }

    fn value(&mut self) -> Result<Value> {
        let t = self.byte("value tag")?;
        match t {
            tag::NULL => Ok(Value::Null),
            tag::FALSE => Ok(Value::Bool(false)),
            tag::TRUE => Ok(Value::Bool(true)),
            tag::U8 => Ok(Value::U8(self.byte("u8")?)),
            tag::U16 => Ok(Value::U16(u16::from_be_bytes(self.take(2, "u16")?.try_into().unwrap()))),
            tag::U32 => Ok(Value::U32(u32::from_be_bytes(self.take(4, "u32")?.try_into().unwrap()))),
            tag::U64 => Ok(Value::U64(u64::from_be_bytes(self.take(8, "u64")?.try_into().unwrap()))),
            tag::I64 => Ok(Value::I64(i64::from_be_bytes(self.take(8, "i64")?.try_into().unwrap()))),
            tag::STRING => {
                let len = self.len_prefix("string length")?;
                let bytes = self.take(len as usize, "string body")?;
                Ok(Value::String(
                    std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?.to_string(),
                ))
            }
            tag::BYTES => {
                let len = self.len_prefix("bytes length")?;
                Ok(Value::Bytes(self.take(len as usize, "bytes body")?.to_vec()))
            }
            tag::ARRAY => {
                let len = self.len_prefix("array length")?;
                let mut items = Vec::with_capacity(len.min(4096) as usize);
                for _ in 0..len {
                    items.push(self.value()?);
                }
                Ok(Value::Array(items))
            }
            tag::MAP => {
                let len = self.len_prefix("map length")?;
                let mut map = BTreeMap::new();
                for _ in 0..len {
                    let key = match self.value()? {
                        Value::String(s) => s,
                        _ => return Err(CodecError::MalformedEnvelope("map key must be a string")),
                    };
                    let value = self.value()?;
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

pub fn decode_value(buf: &[u8]) -> Result<(Value, usize)> {
    let mut cursor = Cursor { buf, pos: 0 };
    let value = cursor.value()?;
    Ok((value, cursor.pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Value) {
        let mut buf = Vec::new();
        encode_value(&v, &mut buf);
        let (decoded, consumed) = decode_value(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, v);
    }

    #[test]
    fn roundtrips_scalars() {
        roundtrip(Value::Null);
        roundtrip(Value::Bool(true));
        roundtrip(Value::U8(7));
        roundtrip(Value::U16(700));
        roundtrip(Value::U32(70000));
        roundtrip(Value::U64(u64::MAX));
        roundtrip(Value::I64(-42));
        roundtrip(Value::String("hello".into()));
        roundtrip(Value::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn roundtrips_nested_containers() {
        let mut map = BTreeMap::new();
        map.insert("1".to_string(), Value::U32(11_000_000));
        map.insert("nested".to_string(), Value::Array(vec![Value::U8(1), Value::Null]));
        roundtrip(Value::Map(map));
    }

    #[test]
    fn rejects_unknown_tag() {
        let buf = [0xffu8];
        assert!(matches!(decode_value(&buf), Err(CodecError::UnknownTag(0xff))));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let buf = [tag::U32, 0, 0];
        assert!(decode_value(&buf).is_err());
    }

    #[test]
    fn unknown_map_keys_survive_for_forward_compatibility() {
        let mut buf = Vec::new();
        let mut map = BTreeMap::new();
        map.insert("knownField".to_string(), Value::U8(1));
        map.insert("futureField".to_string(), Value::String("ignored by old code".into()));
        encode_value(&Value::Map(map), &mut buf);
        let (decoded, _) = decode_value(&buf).unwrap();
        match decoded {
            Value::Map(m) => {
                assert_eq!(m.get("knownField"), Some(&Value::U8(1)));
                assert!(m.contains_key("futureField"));
            }
            _ => panic!("expected map"),
        }
    }
}
