// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The dynamic value carried by attributes, command parameters, and command
//! results on and off the wire.
//!
//! All numeric attributes use integer milliunits (mW, mA, mWh, ...); there is
//! deliberately no floating-point variant.

use std::collections::BTreeMap;
use std::fmt;

/// A self-describing, tagged value.
///
/// Container-independent: the same variant set is used by the data model
/// (§3), the wire codec (§4.2), and command result maps (§9 design notes).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I64(i64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Keys are always strings on the wire; integer-keyed maps (e.g. the
    /// attribute-id -> value maps of Read/Write/Subscribe payloads) use the
    /// decimal string form of the id as the key.
    Map(BTreeMap<String, Value>),
}

/// The declared semantic type of an attribute or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    U8,
    U16,
    U32,
    U64,
    I64,
    Bool,
    String,
    Bytes,
    Array,
    Map,
    /// Plain u8 state enum.
    Enum,
    /// Bitmask u32 capability map.
    Bitmap,
}

impl Value {
    /// The largest unsigned integer value can be interpreted as.
    fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(*v as u64),
            Value::U16(v) => Some(*v as u64),
            Value::U32(v) => Some(*v as u64),
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// Coerce this value into `ty`, narrowing integer widths when the
    /// concrete value fits. This is the "coerce integer widths sanely" rule
    /// from §4.2: a u64 wire value is accepted into a u16 attribute iff it
    /// is in range.
    pub fn coerce(&self, ty: SemanticType) -> Option<Value> {
        match ty {
            SemanticType::Bool => match self {
                Value::Bool(b) => Some(Value::Bool(*b)),
                _ => None,
            },
            SemanticType::String => match self {
                Value::String(s) => Some(Value::String(s.clone())),
                _ => None,
            },
            SemanticType::Bytes => match self {
                Value::Bytes(b) => Some(Value::Bytes(b.clone())),
                _ => None,
            },
            SemanticType::Array => match self {
                Value::Array(a) => Some(Value::Array(a.clone())),
                _ => None,
            },
            SemanticType::Map => match self {
                Value::Map(m) => Some(Value::Map(m.clone())),
                _ => None,
            },
            SemanticType::I64 => match self {
                Value::I64(v) => Some(Value::I64(*v)),
                _ => self.as_u64().and_then(|v| i64::try_from(v).ok()).map(Value::I64),
            },
            SemanticType::U8 | SemanticType::Enum => {
                self.as_u64().filter(|v| *v <= u8::MAX as u64).map(|v| Value::U8(v as u8))
            }
            SemanticType::U16 => {
                self.as_u64().filter(|v| *v <= u16::MAX as u64).map(|v| Value::U16(v as u16))
            }
            SemanticType::U32 | SemanticType::Bitmap => {
                self.as_u64().filter(|v| *v <= u32::MAX as u64).map(|v| Value::U32(v as u32))
            }
            SemanticType::U64 => self.as_u64().map(Value::U64),
        }
    }

    pub fn matches_type(&self, ty: SemanticType) -> bool {
        self.coerce(ty).is_some()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            Value::Array(a) => write!(f, "[{} items]", a.len()),
            Value::Map(m) => write!(f, "{{{} entries}}", m.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_in_range_widths() {
        let v = Value::U64(42);
        assert_eq!(v.coerce(SemanticType::U16), Some(Value::U16(42)));
    }

    #[test]
    fn rejects_out_of_range_widths() {
        let v = Value::U64(70000);
        assert_eq!(v.coerce(SemanticType::U16), None);
    }

    #[test]
    fn rejects_type_mismatch() {
        let v = Value::String("x".into());
        assert_eq!(v.coerce(SemanticType::U8), None);
    }
}
