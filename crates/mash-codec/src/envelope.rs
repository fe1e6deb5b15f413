// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Request/Response/Notification envelopes (§4.2).

use std::collections::BTreeMap;

use mash_core::Value;

use crate::error::{CodecError, Result};
use crate::wire::{decode_value, encode_value};

/// `messageId == 0` is reserved for notifications (§4.2) and must never be
/// produced by a client id generator.
pub const NOTIFICATION_MESSAGE_ID: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read = 1,
    Write = 2,
    Subscribe = 3,
    Invoke = 4,
}

impl Operation {
    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            1 => Some(Operation::Read),
            2 => Some(Operation::Write),
            3 => Some(Operation::Subscribe),
            4 => Some(Operation::Invoke),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StatusCode {
    Success = 0,
    InvalidEndpoint = 1,
    InvalidFeature = 2,
    InvalidAttribute = 3,
    InvalidCommand = 4,
    InvalidParameter = 5,
    ConstraintError = 6,
    ReadOnly = 7,
    AccessDenied = 8,
    Unsupported = 9,
    Timeout = 10,
    InternalError = 11,
}

impl StatusCode {
    pub fn as_wire(self) -> u16 {
        self as u16
    }

    pub fn is_success(self) -> bool {
        matches!(self, StatusCode::Success)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub message_id: u32,
    pub operation: Operation,
    pub endpoint_id: u8,
    pub feature_id: u8,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub message_id: u32,
    pub status: StatusCode,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub subscription_id: u32,
    pub endpoint_id: u8,
    pub feature_id: u8,
    pub changes: BTreeMap<u16, Value>,
}

fn get<'a>(map: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key)
}

fn as_u32(v: &Value) -> Option<u32> {
    match v {
        Value::U8(x) => Some(*x as u32),
        Value::U16(x) => Some(*x as u32),
        Value::U32(x) => Some(*x),
        Value::U64(x) => u32::try_from(*x).ok(),
        _ => None,
    }
}

fn as_u16(v: &Value) -> Option<u16> {
    as_u32(v).and_then(|v| u16::try_from(v).ok())
}

fn as_u8(v: &Value) -> Option<u8> {
    as_u32(v).and_then(|v| u8::try_from(v).ok())
}

impl Request {
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("messageId".to_string(), Value::U32(self.message_id));
        map.insert("operation".to_string(), Value::U8(self.operation as u8));
        map.insert("endpointId".to_string(), Value::U8(self.endpoint_id));
        map.insert("featureId".to_string(), Value::U8(self.feature_id));
        map.insert("payload".to_string(), self.payload.clone());
        Value::Map(map)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Map(m) => m,
            _ => return Err(CodecError::MalformedEnvelope("request is not a map")),
        };
        let message_id = get(map, "messageId")
            .and_then(as_u32)
            .ok_or(CodecError::MalformedEnvelope("missing messageId"))?;
        let operation = get(map, "operation")
            .and_then(as_u8)
            .and_then(Operation::from_wire)
            .ok_or(CodecError::MalformedEnvelope("missing or unknown operation"))?;
        let endpoint_id = get(map, "endpointId")
            .and_then(as_u8)
            .ok_or(CodecError::MalformedEnvelope("missing endpointId"))?;
        let feature_id = get(map, "featureId")
            .and_then(as_u8)
            .ok_or(CodecError::MalformedEnvelope("missing featureId"))?;
        let payload = get(map, "payload").cloned().unwrap_or(Value::Null);
        Ok(Self { message_id, operation, endpoint_id, feature_id, payload })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_value(&self.to_value(), &mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (value, _) = decode_value(buf)?;
        Self::from_value(&value)
    }
}

impl Response {
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("messageId".to_string(), Value::U32(self.message_id));
        map.insert("status".to_string(), Value::U16(self.status.as_wire()));
        map.insert("payload".to_string(), self.payload.clone());
        Value::Map(map)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Map(m) => m,
            _ => return Err(CodecError::MalformedEnvelope("response is not a map")),
        };
        let message_id = get(map, "messageId")
            .and_then(as_u32)
            .ok_or(CodecError::MalformedEnvelope("missing messageId"))?;
        let status_wire = get(map, "status")
            .and_then(as_u16)
            .ok_or(CodecError::MalformedEnvelope("missing status"))?;
        let status = status_from_wire(status_wire);
        let payload = get(map, "payload").cloned().unwrap_or(Value::Null);
        Ok(Self { message_id, status, payload })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_value(&self.to_value(), &mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (value, _) = decode_value(buf)?;
        Self::from_value(&value)
    }

    pub fn error(message_id: u32, status: StatusCode, message: impl Into<String>) -> Self {
        let mut payload = BTreeMap::new();
        payload.insert("message".to_string(), Value::String(message.into()));
        Self { message_id, status, payload: Value::Map(payload) }
    }

    pub fn ok(message_id: u32, payload: Value) -> Self {
        Self { message_id, status: StatusCode::Success, payload }
    }
}

fn status_from_wire(v: u16) -> StatusCode {
    match v {
        0 => StatusCode::Success,
        1 => StatusCode::InvalidEndpoint,
        2 => StatusCode::InvalidFeature,
        3 => StatusCode::InvalidAttribute,
        4 => StatusCode::InvalidCommand,
        5 => StatusCode::InvalidParameter,
        6 => StatusCode::ConstraintError,
        7 => StatusCode::ReadOnly,
        8 => StatusCode::AccessDenied,
        9 => StatusCode::Unsupported,
        10 => StatusCode::Timeout,
        _ => StatusCode::InternalError,
    }
}

impl Notification {
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("messageId".to_string(), Value::U32(NOTIFICATION_MESSAGE_ID));
        map.insert("subscriptionId".to_string(), Value::U32(self.subscription_id));
        map.insert("endpointId".to_string(), Value::U8(self.endpoint_id));
        map.insert("featureId".to_string(), Value::U8(self.feature_id));
        let changes = self
            .changes
            .iter()
            .map(|(id, v)| (id.to_string(), v.clone()))
            .collect();
        map.insert("changes".to_string(), Value::Map(changes));
        Value::Map(map)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Map(m) => m,
            _ => return Err(CodecError::MalformedEnvelope("notification is not a map")),
        };
        let subscription_id = get(map, "subscriptionId")
            .and_then(as_u32)
            .ok_or(CodecError::MalformedEnvelope("missing subscriptionId"))?;
        let endpoint_id = get(map, "endpointId")
            .and_then(as_u8)
            .ok_or(CodecError::MalformedEnvelope("missing endpointId"))?;
        let feature_id = get(map, "featureId")
            .and_then(as_u8)
            .ok_or(CodecError::MalformedEnvelope("missing featureId"))?;
        let changes = match get(map, "changes") {
            Some(Value::Map(m)) => m
                .iter()
                .filter_map(|(k, v)| k.parse::<u16>().ok().map(|id| (id, v.clone())))
                .collect(),
            _ => BTreeMap::new(),
        };
        Ok(Self { subscription_id, endpoint_id, feature_id, changes })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_value(&self.to_value(), &mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (value, _) = decode_value(buf)?;
        Self::from_value(&value)
    }
}

/// Wraps a decoded envelope as either a response correlated to a prior
/// request, or an unsolicited notification, distinguishing purely by
/// `messageId` (§4.2).
#[derive(Debug, Clone)]
pub enum InboundEnvelope {
    Response(Response),
    Notification(Notification),
}

impl InboundEnvelope {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (value, _) = decode_value(buf)?;
        let map = match &value {
            Value::Map(m) => m,
            _ => return Err(CodecError::MalformedEnvelope("envelope is not a map")),
        };
        let message_id = get(map, "messageId").and_then(as_u32).unwrap_or(NOTIFICATION_MESSAGE_ID);
        if message_id == NOTIFICATION_MESSAGE_ID {
            Ok(InboundEnvelope::Notification(Notification::from_value(&value)?))
        } else {
            Ok(InboundEnvelope::Response(Response::from_value(&value)?))
        }
    }
}

/// Monotonically increasing message id generator that skips 0 and wraps
/// (§4.2). Not thread-safe by itself — callers serialize access (the
/// client wraps one behind a mutex).
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    next: u32,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next(&mut self) -> u32 {
        let id = if self.next == 0 { 1 } else { self.next };
        self.next = id.wrapping_add(1);
        if self.next == 0 {
            self.next = 1;
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips() {
        let req = Request {
            message_id: 42,
            operation: Operation::Write,
            endpoint_id: 1,
            feature_id: 3,
            payload: Value::Map(BTreeMap::new()),
        };
        let decoded = Request::decode(&req.encode()).unwrap();
        assert_eq!(decoded.message_id, 42);
        assert_eq!(decoded.operation, Operation::Write);
    }

    #[test]
    fn response_error_carries_message() {
        let resp = Response::error(7, StatusCode::ConstraintError, "out of range");
        let decoded = Response::decode(&resp.encode()).unwrap();
        assert_eq!(decoded.status, StatusCode::ConstraintError);
        match decoded.payload {
            Value::Map(m) => assert_eq!(m.get("message"), Some(&Value::String("out of range".into()))),
            _ => panic!("expected map payload"),
        }
    }

    #[test]
    fn notification_message_id_is_zero() {
        let mut changes = BTreeMap::new();
        changes.insert(5u16, Value::U32(11_000_000));
        let note = Notification { subscription_id: 1, endpoint_id: 1, feature_id: 2, changes };
        let value = note.to_value();
        match value {
            Value::Map(m) => assert_eq!(m.get("messageId"), Some(&Value::U32(0))),
            _ => panic!(),
        }
    }

    #[test]
    fn message_id_generator_skips_zero_and_wraps() {
        let mut gen = MessageIdGenerator { next: u32::MAX };
        let last = gen.next();
        assert_eq!(last, u32::MAX);
        let wrapped = gen.next();
        assert_eq!(wrapped, 1);
    }

    #[test]
    fn inbound_envelope_distinguishes_by_message_id() {
        let resp = Response::ok(5, Value::Null);
        match InboundEnvelope::decode(&resp.encode()).unwrap() {
            InboundEnvelope::Response(r) => assert_eq!(r.message_id, 5),
            _ => panic!("expected response"),
        }

        let mut changes = BTreeMap::new();
        changes.insert(1u16, Value::Bool(true));
        let note = Notification { subscription_id: 9, endpoint_id: 1, feature_id: 2, changes };
        match InboundEnvelope::decode(&note.encode()).unwrap() {
            InboundEnvelope::Notification(n) => assert_eq!(n.subscription_id, 9),
            _ => panic!("expected notification"),
        }
    }
}
