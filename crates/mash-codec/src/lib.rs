// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # mash-codec
//!
//! The wire format (§4.2, §6): a 4-byte length-prefixed frame carrying a
//! self-describing tagged-value payload, plus the Request/Response/
//! Notification envelope shapes layered on top of it.

pub mod envelope;
pub mod error;
pub mod framing;
pub mod wire;

pub use envelope::{
    InboundEnvelope, MessageIdGenerator, Notification, Operation, Request, Response, StatusCode,
    NOTIFICATION_MESSAGE_ID,
};
pub use error::CodecError;
pub use framing::{frame, read_frame, write_frame, MAX_FRAME_LEN};
pub use wire::{decode_value, encode_value};
