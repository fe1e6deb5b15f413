// SPDX-License-Identifier: Apache-2.0 OR MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of buffer decoding {0}")]
    Truncated(&'static str),

    #[error("unknown value tag {0:#x}")]
    UnknownTag(u8),

    #[error("string is not valid utf-8")]
    InvalidUtf8,

    #[error("declared length {0} exceeds the wire size limit")]
    LengthLimitExceeded(u32),

    #[error("frame length {0} exceeds the maximum frame size")]
    FrameTooLarge(u32),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
