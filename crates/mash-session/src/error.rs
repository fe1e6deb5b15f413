// SPDX-License-Identifier: Apache-2.0 OR MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("authentication failure: {0}")]
    AuthFailure(String),

    #[error("timed out waiting for peer")]
    Timeout,

    #[error("commissioning proof rejected")]
    ProofRejected,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("pki error: {0}")]
    Pki(#[from] mash_pki::PkiError),

    #[error("codec error: {0}")]
    Codec(#[from] mash_codec::CodecError),

    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
