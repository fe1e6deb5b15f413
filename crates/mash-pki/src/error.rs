// SPDX-License-Identifier: Apache-2.0 OR MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PkiError {
    #[error("certificate generation failed: {0}")]
    Generation(String),

    #[error("certificate parse failed: {0}")]
    Parse(String),

    #[error("certificate is expired")]
    Expired,

    #[error("certificate chain does not verify against the zone CA")]
    ChainInvalid,

    #[error("certificate's AuthorityKeyId does not match the zone CA's SubjectKeyId")]
    ZoneMismatch,

    #[error("maximum number of zones ({0}) reached")]
    Exhausted(usize),

    #[error("zone {0} not found in store")]
    ZoneNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PkiError>;
