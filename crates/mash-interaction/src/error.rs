// SPDX-License-Identifier: Apache-2.0 OR MIT

use mash_codec::StatusCode;
use thiserror::Error;

/// The client-facing error surfaced by §4.3, built from the §4.2 status
/// code table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{status:?}: {message}")]
pub struct StatusError {
    pub status: StatusCode,
    pub message: String,
}

impl StatusError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, StatusError>;
