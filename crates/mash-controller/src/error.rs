// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Controller-level errors (§7): wraps every collaborator's error plus the
//! two conditions unique to roster management.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("session error: {0}")]
    Session(#[from] mash_session::SessionError),

    #[error("pki error: {0}")]
    Pki(#[from] mash_pki::PkiError),

    #[error(transparent)]
    Status(#[from] mash_interaction::StatusError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no device with id '{0}' in the roster")]
    UnknownDevice(String),

    #[error("state file version {0} is not supported")]
    UnsupportedStateVersion(u32),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
