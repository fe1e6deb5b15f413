// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device-runtime errors (§7): wraps every collaborator's error plus the
//! conditions unique to zone membership.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("session error: {0}")]
    Session(#[from] mash_session::SessionError),

    #[error("pki error: {0}")]
    Pki(#[from] mash_pki::PkiError),

    #[error(transparent)]
    Status(#[from] mash_interaction::StatusError),

    #[error("model error: {0}")]
    Model(#[from] mash_core::ModelError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not a member of zone '{0}'")]
    UnknownZone(String),

    #[error("state file version {0} is not supported")]
    UnsupportedStateVersion(u32),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
