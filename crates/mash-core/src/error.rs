// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data-model error kinds (§7).

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("endpoint {0} not found")]
    EndpointNotFound(u8),

    #[error("endpoint {0} already exists")]
    EndpointDuplicate(u8),

    #[error("feature {0:?} not found on endpoint")]
    FeatureNotFound(crate::model::FeatureType),

    #[error("feature {0:?} already present on endpoint")]
    FeatureDuplicate(crate::model::FeatureType),

    #[error("attribute {0} not found")]
    AttributeNotFound(u16),

    #[error("attribute {0} is read-only")]
    ReadOnly(u16),

    #[error("attribute {0} is write-only")]
    WriteOnly(u16),

    #[error("value for attribute {0} does not match its declared type")]
    TypeMismatch(u16),

    #[error("value for attribute {0} violates a declared constraint")]
    ConstraintViolated(u16),

    #[error("attribute {0} is not nullable")]
    NotNullable(u16),

    #[error("command {0} not found")]
    CommandNotFound(u8),

    #[error("command {0} is missing required parameters")]
    InvalidParameters(u8),

    #[error("command {0} failed: {1}")]
    CommandFailed(u8, String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
