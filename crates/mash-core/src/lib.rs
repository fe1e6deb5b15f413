// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # mash-core
//!
//! The MASH device data model (Device -> Endpoint -> Feature ->
//! Attribute/Command, §3-§4.1) and multi-zone limit arbitration (§4.7).
//! Everything above this crate (codec, interaction, session, controller)
//! treats this as the source of truth for device state.

pub mod arbitration;
pub mod error;
pub mod model;
pub mod value;
pub mod zone;

pub use error::ModelError;
pub use value::{SemanticType, Value};
pub use zone::{RequestContext, ZoneType};
