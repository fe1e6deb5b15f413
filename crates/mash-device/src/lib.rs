// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # mash-device
//!
//! The device-role runtime (§4.5, §4.7): builds the model tree, runs the
//! commissioning and per-zone operational listeners, and ticks each
//! joined zone's failsafe clock. Discovery advertisement and the
//! transport itself are external collaborators (§1) — this crate binds
//! plain `TcpListener`s and leaves mDNS to whatever wraps it.

pub mod config;
pub mod error;
pub mod listener;
pub mod service;
pub mod tree;
pub mod zones;

pub use config::TuningConfig;
pub use error::DeviceError;
pub use service::{Config, DeviceService};
pub use tree::DeviceTree;
pub use zones::ZoneMembership;
