// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # mash-controller
//!
//! The controller-role service (§4.6): Zone CA ownership, device
//! commissioning, the roster, use-case discovery (§4.8), and reconnect
//! with backoff. Discovery itself and the CLI are external collaborators
//! (§1) — this crate is driven by a thin binary, not the other way round.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod roster;
pub mod usecase;

pub use config::TuningConfig;
pub use controller::{Config, ControllerService, ControllerState};
pub use error::ControllerError;
pub use events::{ControllerEvent, EventSink};
pub use roster::{Roster, RosterEntry, RosterSnapshot};
