// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multi-zone limit arbitration, the `EnergyControl` state machine, and
//! the failsafe timer (§4.7).

pub mod control_state;
pub mod failsafe;
pub mod resolver;
pub mod zone_value;

pub use control_state::{transition, ControlState, Trigger};
pub use failsafe::{FailsafeLimits, FailsafeSnapshot, FailsafeState, FailsafeTimer};
pub use resolver::{bind_commands, Direction, ZoneArbitrator};
pub use zone_value::{ArbitrationError, MultiZoneValue, ZoneValue, MAX_ZONES};
