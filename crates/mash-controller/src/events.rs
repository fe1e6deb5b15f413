// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Controller lifecycle events (§4.6), delivered to a single callback
//! registered by the caller rather than a typed pub/sub bus — the
//! controller service has exactly one consumer per process.

use std::sync::Arc;

use mash_core::Value;

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// A device was seen during a discovery scan (external collaborator,
    /// §6) but is not yet in the roster.
    DeviceDiscovered { discriminator: u16, host: String, port: u16, device_type: String },
    /// A previously-discovered, uncommissioned device dropped off
    /// discovery before it was commissioned.
    DeviceGone { discriminator: u16 },
    DeviceCommissioned { device_id: String },
    DeviceDecommissioned { device_id: String },
    DeviceConnected { device_id: String },
    DeviceDisconnected { device_id: String },
    /// A commissioned device reappeared under operational discovery
    /// after being gone.
    DeviceRediscovered { device_id: String },
    DeviceReconnected { device_id: String },
    ReconnectionFailed { device_id: String, reason: String },
    ValueChanged { device_id: String, endpoint_id: u8, feature_id: u8, attribute_id: u16, value: Value },
}

pub type EventSink = Arc<dyn Fn(ControllerEvent) + Send + Sync>;
