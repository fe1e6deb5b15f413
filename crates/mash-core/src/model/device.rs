// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device: the root container, identified by a `DeviceID` assigned at
//! commissioning.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{ModelError, Result};
use crate::model::endpoint::Endpoint;

/// Placeholder id carried by a device that has not yet been commissioned.
pub const UNCOMMISSIONED_DEVICE_ID: &str = "uncommissioned";

pub struct Device {
    device_id: RwLock<String>,
    pub vendor_id: u32,
    pub product_id: u16,
    endpoints: BTreeMap<u8, Endpoint>,
}

impl Device {
    pub fn new(vendor_id: u32, product_id: u16) -> Self {
        Self {
            device_id: RwLock::new(UNCOMMISSIONED_DEVICE_ID.to_string()),
            vendor_id,
            product_id,
            endpoints: BTreeMap::new(),
        }
    }

    pub fn device_id(&self) -> String {
        self.device_id.read().clone()
    }

    pub fn is_commissioned(&self) -> bool {
        *self.device_id.read() != UNCOMMISSIONED_DEVICE_ID
    }

    /// Adopts the assigned device id after commissioning (§4.5 step 5).
    pub fn adopt_device_id(&self, id: impl Into<String>) {
        *self.device_id.write() = id.into();
    }

    pub fn add_endpoint(&mut self, endpoint: Endpoint) -> Result<()> {
        let id = endpoint.info.id;
        if self.endpoints.contains_key(&id) {
            return Err(ModelError::EndpointDuplicate(id));
        }
        self.endpoints.insert(id, endpoint);
        Ok(())
    }

    pub fn get_endpoint(&self, id: u8) -> Result<&Endpoint> {
        self.endpoints.get(&id).ok_or(ModelError::EndpointNotFound(id))
    }

    pub fn endpoint_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.endpoints.keys().copied()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = (&u8, &Endpoint)> {
        self.endpoints.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::endpoint::EndpointInfo;

    #[test]
    fn root_endpoint_zero_reserved() {
        let mut device = Device::new(1, 1);
        device
            .add_endpoint(Endpoint::new(EndpointInfo {
                id: 0,
                device_type: "root",
                display_name: "root".into(),
            }))
            .unwrap();
        assert!(device.get_endpoint(0).is_ok());
        assert_eq!(
            device.add_endpoint(Endpoint::new(EndpointInfo {
                id: 0,
                device_type: "root",
                display_name: "root".into(),
            })),
            Err(ModelError::EndpointDuplicate(0))
        );
    }

    #[test]
    fn adopts_device_id_on_commission() {
        let device = Device::new(1, 1);
        assert!(!device.is_commissioned());
        device.adopt_device_id("ABCDEF0123456789");
        assert!(device.is_commissioned());
        assert_eq!(device.device_id(), "ABCDEF0123456789");
    }
}
