// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Builds the device's model tree (§3): endpoint 0 carries `DeviceInfo`
//! (mandatory on every device); endpoint 1 hosts the representative
//! `EnergyControl` and `Measurement` features this repository implements
//! end to end. The `EnergyControl` feature comes back out alongside the
//! arbitrator bound to it, because `bind_commands` needs the feature
//! behind the same `Arc` the endpoint holds (§9 design note).

use std::sync::Arc;

use mash_core::model::endpoint::{Endpoint, EndpointInfo};
use mash_core::model::wellknown::{device_info_feature, energy_control_feature, measurement_feature};
use mash_core::model::{Device, Feature};
use mash_core::arbitration::{bind_commands, ZoneArbitrator};

pub struct DeviceTree {
    pub device: Arc<Device>,
    pub arbitrator: Arc<ZoneArbitrator>,
    pub energy_control: Arc<Feature>,
}

pub fn build(vendor_id: u32, product_id: u16) -> DeviceTree {
    let mut device = Device::new(vendor_id, product_id);

    let mut root = Endpoint::new(EndpointInfo { id: 0, device_type: "root", display_name: "root".to_string() });
    root.add_feature(device_info_feature(vendor_id, product_id)).expect("device_info is the first feature added");
    device.add_endpoint(root).expect("endpoint 0 is fresh");

    let mut main = Endpoint::new(EndpointInfo { id: 1, device_type: "energy-device", display_name: "main".to_string() });
    let energy_control = main.add_feature(energy_control_feature()).expect("energy_control is fresh on endpoint 1");
    main.add_feature(measurement_feature()).expect("measurement is fresh on endpoint 1");
    device.add_endpoint(main).expect("endpoint 1 is fresh");

    let arbitrator = ZoneArbitrator::new(Arc::downgrade(&energy_control));
    bind_commands(&energy_control, Arc::clone(&arbitrator));

    DeviceTree { device: Arc::new(device), arbitrator, energy_control }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mash_core::model::FeatureType;

    #[test]
    fn endpoint_zero_carries_device_info() {
        let tree = build(0xFFFF, 1);
        let endpoint = tree.device.get_endpoint(0).unwrap();
        assert!(endpoint.has_feature(FeatureType::DeviceInfo));
    }

    #[test]
    fn endpoint_one_carries_energy_control_and_measurement() {
        let tree = build(0xFFFF, 1);
        let endpoint = tree.device.get_endpoint(1).unwrap();
        assert!(endpoint.has_feature(FeatureType::EnergyControl));
        assert!(endpoint.has_feature(FeatureType::Measurement));
    }
}
