// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal, representative attribute tables for the well-known features.
//!
//! §1 explicitly scopes exhaustive per-feature domain attribute ID tables
//! out of this repository ("enumerated here by function, not by
//! exhaustive ID lists"). What's here is the subset needed to exercise
//! the protocol stack end to end: `DeviceInfo` (mandatory on endpoint 0),
//! `EnergyControl` (the arbitration write target, §4.7), and a
//! representative `Measurement` attribute used by the subscription and
//! end-to-end examples in §8.

use crate::model::attribute::{Access, AttributeDef, Constraint};
use crate::model::feature::{Feature, FeatureType};
use crate::value::{SemanticType, Value};

pub mod device_info_attr {
    pub const VENDOR_ID: u16 = 0;
    pub const PRODUCT_ID: u16 = 1;
    pub const DEVICE_ID: u16 = 2;
    pub const ENDPOINT_TABLE: u16 = 3;
}

pub mod energy_control_attr {
    pub const CONTROL_STATE: u16 = 0;
    pub const EFFECTIVE_CONSUMPTION_LIMIT: u16 = 1;
    pub const EFFECTIVE_PRODUCTION_LIMIT: u16 = 2;
    pub const OVERRIDE_REASON: u16 = 3;
    pub const OVERRIDE_DIRECTION: u16 = 4;
}

pub mod measurement_attr {
    pub const AC_ACTIVE_POWER: u16 = 0;
}

/// Endpoint 0's mandatory feature (§3).
pub fn device_info_feature(vendor_id: u32, product_id: u16) -> Feature {
    Feature::new(FeatureType::DeviceInfo, 1, 0)
        .with_attribute(
            AttributeDef::new(device_info_attr::VENDOR_ID, "vendorId", SemanticType::U32, Access::ReadOnly)
                .with_default(Value::U32(vendor_id)),
        )
        .with_attribute(
            AttributeDef::new(device_info_attr::PRODUCT_ID, "productId", SemanticType::U16, Access::ReadOnly)
                .with_default(Value::U16(product_id)),
        )
        .with_attribute(
            AttributeDef::new(device_info_attr::DEVICE_ID, "deviceId", SemanticType::String, Access::ReadOnly)
                .with_default(Value::String(crate::model::device::UNCOMMISSIONED_DEVICE_ID.to_string())),
        )
        .with_attribute(AttributeDef::new(
            device_info_attr::ENDPOINT_TABLE,
            "endpointTable",
            SemanticType::Array,
            Access::ReadOnly,
        ).with_default(Value::Array(Vec::new())))
}

/// `EnergyControl` (§4.7): the resolver's write target. Attributes start
/// in `AUTONOMOUS` / unset; `SetLimit`/`ClearLimit` commands are bound
/// after construction by the arbitration layer (`add_command`), once the
/// feature is behind an `Arc` the resolver can hold a weak handle to.
pub fn energy_control_feature() -> Feature {
    Feature::new(FeatureType::EnergyControl, 1, 0)
        .with_attribute(
            AttributeDef::new(energy_control_attr::CONTROL_STATE, "controlState", SemanticType::Enum, Access::ReadOnly)
                .with_default(Value::U8(0)),
        )
        .with_attribute(
            AttributeDef::new(
                energy_control_attr::EFFECTIVE_CONSUMPTION_LIMIT,
                "effectiveConsumptionLimit",
                SemanticType::U32,
                Access::ReadOnly,
            )
            .nullable()
            .with_unit("mW")
            .with_constraint(Constraint::Range { min: 0, max: u32::MAX as i64 }),
        )
        .with_attribute(
            AttributeDef::new(
                energy_control_attr::EFFECTIVE_PRODUCTION_LIMIT,
                "effectiveProductionLimit",
                SemanticType::I64,
                Access::ReadOnly,
            )
            .nullable()
            .with_unit("mW")
            .with_constraint(Constraint::Range { min: i64::MIN, max: 0 }),
        )
        .with_attribute(
            AttributeDef::new(energy_control_attr::OVERRIDE_REASON, "overrideReason", SemanticType::String, Access::ReadOnly)
                .nullable(),
        )
        .with_attribute(
            AttributeDef::new(
                energy_control_attr::OVERRIDE_DIRECTION,
                "overrideDirection",
                SemanticType::Enum,
                Access::ReadOnly,
            )
            .nullable(),
        )
}

/// Representative `Measurement` feature used by §8's subscription
/// scenarios.
pub fn measurement_feature() -> Feature {
    Feature::new(FeatureType::Measurement, 1, 0).with_attribute(
        AttributeDef::new(measurement_attr::AC_ACTIVE_POWER, "acActivePower", SemanticType::I64, Access::ReadOnly)
            .with_unit("mW")
            .with_default(Value::I64(0)),
    )
}
