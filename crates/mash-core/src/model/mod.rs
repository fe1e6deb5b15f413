// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The Device -> Endpoint -> Feature -> Attribute/Command tree (§3, §4.1).

pub mod attribute;
pub mod command;
pub mod device;
pub mod endpoint;
pub mod feature;
pub mod subscriber;
pub mod wellknown;

pub use attribute::{Access, AttributeDef, AttributeSlot, Constraint};
pub use command::{Command, CommandResult, ParamDef};
pub use device::Device;
pub use endpoint::{Endpoint, EndpointInfo};
pub use feature::{Feature, FeatureType};
pub use subscriber::{Subscriber, SubscriberRegistry};
