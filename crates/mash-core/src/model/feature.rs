// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Feature: a named capability bag of attributes and commands.

use std::collections::BTreeMap;
use std::sync::Weak;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{ModelError, Result};
use crate::model::attribute::{AttributeDef, AttributeSlot};
use crate::model::command::Command;
use crate::model::subscriber::{Subscriber, SubscriberRegistry};
use crate::value::Value;
use crate::zone::RequestContext;

/// Well-known feature types (§3). Endpoint 0 always carries `DeviceInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FeatureType {
    DeviceInfo = 0,
    Electrical = 1,
    Measurement = 2,
    EnergyControl = 3,
    ChargingSession = 4,
    Status = 5,
    Signals = 6,
    Plan = 7,
}

struct FeatureState {
    attrs: IndexMap<u16, AttributeSlot>,
    commands: IndexMap<u8, Command>,
    subscribers: SubscriberRegistry,
}

/// A feature: revision, capability bitmap, attributes, commands, and a
/// subscriber registry for change fan-out. Attribute value, default, the
/// subscriber list, and the command table are all guarded by the single
/// lock below, per §5's "per-feature locks guard attribute value, default,
/// and subscriber list".
pub struct Feature {
    pub feature_type: FeatureType,
    pub revision: u16,
    pub feature_map: u32,
    state: RwLock<FeatureState>,
}

impl Feature {
    pub fn new(feature_type: FeatureType, revision: u16, feature_map: u32) -> Self {
        Self {
            feature_type,
            revision,
            feature_map,
            state: RwLock::new(FeatureState {
                attrs: IndexMap::new(),
                commands: IndexMap::new(),
                subscribers: SubscriberRegistry::new(),
            }),
        }
    }

    /// Construction-time only: adds an attribute initialized to its
    /// default. Panics on a duplicate id — this is a programmer error in
    /// the static feature table, not a runtime condition.
    pub fn with_attribute(mut self, def: AttributeDef) -> Self {
        let id = def.id;
        let slot = AttributeSlot::from_default(def)
            .unwrap_or_else(|e| panic!("invalid default for attribute {id}: {e}"));
        let state = self.state.get_mut();
        if state.attrs.insert(id, slot).is_some() {
            panic!("duplicate attribute id {id} on feature");
        }
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        let state = self.state.get_mut();
        if state.commands.insert(command.id, command).is_some() {
            panic!("duplicate command id on feature");
        }
        self
    }

    /// Registers a command after the feature has already been wrapped in
    /// an `Arc` — used when the handler needs a (weak) back-reference to
    /// the feature itself, e.g. the arbitration resolver's `SetLimit`
    /// handler (§4.7), which cannot be built before the `Arc<Feature>`
    /// exists.
    pub fn add_command(&self, command: Command) {
        let mut state = self.state.write();
        if state.commands.insert(command.id, command).is_some() {
            panic!("duplicate command id on feature");
        }
    }

    pub fn attribute_ids(&self) -> Vec<u16> {
        self.state.read().attrs.keys().copied().collect()
    }

    pub fn read_attribute(&self, id: u16) -> Result<Value> {
        let state = self.state.read();
        let slot = state.attrs.get(&id).ok_or(ModelError::AttributeNotFound(id))?;
        slot.read_value().cloned()
    }

    /// Reads every attribute the caller can read, silently skipping
    /// write-only ones (§4.3 Read: "silently skips unreadable ids" applies
    /// to the all-attributes case too).
    pub fn read_all_attributes(&self) -> BTreeMap<u16, Value> {
        let state = self.state.read();
        state
            .attrs
            .iter()
            .filter_map(|(id, slot)| slot.read_value().ok().map(|v| (*id, v.clone())))
            .collect()
    }

    pub fn write_attribute(&self, id: u16, value: Value) -> Result<Value> {
        let (confirmed, feature_type) = {
            let mut state = self.state.write();
            let slot = state.attrs.get_mut(&id).ok_or(ModelError::AttributeNotFound(id))?;
            let confirmed = slot.write_value(value)?;
            (confirmed, self.feature_type)
        };
        let state = self.state.read();
        state.subscribers.notify(feature_type, id, &confirmed);
        Ok(confirmed)
    }

    /// Firmware-driven update bypassing the write-access check (§4.1).
    pub fn set_value_internal(&self, id: u16, value: Value) -> Result<Value> {
        let (confirmed, feature_type) = {
            let mut state = self.state.write();
            let slot = state.attrs.get_mut(&id).ok_or(ModelError::AttributeNotFound(id))?;
            let confirmed = slot.set_value_internal(value)?;
            (confirmed, self.feature_type)
        };
        let state = self.state.read();
        state.subscribers.notify(feature_type, id, &confirmed);
        Ok(confirmed)
    }

    pub fn invoke_command(
        &self,
        id: u8,
        params: &BTreeMap<String, Value>,
        ctx: &RequestContext,
    ) -> Result<BTreeMap<String, Value>> {
        let state = self.state.read();
        let cmd = state.commands.get(&id).ok_or(ModelError::CommandNotFound(id))?;
        cmd.invoke(params, ctx)
    }

    pub fn subscribe(&self, subscriber: Weak<dyn Subscriber>) {
        self.state.write().subscribers.add(subscriber);
    }

    pub fn unsubscribe(&self, subscriber: &Weak<dyn Subscriber>) {
        self.state.write().subscribers.remove(subscriber);
    }
}

impl FeatureType {
    pub const ALL: [FeatureType; 8] = [
        FeatureType::DeviceInfo,
        FeatureType::Electrical,
        FeatureType::Measurement,
        FeatureType::EnergyControl,
        FeatureType::ChargingSession,
        FeatureType::Status,
        FeatureType::Signals,
        FeatureType::Plan,
    ];
}

impl FeatureType {
    /// Parses a wire feature id. Returns `None` for an id not in the
    /// well-known set, which the interaction server maps to the
    /// `InvalidFeature` status (§4.2).
    pub fn from_wire_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|ft| *ft as u8 == id)
    }
}

impl std::fmt::Debug for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feature")
            .field("feature_type", &self.feature_type)
            .field("revision", &self.revision)
            .field("feature_map", &self.feature_map)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute::Access;
    use crate::value::SemanticType;

    #[test]
    fn read_all_skips_write_only() {
        let feature = Feature::new(FeatureType::Status, 1, 0)
            .with_attribute(AttributeDef::new(1, "a", SemanticType::U16, Access::ReadOnly))
            .with_attribute(AttributeDef::new(2, "b", SemanticType::U16, Access::WriteOnly));
        let all = feature.read_all_attributes();
        assert!(all.contains_key(&1));
        assert!(!all.contains_key(&2));
    }

    #[test]
    fn write_fans_out_to_subscriber() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        struct Probe(AtomicU32);
        impl Subscriber for Probe {
            fn on_attribute_changed(&self, _ft: FeatureType, _id: u16, value: &Value) {
                if let Value::U16(v) = value {
                    self.0.store(*v as u32, Ordering::SeqCst);
                }
            }
        }

        let feature = Feature::new(FeatureType::Status, 1, 0)
            .with_attribute(AttributeDef::new(1, "a", SemanticType::U16, Access::ReadWrite));
        let probe = Arc::new(Probe(AtomicU32::new(0)));
        feature.subscribe(Arc::downgrade(&probe) as Weak<dyn Subscriber>);
        feature.write_attribute(1, Value::U16(7)).unwrap();
        assert_eq!(probe.0.load(Ordering::SeqCst), 7);
    }
}
