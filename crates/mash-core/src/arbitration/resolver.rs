// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multi-zone limit resolution and the `SetLimit`/`ClearLimit` commands
//! that drive it (§4.7).
//!
//! The resolver holds a *weak* handle to the `EnergyControl` feature it
//! writes into — the same weak-relation idiom used for change-notice
//! fan-out (§9 design notes) — so the feature (owned by the device tree)
//! and the resolver (owned by whoever runs the device's control loop) do
//! not form a strong reference cycle.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::arbitration::control_state::{transition, ControlState, Trigger};
use crate::arbitration::zone_value::{ArbitrationError, MultiZoneValue, ZoneValue};
use crate::model::command::{Command, ParamDef};
use crate::model::feature::Feature;
use crate::model::wellknown::energy_control_attr as attr;
use crate::value::{SemanticType, Value};
use crate::zone::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Consumption,
    Production,
}

struct ArbitratorState {
    consumption: MultiZoneValue,
    production: MultiZoneValue,
    control_state: ControlState,
    prior_non_override: ControlState,
    override_active: Option<(String, Option<Direction>)>,
}

pub struct ZoneArbitrator {
    feature: Weak<Feature>,
    state: Mutex<ArbitratorState>,
}

impl ZoneArbitrator {
    pub fn new(feature: Weak<Feature>) -> Arc<Self> {
        Arc::new(Self {
            feature,
            state: Mutex::new(ArbitratorState {
                consumption: MultiZoneValue::new(),
                production: MultiZoneValue::new(),
                control_state: ControlState::Autonomous,
                prior_non_override: ControlState::Autonomous,
                override_active: None,
            }),
        })
    }

    pub fn on_controller_connected(&self) {
        let mut state = self.state.lock();
        if state.control_state == ControlState::Autonomous {
            state.control_state = transition(
                ControlState::Autonomous,
                Trigger::ControllerConnected,
                state.prior_non_override,
            );
        }
        drop(state);
        self.recompute();
    }

    pub fn on_controller_disconnected(&self) {
        let mut state = self.state.lock();
        if state.control_state == ControlState::Controlled {
            state.control_state = transition(
                ControlState::Controlled,
                Trigger::ControllerDisconnected,
                state.prior_non_override,
            );
        }
    }

    pub fn assert_limit(
        &self,
        zone_id: &str,
        direction: Direction,
        value_mw: i64,
        duration: Option<Duration>,
        now: SystemTime,
    ) -> Result<(), ArbitrationError> {
        let zv = ZoneValue::new(value_mw, duration, now);
        let mut state = self.state.lock();
        match direction {
            Direction::Consumption => state.consumption.set(zone_id, zv)?,
            Direction::Production => state.production.set(zone_id, zv)?,
        }
        drop(state);
        self.recompute();
        Ok(())
    }

    pub fn clear_limit(&self, zone_id: &str, direction: Option<Direction>) {
        let mut state = self.state.lock();
        match direction {
            Some(Direction::Consumption) => state.consumption.clear(zone_id),
            Some(Direction::Production) => state.production.clear(zone_id),
            None => {
                state.consumption.clear(zone_id);
                state.production.clear(zone_id);
            }
        }
        drop(state);
        self.recompute();
    }

    pub fn assert_override(&self, zone_id: &str, reason: &str, direction: Option<Direction>) {
        let mut state = self.state.lock();
        if state.control_state != ControlState::Override {
            state.prior_non_override = state.control_state;
        }
        state.control_state = ControlState::Override;
        state.override_active = Some((zone_id.to_string(), direction));
        drop(state);
        self.write_override(Some(reason), direction);
        self.write_control_state();
    }

    pub fn clear_override(&self) {
        let mut state = self.state.lock();
        state.control_state = state.prior_non_override;
        state.override_active = None;
        drop(state);
        self.write_override(None, None);
        self.recompute();
    }

    pub fn is_override_active(&self) -> bool {
        self.state.lock().override_active.is_some()
    }

    /// Drops expired assertions, recomputes the "most restrictive wins"
    /// winners (§4.7), and writes them into the feature.
    pub fn recompute(&self) {
        self.recompute_at(SystemTime::now());
    }

    pub fn recompute_at(&self, now: SystemTime) {
        let mut state = self.state.lock();
        if state.control_state == ControlState::Override {
            return;
        }
        let consumption: Vec<(String, ZoneValue)> = state.consumption.expire_and_snapshot(now);
        let production: Vec<(String, ZoneValue)> = state.production.expire_and_snapshot(now);

        let effective_consumption = consumption.iter().map(|(_, v)| v.value_mw).min();
        let effective_production = production.iter().map(|(_, v)| v.value_mw).max();

        let any_limit = effective_consumption.is_some() || effective_production.is_some();
        let trigger = if any_limit { Trigger::LimitApplied } else { Trigger::LimitsCleared };
        state.control_state = transition(state.control_state, trigger, state.prior_non_override);
        drop(state);

        if let Some(feature) = self.feature.upgrade() {
            let _ = feature.set_value_internal(
                attr::EFFECTIVE_CONSUMPTION_LIMIT,
                effective_consumption.map(|v| Value::U32(v as u32)).unwrap_or(Value::Null),
            );
            let _ = feature.set_value_internal(
                attr::EFFECTIVE_PRODUCTION_LIMIT,
                effective_production.map(Value::I64).unwrap_or(Value::Null),
            );
        }
        self.write_control_state();
    }

    fn write_control_state(&self) {
        let control_state = self.state.lock().control_state;
        if let Some(feature) = self.feature.upgrade() {
            let _ = feature.set_value_internal(attr::CONTROL_STATE, Value::U8(control_state.as_wire()));
        }
    }

    fn write_override(&self, reason: Option<&str>, direction: Option<Direction>) {
        if let Some(feature) = self.feature.upgrade() {
            let reason_value = reason.map(|r| Value::String(r.to_string())).unwrap_or(Value::Null);
            let _ = feature.set_value_internal(attr::OVERRIDE_REASON, reason_value);
            let direction_value = direction
                .map(|d| Value::U8(match d { Direction::Consumption => 0, Direction::Production => 1 }))
                .unwrap_or(Value::Null);
            let _ = feature.set_value_internal(attr::OVERRIDE_DIRECTION, direction_value);
        }
    }

    pub fn control_state(&self) -> ControlState {
        self.state.lock().control_state
    }

    pub fn effective_consumption_limit(&self) -> Option<i64> {
        self.feature
            .upgrade()
            .and_then(|f| f.read_attribute(attr::EFFECTIVE_CONSUMPTION_LIMIT).ok())
            .and_then(|v| match v {
                Value::U32(v) => Some(v as i64),
                _ => None,
            })
    }

    pub fn effective_production_limit(&self) -> Option<i64> {
        self.feature
            .upgrade()
            .and_then(|f| f.read_attribute(attr::EFFECTIVE_PRODUCTION_LIMIT).ok())
            .and_then(|v| match v {
                Value::I64(v) => Some(v),
                _ => None,
            })
    }
}

fn parse_duration_secs(params: &BTreeMap<String, Value>) -> Option<Duration> {
    match params.get("durationSeconds") {
        Some(Value::U32(s)) => Some(Duration::from_secs(*s as u64)),
        Some(Value::U64(s)) => Some(Duration::from_secs(*s)),
        _ => None,
    }
}

/// Registers `SetLimit` and `ClearLimit` on `feature`, delegating to
/// `arbitrator`. Called once the feature is behind an `Arc` (see
/// `Feature::add_command`).
pub fn bind_commands(feature: &Arc<Feature>, arbitrator: Arc<ZoneArbitrator>) {
    let set_limit_arb = Arc::clone(&arbitrator);
    feature.add_command(Command::new(
        0,
        "SetLimit",
        vec![
            ParamDef::optional("consumptionLimit", SemanticType::U32),
            ParamDef::optional("productionLimit", SemanticType::I64),
            ParamDef::optional("durationSeconds", SemanticType::U32),
        ],
        move |params: &BTreeMap<String, Value>, ctx: &RequestContext| {
            let zone_id = ctx.zone_id.clone().ok_or_else(|| "no caller zone identity".to_string())?;
            let duration = parse_duration_secs(params);
            let now = SystemTime::now();
            let mut applied = false;
            if let Some(Value::U32(limit)) = params.get("consumptionLimit") {
                set_limit_arb
                    .assert_limit(&zone_id, Direction::Consumption, *limit as i64, duration, now)
                    .map_err(|e| e.to_string())?;
                applied = true;
            }
            if let Some(Value::I64(limit)) = params.get("productionLimit") {
                set_limit_arb
                    .assert_limit(&zone_id, Direction::Production, *limit, duration, now)
                    .map_err(|e| e.to_string())?;
                applied = true;
            }
            if !applied {
                return Err("SetLimit requires consumptionLimit and/or productionLimit".to_string());
            }
            let mut result = BTreeMap::new();
            result.insert("applied".to_string(), Value::Bool(true));
            if let Some(v) = set_limit_arb.effective_consumption_limit() {
                result.insert("effectiveConsumptionLimit".to_string(), Value::U32(v as u32));
            }
            if let Some(v) = set_limit_arb.effective_production_limit() {
                result.insert("effectiveProductionLimit".to_string(), Value::I64(v));
            }
            Ok(result)
        },
    ));

    let clear_limit_arb = arbitrator;
    feature.add_command(Command::new(
        1,
        "ClearLimit",
        vec![ParamDef::optional("direction", SemanticType::Enum)],
        move |params: &BTreeMap<String, Value>, ctx: &RequestContext| {
            let zone_id = ctx.zone_id.clone().ok_or_else(|| "no caller zone identity".to_string())?;
            let direction = match params.get("direction") {
                Some(Value::U8(0)) => Some(Direction::Consumption),
                Some(Value::U8(1)) => Some(Direction::Production),
                _ => None,
            };
            clear_limit_arb.clear_limit(&zone_id, direction);
            let mut result = BTreeMap::new();
            result.insert("applied".to_string(), Value::Bool(true));
            Ok(result)
        },
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::wellknown::energy_control_feature;

    fn arbitrator() -> (Arc<Feature>, Arc<ZoneArbitrator>) {
        let feature = Arc::new(energy_control_feature());
        let arbitrator = ZoneArbitrator::new(Arc::downgrade(&feature));
        bind_commands(&feature, Arc::clone(&arbitrator));
        (feature, arbitrator)
    }

    #[test]
    fn most_restrictive_consumption_wins() {
        let (_feature, arb) = arbitrator();
        let now = SystemTime::now();
        arb.assert_limit("grid", Direction::Consumption, 5000, None, now).unwrap();
        arb.assert_limit("local-a", Direction::Consumption, 3000, None, now).unwrap();
        arb.assert_limit("local-b", Direction::Consumption, 7000, None, now).unwrap();
        assert_eq!(arb.effective_consumption_limit(), Some(3000));
    }

    #[test]
    fn most_restrictive_production_wins() {
        let (_feature, arb) = arbitrator();
        let now = SystemTime::now();
        arb.assert_limit("a", Direction::Production, -5000, None, now).unwrap();
        arb.assert_limit("b", Direction::Production, -2000, None, now).unwrap();
        arb.assert_limit("c", Direction::Production, -8000, None, now).unwrap();
        assert_eq!(arb.effective_production_limit(), Some(-2000));
    }

    #[test]
    fn clearing_reverts_to_next_restrictive() {
        let (_feature, arb) = arbitrator();
        arb.on_controller_connected();
        let now = SystemTime::now();
        arb.assert_limit("grid", Direction::Consumption, 5000, None, now).unwrap();
        arb.assert_limit("local", Direction::Consumption, 3000, None, now).unwrap();
        assert_eq!(arb.effective_consumption_limit(), Some(3000));
        arb.clear_limit("local", None);
        assert_eq!(arb.effective_consumption_limit(), Some(5000));
        assert_eq!(arb.control_state(), ControlState::Limited);
    }

    #[test]
    fn clearing_all_limits_returns_to_controlled() {
        let (_feature, arb) = arbitrator();
        arb.on_controller_connected();
        let now = SystemTime::now();
        arb.assert_limit("grid", Direction::Consumption, 5000, None, now).unwrap();
        assert_eq!(arb.control_state(), ControlState::Limited);
        arb.clear_limit("grid", None);
        assert_eq!(arb.effective_consumption_limit(), None);
        assert_eq!(arb.control_state(), ControlState::Controlled);
    }

    #[test]
    fn override_supersedes_limits_and_restores() {
        let (_feature, arb) = arbitrator();
        arb.on_controller_connected();
        let now = SystemTime::now();
        arb.assert_limit("grid", Direction::Consumption, 5000, None, now).unwrap();
        assert_eq!(arb.control_state(), ControlState::Limited);
        arb.assert_override("grid", "failsafe", Some(Direction::Consumption));
        assert_eq!(arb.control_state(), ControlState::Override);
        assert!(arb.is_override_active());
        arb.clear_override();
        assert_eq!(arb.control_state(), ControlState::Limited);
    }

    #[test]
    fn set_limit_command_applies_and_reports() {
        let (feature, _arb) = arbitrator();
        let mut params = BTreeMap::new();
        params.insert("consumptionLimit".to_string(), Value::U32(11_000_000));
        let ctx = RequestContext::new("zone-a", crate::zone::ZoneType::Grid);
        let result = feature.invoke_command(0, &params, &ctx).unwrap();
        assert_eq!(result.get("applied"), Some(&Value::Bool(true)));
        assert_eq!(
            result.get("effectiveConsumptionLimit"),
            Some(&Value::U32(11_000_000))
        );
    }
}
