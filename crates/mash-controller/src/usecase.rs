// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Use-case discovery (§4.8): a static registry maps well-known use cases
//! to the `(feature, attribute)` probes that must all resolve (on at
//! least one endpoint) for the use case to be considered supported, plus
//! the subscription set that use case wants established automatically.
//!
//! The endpoint table's exact content is out of this repository's scope
//! (§1 excludes "the per-feature domain attribute tables"), so probing
//! walks a small fixed endpoint range rather than parsing
//! `DeviceInfo.endpointTable` — an unsupported probe at a given endpoint
//! just comes back `InvalidFeature`/`InvalidAttribute`, which is
//! indistinguishable in cost from "not present" for this purpose.

use mash_codec::StatusCode;
use mash_core::model::FeatureType;
use mash_core::model::wellknown::{energy_control_attr, measurement_attr};

use crate::roster::ControllerClient;

/// The widest endpoint range a probe walks; real devices rarely exceed a
/// handful of endpoints.
const PROBE_ENDPOINTS: std::ops::RangeInclusive<u8> = 1..=8;

#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub feature: FeatureType,
    pub attribute_id: u16,
}

#[derive(Debug, Clone)]
pub struct SubscriptionSpec {
    pub feature: FeatureType,
    pub attribute_ids: Vec<u16>,
}

pub struct UseCase {
    pub name: &'static str,
    pub probes: Vec<Probe>,
    pub subscriptions: Vec<SubscriptionSpec>,
}

pub fn registry() -> Vec<UseCase> {
    vec![
        UseCase {
            name: "Energy Monitoring",
            probes: vec![Probe { feature: FeatureType::Measurement, attribute_id: measurement_attr::AC_ACTIVE_POWER }],
            subscriptions: vec![SubscriptionSpec {
                feature: FeatureType::Measurement,
                attribute_ids: vec![],
            }],
        },
        UseCase {
            name: "Limit-Power Consumption",
            probes: vec![Probe {
                feature: FeatureType::EnergyControl,
                attribute_id: energy_control_attr::EFFECTIVE_CONSUMPTION_LIMIT,
            }],
            subscriptions: vec![SubscriptionSpec {
                feature: FeatureType::EnergyControl,
                attribute_ids: vec![],
            }],
        },
        UseCase {
            name: "EV Charging Session",
            probes: vec![Probe { feature: FeatureType::ChargingSession, attribute_id: 0 }],
            subscriptions: vec![SubscriptionSpec {
                feature: FeatureType::ChargingSession,
                attribute_ids: vec![],
            }],
        },
    ]
}

/// Fallback when no use case matches (§4.8 "failure falls back to a
/// 'blind' default subscription on Measurement and EnergyControl on
/// endpoint 1").
pub fn blind_default_subscriptions() -> Vec<(u8, SubscriptionSpec)> {
    vec![
        (1, SubscriptionSpec { feature: FeatureType::Measurement, attribute_ids: vec![] }),
        (1, SubscriptionSpec { feature: FeatureType::EnergyControl, attribute_ids: vec![] }),
    ]
}

/// Probes every registered use case against `client`. Returns the matched
/// use cases (each paired with its declared subscriptions and the
/// endpoint they were found on) per §4.8's matching rule.
pub async fn discover(client: &ControllerClient) -> Vec<(&'static str, u8, Vec<SubscriptionSpec>)> {
    let mut matched = Vec::new();
    for use_case in registry() {
        let mut found_on: Option<u8> = None;
        let mut all_present = true;
        for probe in &use_case.probes {
            let mut present = false;
            for endpoint_id in PROBE_ENDPOINTS {
                if let Ok(resp) = client.read(endpoint_id, probe.feature as u8, &[probe.attribute_id]).await {
                    if resp.status == StatusCode::Success {
                        present = true;
                        found_on.get_or_insert(endpoint_id);
                        break;
                    }
                }
            }
            if !present {
                all_present = false;
                break;
            }
        }
        if all_present {
            if let Some(endpoint_id) = found_on {
                matched.push((use_case.name, endpoint_id, use_case.subscriptions));
            }
        }
    }
    matched
}
