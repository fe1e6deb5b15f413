// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subscription object (§4.3): priming report is returned synchronously
//! from `handle_request`; everything after that — delta detection,
//! minInterval coalescing, maxInterval heartbeats — is driven by a
//! background tick that calls `poll()` on every live subscription. Pushing
//! the timing logic into a poll function (rather than firing async sends
//! from inside the synchronous `Subscriber::on_attribute_changed` callback)
//! keeps the feature's change fan-out lock-free of any I/O.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use mash_core::model::{Feature, FeatureType, Subscriber};
use mash_core::Value;

struct SubState {
    last_notify: Instant,
    last_known: BTreeMap<u16, Value>,
    pending: BTreeMap<u16, Value>,
}

pub struct Subscription {
    pub id: u32,
    pub endpoint_id: u8,
    pub feature_type: FeatureType,
    /// Empty means "all attributes of the feature, including future ones".
    pub attribute_ids: Vec<u16>,
    pub min_interval: Duration,
    pub max_interval: Duration,
    feature: Weak<Feature>,
    state: Mutex<SubState>,
}

impl Subscription {
    /// `priming` is the snapshot taken at subscribe time — the one and
    /// only guarantee of current state at t=0 (§4.3).
    pub fn new(
        id: u32,
        endpoint_id: u8,
        feature_type: FeatureType,
        feature: &Arc<Feature>,
        attribute_ids: Vec<u16>,
        min_interval: Duration,
        max_interval: Duration,
        priming: BTreeMap<u16, Value>,
    ) -> Self {
        Self {
            id,
            endpoint_id,
            feature_type,
            attribute_ids,
            min_interval,
            max_interval,
            feature: Arc::downgrade(feature),
            state: Mutex::new(SubState {
                last_notify: Instant::now(),
                last_known: priming,
                pending: BTreeMap::new(),
            }),
        }
    }

    fn matches(&self, attr_id: u16) -> bool {
        self.attribute_ids.is_empty() || self.attribute_ids.contains(&attr_id)
    }

    /// Called on a periodic tick (§4.3 min/maxInterval). Returns the
    /// changes to notify, if any: either a coalesced delta once
    /// `min_interval` has elapsed, or a full heartbeat once
    /// `max_interval` has elapsed with nothing sent.
    pub fn poll(&self, now: Instant) -> Option<BTreeMap<u16, Value>> {
        let mut state = self.state.lock();
        let since_last = now.saturating_duration_since(state.last_notify);

        if !state.pending.is_empty() && since_last >= self.min_interval {
            let changes = std::mem::take(&mut state.pending);
            state.last_notify = now;
            return Some(changes);
        }

        if since_last >= self.max_interval {
            let feature = self.feature.upgrade()?;
            let snapshot = feature.read_all_attributes();
            let values: BTreeMap<u16, Value> = snapshot
                .into_iter()
                .filter(|(id, _)| self.matches(*id))
                .collect();
            for (id, v) in &values {
                state.last_known.insert(*id, v.clone());
            }
            state.pending.clear();
            state.last_notify = now;
            return Some(values);
        }

        None
    }

    /// `true` once the subscription's feature has been dropped — the
    /// server prunes these lazily instead of needing an explicit signal.
    pub fn is_dangling(&self) -> bool {
        self.feature.upgrade().is_none()
    }

    pub fn feature(&self) -> Option<Arc<Feature>> {
        self.feature.upgrade()
    }
}

impl Subscriber for Subscription {
    fn on_attribute_changed(&self, feature_type: FeatureType, attr_id: u16, value: &Value) {
        if feature_type != self.feature_type || !self.matches(attr_id) {
            return;
        }
        let mut state = self.state.lock();
        if state.last_known.get(&attr_id) == Some(value) {
            return;
        }
        state.last_known.insert(attr_id, value.clone());
        state.pending.insert(attr_id, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mash_core::model::{AttributeDef, Access};
    use mash_core::SemanticType;

    fn sample_feature() -> Arc<Feature> {
        Arc::new(Feature::new(FeatureType::Measurement, 1, 0).with_attribute(
            AttributeDef::new(1, "acActivePower", SemanticType::U32, Access::ReadWrite).with_default(Value::U32(0)),
        ))
    }

    /// Builds a subscription and registers it with `feature`'s subscriber
    /// list so attribute writes actually reach `Subscription::
    /// on_attribute_changed` — without this the subscription only ever
    /// sees its priming snapshot.
    fn subscribe(
        feature: &Arc<Feature>,
        min_interval: Duration,
        max_interval: Duration,
    ) -> Arc<Subscription> {
        let priming = feature.read_all_attributes();
        let sub = Arc::new(Subscription::new(
            1,
            1,
            FeatureType::Measurement,
            feature,
            vec![],
            min_interval,
            max_interval,
            priming,
        ));
        feature.subscribe(Arc::downgrade(&sub) as Weak<dyn Subscriber>);
        sub
    }

    #[test]
    fn delta_minimality_only_changed_attribute_is_pending() {
        let feature = sample_feature();
        let sub = subscribe(&feature, Duration::ZERO, Duration::from_secs(60));
        feature.write_attribute(1, Value::U32(5000)).unwrap();
        let changes = sub.poll(Instant::now()).expect("a change should be pending");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get(&1), Some(&Value::U32(5000)));
    }

    #[test]
    fn min_interval_coalesces_rapid_changes_to_the_latest_value() {
        let feature = sample_feature();
        let sub = subscribe(&feature, Duration::from_secs(60), Duration::from_secs(600));
        feature.write_attribute(1, Value::U32(5000)).unwrap();
        feature.write_attribute(1, Value::U32(7000)).unwrap();
        feature.write_attribute(1, Value::U32(11_000)).unwrap();
        assert!(sub.poll(Instant::now()).is_none(), "min interval hasn't elapsed yet");

        let later = Instant::now() + Duration::from_secs(61);
        let changes = sub.poll(later).expect("coalesced change should flush");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get(&1), Some(&Value::U32(11_000)));
    }

    #[test]
    fn max_interval_heartbeats_with_no_changes() {
        let feature = sample_feature();
        let sub = subscribe(&feature, Duration::ZERO, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        let changes = sub.poll(Instant::now()).expect("heartbeat should fire");
        assert!(changes.contains_key(&1));
    }
}
