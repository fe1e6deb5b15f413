// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change-notice fan-out.
//!
//! A `Feature` owns a registry of *weak* handles to subscribers (§9 design
//! notes: cyclic ownership between feature and subscriber is broken by
//! making the feature-side registry a weak relation). The strong owner of a
//! `Subscriber` is always the interaction server (§4.3); a feature never
//! keeps a subscriber alive.

use std::sync::{Arc, Weak};

use crate::model::FeatureType;
use crate::value::Value;

/// Implemented by whatever owns a live subscription at the interaction
/// layer. Held by the feature only for dispatch.
pub trait Subscriber: Send + Sync {
    fn on_attribute_changed(&self, feature_type: FeatureType, attr_id: u16, value: &Value);
}

#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Vec<Weak<dyn Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscriber: Weak<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Drop any handle matching `target` (used by unsubscribe), and prune
    /// any handle whose subscriber has already been dropped.
    pub fn remove(&mut self, target: &Weak<dyn Subscriber>) {
        self.subscribers.retain(|s| {
            match (s.upgrade(), target.upgrade()) {
                (Some(a), Some(b)) => !Arc::ptr_eq(&a, &b),
                _ => s.strong_count() > 0,
            }
        });
    }

    pub fn notify(&self, feature_type: FeatureType, attr_id: u16, value: &Value) {
        for sub in &self.subscribers {
            if let Some(sub) = sub.upgrade() {
                sub.on_attribute_changed(feature_type, attr_id, value);
            }
        }
    }

    pub fn prune(&mut self) {
        self.subscribers.retain(|s| s.strong_count() > 0);
    }
}
