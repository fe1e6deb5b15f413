// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A single zone's limit assertion and the per-direction table of them
//! (§4.7).

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use thiserror::Error;

/// Hard cap on concurrently-asserting zones, shared with the §4.4 cert
/// store cap.
pub const MAX_ZONES: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArbitrationError {
    #[error("zone limit")]
    Exhausted,
}

/// One zone's assertion: `value_mw` is non-negative for a consumption
/// limit, non-positive for a production limit. `duration == None` means
/// the assertion never expires on its own (only an explicit clear removes
/// it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneValue {
    pub value_mw: i64,
    pub duration: Option<Duration>,
    pub set_at: SystemTime,
}

impl ZoneValue {
    pub fn new(value_mw: i64, duration: Option<Duration>, set_at: SystemTime) -> Self {
        Self { value_mw, duration, set_at }
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.duration.map(|d| self.set_at + d)
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        match self.expires_at() {
            Some(expiry) => now > expiry,
            None => false,
        }
    }
}

/// Per-direction table of concurrent zone assertions, keyed by `zoneId`.
#[derive(Debug, Default, Clone)]
pub struct MultiZoneValue {
    entries: HashMap<String, ZoneValue>,
}

impl MultiZoneValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, zone_id: impl Into<String>, value: ZoneValue) -> Result<(), ArbitrationError> {
        let zone_id = zone_id.into();
        if !self.entries.contains_key(&zone_id) && self.entries.len() >= MAX_ZONES {
            return Err(ArbitrationError::Exhausted);
        }
        self.entries.insert(zone_id, value);
        Ok(())
    }

    pub fn clear(&mut self, zone_id: &str) {
        self.entries.remove(zone_id);
    }

    /// Drops expired entries as of `now` (§4.7 expiry rule) and returns a
    /// snapshot of what remains, so resolution is pure over a snapshot
    /// (§5's "resolution is pure over a snapshot to keep lock hold time
    /// short").
    pub fn expire_and_snapshot(&mut self, now: SystemTime) -> Vec<(String, ZoneValue)> {
        self.entries.retain(|_, v| !v.is_expired(now));
        self.entries.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_max_zones() {
        let mut mzv = MultiZoneValue::new();
        let now = SystemTime::now();
        for i in 0..MAX_ZONES {
            mzv.set(format!("zone-{i}"), ZoneValue::new(1000, None, now)).unwrap();
        }
        assert_eq!(
            mzv.set("zone-overflow", ZoneValue::new(1000, None, now)),
            Err(ArbitrationError::Exhausted)
        );
        assert_eq!(mzv.len(), MAX_ZONES);
    }

    #[test]
    fn expiry_boundary() {
        let mut mzv = MultiZoneValue::new();
        let set_at = SystemTime::now();
        let d = Duration::from_secs(10);
        mzv.set("z", ZoneValue::new(5000, Some(d), set_at)).unwrap();

        let just_before = set_at + d - Duration::from_millis(1);
        assert_eq!(mzv.clone().expire_and_snapshot(just_before).len(), 1);

        let just_after = set_at + d + Duration::from_millis(1);
        assert_eq!(mzv.expire_and_snapshot(just_after).len(), 0);
    }
}
