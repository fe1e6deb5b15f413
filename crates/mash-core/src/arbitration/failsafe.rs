// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-zone-membership failsafe timer (§4.7).
//!
//! Each zone a device is commissioned into gets its own timer. Silence
//! past `duration` trips it; the device then clamps itself to the
//! zone's pre-configured failsafe limits and enters `OVERRIDE`.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::zone::ZoneType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailsafeState {
    Armed,
    Tripped,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailsafeLimits {
    pub consumption_limit_mw: Option<i64>,
    pub production_limit_mw: Option<i64>,
}

pub struct FailsafeTimer {
    pub zone_id: String,
    pub zone_type: ZoneType,
    pub duration: Duration,
    pub configured_limits: FailsafeLimits,
    last_contact: SystemTime,
    state: FailsafeState,
}

/// On-disk shape for "restart resumes from `remaining`, not from zero"
/// (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailsafeSnapshot {
    pub zone_id: String,
    pub zone_type: String,
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub tripped: bool,
    pub configured_limits: FailsafeLimits,
}

impl FailsafeTimer {
    pub fn new(zone_id: impl Into<String>, zone_type: ZoneType, duration: Duration, limits: FailsafeLimits, now: SystemTime) -> Self {
        Self {
            zone_id: zone_id.into(),
            zone_type,
            duration,
            configured_limits: limits,
            last_contact: now,
            state: FailsafeState::Armed,
        }
    }

    /// Any successful operation from this zone's controller resets the
    /// timer (§4.7).
    pub fn on_contact(&mut self, now: SystemTime) {
        self.last_contact = now;
    }

    /// A trip can only be cleared by contact from a controller of
    /// equal-or-higher priority than the zone that tripped it. Returns
    /// `true` if it cleared.
    pub fn try_clear(&mut self, caller_zone_type: ZoneType, now: SystemTime) -> bool {
        if self.state != FailsafeState::Tripped {
            return false;
        }
        if caller_zone_type == self.zone_type || caller_zone_type.outranks(self.zone_type) {
            self.state = FailsafeState::Armed;
            self.last_contact = now;
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> FailsafeState {
        self.state
    }

    pub fn remaining(&self, now: SystemTime) -> Duration {
        let elapsed = now.duration_since(self.last_contact).unwrap_or(Duration::ZERO);
        self.duration.saturating_sub(elapsed)
    }

    /// Advances the timer. Returns the configured limits to clamp to the
    /// moment it trips (idempotent once tripped — returns `None` on
    /// subsequent calls until cleared).
    pub fn tick(&mut self, now: SystemTime) -> Option<FailsafeLimits> {
        if self.state == FailsafeState::Armed && self.remaining(now) == Duration::ZERO {
            self.state = FailsafeState::Tripped;
            return Some(self.configured_limits);
        }
        None
    }

    pub fn save(&self, now: SystemTime) -> FailsafeSnapshot {
        FailsafeSnapshot {
            zone_id: self.zone_id.clone(),
            zone_type: self.zone_type.label().to_string(),
            duration_secs: self.duration.as_secs(),
            remaining_secs: self.remaining(now).as_secs(),
            tripped: self.state == FailsafeState::Tripped,
            configured_limits: self.configured_limits,
        }
    }

    /// Rebuilds a timer from a snapshot, resuming from `remaining_secs`
    /// rather than restarting the full duration.
    pub fn restore(snapshot: FailsafeSnapshot, now: SystemTime) -> Option<Self> {
        let zone_type = ZoneType::from_label(&snapshot.zone_type)?;
        let duration = Duration::from_secs(snapshot.duration_secs);
        let elapsed = duration.saturating_sub(Duration::from_secs(snapshot.remaining_secs));
        let last_contact = now.checked_sub(elapsed).unwrap_or(now);
        Some(Self {
            zone_id: snapshot.zone_id,
            zone_type,
            duration,
            configured_limits: snapshot.configured_limits,
            last_contact,
            state: if snapshot.tripped { FailsafeState::Tripped } else { FailsafeState::Armed },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_silence() {
        let now = SystemTime::now();
        let mut timer = FailsafeTimer::new(
            "grid",
            ZoneType::Grid,
            Duration::from_secs(10),
            FailsafeLimits { consumption_limit_mw: Some(0), production_limit_mw: None },
            now,
        );
        assert!(timer.tick(now + Duration::from_secs(5)).is_none());
        let tripped = timer.tick(now + Duration::from_secs(11));
        assert!(tripped.is_some());
        assert_eq!(timer.state(), FailsafeState::Tripped);
    }

    #[test]
    fn lower_priority_contact_does_not_clear() {
        let now = SystemTime::now();
        let mut timer = FailsafeTimer::new(
            "grid",
            ZoneType::Grid,
            Duration::from_secs(10),
            FailsafeLimits::default(),
            now,
        );
        timer.tick(now + Duration::from_secs(11));
        assert!(!timer.try_clear(ZoneType::Local, now + Duration::from_secs(12)));
        assert_eq!(timer.state(), FailsafeState::Tripped);
    }

    #[test]
    fn equal_or_higher_priority_clears() {
        let now = SystemTime::now();
        let mut timer = FailsafeTimer::new(
            "grid",
            ZoneType::Grid,
            Duration::from_secs(10),
            FailsafeLimits::default(),
            now,
        );
        timer.tick(now + Duration::from_secs(11));
        assert!(timer.try_clear(ZoneType::Grid, now + Duration::from_secs(12)));
        assert_eq!(timer.state(), FailsafeState::Armed);
    }

    #[test]
    fn restart_resumes_from_remaining() {
        let now = SystemTime::now();
        let mut timer = FailsafeTimer::new(
            "grid",
            ZoneType::Grid,
            Duration::from_secs(100),
            FailsafeLimits::default(),
            now,
        );
        timer.on_contact(now + Duration::from_secs(40));
        let snapshot = timer.save(now + Duration::from_secs(40));
        assert_eq!(snapshot.remaining_secs, 100);

        let restart_time = now + Duration::from_secs(200);
        let restored = FailsafeTimer::restore(snapshot, restart_time).unwrap();
        // 40s had already elapsed pre-restart with zero additional elapsed
        // post-restart (we restore at the instant of restart), so full
        // duration should still be remaining, not reset to 100 fresh nor
        // jumped straight to tripped.
        assert_eq!(restored.remaining(restart_time), Duration::from_secs(100));
    }
}
